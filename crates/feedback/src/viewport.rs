/// Size of a render surface in device pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceSize {
    pub width: u32,
    pub height: u32,
}

impl DeviceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width.max(1) as f32, 1.0 / self.height.max(1) as f32]
    }

    pub fn as_f32(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

/// Host viewport as reported each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub logical_width: f32,
    pub logical_height: f32,
    pub device_pixel_ratio: f32,
}

impl Viewport {
    pub fn new(logical_width: f32, logical_height: f32, device_pixel_ratio: f32) -> Self {
        Self {
            logical_width,
            logical_height,
            device_pixel_ratio,
        }
    }

    /// Viewport whose logical size already is the device size.
    pub fn from_device(size: DeviceSize) -> Self {
        Self::new(size.width as f32, size.height as f32, 1.0)
    }

    /// Effective pixel ratio after applying an optional cap.
    pub fn pixel_ratio(&self, cap: Option<f32>) -> f32 {
        let ratio = if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        };
        match cap {
            Some(cap) if cap > 0.0 => ratio.min(cap),
            _ => ratio,
        }
    }

    /// `floor(logical * ratio)` per axis, never below one pixel.
    pub fn device_size(&self, cap: Option<f32>) -> DeviceSize {
        let ratio = self.pixel_ratio(cap);
        let axis = |logical: f32| -> u32 {
            let scaled = (logical.max(0.0) * ratio).floor();
            (scaled as u32).max(1)
        };
        DeviceSize::new(axis(self.logical_width), axis(self.logical_height))
    }
}
