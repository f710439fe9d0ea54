//! Synchronous texture readback with row depadding.

use std::sync::mpsc;

use half::f16;

use crate::backend::SurfaceFormat;

/// Rounds a row up to `COPY_BYTES_PER_ROW_ALIGNMENT`.
pub(crate) fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Copies `texture` into a staging buffer, waits for it and decodes each
/// texel to linear floats, top row first.
pub(crate) fn read_texels(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    format: SurfaceFormat,
) -> Result<Vec<[f32; 4]>, String> {
    let bytes_per_pixel = format.bytes_per_pixel();
    let tight = width * bytes_per_pixel;
    let padded = padded_bytes_per_row(tight);

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback staging"),
        size: u64::from(padded) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| format!("device poll failed: {err}"))?;
    receiver
        .recv()
        .map_err(|_| "map callback dropped".to_string())?
        .map_err(|err| format!("buffer map failed: {err}"))?;

    let texels = {
        let data = slice.get_mapped_range();
        let mut texels = Vec::with_capacity((width * height) as usize);
        for row in data.chunks_exact(padded as usize).take(height as usize) {
            for pixel in row[..tight as usize].chunks_exact(bytes_per_pixel as usize) {
                texels.push(decode(pixel, format));
            }
        }
        texels
    };
    staging.unmap();
    Ok(texels)
}

fn decode(pixel: &[u8], format: SurfaceFormat) -> [f32; 4] {
    match format {
        SurfaceFormat::Rgba8Unorm => [
            f32::from(pixel[0]) / 255.0,
            f32::from(pixel[1]) / 255.0,
            f32::from(pixel[2]) / 255.0,
            f32::from(pixel[3]) / 255.0,
        ],
        SurfaceFormat::Rgba16Float => {
            let channel = |i: usize| {
                f16::from_bits(u16::from_le_bytes([pixel[i * 2], pixel[i * 2 + 1]])).to_f32()
            };
            [channel(0), channel(1), channel(2), channel(3)]
        }
    }
}

/// Quantizes linear floats to straight RGBA8, clamping out-of-range values.
pub fn to_rgba8(texels: &[[f32; 4]]) -> Vec<u8> {
    texels
        .iter()
        .flat_map(|texel| texel.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(256), 256);
        assert_eq!(padded_bytes_per_row(257), 512);
    }

    #[test]
    fn decodes_half_floats() {
        let bytes: Vec<u8> = [1.0f32, 0.5, 0.25, 0.0]
            .iter()
            .flat_map(|v| f16::from_f32(*v).to_bits().to_le_bytes())
            .collect();
        assert_eq!(decode(&bytes, SurfaceFormat::Rgba16Float), [1.0, 0.5, 0.25, 0.0]);
        assert_eq!(decode(&[255, 0, 51, 255], SurfaceFormat::Rgba8Unorm), [1.0, 0.0, 0.2, 1.0]);
    }

    #[test]
    fn quantizes_with_clamping() {
        assert_eq!(to_rgba8(&[[1.5, -0.2, 0.5, 1.0]]), vec![255, 0, 128, 255]);
    }
}
