//! Render target pool: one ping-pong pair per stage plus the snapshot surface.

use crate::backend::{BackendError, RenderBackend, SurfaceDesc, SurfaceFormat, SurfaceId, TRANSPARENT};
use crate::viewport::DeviceSize;

/// A colour surface owned by the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Surface {
    pub id: SurfaceId,
    pub size: DeviceSize,
}

/// Two fixed slots and a front index.
///
/// `read()` is the most recently completed result; `swap()` flips the index
/// and never moves or copies surfaces.
#[derive(Debug)]
pub struct PingPong {
    slots: [Surface; 2],
    front: usize,
}

impl PingPong {
    fn new(slots: [Surface; 2]) -> Self {
        Self { slots, front: 0 }
    }

    pub fn read(&self) -> Surface {
        self.slots[self.front]
    }

    pub fn write(&self) -> Surface {
        self.slots[1 - self.front]
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }

    pub fn size(&self) -> DeviceSize {
        self.slots[0].size
    }

    fn ids(&self) -> [SurfaceId; 2] {
        [self.slots[0].id, self.slots[1].id]
    }
}

#[derive(Debug)]
pub struct RenderTargetPool {
    format: SurfaceFormat,
    pairs: Vec<PingPong>,
    snapshot: Option<Surface>,
    size: Option<DeviceSize>,
}

impl Default for RenderTargetPool {
    fn default() -> Self {
        Self::new(SurfaceFormat::Rgba16Float)
    }
}

impl RenderTargetPool {
    pub fn new(format: SurfaceFormat) -> Self {
        Self {
            format,
            pairs: Vec::new(),
            snapshot: None,
            size: None,
        }
    }

    /// Brings the pool to exactly `count` pairs of `size`, plus the snapshot.
    ///
    /// Missing pairs are allocated and surplus pairs released. A size change
    /// reallocates every surface; history does not survive it.
    pub fn ensure(
        &mut self,
        backend: &mut dyn RenderBackend,
        count: usize,
        size: DeviceSize,
    ) -> Result<(), BackendError> {
        // History is not resampled; a new size starts from transparent.
        if self.size != Some(size) {
            if self.size.is_some() {
                tracing::debug!(
                    width = size.width,
                    height = size.height,
                    pairs = self.pairs.len(),
                    "reallocating render targets for new size"
                );
            }
            self.release(backend);
            self.size = Some(size);
        }

        while self.pairs.len() > count {
            if let Some(pair) = self.pairs.pop() {
                for id in pair.ids() {
                    backend.release_surface(id);
                }
            }
        }

        if self.snapshot.is_none() {
            self.snapshot = Some(self.allocate(backend, "snapshot", size)?);
        }

        while self.pairs.len() < count {
            let stage = self.pairs.len();
            let first = self.allocate(backend, &format!("stage {stage} a"), size)?;
            let second = match self.allocate(backend, &format!("stage {stage} b"), size) {
                Ok(surface) => surface,
                Err(err) => {
                    backend.release_surface(first.id);
                    return Err(err);
                }
            };
            self.pairs.push(PingPong::new([first, second]));
        }
        Ok(())
    }

    fn allocate(
        &self,
        backend: &mut dyn RenderBackend,
        label: &str,
        size: DeviceSize,
    ) -> Result<Surface, BackendError> {
        let desc = SurfaceDesc::new(label, size.width, size.height, self.format);
        let id = backend.create_surface(&desc)?;
        if let Err(err) = backend.clear_surface(id, TRANSPARENT) {
            backend.release_surface(id);
            return Err(err);
        }
        Ok(Surface { id, size })
    }

    /// Releases every surface; the pool can be `ensure`d again afterwards.
    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        for pair in self.pairs.drain(..) {
            for id in pair.ids() {
                backend.release_surface(id);
            }
        }
        if let Some(snapshot) = self.snapshot.take() {
            backend.release_surface(snapshot.id);
        }
        self.size = None;
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn size(&self) -> Option<DeviceSize> {
        self.size
    }

    pub fn snapshot(&self) -> Option<Surface> {
        self.snapshot
    }

    pub fn pair(&self, stage: usize) -> Option<&PingPong> {
        self.pairs.get(stage)
    }

    pub fn pair_mut(&mut self, stage: usize) -> Option<&mut PingPong> {
        self.pairs.get_mut(stage)
    }

    /// Whether `id` is still owned by this pool.
    pub fn owns(&self, id: SurfaceId) -> bool {
        self.snapshot.map(|s| s.id == id).unwrap_or(false)
            || self.pairs.iter().any(|pair| pair.ids().contains(&id))
    }
}
