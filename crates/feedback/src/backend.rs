//! Capability object handed to every pass.
//!
//! The orchestrator never touches ambient GPU state: anything that binds a
//! target, clears it, or draws into it goes through [`RenderBackend`]. The
//! `wgpu` implementation lives in [`crate::gpu`]; unit tests use the recording
//! mock in `backend::mock`.

use std::fmt;

/// Opaque handle to a backend colour surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub(crate) u64);

/// Opaque handle to a compiled full-screen program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program#{}", self.0)
    }
}

/// Pixel formats a surface may use. No depth attachments exist anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// Half-float colour; used for history so repeated decay does not band.
    Rgba16Float,
    /// Byte colour; used for small sampling grids, lookup tables and atlases.
    Rgba8Unorm,
}

impl SurfaceFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba16Float => 8,
            Self::Rgba8Unorm => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
}

impl SurfaceDesc {
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: SurfaceFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
        }
    }
}

/// How a program's output combines with what the target already holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Output overwrites the target.
    #[default]
    Replace,
    /// Premultiplied source-over; repeated draws accumulate.
    PremultipliedOver,
}

#[derive(Clone, Debug)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    /// Fragment body in WGSL; the shared prelude is prepended by the backend.
    pub fragment: &'a str,
    pub target_format: SurfaceFormat,
    pub blend: BlendMode,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadAction {
    Clear([f32; 4]),
    Load,
}

/// Texture slots every program can sample.
///
/// Unused slots are bound to a transparent placeholder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureSlots {
    pub previous_pass_this_frame: Option<SurfaceId>,
    pub this_pass_previous_frame: Option<SurfaceId>,
    pub aux: Option<SurfaceId>,
}

#[derive(Clone, Copy, Debug)]
pub struct FullscreenDraw<'a> {
    pub program: ProgramId,
    pub target: SurfaceId,
    pub load: LoadAction,
    pub uniforms: &'a [u8],
    pub textures: TextureSlots,
}

pub const TRANSPARENT: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to allocate {what}: {reason}")]
    Allocation { what: String, reason: String },
    #[error("failed to compile program '{label}': {reason}")]
    Compile { label: String, reason: String },
    #[error("unknown {0}")]
    UnknownSurface(SurfaceId),
    #[error("unknown {0}")]
    UnknownProgram(ProgramId),
    #[error("{surface} upload expected {expected} bytes, got {actual}")]
    UploadSize {
        surface: SurfaceId,
        expected: usize,
        actual: usize,
    },
    #[error("uniform block of {actual} bytes exceeds the {limit} byte limit")]
    UniformSize { actual: usize, limit: usize },
    #[error("{program} renders {expected:?} but {surface} is {actual:?}")]
    FormatMismatch {
        program: ProgramId,
        surface: SurfaceId,
        expected: SurfaceFormat,
        actual: SurfaceFormat,
    },
    #[error("readback of {surface} failed: {reason}")]
    Readback { surface: SurfaceId, reason: String },
}

/// GPU capabilities the pipeline relies on.
///
/// Handles are only valid on the backend that created them. Releasing an
/// unknown handle is a no-op so teardown paths can stay idempotent.
pub trait RenderBackend {
    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId, BackendError>;
    fn release_surface(&mut self, id: SurfaceId);
    fn clear_surface(&mut self, id: SurfaceId, color: [f32; 4]) -> Result<(), BackendError>;
    /// Replaces the contents of an `Rgba8Unorm` surface with tightly packed rows.
    fn write_surface(&mut self, id: SurfaceId, rgba8: &[u8]) -> Result<(), BackendError>;
    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, BackendError>;
    fn release_program(&mut self, id: ProgramId);
    fn draw_fullscreen(&mut self, draw: &FullscreenDraw<'_>) -> Result<(), BackendError>;
    /// Blocks until the surface contents are available on the CPU, row-major from the top.
    fn read_surface(&mut self, id: SurfaceId) -> Result<Vec<[f32; 4]>, BackendError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording backend for GPU-free tests.
    //!
    //! Surfaces carry a single flat colour so tests can follow where a draw
    //! landed; programs never run.

    use std::collections::BTreeMap;

    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum Op {
        CreateSurface(SurfaceId, String),
        ReleaseSurface(SurfaceId),
        Clear(SurfaceId),
        Write(SurfaceId),
        CreateProgram(ProgramId, String),
        ReleaseProgram(ProgramId),
        Draw {
            program: ProgramId,
            target: SurfaceId,
            textures: TextureSlots,
        },
        Read(SurfaceId),
    }

    #[derive(Clone, Debug)]
    pub(crate) struct MockSurface {
        pub desc: SurfaceDesc,
        pub fill: [f32; 4],
        /// Bumped on every draw so tests can tell written content apart.
        pub generation: u64,
    }

    #[derive(Default)]
    pub(crate) struct MockBackend {
        next_id: u64,
        pub surfaces: BTreeMap<SurfaceId, MockSurface>,
        pub programs: BTreeMap<ProgramId, String>,
        pub ops: Vec<Op>,
        pub fail_programs: Vec<String>,
        pub fail_surfaces: bool,
        /// Colour returned for reads of surfaces nobody drew into.
        pub read_fill: Option<[f32; 4]>,
    }

    impl MockBackend {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn live_surfaces(&self) -> usize {
            self.surfaces.len()
        }

        pub(crate) fn live_programs(&self) -> usize {
            self.programs.len()
        }

        pub(crate) fn surface(&self, id: SurfaceId) -> &MockSurface {
            &self.surfaces[&id]
        }

        pub(crate) fn draws(&self) -> Vec<(ProgramId, SurfaceId, TextureSlots)> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Draw {
                        program,
                        target,
                        textures,
                    } => Some((*program, *target, *textures)),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn draws_with(&self, label: &str) -> usize {
            self.draws()
                .iter()
                .filter(|(program, _, _)| {
                    self.programs
                        .get(program)
                        .map(|name| name == label)
                        .unwrap_or(false)
                })
                .count()
        }

        pub(crate) fn clear_ops(&mut self) {
            self.ops.clear();
        }

        fn next(&mut self) -> u64 {
            self.next_id += 1;
            self.next_id
        }
    }

    impl RenderBackend for MockBackend {
        fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId, BackendError> {
            if self.fail_surfaces {
                return Err(BackendError::Allocation {
                    what: desc.label.clone(),
                    reason: "mock allocation failure".into(),
                });
            }
            let id = SurfaceId(self.next());
            self.surfaces.insert(
                id,
                MockSurface {
                    desc: desc.clone(),
                    fill: TRANSPARENT,
                    generation: 0,
                },
            );
            self.ops.push(Op::CreateSurface(id, desc.label.clone()));
            Ok(id)
        }

        fn release_surface(&mut self, id: SurfaceId) {
            if self.surfaces.remove(&id).is_some() {
                self.ops.push(Op::ReleaseSurface(id));
            }
        }

        fn clear_surface(&mut self, id: SurfaceId, color: [f32; 4]) -> Result<(), BackendError> {
            let surface = self
                .surfaces
                .get_mut(&id)
                .ok_or(BackendError::UnknownSurface(id))?;
            surface.fill = color;
            surface.generation = 0;
            self.ops.push(Op::Clear(id));
            Ok(())
        }

        fn write_surface(&mut self, id: SurfaceId, rgba8: &[u8]) -> Result<(), BackendError> {
            let surface = self
                .surfaces
                .get(&id)
                .ok_or(BackendError::UnknownSurface(id))?;
            let expected = (surface.desc.width * surface.desc.height * 4) as usize;
            if rgba8.len() != expected {
                return Err(BackendError::UploadSize {
                    surface: id,
                    expected,
                    actual: rgba8.len(),
                });
            }
            self.ops.push(Op::Write(id));
            Ok(())
        }

        fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, BackendError> {
            if self.fail_programs.iter().any(|label| label == desc.label) {
                return Err(BackendError::Compile {
                    label: desc.label.to_string(),
                    reason: "mock compile failure".into(),
                });
            }
            let id = ProgramId(self.next());
            self.programs.insert(id, desc.label.to_string());
            self.ops.push(Op::CreateProgram(id, desc.label.to_string()));
            Ok(id)
        }

        fn release_program(&mut self, id: ProgramId) {
            if self.programs.remove(&id).is_some() {
                self.ops.push(Op::ReleaseProgram(id));
            }
        }

        fn draw_fullscreen(&mut self, draw: &FullscreenDraw<'_>) -> Result<(), BackendError> {
            if !self.programs.contains_key(&draw.program) {
                return Err(BackendError::UnknownProgram(draw.program));
            }
            for slot in [
                draw.textures.previous_pass_this_frame,
                draw.textures.this_pass_previous_frame,
                draw.textures.aux,
            ]
            .into_iter()
            .flatten()
            {
                if !self.surfaces.contains_key(&slot) {
                    return Err(BackendError::UnknownSurface(slot));
                }
            }
            let target = self
                .surfaces
                .get_mut(&draw.target)
                .ok_or(BackendError::UnknownSurface(draw.target))?;
            if let LoadAction::Clear(color) = draw.load {
                target.fill = color;
            }
            target.generation += 1;
            self.ops.push(Op::Draw {
                program: draw.program,
                target: draw.target,
                textures: draw.textures,
            });
            Ok(())
        }

        fn read_surface(&mut self, id: SurfaceId) -> Result<Vec<[f32; 4]>, BackendError> {
            let surface = self
                .surfaces
                .get(&id)
                .ok_or(BackendError::UnknownSurface(id))?;
            let fill = self.read_fill.unwrap_or(surface.fill);
            let count = (surface.desc.width * surface.desc.height) as usize;
            self.ops.push(Op::Read(id));
            Ok(vec![fill; count])
        }
    }
}
