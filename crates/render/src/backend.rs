//! The boundary to the graphics API.
//!
//! Everything below this trait (shader compilation, buffer storage, uniform
//! upload, rasterization) belongs to the backend. The rest of the crate only
//! talks to it through [`GpuBackend`].

use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

use glam::{Mat4, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex attribute data.
    Array,
    /// Index data.
    ElementArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    Lines,
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    pub fn bytes(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// A value ready for uniform upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// Bitmask of framebuffer planes to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ClearMask(u32);

impl ClearMask {
    pub const NONE: ClearMask = ClearMask(0);
    pub const COLOR: ClearMask = ClearMask(1);
    pub const DEPTH: ClearMask = ClearMask(1 << 1);
    pub const STENCIL: ClearMask = ClearMask(1 << 2);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: ClearMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ClearMask {
    type Output = ClearMask;

    fn bitor(self, rhs: ClearMask) -> ClearMask {
        ClearMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ClearMask {
    fn bitor_assign(&mut self, rhs: ClearMask) {
        self.0 |= rhs.0;
    }
}

/// Values written by a clear, per plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: Vec4,
    pub depth: f32,
    pub stencil: i32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Errors reported by a backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuError {
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("program failed to link: {log}")]
    ProgramLink { log: String },
    #[error("unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },
    #[error("unsupported backend: {0}")]
    Unsupported(String),
}

/// Immediate-mode graphics API used by materials, meshes and the renderer.
///
/// Handles are owned by the backend for its whole lifetime; nothing here
/// releases them.
pub trait GpuBackend {
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderHandle, GpuError>;

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, GpuError>;

    /// Active vertex attributes of a linked program, name -> location.
    fn attribute_locations(&self, program: ProgramHandle) -> BTreeMap<String, u32>;

    /// Active uniforms of a linked program, name -> location.
    fn uniform_locations(&self, program: ProgramHandle) -> BTreeMap<String, UniformLocation>;

    fn use_program(&mut self, program: ProgramHandle);

    fn create_vertex_array(&mut self) -> VertexArrayHandle;

    fn bind_vertex_array(&mut self, vao: Option<VertexArrayHandle>);

    fn upload_buffer(&mut self, kind: BufferKind, data: &[u8]) -> BufferHandle;

    /// Point attribute `location` at `buffer`, `components` floats per vertex.
    fn bind_attribute(&mut self, location: u32, buffer: BufferHandle, components: u32);

    fn upload_uniform(&mut self, location: UniformLocation, value: UniformValue);

    fn set_face_culling(&mut self, enabled: bool);

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32);

    fn draw_elements(&mut self, primitive: Primitive, count: u32, width: IndexWidth, offset: u32);

    fn clear(&mut self, values: &ClearValues, mask: ClearMask);
}
