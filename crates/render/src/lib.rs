//! Materials, meshes and per-frame draw assembly over a pluggable GPU backend.
//!
//! # Invariants
//! - A material's program is compiled and linked at most once.
//! - A model's vertex array is built once per revision and reused until the
//!   mesh or material is swapped.
//! - The draw list is rebuilt every frame from the live models; nothing from
//!   a previous frame is re-executed.
//! - Rendering reads transforms and lights but never moves nodes.

mod backend;
mod draw_call;
mod error;
mod material;
mod mesh;
mod model;
mod recording;
mod renderer;
pub mod shaders;

pub use backend::{
    BufferHandle, BufferKind, ClearMask, ClearValues, GpuBackend, GpuError, IndexWidth,
    Primitive, ProgramHandle, ShaderHandle, ShaderStage, UniformLocation, UniformValue,
    VertexArrayHandle,
};
pub use draw_call::{BoundDraw, DrawCall, DrawCallFactory};
pub use error::RenderError;
pub use material::{
    AMBIENT, COLOR, DiffuseOptions, LIGHT, LinesOptions, MODEL_VIEW_PROJECTION, Material,
    MaterialKind, NORMAL_MATRIX, POINT_SIZE, PointsOptions, ProgramBinding, UniformKind,
};
pub use mesh::{BufferAttribute, Geometry, IndexBuffer, Mesh, MeshDraw, PackedMesh, pack_mesh};
pub use model::{Model, ModelBuilder};
pub use recording::{GpuCommand, RecordingBackend};
pub use renderer::{ClearConfig, ClearState, FrameContext, FrameStats, MeshRenderer};

pub fn crate_info() -> &'static str {
    "trellis-render v0.1.0"
}
