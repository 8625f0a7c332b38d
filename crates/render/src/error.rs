use trellis_common::math::MathError;
use trellis_spatial::SpatialError;
use trellis_store::StoreError;

use crate::backend::GpuError;

/// Errors from building or executing draws.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("program has no active uniform '{name}'")]
    MissingUniform { name: String },
    #[error("uniform '{name}' expects a {expected} prop, store holds {actual}")]
    UniformType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("material used before its program was compiled")]
    NotCompiled,
    #[error("model has no mesh")]
    MissingMesh,
    #[error("model has no material")]
    MissingMaterial,
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("vertex {vertex} out of range ({count} vertices)")]
    VertexOutOfRange { vertex: usize, count: usize },
    #[error(transparent)]
    Math(#[from] MathError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}
