//! Materials: a closed set of shading kinds, each with its own program and
//! uniform table.
//!
//! A material compiles its program once per backend ([`Material::apply`]),
//! then re-binds it for every draw ([`Material::use_program`]) by copying the
//! host store's current prop values into the program's uniforms in table
//! order.

use std::collections::BTreeMap;

use glam::{Mat3, Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use trellis_common::NodeId;
use trellis_common::math::safe_inverse;
use trellis_spatial::SpatialError;
use trellis_store::{Clamp, PropValue, Store, StoreError};

use crate::backend::{
    GpuBackend, Primitive, ProgramHandle, ShaderStage, UniformLocation, UniformValue,
    VertexArrayHandle,
};
use crate::error::RenderError;
use crate::mesh::MeshDraw;
use crate::renderer::FrameContext;
use crate::shaders;

pub const MODEL_VIEW_PROJECTION: &str = "modelViewProjection";
pub const NORMAL_MATRIX: &str = "normalMatrix";
pub const LIGHT: &str = "light";
pub const COLOR: &str = "color";
pub const AMBIENT: &str = "ambient";
pub const POINT_SIZE: &str = "pointSize";

/// Inverse transpose of the world matrix's linear part, padded to a `Mat4`.
fn normal_matrix(world: &Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(safe_inverse(world)).transpose())
}

/// GLSL type of a uniform, and the conversion from the prop that feeds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformKind {
    fn prop_kind(self) -> &'static str {
        match self {
            Self::Float => "scalar",
            Self::Vec3 => "vector3",
            Self::Vec4 => "vector4",
            Self::Mat4 => "matrix4",
        }
    }

    pub fn upload(self, name: &str, value: PropValue) -> Result<UniformValue, RenderError> {
        match (self, value) {
            (Self::Float, PropValue::Scalar(v)) => Ok(UniformValue::Float(v)),
            (Self::Vec3, PropValue::Vector3(v)) => Ok(UniformValue::Vec3(v)),
            (Self::Vec4, PropValue::Vector4(v)) => Ok(UniformValue::Vec4(v)),
            (Self::Mat4, PropValue::Matrix4(m)) => Ok(UniformValue::Mat4(m)),
            _ => Err(RenderError::UniformType {
                name: name.to_string(),
                expected: self.prop_kind(),
                actual: value.kind(),
            }),
        }
    }
}

const DIFFUSE_UNIFORMS: &[(&str, UniformKind)] = &[
    (MODEL_VIEW_PROJECTION, UniformKind::Mat4),
    (NORMAL_MATRIX, UniformKind::Mat4),
    (LIGHT, UniformKind::Vec3),
    (COLOR, UniformKind::Vec4),
    (AMBIENT, UniformKind::Float),
];

const LINES_UNIFORMS: &[(&str, UniformKind)] = &[
    (MODEL_VIEW_PROJECTION, UniformKind::Mat4),
    (COLOR, UniformKind::Vec4),
];

const POINTS_UNIFORMS: &[(&str, UniformKind)] = &[
    (MODEL_VIEW_PROJECTION, UniformKind::Mat4),
    (COLOR, UniformKind::Vec4),
    (POINT_SIZE, UniformKind::Float),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffuseOptions {
    pub color: [f32; 4],
    pub ambient: f32,
    pub cull_back_faces: bool,
}

impl Default for DiffuseOptions {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            ambient: 0.1,
            cull_back_faces: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinesOptions {
    pub color: [f32; 4],
}

impl Default for LinesOptions {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PointsOptions {
    pub color: [f32; 4],
    /// Point diameter in pixels, 1..=64.
    pub size: f32,
}

impl Default for PointsOptions {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            size: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Diffuse(DiffuseOptions),
    Lines(LinesOptions),
    Points(PointsOptions),
}

impl MaterialKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Diffuse(_) => "diffuse",
            Self::Lines(_) => "lines",
            Self::Points(_) => "points",
        }
    }

    fn sources(&self) -> (&'static str, &'static str) {
        match self {
            Self::Diffuse(_) => (shaders::DIFFUSE_VERTEX, shaders::DIFFUSE_FRAGMENT),
            Self::Lines(_) => (shaders::LINES_VERTEX, shaders::LINES_FRAGMENT),
            Self::Points(_) => (shaders::POINTS_VERTEX, shaders::POINTS_FRAGMENT),
        }
    }

    /// Uniforms uploaded on every draw, in upload order.
    pub fn uniforms(&self) -> &'static [(&'static str, UniformKind)] {
        match self {
            Self::Diffuse(_) => DIFFUSE_UNIFORMS,
            Self::Lines(_) => LINES_UNIFORMS,
            Self::Points(_) => POINTS_UNIFORMS,
        }
    }

    pub fn primitive(&self) -> Primitive {
        match self {
            Self::Diffuse(_) => Primitive::Triangles,
            Self::Lines(_) => Primitive::Lines,
            Self::Points(_) => Primitive::Points,
        }
    }

    pub fn culls_back_faces(&self) -> bool {
        match self {
            Self::Diffuse(o) => o.cull_back_faces,
            Self::Lines(_) | Self::Points(_) => false,
        }
    }

    fn color(&self) -> [f32; 4] {
        match self {
            Self::Diffuse(o) => o.color,
            Self::Lines(o) => o.color,
            Self::Points(o) => o.color,
        }
    }
}

/// A linked program and the locations it reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramBinding {
    pub program: ProgramHandle,
    pub attributes: BTreeMap<String, u32>,
    pub uniforms: BTreeMap<String, UniformLocation>,
}

#[derive(Debug, Clone)]
pub struct Material {
    kind: MaterialKind,
    binding: Option<ProgramBinding>,
    /// Whether the host store holds the current option values.
    synced: bool,
}

impl Material {
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            kind,
            binding: None,
            synced: false,
        }
    }

    pub fn diffuse(options: DiffuseOptions) -> Self {
        Self::new(MaterialKind::Diffuse(options))
    }

    pub fn lines(options: LinesOptions) -> Self {
        Self::new(MaterialKind::Lines(options))
    }

    pub fn points(options: PointsOptions) -> Self {
        Self::new(MaterialKind::Points(options))
    }

    pub fn kind(&self) -> &MaterialKind {
        &self.kind
    }

    pub fn binding(&self) -> Option<&ProgramBinding> {
        self.binding.as_ref()
    }

    pub fn is_compiled(&self) -> bool {
        self.binding.is_some()
    }

    pub fn set_color(&mut self, color: [f32; 4]) {
        match &mut self.kind {
            MaterialKind::Diffuse(o) => o.color = color,
            MaterialKind::Lines(o) => o.color = color,
            MaterialKind::Points(o) => o.color = color,
        }
        self.synced = false;
    }

    /// Returns false for kinds without an ambient term.
    pub fn set_ambient(&mut self, ambient: f32) -> bool {
        let MaterialKind::Diffuse(o) = &mut self.kind else {
            return false;
        };
        o.ambient = ambient;
        self.synced = false;
        true
    }

    /// Returns false for kinds that do not draw points.
    pub fn set_point_size(&mut self, size: f32) -> bool {
        let MaterialKind::Points(o) = &mut self.kind else {
            return false;
        };
        o.size = size;
        self.synced = false;
        true
    }

    /// Declare this material's props on the host store and push changed
    /// options into it.
    pub fn run(&mut self, store: &mut Store) -> Result<(), StoreError> {
        let color = Vec4::from_array(self.kind.color());
        store.declare_prop(MODEL_VIEW_PROJECTION, Mat4::IDENTITY, None);
        store.declare_prop(LIGHT, Vec3::ZERO, None);
        store.declare_prop(COLOR, color, Some(Clamp::unit()));
        match self.kind {
            MaterialKind::Diffuse(o) => {
                store.declare_prop(NORMAL_MATRIX, Mat4::IDENTITY, None);
                store.declare_prop(AMBIENT, o.ambient, Some(Clamp::unit()));
            }
            MaterialKind::Points(o) => {
                store.declare_prop(POINT_SIZE, o.size, Some(Clamp::range(1.0, 64.0)));
            }
            MaterialKind::Lines(_) => {}
        }

        if !self.synced {
            store.set_prop(COLOR, color)?;
            match self.kind {
                MaterialKind::Diffuse(o) => {
                    store.set_prop(AMBIENT, o.ambient)?;
                }
                MaterialKind::Points(o) => {
                    store.set_prop(POINT_SIZE, o.size)?;
                }
                MaterialKind::Lines(_) => {}
            }
            self.synced = true;
        }
        Ok(())
    }

    /// Compile and link this material's program, once.
    ///
    /// Later calls return the existing binding without touching the backend.
    pub fn apply(&mut self, backend: &mut dyn GpuBackend) -> Result<&ProgramBinding, RenderError> {
        if self.binding.is_none() {
            self.binding = Some(self.compile(backend)?);
        }
        self.binding.as_ref().ok_or(RenderError::NotCompiled)
    }

    fn compile(&self, backend: &mut dyn GpuBackend) -> Result<ProgramBinding, RenderError> {
        let (vertex_source, fragment_source) = self.kind.sources();
        let vertex = backend.compile_shader(ShaderStage::Vertex, vertex_source)?;
        let fragment = backend.compile_shader(ShaderStage::Fragment, fragment_source)?;
        let program = backend.link_program(vertex, fragment)?;

        let uniforms = backend.uniform_locations(program);
        if let Some((name, _)) = self
            .kind
            .uniforms()
            .iter()
            .find(|(name, _)| !uniforms.contains_key(*name))
        {
            return Err(RenderError::MissingUniform {
                name: name.to_string(),
            });
        }
        let attributes = backend.attribute_locations(program);
        tracing::debug!(
            material = self.kind.name(),
            program = program.0,
            attributes = attributes.len(),
            uniforms = uniforms.len(),
            "compiled material program"
        );
        Ok(ProgramBinding {
            program,
            attributes,
            uniforms,
        })
    }

    /// Activate the program and vertex array, then upload every uniform.
    ///
    /// `modelViewProjection` comes from the node's projection matrix and
    /// `light` is the sum of every scene light's contribution at the node.
    /// Diffuse materials also get `normalMatrix`, which carries model-space
    /// normals into world space where `light` lives.
    pub fn use_program(
        &self,
        backend: &mut dyn GpuBackend,
        vao: VertexArrayHandle,
        ctx: &FrameContext<'_>,
        node: NodeId,
        store: &mut Store,
    ) -> Result<(), RenderError> {
        let binding = self.binding.as_ref().ok_or(RenderError::NotCompiled)?;
        backend.use_program(binding.program);
        backend.bind_vertex_array(Some(vao));

        let transform = ctx.tree.get(node).ok_or(SpatialError::NodeNotFound(node))?;
        store.set_prop(MODEL_VIEW_PROJECTION, transform.projection())?;
        if matches!(self.kind, MaterialKind::Diffuse(_)) {
            store.set_prop(NORMAL_MATRIX, normal_matrix(&transform.matrix_world()))?;
        }
        let position = transform.matrix_world().w_axis.truncate();
        let mut light = Vec3::ZERO;
        for source in ctx.lights {
            light += source.contribution(ctx.tree, position)?;
        }
        store.set_prop(LIGHT, light)?;

        for &(name, kind) in self.kind.uniforms() {
            let value = *store
                .prop(name)
                .ok_or_else(|| StoreError::UnknownProp(name.to_string()))?;
            let location = binding
                .uniforms
                .get(name)
                .copied()
                .ok_or_else(|| RenderError::MissingUniform {
                    name: name.to_string(),
                })?;
            backend.upload_uniform(location, kind.upload(name, value)?);
        }
        Ok(())
    }

    /// Set per-kind raster state and issue the draw.
    pub fn render(&self, backend: &mut dyn GpuBackend, draw: &MeshDraw) {
        backend.set_face_culling(self.kind.culls_back_faces());
        draw.draw(backend, self.kind.primitive());
    }
}
