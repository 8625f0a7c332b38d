use std::collections::{BTreeMap, BTreeSet};

use trellis_common::NodeId;

use crate::backend::{GpuBackend, ProgramHandle, VertexArrayHandle};
use crate::error::RenderError;
use crate::material::Material;
use crate::mesh::{Mesh, MeshDraw};
use crate::model::Model;
use crate::renderer::FrameContext;

/// GPU objects one model draws with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundDraw {
    pub program: ProgramHandle,
    pub vao: VertexArrayHandle,
    pub mesh: MeshDraw,
}

/// One entry of a frame's draw list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCall {
    /// Model lacks a mesh or material; executing it does nothing.
    Skip,
    Draw { node: NodeId, bound: BoundDraw },
}

impl DrawCall {
    /// Issue the draw for `model`. Returns whether anything was drawn.
    pub fn execute(
        &self,
        backend: &mut dyn GpuBackend,
        ctx: &FrameContext<'_>,
        model: &mut Model,
    ) -> Result<bool, RenderError> {
        let DrawCall::Draw { node, bound } = self else {
            return Ok(false);
        };
        let (_, material, store) = model.parts_mut();
        let material = material.ok_or(RenderError::MissingMaterial)?;
        material.use_program(backend, bound.vao, ctx, *node, store)?;
        material.render(backend, &bound.mesh);
        tracing::trace!(node = %node, program = bound.program.0, "draw executed");
        Ok(true)
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, DrawCall::Skip)
    }
}

/// Builds draw calls and keeps their GPU bindings across frames.
///
/// A binding is cached per node together with the model revision it was
/// built for; a newer revision rebuilds it.
#[derive(Debug, Default)]
pub struct DrawCallFactory {
    cache: BTreeMap<NodeId, (u64, BoundDraw)>,
}

impl DrawCallFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_draw_call(
        &mut self,
        node: NodeId,
        revision: u64,
        mesh: Option<&Mesh>,
        material: Option<&mut Material>,
        backend: &mut dyn GpuBackend,
    ) -> Result<DrawCall, RenderError> {
        let (Some(mesh), Some(material)) = (mesh, material) else {
            tracing::trace!(node = %node, "model incomplete, draw skipped");
            return Ok(DrawCall::Skip);
        };
        let cached = self.cache.get(&node).filter(|(built_for, _)| *built_for == revision);
        if let Some(&(_, bound)) = cached {
            return Ok(DrawCall::Draw { node, bound });
        }

        let binding = material.apply(backend)?;
        let vao = backend.create_vertex_array();
        backend.bind_vertex_array(Some(vao));
        let mesh_draw = mesh.apply(backend, &binding.attributes);
        backend.bind_vertex_array(None);

        let bound = BoundDraw {
            program: binding.program,
            vao,
            mesh: mesh_draw,
        };
        self.cache.insert(node, (revision, bound));
        tracing::debug!(node = %node, revision, vao = vao.0, "draw call bound");
        Ok(DrawCall::Draw { node, bound })
    }

    /// Drop cached bindings for nodes that no longer host a model.
    pub fn retain(&mut self, live: &BTreeSet<NodeId>) {
        self.cache.retain(|node, _| live.contains(node));
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
