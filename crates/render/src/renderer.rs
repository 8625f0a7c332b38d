use std::collections::BTreeSet;

use glam::Vec4;
use serde::{Deserialize, Serialize};
use trellis_spatial::{Light, TransformTree};

use crate::backend::{ClearMask, ClearValues, GpuBackend};
use crate::draw_call::{DrawCall, DrawCallFactory};
use crate::error::RenderError;
use crate::model::Model;

/// Read-only scene state a frame's draws need.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub tree: &'a TransformTree,
    pub lights: &'a [Light],
}

/// Per-frame outcome of [`MeshRenderer::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub draw_calls: usize,
    pub skipped: usize,
}

impl std::fmt::Display for FrameStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} draws, {} skipped", self.draw_calls, self.skipped)
    }
}

/// Which planes to clear at frame start, and to what.
///
/// `None` leaves that plane untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClearConfig {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<i32>,
}

impl Default for ClearConfig {
    fn default() -> Self {
        Self {
            color: Some([0.0, 0.0, 0.0, 1.0]),
            depth: Some(1.0),
            stencil: None,
        }
    }
}

/// Clear values plus the mask of planes that were given one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClearState {
    values: ClearValues,
    mask: ClearMask,
}

impl ClearState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ClearConfig) -> Self {
        let mut state = Self::new();
        if let Some(color) = config.color {
            state.set_color(Vec4::from_array(color));
        }
        if let Some(depth) = config.depth {
            state.set_depth(depth);
        }
        if let Some(stencil) = config.stencil {
            state.set_stencil(stencil);
        }
        state
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.values.color = color;
        self.mask |= ClearMask::COLOR;
    }

    pub fn set_depth(&mut self, depth: f32) {
        self.values.depth = depth;
        self.mask |= ClearMask::DEPTH;
    }

    pub fn set_stencil(&mut self, stencil: i32) {
        self.values.stencil = stencil;
        self.mask |= ClearMask::STENCIL;
    }

    pub fn mask(&self) -> ClearMask {
        self.mask
    }

    pub fn values(&self) -> &ClearValues {
        &self.values
    }

    pub fn clear(&self, backend: &mut dyn GpuBackend) {
        if self.mask.is_empty() {
            return;
        }
        backend.clear(&self.values, self.mask);
    }
}

/// Draws every model once per frame.
///
/// The draw list is rebuilt from the live models on each run; bindings
/// survive in the factory cache, keyed by node and revision.
#[derive(Debug, Default)]
pub struct MeshRenderer {
    factory: DrawCallFactory,
    clear: ClearState,
    draw_calls: Vec<DrawCall>,
}

impl MeshRenderer {
    pub fn new(clear: ClearState) -> Self {
        Self {
            clear,
            ..Self::default()
        }
    }

    pub fn factory(&self) -> &DrawCallFactory {
        &self.factory
    }

    pub fn clear_state(&self) -> &ClearState {
        &self.clear
    }

    pub fn clear_state_mut(&mut self) -> &mut ClearState {
        &mut self.clear
    }

    /// This frame's draw list, in model order.
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    pub fn run(
        &mut self,
        backend: &mut dyn GpuBackend,
        ctx: &FrameContext<'_>,
        models: &mut [Model],
    ) -> Result<FrameStats, RenderError> {
        let live: BTreeSet<_> = models.iter().map(Model::node).collect();
        self.factory.retain(&live);

        self.draw_calls.clear();
        for model in models.iter_mut() {
            let (node, revision) = (model.node(), model.revision());
            let (mesh, material, _) = model.parts_mut();
            let call = self
                .factory
                .make_draw_call(node, revision, mesh, material, backend)?;
            self.draw_calls.push(call);
        }

        self.clear.clear(backend);

        let mut stats = FrameStats::default();
        for (call, model) in self.draw_calls.iter().zip(models.iter_mut()) {
            if call.execute(backend, ctx, model)? {
                stats.draw_calls += 1;
            } else {
                stats.skipped += 1;
            }
        }
        tracing::trace!(%stats, "frame rendered");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Primitive;
    use crate::material::{DiffuseOptions, LinesOptions, Material, PointsOptions};
    use crate::mesh::{Geometry, Mesh};
    use crate::recording::{GpuCommand, RecordingBackend};
    use glam::Vec3;
    use trellis_common::{IdGenerator, NodeId};

    struct Fixture {
        tree: TransformTree,
        models: Vec<Model>,
    }

    fn fixture() -> Fixture {
        let mut tree = TransformTree::new(IdGenerator::new());
        let root = tree.create("root");
        let mut models = Vec::new();
        let materials = [
            Material::diffuse(DiffuseOptions::default()),
            Material::lines(LinesOptions::default()),
            Material::points(PointsOptions::default()),
        ];
        for (i, material) in materials.into_iter().enumerate() {
            let node = tree.create(format!("model{i}"));
            tree.add(root, node).unwrap();
            let geometry = match i {
                0 => Geometry::cube(1.0),
                1 => Geometry::line_strip(&[Vec3::ZERO, Vec3::X, Vec3::Y]),
                _ => Geometry::points(&[Vec3::ZERO, Vec3::ONE]),
            };
            let mut model = Model::builder(node)
                .mesh(Mesh::new(geometry).unwrap())
                .material(material)
                .build()
                .unwrap();
            model.run().unwrap();
            models.push(model);
        }
        tree.update(root).unwrap();
        Fixture { tree, models }
    }

    #[test]
    fn clear_state_masks_only_set_planes() {
        let mut state = ClearState::new();
        assert!(state.mask().is_empty());
        state.set_depth(0.5);
        state.set_stencil(3);
        assert_eq!(state.mask(), ClearMask::DEPTH | ClearMask::STENCIL);

        let mut gpu = RecordingBackend::new();
        ClearState::new().clear(&mut gpu);
        assert!(gpu.commands().is_empty());
        state.clear(&mut gpu);
        assert_eq!(
            gpu.commands(),
            &[GpuCommand::Clear {
                values: ClearValues {
                    depth: 0.5,
                    stencil: 3,
                    ..ClearValues::default()
                },
                mask: ClearMask::DEPTH | ClearMask::STENCIL,
            }]
        );
    }

    #[test]
    fn default_config_clears_color_and_depth() {
        let state = ClearState::from_config(&ClearConfig::default());
        assert_eq!(state.mask(), ClearMask::COLOR | ClearMask::DEPTH);
        assert_eq!(state.values().color, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn run_draws_each_model_in_order() {
        let mut f = fixture();
        let mut gpu = RecordingBackend::new();
        let mut renderer = MeshRenderer::new(ClearState::from_config(&ClearConfig::default()));
        let ctx = FrameContext {
            tree: &f.tree,
            lights: &[],
        };

        let stats = renderer.run(&mut gpu, &ctx, &mut f.models).unwrap();
        assert_eq!(
            stats,
            FrameStats {
                draw_calls: 3,
                skipped: 0
            }
        );
        assert_eq!(stats.to_string(), "3 draws, 0 skipped");

        let draws: Vec<Primitive> = gpu
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::DrawElements { primitive, .. } => Some(*primitive),
                GpuCommand::DrawArrays { primitive, .. } => Some(*primitive),
                _ => None,
            })
            .collect();
        assert_eq!(
            draws,
            [Primitive::Triangles, Primitive::Lines, Primitive::Points]
        );

        // the clear lands after binding and before the first draw
        let clear_at = gpu
            .commands()
            .iter()
            .position(|c| matches!(c, GpuCommand::Clear { .. }))
            .unwrap();
        let first_draw = gpu.commands().iter().position(GpuCommand::is_draw).unwrap();
        assert!(clear_at < first_draw);
    }

    #[test]
    fn draw_list_does_not_grow_across_frames() {
        let mut f = fixture();
        let mut gpu = RecordingBackend::new();
        let mut renderer = MeshRenderer::default();
        let ctx = FrameContext {
            tree: &f.tree,
            lights: &[],
        };

        for _ in 0..3 {
            renderer.run(&mut gpu, &ctx, &mut f.models).unwrap();
            assert_eq!(renderer.draw_calls().len(), 3);
        }
        assert_eq!(gpu.count(GpuCommand::is_draw), 9);
        assert_eq!(gpu.vertex_array_count(), 3);
        assert_eq!(gpu.program_count(), 3);
    }

    #[test]
    fn removed_models_leave_the_cache() {
        let mut f = fixture();
        let mut gpu = RecordingBackend::new();
        let mut renderer = MeshRenderer::default();
        let ctx = FrameContext {
            tree: &f.tree,
            lights: &[],
        };
        renderer.run(&mut gpu, &ctx, &mut f.models).unwrap();
        assert_eq!(renderer.factory().cached(), 3);

        f.models.truncate(1);
        renderer.run(&mut gpu, &ctx, &mut f.models).unwrap();
        assert_eq!(renderer.factory().cached(), 1);
        assert_eq!(renderer.draw_calls().len(), 1);
    }

    #[test]
    fn incomplete_models_are_counted_as_skipped() {
        let mut f = fixture();
        f.models[1].set_mesh(None);
        let mut gpu = RecordingBackend::new();
        let mut renderer = MeshRenderer::default();
        let ctx = FrameContext {
            tree: &f.tree,
            lights: &[],
        };
        let stats = renderer.run(&mut gpu, &ctx, &mut f.models).unwrap();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.skipped, 1);
        assert!(renderer.draw_calls()[1].is_skip());
    }

    #[test]
    fn model_on_missing_node_fails() {
        let mut f = fixture();
        f.models.push(
            Model::builder(NodeId(999))
                .mesh(Mesh::new(Geometry::plane(1.0)).unwrap())
                .material(Material::lines(LinesOptions::default()))
                .build()
                .unwrap(),
        );
        f.models[3].run().unwrap();
        let mut gpu = RecordingBackend::new();
        let mut renderer = MeshRenderer::default();
        let ctx = FrameContext {
            tree: &f.tree,
            lights: &[],
        };
        let err = renderer.run(&mut gpu, &ctx, &mut f.models).unwrap_err();
        assert_eq!(
            err,
            RenderError::Spatial(trellis_spatial::SpatialError::NodeNotFound(NodeId(999)))
        );
    }
}
