use std::collections::BTreeSet;

use trellis_common::{IdGenerator, NodeId};
use trellis_render::{
    ClearState, FrameContext, FrameStats, GpuBackend, MeshRenderer, Model, RenderError,
};
use trellis_spatial::{Camera, Light, SpatialError, TransformTree};

use crate::config::SceneConfig;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Spatial(#[from] SpatialError),
    #[error("node {0} already hosts a model")]
    DuplicateModel(NodeId),
    #[error("the scene root cannot be removed")]
    RootRemoval,
    #[error("node {0} is not attached under the scene root")]
    Detached(NodeId),
}

/// A transform tree with the behaviors attached to its nodes.
///
/// Models, lights and cameras are registries keyed by node: each entry
/// refers to a node of the tree and is dropped when that node is removed.
#[derive(Debug)]
pub struct Scene {
    tree: TransformTree,
    root: NodeId,
    models: Vec<Model>,
    lights: Vec<Light>,
    cameras: Vec<Camera>,
    renderer: MeshRenderer,
    frame: u64,
}

impl Scene {
    pub fn new(config: &SceneConfig, ids: IdGenerator) -> Self {
        let mut tree = TransformTree::new(ids);
        tree.set_record_events(config.record_transform_events);
        let root = tree.create("root");
        Self {
            tree,
            root,
            models: Vec::new(),
            lights: Vec::new(),
            cameras: Vec::new(),
            renderer: MeshRenderer::new(ClearState::from_config(&config.clear)),
            frame: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tree(&self) -> &TransformTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut TransformTree {
        &mut self.tree
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn model_mut(&mut self, node: NodeId) -> Option<&mut Model> {
        self.models.iter_mut().find(|m| m.node() == node)
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn camera_mut(&mut self, node: NodeId) -> Option<&mut Camera> {
        self.cameras.iter_mut().find(|c| c.node() == node)
    }

    pub fn renderer(&self) -> &MeshRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut MeshRenderer {
        &mut self.renderer
    }

    /// Frames completed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    // --- Registration ---

    /// Create a node named `name` under `parent`, which must be in the scene.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
    ) -> Result<NodeId, SceneError> {
        self.ensure_node(parent)?;
        let id = self.tree.create(name);
        self.tree.add(parent, id)?;
        Ok(id)
    }

    /// The node exists and hangs below the root, so `update` reaches it.
    fn ensure_node(&self, node: NodeId) -> Result<(), SceneError> {
        if !self.tree.contains(node) {
            return Err(SpatialError::NodeNotFound(node).into());
        }
        if self.tree.root_of(node) != self.root {
            return Err(SceneError::Detached(node));
        }
        Ok(())
    }

    pub fn add_model(&mut self, model: Model) -> Result<(), SceneError> {
        self.ensure_node(model.node())?;
        if self.models.iter().any(|m| m.node() == model.node()) {
            return Err(SceneError::DuplicateModel(model.node()));
        }
        self.models.push(model);
        Ok(())
    }

    pub fn add_light(&mut self, light: Light) -> Result<(), SceneError> {
        self.ensure_node(light.node)?;
        self.lights.push(light);
        Ok(())
    }

    /// Cameras run in registration order; the last one's projection sticks.
    pub fn add_camera(&mut self, camera: Camera) -> Result<(), SceneError> {
        self.ensure_node(camera.node())?;
        self.cameras.push(camera);
        Ok(())
    }

    /// Remove `id` and its subtree along with every behavior attached to them.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Vec<NodeId>, SceneError> {
        if id == self.root {
            return Err(SceneError::RootRemoval);
        }
        let removed = self.tree.remove(id)?;
        let gone: BTreeSet<NodeId> = removed.iter().copied().collect();
        self.models.retain(|m| !gone.contains(&m.node()));
        self.lights.retain(|l| !gone.contains(&l.node));
        self.cameras.retain(|c| !gone.contains(&c.node()));
        Ok(removed)
    }

    // --- Frame ---

    /// Run one frame: transforms, behaviors, cameras, draws, then the store
    /// checkpoint.
    pub fn update(&mut self, backend: &mut dyn GpuBackend) -> Result<FrameStats, SceneError> {
        let _span = tracing::info_span!("scene_update", frame = self.frame).entered();

        self.tree.update(self.root)?;
        for model in &mut self.models {
            model.run()?;
        }
        for camera in &mut self.cameras {
            camera.run(&mut self.tree)?;
        }

        let ctx = FrameContext {
            tree: &self.tree,
            lights: &self.lights,
        };
        let stats = self.renderer.run(backend, &ctx, &mut self.models)?;

        for model in &mut self.models {
            model.flush();
        }
        for camera in &mut self.cameras {
            camera.flush();
        }
        self.frame += 1;
        tracing::debug!(frame = self.frame, %stats, "frame complete");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use trellis_common::math::safe_inverse;
    use trellis_render::{
        DiffuseOptions, Geometry, GpuCommand, LinesOptions, Material, Mesh, RecordingBackend,
        UniformValue,
    };
    use trellis_spatial::TransformEvent;

    fn cube_model(node: NodeId) -> Model {
        Model::builder(node)
            .mesh(Mesh::new(Geometry::cube(1.0)).unwrap())
            .material(Material::diffuse(DiffuseOptions::default()))
            .build()
            .unwrap()
    }

    fn scene() -> Scene {
        Scene::new(&SceneConfig::default(), IdGenerator::new())
    }

    #[test]
    fn new_scene_has_named_root() {
        let s = scene();
        assert_eq!(s.tree().get(s.root()).unwrap().name(), "root");
        assert_eq!(s.frame(), 0);
    }

    #[test]
    fn registries_require_live_nodes() {
        let mut s = scene();
        let err = s.add_model(cube_model(NodeId(42))).unwrap_err();
        assert_eq!(err, SceneError::Spatial(SpatialError::NodeNotFound(NodeId(42))));
        assert!(s.add_light(Light::directional(NodeId(42), 1.0)).is_err());
        assert!(s.add_camera(Camera::perspective(NodeId(42))).is_err());
        assert!(s.add_node(NodeId(42), "orphan").is_err());

        let node = s.add_node(s.root(), "cube").unwrap();
        s.add_model(cube_model(node)).unwrap();
        assert_eq!(
            s.add_model(cube_model(node)),
            Err(SceneError::DuplicateModel(node))
        );
    }

    #[test]
    fn registries_reject_detached_nodes() {
        let mut s = scene();
        let loose = s.tree_mut().create("loose");
        s.tree_mut().set_position(loose, Vec3::new(5.0, 0.0, 0.0)).unwrap();
        assert_eq!(
            s.add_model(cube_model(loose)),
            Err(SceneError::Detached(loose))
        );
        assert_eq!(
            s.add_light(Light::directional(loose, 1.0)),
            Err(SceneError::Detached(loose))
        );
        assert_eq!(
            s.add_camera(Camera::perspective(loose)),
            Err(SceneError::Detached(loose))
        );
        assert_eq!(s.add_node(loose, "child"), Err(SceneError::Detached(loose)));

        let root = s.root();
        s.tree_mut().add(root, loose).unwrap();
        s.add_model(cube_model(loose)).unwrap();
        let mut gpu = RecordingBackend::new();
        s.update(&mut gpu).unwrap();
        let p = s.tree().world_position(loose).unwrap();
        assert!(p.abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), 1e-6), "{p:?}");
    }

    #[test]
    fn swapped_material_compiles_on_next_frame() {
        let mut s = scene();
        let node = s.add_node(s.root(), "cube").unwrap();
        s.add_model(cube_model(node)).unwrap();
        let mut gpu = RecordingBackend::new();
        s.update(&mut gpu).unwrap();

        let model = s.model_mut(node).unwrap();
        assert!(model.set_color([0.0, 0.0, 1.0, 1.0]));
        let revision = model.revision();
        s.update(&mut gpu).unwrap();
        assert_eq!(gpu.program_count(), 1);
        assert_eq!(s.models()[0].revision(), revision);

        let model = s.model_mut(node).unwrap();
        model.set_material(Some(Material::lines(LinesOptions::default())));
        let stats = s.update(&mut gpu).unwrap();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(gpu.program_count(), 2);
        assert!(s.models()[0].material().unwrap().is_compiled());
    }

    #[test]
    fn frame_propagates_and_draws() {
        let mut s = scene();
        let parent = s.add_node(s.root(), "parent").unwrap();
        let child = s.add_node(parent, "child").unwrap();
        s.tree_mut().translate(parent, Vec3::new(0.0, 1.0, 0.0)).unwrap();
        s.tree_mut().translate(child, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        s.add_model(cube_model(child)).unwrap();
        let sun = s.add_node(s.root(), "sun").unwrap();
        s.add_light(Light::directional(sun, 1.0)).unwrap();

        let mut gpu = RecordingBackend::new();
        let stats = s.update(&mut gpu).unwrap();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(s.frame(), 1);
        let p = s.tree().world_position(child).unwrap();
        assert!(p.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6), "{p:?}");

        let light_upload = gpu.commands().iter().find_map(|c| match c {
            GpuCommand::UploadUniform {
                value: UniformValue::Vec3(v),
                ..
            } => Some(*v),
            _ => None,
        });
        assert!(light_upload.unwrap().abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn orthographic_camera_projects_every_other_node() {
        let mut s = scene();
        let a = s.add_node(s.root(), "a").unwrap();
        let b = s.add_node(a, "b").unwrap();
        let cam = s.add_node(s.root(), "camera").unwrap();
        s.tree_mut().translate(a, Vec3::new(2.0, 0.0, 0.0)).unwrap();
        s.tree_mut().translate(b, Vec3::new(0.0, 0.0, -3.0)).unwrap();
        s.tree_mut().translate(cam, Vec3::new(0.0, 0.0, 5.0)).unwrap();
        s.add_camera(Camera::orthographic(cam)).unwrap();

        let mut gpu = RecordingBackend::new();
        s.update(&mut gpu).unwrap();

        let tree = s.tree();
        let view = safe_inverse(&tree.get(cam).unwrap().matrix_world());
        for id in [s.root(), a, b] {
            let node = tree.get(id).unwrap();
            assert_eq!(node.projection(), view * node.matrix_world());
        }
        assert_eq!(tree.get(cam).unwrap().projection(), Mat4::IDENTITY);
    }

    #[test]
    fn model_without_mesh_issues_no_gpu_calls() {
        let mut s = scene();
        let node = s.add_node(s.root(), "empty").unwrap();
        let mut model = cube_model(node);
        model.set_mesh(None);
        s.add_model(model).unwrap();
        let mut config = SceneConfig::default();
        config.clear.color = None;
        config.clear.depth = None;
        *s.renderer_mut().clear_state_mut() = ClearState::from_config(&config.clear);

        let mut gpu = RecordingBackend::new();
        let stats = s.update(&mut gpu).unwrap();
        assert_eq!(stats.skipped, 1);
        assert!(gpu.commands().is_empty());
    }

    #[test]
    fn removal_prunes_registries_and_cache() {
        let mut s = scene();
        let group = s.add_node(s.root(), "group").unwrap();
        let cube = s.add_node(group, "cube").unwrap();
        let lamp = s.add_node(group, "lamp").unwrap();
        let keep = s.add_node(s.root(), "keep").unwrap();
        s.add_model(cube_model(cube)).unwrap();
        s.add_model(cube_model(keep)).unwrap();
        s.add_light(Light::point(lamp, 1.0, 10.0)).unwrap();

        let mut gpu = RecordingBackend::new();
        s.update(&mut gpu).unwrap();
        assert_eq!(s.renderer().factory().cached(), 2);

        let removed = s.remove_node(group).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(s.models().len(), 1);
        assert!(s.lights().is_empty());

        let stats = s.update(&mut gpu).unwrap();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(s.renderer().factory().cached(), 1);
        assert_eq!(s.remove_node(s.root()), Err(SceneError::RootRemoval));
    }

    #[test]
    fn frames_reuse_programs_and_vertex_arrays() {
        let mut s = scene();
        for name in ["a", "b"] {
            let node = s.add_node(s.root(), name).unwrap();
            s.add_model(cube_model(node)).unwrap();
        }
        let lines = s.add_node(s.root(), "lines").unwrap();
        s.add_model(
            Model::builder(lines)
                .mesh(Mesh::new(Geometry::line_strip(&[Vec3::ZERO, Vec3::X])).unwrap())
                .material(Material::lines(LinesOptions::default()))
                .build()
                .unwrap(),
        )
        .unwrap();

        let mut gpu = RecordingBackend::new();
        for _ in 0..4 {
            s.update(&mut gpu).unwrap();
        }
        assert_eq!(gpu.program_count(), 3);
        assert_eq!(gpu.vertex_array_count(), 3);
        assert_eq!(gpu.count(GpuCommand::is_draw), 12);
        assert_eq!(gpu.count(|c| matches!(c, GpuCommand::Clear { .. })), 4);
    }

    #[test]
    fn perspective_lens_changes_apply_next_frame() {
        let mut s = scene();
        let cube = s.add_node(s.root(), "cube").unwrap();
        let cam = s.add_node(s.root(), "camera").unwrap();
        s.tree_mut().translate(cam, Vec3::new(0.0, 0.0, 10.0)).unwrap();
        s.add_model(cube_model(cube)).unwrap();
        s.add_camera(Camera::perspective(cam)).unwrap();

        let mut gpu = RecordingBackend::new();
        s.update(&mut gpu).unwrap();
        let before = s.tree().get(cube).unwrap().projection();

        s.camera_mut(cam).unwrap().set_fov(90.0).unwrap();
        s.update(&mut gpu).unwrap();
        let after = s.tree().get(cube).unwrap().projection();
        assert_ne!(before, after);
    }

    #[test]
    fn transform_events_follow_config() {
        let config = SceneConfig {
            record_transform_events: true,
            ..Default::default()
        };
        let mut s = Scene::new(&config, IdGenerator::new());
        let root = s.root();
        let mut gpu = RecordingBackend::new();
        s.update(&mut gpu).unwrap();
        assert_eq!(
            s.tree_mut().drain_events(),
            vec![TransformEvent::WillUpdate(root), TransformEvent::DidUpdate(root)]
        );

        let mut quiet = scene();
        quiet.update(&mut gpu).unwrap();
        assert!(quiet.tree().events().is_empty());
    }
}
