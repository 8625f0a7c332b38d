use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use trellis_common::{IdGenerator, NodeId};
use trellis_render::{
    DiffuseOptions, FrameStats, Geometry, LinesOptions, Material, Mesh, Model, PointsOptions,
    RecordingBackend,
};
use trellis_scene::{Scene, SceneConfig};
use trellis_spatial::{Camera, Light};

/// Demo parameters, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub scene: SceneConfig,
    pub cube: DiffuseOptions,
    pub lines: LinesOptions,
    pub points: PointsOptions,
    /// Points in the spiral point cloud.
    pub point_count: usize,
    /// Cube rotation about +Y per frame, degrees.
    pub spin_degrees: f32,
    pub light_intensity: f32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            scene: SceneConfig::default(),
            cube: DiffuseOptions {
                color: [0.8, 0.3, 0.2, 1.0],
                ..Default::default()
            },
            lines: LinesOptions::default(),
            points: PointsOptions::default(),
            point_count: 64,
            spin_degrees: 15.0,
            light_intensity: 1.0,
        }
    }
}

impl DemoConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading demo config {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing demo config {}", path.display()))
    }
}

/// Built demo scene plus the node the frame loop animates.
pub struct Demo {
    pub scene: Scene,
    pub cube: NodeId,
    spin: f32,
}

fn spiral(count: usize) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let t = i as f32 * 0.35;
            Vec3::new(t.cos() * (1.0 + t * 0.1), t * 0.05, t.sin() * (1.0 + t * 0.1))
        })
        .collect()
}

impl Demo {
    pub fn build(config: &DemoConfig, orthographic: bool) -> anyhow::Result<Self> {
        let mut scene = Scene::new(&config.scene, IdGenerator::new());
        let root = scene.root();

        let cube = scene.add_node(root, "cube")?;
        scene.add_model(
            Model::builder(cube)
                .mesh(Mesh::new(Geometry::cube(1.0))?)
                .material(Material::diffuse(config.cube))
                .build()?,
        )?;

        let axis = scene.add_node(root, "axis")?;
        scene.add_model(
            Model::builder(axis)
                .mesh(Mesh::new(Geometry::line_strip(&[
                    Vec3::new(-2.0, 0.0, 0.0),
                    Vec3::ZERO,
                    Vec3::new(0.0, 2.0, 0.0),
                ]))?)
                .material(Material::lines(config.lines))
                .build()?,
        )?;

        if config.point_count > 0 {
            let cloud = scene.add_node(root, "cloud")?;
            scene.tree_mut().set_position(cloud, Vec3::new(0.0, -1.0, 0.0))?;
            scene.add_model(
                Model::builder(cloud)
                    .mesh(Mesh::new(Geometry::points(&spiral(config.point_count)))?)
                    .material(Material::points(config.points))
                    .build()?,
            )?;
        }

        let sun = scene.add_node(root, "sun")?;
        scene.tree_mut().look_at(sun, Vec3::new(-1.0, -2.0, -1.0))?;
        scene.add_light(Light::directional(sun, config.light_intensity))?;

        let eye = scene.add_node(root, "camera")?;
        scene.tree_mut().set_position(eye, Vec3::new(3.0, 2.0, 6.0))?;
        scene.tree_mut().look_at(eye, Vec3::ZERO)?;
        let camera = if orthographic {
            Camera::orthographic(eye)
        } else {
            Camera::perspective(eye)
        };
        scene.add_camera(camera)?;

        Ok(Self {
            scene,
            cube,
            spin: config.spin_degrees.to_radians(),
        })
    }

    /// Advance the animation and render one frame.
    pub fn step(&mut self, backend: &mut RecordingBackend) -> anyhow::Result<FrameStats> {
        self.scene
            .tree_mut()
            .rotate(self.cube, Vec3::new(0.0, self.spin, 0.0))?;
        Ok(self.scene.update(backend)?)
    }
}

/// Run `frames` frames and print per-frame stats and a command summary.
pub fn run(frames: u32, orthographic: bool, config: &DemoConfig) -> anyhow::Result<()> {
    let mut demo = Demo::build(config, orthographic)?;
    let mut backend = RecordingBackend::new();
    tracing::info!(
        frames,
        orthographic,
        nodes = demo.scene.tree().len(),
        models = demo.scene.models().len(),
        "demo scene built"
    );

    let mut totals: BTreeMap<&'static str, usize> = BTreeMap::new();
    for _ in 0..frames {
        let stats = demo.step(&mut backend)?;
        for (name, count) in backend.summary() {
            *totals.entry(name).or_insert(0) += count;
        }
        let commands = backend.take_commands();
        println!(
            "frame {:>3}: {stats}, {} gpu commands",
            demo.scene.frame(),
            commands.len()
        );
    }

    println!("command summary:");
    for (name, count) in &totals {
        println!("  {name:<20} {count}");
    }
    println!("programs linked: {}", backend.program_count());
    println!("vertex arrays:   {}", backend.vertex_array_count());
    Ok(())
}
