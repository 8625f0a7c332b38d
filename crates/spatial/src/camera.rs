use glam::Mat4;
use serde::{Deserialize, Serialize};
use trellis_common::NodeId;
use trellis_common::math::safe_inverse;
use trellis_store::{Clamp, PropValue, Store, StoreError};

use crate::transform::{SpatialError, TransformTree};

const FOV: &str = "fov";
const NEAR: &str = "near";
const FAR: &str = "far";
const ZOOM: &str = "zoom";
const ASPECT: &str = "aspect";
const FOCUS: &str = "focus";
const FILM_GAUGE: &str = "filmGauge";
const FILM_OFFSET: &str = "filmOffset";
const ORTHOGRAPHIC: &str = "orthographic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionMode {
    #[default]
    Perspective,
    Orthographic,
}

/// Lens parameters as read from the camera's store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lens {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
    pub aspect: f32,
    pub focus: f32,
    /// Film size in millimetres, used for focal-length math.
    pub film_gauge: f32,
    pub film_offset: f32,
}

impl Default for Lens {
    fn default() -> Self {
        Self {
            fov: 50.0,
            near: 0.1,
            far: 2000.0,
            zoom: 1.0,
            aspect: 1.0,
            focus: 10.0,
            film_gauge: 35.0,
            film_offset: 0.0,
        }
    }
}

impl Lens {
    /// Field of view in degrees after zoom.
    pub fn effective_fov(&self) -> f32 {
        let half = (self.fov.to_radians() * 0.5).tan() / self.zoom;
        (2.0 * half.atan()).to_degrees()
    }

    pub fn film_width(&self) -> f32 {
        self.film_gauge * self.aspect.min(1.0)
    }

    pub fn film_height(&self) -> f32 {
        self.film_gauge / self.aspect.max(1.0)
    }

    /// Focal length in millimetres for the current fov and film gauge.
    pub fn focal_length(&self) -> f32 {
        0.5 * self.film_height() / (self.fov.to_radians() * 0.5).tan()
    }

    /// Perspective matrix, or `None` when the lens cannot produce a finite one
    /// (for example `near == far`).
    pub fn try_perspective(&self) -> Option<Mat4> {
        let depth = self.far - self.near;
        if !depth.is_finite() || depth.abs() <= f32::EPSILON * self.far.abs().max(1.0) {
            return None;
        }
        let fov = self.effective_fov().to_radians();
        if fov.is_nan() || fov <= 0.0 || fov >= std::f32::consts::PI {
            return None;
        }
        let m = Mat4::perspective_rh_gl(fov, self.aspect, self.near, self.far);
        m.is_finite().then_some(m)
    }

    /// Perspective matrix, falling back to identity for a degenerate lens.
    pub fn perspective(&self) -> Mat4 {
        self.try_perspective().unwrap_or_else(|| {
            tracing::warn!(
                fov = self.fov,
                near = self.near,
                far = self.far,
                "degenerate perspective lens, using identity"
            );
            Mat4::IDENTITY
        })
    }

    fn dependencies(&self) -> [PropValue; 5] {
        [self.fov, self.zoom, self.aspect, self.near, self.far].map(PropValue::Scalar)
    }
}

/// Declare every lens prop on `store` and read back the live values.
fn declare_lens(store: &mut Store) -> Lens {
    let d = Lens::default();
    let mut scalar = |name: &str, initial: f32, clamp: Clamp| {
        store
            .declare_prop(name, initial, Some(clamp))
            .as_scalar()
            .unwrap_or(initial)
    };
    Lens {
        fov: scalar(FOV, d.fov, Clamp::range(1.0, 179.0)),
        near: scalar(NEAR, d.near, Clamp::at_least(1e-4)),
        far: scalar(FAR, d.far, Clamp::at_least(1e-3)),
        zoom: scalar(ZOOM, d.zoom, Clamp::at_least(1e-3)),
        aspect: scalar(ASPECT, d.aspect, Clamp::at_least(1e-4)),
        focus: scalar(FOCUS, d.focus, Clamp::at_least(0.0)),
        film_gauge: scalar(FILM_GAUGE, d.film_gauge, Clamp::at_least(1.0)),
        film_offset: scalar(FILM_OFFSET, d.film_offset, Clamp::range(f32::MIN, f32::MAX)),
    }
}

/// Camera attached to a transform node.
///
/// `run` computes a view-projection matrix and pushes it to every other node
/// of the camera's tree. With several cameras, the last one to run wins.
#[derive(Debug)]
pub struct Camera {
    node: NodeId,
    store: Store,
}

impl Camera {
    pub fn new(node: NodeId, mode: ProjectionMode) -> Self {
        let mut store = Store::new();
        declare_lens(&mut store);
        store.declare_prop(ORTHOGRAPHIC, mode == ProjectionMode::Orthographic, None);
        Self { node, store }
    }

    pub fn perspective(node: NodeId) -> Self {
        Self::new(node, ProjectionMode::Perspective)
    }

    pub fn orthographic(node: NodeId) -> Self {
        Self::new(node, ProjectionMode::Orthographic)
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn mode(&self) -> ProjectionMode {
        match self.store.prop(ORTHOGRAPHIC).and_then(PropValue::as_flag) {
            Some(true) => ProjectionMode::Orthographic,
            _ => ProjectionMode::Perspective,
        }
    }

    pub fn set_mode(&mut self, mode: ProjectionMode) -> Result<(), StoreError> {
        self.store
            .set_prop(ORTHOGRAPHIC, mode == ProjectionMode::Orthographic)?;
        Ok(())
    }

    /// Current lens values. Props missing from the store read as defaults.
    pub fn lens(&self) -> Lens {
        let d = Lens::default();
        let read = |name: &str, fallback: f32| self.store.scalar(name).unwrap_or(fallback);
        Lens {
            fov: read(FOV, d.fov),
            near: read(NEAR, d.near),
            far: read(FAR, d.far),
            zoom: read(ZOOM, d.zoom),
            aspect: read(ASPECT, d.aspect),
            focus: read(FOCUS, d.focus),
            film_gauge: read(FILM_GAUGE, d.film_gauge),
            film_offset: read(FILM_OFFSET, d.film_offset),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    fn set_scalar(&mut self, name: &str, value: f32) -> Result<f32, StoreError> {
        let stored = self.store.set_prop(name, value)?;
        Ok(stored.as_scalar().unwrap_or(value))
    }

    pub fn set_fov(&mut self, degrees: f32) -> Result<f32, StoreError> {
        self.set_scalar(FOV, degrees)
    }

    pub fn set_near(&mut self, near: f32) -> Result<f32, StoreError> {
        self.set_scalar(NEAR, near)
    }

    pub fn set_far(&mut self, far: f32) -> Result<f32, StoreError> {
        self.set_scalar(FAR, far)
    }

    pub fn set_zoom(&mut self, zoom: f32) -> Result<f32, StoreError> {
        self.set_scalar(ZOOM, zoom)
    }

    pub fn set_aspect(&mut self, aspect: f32) -> Result<f32, StoreError> {
        self.set_scalar(ASPECT, aspect)
    }

    pub fn set_focus(&mut self, focus: f32) -> Result<f32, StoreError> {
        self.set_scalar(FOCUS, focus)
    }

    pub fn set_film_gauge(&mut self, gauge: f32) -> Result<f32, StoreError> {
        self.set_scalar(FILM_GAUGE, gauge)
    }

    pub fn set_film_offset(&mut self, offset: f32) -> Result<f32, StoreError> {
        self.set_scalar(FILM_OFFSET, offset)
    }

    /// View-projection matrix for the current lens and camera pose.
    ///
    /// Orthographic mode uses the inverse camera world matrix alone. The
    /// perspective matrix is cached in a state slot and rebuilt only when the
    /// lens dependencies change. A degenerate lens keeps the last good matrix.
    pub fn projection_matrix(&mut self, tree: &TransformTree) -> Result<Mat4, SpatialError> {
        self.store.reset();
        let lens = declare_lens(&mut self.store);
        let camera_world = tree
            .get(self.node)
            .ok_or(SpatialError::NodeNotFound(self.node))?
            .matrix_world();
        let view = safe_inverse(&camera_world);

        let cached = self.store.state(|| lens.perspective());
        if self.store.effect(&lens.dependencies()).is_changed() {
            match lens.try_perspective() {
                Some(perspective) => self.store.set(cached, perspective)?,
                None => tracing::warn!(
                    camera = %self.node,
                    near = lens.near,
                    far = lens.far,
                    "degenerate perspective lens, keeping previous projection"
                ),
            }
        }

        Ok(match self.mode() {
            ProjectionMode::Orthographic => view,
            ProjectionMode::Perspective => *self.store.get::<Mat4>(cached)? * view,
        })
    }

    /// Compute the projection and apply it to every other node of the tree.
    pub fn run(&mut self, tree: &mut TransformTree) -> Result<Mat4, SpatialError> {
        let projection = self.projection_matrix(tree)?;
        let own = self.node;
        let root = tree.root_of(own);
        tree.traverse(
            root,
            |t, id| {
                if id != own {
                    t.project(id, projection);
                }
            },
            |_, _| {},
        )?;
        tracing::trace!(camera = %own, mode = ?self.mode(), "projection distributed");
        Ok(projection)
    }

    /// Commit deferred effect writes; called once the frame's work is done.
    pub fn flush(&mut self) {
        self.store.flush();
    }
}
