use glam::Vec3;
use serde::{Deserialize, Serialize};
use trellis_common::NodeId;
use trellis_common::math::{extract_translation, safe_normalize};

use crate::transform::{SpatialError, TransformTree};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    /// Parallel rays along the light node's world -Z.
    Directional,
    /// Rays from the light position; `range` of 0 means no falloff.
    Point { range: f32 },
}

/// Light attached to a transform node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub node: NodeId,
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn directional(node: NodeId, intensity: f32) -> Self {
        Self {
            node,
            kind: LightKind::Directional,
            color: Vec3::ONE,
            intensity,
        }
    }

    pub fn point(node: NodeId, intensity: f32, range: f32) -> Self {
        Self {
            node,
            kind: LightKind::Point { range },
            color: Vec3::ONE,
            intensity,
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    /// Direction of a directional light's rays, or the point light's forward axis.
    pub fn direction(&self, tree: &TransformTree) -> Result<Vec3, SpatialError> {
        let world = tree
            .get(self.node)
            .ok_or(SpatialError::NodeNotFound(self.node))?
            .matrix_world();
        Ok(safe_normalize(world.transform_vector3(Vec3::NEG_Z)))
    }

    /// Direction of the light's rays toward `target` (world space, unit length).
    pub fn direction_to(&self, tree: &TransformTree, target: Vec3) -> Result<Vec3, SpatialError> {
        let world = tree
            .get(self.node)
            .ok_or(SpatialError::NodeNotFound(self.node))?
            .matrix_world();
        Ok(match self.kind {
            LightKind::Directional => safe_normalize(world.transform_vector3(Vec3::NEG_Z)),
            LightKind::Point { .. } => safe_normalize(target - extract_translation(&world)),
        })
    }

    /// Intensity reaching `target`.
    pub fn intensity_at(&self, tree: &TransformTree, target: Vec3) -> Result<f32, SpatialError> {
        let position = tree
            .world_position(self.node)
            .ok_or(SpatialError::NodeNotFound(self.node))?;
        Ok(match self.kind {
            LightKind::Directional => self.intensity,
            LightKind::Point { range } if range > 0.0 => {
                let falloff = (1.0 - position.distance(target) / range).max(0.0);
                self.intensity * falloff * falloff
            }
            LightKind::Point { .. } => self.intensity,
        })
    }

    /// `direction * intensity` as seen from `target`.
    pub fn contribution(&self, tree: &TransformTree, target: Vec3) -> Result<Vec3, SpatialError> {
        Ok(self.direction_to(tree, target)? * self.intensity_at(tree, target)?)
    }
}
