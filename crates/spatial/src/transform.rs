use std::collections::{BTreeMap, HashSet};

use glam::{EulerRot, Mat4, Quat, Vec3};
use trellis_common::math::{self, extract_rotation, extract_translation};
use trellis_common::{IdGenerator, NodeId};
use trellis_store::StoreError;

/// Errors from hierarchy operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpatialError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("cannot parent node {0} to itself")]
    SelfParent(NodeId),
    #[error("adding {child} under {parent} would create a cycle")]
    CycleDetected { parent: NodeId, child: NodeId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Notifications emitted around a local matrix recompose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformEvent {
    WillUpdate(NodeId),
    DidUpdate(NodeId),
}

/// A point in the spatial hierarchy: local SRT plus cached derived matrices.
#[derive(Debug, Clone)]
pub struct TransformNode {
    id: NodeId,
    name: String,
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    matrix: Mat4,
    matrix_world: Mat4,
    projection: Mat4,
    matrix_world_needs_update: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl TransformNode {
    fn new(id: NodeId, name: String) -> Self {
        Self {
            id,
            name,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            matrix: Mat4::IDENTITY,
            matrix_world: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            matrix_world_needs_update: true,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Local matrix as of the last `update_matrix`.
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    pub fn matrix_world(&self) -> Mat4 {
        self.matrix_world
    }

    /// World-projection matrix pushed down by the active camera.
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn needs_update(&self) -> bool {
        self.matrix_world_needs_update
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Compare every position, rotation and scale component.
    pub fn same_pose(&self, other: &TransformNode) -> bool {
        self.position == other.position
            && self.rotation == other.rotation
            && self.scale == other.scale
    }
}

enum Visit {
    Enter(NodeId),
    Exit(NodeId),
}

/// Arena owning every transform node.
///
/// # Invariants
/// - `world = parent.world * local`, or `local` for a node without parent,
///   after each `update` pass.
/// - The parent graph is acyclic: `add` refuses links that would close a loop.
/// - A node appears in at most one children list.
#[derive(Debug, Default)]
pub struct TransformTree {
    nodes: BTreeMap<NodeId, TransformNode>,
    ids: IdGenerator,
    events: Vec<TransformEvent>,
    record_events: bool,
}

impl TransformTree {
    pub fn new(ids: IdGenerator) -> Self {
        Self {
            nodes: BTreeMap::new(),
            ids,
            events: Vec::new(),
            record_events: false,
        }
    }

    /// Create a detached node with an identity pose.
    pub fn create(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.ids.next_id();
        self.nodes.insert(id, TransformNode::new(id, name.into()));
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&TransformNode> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut TransformNode, SpatialError> {
        self.nodes.get_mut(&id).ok_or(SpatialError::NodeNotFound(id))
    }

    fn ensure(&self, id: NodeId) -> Result<(), SpatialError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(SpatialError::NodeNotFound(id))
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            if out.contains(&p) || out.len() > self.nodes.len() {
                break;
            }
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Topmost ancestor of `id`, or `id` itself when it has no parent.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// `root` and everything below it, depth-first pre-order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        self.nodes
            .get(&id)
            .map(|n| extract_translation(&n.matrix_world))
    }

    // --- Structure ---

    /// Attach `child` under `parent`, detaching it from any previous parent.
    pub fn add(&mut self, parent: NodeId, child: NodeId) -> Result<(), SpatialError> {
        self.ensure(parent)?;
        self.ensure(child)?;
        if parent == child {
            return Err(SpatialError::SelfParent(child));
        }
        if self.ancestors(parent).contains(&child) {
            return Err(SpatialError::CycleDetected { parent, child });
        }

        if let Some(old) = self.parent(child) {
            if let Some(old_parent) = self.nodes.get_mut(&old) {
                old_parent.children.retain(|c| *c != child);
            }
        }
        self.node_mut(parent)?.children.push(child);
        let node = self.node_mut(child)?;
        node.parent = Some(parent);
        node.matrix_world_needs_update = true;
        Ok(())
    }

    /// Detach `id` from its parent and drop its whole subtree.
    /// Returns the removed ids, `id` first.
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<NodeId>, SpatialError> {
        self.ensure(id)?;
        if let Some(parent) = self.parent(id) {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != id);
            }
        }
        let removed = self.descendants(id);
        for r in &removed {
            self.nodes.remove(r);
        }
        tracing::debug!(node = %id, count = removed.len(), "removed subtree");
        Ok(removed)
    }

    // --- Pose ---

    pub fn translate(&mut self, id: NodeId, delta: Vec3) -> Result<(), SpatialError> {
        let node = self.node_mut(id)?;
        node.position += delta;
        node.matrix_world_needs_update = true;
        Ok(())
    }

    /// Pre-multiply an XYZ euler delta (radians) onto the current rotation.
    pub fn rotate(&mut self, id: NodeId, euler_delta: Vec3) -> Result<(), SpatialError> {
        let delta = Quat::from_euler(EulerRot::XYZ, euler_delta.x, euler_delta.y, euler_delta.z);
        let node = self.node_mut(id)?;
        node.rotation = (delta * node.rotation).normalize();
        node.matrix_world_needs_update = true;
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<(), SpatialError> {
        let node = self.node_mut(id)?;
        node.position = position;
        node.matrix_world_needs_update = true;
        Ok(())
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<(), SpatialError> {
        let node = self.node_mut(id)?;
        node.rotation = rotation;
        node.matrix_world_needs_update = true;
        Ok(())
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> Result<(), SpatialError> {
        let node = self.node_mut(id)?;
        node.scale = scale;
        node.matrix_world_needs_update = true;
        Ok(())
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), SpatialError> {
        self.node_mut(id)?.name = name.into();
        Ok(())
    }

    /// Turn the node so its -Z axis faces `target` (world space, +Y up).
    pub fn look_at(&mut self, id: NodeId, target: Vec3) -> Result<(), SpatialError> {
        self.ensure(id)?;
        self.refresh_local(id);

        let parent_world = self
            .parent(id)
            .and_then(|p| self.nodes.get(&p))
            .map(|p| p.matrix_world);
        let node = self.node_mut(id)?;
        let world = parent_world.map_or(node.matrix, |pw| pw * node.matrix);
        let eye = extract_translation(&world);

        let mut rotation = math::look_rotation(eye, target, Vec3::Y);
        if let Some(pw) = parent_world {
            rotation = extract_rotation(&pw).inverse() * rotation;
        }
        node.rotation = rotation.normalize();
        node.matrix_world_needs_update = true;
        Ok(())
    }

    // --- Matrices ---

    /// Recompose the local matrix from position, rotation and scale.
    pub fn update_matrix(&mut self, id: NodeId) -> Result<(), SpatialError> {
        self.ensure(id)?;
        self.refresh_local(id);
        Ok(())
    }

    /// Recompute the world matrix if dirty or forced. Returns whether it did.
    pub fn update_matrix_world(&mut self, id: NodeId, force: bool) -> Result<bool, SpatialError> {
        self.ensure(id)?;
        Ok(self.refresh_world(id, force))
    }

    fn refresh_local(&mut self, id: NodeId) {
        if self.record_events {
            self.events.push(TransformEvent::WillUpdate(id));
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.matrix = math::compose(node.position, node.rotation, node.scale);
            node.matrix_world_needs_update = true;
        }
        if self.record_events {
            self.events.push(TransformEvent::DidUpdate(id));
        }
    }

    fn refresh_world(&mut self, id: NodeId, force: bool) -> bool {
        let parent_world = self
            .parent(id)
            .and_then(|p| self.nodes.get(&p))
            .map(|p| p.matrix_world);
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if !(node.matrix_world_needs_update || force) {
            return false;
        }
        node.matrix_world = parent_world.map_or(node.matrix, |pw| pw * node.matrix);
        node.matrix_world_needs_update = false;
        true
    }

    /// Store `matrix * world` as the node's world-projection matrix.
    pub fn apply_projection(&mut self, id: NodeId, matrix: Mat4) -> Result<(), SpatialError> {
        self.ensure(id)?;
        self.project(id, matrix);
        Ok(())
    }

    pub(crate) fn project(&mut self, id: NodeId, matrix: Mat4) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.projection = matrix * node.matrix_world;
        }
    }

    // --- Traversal ---

    /// Depth-first walk from `root`: `on_enter` before a node's children,
    /// `on_exit` after them.
    ///
    /// Each node is visited at most once per call. `add` keeps the graph
    /// acyclic, so a repeat visit is reported and skipped.
    pub fn traverse<F, G>(
        &mut self,
        root: NodeId,
        mut on_enter: F,
        mut on_exit: G,
    ) -> Result<(), SpatialError>
    where
        F: FnMut(&mut TransformTree, NodeId),
        G: FnMut(&mut TransformTree, NodeId),
    {
        self.ensure(root)?;
        let mut visited = HashSet::new();
        let mut stack = vec![Visit::Enter(root)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    let first_visit = visited.insert(id);
                    debug_assert!(first_visit, "transform hierarchy contains a cycle at {id}");
                    if !first_visit {
                        tracing::warn!(node = %id, "node reached twice during traversal");
                        continue;
                    }
                    on_enter(self, id);
                    stack.push(Visit::Exit(id));
                    if let Some(node) = self.nodes.get(&id) {
                        stack.extend(node.children.iter().rev().map(|c| Visit::Enter(*c)));
                    }
                }
                Visit::Exit(id) => on_exit(self, id),
            }
        }
        Ok(())
    }

    /// Per-frame pass: refresh local then world matrices, parent before child.
    ///
    /// A node whose world matrix was recomputed forces its children, so a
    /// moved parent always carries its subtree along.
    pub fn update(&mut self, root: NodeId) -> Result<(), SpatialError> {
        let mut recomputed: HashSet<NodeId> = HashSet::new();
        self.traverse(
            root,
            |tree, id| {
                tree.refresh_local(id);
                let force = tree.parent(id).is_some_and(|p| recomputed.contains(&p));
                if tree.refresh_world(id, force) {
                    recomputed.insert(id);
                }
            },
            |_, _| {},
        )
    }

    // --- Events ---

    /// Record `WillUpdate`/`DidUpdate` notifications until drained.
    pub fn set_record_events(&mut self, record: bool) {
        self.record_events = record;
    }

    pub fn events(&self) -> &[TransformEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<TransformEvent> {
        std::mem::take(&mut self.events)
    }
}
