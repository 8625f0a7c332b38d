use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use trellis_common::math::MathError;
use trellis_store::{SlotKey, Store, StoreError};

use crate::backend::{BufferHandle, BufferKind, GpuBackend, IndexWidth, Primitive};
use crate::error::RenderError;

const MESH_SLOT: &str = "mesh";

/// Raw vertex data before packing. Positions and normals are xyz triples,
/// uvs are uv pairs; `indices` may be empty for non-indexed draws.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    pub indices: Vec<u32>,
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
}

impl Geometry {
    /// Axis-aligned cube centred on the origin, four vertices per face.
    pub fn cube(size: f32) -> Self {
        let p = size * 0.5;
        #[rustfmt::skip]
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0],  [[-p, -p,  p], [ p, -p,  p], [ p,  p,  p], [-p,  p,  p]]),
            ([0.0, 0.0, -1.0], [[ p, -p, -p], [-p, -p, -p], [-p,  p, -p], [ p,  p, -p]]),
            ([1.0, 0.0, 0.0],  [[ p, -p,  p], [ p, -p, -p], [ p,  p, -p], [ p,  p,  p]]),
            ([-1.0, 0.0, 0.0], [[-p, -p, -p], [-p, -p,  p], [-p,  p,  p], [-p,  p, -p]]),
            ([0.0, 1.0, 0.0],  [[-p,  p,  p], [ p,  p,  p], [ p,  p, -p], [-p,  p, -p]]),
            ([0.0, -1.0, 0.0], [[-p, -p, -p], [ p, -p, -p], [ p, -p,  p], [-p, -p,  p]]),
        ];

        let mut geometry = Geometry::default();
        for (face, (normal, corners)) in faces.iter().enumerate() {
            let base = face as u32 * 4;
            for corner in corners {
                geometry.vertices.extend_from_slice(corner);
                geometry.normals.extend_from_slice(normal);
            }
            geometry
                .uvs
                .extend_from_slice(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
            geometry
                .indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        geometry
    }

    /// Square in the XY plane facing +Z.
    pub fn plane(size: f32) -> Self {
        let p = size * 0.5;
        Geometry {
            indices: vec![0, 1, 2, 2, 3, 0],
            vertices: vec![-p, -p, 0.0, p, -p, 0.0, p, p, 0.0, -p, p, 0.0],
            normals: [0.0, 0.0, 1.0].repeat(4),
            uvs: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
        }
    }

    /// Connected segments through `points`, indexed as line pairs.
    pub fn line_strip(points: &[Vec3]) -> Self {
        let indices = (1..points.len() as u32).flat_map(|i| [i - 1, i]).collect();
        Geometry {
            indices,
            vertices: positions(points),
            ..Default::default()
        }
    }

    /// Unindexed point cloud.
    pub fn points(points: &[Vec3]) -> Self {
        Geometry {
            vertices: positions(points),
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

fn positions(points: &[Vec3]) -> Vec<f32> {
    points.iter().flat_map(|p| p.to_array()).collect()
}

/// Index data at the narrowest width that holds every index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    /// Pick the width from the largest index: anything above `u16::MAX`
    /// needs 32 bits.
    pub fn from_indices(indices: &[u32]) -> Self {
        let narrow: Option<Vec<u16>> = indices.iter().map(|&i| u16::try_from(i).ok()).collect();
        match narrow {
            Some(narrow) => Self::U16(narrow),
            None => Self::U32(indices.to_vec()),
        }
    }

    pub fn width(&self) -> IndexWidth {
        match self {
            Self::U16(_) => IndexWidth::U16,
            Self::U32(_) => IndexWidth::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// One interleaving-free vertex attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferAttribute {
    pub name: String,
    pub data: Vec<f32>,
    /// Components per vertex.
    pub stride: usize,
}

impl BufferAttribute {
    pub fn new(name: impl Into<String>, data: Vec<f32>, stride: usize) -> Self {
        Self {
            name: name.into(),
            data,
            stride,
        }
    }

    pub fn count(&self) -> usize {
        self.data.len() / self.stride.max(1)
    }

    pub fn get(&self, vertex: usize, component: usize) -> Result<f32, RenderError> {
        if component >= self.stride {
            return Err(MathError::ComponentOutOfRange {
                index: component,
                len: self.stride,
            }
            .into());
        }
        self.data
            .get(vertex * self.stride + component)
            .copied()
            .ok_or(RenderError::VertexOutOfRange {
                vertex,
                count: self.count(),
            })
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

/// Validated geometry laid out as GPU-ready buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedMesh {
    pub index: Option<IndexBuffer>,
    pub attributes: Vec<BufferAttribute>,
    pub vertex_count: usize,
}

impl PackedMesh {
    pub fn attribute(&self, name: &str) -> Option<&BufferAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

pub fn pack_mesh(geometry: &Geometry) -> Result<PackedMesh, RenderError> {
    let invalid = |msg: String| -> Result<PackedMesh, RenderError> {
        Err(RenderError::InvalidGeometry(msg))
    };
    if geometry.vertices.is_empty() {
        return invalid("no vertices".into());
    }
    if geometry.vertices.len() % 3 != 0 {
        return invalid(format!(
            "{} position floats is not a multiple of 3",
            geometry.vertices.len()
        ));
    }
    let count = geometry.vertex_count();
    if !geometry.normals.is_empty() && geometry.normals.len() != count * 3 {
        return invalid(format!(
            "{} normal floats for {count} vertices",
            geometry.normals.len()
        ));
    }
    if !geometry.uvs.is_empty() && geometry.uvs.len() != count * 2 {
        return invalid(format!("{} uv floats for {count} vertices", geometry.uvs.len()));
    }
    if let Some(&bad) = geometry.indices.iter().find(|&&i| i as usize >= count) {
        return invalid(format!("index {bad} out of range for {count} vertices"));
    }

    let mut attributes = vec![BufferAttribute::new("position", geometry.vertices.clone(), 3)];
    if !geometry.normals.is_empty() {
        attributes.push(BufferAttribute::new("normal", geometry.normals.clone(), 3));
    }
    if !geometry.uvs.is_empty() {
        attributes.push(BufferAttribute::new("uv", geometry.uvs.clone(), 2));
    }
    let index = (!geometry.indices.is_empty()).then(|| IndexBuffer::from_indices(&geometry.indices));

    Ok(PackedMesh {
        index,
        attributes,
        vertex_count: count,
    })
}

/// How a bound mesh is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeshDraw {
    Indexed {
        count: u32,
        width: IndexWidth,
        buffer: BufferHandle,
    },
    Arrays {
        count: u32,
    },
}

impl MeshDraw {
    pub fn draw(&self, backend: &mut dyn GpuBackend, primitive: Primitive) {
        match *self {
            Self::Indexed { count, width, .. } => backend.draw_elements(primitive, count, width, 0),
            Self::Arrays { count } => backend.draw_arrays(primitive, 0, count),
        }
    }
}

/// Mesh behavior: owns packed geometry and binds it into a vertex array.
#[derive(Debug, Clone)]
pub struct Mesh {
    packed: Arc<PackedMesh>,
}

impl Mesh {
    pub fn new(geometry: Geometry) -> Result<Self, RenderError> {
        Ok(Self {
            packed: Arc::new(pack_mesh(&geometry)?),
        })
    }

    pub fn packed(&self) -> &PackedMesh {
        &self.packed
    }

    /// Park the packed mesh in the host store under a fixed key.
    ///
    /// A store that still holds another mesh (after a swap) is overwritten.
    pub fn run(&self, store: &mut Store) -> Result<SlotKey, StoreError> {
        let slot = store.keyed_state(MESH_SLOT, || Arc::clone(&self.packed));
        if !Arc::ptr_eq(store.get::<Arc<PackedMesh>>(slot)?, &self.packed) {
            store.set(slot, Arc::clone(&self.packed))?;
        }
        Ok(slot)
    }

    /// Upload every attribute the program reads and bind it to its location.
    ///
    /// Expects the target vertex array to be bound.
    pub fn apply(
        &self,
        backend: &mut dyn GpuBackend,
        attribute_locations: &BTreeMap<String, u32>,
    ) -> MeshDraw {
        for attribute in &self.packed.attributes {
            let Some(&location) = attribute_locations.get(&attribute.name) else {
                tracing::trace!(attribute = %attribute.name, "not read by program, skipped");
                continue;
            };
            let buffer = backend.upload_buffer(BufferKind::Array, attribute.bytes());
            backend.bind_attribute(location, buffer, attribute.stride as u32);
        }

        match &self.packed.index {
            Some(index) if !index.is_empty() => {
                let buffer = backend.upload_buffer(BufferKind::ElementArray, index.bytes());
                MeshDraw::Indexed {
                    count: index.len() as u32,
                    width: index.width(),
                    buffer,
                }
            }
            _ => MeshDraw::Arrays {
                count: self.packed.vertex_count as u32,
            },
        }
    }
}
