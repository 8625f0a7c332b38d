use trellis_common::NodeId;
use trellis_store::Store;

use crate::error::RenderError;
use crate::material::Material;
use crate::mesh::Mesh;

/// A node's renderable: mesh plus material, sharing one store.
///
/// `revision` changes whenever the mesh or material is swapped, which
/// invalidates any draw call bound for the previous pair.
#[derive(Debug)]
pub struct Model {
    node: NodeId,
    mesh: Option<Mesh>,
    material: Option<Material>,
    store: Store,
    revision: u64,
}

impl Model {
    pub fn builder(node: NodeId) -> ModelBuilder {
        ModelBuilder::new(node)
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    pub fn material(&self) -> Option<&Material> {
        self.material.as_ref()
    }

    /// Change the material color in place. Returns false without a material.
    ///
    /// Option changes keep the compiled program, so the revision stays put.
    /// Use [`Model::set_material`] to replace the material itself.
    pub fn set_color(&mut self, color: [f32; 4]) -> bool {
        let Some(material) = &mut self.material else {
            return false;
        };
        material.set_color(color);
        true
    }

    /// Returns false without a material or for kinds without an ambient term.
    pub fn set_ambient(&mut self, ambient: f32) -> bool {
        self.material.as_mut().is_some_and(|m| m.set_ambient(ambient))
    }

    /// Returns false without a material or for kinds that do not draw points.
    pub fn set_point_size(&mut self, size: f32) -> bool {
        self.material.as_mut().is_some_and(|m| m.set_point_size(size))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace or remove the mesh. Returns the previous one.
    pub fn set_mesh(&mut self, mesh: Option<Mesh>) -> Option<Mesh> {
        self.revision += 1;
        std::mem::replace(&mut self.mesh, mesh)
    }

    /// Replace or remove the material. Returns the previous one.
    pub fn set_material(&mut self, material: Option<Material>) -> Option<Material> {
        self.revision += 1;
        std::mem::replace(&mut self.material, material)
    }

    /// Run the mesh behavior, then the material behavior, against the store.
    pub fn run(&mut self) -> Result<(), RenderError> {
        self.store.reset();
        if let Some(mesh) = &self.mesh {
            mesh.run(&mut self.store)?;
        }
        if let Some(material) = &mut self.material {
            material.run(&mut self.store)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) {
        self.store.flush();
    }

    pub(crate) fn parts_mut(&mut self) -> (Option<&Mesh>, Option<&mut Material>, &mut Store) {
        (self.mesh.as_ref(), self.material.as_mut(), &mut self.store)
    }
}

#[derive(Debug)]
pub struct ModelBuilder {
    node: NodeId,
    mesh: Option<Mesh>,
    material: Option<Material>,
}

impl ModelBuilder {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            mesh: None,
            material: None,
        }
    }

    pub fn mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn build(self) -> Result<Model, RenderError> {
        let mesh = self.mesh.ok_or(RenderError::MissingMesh)?;
        let material = self.material.ok_or(RenderError::MissingMaterial)?;
        Ok(Model {
            node: self.node,
            mesh: Some(mesh),
            material: Some(material),
            store: Store::new(),
            revision: 0,
        })
    }
}
