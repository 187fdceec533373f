//! Backend-independent mesh data
//!
//! A [`MeshData`] is what a geometry loader produces: vertex streams, one or
//! more index lists with their materials, and the bounding volumes used by
//! culling and picking. Once inserted in the [`MeshDataCache`] it is shared
//! read-only.
//!
//! [`MeshDataCache`]: crate::assets::MeshDataCache

use crate::assets::{AssetError, TextureKey};
use crate::foundation::math::Vec3;
use crate::geometry::{Aabb, BoundingSphere, ConvexHull, Triangle};

/// Primitive topology of a sub-mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Index triples
    Triangles,
    /// Index pairs
    Lines,
    /// Single indices
    Points,
}

impl Primitive {
    /// Indices per primitive
    pub fn arity(self) -> usize {
        match self {
            Self::Triangles => 3,
            Self::Lines => 2,
            Self::Points => 1,
        }
    }
}

/// Surface description of a sub-mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Material name from the source file
    pub name: String,
    /// RGBA diffuse color
    pub diffuse: [f32; 4],
    /// Optional diffuse texture
    pub texture: Option<TextureKey>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            diffuse: [0.8, 0.8, 0.8, 1.0],
            texture: None,
        }
    }
}

impl Material {
    /// Whether this material needs the sorted transparent pass
    pub fn is_transparent(&self) -> bool {
        self.diffuse[3] < 1.0
    }
}

/// One index list with its material
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    /// Vertex indices, `primitive.arity()` per element
    pub indices: Vec<u32>,
    /// Topology
    pub primitive: Primitive,
    /// Surface
    pub material: Material,
}

/// Parsed mesh with bounds
#[derive(Debug, Clone)]
pub struct MeshData {
    name: String,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    sub_meshes: Vec<SubMesh>,
    aabb: Aabb,
    sphere: BoundingSphere,
    hull: ConvexHull,
}

impl MeshData {
    /// Build mesh data and its bounding volumes
    ///
    /// Missing normals or uvs are filled with defaults. Fails if there are no
    /// positions or an index is out of range.
    pub fn new(
        name: impl Into<String>,
        positions: Vec<[f32; 3]>,
        mut normals: Vec<[f32; 3]>,
        mut uvs: Vec<[f32; 2]>,
        sub_meshes: Vec<SubMesh>,
    ) -> Result<Self, AssetError> {
        let name = name.into();
        let points: Vec<Vec3> = positions.iter().map(|p| Vec3::from(*p)).collect();
        let (Some(aabb), Some(sphere), Some(hull)) = (
            Aabb::from_points(&points),
            BoundingSphere::from_points(&points),
            ConvexHull::from_points(&points),
        ) else {
            return Err(AssetError::LoadFailed(format!("{name}: mesh has no vertices")));
        };

        let vertex_count = positions.len();
        for sub_mesh in &sub_meshes {
            if let Some(&bad) = sub_mesh.indices.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(AssetError::LoadFailed(format!(
                    "{name}: index {bad} out of range for {vertex_count} vertices"
                )));
            }
            if sub_mesh.indices.len() % sub_mesh.primitive.arity() != 0 {
                return Err(AssetError::LoadFailed(format!(
                    "{name}: {} indices do not form whole {:?}",
                    sub_mesh.indices.len(),
                    sub_mesh.primitive
                )));
            }
        }

        normals.resize(vertex_count, [0.0, 1.0, 0.0]);
        uvs.resize(vertex_count, [0.0, 0.0]);

        Ok(Self {
            name,
            positions,
            normals,
            uvs,
            sub_meshes,
            aabb,
            sphere,
            hull,
        })
    }

    /// Unit cube standing in for geometry that failed to load
    pub fn placeholder_cube() -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ];

        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut uvs = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, u_axis, v_axis) in FACES {
            let (n, u, v) = (Vec3::from(normal), Vec3::from(u_axis), Vec3::from(v_axis));
            let base = positions.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (n + u * su + v * sv) * 0.5;
                positions.push([p.x, p.y, p.z]);
                normals.push(normal);
                uvs.push([(su + 1.0) * 0.5, (sv + 1.0) * 0.5]);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        let sub_mesh = SubMesh {
            indices,
            primitive: Primitive::Triangles,
            material: Material {
                name: String::from("placeholder"),
                diffuse: [1.0, 0.0, 1.0, 1.0],
                texture: None,
            },
        };

        // Fixed, well-formed input
        Self::new("placeholder", positions, normals, uvs, vec![sub_mesh])
            .unwrap_or_else(|_| unreachable!("placeholder cube is valid"))
    }

    /// Mesh name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vertex positions
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    /// Vertex normals, one per position
    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    /// Texture coordinates, one per position
    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uvs
    }

    /// Index lists with their materials
    pub fn sub_meshes(&self) -> &[SubMesh] {
        &self.sub_meshes
    }

    /// Object-space axis-aligned bounds
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Object-space bounding sphere
    pub fn sphere(&self) -> &BoundingSphere {
        &self.sphere
    }

    /// Object-space convex hull
    pub fn hull(&self) -> &ConvexHull {
        &self.hull
    }

    /// Position `index` as a vector
    pub fn position(&self, index: u32) -> Vec3 {
        Vec3::from(self.positions[index as usize])
    }

    /// Whether any sub-mesh is transparent
    pub fn has_transparent(&self) -> bool {
        self.sub_meshes.iter().any(|s| s.material.is_transparent())
    }

    /// All triangles of the triangle sub-meshes, in object space
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.sub_meshes
            .iter()
            .filter(|s| s.primitive == Primitive::Triangles)
            .flat_map(|s| s.indices.chunks_exact(3))
            .map(|tri| {
                Triangle::new(
                    self.position(tri[0]),
                    self.position(tri[1]),
                    self.position(tri[2]),
                )
            })
    }

    /// Interleaved `position, normal, uv` vertex stream (8 floats per vertex)
    pub fn interleaved_vertices(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.positions.len() * 8);
        for ((p, n), uv) in self.positions.iter().zip(&self.normals).zip(&self.uvs) {
            out.extend_from_slice(p);
            out.extend_from_slice(n);
            out.extend_from_slice(uv);
        }
        out
    }

    /// Approximate CPU footprint in bytes
    pub fn byte_size(&self) -> usize {
        self.positions.len() * std::mem::size_of::<f32>() * 8
            + self
                .sub_meshes
                .iter()
                .map(|s| s.indices.len() * std::mem::size_of::<u32>())
                .sum::<usize>()
    }
}
