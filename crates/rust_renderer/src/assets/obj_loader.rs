//! Wavefront OBJ geometry loader
//!
//! Supports positions, normals, texture coordinates, polygon faces (fan
//! triangulated), line strips (`l`) and points (`p`). Each `g`, `o` or
//! `usemtl` statement starts a new sub-mesh; material names are kept but
//! material libraries are not read.

use crate::assets::{
    AssetError, AssetResolver, GeometryLoader, Material, MeshData, Primitive, SubMesh,
};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};

/// OBJ loader resolving URIs through search paths
#[derive(Debug, Clone, Default)]
pub struct ObjLoader {
    resolver: AssetResolver,
}

impl ObjLoader {
    /// Loader looking up files through `resolver`
    pub fn new(resolver: AssetResolver) -> Self {
        Self { resolver }
    }

    /// Parse OBJ text from any reader
    pub fn parse_reader<R: Read>(name: &str, reader: R) -> Result<MeshData, AssetError> {
        let mut state = ObjState::new(name);

        for (line_index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            state.line = line_index + 1;

            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts[0] {
                "v" => {
                    let p = state.parse_floats::<3>(&parts[1..], "vertex")?;
                    state.positions.push(p);
                }
                "vn" => {
                    let n = state.parse_floats::<3>(&parts[1..], "normal")?;
                    state.normals.push(n);
                }
                "vt" => {
                    let t = state.parse_floats::<2>(&parts[1..], "tex coord")?;
                    state.tex_coords.push(t);
                }
                "f" => state.face(&parts[1..])?,
                "l" => state.line_strip(&parts[1..])?,
                "p" => state.points(&parts[1..])?,
                "g" | "o" => state.start_group(None),
                "usemtl" => state.start_group(parts.get(1).copied()),
                _ => {
                    // mtllib, s and friends are ignored
                }
            }
        }

        state.finish()
    }
}

impl GeometryLoader for ObjLoader {
    fn parse(&self, uri: &str) -> Result<MeshData, AssetError> {
        let path = self.resolver.resolve(uri)?;
        log::debug!("Parsing OBJ from: {:?}", path);
        let file = std::fs::File::open(&path)?;
        let mesh = Self::parse_reader(uri, file)?;
        log::debug!(
            "Parsed {}: {} vertices, {} sub-meshes",
            uri,
            mesh.positions().len(),
            mesh.sub_meshes().len()
        );
        Ok(mesh)
    }
}

type Corner = (usize, Option<usize>, Option<usize>);

struct ObjState {
    name: String,
    line: usize,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    tex_coords: Vec<[f32; 2]>,

    out_positions: Vec<[f32; 3]>,
    out_normals: Vec<[f32; 3]>,
    out_uvs: Vec<[f32; 2]>,
    corners: HashMap<Corner, u32>,

    material: Material,
    groups: Vec<SubMesh>,
    current: HashMap<Primitive, Vec<u32>>,
}

impl ObjState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            line: 0,
            positions: Vec::new(),
            normals: Vec::new(),
            tex_coords: Vec::new(),
            out_positions: Vec::new(),
            out_normals: Vec::new(),
            out_uvs: Vec::new(),
            corners: HashMap::new(),
            material: Material::default(),
            groups: Vec::new(),
            current: HashMap::new(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> AssetError {
        AssetError::Parse {
            uri: self.name.clone(),
            line: self.line,
            reason: reason.into(),
        }
    }

    fn parse_floats<const N: usize>(&self, parts: &[&str], what: &str) -> Result<[f32; N], AssetError> {
        if parts.len() < N {
            return Err(self.error(format!("{what} needs {N} components")));
        }
        let mut out = [0.0; N];
        for (slot, text) in out.iter_mut().zip(parts) {
            *slot = text
                .parse()
                .map_err(|_| self.error(format!("Invalid {what} component '{text}'")))?;
        }
        Ok(out)
    }

    /// OBJ indices are 1-based; negative ones count back from the end
    fn resolve_index(&self, text: &str, len: usize, what: &str) -> Result<usize, AssetError> {
        let raw: i64 = text
            .parse()
            .map_err(|_| self.error(format!("Invalid {what} index '{text}'")))?;
        let index = if raw < 0 { len as i64 + raw } else { raw - 1 };
        if index < 0 || index as usize >= len {
            return Err(self.error(format!("{what} index {raw} out of bounds")));
        }
        Ok(index as usize)
    }

    fn corner(&mut self, text: &str) -> Result<u32, AssetError> {
        let mut fields = text.split('/');
        let pos = self.resolve_index(fields.next().unwrap_or(""), self.positions.len(), "position")?;
        let tex = match fields.next() {
            Some(t) if !t.is_empty() => Some(self.resolve_index(t, self.tex_coords.len(), "tex coord")?),
            _ => None,
        };
        let normal = match fields.next() {
            Some(n) if !n.is_empty() => Some(self.resolve_index(n, self.normals.len(), "normal")?),
            _ => None,
        };

        let key = (pos, tex, normal);
        if let Some(&index) = self.corners.get(&key) {
            return Ok(index);
        }
        let index = self.out_positions.len() as u32;
        self.out_positions.push(self.positions[pos]);
        self.out_uvs.push(tex.map_or([0.0, 0.0], |t| self.tex_coords[t]));
        self.out_normals.push(normal.map_or([0.0, 1.0, 0.0], |n| self.normals[n]));
        self.corners.insert(key, index);
        Ok(index)
    }

    fn corners_of(&mut self, parts: &[&str]) -> Result<Vec<u32>, AssetError> {
        parts.iter().map(|p| self.corner(p)).collect()
    }

    fn face(&mut self, parts: &[&str]) -> Result<(), AssetError> {
        if parts.len() < 3 {
            return Err(self.error("face needs at least 3 vertices"));
        }
        let corners = self.corners_of(parts)?;
        let indices = self.current.entry(Primitive::Triangles).or_default();
        // Fan triangulation
        for i in 1..corners.len() - 1 {
            indices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
        }
        Ok(())
    }

    fn line_strip(&mut self, parts: &[&str]) -> Result<(), AssetError> {
        if parts.len() < 2 {
            return Err(self.error("line needs at least 2 vertices"));
        }
        let corners = self.corners_of(parts)?;
        let indices = self.current.entry(Primitive::Lines).or_default();
        for pair in corners.windows(2) {
            indices.extend_from_slice(pair);
        }
        Ok(())
    }

    fn points(&mut self, parts: &[&str]) -> Result<(), AssetError> {
        let corners = self.corners_of(parts)?;
        self.current
            .entry(Primitive::Points)
            .or_default()
            .extend(corners);
        Ok(())
    }

    fn flush_group(&mut self) {
        for primitive in [Primitive::Triangles, Primitive::Lines, Primitive::Points] {
            if let Some(indices) = self.current.remove(&primitive) {
                if !indices.is_empty() {
                    self.groups.push(SubMesh {
                        indices,
                        primitive,
                        material: self.material.clone(),
                    });
                }
            }
        }
    }

    fn start_group(&mut self, material: Option<&str>) {
        self.flush_group();
        if let Some(name) = material {
            self.material = Material {
                name: name.to_string(),
                ..Material::default()
            };
        }
    }

    fn finish(mut self) -> Result<MeshData, AssetError> {
        self.flush_group();
        if self.out_positions.is_empty() {
            // Vertex-only files are still renderable as a point cloud
            if self.positions.is_empty() {
                return Err(AssetError::LoadFailed(format!(
                    "{}: no vertices found in OBJ file",
                    self.name
                )));
            }
            let indices = (0..self.positions.len() as u32).collect();
            self.groups.push(SubMesh {
                indices,
                primitive: Primitive::Points,
                material: self.material.clone(),
            });
            return MeshData::new(self.name, self.positions, Vec::new(), Vec::new(), self.groups);
        }
        MeshData::new(
            self.name,
            self.out_positions,
            self.out_normals,
            self.out_uvs,
            self.groups,
        )
    }
}
