//! GPU-resident mesh prototypes
//!
//! A [`MeshProto`] uploads one [`MeshData`] into a vertex and an index
//! buffer. Buffers are shared between contexts but vertex arrays are not, so
//! each proto keeps a vertex array per context, created on first draw there.

use crate::assets::{MeshData, MeshDataCache, MeshProtoKey, Primitive};
use crate::foundation::sync::lock;
use crate::render::backend::{BufferUsage, ContextId, GpuBackend, GpuId};
use crate::render::gpu_memory::{BufferHandle, GraphicsMemManager};
use crate::render::RenderResult;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Index range of one sub-mesh inside the shared index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMeshRange {
    /// First index
    pub first: u32,
    /// Number of indices
    pub count: u32,
    /// Topology
    pub primitive: Primitive,
}

/// Uploaded mesh data
#[derive(Debug)]
pub struct MeshProto {
    data: Arc<MeshData>,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    ranges: Vec<SubMeshRange>,
    vertex_arrays: Mutex<HashMap<ContextId, GpuId>>,
}

impl MeshProto {
    /// Upload `data`
    ///
    /// On failure nothing stays allocated.
    pub fn build(
        data: Arc<MeshData>,
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> RenderResult<Self> {
        let vertices = data.interleaved_vertices();
        let mut indices = Vec::new();
        let mut ranges = Vec::with_capacity(data.sub_meshes().len());
        for sub_mesh in data.sub_meshes() {
            ranges.push(SubMeshRange {
                first: indices.len() as u32,
                count: sub_mesh.indices.len() as u32,
                primitive: sub_mesh.primitive,
            });
            indices.extend_from_slice(&sub_mesh.indices);
        }
        if indices.is_empty() {
            // Backends reject empty buffers
            indices.push(0);
        }

        let vertex_buffer =
            mem.alloc_buffer(backend, BufferUsage::Vertex, bytemuck::cast_slice(&vertices))?;
        let index_buffer = match mem.alloc_buffer(backend, BufferUsage::Index, bytemuck::cast_slice(&indices)) {
            Ok(buffer) => buffer,
            Err(e) => {
                mem.free_buffer(backend, &vertex_buffer);
                return Err(e);
            }
        };

        Ok(Self {
            data,
            vertex_buffer,
            index_buffer,
            ranges,
            vertex_arrays: Mutex::new(HashMap::new()),
        })
    }

    /// Source data
    pub fn data(&self) -> &Arc<MeshData> {
        &self.data
    }

    /// Index ranges, one per sub-mesh, in sub-mesh order
    pub fn ranges(&self) -> &[SubMeshRange] {
        &self.ranges
    }

    /// Whether both buffers are still resident
    pub fn is_valid(&self) -> bool {
        self.vertex_buffer.is_valid() && self.index_buffer.is_valid()
    }

    /// Vertex array for `context`, creating it on first use
    ///
    /// Binds both buffers, which keeps them from being reclaimed.
    pub fn vertex_array(
        &self,
        context: ContextId,
        backend: &mut dyn GpuBackend,
        mem: &GraphicsMemManager,
    ) -> RenderResult<GpuId> {
        let vertex_buffer = self.vertex_buffer.bind(mem)?;
        let index_buffer = self.index_buffer.bind(mem)?;

        let mut vertex_arrays = lock(&self.vertex_arrays);
        if let Some(&vao) = vertex_arrays.get(&context) {
            return Ok(vao);
        }
        let vao = backend.create_vertex_array(context, vertex_buffer, index_buffer)?;
        vertex_arrays.insert(context, vao);
        Ok(vao)
    }

    /// Drop the vertex array of a context that is going away
    pub fn release_context(&self, context: ContextId, backend: &mut dyn GpuBackend) {
        if let Some(vao) = lock(&self.vertex_arrays).remove(&context) {
            backend.delete_vertex_array(context, vao);
        }
    }

    /// Free vertex arrays and buffers
    pub fn release(&self, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) {
        for (context, vao) in lock(&self.vertex_arrays).drain() {
            backend.delete_vertex_array(context, vao);
        }
        mem.free_buffer(backend, &self.vertex_buffer);
        mem.free_buffer(backend, &self.index_buffer);
    }
}

/// Render-thread cache of mesh prototypes by key
///
/// Keys whose geometry failed to parse or whose upload failed resolve to a
/// pinned placeholder cube, uploaded once when the cache is created, until
/// they are removed.
pub struct MeshProtoCache {
    data: Arc<MeshDataCache>,
    protos: HashMap<MeshProtoKey, Arc<MeshProto>>,
    failed: HashSet<MeshProtoKey>,
    placeholder: Arc<MeshProto>,
}

impl MeshProtoCache {
    /// Cache building from `data`; uploads and pins the placeholder
    pub fn new(
        data: Arc<MeshDataCache>,
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> RenderResult<Self> {
        let placeholder = MeshProto::build(Arc::clone(data.placeholder()), backend, mem)?;
        GraphicsMemManager::pin(&placeholder.vertex_buffer);
        GraphicsMemManager::pin(&placeholder.index_buffer);
        Ok(Self {
            data,
            protos: HashMap::new(),
            failed: HashSet::new(),
            placeholder: Arc::new(placeholder),
        })
    }

    /// Prototype for `key`, built synchronously on a miss
    ///
    /// A prototype whose buffers were reclaimed is rebuilt. Never fails: a
    /// key that cannot be uploaded gets the placeholder from then on.
    pub fn get_proto(
        &mut self,
        key: &MeshProtoKey,
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> Arc<MeshProto> {
        if self.failed.contains(key) {
            return Arc::clone(&self.placeholder);
        }
        if let Some(proto) = self.protos.get(key) {
            if proto.is_valid() {
                return Arc::clone(proto);
            }
            log::debug!("Mesh {} was reclaimed; rebuilding", key);
            proto.release(backend, mem);
            self.protos.remove(key);
        }

        let data = self.data.get_data(key);
        if self.data.is_failed(key) {
            self.failed.insert(key.clone());
            return Arc::clone(&self.placeholder);
        }
        match MeshProto::build(data, backend, mem) {
            Ok(proto) => {
                let proto = Arc::new(proto);
                log::debug!("Built mesh prototype {}", key);
                self.protos.insert(key.clone(), Arc::clone(&proto));
                proto
            }
            Err(e) => {
                log::warn!("Mesh {} upload failed: {}; using placeholder", key, e);
                self.failed.insert(key.clone());
                Arc::clone(&self.placeholder)
            }
        }
    }

    /// Whether `key` resolves to the placeholder
    pub fn is_failed(&self, key: &MeshProtoKey) -> bool {
        self.failed.contains(key)
    }

    /// Pinned stand-in for meshes that cannot be loaded
    pub fn placeholder(&self) -> &Arc<MeshProto> {
        &self.placeholder
    }

    /// Drop a prototype and its GPU objects
    ///
    /// A failed key is forgotten too, so its next use tries again.
    pub fn remove(&mut self, key: &MeshProtoKey, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) -> bool {
        let failed = self.failed.remove(key);
        match self.protos.remove(key) {
            Some(proto) => {
                proto.release(backend, mem);
                true
            }
            None => failed,
        }
    }

    /// Drop every prototype's vertex array for a context
    pub fn release_context(&self, context: ContextId, backend: &mut dyn GpuBackend) {
        for proto in self.protos.values() {
            proto.release_context(context, backend);
        }
        self.placeholder.release_context(context, backend);
    }

    /// Drop all prototypes, the placeholder included
    pub fn clear(&mut self, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) {
        for (_, proto) in self.protos.drain() {
            proto.release(backend, mem);
        }
        self.failed.clear();
        self.placeholder.release(backend, mem);
    }

    /// Number of cached prototypes, the placeholder not counted
    pub fn len(&self) -> usize {
        self.protos.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.protos.is_empty()
    }
}
