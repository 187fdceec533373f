//! GPU texture cache with background decoding
//!
//! [`TexCache::get_texture`] never blocks. A miss queues a decode on the
//! loader pool and reports [`TextureLookup::Loading`]; draws use the loading
//! texture meanwhile. The loader decodes into a pinned upload buffer already
//! in the final storage format, so the render thread uploads straight from it
//! in [`TexCache::poll`], once per frame.

use crate::assets::compress::{self, TextureFormat};
use crate::assets::{DecodedImage, LoaderPool, TexFlags, TextureDecoder, TextureKey};
use crate::foundation::sync::{catch_panic, lock, Completion};
use crate::render::backend::{GpuBackend, TextureDesc};
use crate::render::gpu_memory::{GraphicsMemManager, TexHandle};
use crate::render::{RenderError, RenderResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Result of a texture lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureLookup {
    /// Decode in flight; draw with the loading texture
    Loading,
    /// Uploaded and usable
    Ready(TexHandle),
    /// Load or upload failed; draw with the placeholder
    Failed,
}

/// Decoded texels waiting for upload
#[derive(Debug)]
struct UploadBuffer {
    desc: TextureDesc,
    data: Box<[u8]>,
}

/// A texture in flight between the loader pool and the render thread
#[derive(Debug)]
pub struct LoadingEntry {
    key: TextureKey,
    upload: Mutex<Option<UploadBuffer>>,
    done: AtomicBool,
    failed: AtomicBool,
    finished: Completion<bool>,
}

impl LoadingEntry {
    fn new(key: TextureKey) -> Self {
        Self {
            key,
            upload: Mutex::new(None),
            done: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            finished: Completion::new(),
        }
    }

    /// Texture being loaded
    pub fn key(&self) -> &TextureKey {
        &self.key
    }

    /// Decode finished successfully
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Decode failed
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Block until the decode finishes or fails; true on success
    pub fn wait(&self, timeout: Duration) -> Option<bool> {
        self.finished.wait_timeout(timeout)
    }

    fn install(&self, upload: UploadBuffer) {
        *lock(&self.upload) = Some(upload);
        self.done.store(true, Ordering::Release);
        self.finished.complete(true);
    }

    fn fail(&self) {
        self.failed.store(true, Ordering::Release);
        self.finished.complete(false);
    }
}

/// Storage format a decoded image will be uploaded in
pub fn choose_format(image: &DecodedImage, flags: TexFlags, force_compress_above: u64) -> TextureFormat {
    if flags.contains(TexFlags::NO_COMPRESSION) || image.pixel_count() <= force_compress_above {
        TextureFormat::Rgba8
    } else if image.has_alpha() {
        TextureFormat::Bc3
    } else {
        TextureFormat::Bc1
    }
}

fn prepare_upload(image: &DecodedImage, flags: TexFlags, force_compress_above: u64) -> Option<UploadBuffer> {
    let format = choose_format(image, flags, force_compress_above);
    let desc = TextureDesc {
        width: image.width,
        height: image.height,
        format,
        flags,
    };
    let mut data = vec![0u8; desc.byte_size()].into_boxed_slice();
    compress::encode_into(format, image.width, image.height, &image.rgba, &mut data)
        .then_some(UploadBuffer { desc, data })
}

/// Render-thread texture cache
pub struct TexCache {
    decoder: Arc<dyn TextureDecoder>,
    pool: Arc<LoaderPool>,
    force_compress_above: u64,
    on_ready: Arc<dyn Fn() + Send + Sync>,
    ready: HashMap<TextureKey, TexHandle>,
    loading: HashMap<TextureKey, Arc<LoadingEntry>>,
    failed: HashSet<TextureKey>,
    loading_texture: TexHandle,
    placeholder_texture: TexHandle,
}

impl TexCache {
    /// Cache decoding through `decoder` on `pool`
    ///
    /// Uploads the loading and placeholder textures immediately; both are
    /// pinned. `on_ready` runs on a loader thread whenever a decode finishes.
    pub fn new(
        decoder: Arc<dyn TextureDecoder>,
        pool: Arc<LoaderPool>,
        force_compress_above: u64,
        on_ready: Arc<dyn Fn() + Send + Sync>,
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> RenderResult<Self> {
        let loading_texture = Self::upload_builtin(
            backend,
            mem,
            &DecodedImage::solid_color(1, 1, [128, 128, 128, 255]),
        )?;
        let checker = {
            let (m, k) = ([255, 0, 255, 255], [0, 0, 0, 255]);
            DecodedImage {
                width: 2,
                height: 2,
                rgba: [m, k, k, m].concat(),
            }
        };
        let placeholder_texture = Self::upload_builtin(backend, mem, &checker)?;

        Ok(Self {
            decoder,
            pool,
            force_compress_above,
            on_ready,
            ready: HashMap::new(),
            loading: HashMap::new(),
            failed: HashSet::new(),
            loading_texture,
            placeholder_texture,
        })
    }

    fn upload_builtin(
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
        image: &DecodedImage,
    ) -> RenderResult<TexHandle> {
        let desc = TextureDesc {
            width: image.width,
            height: image.height,
            format: TextureFormat::Rgba8,
            flags: TexFlags::empty(),
        };
        let handle = mem.alloc_texture(backend, &desc, &image.rgba)?;
        GraphicsMemManager::pin(&handle);
        Ok(handle)
    }

    /// Look a texture up, starting a background load on a miss
    pub fn get_texture(&mut self, key: &TextureKey) -> TextureLookup {
        if let Some(handle) = self.ready.get(key) {
            if handle.is_valid() {
                return TextureLookup::Ready(handle.clone());
            }
            log::debug!("Texture {} was reclaimed; reloading", key);
            self.ready.remove(key);
        }
        if self.failed.contains(key) {
            return TextureLookup::Failed;
        }
        if !self.loading.contains_key(key) {
            self.start_load(key);
        }
        TextureLookup::Loading
    }

    /// Handle to draw with right now: the texture, or a stand-in
    pub fn resolve(&mut self, key: &TextureKey) -> TexHandle {
        match self.get_texture(key) {
            TextureLookup::Ready(handle) => handle,
            TextureLookup::Loading => self.loading_texture.clone(),
            TextureLookup::Failed => self.placeholder_texture.clone(),
        }
    }

    fn start_load(&mut self, key: &TextureKey) {
        let entry = Arc::new(LoadingEntry::new(key.clone()));
        self.loading.insert(key.clone(), Arc::clone(&entry));

        let decoder = Arc::clone(&self.decoder);
        let on_ready = Arc::clone(&self.on_ready);
        let threshold = self.force_compress_above;
        log::debug!("Queueing texture load {}", key);

        let queued = self.pool.execute(move || {
            let key = entry.key();
            let prepared = catch_panic(|| {
                decoder
                    .decode(key.uri())
                    .map(|image| prepare_upload(&image, key.flags(), threshold))
            });
            match prepared {
                Ok(Ok(Some(upload))) => entry.install(upload),
                Ok(Ok(None)) => {
                    log::warn!("Texture {} has inconsistent pixel data", key);
                    entry.fail();
                }
                Ok(Err(e)) => {
                    log::warn!("Failed to load texture {}: {}", key, e);
                    entry.fail();
                }
                Err(message) => {
                    log::error!("Texture decoder panicked on {}: {}", key, message);
                    entry.fail();
                }
            }
            on_ready();
        });
        if !queued {
            log::warn!("Loader pool unavailable; texture {} will use the placeholder", key);
            self.loading.remove(key);
            self.failed.insert(key.clone());
        }
    }

    /// Upload finished decodes; returns how many entries were finalized
    ///
    /// An upload that fails (out of memory included) marks the texture
    /// failed, so it draws with the placeholder from then on.
    pub fn poll(&mut self, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) -> usize {
        let finished: Vec<_> = self
            .loading
            .iter()
            .filter(|(_, entry)| entry.is_done() || entry.is_failed())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &finished {
            let Some(entry) = self.loading.remove(key) else {
                continue;
            };
            let upload = lock(&entry.upload).take();
            match upload {
                Some(upload) if !entry.is_failed() => {
                    match mem.alloc_texture(backend, &upload.desc, &upload.data) {
                        Ok(handle) => {
                            log::debug!(
                                "Uploaded texture {} ({}x{} {:?})",
                                key,
                                upload.desc.width,
                                upload.desc.height,
                                upload.desc.format
                            );
                            self.ready.insert(key.clone(), handle);
                        }
                        Err(e @ RenderError::OutOfMemory(_)) => {
                            log::warn!("Texture {} does not fit in GPU memory: {}", key, e);
                            self.failed.insert(key.clone());
                        }
                        Err(e) => {
                            log::warn!("Texture {} upload failed: {}", key, e);
                            self.failed.insert(key.clone());
                        }
                    }
                }
                _ => {
                    self.failed.insert(key.clone());
                }
            }
        }
        finished.len()
    }

    /// In-flight entry for `key`, for callers that want to wait on it
    pub fn loading_entry(&self, key: &TextureKey) -> Option<Arc<LoadingEntry>> {
        self.loading.get(key).cloned()
    }

    /// Whether any decode is in flight
    pub fn has_pending(&self) -> bool {
        !self.loading.is_empty()
    }

    /// Drop a texture; a later lookup reloads it
    ///
    /// Failed keys are forgotten too so they get another chance.
    pub fn remove(&mut self, key: &TextureKey, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) -> bool {
        let failed = self.failed.remove(key);
        match self.ready.remove(key) {
            Some(handle) => {
                mem.free_texture(backend, &handle);
                true
            }
            None => failed,
        }
    }

    /// Texture drawn while a load is in flight
    pub fn loading_texture(&self) -> &TexHandle {
        &self.loading_texture
    }

    /// Texture drawn for failed loads
    pub fn placeholder_texture(&self) -> &TexHandle {
        &self.placeholder_texture
    }

    /// Number of uploaded textures
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    /// Whether no texture is uploaded
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetError;
    use crate::config::MemoryConfig;
    use crate::foundation::time::ManualClock;
    use crate::render::backends::HeadlessBackend;

    struct Fixture {
        backend: HeadlessBackend,
        mem: GraphicsMemManager,
        cache: TexCache,
    }

    fn fixture(force_compress_above: u64, budget: Option<usize>) -> Fixture {
        let decoder: Arc<dyn TextureDecoder> = Arc::new(|uri: &str| match uri {
            "big.png" => Ok(DecodedImage::solid_color(64, 64, [10, 20, 30, 255])),
            "missing.png" => Err(AssetError::NotFound(uri.to_string())),
            "corrupt.png" => panic!("truncated header in {uri}"),
            _ => Ok(DecodedImage::solid_color(4, 4, [255, 255, 255, 255])),
        });
        let mut backend = match budget {
            Some(bytes) => HeadlessBackend::new().with_memory_budget(bytes),
            None => HeadlessBackend::new(),
        };
        let mut mem = GraphicsMemManager::new(Arc::new(ManualClock::new()), MemoryConfig::default());
        let cache = TexCache::new(
            decoder,
            Arc::new(LoaderPool::new(1)),
            force_compress_above,
            Arc::new(|| {}),
            &mut backend,
            &mut mem,
        )
        .unwrap();
        Fixture { backend, mem, cache }
    }

    fn finish_load(f: &mut Fixture, key: &TextureKey) {
        if let Some(entry) = f.cache.loading_entry(key) {
            entry.wait(Duration::from_secs(5));
        }
        f.cache.poll(&mut f.backend, &mut f.mem);
    }

    #[test]
    fn test_loading_then_stable_id() {
        let mut f = fixture(2048 * 2048, None);
        let key = TextureKey::new("tex.png", TexFlags::LINEAR);

        assert_eq!(f.cache.get_texture(&key), TextureLookup::Loading);
        assert_eq!(f.cache.resolve(&key), *f.cache.loading_texture());

        finish_load(&mut f, &key);
        let TextureLookup::Ready(first) = f.cache.get_texture(&key) else {
            panic!("texture should be ready after one poll");
        };
        let TextureLookup::Ready(second) = f.cache.get_texture(&key) else {
            panic!("texture should stay ready");
        };
        assert_eq!(first.id(), second.id());
        assert!(first.is_valid());
    }

    #[test]
    fn test_panicking_decode_fails_and_pool_survives() {
        let mut f = fixture(2048 * 2048, None);
        let corrupt = TextureKey::new("corrupt.png", TexFlags::empty());
        f.cache.get_texture(&corrupt);
        finish_load(&mut f, &corrupt);
        assert_eq!(f.cache.get_texture(&corrupt), TextureLookup::Failed);
        assert_eq!(f.cache.resolve(&corrupt), *f.cache.placeholder_texture());

        // The single loader thread still serves later loads
        let next = TextureKey::new("tex.png", TexFlags::empty());
        f.cache.get_texture(&next);
        finish_load(&mut f, &next);
        assert!(matches!(f.cache.get_texture(&next), TextureLookup::Ready(_)));
    }

    #[test]
    fn test_failed_decode_uses_placeholder() {
        let mut f = fixture(2048 * 2048, None);
        let key = TextureKey::new("missing.png", TexFlags::empty());
        f.cache.get_texture(&key);
        finish_load(&mut f, &key);
        assert_eq!(f.cache.get_texture(&key), TextureLookup::Failed);
        assert_eq!(f.cache.resolve(&key), *f.cache.placeholder_texture());
    }

    #[test]
    fn test_oversized_texture_is_compressed() {
        let mut f = fixture(32 * 32, None);
        let probe = f.backend.probe();
        let key = TextureKey::new("big.png", TexFlags::empty());
        f.cache.get_texture(&key);
        finish_load(&mut f, &key);
        let TextureLookup::Ready(handle) = f.cache.get_texture(&key) else {
            panic!("texture should be ready");
        };
        assert_eq!(handle.bytes(), TextureFormat::Bc1.byte_size(64, 64));
        assert_eq!(probe.live_textures(), 3);
    }

    #[test]
    fn test_no_compression_flag_wins() {
        let image = DecodedImage::solid_color(64, 64, [0, 0, 0, 255]);
        assert_eq!(choose_format(&image, TexFlags::NO_COMPRESSION, 16), TextureFormat::Rgba8);
        assert_eq!(choose_format(&image, TexFlags::empty(), 16), TextureFormat::Bc1);
        let translucent = DecodedImage::solid_color(64, 64, [0, 0, 0, 10]);
        assert_eq!(choose_format(&translucent, TexFlags::empty(), 16), TextureFormat::Bc3);
    }

    #[test]
    fn test_out_of_memory_falls_back_to_placeholder() {
        // Room for the two built-ins only
        let mut f = fixture(u64::MAX, Some(4 + 16));
        let key = TextureKey::new("tex.png", TexFlags::empty());
        f.cache.get_texture(&key);
        finish_load(&mut f, &key);
        assert_eq!(f.cache.get_texture(&key), TextureLookup::Failed);
    }
}
