use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use fxhash::FxBuildHasher;
use parking_lot::Mutex;

use crate::{
    atlas::{AtlasBuilder, FontAtlas},
    config::{AtlasConfig, FieldMode},
    error::AtlasError,
    font_storage::FontStorage,
    sdf::{CpuDistanceTransform, DistanceTransform},
};

/// Identifies an atlas by font face and everything in the config that
/// affects its pixels.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AtlasKey {
    pub font_id: fontdb::ID,
    font_size: u32,
    border: u32,
    max_distance_inside: u32,
    max_distance_outside: u32,
    coverage_threshold: u8,
    mode: FieldMode,
    characters: Vec<char>,
}

impl AtlasKey {
    /// Key for building `font_id` with `config`. `debug_image` is ignored.
    pub fn new(font_id: fontdb::ID, config: &AtlasConfig) -> Self {
        Self {
            font_id,
            font_size: config.font_size.to_bits(),
            border: config.border,
            max_distance_inside: config.max_distance_inside.to_bits(),
            max_distance_outside: config.max_distance_outside.to_bits(),
            coverage_threshold: config.coverage_threshold,
            mode: config.mode,
            characters: config.characters.clone(),
        }
    }
}

/// Thread-safe entry point: font loading plus a registry of built atlases.
///
/// Atlases are immutable once built and handed out as `Arc`s. Requesting the
/// same font and config again returns the cached atlas.
pub struct FontSystem {
    /// The underlying font storage.
    pub font_storage: Mutex<FontStorage>,
    /// Built atlases, shared with every caller that requested them.
    pub atlases: Mutex<HashMap<AtlasKey, Arc<FontAtlas>, FxBuildHasher>>,
    /// Bumped by every `remove_face`.
    removals: AtomicU64,
}

impl Default for FontSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FontSystem {
    /// Creates a font system with no fonts and no atlases.
    pub fn new() -> Self {
        Self {
            font_storage: Mutex::new(FontStorage::new()),
            atlases: Mutex::new(HashMap::with_hasher(FxBuildHasher::default())),
            removals: AtomicU64::new(0),
        }
    }
}

/// font storage
impl FontSystem {
    /// Loads the system fonts into the storage.
    pub fn load_system_fonts(&self) {
        self.font_storage.lock().load_system_fonts();
    }

    /// Loads a font from binary data.
    pub fn load_font_binary(&self, data: impl Into<Vec<u8>>) {
        self.font_storage.lock().load_font_binary(data);
    }

    /// Loads a font from a file path.
    pub fn load_font_file(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        self.font_storage.lock().load_font_file(path)
    }

    /// Loads all fonts from a directory.
    pub fn load_fonts_dir(&self, dir: impl AsRef<Path>) {
        self.font_storage.lock().load_fonts_dir(dir)
    }

    /// Removes a face along with every atlas built from it.
    ///
    /// A build of that face still running returns its atlas but does not
    /// cache it.
    pub fn remove_face(&self, id: fontdb::ID) {
        // lock order: atlases, then font_storage
        let mut atlases = self.atlases.lock();
        self.font_storage.lock().remove_face(id);
        self.removals.fetch_add(1, Ordering::SeqCst);
        atlases.retain(|key, _| key.font_id != id);
    }

    /// Checks if no font faces are loaded.
    pub fn is_empty(&self) -> bool {
        self.font_storage.lock().is_empty()
    }

    /// Returns the number of loaded font faces.
    pub fn len(&self) -> usize {
        self.font_storage.lock().len()
    }

    /// Best matching face for `query`.
    pub fn query(&self, query: &fontdb::Query) -> Option<fontdb::ID> {
        self.font_storage.lock().find(query)
    }
}

/// atlases
impl FontSystem {
    /// Returns the atlas for `font_id` and `config`, building it with the CPU
    /// engine if it is not cached yet.
    pub fn atlas(&self, font_id: fontdb::ID, config: &AtlasConfig) -> Result<Arc<FontAtlas>, AtlasError> {
        self.atlas_with(font_id, config, &mut CpuDistanceTransform::new())
    }

    /// Like [`FontSystem::atlas`], running the distance transform on `engine`.
    pub fn atlas_with<E: DistanceTransform + ?Sized>(
        &self,
        font_id: fontdb::ID,
        config: &AtlasConfig,
        engine: &mut E,
    ) -> Result<Arc<FontAtlas>, AtlasError> {
        self.get_or_build(AtlasKey::new(font_id, config), || {
            let font = self
                .font_storage
                .lock()
                .font(font_id)
                .ok_or(AtlasError::FontUnavailable(font_id))?;
            AtlasBuilder::new(config.clone()).build(font.as_ref(), engine)
        })
    }

    /// Cached atlas for `font_id` and `config`, without building.
    pub fn cached_atlas(&self, font_id: fontdb::ID, config: &AtlasConfig) -> Option<Arc<FontAtlas>> {
        self.atlases.lock().get(&AtlasKey::new(font_id, config)).cloned()
    }

    /// Returns the number of cached atlases.
    pub fn atlas_count(&self) -> usize {
        self.atlases.lock().len()
    }

    /// Drops every cached atlas. Atlases still referenced elsewhere stay alive.
    pub fn clear_atlases(&self) {
        self.atlases.lock().clear();
    }

    fn get_or_build(
        &self,
        key: AtlasKey,
        build: impl FnOnce() -> Result<FontAtlas, AtlasError>,
    ) -> Result<Arc<FontAtlas>, AtlasError> {
        if let Some(atlas) = self.atlases.lock().get(&key) {
            return Ok(Arc::clone(atlas));
        }

        let removals = self.removals.load(Ordering::SeqCst);

        // built without holding the lock; a concurrent build of the same key
        // loses to whichever finishes first
        let atlas = Arc::new(build()?);
        let mut atlases = self.atlases.lock();
        if self.removals.load(Ordering::SeqCst) != removals
            && self.font_storage.lock().face(key.font_id).is_none()
        {
            log::debug!("font {:?} removed during atlas build, not caching", key.font_id);
            return Ok(atlas);
        }
        Ok(Arc::clone(atlases.entry(key).or_insert(atlas)))
    }
}
