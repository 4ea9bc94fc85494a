use std::{collections::HashMap, path::Path, sync::Arc};

/// Font faces known to `fontdb`, with `fontdue` fonts parsed on first use.
///
/// Parsed fonts are what atlas builds rasterize from, so each face is parsed
/// at most once no matter how many atlases are built for it.
pub struct FontStorage {
    font_db: fontdb::Database,
    /// Subset of `font_db` that has been parsed.
    parsed: HashMap<fontdb::ID, Arc<fontdue::Font>, fxhash::FxBuildHasher>,
}

impl Default for FontStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FontStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self {
            font_db: fontdb::Database::new(),
            parsed: HashMap::with_hasher(fxhash::FxBuildHasher::default()),
        }
    }

}

/// Loading faces into fontdb.
impl FontStorage {
    /// Loads a font from binary data.
    pub fn load_font_binary(&mut self, data: impl Into<Vec<u8>>) {
        self.font_db.load_font_data(data.into());
    }

    /// Loads a font from a file path.
    pub fn load_font_file(&mut self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        self.font_db.load_font_file(path)
    }

    /// Loads all fonts from a directory.
    pub fn load_fonts_dir(&mut self, dir: impl AsRef<Path>) {
        self.font_db.load_fonts_dir(dir)
    }

    /// Loads the system fonts.
    pub fn load_system_fonts(&mut self) {
        self.font_db.load_system_fonts();
    }

    /// Removes a face and drops its parsed font.
    pub fn remove_face(&mut self, id: fontdb::ID) {
        self.font_db.remove_face(id);
        self.parsed.remove(&id);
    }

    /// Checks if the storage has no faces.
    pub fn is_empty(&self) -> bool {
        self.font_db.is_empty()
    }

    /// Returns the number of loaded faces.
    pub fn len(&self) -> usize {
        self.font_db.len()
    }
}

/// Face lookup
impl FontStorage {
    /// Returns an iterator over all available faces.
    pub fn faces(&self) -> impl Iterator<Item = &fontdb::FaceInfo> {
        self.font_db.faces()
    }

    /// Returns face info for an ID.
    pub fn face(&self, id: fontdb::ID) -> Option<&fontdb::FaceInfo> {
        self.font_db.face(id)
    }

    /// Best matching face for `query`, without parsing it.
    pub fn find(&self, query: &fontdb::Query) -> Option<fontdb::ID> {
        self.font_db.query(query)
    }

    /// Best matching face for `query`, parsed.
    ///
    /// Returns `None` if nothing matches or the match fails to parse.
    pub fn query(&mut self, query: &fontdb::Query) -> Option<(fontdb::ID, Arc<fontdue::Font>)> {
        let id = self.font_db.query(query)?;
        self.font(id).map(|font| (id, font))
    }

    /// Returns the parsed font for `id`, parsing it on first access.
    ///
    /// Faces whose data cannot be parsed are logged and reported as `None`.
    pub fn font(&mut self, id: fontdb::ID) -> Option<Arc<fontdue::Font>> {
        use std::collections::hash_map::Entry;

        match self.parsed.entry(id) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let parsed = self.font_db.with_face_data(id, |data, index| {
                    fontdue::Font::from_bytes(
                        data,
                        fontdue::FontSettings {
                            collection_index: index,
                            scale: 40.0,
                            load_substitutions: true,
                        },
                    )
                })?;

                match parsed {
                    Ok(font) => Some(Arc::clone(entry.insert(Arc::new(font)))),
                    Err(e) => {
                        log::error!("Failed to load font (id: {:?}): {}", id, e);
                        None
                    }
                }
            }
        }
    }

    /// Number of faces parsed so far.
    pub fn parsed_len(&self) -> usize {
        self.parsed.len()
    }
}
