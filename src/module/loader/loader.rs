//! Isolated unit loader
//!
//! Resolves logical unit names against an ordered list of search paths and
//! caches every unit it loads by canonical identity. All units loaded through
//! one loader belong to the same context and are released together.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::module::loader::reader::{ManifestUnitReader, UnitError, UnitImage, UnitReader};
use crate::module::loader::unit::{LoadedUnit, UnitIdentity, UnitRequest};
use crate::utils::panic_message;

/// Loader owning a set of loaded units
pub struct UnitLoader {
    name: String,
    context_id: Uuid,
    search_paths: Vec<PathBuf>,
    reader: Arc<dyn UnitReader>,
    /// Keyed by [`UnitIdentity::cache_key`]
    cache: BTreeMap<String, Arc<LoadedUnit>>,
}

impl UnitLoader {
    /// Create a loader reading TOML unit manifests
    pub fn new<I, P>(name: &str, search_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::with_reader(name, search_paths, Arc::new(ManifestUnitReader::new()))
    }

    pub fn with_reader<I, P>(name: &str, search_paths: I, reader: Arc<dyn UnitReader>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let loader = Self {
            name: name.to_string(),
            context_id: Uuid::new_v4(),
            search_paths: search_paths.into_iter().map(Into::into).collect(),
            reader,
            cache: BTreeMap::new(),
        };
        debug!(
            "Created unit loader '{}' (context {}) with {} search paths",
            loader.name,
            loader.context_id,
            loader.search_paths.len()
        );
        loader
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the current load context; changes on [`release`](Self::release)
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Whether `path` has an extension the reader understands
    pub fn is_unit_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.reader
                    .extensions()
                    .iter()
                    .any(|supported| supported.eq_ignore_ascii_case(ext))
            })
    }

    /// Identities of every cached unit
    pub fn loaded_units(&self) -> Vec<UnitIdentity> {
        self.cache.values().map(|unit| unit.identity().clone()).collect()
    }

    /// Resolve a unit by name (`"Alpha"`) or identity (`"Alpha@1.0.0"`)
    ///
    /// Returns `None` when no search path yields a unit whose self-reported
    /// identity matches the request. Bad candidates are logged and skipped.
    pub fn resolve(&mut self, request: impl Into<UnitRequest>) -> Option<Arc<LoadedUnit>> {
        let request = request.into();

        if let Some(unit) = self.cached(&request) {
            debug!("Unit {} resolved from cache", unit.identity());
            return Some(unit);
        }

        for index in 0..self.search_paths.len() {
            let search_path = self.search_paths[index].clone();
            for candidate in self.candidates(&search_path, &request.name) {
                if let Some(unit) = self.try_candidate(&candidate, &request) {
                    return Some(unit);
                }
            }
        }

        debug!("Unit {} not found in any search path", request);
        None
    }

    /// Load the unit at `path`, returning the cached unit if its identity was
    /// already loaded
    pub fn load_from_path<P: AsRef<Path>>(&mut self, path: P) -> Result<Arc<LoadedUnit>, UnitError> {
        let path = path.as_ref();
        let image = self.read_uncached(path)?;
        Ok(self.admit(path, image))
    }

    /// Drop every cached unit and start a new load context
    ///
    /// Units stay alive while callers still hold them; the returned handles
    /// report when the last holder has let go.
    pub fn release(&mut self) -> ReleasedUnits {
        let cache = std::mem::take(&mut self.cache);
        let released = ReleasedUnits {
            context_id: self.context_id,
            units: cache
                .into_values()
                .map(|unit| (unit.identity().clone(), Arc::downgrade(&unit)))
                .collect(),
        };
        info!(
            "Released unit loader '{}' context {} ({} units)",
            self.name,
            self.context_id,
            released.len()
        );
        self.context_id = Uuid::new_v4();
        released
    }

    fn cached(&self, request: &UnitRequest) -> Option<Arc<LoadedUnit>> {
        match &request.version {
            Some(version) => {
                let key = UnitIdentity::new(&request.name, version).cache_key();
                self.cache.get(&key).cloned()
            }
            None => self
                .cache
                .values()
                .find(|unit| request.matches(unit.identity()))
                .cloned(),
        }
    }

    /// Candidate files for `unit_name` under one search path, in probe order
    fn candidates(&self, search_path: &Path, unit_name: &str) -> Vec<PathBuf> {
        if search_path.is_file() {
            let stem_matches = search_path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.eq_ignore_ascii_case(unit_name));
            if stem_matches && self.is_unit_file(search_path) {
                return vec![search_path.to_path_buf()];
            }
            return Vec::new();
        }

        if search_path.is_dir() {
            let mut files: Vec<PathBuf> = match std::fs::read_dir(search_path) {
                Ok(entries) => entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| path.is_file())
                    .collect(),
                Err(e) => {
                    warn!("Failed to read search path {:?}: {}", search_path, e);
                    return Vec::new();
                }
            };
            files.sort();

            let mut candidates = Vec::new();
            for ext in self.reader.extensions() {
                candidates.extend(
                    files
                        .iter()
                        .filter(|path| file_matches(path, unit_name, ext))
                        .cloned(),
                );
            }
            return candidates;
        }

        debug!("Search path {:?} does not exist, skipping", search_path);
        Vec::new()
    }

    fn try_candidate(&mut self, candidate: &Path, request: &UnitRequest) -> Option<Arc<LoadedUnit>> {
        match self.read_uncached(candidate) {
            Ok(image) => {
                let identity = image.manifest.identity();
                if request.matches(&identity) {
                    Some(self.admit(candidate, image))
                } else {
                    warn!(
                        "Unit at {:?} reports identity {}, expected {}; not caching",
                        candidate, identity, request
                    );
                    None
                }
            }
            Err(e @ UnitError::Malformed { .. }) | Err(e @ UnitError::Io { .. }) => {
                warn!("Skipping unit candidate: {}", e);
                None
            }
            Err(e @ UnitError::Internal { .. }) => {
                error!("Skipping unit candidate: {}", e);
                None
            }
        }
    }

    /// Read a unit file without consulting or touching the cache
    fn read_uncached(&self, path: &Path) -> Result<UnitImage, UnitError> {
        let reader = Arc::clone(&self.reader);
        panic::catch_unwind(AssertUnwindSafe(|| reader.read(path))).unwrap_or_else(|payload| {
            Err(UnitError::Internal {
                path: path.to_path_buf(),
                reason: panic_message(payload.as_ref()),
            })
        })
    }

    /// Cache a freshly read unit, keeping the existing instance for a known identity
    fn admit(&mut self, path: &Path, image: UnitImage) -> Arc<LoadedUnit> {
        let key = image.manifest.identity().cache_key();
        if let Some(existing) = self.cache.get(&key) {
            debug!("Unit {} already loaded, reusing cached instance", existing.identity());
            return Arc::clone(existing);
        }

        let unit = Arc::new(LoadedUnit::new(
            path.to_path_buf(),
            image.fingerprint,
            image.manifest,
            self.context_id,
        ));
        info!("Loaded unit {} from {:?}", unit.identity(), path);
        self.cache.insert(key, Arc::clone(&unit));
        unit
    }
}

/// `{unit_name}.{ext}`, compared case-insensitively
fn file_matches(path: &Path, unit_name: &str, ext: &str) -> bool {
    let stem = path.file_stem().and_then(|s| s.to_str());
    let extension = path.extension().and_then(|e| e.to_str());
    matches!(
        (stem, extension),
        (Some(stem), Some(extension))
            if stem.eq_ignore_ascii_case(unit_name) && extension.eq_ignore_ascii_case(ext)
    )
}

impl std::fmt::Debug for UnitLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitLoader")
            .field("name", &self.name)
            .field("context_id", &self.context_id)
            .field("search_paths", &self.search_paths)
            .field("loaded", &self.cache.len())
            .finish()
    }
}

/// Weak handles to the units of a released load context
#[derive(Debug)]
pub struct ReleasedUnits {
    context_id: Uuid,
    units: Vec<(UnitIdentity, Weak<LoadedUnit>)>,
}

impl ReleasedUnits {
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// True once no holder keeps any released unit alive
    pub fn all_unloaded(&self) -> bool {
        self.units.iter().all(|(_, unit)| unit.strong_count() == 0)
    }

    /// Units still held somewhere
    pub fn still_loaded(&self) -> Vec<&UnitIdentity> {
        self.units
            .iter()
            .filter(|(_, unit)| unit.strong_count() > 0)
            .map(|(identity, _)| identity)
            .collect()
    }
}
