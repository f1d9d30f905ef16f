//! Single-file feature container
//!
//! [`GeoPackage`] is a small relational container holding feature tables and
//! the side tables the index subsystem persists into: per-table geometry
//! index shadow tables, the index metadata table, the extension registry and
//! the native range-index module. Handles are cheap to clone and share one
//! locked state, so every manager over the same container observes the same
//! persisted index state.

mod builder;
mod feature;
#[cfg(feature = "persistence")]
mod persistence;
mod rtree;

pub use builder::GeoPackageBuilder;
pub use feature::{DEFAULT_CHUNK_LIMIT, FeatureDao, FeatureRow, FeatureRows, FeatureSource, Value};
pub use rtree::{RangeEntry, RangeIndex};

use crate::envelope::Envelope;
use crate::error::{IndexError, Result};
use crate::projection::Projection;
use feature::FeatureTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

/// Path that selects an in-memory container
pub const MEMORY_PATH: &str = ":memory:";

/// A (table, column) pair scoping an index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableColumn {
    pub table: String,
    pub column: String,
}

impl TableColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Row of the index metadata table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableIndexRecord {
    pub table_name: String,
    pub geometry_column: String,
    pub extension: String,
    pub last_indexed: Option<SystemTime>,
}

/// Row of the extension registry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub table_name: String,
    pub column_name: String,
    pub extension_name: String,
}

pub(crate) struct ContainerInner {
    /// Feature tables by name
    pub features: BTreeMap<String, FeatureTable>,

    /// Geometry index shadow tables: feature id -> envelope
    pub geometry_index: BTreeMap<TableColumn, BTreeMap<i64, Envelope>>,

    /// Native range indexes registered against feature tables
    pub range_indexes: BTreeMap<TableColumn, RangeIndex>,

    /// Index metadata keyed by (table, column, extension)
    pub table_index: BTreeMap<(TableColumn, String), TableIndexRecord>,

    /// Registered extensions
    pub extensions: BTreeSet<ExtensionRecord>,

    /// Whether the native range-index module is available
    pub rtree_module: bool,

    /// Backing file, `None` for in-memory containers
    pub path: Option<PathBuf>,

    pub closed: bool,

    /// Whether state changed since the last flush
    pub dirty: bool,
}

impl ContainerInner {
    pub(crate) fn new(path: Option<PathBuf>, rtree_module: bool) -> Self {
        Self {
            features: BTreeMap::new(),
            geometry_index: BTreeMap::new(),
            range_indexes: BTreeMap::new(),
            table_index: BTreeMap::new(),
            extensions: BTreeSet::new(),
            rtree_module,
            path,
            closed: false,
            dirty: false,
        }
    }

    pub(crate) fn table(&self, name: &str) -> Result<&FeatureTable> {
        self.features
            .get(name)
            .ok_or_else(|| IndexError::TableNotFound(name.to_string()))
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Result<&mut FeatureTable> {
        self.features
            .get_mut(name)
            .ok_or_else(|| IndexError::TableNotFound(name.to_string()))
    }
}

/// Handle to a feature container.
///
/// # Examples
///
/// ```rust
/// use gpkg_index::{FeatureRow, GeoPackage, Projection};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let gpkg = GeoPackage::memory()?;
/// let roads = gpkg.create_feature_table("roads", "geom", Projection::wgs84())?;
///
/// let id = roads.insert(FeatureRow::new().with_attribute("name", "Main St"))?;
/// assert_eq!(roads.count()?, 1);
/// assert!(roads.get(id)?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GeoPackage {
    inner: Arc<RwLock<ContainerInner>>,
    open_queries: Arc<AtomicUsize>,
}

impl GeoPackage {
    pub(crate) fn from_inner(inner: ContainerInner) -> Self {
        Self {
            inner: Arc::new(RwLock::new(inner)),
            open_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open a container at the given path.
    /// Use ":memory:" for an in-memory container.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        GeoPackageBuilder::new().path(path.as_ref()).build()
    }

    /// Create an in-memory container
    pub fn memory() -> Result<Self> {
        GeoPackageBuilder::new().in_memory().build()
    }

    /// Backing file path, `None` when in memory
    pub fn path(&self) -> Result<Option<PathBuf>> {
        Ok(self.read()?.path.clone())
    }

    /// Whether the native range-index module is available
    pub fn has_rtree_module(&self) -> Result<bool> {
        Ok(self.read()?.rtree_module)
    }

    /// Create a feature table with a geometry column in the given projection.
    pub fn create_feature_table(
        &self,
        name: &str,
        geometry_column: &str,
        projection: Projection,
    ) -> Result<FeatureDao> {
        self.update(|inner| {
            if inner.features.contains_key(name) {
                return Err(IndexError::TableExists(name.to_string()));
            }
            inner.features.insert(
                name.to_string(),
                FeatureTable::new(name, geometry_column, projection),
            );
            Ok(())
        })?;
        log::debug!("Created feature table {}.{}", name, geometry_column);
        self.feature_dao(name)
    }

    /// Data access object for an existing feature table
    pub fn feature_dao(&self, name: &str) -> Result<FeatureDao> {
        let (geometry_column, projection) = self.view(|inner| {
            let table = inner.table(name)?;
            Ok((table.geometry_column.clone(), table.projection.clone()))
        })?;
        Ok(FeatureDao::new(
            self.clone(),
            name.to_string(),
            geometry_column,
            projection,
        ))
    }

    /// Names of all feature tables
    pub fn feature_tables(&self) -> Result<Vec<String>> {
        self.view(|inner| Ok(inner.features.keys().cloned().collect()))
    }

    /// Whether an extension is registered for a table column
    pub fn has_extension(&self, table: &str, column: &str, extension: &str) -> Result<bool> {
        let record = ExtensionRecord {
            table_name: table.to_string(),
            column_name: column.to_string(),
            extension_name: extension.to_string(),
        };
        self.view(|inner| Ok(inner.extensions.contains(&record)))
    }

    /// Number of query handles currently held open by result cursors
    pub fn open_query_handles(&self) -> usize {
        self.open_queries.load(Ordering::SeqCst)
    }

    pub(crate) fn acquire_query(&self) -> QueryHandle {
        self.open_queries.fetch_add(1, Ordering::SeqCst);
        QueryHandle {
            open_queries: Arc::clone(&self.open_queries),
        }
    }

    /// Write pending changes to the backing file. No-op in memory.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.write()?;
        Self::flush_inner(&mut inner)
    }

    /// Flush and close the container. Later operations fail with
    /// `ContainerClosed`.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.write()?;
        if inner.closed {
            return Ok(());
        }
        Self::flush_inner(&mut inner)?;
        inner.closed = true;
        Ok(())
    }

    #[cfg(feature = "persistence")]
    fn flush_inner(inner: &mut ContainerInner) -> Result<()> {
        if inner.dirty
            && let Some(path) = inner.path.clone()
        {
            persistence::write_snapshot(&path, inner)?;
            inner.dirty = false;
        }
        Ok(())
    }

    #[cfg(not(feature = "persistence"))]
    fn flush_inner(inner: &mut ContainerInner) -> Result<()> {
        inner.dirty = false;
        Ok(())
    }

    /// Read-only access to the container state
    pub(crate) fn view<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ContainerInner) -> Result<R>,
    {
        let inner = self.read()?;
        if inner.closed {
            return Err(IndexError::ContainerClosed);
        }
        f(&inner)
    }

    /// Mutating access to the container state
    pub(crate) fn update<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut ContainerInner) -> Result<R>,
    {
        let mut inner = self.write()?;
        if inner.closed {
            return Err(IndexError::ContainerClosed);
        }
        let result = f(&mut inner)?;
        inner.dirty = true;
        Ok(result)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ContainerInner>> {
        self.inner
            .read()
            .map_err(|_| IndexError::Lock("Failed to acquire read lock".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ContainerInner>> {
        self.inner
            .write()
            .map_err(|_| IndexError::Lock("Failed to acquire write lock".to_string()))
    }
}

impl Drop for GeoPackage {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) > 1 {
            return;
        }
        if let Err(e) = self.close() {
            log::error!("Failed to close container: {}", e);
        }
    }
}

/// An open query against the container. Released on drop.
#[derive(Debug)]
pub struct QueryHandle {
    open_queries: Arc<AtomicUsize>,
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        self.open_queries.fetch_sub(1, Ordering::SeqCst);
    }
}
