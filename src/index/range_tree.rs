//! Range-tree index backend
//!
//! Delegates to the container's native range index `rtree_<table>_<column>`.
//! Every row gets an entry; rows without a geometry envelope hold an empty
//! slot that no query box intersects. Only X and Y are stored.

use super::metadata::MetadataStore;
use super::{EXTENSION_RTREE_INDEX, FeatureIndexBackend, IndexLocation};
use crate::container::{ExtensionRecord, GeoPackage, RangeIndex, TableColumn};
use crate::envelope::Envelope;
use crate::error::{IndexError, Result};

/// Index stored in the container's native range-index module
pub struct RangeTreeIndex {
    container: GeoPackage,
    table: TableColumn,
    name: String,
    metadata: MetadataStore,
}

impl RangeTreeIndex {
    /// Fails with [`IndexError::Unsupported`] when the container was built
    /// without the range-index module.
    pub fn new(container: GeoPackage, table: TableColumn) -> Result<Self> {
        if !container.has_rtree_module()? {
            return Err(IndexError::Unsupported(IndexLocation::RangeTree));
        }
        let metadata =
            MetadataStore::new(container.clone(), table.clone(), IndexLocation::RangeTree)?;
        Ok(Self {
            name: Self::table_name(&table),
            container,
            table,
            metadata,
        })
    }

    /// Name of the native index for a table column
    pub fn table_name(table: &TableColumn) -> String {
        format!("rtree_{}_{}", table.table, table.column)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn extension_record(&self) -> ExtensionRecord {
        extension_record(&self.table)
    }

    fn with_index<R>(&self, default: R, f: impl FnOnce(&RangeIndex) -> R) -> Result<R> {
        self.container.view(|inner| {
            Ok(match inner.range_indexes.get(&self.table) {
                Some(index) => f(index),
                None => default,
            })
        })
    }
}

impl FeatureIndexBackend for RangeTreeIndex {
    fn location(&self) -> IndexLocation {
        IndexLocation::RangeTree
    }

    fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    fn count(&self) -> Result<u64> {
        self.with_index(0, |index| index.len() as u64)
    }

    fn count_envelope(&self, envelope: &Envelope) -> Result<u64> {
        self.with_index(0, |index| index.count_intersecting(envelope) as u64)
    }

    fn query_envelope(&self, envelope: &Envelope) -> Result<Vec<i64>> {
        self.with_index(Vec::new(), |index| index.intersecting(envelope))
    }

    fn query_all(&self) -> Result<Vec<i64>> {
        self.with_index(Vec::new(), RangeIndex::ids)
    }

    fn extent(&self) -> Result<Option<Envelope>> {
        self.with_index(None, RangeIndex::extent)
    }

    fn put(&self, id: i64, envelope: Option<&Envelope>) -> Result<bool> {
        self.register()?;
        self.container.update(|inner| {
            let index = inner
                .range_indexes
                .get_mut(&self.table)
                .ok_or_else(|| IndexError::TableNotFound(self.name.clone()))?;
            index.insert(id, envelope);
            Ok(true)
        })
    }

    fn remove(&self, id: i64) -> Result<bool> {
        self.container.update(|inner| {
            Ok(inner
                .range_indexes
                .get_mut(&self.table)
                .is_some_and(|index| index.delete(id)))
        })
    }

    fn register(&self) -> Result<()> {
        let record = self.extension_record();
        let created = self.container.update(|inner| {
            inner.extensions.insert(record);
            if inner.range_indexes.contains_key(&self.table) {
                return Ok(false);
            }
            inner
                .range_indexes
                .insert(self.table.clone(), RangeIndex::new(self.name.clone()));
            Ok(true)
        })?;
        if created {
            log::debug!("Registered range index {}", self.name);
        }
        Ok(())
    }

    fn clear_entries(&self) -> Result<()> {
        self.container.update(|inner| {
            if let Some(index) = inner.range_indexes.get_mut(&self.table) {
                *index = RangeIndex::new(self.name.clone());
            }
            Ok(())
        })
    }

    fn drop_storage(&self) -> Result<bool> {
        drop_range_index(&self.container, &self.table)
    }
}

fn extension_record(table: &TableColumn) -> ExtensionRecord {
    ExtensionRecord {
        table_name: table.table.clone(),
        column_name: table.column.clone(),
        extension_name: EXTENSION_RTREE_INDEX.to_string(),
    }
}

/// Remove a table column's native range index and its extension record.
/// Works on containers opened without the range-index module, whose files
/// may still carry a range index written elsewhere.
pub(crate) fn drop_range_index(container: &GeoPackage, table: &TableColumn) -> Result<bool> {
    let record = extension_record(table);
    let dropped = container.update(|inner| {
        let had_index = inner.range_indexes.remove(table).is_some();
        let had_extension = inner.extensions.remove(&record);
        Ok(had_index || had_extension)
    })?;
    if dropped {
        log::info!("Dropped range index {}", RangeTreeIndex::table_name(table));
    }
    Ok(dropped)
}
