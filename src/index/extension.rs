//! Extension-table index backend
//!
//! Envelopes live in a shadow table keyed by feature id. Rows without a
//! geometry envelope get no entry. Like an unindexed SQL shadow table,
//! envelope queries filter every stored entry; use the range tree when the
//! table is large.

use super::metadata::MetadataStore;
use super::{EXTENSION_GEOMETRY_INDEX, FeatureIndexBackend, IndexLocation};
use crate::container::{ExtensionRecord, GeoPackage, TableColumn};
use crate::envelope::Envelope;
use crate::error::Result;
use std::collections::BTreeMap;

/// Index stored in the container's geometry index shadow table
pub struct ExtensionTableIndex {
    container: GeoPackage,
    table: TableColumn,
    metadata: MetadataStore,
}

impl ExtensionTableIndex {
    pub fn new(container: GeoPackage, table: TableColumn) -> Result<Self> {
        let metadata = MetadataStore::new(
            container.clone(),
            table.clone(),
            IndexLocation::ExtensionTable,
        )?;
        Ok(Self {
            container,
            table,
            metadata,
        })
    }

    fn extension_record(&self) -> ExtensionRecord {
        ExtensionRecord {
            table_name: self.table.table.clone(),
            column_name: self.table.column.clone(),
            extension_name: EXTENSION_GEOMETRY_INDEX.to_string(),
        }
    }

    fn scan<R>(&self, f: impl FnOnce(Option<&BTreeMap<i64, Envelope>>) -> R) -> Result<R> {
        self.container
            .view(|inner| Ok(f(inner.geometry_index.get(&self.table))))
    }
}

impl FeatureIndexBackend for ExtensionTableIndex {
    fn location(&self) -> IndexLocation {
        IndexLocation::ExtensionTable
    }

    fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    fn count(&self) -> Result<u64> {
        self.scan(|entries| entries.map_or(0, |entries| entries.len() as u64))
    }

    fn count_envelope(&self, envelope: &Envelope) -> Result<u64> {
        self.scan(|entries| {
            entries.map_or(0, |entries| {
                entries
                    .values()
                    .filter(|stored| stored.intersects(envelope))
                    .count() as u64
            })
        })
    }

    fn query_envelope(&self, envelope: &Envelope) -> Result<Vec<i64>> {
        self.scan(|entries| {
            entries
                .into_iter()
                .flatten()
                .filter(|(_, stored)| stored.intersects(envelope))
                .map(|(id, _)| *id)
                .collect()
        })
    }

    fn query_all(&self) -> Result<Vec<i64>> {
        self.scan(|entries| entries.into_iter().flat_map(|e| e.keys().copied()).collect())
    }

    fn extent(&self) -> Result<Option<Envelope>> {
        self.scan(|entries| {
            entries
                .into_iter()
                .flat_map(|e| e.values())
                .copied()
                .reduce(|a, b| a.union(&b))
        })
    }

    fn put(&self, id: i64, envelope: Option<&Envelope>) -> Result<bool> {
        let record = self.extension_record();
        self.container.update(|inner| {
            let Some(envelope) = envelope else {
                if let Some(entries) = inner.geometry_index.get_mut(&self.table) {
                    entries.remove(&id);
                }
                return Ok(false);
            };
            inner.extensions.insert(record);
            inner
                .geometry_index
                .entry(self.table.clone())
                .or_default()
                .insert(id, *envelope);
            Ok(true)
        })
    }

    fn remove(&self, id: i64) -> Result<bool> {
        self.container.update(|inner| {
            Ok(inner
                .geometry_index
                .get_mut(&self.table)
                .is_some_and(|entries| entries.remove(&id).is_some()))
        })
    }

    fn register(&self) -> Result<()> {
        let record = self.extension_record();
        self.container.update(|inner| {
            inner.extensions.insert(record);
            inner.geometry_index.entry(self.table.clone()).or_default();
            Ok(())
        })
    }

    fn clear_entries(&self) -> Result<()> {
        self.container.update(|inner| {
            if let Some(entries) = inner.geometry_index.get_mut(&self.table) {
                entries.clear();
            }
            Ok(())
        })
    }

    fn drop_storage(&self) -> Result<bool> {
        let record = self.extension_record();
        let dropped = self.container.update(|inner| {
            let had_entries = inner
                .geometry_index
                .remove(&self.table)
                .is_some_and(|entries| !entries.is_empty());
            let had_extension = inner.extensions.remove(&record);
            Ok(had_entries || had_extension)
        })?;
        if dropped {
            log::info!(
                "Dropped geometry index on {}.{}",
                self.table.table,
                self.table.column
            );
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Projection;

    fn backend() -> (GeoPackage, ExtensionTableIndex) {
        let gpkg = GeoPackage::memory().unwrap();
        gpkg.create_feature_table("t", "geom", Projection::wgs84())
            .unwrap();
        let index = ExtensionTableIndex::new(gpkg.clone(), TableColumn::new("t", "geom")).unwrap();
        (gpkg, index)
    }

    #[test]
    fn test_rows_without_envelope_get_no_entry() {
        let (_gpkg, index) = backend();
        assert!(index.put(1, Some(&Envelope::point(1.0, 1.0))).unwrap());
        assert!(!index.put(2, None).unwrap());
        assert_eq!(index.count().unwrap(), 1);

        // A row losing its geometry loses its entry
        assert!(!index.put(1, None).unwrap());
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_query_filters_per_dimension() {
        let (_gpkg, index) = backend();
        index
            .put(1, Some(&Envelope::point(1.0, 1.0).with_z(0.0, 10.0)))
            .unwrap();
        index.put(2, Some(&Envelope::point(2.0, 2.0))).unwrap();

        let xy = Envelope::xy(0.0, 5.0, 0.0, 5.0);
        assert_eq!(index.query_envelope(&xy).unwrap(), vec![1, 2]);

        // Row 2 has no Z, so the Z filter does not apply to it
        let high = xy.with_z(50.0, 60.0);
        assert_eq!(index.query_envelope(&high).unwrap(), vec![2]);
        assert_eq!(index.count_envelope(&high).unwrap(), 1);
    }

    #[test]
    fn test_extension_registration() {
        let (gpkg, index) = backend();
        assert!(!gpkg.has_extension("t", "geom", EXTENSION_GEOMETRY_INDEX).unwrap());
        index.put(1, Some(&Envelope::point(0.0, 0.0))).unwrap();
        assert!(gpkg.has_extension("t", "geom", EXTENSION_GEOMETRY_INDEX).unwrap());

        index.metadata().touch().unwrap();
        assert!(index.clear().unwrap());
        assert!(!gpkg.has_extension("t", "geom", EXTENSION_GEOMETRY_INDEX).unwrap());
        assert!(!index.is_indexed().unwrap());
        assert_eq!(index.count().unwrap(), 0);
        assert!(!index.clear().unwrap());
    }

    #[test]
    fn test_extent_and_remove() {
        let (_gpkg, index) = backend();
        index.put(1, Some(&Envelope::xy(0.0, 1.0, 0.0, 1.0))).unwrap();
        index.put(2, Some(&Envelope::xy(4.0, 5.0, -2.0, 0.5))).unwrap();
        assert_eq!(
            index.extent().unwrap(),
            Some(Envelope::xy(0.0, 5.0, -2.0, 1.0))
        );

        assert!(index.remove(2).unwrap());
        assert!(!index.remove(2).unwrap());
        assert_eq!(index.query_all().unwrap(), vec![1]);
    }
}
