//! Index metadata records
//!
//! One record per (table, column, backend) lives in the container's metadata
//! table. A record exists iff that backend has been built for the column, and
//! it carries the time of the last successful build. Records are always read
//! from the container so every manager sees the same state.

use super::IndexLocation;
use crate::container::{GeoPackage, TableColumn, TableIndexRecord};
use crate::error::{IndexError, Result};
use std::time::{Duration, SystemTime};

/// Snapshot of one index metadata record
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    pub table_name: String,
    pub geometry_column: String,
    pub location: IndexLocation,
    pub last_indexed: SystemTime,
}

/// Accessor for the metadata record of one backend on one table column
#[derive(Clone)]
pub struct MetadataStore {
    container: GeoPackage,
    table: TableColumn,
    location: IndexLocation,
    extension: &'static str,
}

impl MetadataStore {
    pub fn new(container: GeoPackage, table: TableColumn, location: IndexLocation) -> Result<Self> {
        let extension = location
            .extension_name()
            .ok_or(IndexError::NoIndexLocation)?;
        Ok(Self {
            container,
            table,
            location,
            extension,
        })
    }

    pub fn location(&self) -> IndexLocation {
        self.location
    }

    fn key(&self) -> (TableColumn, String) {
        (self.table.clone(), self.extension.to_string())
    }

    pub fn get(&self) -> Result<Option<IndexMetadata>> {
        let key = self.key();
        self.container.view(|inner| {
            Ok(inner.table_index.get(&key).and_then(|record| {
                record.last_indexed.map(|last_indexed| IndexMetadata {
                    table_name: record.table_name.clone(),
                    geometry_column: record.geometry_column.clone(),
                    location: self.location,
                    last_indexed,
                })
            }))
        })
    }

    pub fn is_indexed(&self) -> Result<bool> {
        Ok(self.get()?.is_some())
    }

    pub fn last_indexed(&self) -> Result<Option<SystemTime>> {
        Ok(self.get()?.map(|metadata| metadata.last_indexed))
    }

    /// Create or refresh the record with the current time.
    ///
    /// The stored time is strictly later than the previous one, so two builds
    /// within the clock's resolution are still ordered.
    pub fn touch(&self) -> Result<SystemTime> {
        let key = self.key();
        self.container.update(|inner| {
            let record = inner
                .table_index
                .entry(key)
                .or_insert_with(|| TableIndexRecord {
                    table_name: self.table.table.clone(),
                    geometry_column: self.table.column.clone(),
                    extension: self.extension.to_string(),
                    last_indexed: None,
                });

            let now = SystemTime::now();
            let stamp = match record.last_indexed {
                Some(previous) if now <= previous => previous + Duration::from_micros(1),
                _ => now,
            };
            record.last_indexed = Some(stamp);
            Ok(stamp)
        })
    }

    /// Delete the record. Returns whether one existed.
    pub fn delete(&self) -> Result<bool> {
        let key = self.key();
        let removed = self
            .container
            .update(|inner| Ok(inner.table_index.remove(&key).is_some()))?;
        if removed {
            log::debug!(
                "Deleted {} metadata for {}.{}",
                self.location,
                self.table.table,
                self.table.column
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Projection;

    fn store(gpkg: &GeoPackage, location: IndexLocation) -> MetadataStore {
        MetadataStore::new(gpkg.clone(), TableColumn::new("t", "geom"), location).unwrap()
    }

    #[test]
    fn test_touch_creates_then_advances() {
        let gpkg = GeoPackage::memory().unwrap();
        gpkg.create_feature_table("t", "geom", Projection::wgs84())
            .unwrap();
        let metadata = store(&gpkg, IndexLocation::ExtensionTable);

        assert!(!metadata.is_indexed().unwrap());
        let first = metadata.touch().unwrap();
        let second = metadata.touch().unwrap();
        assert!(second > first);
        assert_eq!(metadata.last_indexed().unwrap(), Some(second));

        let record = metadata.get().unwrap().unwrap();
        assert_eq!(record.table_name, "t");
        assert_eq!(record.geometry_column, "geom");
        assert_eq!(record.location, IndexLocation::ExtensionTable);
    }

    #[test]
    fn test_records_are_per_backend() {
        let gpkg = GeoPackage::memory().unwrap();
        let extension = store(&gpkg, IndexLocation::ExtensionTable);
        let rtree = store(&gpkg, IndexLocation::RangeTree);

        extension.touch().unwrap();
        assert!(extension.is_indexed().unwrap());
        assert!(!rtree.is_indexed().unwrap());

        assert!(extension.delete().unwrap());
        assert!(!extension.delete().unwrap());
        assert!(!extension.is_indexed().unwrap());
    }

    #[test]
    fn test_no_record_for_none_location() {
        let gpkg = GeoPackage::memory().unwrap();
        assert!(matches!(
            MetadataStore::new(gpkg, TableColumn::new("t", "geom"), IndexLocation::None),
            Err(IndexError::NoIndexLocation)
        ));
    }
}
