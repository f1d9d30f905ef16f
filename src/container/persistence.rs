//! Snapshot persistence for file-backed containers
//!
//! The whole container state is written as one bincode snapshot behind an
//! 8-byte header (magic, version). Writes go
//! to a sibling temporary file that is then renamed over the target, so a
//! crash mid-write leaves the previous snapshot intact. Range indexes are
//! stored as `(id, box)` lists and bulk loaded on open.

use super::feature::FeatureTable;
use super::{ContainerInner, ExtensionRecord, RangeIndex, TableColumn, TableIndexRecord};
use crate::envelope::Envelope;
use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const SNAPSHOT_MAGIC: [u8; 4] = *b"GPKI";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    features: BTreeMap<String, FeatureTable>,
    geometry_index: BTreeMap<TableColumn, BTreeMap<i64, Envelope>>,
    range_indexes: BTreeMap<TableColumn, (String, Vec<(i64, Option<Envelope>)>)>,
    table_index: Vec<TableIndexRecord>,
    extensions: BTreeSet<ExtensionRecord>,
}

pub(crate) fn write_snapshot(path: &Path, inner: &ContainerInner) -> Result<()> {
    let snapshot = Snapshot {
        features: inner.features.clone(),
        geometry_index: inner.geometry_index.clone(),
        range_indexes: inner
            .range_indexes
            .iter()
            .map(|(key, index)| (key.clone(), (index.name().to_string(), index.entries())))
            .collect(),
        table_index: inner.table_index.values().cloned().collect(),
        extensions: inner.extensions.clone(),
    };

    let temp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        writer.write_all(&SNAPSHOT_MAGIC)?;
        writer.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut writer, &snapshot)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&temp_path, path)?;

    log::debug!(
        "Wrote container snapshot to {} ({} feature tables)",
        path.display(),
        snapshot.features.len()
    );
    Ok(())
}

pub(crate) fn load_snapshot(path: &Path, inner: &mut ContainerInner) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).map_err(|_| {
        IndexError::Serialization(format!("{} is not a container snapshot", path.display()))
    })?;

    if header[..4] != SNAPSHOT_MAGIC {
        return Err(IndexError::Serialization(format!(
            "{} is not a container snapshot",
            path.display()
        )));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != SNAPSHOT_VERSION {
        return Err(IndexError::Serialization(format!(
            "unsupported snapshot version {}",
            version
        )));
    }
    let snapshot: Snapshot = bincode::deserialize_from(reader)?;

    if !inner.rtree_module && !snapshot.range_indexes.is_empty() {
        log::warn!(
            "Container {} has {} range indexes but the range-index module is disabled",
            path.display(),
            snapshot.range_indexes.len()
        );
    }

    inner.features = snapshot.features;
    inner.geometry_index = snapshot.geometry_index;
    inner.range_indexes = snapshot
        .range_indexes
        .into_iter()
        .map(|(key, (name, entries))| (key, RangeIndex::bulk_load(name, entries)))
        .collect();
    inner.table_index = snapshot
        .table_index
        .into_iter()
        .map(|record| {
            let key = (
                TableColumn::new(&record.table_name, &record.geometry_column),
                record.extension.clone(),
            );
            (key, record)
        })
        .collect();
    inner.extensions = snapshot.extensions;
    inner.dirty = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{FeatureRow, GeoPackage};
    use crate::projection::Projection;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("round_trip.gpkg");

        {
            let gpkg = GeoPackage::open(&path).unwrap();
            let dao = gpkg
                .create_feature_table("parks", "geom", Projection::wgs84())
                .unwrap();
            dao.insert(FeatureRow::new().with_attribute("name", "Central"))
                .unwrap();
            gpkg.update(|inner| {
                let key = TableColumn::new("parks", "geom");
                let mut index = RangeIndex::new("rtree_parks_geom");
                index.insert(1, Some(&Envelope::point(1.0, 2.0)));
                inner.range_indexes.insert(key, index);
                Ok(())
            })
            .unwrap();
            gpkg.close().unwrap();
        }

        let reopened = GeoPackage::open(&path).unwrap();
        assert_eq!(reopened.feature_tables().unwrap(), vec!["parks"]);
        let count = reopened
            .view(|inner| {
                let index = &inner.range_indexes[&TableColumn::new("parks", "geom")];
                Ok(index.count_intersecting(&Envelope::point(1.0, 2.0)))
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rejects_foreign_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.gpkg");
        fs::write(&path, b"definitely not a snapshot").unwrap();
        assert!(GeoPackage::open(&path).is_err());
    }
}
