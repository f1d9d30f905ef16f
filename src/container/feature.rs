//! Feature tables and row access

use super::GeoPackage;
use crate::envelope::Envelope;
use crate::error::{IndexError, Result};
use crate::geometry::{GeoPackageGeometryDecoder, GeometryData, GeometryDecoder};
use crate::projection::Projection;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

/// Default number of rows fetched per chunk by [`FeatureRows`]
pub const DEFAULT_CHUNK_LIMIT: usize = 1000;

/// Row access used by the index subsystem.
///
/// This is the seam between indexing and the container's relational layer:
/// the rebuild driver walks [`rows`](FeatureSource::rows), and result cursors
/// resolve matched ids through [`get_row`](FeatureSource::get_row).
pub trait FeatureSource: Send + Sync {
    fn table_name(&self) -> &str;

    fn geometry_column(&self) -> &str;

    /// Native projection of the geometry column
    fn projection(&self) -> &Projection;

    fn row_count(&self) -> Result<u64>;

    /// Forward cursor over every row in id order
    fn rows(&self) -> Box<dyn Iterator<Item = Result<FeatureRow>> + '_>;

    fn get_row(&self, id: i64) -> Result<Option<FeatureRow>>;
}

/// Attribute value of a feature row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// A feature: optional geometry blob plus attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Row id, assigned by the container on insert
    pub id: i64,
    /// GeoPackage geometry blob, `None` for a NULL geometry
    pub geometry: Option<Bytes>,
    pub attributes: BTreeMap<String, Value>,
}

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geometry(mut self, geometry: &GeometryData) -> Self {
        self.geometry = Some(geometry.to_bytes());
        self
    }

    /// Store a raw geometry column value as is.
    pub fn with_raw_geometry(mut self, geometry: impl Into<Bytes>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn set_geometry(&mut self, geometry: Option<&GeometryData>) {
        self.geometry = geometry.map(GeometryData::to_bytes);
    }

    /// Envelope of the row's geometry, `None` when absent or unreadable.
    pub fn geometry_envelope(&self) -> Option<Envelope> {
        self.geometry
            .as_ref()
            .and_then(|geometry| GeoPackageGeometryDecoder.envelope_of(geometry))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FeatureTable {
    pub name: String,
    pub geometry_column: String,
    pub projection: Projection,
    pub rows: BTreeMap<i64, FeatureRow>,
    pub next_id: i64,
}

impl FeatureTable {
    pub fn new(name: &str, geometry_column: &str, projection: Projection) -> Self {
        Self {
            name: name.to_string(),
            geometry_column: geometry_column.to_string(),
            projection,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

/// Data access object for one feature table.
#[derive(Clone)]
pub struct FeatureDao {
    container: GeoPackage,
    table: String,
    geometry_column: String,
    projection: Projection,
    chunk_limit: usize,
}

impl FeatureDao {
    pub(crate) fn new(
        container: GeoPackage,
        table: String,
        geometry_column: String,
        projection: Projection,
    ) -> Self {
        Self {
            container,
            table,
            geometry_column,
            projection,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
        }
    }

    /// Set how many rows [`rows`](Self::rows) reads per lock acquisition.
    pub fn with_chunk_limit(mut self, chunk_limit: usize) -> Self {
        self.chunk_limit = chunk_limit.max(1);
        self
    }

    pub fn container(&self) -> &GeoPackage {
        &self.container
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Insert a row and return its assigned id. The row's own id is ignored.
    pub fn insert(&self, mut row: FeatureRow) -> Result<i64> {
        self.container.update(|inner| {
            let table = inner.table_mut(&self.table)?;
            let id = table.next_id;
            table.next_id += 1;
            row.id = id;
            table.rows.insert(id, row);
            Ok(id)
        })
    }

    /// Replace an existing row. Returns `false` if no row has that id.
    pub fn update(&self, row: &FeatureRow) -> Result<bool> {
        self.container.update(|inner| {
            let table = inner.table_mut(&self.table)?;
            match table.rows.get_mut(&row.id) {
                Some(existing) => {
                    *existing = row.clone();
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        self.container.update(|inner| {
            let table = inner.table_mut(&self.table)?;
            Ok(table.rows.remove(&id).is_some())
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<FeatureRow>> {
        self.container
            .view(|inner| Ok(inner.table(&self.table)?.rows.get(&id).cloned()))
    }

    /// Fetch a row that must exist.
    pub fn get_required(&self, id: i64) -> Result<FeatureRow> {
        self.get(id)?.ok_or_else(|| IndexError::RowNotFound {
            table: self.table.clone(),
            id,
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.container
            .view(|inner| Ok(inner.table(&self.table)?.rows.len() as u64))
    }

    /// Forward cursor over all rows in id order.
    pub fn rows(&self) -> FeatureRows {
        FeatureRows {
            dao: self.clone(),
            after: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn next_chunk(&self, after: Option<i64>) -> Result<Vec<FeatureRow>> {
        self.container.view(|inner| {
            let rows = &inner.table(&self.table)?.rows;
            let range = match after {
                Some(id) => rows.range((Bound::Excluded(id), Bound::Unbounded)),
                None => rows.range(..),
            };
            Ok(range
                .take(self.chunk_limit)
                .map(|(_, row)| row.clone())
                .collect())
        })
    }
}

impl FeatureSource for FeatureDao {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    fn projection(&self) -> &Projection {
        &self.projection
    }

    fn row_count(&self) -> Result<u64> {
        self.count()
    }

    fn rows(&self) -> Box<dyn Iterator<Item = Result<FeatureRow>> + '_> {
        Box::new(FeatureDao::rows(self))
    }

    fn get_row(&self, id: i64) -> Result<Option<FeatureRow>> {
        self.get(id)
    }
}

/// Chunked forward cursor over a feature table.
///
/// Rows are read `chunk_limit` at a time so the container lock is released
/// between chunks; rows inserted behind the cursor position are not seen.
pub struct FeatureRows {
    dao: FeatureDao,
    after: Option<i64>,
    buffer: VecDeque<FeatureRow>,
    done: bool,
}

impl Iterator for FeatureRows {
    type Item = Result<FeatureRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            match self.dao.next_chunk(self.after) {
                Ok(chunk) => {
                    if chunk.len() < self.dao.chunk_limit {
                        self.done = true;
                    }
                    self.buffer.extend(chunk);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        let row = self.buffer.pop_front()?;
        self.after = Some(row.id);
        Some(Ok(row))
    }
}
