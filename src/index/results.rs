//! Lazy result cursor over matched feature rows

use crate::container::{FeatureRow, FeatureSource, QueryHandle};
use crate::error::Result;
use std::sync::Arc;
use std::vec::IntoIter;

/// Rows matched by an index query.
///
/// Ids are fixed when the query runs; each row is fetched from the table only
/// when the cursor reaches it. Rows deleted in between are skipped. The
/// cursor holds an open query handle on the container until it is exhausted,
/// [closed](Self::close) or dropped.
///
/// # Examples
///
/// ```rust
/// use gpkg_index::{BoundingBox, FeatureIndexManager, FeatureRow, GeoPackage, GeometryData, Projection};
/// use geo::{Geometry, Point};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let gpkg = GeoPackage::memory()?;
/// let dao = gpkg.create_feature_table("pois", "geom", Projection::wgs84())?;
/// let point = GeometryData::from_geometry(4326, &Geometry::Point(Point::new(2.0, 3.0)));
/// dao.insert(FeatureRow::new().with_geometry(&point))?;
///
/// let manager = FeatureIndexManager::new(&gpkg, "pois")?;
/// manager.index()?;
///
/// let results = manager.query_bounding_box(&BoundingBox::new(0.0, 0.0, 5.0, 5.0))?;
/// assert_eq!(results.result_count(), 1);
/// for row in results {
///     assert_eq!(row?.id, 1);
/// }
/// assert_eq!(gpkg.open_query_handles(), 0);
/// # Ok(())
/// # }
/// ```
pub struct FeatureIndexResults {
    ids: IntoIter<i64>,
    total: u64,
    source: Arc<dyn FeatureSource>,
    handle: Option<QueryHandle>,
}

impl FeatureIndexResults {
    pub(crate) fn new(ids: Vec<i64>, source: Arc<dyn FeatureSource>, handle: QueryHandle) -> Self {
        Self {
            total: ids.len() as u64,
            ids: ids.into_iter(),
            source,
            handle: Some(handle),
        }
    }

    /// Number of matched rows, fixed when the query ran
    pub fn result_count(&self) -> u64 {
        self.total
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Release the query handle. Later calls to `next` return `None`.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            self.ids = Vec::new().into_iter();
        }
    }

    /// Remaining matched ids without fetching rows
    pub fn into_ids(mut self) -> Vec<i64> {
        if self.is_closed() {
            return Vec::new();
        }
        std::mem::take(&mut self.ids).collect()
    }
}

impl Iterator for FeatureIndexResults {
    type Item = Result<FeatureRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.handle.as_ref()?;
        for id in self.ids.by_ref() {
            match self.source.get_row(id) {
                Ok(Some(row)) => return Some(Ok(row)),
                Ok(None) => {
                    log::debug!(
                        "Skipping {} row {} deleted since the query ran",
                        self.source.table_name(),
                        id
                    );
                }
                Err(e) => return Some(Err(e)),
            }
        }
        self.handle = None;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}

impl std::fmt::Debug for FeatureIndexResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureIndexResults")
            .field("table", &self.source.table_name())
            .field("total", &self.total)
            .field("remaining", &self.ids.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
