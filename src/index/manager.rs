//! Feature index manager

use super::manual::ManualFeatureQuery;
use super::metadata::{IndexMetadata, MetadataStore};
use super::progress::Progress;
use super::range_tree::drop_range_index;
use super::results::FeatureIndexResults;
use super::{
    ExtensionTableIndex, FeatureIndexBackend, IndexLocation, IndexSummary, RangeTreeIndex,
    RebuildOptions,
};
use crate::config::IndexConfig;
use crate::container::{FeatureRow, FeatureSource, GeoPackage, TableColumn};
use crate::envelope::{BoundingBox, Envelope};
use crate::error::{IndexError, Result};
use crate::geometry::{GeoPackageGeometryDecoder, GeometryDecoder};
use crate::projection::{Projection, ProjectionFactory, StandardProjections};
use std::sync::Arc;
use std::time::SystemTime;

/// Builds, maintains and queries the spatial index of one feature table.
///
/// One index location is active at a time. Index data and metadata live in
/// the container, so managers created over the same table agree on whether
/// it is indexed.
///
/// # Examples
///
/// ```rust
/// use gpkg_index::{
///     BoundingBox, FeatureIndexManager, FeatureRow, GeoPackage, GeometryData, IndexLocation,
///     Projection,
/// };
/// use geo::{Geometry, Point};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let gpkg = GeoPackage::memory()?;
/// let dao = gpkg.create_feature_table("stations", "geom", Projection::wgs84())?;
/// for (x, y) in [(1.0, 1.0), (4.0, 4.0), (40.0, 40.0)] {
///     let point = GeometryData::from_geometry(4326, &Geometry::Point(Point::new(x, y)));
///     dao.insert(FeatureRow::new().with_geometry(&point))?;
/// }
///
/// let mut manager = FeatureIndexManager::new(&gpkg, "stations")?;
/// manager.set_index_location(IndexLocation::RangeTree)?;
/// assert_eq!(manager.index()?, 3);
/// assert_eq!(manager.index()?, 0);
///
/// let near = BoundingBox::new(0.0, 0.0, 5.0, 5.0);
/// assert_eq!(manager.count_bounding_box(&near)?, 2);
///
/// // The same box expressed in Web Mercator meters
/// let near_mercator = BoundingBox::new(0.0, 0.0, 556_597.5, 557_305.3);
/// assert_eq!(manager.count_projected(&near_mercator, &Projection::web_mercator())?, 2);
/// # Ok(())
/// # }
/// ```
pub struct FeatureIndexManager {
    container: GeoPackage,
    source: Arc<dyn FeatureSource>,
    table: TableColumn,
    config: IndexConfig,
    backend: Option<Box<dyn FeatureIndexBackend>>,
    decoder: Arc<dyn GeometryDecoder>,
    projections: Arc<dyn ProjectionFactory>,
    progress: Option<Arc<dyn Progress>>,
}

impl FeatureIndexManager {
    /// Manager for a feature table with the default configuration.
    pub fn new(container: &GeoPackage, table: &str) -> Result<Self> {
        Self::with_config(container, table, IndexConfig::default())
    }

    pub fn with_config(container: &GeoPackage, table: &str, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let dao = container
            .feature_dao(table)?
            .with_chunk_limit(config.chunk_limit);
        Self::with_source(container, Arc::new(dao), config)
    }

    /// Manager reading rows from a custom source. Index data is still kept
    /// in `container`.
    pub fn with_source(
        container: &GeoPackage,
        source: Arc<dyn FeatureSource>,
        config: IndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        let table = TableColumn::new(source.table_name(), source.geometry_column());
        let backend = open_backend(container, &table, config.location)?;
        Ok(Self {
            container: container.clone(),
            source,
            table,
            config,
            backend,
            decoder: Arc::new(GeoPackageGeometryDecoder),
            projections: Arc::new(StandardProjections),
            progress: None,
        })
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn GeometryDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_projections(mut self, projections: Arc<dyn ProjectionFactory>) -> Self {
        self.projections = projections;
        self
    }

    /// Attach or detach the observer notified during rebuilds.
    pub fn set_progress(&mut self, progress: Option<Arc<dyn Progress>>) {
        self.progress = progress;
    }

    pub fn set_continue_on_error(&mut self, continue_on_error: bool) {
        self.config.continue_on_error = continue_on_error;
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn table_name(&self) -> &str {
        &self.table.table
    }

    pub fn geometry_column(&self) -> &str {
        &self.table.column
    }

    /// Native projection of the table's geometry column
    pub fn projection(&self) -> &Projection {
        self.source.projection()
    }

    pub fn location(&self) -> IndexLocation {
        self.config.location
    }

    /// Select the active index location.
    ///
    /// Selecting [`IndexLocation::RangeTree`] on a container without the
    /// range-index module fails with [`IndexError::Unsupported`] and leaves
    /// the previous selection in place.
    pub fn set_index_location(&mut self, location: IndexLocation) -> Result<()> {
        self.backend = open_backend(&self.container, &self.table, location)?;
        self.config.location = location;
        log::debug!(
            "Index location for {}.{} set to {}",
            self.table.table,
            self.table.column,
            location
        );
        Ok(())
    }

    fn active(&self) -> Result<&dyn FeatureIndexBackend> {
        self.backend.as_deref().ok_or(IndexError::NoIndexLocation)
    }

    /// Active backend when it has been built
    fn built(&self) -> Result<Option<&dyn FeatureIndexBackend>> {
        let Some(backend) = self.backend.as_deref() else {
            return Ok(None);
        };
        Ok(backend.is_indexed()?.then_some(backend))
    }

    fn manual(&self) -> ManualFeatureQuery {
        ManualFeatureQuery::new(Arc::clone(&self.source), Arc::clone(&self.decoder))
    }

    fn results(&self, ids: Vec<i64>) -> FeatureIndexResults {
        FeatureIndexResults::new(ids, Arc::clone(&self.source), self.container.acquire_query())
    }

    /// Whether the active location has been built. Always `false` for
    /// [`IndexLocation::None`].
    pub fn is_indexed(&self) -> Result<bool> {
        match self.backend.as_deref() {
            Some(backend) => backend.is_indexed(),
            None => Ok(false),
        }
    }

    pub fn last_indexed(&self) -> Result<Option<SystemTime>> {
        match self.backend.as_deref() {
            Some(backend) => backend.last_indexed(),
            None => Ok(None),
        }
    }

    pub fn metadata(&self) -> Result<Option<IndexMetadata>> {
        match self.backend.as_deref() {
            Some(backend) => backend.metadata().get(),
            None => Ok(None),
        }
    }

    /// Whether a given location has been built, regardless of the active one
    pub fn is_indexed_at(&self, location: IndexLocation) -> Result<bool> {
        if location == IndexLocation::None {
            return Ok(false);
        }
        MetadataStore::new(self.container.clone(), self.table.clone(), location)?.is_indexed()
    }

    /// Locations that have been built for this table
    pub fn indexed_locations(&self) -> Result<Vec<IndexLocation>> {
        let mut locations = Vec::new();
        for location in IndexLocation::BACKENDS {
            if self.is_indexed_at(location)? {
                locations.push(location);
            }
        }
        Ok(locations)
    }

    /// Build the active index if it is not built yet. Returns the number of
    /// rows that produced an entry, 0 when it was already built.
    pub fn index(&self) -> Result<u64> {
        Ok(self.index_with(false)?.indexed)
    }

    /// Rebuild the active index from scratch.
    pub fn index_force(&self) -> Result<u64> {
        Ok(self.index_with(true)?.indexed)
    }

    pub fn index_with(&self, force: bool) -> Result<IndexSummary> {
        self.rebuild(self.active()?, force)
    }

    /// Build several locations in turn, independent of the active one.
    pub fn index_locations(
        &self,
        locations: &[IndexLocation],
        force: bool,
    ) -> Result<Vec<(IndexLocation, IndexSummary)>> {
        let mut summaries = Vec::with_capacity(locations.len());
        for &location in locations {
            let backend = open_backend(&self.container, &self.table, location)?
                .ok_or(IndexError::NoIndexLocation)?;
            summaries.push((location, self.rebuild(backend.as_ref(), force)?));
        }
        Ok(summaries)
    }

    fn rebuild(&self, backend: &dyn FeatureIndexBackend, force: bool) -> Result<IndexSummary> {
        backend.rebuild(
            self.source.as_ref(),
            self.decoder.as_ref(),
            RebuildOptions {
                force,
                continue_on_error: self.config.continue_on_error,
                progress: self.progress.as_deref(),
            },
        )
    }

    /// Index a single row, replacing its previous entry. Returns whether the
    /// row now has an entry.
    pub fn index_row(&self, row: &FeatureRow) -> Result<bool> {
        let backend = self.active()?;
        backend.remove(row.id)?;
        let envelope = super::row_envelope(self.decoder.as_ref(), row);
        let indexed = backend.put(row.id, envelope.as_ref())?;
        backend.metadata().touch()?;
        log::debug!(
            "Indexed {} row {} in {} ({})",
            self.table.table,
            row.id,
            backend.location(),
            if indexed { "entry" } else { "no entry" }
        );
        Ok(indexed)
    }

    /// Delete the active index and its metadata.
    pub fn delete_index(&self) -> Result<bool> {
        let backend = self.active()?;
        let deleted = backend.clear()?;
        if deleted {
            log::info!(
                "Deleted {} index on {}.{}",
                backend.location(),
                self.table.table,
                self.table.column
            );
        }
        Ok(deleted)
    }

    /// Remove one row's entry from the active index. Metadata is unchanged.
    pub fn delete_index_row(&self, id: i64) -> Result<bool> {
        self.active()?.remove(id)
    }

    /// Delete the index and metadata of every location, whichever is active.
    pub fn delete_all_indexes(&self) -> Result<bool> {
        let mut deleted = false;
        for location in IndexLocation::BACKENDS {
            match open_backend(&self.container, &self.table, location) {
                Ok(Some(backend)) => deleted |= backend.clear()?,
                Ok(None) => {}
                Err(IndexError::Unsupported(IndexLocation::RangeTree)) => {
                    // Index data can outlive the module, e.g. in a reopened file
                    deleted |= drop_range_index(&self.container, &self.table)?;
                    let metadata =
                        MetadataStore::new(self.container.clone(), self.table.clone(), location)?;
                    deleted |= metadata.delete()?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    /// Number of indexed entries, or of rows when no index is active.
    pub fn count(&self) -> Result<u64> {
        if self.backend.is_none() {
            return self.manual().count();
        }
        match self.built()? {
            Some(backend) => backend.count(),
            None => Ok(0),
        }
    }

    /// All indexed rows, or every row when no index is active.
    pub fn query(&self) -> Result<FeatureIndexResults> {
        let ids = if self.backend.is_none() {
            self.manual().query_all()?
        } else {
            match self.built()? {
                Some(backend) => backend.query_all()?,
                None => Vec::new(),
            }
        };
        Ok(self.results(ids))
    }

    pub fn count_envelope(&self, envelope: &Envelope) -> Result<u64> {
        if self.backend.is_none() {
            return self.manual().count_envelope(envelope);
        }
        match self.built()? {
            Some(backend) => backend.count_envelope(envelope),
            None => Ok(0),
        }
    }

    pub fn query_envelope(&self, envelope: &Envelope) -> Result<FeatureIndexResults> {
        log::debug!("Querying {} for {}", self.table.table, envelope);
        let ids = if self.backend.is_none() {
            self.manual().query_envelope(envelope)?
        } else {
            match self.built()? {
                Some(backend) => backend.query_envelope(envelope)?,
                None => Vec::new(),
            }
        };
        Ok(self.results(ids))
    }

    /// Count rows intersecting a box in the table's native projection.
    pub fn count_bounding_box(&self, bounding_box: &BoundingBox) -> Result<u64> {
        self.count_envelope(&bounding_box.to_envelope())
    }

    pub fn query_bounding_box(&self, bounding_box: &BoundingBox) -> Result<FeatureIndexResults> {
        self.query_envelope(&bounding_box.to_envelope())
    }

    /// Count rows intersecting a box given in another projection.
    pub fn count_projected(
        &self,
        bounding_box: &BoundingBox,
        projection: &Projection,
    ) -> Result<u64> {
        let envelope = self.native_envelope(bounding_box, projection)?;
        self.count_envelope(&envelope)
    }

    pub fn query_projected(
        &self,
        bounding_box: &BoundingBox,
        projection: &Projection,
    ) -> Result<FeatureIndexResults> {
        let envelope = self.native_envelope(bounding_box, projection)?;
        self.query_envelope(&envelope)
    }

    fn native_envelope(&self, bounding_box: &BoundingBox, projection: &Projection) -> Result<Envelope> {
        let native = self.source.projection();
        if projection == native {
            return Ok(bounding_box.to_envelope());
        }
        let transform = self.projections.transformation(projection, native)?;
        let transformed = bounding_box.transform(transform.as_ref())?;
        log::debug!(
            "Transformed {} from {} to {} as {}",
            bounding_box,
            projection,
            native,
            transformed
        );
        Ok(transformed.to_envelope())
    }

    /// Extent of the indexed geometries in the native projection. Scans the
    /// table when no index is active.
    pub fn bounding_box(&self) -> Result<Option<BoundingBox>> {
        let extent = if self.backend.is_none() {
            self.manual().extent()?
        } else {
            match self.built()? {
                Some(backend) => backend.extent()?,
                None => None,
            }
        };
        Ok(extent.as_ref().map(BoundingBox::from))
    }

    /// Extent of the indexed geometries transformed into `projection`.
    pub fn bounding_box_in(&self, projection: &Projection) -> Result<Option<BoundingBox>> {
        let Some(bounding_box) = self.bounding_box()? else {
            return Ok(None);
        };
        let native = self.source.projection();
        if projection == native {
            return Ok(Some(bounding_box));
        }
        let transform = self.projections.transformation(native, projection)?;
        Ok(Some(bounding_box.transform(transform.as_ref())?))
    }
}

fn open_backend(
    container: &GeoPackage,
    table: &TableColumn,
    location: IndexLocation,
) -> Result<Option<Box<dyn FeatureIndexBackend>>> {
    let backend: Box<dyn FeatureIndexBackend> = match location {
        IndexLocation::None => return Ok(None),
        IndexLocation::ExtensionTable => {
            Box::new(ExtensionTableIndex::new(container.clone(), table.clone())?)
        }
        IndexLocation::RangeTree => Box::new(RangeTreeIndex::new(container.clone(), table.clone())?),
    };
    Ok(Some(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeoPackageBuilder;
    use crate::geometry::GeometryData;
    use geo::{Geometry, Point};

    fn point(x: f64, y: f64) -> GeometryData {
        GeometryData::from_geometry(4326, &Geometry::Point(Point::new(x, y)))
    }

    fn table_with_points(gpkg: &GeoPackage, points: &[(f64, f64)]) {
        let dao = gpkg
            .create_feature_table("t", "geom", Projection::wgs84())
            .unwrap();
        for &(x, y) in points {
            dao.insert(FeatureRow::new().with_geometry(&point(x, y)))
                .unwrap();
        }
    }

    #[test]
    fn test_location_none_scans_and_refuses_mutation() {
        let gpkg = GeoPackage::memory().unwrap();
        table_with_points(&gpkg, &[(1.0, 1.0), (9.0, 9.0)]);
        let config = IndexConfig::default().with_location(IndexLocation::None);
        let manager = FeatureIndexManager::with_config(&gpkg, "t", config).unwrap();

        assert!(!manager.is_indexed().unwrap());
        assert_eq!(manager.count().unwrap(), 2);
        assert_eq!(
            manager
                .count_bounding_box(&BoundingBox::new(0.0, 0.0, 2.0, 2.0))
                .unwrap(),
            1
        );
        assert!(matches!(manager.index(), Err(IndexError::NoIndexLocation)));
        assert!(matches!(
            manager.delete_index_row(1),
            Err(IndexError::NoIndexLocation)
        ));
    }

    #[test]
    fn test_unbuilt_index_yields_nothing() {
        let gpkg = GeoPackage::memory().unwrap();
        table_with_points(&gpkg, &[(1.0, 1.0)]);
        let manager = FeatureIndexManager::new(&gpkg, "t").unwrap();

        assert_eq!(manager.count().unwrap(), 0);
        assert_eq!(manager.query().unwrap().result_count(), 0);
        assert_eq!(manager.bounding_box().unwrap(), None);
        assert_eq!(manager.last_indexed().unwrap(), None);
    }

    #[test]
    fn test_failed_selection_keeps_previous_location() {
        let gpkg = GeoPackageBuilder::new().rtree_module(false).build().unwrap();
        table_with_points(&gpkg, &[(1.0, 1.0)]);
        let mut manager = FeatureIndexManager::new(&gpkg, "t").unwrap();

        assert!(matches!(
            manager.set_index_location(IndexLocation::RangeTree),
            Err(IndexError::Unsupported(IndexLocation::RangeTree))
        ));
        assert_eq!(manager.location(), IndexLocation::ExtensionTable);
        assert_eq!(manager.index().unwrap(), 1);
    }

    #[test]
    fn test_bounding_box_in_other_projection() {
        let gpkg = GeoPackage::memory().unwrap();
        table_with_points(&gpkg, &[(0.0, 0.0), (10.0, 5.0)]);
        let manager = FeatureIndexManager::new(&gpkg, "t").unwrap();
        manager.index().unwrap();

        let native = manager.bounding_box().unwrap().unwrap();
        assert_eq!(native, BoundingBox::new(0.0, 0.0, 10.0, 5.0));

        let mercator = manager
            .bounding_box_in(&Projection::web_mercator())
            .unwrap()
            .unwrap();
        assert!(mercator.min_x.abs() < 1e-6);
        assert!((mercator.max_x - 1_113_194.9).abs() < 1.0);
    }
}
