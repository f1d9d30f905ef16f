//! Full-scan queries for tables without an index

use crate::container::FeatureSource;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::geometry::GeometryDecoder;
use std::sync::Arc;

/// Answers index queries by decoding every row's geometry.
///
/// Used when the active index location is `None`. Counts and queries over
/// all rows include rows without geometry; envelope queries only match rows
/// whose geometry envelope intersects.
pub struct ManualFeatureQuery {
    source: Arc<dyn FeatureSource>,
    decoder: Arc<dyn GeometryDecoder>,
}

impl ManualFeatureQuery {
    pub fn new(source: Arc<dyn FeatureSource>, decoder: Arc<dyn GeometryDecoder>) -> Self {
        Self { source, decoder }
    }

    pub fn count(&self) -> Result<u64> {
        self.source.row_count()
    }

    pub fn query_all(&self) -> Result<Vec<i64>> {
        self.source.rows().map(|row| row.map(|row| row.id)).collect()
    }

    pub fn count_envelope(&self, envelope: &Envelope) -> Result<u64> {
        Ok(self.query_envelope(envelope)?.len() as u64)
    }

    pub fn query_envelope(&self, envelope: &Envelope) -> Result<Vec<i64>> {
        log::debug!(
            "Scanning {} for rows intersecting {}",
            self.source.table_name(),
            envelope
        );
        let mut ids = Vec::new();
        self.scan(|id, row_envelope| {
            if row_envelope.intersects(envelope) {
                ids.push(id);
            }
        })?;
        Ok(ids)
    }

    /// Union of all row envelopes
    pub fn extent(&self) -> Result<Option<Envelope>> {
        let mut extent: Option<Envelope> = None;
        self.scan(|_, row_envelope| {
            extent = Some(match extent {
                Some(current) => current.union(&row_envelope),
                None => row_envelope,
            });
        })?;
        Ok(extent)
    }

    fn scan(&self, mut visit: impl FnMut(i64, Envelope)) -> Result<()> {
        for row in self.source.rows() {
            let row = row?;
            if let Some(envelope) = super::row_envelope(self.decoder.as_ref(), &row) {
                visit(row.id, envelope);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{FeatureRow, GeoPackage};
    use crate::geometry::{GeoPackageGeometryDecoder, GeometryData};
    use crate::projection::Projection;
    use geo::{Geometry, Point};

    #[test]
    fn test_scans_every_row() {
        let gpkg = GeoPackage::memory().unwrap();
        let dao = gpkg
            .create_feature_table("t", "geom", Projection::wgs84())
            .unwrap();
        for (x, y) in [(1.0, 1.0), (8.0, 8.0), (20.0, 20.0)] {
            let geometry = GeometryData::from_geometry(4326, &Geometry::Point(Point::new(x, y)));
            dao.insert(FeatureRow::new().with_geometry(&geometry))
                .unwrap();
        }
        dao.insert(FeatureRow::new()).unwrap();

        let query = ManualFeatureQuery::new(Arc::new(dao), Arc::new(GeoPackageGeometryDecoder));
        assert_eq!(query.count().unwrap(), 4);
        assert_eq!(query.query_all().unwrap(), vec![1, 2, 3, 4]);

        let window = Envelope::xy(0.0, 10.0, 0.0, 10.0);
        assert_eq!(query.query_envelope(&window).unwrap(), vec![1, 2]);
        assert_eq!(query.count_envelope(&window).unwrap(), 2);
        assert_eq!(
            query.extent().unwrap(),
            Some(Envelope::xy(1.0, 20.0, 1.0, 20.0))
        );
    }
}
