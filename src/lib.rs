//! # gpkg-index - spatial indexing for GeoPackage feature tables
//!
//! gpkg-index builds and maintains the spatial index of feature tables stored
//! in a single-file container, and answers "which features intersect this
//! region" without scanning every row.
//!
//! ## Features
//!
//! - **Two index backends**: a shadow extension table of per-row envelopes, and
//!   the container's native R*-tree range index
//! - **Consistent metadata**: per-table build timestamps shared by every
//!   manager over the same container
//! - **Incremental maintenance**: single-row index and delete next to full and
//!   forced rebuilds
//! - **Projected queries**: query boxes in any supported projection are
//!   transformed into the table's native projection
//! - **Lazy results**: matched rows are fetched as the cursor advances
//! - **Progress and cancellation**: cooperative, polled once per row
//! - **Snapshot persistence**: optional bincode snapshots of the container
//!
//! ## Quick Start
//!
//! ```rust
//! use gpkg_index::{
//!     BoundingBox, FeatureIndexManager, FeatureRow, GeoPackage, GeometryData, IndexLocation,
//!     Projection,
//! };
//! use geo::{Geometry, Point};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory container with one feature table
//! let gpkg = GeoPackage::memory()?;
//! let cities = gpkg.create_feature_table("cities", "geom", Projection::wgs84())?;
//!
//! for (name, lon, lat) in [("Paris", 2.35, 48.86), ("Berlin", 13.40, 52.52)] {
//!     let point = GeometryData::from_geometry(4326, &Geometry::Point(Point::new(lon, lat)));
//!     cities.insert(
//!         FeatureRow::new()
//!             .with_geometry(&point)
//!             .with_attribute("name", name),
//!     )?;
//! }
//! cities.insert(FeatureRow::new().with_attribute("name", "Nowhere"))?;
//!
//! // Extension-table index: rows without geometry get no entry
//! let mut manager = FeatureIndexManager::new(&gpkg, "cities")?;
//! assert_eq!(manager.index()?, 2);
//!
//! // Range-tree index: every row gets an entry
//! manager.set_index_location(IndexLocation::RangeTree)?;
//! assert_eq!(manager.index()?, 3);
//!
//! // Query a box west of 10 degrees east
//! let west = BoundingBox::new(-10.0, 40.0, 10.0, 60.0);
//! for row in manager.query_bounding_box(&west)? {
//!     let row = row?;
//!     println!("{:?}", row.attributes.get("name"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Projected Queries
//!
//! ```rust
//! use gpkg_index::{BoundingBox, FeatureIndexManager, FeatureRow, GeoPackage, GeometryData, Projection};
//! use geo::{Geometry, Point};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let gpkg = GeoPackage::memory()?;
//! let dao = gpkg.create_feature_table("pois", "geom", Projection::wgs84())?;
//! let point = GeometryData::from_geometry(4326, &Geometry::Point(Point::new(1.0, 1.0)));
//! dao.insert(FeatureRow::new().with_geometry(&point))?;
//!
//! let manager = FeatureIndexManager::new(&gpkg, "pois")?;
//! manager.index()?;
//!
//! // A Web Mercator box around the point, in meters
//! let mercator = BoundingBox::new(0.0, 0.0, 200_000.0, 200_000.0);
//! assert_eq!(manager.count_projected(&mercator, &Projection::web_mercator())?, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod envelope;
pub mod error;
pub mod geometry;
pub mod index;
pub mod projection;

// Re-export the container types
pub use container::{
    FeatureDao, FeatureRow, FeatureRows, FeatureSource, GeoPackage, GeoPackageBuilder, Value,
};

// Re-export the index types
pub use index::{
    ExtensionTableIndex, FeatureIndexBackend, FeatureIndexManager, FeatureIndexResults,
    IndexLocation, IndexMetadata, IndexSummary, ManualFeatureQuery, Progress, ProgressCounter,
    RangeTreeIndex, RebuildOptions,
};

pub use config::IndexConfig;
pub use envelope::{BoundingBox, Envelope};
pub use error::{IndexError, Result};
pub use geometry::{GeoPackageGeometryDecoder, GeometryData, GeometryDecoder};
pub use projection::{Projection, ProjectionFactory, ProjectionTransform, StandardProjections};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        BoundingBox, Envelope, FeatureIndexManager, FeatureRow, GeoPackage, GeometryData,
        IndexConfig, IndexError, IndexLocation, Projection, Result,
    };
}
