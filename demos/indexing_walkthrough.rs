//! Walkthrough of the feature index lifecycle:
//! - Building both index kinds
//! - Incremental updates and deletes
//! - Reopening a file-backed container with its indexes
//! - Cancelling a rebuild
//!
//! ```
//! cargo run --example indexing_walkthrough
//! ```

use geo::{Geometry, LineString, Point, Polygon};
use gpkg_index::{
    BoundingBox, FeatureIndexManager, FeatureRow, GeoPackage, GeoPackageBuilder, GeometryData,
    IndexConfig, IndexLocation, Projection, ProgressCounter,
};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Feature Index Walkthrough ===\n");

    let path = std::env::temp_dir().join("gpkg_index_walkthrough.gpkg");
    let _ = std::fs::remove_file(&path);

    demo_build_indexes(&path)?;
    demo_reopen(&path)?;
    demo_cancellation()?;

    let _ = std::fs::remove_file(&path);
    println!("\n=== Walkthrough completed successfully! ===");
    Ok(())
}

fn point(x: f64, y: f64) -> GeometryData {
    GeometryData::from_geometry(4326, &Geometry::Point(Point::new(x, y)))
}

/// Demo 1: build both index kinds and maintain them row by row
fn demo_build_indexes(path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 1: Building indexes ---");

    let gpkg = GeoPackageBuilder::new().path(path).build()?;
    let parks = gpkg.create_feature_table("parks", "geom", Projection::wgs84())?;

    let boundary = Polygon::new(
        LineString::from(vec![(2.0, 2.0), (4.0, 2.0), (4.0, 5.0), (2.0, 5.0), (2.0, 2.0)]),
        vec![],
    );
    parks.insert(
        FeatureRow::new()
            .with_geometry(&GeometryData::from_geometry(4326, &Geometry::Polygon(boundary)))
            .with_attribute("name", "Riverside"),
    )?;
    for i in 0..8 {
        parks.insert(
            FeatureRow::new()
                .with_geometry(&point(i as f64, 9.0 - i as f64))
                .with_attribute("name", format!("Pocket park {}", i)),
        )?;
    }
    parks.insert(FeatureRow::new().with_attribute("name", "Planned"))?;

    let mut manager = FeatureIndexManager::new(&gpkg, "parks")?;
    println!("  Extension table indexed {} rows", manager.index()?);

    manager.set_index_location(IndexLocation::RangeTree)?;
    println!("  Range tree indexed {} rows", manager.index()?);
    println!("  Second index() call indexed {} rows", manager.index()?);

    // Move one park and re-index only that row
    let mut moved = parks.get_required(2)?;
    moved.set_geometry(Some(&point(50.0, 50.0)));
    parks.update(&moved)?;
    manager.index_row(&moved)?;

    let far = BoundingBox::new(45.0, 45.0, 55.0, 55.0);
    println!("  Rows near (50, 50): {}", manager.count_bounding_box(&far)?);

    manager.delete_index_row(3)?;
    println!("  Range tree entries after deleting one: {}", manager.count()?);

    gpkg.close()?;
    println!("  Container written to {}", path.display());
    Ok(())
}

/// Demo 2: reopen the file and query the persisted indexes
fn demo_reopen(path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n--- Demo 2: Reopening ---");

    let gpkg = GeoPackage::open(path)?;
    let config = IndexConfig::default().with_location(IndexLocation::RangeTree);
    let manager = FeatureIndexManager::with_config(&gpkg, "parks", config)?;

    println!("  Built locations: {:?}", manager.indexed_locations()?);
    println!("  Last indexed: {:?}", manager.last_indexed()?);

    let window = BoundingBox::new(1.0, 1.0, 5.0, 5.0);
    for row in manager.query_bounding_box(&window)? {
        let row = row?;
        println!("  Found {:?}", row.attributes.get("name"));
    }

    let mercator = manager.bounding_box_in(&Projection::web_mercator())?;
    println!("  Extent in Web Mercator: {:?}", mercator);
    Ok(())
}

/// Demo 3: stop a rebuild part way through
fn demo_cancellation() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n--- Demo 3: Cancellation ---");

    let gpkg = GeoPackage::memory()?;
    let dao = gpkg.create_feature_table("grid", "geom", Projection::wgs84())?;
    for x in 0..20 {
        for y in 0..20 {
            dao.insert(FeatureRow::new().with_geometry(&point(x as f64, y as f64)))?;
        }
    }

    let mut manager = FeatureIndexManager::new(&gpkg, "grid")?;
    let progress = Arc::new(ProgressCounter::new().cancel_after(100));
    manager.set_progress(Some(progress.clone()));

    let summary = manager.index_with(false)?;
    println!(
        "  Cancelled: {}, scanned {} of {}, indexed {}",
        summary.cancelled,
        summary.scanned,
        progress.max(),
        summary.indexed
    );
    Ok(())
}
