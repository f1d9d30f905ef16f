use geo::{Geometry, Point};
use gpkg_index::{
    BoundingBox, FeatureIndexManager, FeatureRow, GeoPackage, GeometryData, IndexLocation,
    Projection, ProgressCounter,
};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("gpkg-index feature indexing demo");

    // Create an in-memory container with a feature table
    let gpkg = GeoPackage::memory()?;
    let cities = gpkg.create_feature_table("cities", "geom", Projection::wgs84())?;

    let places = [
        ("New York City", -74.0060, 40.7128),
        ("London", -0.1278, 51.5074),
        ("Tokyo", 139.6503, 35.6762),
        ("Paris", 2.3522, 48.8566),
        ("Sydney", 151.2093, -33.8688),
    ];
    for (name, lon, lat) in places {
        let point = GeometryData::from_geometry(4326, &Geometry::Point(Point::new(lon, lat)));
        cities.insert(
            FeatureRow::new()
                .with_geometry(&point)
                .with_attribute("name", name),
        )?;
    }
    cities.insert(FeatureRow::new().with_attribute("name", "Unknown location"))?;
    println!("\nInserted {} features", cities.count()?);

    // Build both index kinds
    let mut manager = FeatureIndexManager::new(&gpkg, "cities")?;
    let progress = Arc::new(ProgressCounter::new());
    manager.set_progress(Some(progress.clone()));

    println!("\nExtension table index:");
    println!("  indexed {} rows", manager.index()?);
    println!("  progress {}/{}", progress.progress(), progress.max());

    manager.set_index_location(IndexLocation::RangeTree)?;
    println!("\nRange tree index:");
    println!("  indexed {} rows", manager.index()?);
    println!("  built locations: {:?}", manager.indexed_locations()?);

    // Query Europe in the native projection
    println!("\nFeatures in Europe:");
    let europe = BoundingBox::new(-10.0, 35.0, 30.0, 60.0);
    for row in manager.query_bounding_box(&europe)? {
        let row = row?;
        println!("  {:?}", row.attributes.get("name"));
    }

    // The same query expressed in Web Mercator meters
    let mercator = europe.transform(&gpkg_index::projection::ToWebMercator)?;
    println!(
        "\nWeb Mercator query {} matched {} features",
        mercator,
        manager.count_projected(&mercator, &Projection::web_mercator())?
    );

    if let Some(extent) = manager.bounding_box()? {
        println!("\nIndexed extent: {}", extent);
    }

    // Delete everything again
    manager.delete_all_indexes()?;
    println!(
        "\nAfter delete_all_indexes: built locations {:?}",
        manager.indexed_locations()?
    );

    println!("\nDemo completed successfully!");
    Ok(())
}
