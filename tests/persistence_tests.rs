#![cfg(feature = "persistence")]

use geo::{Geometry, Point};
use gpkg_index::{
    BoundingBox, FeatureIndexManager, FeatureRow, GeoPackage, GeoPackageBuilder, GeometryData,
    IndexConfig, IndexError, IndexLocation, Projection,
};
use gpkg_index::index::EXTENSION_RTREE_INDEX;
use tempfile::TempDir;

fn populate(gpkg: &GeoPackage) {
    let dao = gpkg
        .create_feature_table("roads", "geom", Projection::wgs84())
        .unwrap();
    for i in 0..20 {
        let geometry = GeometryData::from_geometry(
            4326,
            &Geometry::Point(Point::new(i as f64, i as f64 / 2.0)),
        );
        dao.insert(FeatureRow::new().with_geometry(&geometry))
            .unwrap();
    }
    dao.insert(FeatureRow::new().with_attribute("name", "unmapped"))
        .unwrap();
}

fn manager_at(gpkg: &GeoPackage, location: IndexLocation) -> FeatureIndexManager {
    let config = IndexConfig::default().with_location(location);
    FeatureIndexManager::with_config(gpkg, "roads", config).unwrap()
}

#[test]
fn test_indexes_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("roads.gpkg");

    let (extension_time, rtree_time) = {
        let gpkg = GeoPackage::open(&path).unwrap();
        populate(&gpkg);

        let extension = manager_at(&gpkg, IndexLocation::ExtensionTable);
        assert_eq!(extension.index().unwrap(), 20);
        let rtree = manager_at(&gpkg, IndexLocation::RangeTree);
        assert_eq!(rtree.index().unwrap(), 21);

        let times = (
            extension.last_indexed().unwrap(),
            rtree.last_indexed().unwrap(),
        );
        gpkg.close().unwrap();
        times
    };
    assert!(path.exists());

    let gpkg = GeoPackage::open(&path).unwrap();
    let extension = manager_at(&gpkg, IndexLocation::ExtensionTable);
    let rtree = manager_at(&gpkg, IndexLocation::RangeTree);

    assert_eq!(
        extension.indexed_locations().unwrap(),
        vec![IndexLocation::ExtensionTable, IndexLocation::RangeTree]
    );
    assert_eq!(extension.last_indexed().unwrap(), extension_time);
    assert_eq!(rtree.last_indexed().unwrap(), rtree_time);
    assert_eq!(extension.index().unwrap(), 0);
    assert_eq!(rtree.index().unwrap(), 0);

    let window = BoundingBox::new(-0.5, -0.5, 4.5, 4.5);
    assert_eq!(extension.count_bounding_box(&window).unwrap(), 5);
    assert_eq!(rtree.count_bounding_box(&window).unwrap(), 5);
    assert_eq!(rtree.count().unwrap(), 21);
}

#[test]
fn test_drop_flushes_pending_changes() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dropped.gpkg");

    {
        let gpkg = GeoPackage::open(&path).unwrap();
        populate(&gpkg);
        manager_at(&gpkg, IndexLocation::RangeTree).index().unwrap();
    }

    let gpkg = GeoPackage::open(&path).unwrap();
    let manager = manager_at(&gpkg, IndexLocation::RangeTree);
    assert!(manager.is_indexed().unwrap());
    assert_eq!(manager.count().unwrap(), 21);
}

#[test]
fn test_reopen_without_range_index_module() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("no_rtree.gpkg");

    {
        let gpkg = GeoPackage::open(&path).unwrap();
        populate(&gpkg);
        manager_at(&gpkg, IndexLocation::ExtensionTable)
            .index_locations(&IndexLocation::BACKENDS, false)
            .unwrap();
        gpkg.close().unwrap();
    }

    let gpkg = GeoPackageBuilder::new()
        .path(&path)
        .rtree_module(false)
        .build()
        .unwrap();
    let mut manager = manager_at(&gpkg, IndexLocation::ExtensionTable);
    assert_eq!(manager.count().unwrap(), 20);
    assert!(manager.is_indexed_at(IndexLocation::RangeTree).unwrap());
    assert!(matches!(
        manager.set_index_location(IndexLocation::RangeTree),
        Err(IndexError::Unsupported(IndexLocation::RangeTree))
    ));

    // Index data left by the range tree is still removed
    assert!(manager.delete_all_indexes().unwrap());
    assert!(manager.indexed_locations().unwrap().is_empty());
    assert!(
        !gpkg
            .has_extension("roads", "geom", EXTENSION_RTREE_INDEX)
            .unwrap()
    );
}

#[test]
fn test_delete_all_without_module_then_rebuild() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stale.gpkg");

    {
        let gpkg = GeoPackage::open(&path).unwrap();
        populate(&gpkg);
        assert_eq!(manager_at(&gpkg, IndexLocation::RangeTree).index().unwrap(), 21);
        gpkg.close().unwrap();
    }

    {
        let gpkg = GeoPackageBuilder::new()
            .path(&path)
            .rtree_module(false)
            .build()
            .unwrap();
        let manager = manager_at(&gpkg, IndexLocation::ExtensionTable);
        assert!(manager.delete_all_indexes().unwrap());
        assert!(
            !gpkg
                .has_extension("roads", "geom", EXTENSION_RTREE_INDEX)
                .unwrap()
        );

        let dao = gpkg.feature_dao("roads").unwrap();
        for id in 1..=10 {
            assert!(dao.delete(id).unwrap());
        }
        gpkg.close().unwrap();
    }

    let gpkg = GeoPackage::open(&path).unwrap();
    assert!(
        !gpkg
            .has_extension("roads", "geom", EXTENSION_RTREE_INDEX)
            .unwrap()
    );
    let rtree = manager_at(&gpkg, IndexLocation::RangeTree);
    assert!(!rtree.is_indexed().unwrap());
    assert_eq!(rtree.count().unwrap(), 0);

    let indexed = rtree.index().unwrap();
    assert_eq!(indexed, 11);
    assert_eq!(rtree.count().unwrap(), indexed);

    // Rows 11..=20 remain, at (10, 5) through (19, 9.5)
    let everything = BoundingBox::new(-100.0, -100.0, 100.0, 100.0);
    assert_eq!(rtree.count_bounding_box(&everything).unwrap(), 10);
}

#[test]
fn test_closed_container_rejects_index_operations() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("closed.gpkg");

    let gpkg = GeoPackage::open(&path).unwrap();
    populate(&gpkg);
    let manager = manager_at(&gpkg, IndexLocation::ExtensionTable);
    gpkg.close().unwrap();

    assert!(matches!(manager.index(), Err(IndexError::ContainerClosed)));
    assert!(matches!(
        manager.is_indexed(),
        Err(IndexError::ContainerClosed)
    ));
}
