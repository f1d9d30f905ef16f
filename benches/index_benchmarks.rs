use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use geo::{Geometry, Point};
use gpkg_index::{
    BoundingBox, FeatureIndexManager, FeatureRow, GeoPackage, GeometryData, IndexLocation,
    Projection,
};

fn populated(rows: usize) -> GeoPackage {
    let gpkg = GeoPackage::memory().unwrap();
    let dao = gpkg
        .create_feature_table("bench", "geom", Projection::wgs84())
        .unwrap();
    for i in 0..rows {
        let lon = -74.0060 + (i % 100) as f64 * 0.01;
        let lat = 40.7128 + (i / 100) as f64 * 0.01;
        let point = GeometryData::from_geometry(4326, &Geometry::Point(Point::new(lon, lat)));
        dao.insert(FeatureRow::new().with_geometry(&point)).unwrap();
    }
    gpkg
}

fn benchmark_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild");
    group.sample_size(20);

    for location in [IndexLocation::ExtensionTable, IndexLocation::RangeTree] {
        for rows in [1_000, 10_000] {
            let gpkg = populated(rows);
            let mut manager = FeatureIndexManager::new(&gpkg, "bench").unwrap();
            manager.set_index_location(location).unwrap();

            group.bench_with_input(BenchmarkId::new(location.as_str(), rows), &rows, |b, _| {
                b.iter(|| manager.index_force().unwrap())
            });
        }
    }

    group.finish();
}

fn benchmark_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");

    let gpkg = populated(10_000);
    let window = BoundingBox::new(-73.9, 40.8, -73.7, 41.0);
    let mercator_window = BoundingBox::new(-8_226_000.0, 4_980_000.0, -8_204_000.0, 5_010_000.0);

    for location in [
        IndexLocation::None,
        IndexLocation::ExtensionTable,
        IndexLocation::RangeTree,
    ] {
        let mut manager = FeatureIndexManager::new(&gpkg, "bench").unwrap();
        manager.set_index_location(location).unwrap();
        if location != IndexLocation::None {
            manager.index().unwrap();
        }

        group.bench_function(BenchmarkId::new("count_bounding_box", location), |b| {
            b.iter(|| manager.count_bounding_box(black_box(&window)).unwrap())
        });

        group.bench_function(BenchmarkId::new("query_bounding_box", location), |b| {
            b.iter(|| {
                manager
                    .query_bounding_box(black_box(&window))
                    .unwrap()
                    .filter_map(|row| row.ok())
                    .count()
            })
        });

        group.bench_function(BenchmarkId::new("count_projected", location), |b| {
            b.iter(|| {
                manager
                    .count_projected(black_box(&mercator_window), &Projection::web_mercator())
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn benchmark_row_maintenance(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_maintenance");

    let gpkg = populated(10_000);
    let dao = gpkg.feature_dao("bench").unwrap();

    for location in [IndexLocation::ExtensionTable, IndexLocation::RangeTree] {
        let mut manager = FeatureIndexManager::new(&gpkg, "bench").unwrap();
        manager.set_index_location(location).unwrap();
        manager.index().unwrap();

        let mut row = dao.get_required(5_000).unwrap();
        let mut counter = 0u64;
        group.bench_function(BenchmarkId::new("index_row", location), |b| {
            b.iter(|| {
                counter += 1;
                let offset = (counter % 1000) as f64 * 0.001;
                let point = GeometryData::from_geometry(
                    4326,
                    &Geometry::Point(Point::new(-74.0 + offset, 40.7 + offset)),
                );
                row.set_geometry(Some(&point));
                manager.index_row(black_box(&row)).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_rebuild,
    benchmark_queries,
    benchmark_row_maintenance
);
criterion_main!(benches);
