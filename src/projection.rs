//! Coordinate projections and transforms
//!
//! The index subsystem only needs two things from a projection library:
//! projection identity (to decide whether a query needs transforming) and a
//! point transform between two projections. Both sit behind traits so a
//! full projection library can be plugged in; [`StandardProjections`]
//! covers geographic WGS84 and spherical Web Mercator.

use crate::error::{IndexError, Result};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

pub const AUTHORITY_EPSG: &str = "EPSG";
pub const AUTHORITY_OGC: &str = "OGC";
pub const EPSG_WORLD_GEODETIC_SYSTEM: u32 = 4326;
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// Semi-major axis used by spherical Web Mercator, in meters
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;
/// Latitude limit of the square Web Mercator world
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A coordinate reference system identified by authority and code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Projection {
    pub authority: String,
    pub code: String,
}

impl Projection {
    pub fn new(authority: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            authority: authority.into().to_uppercase(),
            code: code.into(),
        }
    }

    pub fn epsg(code: u32) -> Self {
        Self::new(AUTHORITY_EPSG, code.to_string())
    }

    /// EPSG:4326
    pub fn wgs84() -> Self {
        Self::epsg(EPSG_WORLD_GEODETIC_SYSTEM)
    }

    /// EPSG:3857
    pub fn web_mercator() -> Self {
        Self::epsg(EPSG_WEB_MERCATOR)
    }

    /// Known definition for this projection, if any.
    pub fn definition(&self) -> Option<&'static ProjectionDefinition> {
        DEFINITIONS.get(&(self.authority.clone(), self.code.clone()))
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

/// Model family of a known projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    /// Longitude/latitude in degrees
    Geographic,
    /// Spherical Mercator in meters
    WebMercator,
}

#[derive(Debug, Clone)]
pub struct ProjectionDefinition {
    pub name: &'static str,
    pub units: &'static str,
    pub kind: ProjectionKind,
}

static DEFINITIONS: Lazy<FxHashMap<(String, String), ProjectionDefinition>> = Lazy::new(|| {
    let geographic = |name| ProjectionDefinition {
        name,
        units: "degree",
        kind: ProjectionKind::Geographic,
    };
    let mercator = |name| ProjectionDefinition {
        name,
        units: "meter",
        kind: ProjectionKind::WebMercator,
    };

    let mut definitions = FxHashMap::default();
    definitions.insert(
        (AUTHORITY_EPSG.to_string(), "4326".to_string()),
        geographic("WGS 84"),
    );
    definitions.insert(
        (AUTHORITY_OGC.to_string(), "CRS84".to_string()),
        geographic("WGS 84 (CRS84)"),
    );
    definitions.insert(
        (AUTHORITY_EPSG.to_string(), "3857".to_string()),
        mercator("WGS 84 / Pseudo-Mercator"),
    );
    definitions.insert(
        (AUTHORITY_EPSG.to_string(), "900913".to_string()),
        mercator("Google Maps Global Mercator"),
    );
    definitions
});

/// Point transform from one projection to another
pub trait ProjectionTransform {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)>;
}

/// Source of transforms between projections
pub trait ProjectionFactory: Send + Sync {
    fn transformation(
        &self,
        from: &Projection,
        to: &Projection,
    ) -> Result<Box<dyn ProjectionTransform>>;
}

pub struct IdentityTransform;

impl ProjectionTransform for IdentityTransform {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Ok((x, y))
    }
}

/// Longitude/latitude degrees to Web Mercator meters. Latitudes beyond the
/// Web Mercator limit are clamped to it.
pub struct ToWebMercator;

impl ProjectionTransform for ToWebMercator {
    fn transform(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        check_finite(lon, lat)?;
        let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
        let x = WEB_MERCATOR_RADIUS * lon.to_radians();
        let y = WEB_MERCATOR_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
        Ok((x, y))
    }
}

/// Web Mercator meters to longitude/latitude degrees.
pub struct FromWebMercator;

impl ProjectionTransform for FromWebMercator {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        check_finite(x, y)?;
        let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
        let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        Ok((lon, lat))
    }
}

fn check_finite(x: f64, y: f64) -> Result<()> {
    if x.is_finite() && y.is_finite() {
        Ok(())
    } else {
        Err(IndexError::Projection(format!(
            "cannot transform non-finite coordinate ({}, {})",
            x, y
        )))
    }
}

/// Transforms between the projections in the built-in definition table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardProjections;

impl ProjectionFactory for StandardProjections {
    fn transformation(
        &self,
        from: &Projection,
        to: &Projection,
    ) -> Result<Box<dyn ProjectionTransform>> {
        if from == to {
            return Ok(Box::new(IdentityTransform));
        }

        let lookup = |projection: &Projection| {
            projection.definition().map(|d| d.kind).ok_or_else(|| {
                IndexError::Projection(format!("unknown projection {}", projection))
            })
        };

        match (lookup(from)?, lookup(to)?) {
            (ProjectionKind::Geographic, ProjectionKind::Geographic)
            | (ProjectionKind::WebMercator, ProjectionKind::WebMercator) => {
                Ok(Box::new(IdentityTransform))
            }
            (ProjectionKind::Geographic, ProjectionKind::WebMercator) => Ok(Box::new(ToWebMercator)),
            (ProjectionKind::WebMercator, ProjectionKind::Geographic) => {
                Ok(Box::new(FromWebMercator))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::BoundingBox;

    #[test]
    fn test_projection_identity() {
        assert_eq!(Projection::wgs84(), Projection::new("epsg", "4326"));
        assert_ne!(Projection::wgs84(), Projection::web_mercator());
        assert_eq!(Projection::web_mercator().to_string(), "EPSG:3857");
        assert_eq!(
            Projection::wgs84().definition().map(|d| d.units),
            Some("degree")
        );
        assert!(Projection::epsg(27700).definition().is_none());
    }

    #[test]
    fn test_web_mercator_round_trip() {
        let to = StandardProjections
            .transformation(&Projection::wgs84(), &Projection::web_mercator())
            .unwrap();
        let from = StandardProjections
            .transformation(&Projection::web_mercator(), &Projection::wgs84())
            .unwrap();

        let (x, y) = to.transform(180.0, 0.0).unwrap();
        assert!((x - 20_037_508.342_789_244).abs() < 1e-6);
        assert!(y.abs() < 1e-6);

        let (x, y) = to.transform(-74.0060, 40.7128).unwrap();
        let (lon, lat) = from.transform(x, y).unwrap();
        assert!((lon + 74.0060).abs() < 1e-9);
        assert!((lat - 40.7128).abs() < 1e-9);
    }

    #[test]
    fn test_polar_latitudes_are_clamped() {
        let (_, y) = ToWebMercator.transform(0.0, 90.0).unwrap();
        assert!(y.is_finite());
        let (_, limit) = ToWebMercator.transform(0.0, WEB_MERCATOR_MAX_LAT).unwrap();
        assert_eq!(y, limit);
    }

    #[test]
    fn test_unknown_projection_fails() {
        let result =
            StandardProjections.transformation(&Projection::epsg(27700), &Projection::wgs84());
        assert!(matches!(result, Err(IndexError::Projection(_))));

        let same = StandardProjections
            .transformation(&Projection::epsg(27700), &Projection::epsg(27700))
            .unwrap();
        assert_eq!(same.transform(1.0, 2.0).unwrap(), (1.0, 2.0));
    }

    #[test]
    fn test_bounding_box_transform_encloses_corners() {
        let bbox = BoundingBox::new(-10.0, 20.0, 10.0, 60.0);
        let projected = bbox.transform(&ToWebMercator).unwrap();

        for (x, y) in bbox.corners() {
            let (px, py) = ToWebMercator.transform(x, y).unwrap();
            assert!(px >= projected.min_x && px <= projected.max_x);
            assert!(py >= projected.min_y && py <= projected.max_y);
        }

        let back = projected.transform(&FromWebMercator).unwrap();
        assert!((back.min_x - bbox.min_x).abs() < 1e-9);
        assert!((back.max_y - bbox.max_y).abs() < 1e-9);
    }
}
