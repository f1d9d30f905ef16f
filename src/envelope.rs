//! Axis-aligned envelopes and 2-D bounding boxes
//!
//! [`Envelope`] is the bounding volume stored by every index backend. X and Y
//! are always present; Z and M are optional and carried as a single
//! `(min, max)` pair so a dimension is either fully present or absent.

use crate::error::{IndexError, Result};
use crate::projection::ProjectionTransform;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned bounding volume over X, Y and optionally Z and M.
///
/// # Examples
///
/// ```rust
/// use gpkg_index::Envelope;
///
/// let a = Envelope::xy(0.0, 10.0, 0.0, 10.0);
/// let b = Envelope::xy(5.0, 15.0, 5.0, 15.0).with_z(0.0, 100.0);
///
/// // Z is only present on one side, so it is ignored
/// assert!(a.intersects(&b));
///
/// let both = a.union(&b);
/// assert_eq!(both.max_x, 15.0);
/// assert_eq!(both.z, Some((0.0, 100.0)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    /// Z range, when the geometry has a Z dimension
    pub z: Option<(f64, f64)>,
    /// M range, when the geometry has an M dimension
    pub m: Option<(f64, f64)>,
}

impl Envelope {
    /// Create a validated 2-D envelope.
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Result<Self> {
        check_range("x", min_x, max_x)?;
        check_range("y", min_y, max_y)?;
        Ok(Self::xy(min_x, max_x, min_y, max_y))
    }

    /// Create a 2-D envelope without validation.
    pub fn xy(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
            z: None,
            m: None,
        }
    }

    /// Degenerate envelope around a single point.
    pub fn point(x: f64, y: f64) -> Self {
        Self::xy(x, x, y, y)
    }

    pub fn with_z(mut self, min_z: f64, max_z: f64) -> Self {
        self.z = Some((min_z, max_z));
        self
    }

    pub fn with_m(mut self, min_m: f64, max_m: f64) -> Self {
        self.m = Some((min_m, max_m));
        self
    }

    pub fn has_z(&self) -> bool {
        self.z.is_some()
    }

    pub fn has_m(&self) -> bool {
        self.m.is_some()
    }

    /// Number of dimensions carried (2 to 4).
    pub fn dimensions(&self) -> usize {
        2 + usize::from(self.has_z()) + usize::from(self.has_m())
    }

    /// Check the min <= max invariant on every present dimension.
    pub fn validate(&self) -> Result<()> {
        check_range("x", self.min_x, self.max_x)?;
        check_range("y", self.min_y, self.max_y)?;
        if let Some((min, max)) = self.z {
            check_range("z", min, max)?;
        }
        if let Some((min, max)) = self.m {
            check_range("m", min, max)?;
        }
        Ok(())
    }

    /// Whether two envelopes intersect.
    ///
    /// Every dimension present in both envelopes must overlap (closed
    /// ranges, touching counts). A dimension present on only one side is
    /// ignored.
    pub fn intersects(&self, other: &Envelope) -> bool {
        if !overlaps((self.min_x, self.max_x), (other.min_x, other.max_x)) {
            return false;
        }
        if !overlaps((self.min_y, self.max_y), (other.min_y, other.max_y)) {
            return false;
        }
        if let (Some(a), Some(b)) = (self.z, other.z)
            && !overlaps(a, b)
        {
            return false;
        }
        if let (Some(a), Some(b)) = (self.m, other.m)
            && !overlaps(a, b)
        {
            return false;
        }
        true
    }

    /// Smallest envelope containing both operands.
    pub fn union(&self, other: &Envelope) -> Envelope {
        Envelope {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
            z: union_range(self.z, other.z),
            m: union_range(self.m, other.m),
        }
    }

    /// Grow every present dimension by `amount` on both sides.
    pub fn expand_by(&self, amount: f64) -> Envelope {
        Envelope {
            min_x: self.min_x - amount,
            max_x: self.max_x + amount,
            min_y: self.min_y - amount,
            max_y: self.max_y + amount,
            z: self.z.map(|(min, max)| (min - amount, max + amount)),
            m: self.m.map(|(min, max)| (min - amount, max + amount)),
        }
    }

    /// Drop Z and M, keeping the X/Y footprint.
    pub fn to_xy(&self) -> Envelope {
        Envelope::xy(self.min_x, self.max_x, self.min_y, self.max_y)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] x [{}, {}]",
            self.min_x, self.max_x, self.min_y, self.max_y
        )?;
        if let Some((min, max)) = self.z {
            write!(f, " z[{}, {}]", min, max)?;
        }
        if let Some((min, max)) = self.m {
            write!(f, " m[{}, {}]", min, max)?;
        }
        Ok(())
    }
}

impl From<geo::Rect<f64>> for Envelope {
    fn from(rect: geo::Rect<f64>) -> Self {
        Envelope::xy(rect.min().x, rect.max().x, rect.min().y, rect.max().y)
    }
}

fn overlaps(a: (f64, f64), b: (f64, f64)) -> bool {
    a.0 <= b.1 && a.1 >= b.0
}

fn union_range(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a.0.min(b.0), a.1.max(b.1))),
        (Some(range), None) | (None, Some(range)) => Some(range),
        (None, None) => None,
    }
}

fn check_range(axis: &str, min: f64, max: f64) -> Result<()> {
    if !min.is_finite() || !max.is_finite() {
        return Err(IndexError::InvalidEnvelope(format!(
            "{} bounds must be finite, got [{}, {}]",
            axis, min, max
        )));
    }
    if min > max {
        return Err(IndexError::InvalidEnvelope(format!(
            "{} minimum {} exceeds maximum {}",
            axis, min, max
        )));
    }
    Ok(())
}

/// A 2-D query rectangle in some projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The whole WGS84 longitude/latitude range.
    pub fn world_wgs84() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Envelope with X/Y only.
    pub fn to_envelope(&self) -> Envelope {
        Envelope::xy(self.min_x, self.max_x, self.min_y, self.max_y)
    }

    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x, self.min_y),
            (self.min_x, self.max_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
        ]
    }

    /// Transform the box and return the axis-aligned box enclosing all four
    /// transformed corners.
    ///
    /// A projection transform does not preserve axis alignment in general,
    /// so the result may be larger than the source box but never smaller.
    pub fn transform(&self, transform: &dyn ProjectionTransform) -> Result<BoundingBox> {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for (x, y) in self.corners() {
            let (tx, ty) = transform.transform(x, y)?;
            min_x = min_x.min(tx);
            min_y = min_y.min(ty);
            max_x = max_x.max(tx);
            max_y = max_y.max(ty);
        }

        Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
    }
}

impl From<&Envelope> for BoundingBox {
    fn from(envelope: &Envelope) -> Self {
        BoundingBox::new(
            envelope.min_x,
            envelope.min_y,
            envelope.max_x,
            envelope.max_y,
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) - ({}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects_is_symmetric() {
        let envelopes = [
            Envelope::xy(0.0, 1.0, 0.0, 1.0),
            Envelope::xy(1.0, 2.0, 1.0, 2.0),
            Envelope::xy(5.0, 6.0, 0.0, 1.0),
            Envelope::xy(0.0, 10.0, 0.0, 10.0).with_z(0.0, 1.0),
            Envelope::xy(0.0, 10.0, 0.0, 10.0).with_z(5.0, 6.0),
            Envelope::point(0.5, 0.5).with_m(3.0, 3.0),
            Envelope::point(0.5, 0.5).with_m(4.0, 4.0),
        ];

        for a in &envelopes {
            for b in &envelopes {
                assert_eq!(a.intersects(b), b.intersects(a), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_touching_edges_intersect() {
        let a = Envelope::xy(0.0, 1.0, 0.0, 1.0);
        let b = Envelope::xy(1.0, 2.0, 1.0, 2.0);
        assert!(a.intersects(&b));

        let c = Envelope::xy(1.000001, 2.0, 0.0, 1.0);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_one_sided_dimensions_are_ignored() {
        let flat = Envelope::xy(0.0, 10.0, 0.0, 10.0);
        let high = Envelope::xy(0.0, 10.0, 0.0, 10.0).with_z(100.0, 200.0);
        let low = Envelope::xy(0.0, 10.0, 0.0, 10.0).with_z(0.0, 1.0);

        assert!(flat.intersects(&high));
        assert!(flat.intersects(&low));
        assert!(!high.intersects(&low));
    }

    #[test]
    fn test_union() {
        let a = Envelope::xy(0.0, 1.0, 0.0, 1.0).with_m(1.0, 2.0);
        let b = Envelope::xy(-1.0, 0.5, 0.5, 3.0).with_z(4.0, 5.0);
        let u = a.union(&b);

        assert_eq!(u.min_x, -1.0);
        assert_eq!(u.max_x, 1.0);
        assert_eq!(u.min_y, 0.0);
        assert_eq!(u.max_y, 3.0);
        assert_eq!(u.z, Some((4.0, 5.0)));
        assert_eq!(u.m, Some((1.0, 2.0)));
        assert_eq!(u.dimensions(), 4);
        assert!(u.intersects(&a) && u.intersects(&b));
    }

    #[test]
    fn test_validation() {
        assert!(Envelope::new(0.0, 1.0, 0.0, 1.0).is_ok());
        assert!(Envelope::new(2.0, 1.0, 0.0, 1.0).is_err());
        assert!(Envelope::new(0.0, f64::NAN, 0.0, 1.0).is_err());
        assert!(Envelope::xy(0.0, 1.0, 0.0, 1.0)
            .with_z(3.0, 2.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_bounding_box_envelope_conversion() {
        let bbox = BoundingBox::new(-10.0, -5.0, 10.0, 5.0);
        let envelope = bbox.to_envelope();
        assert!(!envelope.has_z() && !envelope.has_m());
        assert_eq!(BoundingBox::from(&envelope), bbox);
    }
}
