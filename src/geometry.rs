//! GeoPackage geometry blobs
//!
//! A feature's geometry column holds a GeoPackage binary blob: a short
//! header (magic `GP`, version, flags, SRS id, optional envelope) followed
//! by standard WKB. The index only needs the envelope, which is read from
//! the header when present and computed from the WKB coordinates otherwise.
//!
//! ```text
//! +----+---------+-------+--------+-----------------+-----------+
//! | GP | version | flags | srs_id | envelope (0-8d) | WKB ...   |
//! +----+---------+-------+--------+-----------------+-----------+
//! ```

use crate::envelope::Envelope;
use crate::error::{IndexError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use geo::BoundingRect;

const MAGIC: &[u8; 2] = b"GP";
const VERSION: u8 = 0;

const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const FLAG_ENVELOPE_MASK: u8 = 0b0000_1110;
const FLAG_EMPTY: u8 = 0b0001_0000;
const FLAG_EXTENDED: u8 = 0b0010_0000;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_GEOMETRYCOLLECTION: u32 = 7;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

/// Collections nested deeper than this are rejected as malformed
const MAX_NESTING: usize = 32;

/// Extracts envelopes from raw geometry column values.
///
/// Implementations must fail soft: malformed input yields `None`, never a
/// panic or an error.
pub trait GeometryDecoder: Send + Sync {
    fn envelope_of(&self, geometry: &[u8]) -> Option<Envelope>;
}

/// Decoder for GeoPackage binary geometries.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoPackageGeometryDecoder;

impl GeometryDecoder for GeoPackageGeometryDecoder {
    fn envelope_of(&self, geometry: &[u8]) -> Option<Envelope> {
        match GeometryData::from_bytes(geometry).and_then(|data| data.envelope()) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Unable to read geometry envelope: {}", e);
                None
            }
        }
    }
}

/// Decoded GeoPackage geometry blob.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryData {
    pub srs_id: i32,
    /// Envelope stored in the header, if any
    pub header_envelope: Option<Envelope>,
    pub empty: bool,
    pub extended: bool,
    /// WKB body
    pub wkb: Bytes,
}

impl GeometryData {
    /// Encode a `geo` geometry with an X/Y header envelope.
    pub fn from_geometry(srs_id: i32, geometry: &geo::Geometry<f64>) -> Self {
        let mut wkb = BytesMut::new();
        write_wkb(&mut wkb, geometry);
        let header_envelope = geometry.bounding_rect().map(Envelope::from);

        Self {
            srs_id,
            empty: header_envelope.is_none(),
            header_envelope,
            extended: false,
            wkb: wkb.freeze(),
        }
    }

    /// Wrap an existing WKB body. The header carries no envelope, so readers
    /// compute it from the coordinates.
    pub fn from_wkb(srs_id: i32, wkb: impl Into<Bytes>) -> Self {
        Self {
            srs_id,
            header_envelope: None,
            empty: false,
            extended: false,
            wkb: wkb.into(),
        }
    }

    /// Parse a GeoPackage binary blob.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        if buf.remaining() < 8 {
            return Err(IndexError::Geometry(format!(
                "blob of {} bytes is shorter than the header",
                data.len()
            )));
        }

        let mut magic = [0u8; 2];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(IndexError::Geometry("missing GP magic".to_string()));
        }
        let version = buf.get_u8();
        if version != VERSION {
            return Err(IndexError::Geometry(format!(
                "unsupported version {}",
                version
            )));
        }

        let flags = buf.get_u8();
        let little_endian = flags & FLAG_LITTLE_ENDIAN != 0;
        let srs_id = if little_endian {
            buf.get_i32_le()
        } else {
            buf.get_i32()
        };

        let indicator = (flags & FLAG_ENVELOPE_MASK) >> 1;
        let (has_z, has_m) = match indicator {
            0 | 1 => (false, false),
            2 => (true, false),
            3 => (false, true),
            4 => (true, true),
            other => {
                return Err(IndexError::Geometry(format!(
                    "invalid envelope indicator {}",
                    other
                )));
            }
        };

        let header_envelope = if indicator == 0 {
            None
        } else {
            let mut reader = Reader::new(buf, little_endian);
            let min_x = reader.f64()?;
            let max_x = reader.f64()?;
            let min_y = reader.f64()?;
            let max_y = reader.f64()?;
            let mut envelope = Envelope::xy(min_x, max_x, min_y, max_y);
            if has_z {
                envelope.z = Some((reader.f64()?, reader.f64()?));
            }
            if has_m {
                envelope.m = Some((reader.f64()?, reader.f64()?));
            }
            buf = reader.buf;
            Some(envelope)
        };

        Ok(Self {
            srs_id,
            header_envelope,
            empty: flags & FLAG_EMPTY != 0,
            extended: flags & FLAG_EXTENDED != 0,
            wkb: Bytes::copy_from_slice(buf),
        })
    }

    /// Encode as a GeoPackage binary blob (little endian header).
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8 + 64 + self.wkb.len());
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);

        let indicator = match self.header_envelope {
            None => 0,
            Some(ref e) => match (e.has_z(), e.has_m()) {
                (false, false) => 1,
                (true, false) => 2,
                (false, true) => 3,
                (true, true) => 4,
            },
        };
        let mut flags = FLAG_LITTLE_ENDIAN | (indicator << 1);
        if self.empty {
            flags |= FLAG_EMPTY;
        }
        if self.extended {
            flags |= FLAG_EXTENDED;
        }
        buf.put_u8(flags);
        buf.put_i32_le(self.srs_id);

        if let Some(ref e) = self.header_envelope {
            buf.put_f64_le(e.min_x);
            buf.put_f64_le(e.max_x);
            buf.put_f64_le(e.min_y);
            buf.put_f64_le(e.max_y);
            if let Some((min, max)) = e.z {
                buf.put_f64_le(min);
                buf.put_f64_le(max);
            }
            if let Some((min, max)) = e.m {
                buf.put_f64_le(min);
                buf.put_f64_le(max);
            }
        }

        buf.put_slice(&self.wkb);
        buf.freeze()
    }

    /// Envelope of the geometry: the header envelope when stored, otherwise
    /// computed from the WKB. Empty geometries have no envelope. Bounds that
    /// are inverted or not finite are rejected.
    pub fn envelope(&self) -> Result<Option<Envelope>> {
        if self.empty {
            return Ok(None);
        }
        let envelope = match self.header_envelope {
            Some(envelope) => Some(envelope),
            None => wkb_envelope(&self.wkb)?,
        };
        if let Some(ref envelope) = envelope {
            envelope.validate()?;
        }
        Ok(envelope)
    }
}

/// Compute the envelope of a WKB geometry (ISO and EWKB dimension flags).
pub fn wkb_envelope(wkb: &[u8]) -> Result<Option<Envelope>> {
    let mut builder = EnvelopeBuilder::default();
    let mut buf = wkb;
    read_geometry(&mut buf, &mut builder, 0)?;
    Ok(builder.build())
}

#[derive(Default)]
struct EnvelopeBuilder {
    xy: Option<(f64, f64, f64, f64)>,
    z: Option<(f64, f64)>,
    m: Option<(f64, f64)>,
}

impl EnvelopeBuilder {
    fn add(&mut self, x: f64, y: f64, z: Option<f64>, m: Option<f64>) {
        // NaN coordinates encode an empty point
        if x.is_nan() || y.is_nan() {
            return;
        }
        self.xy = Some(match self.xy {
            None => (x, x, y, y),
            Some((min_x, max_x, min_y, max_y)) => {
                (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y))
            }
        });
        if let Some(z) = z.filter(|z| !z.is_nan()) {
            self.z = Some(self.z.map_or((z, z), |(min, max)| (min.min(z), max.max(z))));
        }
        if let Some(m) = m.filter(|m| !m.is_nan()) {
            self.m = Some(self.m.map_or((m, m), |(min, max)| (min.min(m), max.max(m))));
        }
    }

    fn build(self) -> Option<Envelope> {
        self.xy.map(|(min_x, max_x, min_y, max_y)| Envelope {
            min_x,
            max_x,
            min_y,
            max_y,
            z: self.z,
            m: self.m,
        })
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    little_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], little_endian: bool) -> Self {
        Self { buf, little_endian }
    }

    fn u32(&mut self) -> Result<u32> {
        if self.buf.remaining() < 4 {
            return Err(IndexError::Geometry("unexpected end of WKB".to_string()));
        }
        Ok(if self.little_endian {
            self.buf.get_u32_le()
        } else {
            self.buf.get_u32()
        })
    }

    fn f64(&mut self) -> Result<f64> {
        if self.buf.remaining() < 8 {
            return Err(IndexError::Geometry("unexpected end of WKB".to_string()));
        }
        Ok(if self.little_endian {
            self.buf.get_f64_le()
        } else {
            self.buf.get_f64()
        })
    }
}

fn read_geometry(buf: &mut &[u8], builder: &mut EnvelopeBuilder, depth: usize) -> Result<()> {
    if depth > MAX_NESTING {
        return Err(IndexError::Geometry("geometry nested too deeply".to_string()));
    }
    if buf.remaining() < 1 {
        return Err(IndexError::Geometry("unexpected end of WKB".to_string()));
    }
    let little_endian = match buf.get_u8() {
        0 => false,
        1 => true,
        other => {
            return Err(IndexError::Geometry(format!("invalid byte order {}", other)));
        }
    };

    let mut reader = Reader::new(buf, little_endian);
    let raw_type = reader.u32()?;
    if raw_type & EWKB_SRID != 0 {
        reader.u32()?;
    }
    let mut has_z = raw_type & EWKB_Z != 0;
    let mut has_m = raw_type & EWKB_M != 0;
    let iso_type = raw_type & 0x0FFF_FFFF;
    match iso_type / 1000 {
        0 => {}
        1 => has_z = true,
        2 => has_m = true,
        3 => {
            has_z = true;
            has_m = true;
        }
        _ => {
            return Err(IndexError::Geometry(format!(
                "invalid geometry type {}",
                raw_type
            )));
        }
    }

    let dims = (has_z, has_m);
    match iso_type % 1000 {
        WKB_POINT => read_points(&mut reader, builder, 1, dims)?,
        WKB_LINESTRING => {
            let count = reader.u32()?;
            read_points(&mut reader, builder, count, dims)?;
        }
        WKB_POLYGON => {
            let rings = reader.u32()?;
            for _ in 0..rings {
                let count = reader.u32()?;
                read_points(&mut reader, builder, count, dims)?;
            }
        }
        WKB_MULTIPOINT | WKB_MULTILINESTRING | WKB_MULTIPOLYGON | WKB_GEOMETRYCOLLECTION => {
            let parts = reader.u32()?;
            for _ in 0..parts {
                read_geometry(&mut reader.buf, builder, depth + 1)?;
            }
        }
        other => {
            return Err(IndexError::Geometry(format!(
                "unsupported geometry type {}",
                other
            )));
        }
    }

    *buf = reader.buf;
    Ok(())
}

fn read_points(
    reader: &mut Reader<'_>,
    builder: &mut EnvelopeBuilder,
    count: u32,
    (has_z, has_m): (bool, bool),
) -> Result<()> {
    for _ in 0..count {
        let x = reader.f64()?;
        let y = reader.f64()?;
        let z = if has_z { Some(reader.f64()?) } else { None };
        let m = if has_m { Some(reader.f64()?) } else { None };
        builder.add(x, y, z, m);
    }
    Ok(())
}

fn write_wkb(buf: &mut BytesMut, geometry: &geo::Geometry<f64>) {
    use geo::Geometry;

    match geometry {
        Geometry::Point(point) => {
            write_header(buf, WKB_POINT);
            buf.put_f64_le(point.x());
            buf.put_f64_le(point.y());
        }
        Geometry::Line(line) => {
            write_header(buf, WKB_LINESTRING);
            buf.put_u32_le(2);
            for coord in [line.start, line.end] {
                buf.put_f64_le(coord.x);
                buf.put_f64_le(coord.y);
            }
        }
        Geometry::LineString(line_string) => write_line_string(buf, line_string),
        Geometry::Polygon(polygon) => write_polygon(buf, polygon),
        Geometry::MultiPoint(multi) => {
            write_header(buf, WKB_MULTIPOINT);
            buf.put_u32_le(multi.0.len() as u32);
            for point in &multi.0 {
                write_wkb(buf, &Geometry::Point(*point));
            }
        }
        Geometry::MultiLineString(multi) => {
            write_header(buf, WKB_MULTILINESTRING);
            buf.put_u32_le(multi.0.len() as u32);
            for line_string in &multi.0 {
                write_line_string(buf, line_string);
            }
        }
        Geometry::MultiPolygon(multi) => {
            write_header(buf, WKB_MULTIPOLYGON);
            buf.put_u32_le(multi.0.len() as u32);
            for polygon in &multi.0 {
                write_polygon(buf, polygon);
            }
        }
        Geometry::GeometryCollection(collection) => {
            write_header(buf, WKB_GEOMETRYCOLLECTION);
            buf.put_u32_le(collection.0.len() as u32);
            for child in &collection.0 {
                write_wkb(buf, child);
            }
        }
        Geometry::Rect(rect) => write_polygon(buf, &rect.to_polygon()),
        Geometry::Triangle(triangle) => write_polygon(buf, &triangle.to_polygon()),
    }
}

fn write_header(buf: &mut BytesMut, geometry_type: u32) {
    buf.put_u8(1);
    buf.put_u32_le(geometry_type);
}

fn write_line_string(buf: &mut BytesMut, line_string: &geo::LineString<f64>) {
    write_header(buf, WKB_LINESTRING);
    buf.put_u32_le(line_string.0.len() as u32);
    for coord in &line_string.0 {
        buf.put_f64_le(coord.x);
        buf.put_f64_le(coord.y);
    }
}

fn write_polygon(buf: &mut BytesMut, polygon: &geo::Polygon<f64>) {
    write_header(buf, WKB_POLYGON);
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
    buf.put_u32_le(1 + polygon.interiors().len() as u32);
    for ring in rings {
        buf.put_u32_le(ring.0.len() as u32);
        for coord in &ring.0 {
            buf.put_f64_le(coord.x);
            buf.put_f64_le(coord.y);
        }
    }
}
