//! RFC 7946 serialization of polygon features.
//!
//! Coordinates are written as `[longitude, latitude]` in EPSG:4326, rounded
//! to 7 decimal digits and without trailing zeros (`1` instead of `1.0`).

use crate::elements::{Coord, COORD_SCALE};
use crate::error::{Error, Result};
use crate::features::{Feature, FeatureCollection, Polygon};

use serde::ser::{SerializeMap, SerializeTuple};
use serde::{Serialize, Serializer};

use std::io::{BufWriter, Write};

/// Largest integer an f64 represents exactly
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

struct Number(f64);

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let value = (self.0 * COORD_SCALE).round() / COORD_SCALE;
        if value.fract() == 0.0 && value.abs() < MAX_EXACT_INT {
            serializer.serialize_i64(value as i64)
        } else {
            serializer.serialize_f64(value)
        }
    }
}

struct Position<'a>(&'a Coord);

impl Serialize for Position<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&Number(self.0.lon))?;
        tuple.serialize_element(&Number(self.0.lat))?;
        tuple.end()
    }
}

struct Ring<'a>(&'a [Coord]);

impl Serialize for Ring<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(Position))
    }
}

impl Serialize for Polygon {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "Polygon")?;
        map.serialize_entry("coordinates", &[Ring(&self.exterior)])?;
        map.end()
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("type", "Feature")?;
        map.serialize_entry("geometry", &self.geometry)?;
        map.serialize_entry("properties", &self.properties)?;
        map.end()
    }
}

impl Serialize for FeatureCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "FeatureCollection")?;
        map.serialize_entry("features", self.features())?;
        map.end()
    }
}

/// Writes `collection` as a GeoJSON document into `sink` and flushes it.
///
/// Fails only if writing to the sink fails.
pub fn write<W: Write>(collection: &FeatureCollection, sink: W, pretty: bool) -> Result<()> {
    let mut writer = BufWriter::new(sink);
    let result = if pretty {
        serde_json::to_writer_pretty(&mut writer, collection)
    } else {
        serde_json::to_writer(&mut writer, collection)
    };
    result.map_err(|e| Error::Serialization(e.into()))?;
    writer.write_all(b"\n").map_err(Error::Serialization)?;
    writer.flush().map_err(Error::Serialization)
}

/// Returns `collection` as a compact GeoJSON string.
pub fn to_string(collection: &FeatureCollection) -> Result<String> {
    serde_json::to_string(collection).map_err(|e| Error::Serialization(e.into()))
}
