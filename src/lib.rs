//! Extraction of closed OpenStreetMap ways as GeoJSON polygons.
//!
//! The pipeline reads nodes and ways from an OSM PBF or XML stream, indexes
//! node locations, resolves closed ways into rings and writes them as a RFC
//! 7946 `FeatureCollection` in EPSG:4326.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let input = BufReader::new(File::open("map.osm.pbf")?);
//! let (features, stats) = osmpoly::convert(input, None, &Default::default())?;
//! osmpoly::geojson::write(&features, File::create("map.geojson")?, false)?;
//! println!("{}", stats);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod assemble;
mod convert;
mod elements;
mod error;
mod features;
mod format;
mod index;
mod parallel;
mod stats;

pub mod geojson;
pub mod osmpbf;
pub mod osmxml;

#[cfg(test)]
mod testutil;

pub use crate::assemble::{assemble, resolve, ResolvedRing, WayAssembler};
pub use crate::convert::{convert, ConvertOptions, Converter};
pub use crate::elements::{Coord, Event, Location, Node, Tags, Way};
pub use crate::error::{Error, Result};
pub use crate::features::{Feature, FeatureCollection, Polygon, Properties, PropertyValue};
pub use crate::format::{detect, EventReader, Format, Input, HEAD_LEN};
pub use crate::index::NodeIndex;
pub use crate::stats::Stats;
