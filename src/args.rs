use std::path::PathBuf;

use clap::Parser;
use osmpoly::Format;

/// Extracts closed ways from osm.pbf or osm xml files as GeoJSON polygons
#[derive(Debug, Parser)]
#[clap(about, version, author)]
pub struct Args {
    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Input OSM file (.osm.pbf or .osm)
    pub input: PathBuf,

    /// Output GeoJSON file
    pub output: PathBuf,

    /// Input format if it cannot be detected (pbf or xml)
    #[arg(long)]
    pub format: Option<Format>,

    /// Copy way tags into the feature properties
    #[arg(long)]
    pub tags: bool,

    /// Indent the GeoJSON output
    #[arg(long)]
    pub pretty: bool,

    /// Threads decoding PBF blocks, 0 for one per core
    #[arg(short = 'j', long, default_value_t = 0)]
    pub threads: usize,

    /// Show a progress bar of the bytes read
    #[arg(long)]
    pub progress: bool,
}
