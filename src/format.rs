use crate::elements::Event;
use crate::error::{Error, Result};
use crate::osmpbf::PbfReader;
use crate::osmxml::XmlReader;

use std::fmt;
use std::io::{self, BufRead, Cursor, Read};
use std::path::Path;
use std::str::FromStr;

/// Accepted OSM serializations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pbf,
    Xml,
}

impl Format {
    /// Guesses the format from a file name, e.g. `berlin.osm.pbf`.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "pbf" => Some(Format::Pbf),
            "osm" | "xml" => Some(Format::Xml),
            _ => None,
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pbf" => Ok(Format::Pbf),
            "xml" | "osm" => Ok(Format::Xml),
            other => Err(format!("unknown format {:?}, expected pbf or xml", other)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Format::Pbf => write!(f, "pbf"),
            Format::Xml => write!(f, "xml"),
        }
    }
}

enum Magic {
    Known(Format),
    Unsupported(&'static str),
    Unknown,
}

fn magic(head: &[u8]) -> Magic {
    const PBF_MAGIC: &[u8] = b"\x0a\x09OSMHeader";
    if head.len() >= 4 + PBF_MAGIC.len() && head[4..].starts_with(PBF_MAGIC) {
        return Magic::Known(Format::Pbf);
    }
    if head.starts_with(b"\x1f\x8b") {
        return Magic::Unsupported("gzip compressed input");
    }
    if head.starts_with(b"BZh") {
        return Magic::Unsupported("bzip2 compressed input");
    }
    if head.starts_with(b"\xff\xe0") {
        return Magic::Unsupported("o5m input");
    }

    let text = head.strip_prefix(b"\xef\xbb\xbf").unwrap_or(head);
    let start = text
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(text.len());
    let text = &text[start..];
    if text.starts_with(b"<?xml") || text.starts_with(b"<osm") {
        return Magic::Known(Format::Xml);
    }
    Magic::Unknown
}

/// Number of leading bytes inspected by [`detect`]
pub const HEAD_LEN: usize = 256;

/// Determines the format from the leading bytes `head` of an input.
///
/// The magic header wins over `hint`. The hint is only used when the leading
/// bytes are inconclusive, e.g. for a truncated file.
pub fn detect(head: &[u8], hint: Option<Format>) -> Result<Format> {
    match (magic(head), hint) {
        (Magic::Known(format), _) => Ok(format),
        (Magic::Unsupported(what), _) => Err(Error::UnsupportedFormat(what.into())),
        (Magic::Unknown, Some(format)) => Ok(format),
        (Magic::Unknown, None) => Err(Error::UnsupportedFormat(
            "input is neither OSM PBF nor OSM XML".into(),
        )),
    }
}

/// Input of a reader after its head was taken off for detection
pub type Input<R> = io::Chain<Cursor<Vec<u8>>, R>;

/// Lazy entity sequence of either accepted format
pub enum EventReader<R> {
    Pbf(PbfReader<Input<R>>),
    Xml(XmlReader<Input<R>>),
}

impl<R: BufRead> EventReader<R> {
    /// Detects the format of `input` and creates the matching reader.
    ///
    /// Reads up to [`HEAD_LEN`] bytes ahead, however the input splits them
    /// into chunks, and hands them on to the reader unchanged.
    pub fn new(mut input: R, hint: Option<Format>, with_tags: bool) -> Result<Self> {
        let mut head = Vec::with_capacity(HEAD_LEN);
        input.by_ref().take(HEAD_LEN as u64).read_to_end(&mut head)?;
        let format = detect(&head, hint)?;
        let input = Cursor::new(head).chain(input);
        Ok(match format {
            Format::Pbf => EventReader::Pbf(PbfReader::new(input, with_tags)),
            Format::Xml => EventReader::Xml(XmlReader::new(input, with_tags)),
        })
    }

    pub fn format(&self) -> Format {
        match self {
            EventReader::Pbf(_) => Format::Pbf,
            EventReader::Xml(_) => Format::Xml,
        }
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            EventReader::Pbf(reader) => reader.next(),
            EventReader::Xml(reader) => reader.next(),
        }
    }
}
