//! Streaming reader of the OSM PBF format.
//!
//! A PBF file is a sequence of blobs, each prefixed by a 4 byte big endian
//! length and a `BlobHeader` message. The first blob is an `OSMHeader`, all
//! following blobs of type `OSMData` contain a `PrimitiveBlock`. See
//! <https://wiki.openstreetmap.org/wiki/PBF_Format>.

use crate::elements::{Event, Location, Node, Tags, Way};
use crate::error::{Error, Result};

use byteorder::{ByteOrder, NetworkEndian};
use flate2::read::ZlibDecoder;
use log::{debug, trace};
use prost::Message;

use std::collections::VecDeque;
use std::io::{self, Read};
use std::str;

const MAX_BLOB_HEADER_SIZE: usize = 64 * 1024;
const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;

const SUPPORTED_FEATURES: &[&str] = &["OsmSchema-V0.6", "DenseNodes"];

/// Protobuf messages of `fileformat.proto` and `osmformat.proto`
///
/// Only the fields needed for polygon extraction are declared. Prost skips
/// all other fields (metadata, relations, changesets) while decoding.
pub mod proto {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlobHeader {
        #[prost(string, required, tag = "1")]
        pub r#type: ::prost::alloc::string::String,
        #[prost(bytes = "vec", optional, tag = "2")]
        pub indexdata: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
        #[prost(int32, required, tag = "3")]
        pub datasize: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Blob {
        #[prost(bytes = "vec", optional, tag = "1")]
        pub raw: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
        #[prost(int32, optional, tag = "2")]
        pub raw_size: ::core::option::Option<i32>,
        #[prost(bytes = "vec", optional, tag = "3")]
        pub zlib_data: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "4")]
        pub lzma_data: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "5")]
        pub obsolete_bzip2_data: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "6")]
        pub lz4_data: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "7")]
        pub zstd_data: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct HeaderBlock {
        #[prost(string, repeated, tag = "4")]
        pub required_features: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
        #[prost(string, repeated, tag = "5")]
        pub optional_features: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "16")]
        pub writingprogram: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "17")]
        pub source: ::core::option::Option<::prost::alloc::string::String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PrimitiveBlock {
        #[prost(message, required, tag = "1")]
        pub stringtable: StringTable,
        #[prost(message, repeated, tag = "2")]
        pub primitivegroup: ::prost::alloc::vec::Vec<PrimitiveGroup>,
        #[prost(int32, optional, tag = "17", default = "100")]
        pub granularity: ::core::option::Option<i32>,
        #[prost(int64, optional, tag = "19", default = "0")]
        pub lat_offset: ::core::option::Option<i64>,
        #[prost(int64, optional, tag = "20", default = "0")]
        pub lon_offset: ::core::option::Option<i64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PrimitiveGroup {
        #[prost(message, repeated, tag = "1")]
        pub nodes: ::prost::alloc::vec::Vec<Node>,
        #[prost(message, optional, tag = "2")]
        pub dense: ::core::option::Option<DenseNodes>,
        #[prost(message, repeated, tag = "3")]
        pub ways: ::prost::alloc::vec::Vec<Way>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StringTable {
        #[prost(bytes = "vec", repeated, tag = "1")]
        pub s: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Node {
        #[prost(sint64, required, tag = "1")]
        pub id: i64,
        #[prost(uint32, repeated, packed = "true", tag = "2")]
        pub keys: ::prost::alloc::vec::Vec<u32>,
        #[prost(uint32, repeated, packed = "true", tag = "3")]
        pub vals: ::prost::alloc::vec::Vec<u32>,
        #[prost(sint64, required, tag = "8")]
        pub lat: i64,
        #[prost(sint64, required, tag = "9")]
        pub lon: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DenseNodes {
        #[prost(sint64, repeated, packed = "true", tag = "1")]
        pub id: ::prost::alloc::vec::Vec<i64>,
        #[prost(sint64, repeated, packed = "true", tag = "8")]
        pub lat: ::prost::alloc::vec::Vec<i64>,
        #[prost(sint64, repeated, packed = "true", tag = "9")]
        pub lon: ::prost::alloc::vec::Vec<i64>,
        #[prost(int32, repeated, packed = "true", tag = "10")]
        pub keys_vals: ::prost::alloc::vec::Vec<i32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Way {
        #[prost(int64, required, tag = "1")]
        pub id: i64,
        #[prost(uint32, repeated, packed = "true", tag = "2")]
        pub keys: ::prost::alloc::vec::Vec<u32>,
        #[prost(uint32, repeated, packed = "true", tag = "3")]
        pub vals: ::prost::alloc::vec::Vec<u32>,
        #[prost(sint64, repeated, packed = "true", tag = "8")]
        pub refs: ::prost::alloc::vec::Vec<i64>,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobType {
    Header,
    Data,
}

/// Undecoded blob together with its position in the input
#[derive(Debug)]
pub struct RawBlob {
    pub blob_type: BlobType,
    /// Byte offset of the blob's length prefix
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Iterator over the blobs of a PBF stream
///
/// Only reads forward, so it works on pipes and sockets as well as on files.
/// Blobs of unknown type are skipped. The first blob must be an `OSMHeader`.
pub struct BlobReader<R> {
    input: R,
    offset: u64,
    seen_header: bool,
    done: bool,
}

impl<R: Read> BlobReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            offset: 0,
            seen_header: false,
            done: false,
        }
    }

    fn read_exact(&mut self, len: usize, start: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.input
            .read_exact(&mut buf)
            .map_err(|e| Error::from_read(start, e))?;
        self.offset += len as u64;
        Ok(buf)
    }

    /// Reads the 4 byte length prefix, or returns `None` on a clean end of
    /// stream.
    fn read_len_prefix(&mut self) -> Result<Option<usize>> {
        let mut buf = [0; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.input.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(Error::format(self.offset, "truncated blob header length"));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::from_read(self.offset, e)),
            }
        }
        self.offset += 4;
        Ok(Some(NetworkEndian::read_u32(&buf) as usize))
    }

    fn next_blob(&mut self) -> Result<Option<RawBlob>> {
        loop {
            let start = self.offset;
            let header_len = match self.read_len_prefix()? {
                Some(len) => len,
                None if self.seen_header => return Ok(None),
                None => return Err(Error::format(start, "missing OSMHeader blob")),
            };
            if header_len > MAX_BLOB_HEADER_SIZE {
                return Err(Error::format(
                    start,
                    format!("blob header of {} bytes exceeds limit", header_len),
                ));
            }

            let header = self.read_exact(header_len, start)?;
            let header = proto::BlobHeader::decode(header.as_slice())
                .map_err(|e| Error::format(start, format!("invalid blob header: {}", e)))?;
            let blob_len = usize::try_from(header.datasize)
                .ok()
                .filter(|&len| len <= MAX_BLOB_SIZE)
                .ok_or_else(|| {
                    Error::format(start, format!("invalid blob size {}", header.datasize))
                })?;
            let data = self.read_exact(blob_len, start)?;

            let blob_type = match header.r#type.as_str() {
                "OSMHeader" => BlobType::Header,
                "OSMData" => BlobType::Data,
                other => {
                    debug!("Skipping blob of unknown type {:?} at byte {}", other, start);
                    continue;
                }
            };
            match (blob_type, self.seen_header) {
                (BlobType::Header, true) => {
                    return Err(Error::format(start, "duplicate OSMHeader blob"));
                }
                (BlobType::Data, false) => {
                    return Err(Error::format(start, "OSMData blob before OSMHeader"));
                }
                _ => (),
            }
            self.seen_header = true;

            return Ok(Some(RawBlob {
                blob_type,
                offset: start,
                data,
            }));
        }
    }
}

impl<R: Read> Iterator for BlobReader<R> {
    type Item = Result<RawBlob>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_blob().transpose();
        // a corrupt blob ends the stream, there is no resynchronization
        if !matches!(result, Some(Ok(_))) {
            self.done = true;
        }
        result
    }
}

/// Returns the decompressed payload of a blob.
fn blob_payload(raw: &RawBlob) -> Result<Vec<u8>> {
    let offset = raw.offset;
    let blob = proto::Blob::decode(raw.data.as_slice())
        .map_err(|e| Error::format(offset, format!("invalid blob: {}", e)))?;

    let payload = if let Some(data) = blob.raw {
        data
    } else if let Some(data) = blob.zlib_data {
        let raw_size = blob.raw_size.unwrap_or(0).max(0) as usize;
        if raw_size > MAX_BLOB_SIZE {
            return Err(Error::format(
                offset,
                format!("blob declares {} bytes, limit is {}", raw_size, MAX_BLOB_SIZE),
            ));
        }
        let mut buf = Vec::with_capacity(raw_size);
        ZlibDecoder::new(data.as_slice())
            .take(MAX_BLOB_SIZE as u64 + 1)
            .read_to_end(&mut buf)
            .map_err(|e| Error::format(offset, format!("corrupt zlib data: {}", e)))?;
        if buf.len() > MAX_BLOB_SIZE {
            return Err(Error::format(
                offset,
                format!("blob inflates to more than {} bytes", MAX_BLOB_SIZE),
            ));
        }
        buf
    } else {
        return Err(Error::format(
            offset,
            "unsupported blob compression, only raw and zlib are supported",
        ));
    };

    if let Some(raw_size) = blob.raw_size {
        if raw_size as usize != payload.len() {
            return Err(Error::format(
                offset,
                format!(
                    "blob decompressed to {} bytes, expected {}",
                    payload.len(),
                    raw_size
                ),
            ));
        }
    }
    Ok(payload)
}

fn check_header(offset: u64, payload: &[u8]) -> Result<()> {
    let header = proto::HeaderBlock::decode(payload)
        .map_err(|e| Error::format(offset, format!("invalid header block: {}", e)))?;
    if let Some(feature) = header
        .required_features
        .iter()
        .find(|f| !SUPPORTED_FEATURES.contains(&f.as_str()))
    {
        return Err(Error::UnsupportedFormat(format!(
            "PBF requires unsupported feature {:?}",
            feature
        )));
    }
    debug!(
        "PBF header: writing program {:?}, source {:?}",
        header.writingprogram, header.source
    );
    Ok(())
}

/// Decodes a blob into the entities it contains, in block order.
///
/// Header blobs are validated and yield no entities. Nodes with coordinates
/// outside of the WGS84 range are left out.
pub fn decode_blob(raw: RawBlob, with_tags: bool) -> Result<Vec<Event>> {
    let payload = blob_payload(&raw)?;
    match raw.blob_type {
        BlobType::Header => {
            check_header(raw.offset, &payload)?;
            Ok(Vec::new())
        }
        BlobType::Data => {
            let block = proto::PrimitiveBlock::decode(payload.as_slice()).map_err(|e| {
                Error::format(raw.offset, format!("invalid primitive block: {}", e))
            })?;
            let events = BlockDecoder {
                block: &block,
                offset: raw.offset,
                with_tags,
            }
            .decode()?;
            trace!("Decoded {} entities from blob at byte {}", events.len(), raw.offset);
            Ok(events)
        }
    }
}

struct BlockDecoder<'a> {
    block: &'a proto::PrimitiveBlock,
    offset: u64,
    with_tags: bool,
}

impl BlockDecoder<'_> {
    fn decode(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for group in &self.block.primitivegroup {
            for node in &group.nodes {
                if let Some(node) = self.node(node.id, node.lon, node.lat)? {
                    events.push(Event::Node(node));
                }
            }
            if let Some(dense) = &group.dense {
                self.dense_nodes(dense, &mut events)?;
            }
            for way in &group.ways {
                events.push(Event::Way(self.way(way)?));
            }
        }
        Ok(events)
    }

    fn id(&self, id: i64) -> Result<u64> {
        u64::try_from(id).map_err(|_| Error::format(self.offset, format!("negative id {}", id)))
    }

    /// Converts raw block coordinates to a node.
    ///
    /// The nanodegree value is truncated to 1e-7 degrees, which is the
    /// precision OSM stores and other PBF readers report.
    fn node(&self, id: i64, lon: i64, lat: i64) -> Result<Option<Node>> {
        let granularity = i64::from(self.block.granularity());
        let to_fixed = |offset: i64, value: i64| -> Option<i64> {
            granularity
                .checked_mul(value)
                .and_then(|x| x.checked_add(offset))
                .map(|nano| nano / 100)
        };
        let location = to_fixed(self.block.lon_offset(), lon)
            .zip(to_fixed(self.block.lat_offset(), lat))
            .and_then(|(lon, lat)| Location::from_fixed(lon, lat));
        let id = self.id(id)?;
        Ok(location.map(|location| Node::from_location(id, location)))
    }

    fn dense_nodes(&self, dense: &proto::DenseNodes, events: &mut Vec<Event>) -> Result<()> {
        if dense.lat.len() != dense.id.len() || dense.lon.len() != dense.id.len() {
            return Err(Error::format(
                self.offset,
                "dense nodes with mismatching id and coordinate counts",
            ));
        }

        let (mut id, mut lat, mut lon) = (0_i64, 0_i64, 0_i64);
        for i in 0..dense.id.len() {
            id = id.wrapping_add(dense.id[i]);
            lat = lat.wrapping_add(dense.lat[i]);
            lon = lon.wrapping_add(dense.lon[i]);
            if let Some(node) = self.node(id, lon, lat)? {
                events.push(Event::Node(node));
            }
        }
        Ok(())
    }

    fn string(&self, idx: u32) -> Result<String> {
        let bytes = self
            .block
            .stringtable
            .s
            .get(idx as usize)
            .ok_or_else(|| Error::format(self.offset, format!("string index {} out of range", idx)))?;
        let s = str::from_utf8(bytes)
            .map_err(|e| Error::format(self.offset, format!("invalid string: {}", e)))?;
        Ok(s.to_string())
    }

    fn tags(&self, keys: &[u32], vals: &[u32]) -> Result<Tags> {
        if keys.len() != vals.len() {
            return Err(Error::format(self.offset, "mismatching tag key and value counts"));
        }
        keys.iter()
            .zip(vals)
            .map(|(&k, &v)| Ok((self.string(k)?, self.string(v)?)))
            .collect()
    }

    fn way(&self, way: &proto::Way) -> Result<Way> {
        let mut node_ref = 0_i64;
        let refs = way
            .refs
            .iter()
            .map(|delta| {
                node_ref = node_ref.wrapping_add(*delta);
                self.id(node_ref)
            })
            .collect::<Result<Vec<_>>>()?;
        let tags = if self.with_tags {
            self.tags(&way.keys, &way.vals)?
        } else {
            Tags::new()
        };
        Ok(Way {
            id: self.id(way.id)?,
            refs,
            tags,
        })
    }
}

/// Lazy sequence of entities of a PBF stream
///
/// Decodes one blob at a time; the whole file is never held in memory.
pub struct PbfReader<R> {
    blobs: BlobReader<R>,
    pending: VecDeque<Event>,
    with_tags: bool,
}

impl<R: Read> PbfReader<R> {
    pub fn new(input: R, with_tags: bool) -> Self {
        Self {
            blobs: BlobReader::new(input),
            pending: VecDeque::new(),
            with_tags,
        }
    }

    /// Gives up entity decoding to process the blobs separately.
    pub fn into_blobs(self) -> BlobReader<R> {
        self.blobs
    }
}

impl<R: Read> Iterator for PbfReader<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            let blob = match self.blobs.next()? {
                Ok(blob) => blob,
                Err(e) => return Some(Err(e)),
            };
            match decode_blob(blob, self.with_tags) {
                Ok(events) => self.pending.extend(events),
                Err(e) => {
                    self.blobs.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
