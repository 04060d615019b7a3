//! Builders for in-memory PBF fixtures.

use crate::osmpbf::proto;

use byteorder::{NetworkEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use prost::Message;

use std::io::Write;

fn to_raw(degrees: f64) -> i64 {
    (degrees * 10_000_000.0).round() as i64
}

/// A `PrimitiveBlock` with a single group per added element kind
#[derive(Default)]
pub struct TestBlock {
    strings: Vec<String>,
    groups: Vec<proto::PrimitiveGroup>,
    granularity: Option<i32>,
    lon_offset: Option<i64>,
    lat_offset: Option<i64>,
}

impl TestBlock {
    pub fn new() -> Self {
        Self {
            // index 0 is reserved as delimiter
            strings: vec![String::new()],
            ..Default::default()
        }
    }

    pub fn granularity(mut self, granularity: i32) -> Self {
        self.granularity = Some(granularity);
        self
    }

    pub fn offsets(mut self, lon_offset: i64, lat_offset: i64) -> Self {
        self.lon_offset = Some(lon_offset);
        self.lat_offset = Some(lat_offset);
        self
    }

    fn string(&mut self, s: &str) -> u32 {
        match self.strings.iter().position(|x| x == s) {
            Some(idx) => idx as u32,
            None => {
                self.strings.push(s.to_string());
                (self.strings.len() - 1) as u32
            }
        }
    }

    /// Plain nodes with coordinates in degrees at the default granularity
    pub fn nodes(mut self, nodes: &[(i64, f64, f64)]) -> Self {
        let nodes = nodes
            .iter()
            .map(|&(id, lon, lat)| proto::Node {
                id,
                keys: Vec::new(),
                vals: Vec::new(),
                lat: to_raw(lat),
                lon: to_raw(lon),
            })
            .collect();
        self.groups.push(proto::PrimitiveGroup {
            nodes,
            ..Default::default()
        });
        self
    }

    /// Dense nodes with coordinates in degrees at the default granularity
    pub fn dense_nodes(self, nodes: &[(i64, f64, f64)]) -> Self {
        let raw: Vec<_> = nodes
            .iter()
            .map(|&(id, lon, lat)| (id, to_raw(lon), to_raw(lat)))
            .collect();
        self.raw_dense_nodes(&raw)
    }

    /// Dense nodes with raw (not delta encoded) block coordinates
    pub fn raw_dense_nodes(mut self, nodes: &[(i64, i64, i64)]) -> Self {
        let mut dense = proto::DenseNodes::default();
        let mut last = (0, 0, 0);
        for &(id, lon, lat) in nodes {
            dense.id.push(id - last.0);
            dense.lon.push(lon - last.1);
            dense.lat.push(lat - last.2);
            last = (id, lon, lat);
        }
        self.groups.push(proto::PrimitiveGroup {
            dense: Some(dense),
            ..Default::default()
        });
        self
    }

    pub fn way(mut self, id: i64, refs: &[i64], tags: &[(&str, &str)]) -> Self {
        let mut way = proto::Way {
            id,
            ..Default::default()
        };
        let mut last = 0;
        for &r in refs {
            way.refs.push(r - last);
            last = r;
        }
        for &(k, v) in tags {
            let k = self.string(k);
            let v = self.string(v);
            way.keys.push(k);
            way.vals.push(v);
        }
        self.groups.push(proto::PrimitiveGroup {
            ways: vec![way],
            ..Default::default()
        });
        self
    }

    fn encode(self) -> Vec<u8> {
        proto::PrimitiveBlock {
            stringtable: proto::StringTable {
                s: self.strings.into_iter().map(String::into_bytes).collect(),
            },
            primitivegroup: self.groups,
            granularity: self.granularity,
            lat_offset: self.lat_offset,
            lon_offset: self.lon_offset,
        }
        .encode_to_vec()
    }
}

/// Assembles a PBF byte stream: header blob followed by data blobs
pub struct PbfBuilder {
    compress: bool,
    header: bool,
    required_features: Vec<String>,
    blobs: Vec<(String, Vec<u8>)>,
}

impl PbfBuilder {
    pub fn new() -> Self {
        Self {
            compress: true,
            header: true,
            required_features: vec!["OsmSchema-V0.6".into(), "DenseNodes".into()],
            blobs: Vec::new(),
        }
    }

    pub fn uncompressed(mut self) -> Self {
        self.compress = false;
        self
    }

    pub fn without_header(mut self) -> Self {
        self.header = false;
        self
    }

    pub fn required_feature(mut self, feature: &str) -> Self {
        self.required_features.push(feature.to_string());
        self
    }

    pub fn block(mut self, block: TestBlock) -> Self {
        self.blobs.push(("OSMData".into(), block.encode()));
        self
    }

    /// Adds a blob of arbitrary type with raw payload
    pub fn raw_blob(mut self, blob_type: &str, payload: &[u8]) -> Self {
        self.blobs.push((blob_type.into(), payload.to_vec()));
        self
    }

    fn write_blob(&self, out: &mut Vec<u8>, blob_type: &str, payload: Vec<u8>) {
        let raw_size = Some(payload.len() as i32);
        let blob = if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&payload).unwrap();
            proto::Blob {
                raw_size,
                zlib_data: Some(encoder.finish().unwrap()),
                ..Default::default()
            }
        } else {
            proto::Blob {
                raw_size,
                raw: Some(payload),
                ..Default::default()
            }
        }
        .encode_to_vec();

        let header = proto::BlobHeader {
            r#type: blob_type.to_string(),
            indexdata: None,
            datasize: blob.len() as i32,
        }
        .encode_to_vec();

        out.write_u32::<NetworkEndian>(header.len() as u32).unwrap();
        out.extend_from_slice(&header);
        out.extend_from_slice(&blob);
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        if self.header {
            let header = proto::HeaderBlock {
                required_features: self.required_features.clone(),
                writingprogram: Some("osmpoly-test".into()),
                ..Default::default()
            }
            .encode_to_vec();
            self.write_blob(&mut out, "OSMHeader", header);
        }
        for (blob_type, payload) in &self.blobs {
            self.write_blob(&mut out, blob_type, payload.clone());
        }
        out
    }
}
