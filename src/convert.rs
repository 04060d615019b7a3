use crate::assemble::WayAssembler;
use crate::elements::Event;
use crate::error::{Error, Result};
use crate::features::FeatureCollection;
use crate::format::{EventReader, Format};
use crate::index::NodeIndex;
use crate::osmpbf::{decode_blob, RawBlob};
use crate::parallel::parallel_process;
use crate::stats::Stats;

use log::info;

use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Number of threads decoding PBF blocks; 0 uses rayon's default
    pub threads: usize,
    /// Copy way tags into the feature properties
    pub include_tags: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            include_tags: false,
        }
    }
}

impl ConvertOptions {
    fn num_threads(&self) -> usize {
        match self.threads {
            0 => rayon::current_num_threads(),
            n => n,
        }
    }
}

/// Push based conversion of an entity stream into polygon features
///
/// Nodes go into the node index, ways into the assembler. The caller can
/// stop pushing at any time and discard the converter.
#[derive(Debug, Default)]
pub struct Converter {
    index: NodeIndex,
    assembler: WayAssembler,
    stats: Stats,
}

impl Converter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, event: Event) {
        match event {
            Event::Node(node) => {
                self.stats.num_nodes += 1;
                if !self.index.insert(node.id, node.lon, node.lat) {
                    self.stats.num_invalid_nodes += 1;
                }
            }
            Event::Way(way) => self.assembler.offer(way, &self.index, &mut self.stats),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Resolves deferred ways and returns the features in way order.
    pub fn finish(self) -> (FeatureCollection, Stats) {
        let Converter {
            index,
            assembler,
            mut stats,
        } = self;
        info!(
            "Read {} nodes and {} ways, resolving {} deferred ways",
            stats.num_nodes,
            stats.num_ways,
            assembler.num_deferred()
        );
        let rings = assembler.finish(&index, &mut stats);

        let mut collection = FeatureCollection::new();
        collection.extend(rings);
        stats.num_features = collection.len();
        info!("Assembled {} polygons", collection.len());
        (collection, stats)
    }
}

/// Converts an OSM PBF or XML stream into polygon features.
///
/// `hint` is used when the format cannot be detected from the leading bytes.
/// Any stream level error aborts the conversion and no features are returned.
pub fn convert<R>(
    input: R,
    hint: Option<Format>,
    options: &ConvertOptions,
) -> Result<(FeatureCollection, Stats)>
where
    R: BufRead + Send,
{
    let reader = EventReader::new(input, hint, options.include_tags)?;
    info!("Reading OSM {} input", reader.format());

    let mut converter = Converter::new();
    let num_threads = options.num_threads();
    match reader {
        EventReader::Pbf(reader) if num_threads > 1 => {
            let with_tags = options.include_tags;
            parallel_process(
                reader.into_blobs(),
                num_threads,
                |blob: Result<RawBlob>| blob.and_then(|blob| decode_blob(blob, with_tags)),
                |events| -> std::result::Result<(), Error> {
                    for event in events? {
                        converter.push(event);
                    }
                    Ok(())
                },
            )?;
        }
        reader => {
            for event in reader {
                converter.push(event?);
            }
        }
    }
    Ok(converter.finish())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::elements::{Node, Way};
    use crate::geojson;
    use crate::testutil::{PbfBuilder, TestBlock};

    use serde_json::{json, Value};

    fn options(threads: usize) -> ConvertOptions {
        ConvertOptions {
            threads,
            include_tags: false,
        }
    }

    fn to_json(collection: &FeatureCollection) -> Value {
        serde_json::from_str(&geojson::to_string(collection).unwrap()).unwrap()
    }

    fn square_nodes() -> TestBlock {
        TestBlock::new().dense_nodes(&[
            (1, 0.0, 0.0),
            (2, 1.0, 0.0),
            (3, 1.0, 1.0),
            (4, 0.0, 0.0),
        ])
    }

    #[test]
    fn test_pbf_scenarios() {
        let data = PbfBuilder::new()
            .block(square_nodes())
            .block(
                TestBlock::new()
                    .way(10, &[1, 2, 3, 4], &[])
                    .way(11, &[1, 2, 3], &[])
                    .way(12, &[1, 99, 3, 1], &[]),
            )
            .build();

        for threads in [1, 4] {
            let (collection, stats) =
                convert(data.as_slice(), None, &options(threads)).unwrap();
            assert_eq!(
                to_json(&collection),
                json!({
                    "type": "FeatureCollection",
                    "features": [{
                        "type": "Feature",
                        "geometry": {
                            "type": "Polygon",
                            "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]
                        },
                        "properties": { "id": 10 }
                    }]
                })
            );
            assert_eq!(stats.num_ways, 3);
            assert_eq!(stats.num_open_ways, 1);
            assert_eq!(stats.num_unresolved_ways, 1);
            assert_eq!(stats.num_features, 1);
        }
    }

    #[test]
    fn test_xml_scenarios() {
        let xml = r#"<?xml version="1.0"?>
<osm version="0.6">
  <node id="1" lat="0" lon="0"/>
  <node id="2" lat="0" lon="1"/>
  <node id="3" lat="1" lon="1"/>
  <node id="4" lat="0" lon="0"/>
  <way id="10"><nd ref="1"/><nd ref="2"/><nd ref="3"/><nd ref="4"/></way>
  <way id="11"><nd ref="1"/><nd ref="2"/><nd ref="3"/></way>
  <way id="12"><nd ref="1"/><nd ref="99"/><nd ref="3"/><nd ref="1"/></way>
</osm>"#;
        let (collection, _) = convert(xml.as_bytes(), None, &options(1)).unwrap();
        let value = to_json(&collection);
        assert_eq!(value["features"].as_array().unwrap().len(), 1);
        assert_eq!(value["features"][0]["properties"]["id"], 10);
        assert_eq!(
            value["features"][0]["geometry"]["coordinates"],
            json!([[[0, 0], [1, 0], [1, 1], [0, 0]]])
        );
    }

    #[test]
    fn test_ways_before_nodes() {
        let data = PbfBuilder::new()
            .block(
                TestBlock::new()
                    .way(20, &[1, 2, 3, 1], &[])
                    .way(21, &[3, 2, 1, 3], &[]),
            )
            .block(square_nodes())
            .block(TestBlock::new().way(22, &[2, 3, 4, 2], &[]))
            .build();

        for threads in [1, 3] {
            let (collection, stats) =
                convert(data.as_slice(), None, &options(threads)).unwrap();
            let ids: Vec<_> = collection.iter().map(|f| f.id).collect();
            assert_eq!(ids, vec![20, 21, 22]);
            assert_eq!(stats.num_deferred_ways, 2);
        }
    }

    #[test]
    fn test_tags_as_properties() {
        let data = PbfBuilder::new()
            .block(square_nodes())
            .block(TestBlock::new().way(10, &[1, 2, 3, 1], &[("building", "yes"), ("id", "x")]))
            .build();
        let options = ConvertOptions {
            threads: 1,
            include_tags: true,
        };

        let (collection, _) = convert(data.as_slice(), None, &options).unwrap();
        assert_eq!(
            to_json(&collection)["features"][0]["properties"],
            json!({ "building": "yes", "id": 10 })
        );
    }

    #[test]
    fn test_truncated_input_aborts() {
        let data = PbfBuilder::new()
            .block(square_nodes())
            .block(TestBlock::new().way(10, &[1, 2, 3, 4], &[]))
            .build();

        for threads in [1, 4] {
            let result = convert(&data[..data.len() - 1], None, &options(threads));
            assert!(matches!(result, Err(Error::Format { .. })));
        }
        let result = convert(&data[..3], Some(Format::Pbf), &options(1));
        assert!(matches!(result, Err(Error::Format { offset: 0, .. })));
    }

    #[test]
    fn test_unsupported_input() {
        let result = convert(&b"\x1f\x8b\x08\x00\x00"[..], Some(Format::Pbf), &options(1));
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
        let result = convert(&b"name,lat,lon\n"[..], None, &options(1));
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_converter_push() {
        let mut converter = Converter::new();
        for (id, lon, lat) in [(1, 0.0, 0.0), (2, 1.0, 0.0), (3, 0.5, 1.0), (4, 500.0, 0.0)] {
            converter.push(Event::Node(Node { id, lon, lat }));
        }
        converter.push(Event::Way(Way {
            id: 7,
            refs: vec![1, 2, 3, 1],
            tags: Vec::new(),
        }));
        converter.push(Event::Way(Way {
            id: 8,
            refs: vec![1, 2, 4, 1],
            tags: Vec::new(),
        }));
        assert_eq!(converter.stats().num_invalid_nodes, 1);

        let (collection, stats) = converter.finish();
        assert_eq!(collection.len(), 1);
        assert_eq!(stats.num_unresolved_ways, 1);
        assert_eq!(stats.num_nodes, 4);
    }
}
