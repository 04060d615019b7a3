//! Streaming reader of the OSM XML format (`.osm` files).

use crate::elements::{Event, Location, Node, Way};
use crate::error::{Error, Result};

use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;

use std::io::{self, BufRead};
use std::str::FromStr;

enum State {
    /// Before the root element
    Prolog,
    /// Inside `<osm>`
    Top,
    Way(Way),
    /// Inside an element whose content is ignored, with nesting depth
    Skip(usize),
    /// After `</osm>`
    Done,
}

/// Lazy sequence of entities of an OSM XML document
pub struct XmlReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: State,
    with_tags: bool,
    failed: bool,
}

impl<R: BufRead> XmlReader<R> {
    pub fn new(input: R, with_tags: bool) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            state: State::Prolog,
            with_tags,
            failed: false,
        }
    }

    fn next_entity(&mut self) -> Result<Option<Event>> {
        loop {
            self.buf.clear();
            let offset = self.reader.buffer_position() as u64;
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| xml_error(offset, e))?;
            let entity = match event {
                XmlEvent::Start(e) => start(&mut self.state, &e, false, offset, self.with_tags)?,
                XmlEvent::Empty(e) => start(&mut self.state, &e, true, offset, self.with_tags)?,
                XmlEvent::End(e) => end(&mut self.state, e.name().as_ref()),
                XmlEvent::Eof => {
                    return match self.state {
                        State::Done => Ok(None),
                        State::Prolog => Err(Error::format(offset, "missing <osm> root element")),
                        _ => Err(Error::format(offset, "unexpected end of document")),
                    };
                }
                _ => None,
            };
            if entity.is_some() {
                return Ok(entity);
            }
        }
    }
}

impl<R: BufRead> Iterator for XmlReader<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.next_entity().transpose();
        if let Some(Err(_)) = result {
            self.failed = true;
        }
        result
    }
}

fn xml_error(offset: u64, e: quick_xml::Error) -> Error {
    match e {
        quick_xml::Error::Io(e) => Error::from_read(offset, io::Error::new(e.kind(), e.to_string())),
        e => Error::format(offset, e.to_string()),
    }
}

fn attr<T: FromStr>(e: &BytesStart, key: &str, offset: u64) -> Result<Option<T>> {
    let attr = e
        .try_get_attribute(key)
        .map_err(|err| Error::format(offset, err.to_string()))?;
    let attr = match attr {
        Some(attr) => attr,
        None => return Ok(None),
    };
    let value = attr
        .unescape_value()
        .map_err(|err| Error::format(offset, err.to_string()))?;
    value.parse().map(Some).map_err(|_| {
        Error::format(offset, format!("invalid value {:?} of attribute {}", value, key))
    })
}

fn required_attr<T: FromStr>(e: &BytesStart, key: &str, offset: u64) -> Result<T> {
    attr(e, key, offset)?.ok_or_else(|| Error::format(offset, format!("missing attribute {}", key)))
}

fn coordinate(e: &BytesStart, key: &str, offset: u64) -> Result<Option<i64>> {
    match attr::<String>(e, key, offset)? {
        Some(text) => Location::parse_fixed(&text).map(Some).ok_or_else(|| {
            Error::format(offset, format!("invalid value {:?} of attribute {}", text, key))
        }),
        None => Ok(None),
    }
}

/// Parses a node. Nodes without coordinates (deleted in history files) or
/// outside of the WGS84 range are skipped.
fn node(e: &BytesStart, offset: u64) -> Result<Option<Node>> {
    let id = required_attr(e, "id", offset)?;
    let lon = coordinate(e, "lon", offset)?;
    let lat = coordinate(e, "lat", offset)?;
    let location = lon
        .zip(lat)
        .and_then(|(lon, lat)| Location::from_fixed(lon, lat));
    Ok(location.map(|location| Node::from_location(id, location)))
}

fn start(
    state: &mut State,
    e: &BytesStart,
    empty: bool,
    offset: u64,
    with_tags: bool,
) -> Result<Option<Event>> {
    match state {
        State::Prolog => match e.name().as_ref() {
            b"osm" => {
                *state = if empty { State::Done } else { State::Top };
                Ok(None)
            }
            b"osmChange" => Err(Error::UnsupportedFormat(
                "osmChange documents are not supported".into(),
            )),
            _ => Err(Error::format(offset, "expected <osm> root element")),
        },
        State::Top => {
            if !empty {
                *state = State::Skip(0);
            }
            match e.name().as_ref() {
                b"node" => Ok(node(e, offset)?.map(Event::Node)),
                b"way" => {
                    let way = Way {
                        id: required_attr(e, "id", offset)?,
                        ..Default::default()
                    };
                    if empty {
                        Ok(Some(Event::Way(way)))
                    } else {
                        *state = State::Way(way);
                        Ok(None)
                    }
                }
                _ => Ok(None),
            }
        }
        State::Way(way) => {
            match e.name().as_ref() {
                b"nd" => way.refs.push(required_attr(e, "ref", offset)?),
                b"tag" if with_tags => {
                    let k = required_attr(e, "k", offset)?;
                    let v = required_attr(e, "v", offset)?;
                    way.tags.push((k, v));
                }
                _ => (),
            }
            Ok(None)
        }
        State::Skip(depth) => {
            if !empty {
                *depth += 1;
            }
            Ok(None)
        }
        State::Done => Err(Error::format(offset, "content after </osm>")),
    }
}

fn end(state: &mut State, name: &[u8]) -> Option<Event> {
    match state {
        State::Top if name == b"osm" => *state = State::Done,
        State::Way(_) if name == b"way" => {
            if let State::Way(way) = std::mem::replace(state, State::Top) {
                return Some(Event::Way(way));
            }
        }
        State::Skip(0) => *state = State::Top,
        State::Skip(depth) => *depth -= 1,
        _ => (),
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    fn read_all(xml: &str, with_tags: bool) -> Result<Vec<Event>> {
        XmlReader::new(xml.as_bytes(), with_tags).collect()
    }

    fn node(id: u64, lon: f64, lat: f64) -> Event {
        Event::Node(Node { id, lon, lat })
    }

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <bounds minlat="0" minlon="0" maxlat="1" maxlon="1"/>
  <node id="1" lat="0" lon="0" version="1"/>
  <node id="2" lat="0.0000000" lon="1.00000004">
    <tag k="name" v="corner"/>
  </node>
  <node id="3" lat="1" lon="1"/>
  <way id="10">
    <nd ref="1"/>
    <nd ref="2"/>
    <nd ref="3"/>
    <nd ref="1"/>
    <tag k="name" v="A &amp; B"/>
  </way>
  <relation id="100">
    <member type="way" ref="10" role="outer"/>
    <tag k="type" v="multipolygon"/>
  </relation>
  <way id="11"/>
</osm>
"#;

    #[test]
    fn test_read_document() {
        let events = read_all(DOCUMENT, true).unwrap();
        assert_eq!(
            events,
            vec![
                node(1, 0.0, 0.0),
                node(2, 1.0, 0.0),
                node(3, 1.0, 1.0),
                Event::Way(Way {
                    id: 10,
                    refs: vec![1, 2, 3, 1],
                    tags: vec![("name".into(), "A & B".into())],
                }),
                Event::Way(Way {
                    id: 11,
                    ..Default::default()
                }),
            ]
        );
    }

    #[test]
    fn test_tags_are_dropped_on_request() {
        let events = read_all(DOCUMENT, false).unwrap();
        match &events[3] {
            Event::Way(way) => assert!(way.tags.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_nodes_without_coordinates_are_skipped() {
        let xml = r#"<osm><node id="1" visible="false"/><node id="2" lat="91" lon="0"/></osm>"#;
        assert_eq!(read_all(xml, false).unwrap(), Vec::new());
    }

    #[test]
    fn test_huge_coordinates_are_skipped() {
        let xml = r#"<osm><node id="1" lat="0" lon="-1e12"/><node id="2" lat="1e400" lon="0"/></osm>"#;
        assert_eq!(read_all(xml, false).unwrap(), Vec::new());
    }

    #[test]
    fn test_coordinates_round_on_eighth_digit() {
        let xml = r#"<osm><node id="1" lat="2.00000025" lon="-2.00000025"/></osm>"#;
        assert_eq!(
            read_all(xml, false).unwrap(),
            vec![node(1, -2.0000003, 2.0000003)]
        );
    }

    #[test]
    fn test_invalid_coordinate() {
        let xml = r#"<osm><node id="1" lat="0" lon="east"/></osm>"#;
        assert!(matches!(read_all(xml, false), Err(Error::Format { .. })));
    }

    #[test]
    fn test_truncated_document() {
        let xml = &DOCUMENT[..DOCUMENT.find("<nd ref=\"3\"").unwrap()];
        let mut reader = XmlReader::new(xml.as_bytes(), false);
        let results: Vec<_> = reader.by_ref().collect();
        assert_eq!(results.len(), 4);
        assert!(results[..3].iter().all(|r| r.is_ok()));
        assert!(matches!(results.last(), Some(Err(Error::Format { .. }))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_invalid_attribute_value() {
        let xml = r#"<osm><node id="x" lat="0" lon="0"/></osm>"#;
        assert!(matches!(read_all(xml, false), Err(Error::Format { .. })));
    }

    #[test]
    fn test_missing_node_ref() {
        let xml = r#"<osm><way id="1"><nd/></way></osm>"#;
        assert!(matches!(read_all(xml, false), Err(Error::Format { .. })));
    }

    #[test]
    fn test_wrong_root() {
        assert!(matches!(
            read_all("<gpx></gpx>", false),
            Err(Error::Format { offset: 0, .. })
        ));
        assert!(matches!(
            read_all("<osmChange></osmChange>", false),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
