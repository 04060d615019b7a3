use crate::assemble::ResolvedRing;
use crate::elements::Coord;

use serde::Serialize;

use std::collections::BTreeMap;

/// Scalar value of a feature property
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Id(u64),
    Text(String),
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// Polygon without holes; the exterior is a closed ring
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: u64,
    pub geometry: Polygon,
    pub properties: Properties,
}

impl From<ResolvedRing> for Feature {
    /// The `id` property always holds the way id, even if the way has a tag
    /// with the same key.
    fn from(ring: ResolvedRing) -> Self {
        let mut properties: Properties = ring
            .tags
            .into_iter()
            .map(|(k, v)| (k, PropertyValue::Text(v)))
            .collect();
        properties.insert("id".into(), PropertyValue::Id(ring.id));
        Feature {
            id: ring.id,
            geometry: Polygon {
                exterior: ring.points,
            },
            properties,
        }
    }
}

/// Features in the order the ways were encountered
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureCollection {
    features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, ring: ResolvedRing) {
        self.features.push(ring.into());
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }
}

impl Extend<ResolvedRing> for FeatureCollection {
    fn extend<I: IntoIterator<Item = ResolvedRing>>(&mut self, rings: I) {
        self.features.extend(rings.into_iter().map(Feature::from));
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}
