use crate::elements::{Coord, Location};

use ahash::AHashMap;

/// Maps OSM node ids to their locations
///
/// Locations are stored in 1e-7 degree fixed point, which keeps an entry at
/// 16 bytes and makes coordinate comparisons exact. Inserting an id twice
/// overwrites the previous location (last write wins).
#[derive(Debug, Default)]
pub struct NodeIndex {
    data: AHashMap<u64, Location>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts a node given in degrees.
    ///
    /// Returns `false` and leaves the index untouched if the coordinate is not
    /// a valid WGS84 location.
    pub fn insert(&mut self, id: u64, lon: f64, lat: f64) -> bool {
        match Location::from_degrees(lon, lat) {
            Some(location) => {
                self.insert_location(id, location);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn insert_location(&mut self, id: u64, location: Location) {
        self.data.insert(id, location);
    }

    #[inline]
    pub fn location(&self, id: u64) -> Option<Location> {
        self.data.get(&id).copied()
    }

    pub fn lookup(&self, id: u64) -> Option<Coord> {
        self.location(id).map(Location::coord)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
