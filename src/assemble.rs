//! Resolution of closed ways into polygon rings.
//!
//! Rings keep the node order of the source and the repeated closing vertex,
//! i.e. they are closed linear rings as GeoJSON expects them. No winding order
//! or self-intersection checks are done.

use crate::elements::{Coord, Location, Tags, Way};
use crate::index::NodeIndex;
use crate::stats::Stats;

use ahash::AHashSet;
use itertools::Itertools;
use log::{debug, warn};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRing {
    pub id: u64,
    /// Locations of the resolved refs, in way order
    pub points: Vec<Coord>,
    /// Number of refs missing in the node index
    pub unresolved: usize,
    /// All refs resolved and at least 3 distinct points
    pub valid: bool,
    pub tags: Tags,
}

/// Resolves the refs of `way` against `index`.
///
/// Returns `None` if the way does not form a loop: its end ids differ and
/// their locations differ as well. A way whose end cannot be resolved yet is
/// still treated as a loop candidate, with `unresolved > 0`.
pub fn resolve(way: &Way, index: &NodeIndex) -> Option<ResolvedRing> {
    let (first, last) = (*way.refs.first()?, *way.refs.last()?);
    if !way.is_closed() {
        if let (Some(a), Some(b)) = (index.location(first), index.location(last)) {
            if a != b {
                return None;
            }
        }
    }

    let mut unresolved = 0;
    let locations: Vec<Location> = way
        .refs
        .iter()
        .filter_map(|&id| {
            let location = index.location(id);
            unresolved += location.is_none() as usize;
            location
        })
        .collect();

    Some(ResolvedRing {
        id: way.id,
        valid: unresolved == 0 && has_three_distinct(&locations),
        points: locations.into_iter().map(Location::coord).collect(),
        unresolved,
        tags: Tags::new(),
    })
}

/// Returns the ring of `way` if it is a closed way with all refs resolved
/// and at least 3 distinct points.
pub fn assemble(way: &Way, index: &NodeIndex) -> Option<ResolvedRing> {
    resolve(way, index).filter(|ring| ring.valid)
}

fn has_three_distinct(points: &[Location]) -> bool {
    let mut seen = AHashSet::with_capacity(3);
    points.iter().any(|p| {
        seen.insert(*p);
        seen.len() >= 3
    })
}

/// Collects rings of ways in encounter order
///
/// Ways whose nodes are all known when they are offered are resolved right
/// away. The others are buffered and resolved in [`finish`](Self::finish),
/// after the node index is complete. Every way gets a sequence number, so
/// the final order does not depend on when a way was resolved.
#[derive(Debug, Default)]
pub struct WayAssembler {
    next_seq: usize,
    ready: Vec<(usize, ResolvedRing)>,
    deferred: Vec<(usize, Way)>,
}

impl WayAssembler {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn offer(&mut self, mut way: Way, index: &NodeIndex, stats: &mut Stats) {
        stats.num_ways += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        match resolve(&way, index) {
            None => stats.num_open_ways += 1,
            Some(ring) if ring.unresolved > 0 => {
                stats.num_deferred_ways += 1;
                self.deferred.push((seq, way));
            }
            Some(ring) if !ring.valid => stats.num_degenerate_rings += 1,
            Some(mut ring) => {
                ring.tags = std::mem::take(&mut way.tags);
                self.ready.push((seq, ring));
            }
        }
    }

    pub fn num_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Resolves the deferred ways and returns all rings in way order.
    pub fn finish(self, index: &NodeIndex, stats: &mut Stats) -> Vec<ResolvedRing> {
        debug!(
            "Resolving {} deferred ways against {} nodes",
            self.deferred.len(),
            index.len()
        );
        let late: Vec<_> = self
            .deferred
            .into_par_iter()
            .map(|(seq, way)| {
                let ring = resolve(&way, index).map(|mut ring| {
                    ring.tags = way.tags;
                    ring
                });
                (seq, ring)
            })
            .collect();

        let mut resolved = Vec::with_capacity(late.len());
        for (seq, ring) in late {
            match ring {
                None => stats.num_open_ways += 1,
                Some(ring) if ring.unresolved > 0 => stats.num_unresolved_ways += 1,
                Some(ring) if !ring.valid => stats.num_degenerate_rings += 1,
                Some(ring) => resolved.push((seq, ring)),
            }
        }
        if stats.num_unresolved_ways > 0 {
            warn!(
                "Dropped {} closed ways referencing missing nodes",
                stats.num_unresolved_ways
            );
        }

        self.ready
            .into_iter()
            .merge_by(resolved, |a, b| a.0 < b.0)
            .map(|(_, ring)| ring)
            .collect()
    }
}
