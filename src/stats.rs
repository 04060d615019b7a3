use std::fmt;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub num_nodes: usize,
    pub num_invalid_nodes: usize,
    pub num_ways: usize,
    pub num_open_ways: usize,
    pub num_unresolved_ways: usize,
    pub num_degenerate_rings: usize,
    pub num_deferred_ways: usize,
    pub num_features: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            r#"Read:
  nodes:        {}
  ways:         {}
Skipped:
  invalid nodes:    {}
  open ways:        {}
  unresolved ways:  {}
  degenerate rings: {}
Deferred ways:  {}
Polygons:       {}"#,
            self.num_nodes,
            self.num_ways,
            self.num_invalid_nodes,
            self.num_open_ways,
            self.num_unresolved_ways,
            self.num_degenerate_rings,
            self.num_deferred_ways,
            self.num_features
        )
    }
}
