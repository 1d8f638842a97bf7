// src/core/nodetool/mod.rs

//! Parsers for the nodetool output the orchestrator consumes.
//!
//! Only the post-parse data shapes matter to the rest of the crate: a
//! `Topology` from `nodetool status`, a (cluster name, schema version) pair
//! from `nodetool describecluster`, and token-range endpoint lists from
//! `nodetool describering`.

pub mod describering;
pub mod simple;
pub mod status;

pub use describering::{TokenRange, parse_describering};
pub use simple::{extract_keyspaces_from_cfstats, parse_describe_cluster};
pub use status::parse_status;
