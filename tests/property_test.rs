// tests/property_test.rs

//! Property-based tests for the scheduler and its data structures.
//!
//! These verify invariants that must hold for any input: progress sets stay
//! disjoint, the strategy never over-dispatches, topology hashes are stable,
//! and adjacency stays symmetric within a datacenter.

mod property {
    pub mod scheduling_test;
    pub mod structure_test;
}
