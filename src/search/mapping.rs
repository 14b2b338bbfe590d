//! Parameter-mapping search (C7).
//!
//! spec.md §4.7 describes C7 as the per-comparison step that links up
//! executable parameters between two traces before a [`crate::scoring`]
//! strategy scores them. That is exactly what [`crate::scoring::compare`]
//! needs inline on every call, so the full three-pass algorithm (equal-value
//! pass, identity-filter pass, weighted-bipartite-match pass) lives there as
//! `map_parameters` rather than being duplicated here. This module just
//! gives C7 its own named address per the module layout, for callers (like
//! [`super::migration`]) that want the mapping without going through a
//! [`crate::scoring::ScoreStrategy`].
pub use crate::scoring::map_parameters;
