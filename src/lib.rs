//! People Graph
//!
//! Builds a force-directed network of people and the groups they share
//! (company, industry, role, location, tag or a classifier-defined
//! dimension) and keeps the layout, viewport and search navigation in sync.

pub mod classify;
pub mod graph;
pub mod settings;
pub mod store;
pub mod theme;
