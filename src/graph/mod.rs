//! Graph data structures and layout algorithms.

pub mod builder;
pub mod forces;
pub mod interaction;
pub mod layout;
pub mod quadtree;
pub mod search;
pub mod spatial;
pub mod types;
pub mod view;
pub mod viewport;

pub use layout::{ForceLayout, Simulation};
pub use types::{Entity, GraphData, GraphEdge, GraphNode, GraphState, NodeKind, Tag};
pub use view::{NetworkView, PointerInput};
