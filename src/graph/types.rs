//! Graph data types: entity records, built nodes/edges and the persisted view state.

use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Label used for people without a name.
pub const UNNAMED_LABEL: &str = "Unknown";

/// Dimension that is active when nothing else was chosen.
pub const DEFAULT_DIMENSION: &str = "company";

/// Dimension that groups every entity by each of its tags.
pub const TAG_DIMENSION: &str = "tag";

/// Built-in classification fields that can be used as a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Company,
    Industry,
    Role,
    Location,
}

impl Field {
    pub fn all() -> &'static [Field] {
        &[Field::Company, Field::Industry, Field::Role, Field::Location]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Company => "company",
            Field::Industry => "industry",
            Field::Role => "role",
            Field::Location => "location",
        }
    }

    /// Parse a reserved field name. Matching is exact, like the dimension selector emits it.
    pub fn parse(dimension: &str) -> Option<Field> {
        Field::all().iter().copied().find(|f| f.name() == dimension)
    }

    pub fn value_of<'a>(&self, entity: &'a Entity) -> &'a str {
        match self {
            Field::Company => &entity.company,
            Field::Industry => &entity.industry,
            Field::Role => &entity.role,
            Field::Location => &entity.location,
        }
    }
}

/// A person record as supplied by the external contact store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub company: String,
    pub role: String,
    pub industry: String,
    pub location: String,
    pub tags: BTreeSet<String>,
    pub linked_ids: BTreeSet<String>,
    /// Soft-deletion marker; deleted records never reach the graph.
    pub deleted_at: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = normalize(tag);
        self.tags.iter().any(|t| normalize(t) == wanted)
    }
}

/// A named tag from the tag registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// Kind of node in the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Person,
    Group,
}

impl NodeKind {
    /// Marker circle radius used for drawing and hit testing
    pub fn radius(&self) -> f32 {
        match self {
            NodeKind::Person => 14.0,
            NodeKind::Group => 22.0,
        }
    }

    /// Collision box height
    pub fn box_height(&self) -> f32 {
        match self {
            NodeKind::Person => 24.0,
            NodeKind::Group => 30.0,
        }
    }

    /// Label pill starts this far right of the node center
    pub fn pill_offset(&self) -> f32 {
        match self {
            NodeKind::Person => 10.0,
            NodeKind::Group => 15.0,
        }
    }

    /// Label text starts this far right of the node center
    pub fn text_offset(&self) -> f32 {
        match self {
            NodeKind::Person => 20.0,
            NodeKind::Group => 28.0,
        }
    }

    /// Extra width around the measured label
    fn label_margin(&self) -> f32 {
        match self {
            NodeKind::Person => 40.0,
            NodeKind::Group => 50.0,
        }
    }

    fn approx_base(&self) -> f32 {
        match self {
            NodeKind::Person => 24.0,
            NodeKind::Group => 40.0,
        }
    }
}

/// A node in the people graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    // Classification fields (people only)
    pub company: String,
    pub role: String,
    pub industry: String,
    pub location: String,
    pub tags: Vec<String>,
    /// Dimension that produced this node (groups only)
    pub dimension: Option<String>,
    /// Measured label width in world units, 0 until the host reports it
    pub label_width: f32,
    /// Collision box size
    pub width: f32,
    pub height: f32,
}

impl GraphNode {
    pub fn person(entity: &Entity) -> Self {
        let label = if entity.name.trim().is_empty() {
            UNNAMED_LABEL.to_string()
        } else {
            entity.name.clone()
        };
        let kind = NodeKind::Person;
        Self {
            id: entity.id.clone(),
            kind,
            width: approx_width(&label, kind),
            height: kind.box_height(),
            label,
            company: entity.company.clone(),
            role: entity.role.clone(),
            industry: entity.industry.clone(),
            location: entity.location.clone(),
            tags: entity.tags.iter().cloned().collect(),
            dimension: None,
            label_width: 0.0,
        }
    }

    pub fn group(id: String, label: String, dimension: &str) -> Self {
        let kind = NodeKind::Group;
        Self {
            id,
            kind,
            width: approx_width(&label, kind),
            height: kind.box_height(),
            label,
            company: String::new(),
            role: String::new(),
            industry: String::new(),
            location: String::new(),
            tags: Vec::new(),
            dimension: Some(dimension.to_string()),
            label_width: 0.0,
        }
    }

    pub fn is_person(&self) -> bool {
        self.kind == NodeKind::Person
    }

    /// Label background for this node drawn at `pos`
    pub fn pill_rect(&self, pos: Pos2) -> Rect {
        let text = if self.label_width > 0.0 {
            self.label_width
        } else {
            self.label.chars().count() as f32 * CHAR_WIDTH
        };
        Rect::from_min_size(
            pos + Vec2::new(self.kind.pill_offset(), -PILL_HEIGHT / 2.0),
            Vec2::new(text + 20.0, PILL_HEIGHT),
        )
    }

    /// Whether `point` hits the marker circle or the label pill of this node at `pos`
    pub fn contains(&self, pos: Pos2, point: Pos2) -> bool {
        pos.distance(point) <= self.kind.radius() || self.pill_rect(pos).contains(point)
    }

    /// Record the rendered label width and resize the collision box to fit it.
    pub fn set_label_width(&mut self, width: f32) {
        if !width.is_finite() || width < 0.0 {
            return;
        }
        self.label_width = width;
        self.width = width + self.kind.label_margin();
    }
}

/// Rough glyph width used before labels are measured
const CHAR_WIDTH: f32 = 10.0;

const PILL_HEIGHT: f32 = 24.0;

/// Label width estimate used until the real one is measured
fn approx_width(text: &str, kind: NodeKind) -> f32 {
    kind.approx_base() + text.chars().count() as f32 * CHAR_WIDTH + 20.0
}

/// An undirected connection between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Whether this edge connects `a` and `b` in either direction
    pub fn joins(&self, a: &str, b: &str) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }
}

/// Nodes and edges produced by the builder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphData {
    pub fn group_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Group).count()
    }

    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// View state owned by the caller and kept across view switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphState {
    pub search_term: String,
    pub dimension: String,
    pub custom_dimension_input: String,
    pub custom_mappings: HashMap<String, String>,
    pub current_cluster_index: usize,
}

impl Default for GraphState {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            dimension: DEFAULT_DIMENSION.to_string(),
            custom_dimension_input: String::new(),
            custom_mappings: HashMap::new(),
            current_cluster_index: 0,
        }
    }
}

impl GraphState {
    /// Keep the cluster index valid for `cluster_count` clusters (0 when there are none).
    pub fn clamp_cluster_index(&mut self, cluster_count: usize) {
        if cluster_count == 0 {
            self.current_cluster_index = 0;
        } else if self.current_cluster_index >= cluster_count {
            self.current_cluster_index %= cluster_count;
        }
    }

    /// Go back to the default company dimension and drop any custom grouping.
    pub fn reset_dimension(&mut self) {
        self.dimension = DEFAULT_DIMENSION.to_string();
        self.custom_dimension_input.clear();
        self.custom_mappings.clear();
    }

    pub fn is_searching(&self) -> bool {
        !self.search_term.is_empty()
    }
}

/// Lowercased, trimmed form used for every case-insensitive comparison
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_defaults() {
        let node = GraphNode::person(&Entity::new("p1", "  "));
        assert_eq!(node.label, UNNAMED_LABEL);
        assert!(node.company.is_empty());
        assert_eq!(node.height, 24.0);
        assert_eq!(node.width, 24.0 + 7.0 * 10.0 + 20.0);
    }

    #[test]
    fn test_measured_width_replaces_estimate() {
        let mut node = GraphNode::group("g".into(), "Acme".into(), "company");
        node.set_label_width(33.0);
        assert_eq!(node.width, 83.0);
        node.set_label_width(f32::NAN);
        assert_eq!(node.width, 83.0);
    }

    #[test]
    fn test_hit_covers_circle_and_pill() {
        let mut node = GraphNode::person(&Entity::new("p1", "Ada"));
        node.set_label_width(40.0);
        let pos = Pos2::new(100.0, 100.0);
        assert!(node.contains(pos, Pos2::new(90.0, 100.0)));
        // pill spans x 110..170
        assert!(node.contains(pos, Pos2::new(165.0, 105.0)));
        assert!(!node.contains(pos, Pos2::new(175.0, 100.0)));
        assert!(!node.contains(pos, Pos2::new(130.0, 120.0)));
    }

    #[test]
    fn test_cluster_index_wraps_into_range() {
        let mut state = GraphState {
            current_cluster_index: 5,
            ..Default::default()
        };
        state.clamp_cluster_index(3);
        assert_eq!(state.current_cluster_index, 2);
        state.clamp_cluster_index(0);
        assert_eq!(state.current_cluster_index, 0);
    }

    #[test]
    fn test_entity_deserializes_with_missing_fields() {
        let entity: Entity =
            serde_json::from_str(r#"{"id":"c1","tags":["VC"],"linkedIds":["c2"]}"#).unwrap();
        assert_eq!(entity.id, "c1");
        assert!(entity.name.is_empty());
        assert!(entity.has_tag("vc"));
        assert!(entity.linked_ids.contains("c2"));
    }
}
