//! Builds the node/edge set from entity records and the active grouping rule.
//!
//! People always become nodes. Group nodes are derived from the active dimension:
//! - a non-empty custom mapping assigns each entity an explicit label
//! - a dimension naming a registry tag groups everyone carrying that tag
//! - a reserved field (company, industry, role, location) groups by field value
//! - the `tag` dimension groups by every tag, many-to-many
//!
//! Relation edges from `linked_ids` are added last and deduplicated against
//! every edge already present for the same unordered pair.

use super::types::{
    normalize, Entity, Field, GraphData, GraphEdge, GraphNode, Tag, TAG_DIMENSION,
};
use petgraph::graphmap::UnGraphMap;
use std::collections::{HashMap, HashSet};

/// Custom mapping values that mean "not in any group"
pub const SENTINEL_VALUES: [&str; 4] = ["", "Unknown", "Other", "No"];

pub fn is_sentinel(value: &str) -> bool {
    SENTINEL_VALUES.contains(&value.trim())
}

/// How entities are assigned to groups for the current dimension
#[derive(Debug, Clone, PartialEq)]
pub enum GroupingRule<'a> {
    /// Explicit id -> label assignment
    Custom(&'a HashMap<String, String>),
    /// Binary membership in a single existing tag
    SingleTag(&'a str),
    /// Verbatim value of a built-in field
    Field(Field),
    /// Every tag is its own group
    AllTags,
    /// A free-text dimension with no mapping yet
    Unresolved,
}

impl<'a> GroupingRule<'a> {
    /// Pick the rule for `dimension`, first match wins.
    pub fn resolve(
        tags: &[Tag],
        dimension: &'a str,
        custom_mappings: &'a HashMap<String, String>,
    ) -> Self {
        if !custom_mappings.is_empty() {
            return GroupingRule::Custom(custom_mappings);
        }
        if registry_has_tag(tags, dimension) {
            return GroupingRule::SingleTag(dimension);
        }
        if let Some(field) = Field::parse(dimension) {
            return GroupingRule::Field(field);
        }
        if dimension == TAG_DIMENSION {
            return GroupingRule::AllTags;
        }
        GroupingRule::Unresolved
    }

    /// Group values (trimmed, display form) this entity belongs to
    fn values_for(&self, entity: &Entity) -> Vec<String> {
        match self {
            GroupingRule::Custom(mappings) => mappings
                .get(&entity.id)
                .filter(|value| !is_sentinel(value))
                .map(|value| vec![value.trim().to_string()])
                .unwrap_or_default(),
            GroupingRule::SingleTag(tag) => {
                if entity.has_tag(tag) {
                    vec![tag.trim().to_string()]
                } else {
                    Vec::new()
                }
            }
            GroupingRule::Field(field) => {
                let value = field.value_of(entity).trim();
                if value.is_empty() {
                    Vec::new()
                } else {
                    vec![value.to_string()]
                }
            }
            GroupingRule::AllTags => entity
                .tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            GroupingRule::Unresolved => Vec::new(),
        }
    }
}

/// Whether `name` is a registry tag (case-insensitive).
pub fn registry_has_tag(tags: &[Tag], name: &str) -> bool {
    let wanted = normalize(name);
    !wanted.is_empty() && tags.iter().any(|t| normalize(&t.name) == wanted)
}

/// Whether `name` is a registry tag or a tag used by any entity (case-insensitive).
pub fn tag_exists(entities: &[Entity], tags: &[Tag], name: &str) -> bool {
    registry_has_tag(tags, name) || (!name.trim().is_empty() && entities.iter().any(|e| e.has_tag(name)))
}

/// Deterministic id for the group node of `value` under `dimension`
pub fn group_id(dimension: &str, value: &str) -> String {
    format!("grp-{}-{}", dimension, normalize(value))
}

/// Build nodes and edges. Same inputs always give the same output.
pub fn build(
    entities: &[Entity],
    tags: &[Tag],
    dimension: &str,
    custom_mappings: &HashMap<String, String>,
) -> GraphData {
    let mut nodes: Vec<GraphNode> = entities.iter().map(GraphNode::person).collect();
    let mut node_ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();

    let rule = GroupingRule::resolve(tags, dimension, custom_mappings);

    // Groups in first-seen order, keyed by normalized value
    let mut group_order: Vec<String> = Vec::new();
    let mut group_labels: HashMap<String, String> = HashMap::new();
    let mut members: HashMap<String, Vec<&str>> = HashMap::new();

    for entity in entities {
        let mut seen = HashSet::new();
        for value in rule.values_for(entity) {
            let key = normalize(&value);
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            if !group_labels.contains_key(&key) {
                group_order.push(key.clone());
                group_labels.insert(key.clone(), value);
            }
            members.entry(key).or_default().push(entity.id.as_str());
        }
    }

    let mut group_edges: Vec<(String, &str)> = Vec::new();
    for key in &group_order {
        let label = group_labels[key].clone();
        let id = group_id(dimension, &label);
        if !node_ids.insert(id.clone()) {
            tracing::warn!("Group id {} collides with an existing node, skipping", id);
            continue;
        }
        for &member in members.get(key).map(Vec::as_slice).unwrap_or_default() {
            group_edges.push((id.clone(), member));
        }
        nodes.push(GraphNode::group(id, label, dimension));
    }

    let mut pairs: UnGraphMap<&str, ()> = UnGraphMap::new();
    let mut edges = Vec::new();

    for (group, member) in &group_edges {
        let (group, member) = (group.as_str(), *member);
        if member == group || pairs.contains_edge(member, group) {
            continue;
        }
        pairs.add_edge(member, group, ());
        edges.push(GraphEdge::new(member, group));
    }

    for entity in entities {
        for target in &entity.linked_ids {
            if *target == entity.id || !node_ids.contains(target) {
                continue;
            }
            if pairs.contains_edge(entity.id.as_str(), target.as_str()) {
                continue;
            }
            pairs.add_edge(entity.id.as_str(), target.as_str(), ());
            edges.push(GraphEdge::new(entity.id.clone(), target.clone()));
        }
    }

    tracing::debug!(
        "Built graph for dimension {:?}: {} people, {} groups, {} edges",
        dimension,
        entities.len(),
        group_order.len(),
        edges.len()
    );

    GraphData { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::NodeKind;

    fn person(id: &str, company: &str, tags: &[&str]) -> Entity {
        let mut e = Entity::new(id, format!("Person {}", id));
        e.company = company.to_string();
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        e
    }

    fn registry(names: &[&str]) -> Vec<Tag> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Tag {
                id: format!("t{}", i + 1),
                name: name.to_string(),
            })
            .collect()
    }

    fn edges_to<'a>(data: &'a GraphData, id: &str) -> Vec<&'a GraphEdge> {
        data.edges
            .iter()
            .filter(|e| e.source == id || e.target == id)
            .collect()
    }

    #[test]
    fn company_groups_count_distinct_values() {
        let entities = vec![
            person("a", "Acme", &[]),
            person("b", "Acme", &[]),
            person("c", "Globex", &[]),
            person("d", "", &[]),
        ];
        let data = build(&entities, &[], "company", &HashMap::new());

        assert_eq!(data.group_count(), 2);
        assert_eq!(data.nodes.len(), 6);
        assert_eq!(edges_to(&data, &group_id("company", "Acme")).len(), 2);
        assert_eq!(edges_to(&data, &group_id("company", "Globex")).len(), 1);
        assert!(edges_to(&data, "d").is_empty());
    }

    #[test]
    fn sentinel_mapping_values_form_no_group() {
        let entities = vec![person("id1", "", &[]), person("id2", "", &[])];
        let mappings: HashMap<String, String> = [
            ("id1".to_string(), "Other".to_string()),
            ("id2".to_string(), "Female".to_string()),
        ]
        .into();
        let data = build(&entities, &[], "Gender", &mappings);

        assert_eq!(data.group_count(), 1);
        let group = data.nodes.iter().find(|n| n.kind == NodeKind::Group).unwrap();
        assert_eq!(group.label, "Female");
        assert_eq!(data.edges, vec![GraphEdge::new("id2", group.id.clone())]);
    }

    #[test]
    fn every_sentinel_is_skipped() {
        for value in ["Unknown", "No", "", "  Other ", "\tUnknown\n"] {
            assert!(is_sentinel(value), "{:?}", value);
        }
        assert!(!is_sentinel("None"));
        assert!(!is_sentinel("unknown"));

        let entities: Vec<Entity> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|id| person(id, "", &[]))
            .collect();
        let mappings: HashMap<String, String> = [
            ("a", "Unknown"),
            ("b", "No"),
            ("c", ""),
            ("d", " Other "),
            ("e", " Founder "),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let data = build(&entities, &[], "Founder?", &mappings);

        assert_eq!(data.group_count(), 1);
        let gid = group_id("Founder?", "Founder");
        assert_eq!(data.get_node(&gid).map(|n| n.label.as_str()), Some("Founder"));
        assert_eq!(data.edges, vec![GraphEdge::new("e", gid)]);
    }

    #[test]
    fn existing_tag_dimension_is_binary() {
        let entities = vec![
            person("a", "", &["Investor"]),
            person("b", "", &["friend"]),
            person("c", "", &["INVESTOR", "friend"]),
        ];
        let data = build(&entities, &registry(&["Investor"]), "investor", &HashMap::new());

        assert_eq!(data.group_count(), 1);
        let gid = group_id("investor", "investor");
        assert_eq!(edges_to(&data, &gid).len(), 2);
        assert!(edges_to(&data, "b").is_empty());
    }

    #[test]
    fn registry_tag_wins_over_field_name() {
        let entities = vec![person("a", "Acme", &["role"])];
        let tags = vec![Tag {
            id: "t1".into(),
            name: "Role".into(),
        }];
        let empty = HashMap::new();
        let rule = GroupingRule::resolve(&tags, "role", &empty);
        assert_eq!(rule, GroupingRule::SingleTag("role"));
    }

    #[test]
    fn contact_tags_do_not_shadow_fields() {
        let entities = vec![
            person("a", "Acme", &[]),
            person("b", "Globex", &["Company"]),
        ];
        let tags = registry(&["Friend"]);
        assert_eq!(
            GroupingRule::resolve(&tags, "company", &HashMap::new()),
            GroupingRule::Field(Field::Company)
        );

        let data = build(&entities, &tags, "company", &HashMap::new());
        assert_eq!(data.group_count(), 2);
        let acme = group_id("company", "Acme");
        assert_eq!(edges_to(&data, &acme), vec![&GraphEdge::new("a", acme.clone())]);
        assert_eq!(edges_to(&data, &group_id("company", "Globex")).len(), 1);

        let tagged = vec![person("a", "", &["VC"]), person("b", "", &["tag", "VC"])];
        let data = build(&tagged, &tags, "tag", &HashMap::new());
        assert_eq!(data.group_count(), 2);
        assert_eq!(edges_to(&data, &group_id("tag", "vc")).len(), 2);
    }

    #[test]
    fn contact_tags_count_as_existing_for_custom_input() {
        let entities = vec![person("a", "", &["Founder"])];
        assert!(tag_exists(&entities, &[], "founder"));
        assert!(!registry_has_tag(&[], "founder"));
        assert!(!tag_exists(&entities, &[], "  "));
    }

    #[test]
    fn tag_mode_is_many_to_many() {
        let entities = vec![
            person("a", "", &["VC", "Friend"]),
            person("b", "", &["friend"]),
        ];
        let data = build(&entities, &[], "tag", &HashMap::new());

        assert_eq!(data.group_count(), 2);
        assert_eq!(edges_to(&data, "a").len(), 2);
        assert_eq!(edges_to(&data, &group_id("tag", "friend")).len(), 2);
    }

    #[test]
    fn unknown_dimension_without_mapping_has_no_groups() {
        let entities = vec![person("a", "Acme", &["VC"])];
        let data = build(&entities, &[], "Seniority", &HashMap::new());
        assert_eq!(data.group_count(), 0);
        assert!(data.edges.is_empty());
    }

    #[test]
    fn relation_edges_are_deduplicated() {
        let mut a = person("a", "Acme", &[]);
        let mut b = person("b", "Acme", &[]);
        a.linked_ids = ["b".to_string(), "a".to_string(), "ghost".to_string()].into();
        b.linked_ids = ["a".to_string()].into();
        a.linked_ids.insert(group_id("company", "Acme"));
        let data = build(&[a, b], &[], "company", &HashMap::new());

        let mut seen = HashSet::new();
        for edge in &data.edges {
            assert_ne!(edge.source, edge.target);
            let key = if edge.source < edge.target {
                (edge.source.clone(), edge.target.clone())
            } else {
                (edge.target.clone(), edge.source.clone())
            };
            assert!(seen.insert(key), "duplicate edge {:?}", edge);
        }
        // two group edges plus the single a-b relation
        assert_eq!(data.edges.len(), 3);
    }

    #[test]
    fn build_is_idempotent() {
        let mut a = person("a", "Acme", &["x", "y"]);
        a.linked_ids = ["b".to_string()].into();
        let entities = vec![a, person("b", "acme ", &["y"])];
        for dimension in ["company", "tag", "y"] {
            let first = build(&entities, &[], dimension, &HashMap::new());
            let second = build(&entities, &[], dimension, &HashMap::new());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn case_variants_share_one_group() {
        let entities = vec![person("a", "Acme", &[]), person("b", " acme", &[])];
        let data = build(&entities, &[], "company", &HashMap::new());
        assert_eq!(data.group_count(), 1);
        let group = data.get_node(&group_id("company", "acme")).unwrap();
        assert_eq!(group.label, "Acme");
        assert_eq!(group.dimension.as_deref(), Some("company"));
        assert_eq!(data.edges.len(), 2);
    }
}
