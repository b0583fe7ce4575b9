//! Free-text dimension resolution and the external classifier seam.

pub mod client;

pub use client::{ClassifierConfig, HttpClassifier};

use crate::graph::builder::tag_exists;
use crate::graph::types::{normalize, Entity, GraphState, Tag};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, TryRecvError};

/// Assigns each entity a label for a free-text dimension.
///
/// Implementations must not block; results arrive through the returned handle.
pub trait DimensionClassifier {
    fn classify(&self, entities: &[Entity], dimension: &str) -> PendingClassification;
}

/// An in-flight classification, polled once per frame.
pub struct PendingClassification {
    dimension: String,
    receiver: Receiver<HashMap<String, String>>,
}

impl PendingClassification {
    /// Handle plus the sender the worker reports through
    pub fn channel(dimension: &str) -> (mpsc::Sender<HashMap<String, String>>, Self) {
        let (tx, rx) = mpsc::channel();
        (
            tx,
            Self {
                dimension: dimension.to_string(),
                receiver: rx,
            },
        )
    }

    /// Already finished with `mapping`
    pub fn ready(dimension: &str, mapping: HashMap<String, String>) -> Self {
        let (tx, pending) = Self::channel(dimension);
        let _ = tx.send(mapping);
        pending
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    /// The mapping once available. A worker that went away counts as an empty mapping.
    pub fn poll(&self) -> Option<HashMap<String, String>> {
        match self.receiver.try_recv() {
            Ok(mapping) => Some(mapping),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                tracing::warn!("Classification for {:?} was dropped", self.dimension);
                Some(HashMap::new())
            }
        }
    }
}

/// Apply a finished mapping if the dimension it was requested for is still active.
pub fn apply_classification(
    state: &mut GraphState,
    dimension: &str,
    mapping: HashMap<String, String>,
) -> bool {
    if state.dimension != dimension {
        tracing::debug!("Discarding classification for stale dimension {:?}", dimension);
        return false;
    }
    tracing::info!("Classified {} entities for {:?}", mapping.len(), dimension);
    state.custom_mappings = mapping;
    true
}

/// Switch to the free-text dimension in `state.custom_dimension_input`.
///
/// An existing tag resolves locally into a mapping of everyone carrying it.
/// Anything else activates the dimension with no groups and asks the
/// classifier; the returned handle delivers the mapping.
pub fn resolve_custom_dimension(
    state: &mut GraphState,
    entities: &[Entity],
    tags: &[Tag],
    classifier: &dyn DimensionClassifier,
) -> Option<PendingClassification> {
    let input = state.custom_dimension_input.trim().to_string();
    if input.is_empty() {
        return None;
    }
    state.custom_mappings.clear();

    if tag_exists(entities, tags, &input) {
        let wanted = normalize(&input);
        let label = tags
            .iter()
            .find(|t| normalize(&t.name) == wanted)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| capitalize(&input));
        state.custom_mappings = entities
            .iter()
            .filter(|e| e.has_tag(&input))
            .map(|e| (e.id.clone(), label.clone()))
            .collect();
        tracing::debug!(
            "Dimension {:?} resolved from tags: {} members",
            label,
            state.custom_mappings.len()
        );
        state.dimension = label;
        return None;
    }

    tracing::info!("Requesting classification for dimension {:?}", input);
    let pending = classifier.classify(entities, &input);
    state.dimension = input;
    Some(pending)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Returns a fixed mapping and records what it was asked
    struct StaticClassifier {
        mapping: HashMap<String, String>,
        asked: RefCell<Vec<String>>,
    }

    impl DimensionClassifier for StaticClassifier {
        fn classify(&self, _entities: &[Entity], dimension: &str) -> PendingClassification {
            self.asked.borrow_mut().push(dimension.to_string());
            PendingClassification::ready(dimension, self.mapping.clone())
        }
    }

    fn classifier(pairs: &[(&str, &str)]) -> StaticClassifier {
        StaticClassifier {
            mapping: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            asked: RefCell::new(Vec::new()),
        }
    }

    fn entities() -> Vec<Entity> {
        let mut a = Entity::new("a", "Ann");
        a.tags = ["investor".to_string()].into();
        let b = Entity::new("b", "Ben");
        vec![a, b]
    }

    fn state(input: &str) -> GraphState {
        GraphState {
            custom_dimension_input: input.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn existing_tag_resolves_locally() {
        let ai = classifier(&[]);
        let mut st = state(" investor ");
        assert!(resolve_custom_dimension(&mut st, &entities(), &[], &ai).is_none());
        assert_eq!(st.dimension, "Investor");
        assert_eq!(st.custom_mappings.len(), 1);
        assert_eq!(st.custom_mappings["a"], "Investor");
        assert!(ai.asked.borrow().is_empty());
    }

    #[test]
    fn registry_spelling_wins() {
        let ai = classifier(&[]);
        let tags = vec![Tag {
            id: "t".into(),
            name: "INVESTOR".into(),
        }];
        let mut st = state("investor");
        resolve_custom_dimension(&mut st, &entities(), &tags, &ai);
        assert_eq!(st.dimension, "INVESTOR");
    }

    #[test]
    fn unknown_dimension_asks_classifier() {
        let ai = classifier(&[("a", "Female"), ("b", "Other")]);
        let mut st = state("Gender");
        st.custom_mappings.insert("stale".into(), "x".into());

        let pending = resolve_custom_dimension(&mut st, &entities(), &[], &ai).unwrap();
        assert_eq!(st.dimension, "Gender");
        assert!(st.custom_mappings.is_empty());
        assert_eq!(ai.asked.borrow().as_slice(), ["Gender".to_string()]);

        let mapping = pending.poll().unwrap();
        assert!(apply_classification(&mut st, pending.dimension(), mapping));
        assert_eq!(st.custom_mappings.len(), 2);
    }

    #[test]
    fn empty_input_is_noop() {
        let ai = classifier(&[]);
        let mut st = state("   ");
        assert!(resolve_custom_dimension(&mut st, &entities(), &[], &ai).is_none());
        assert_eq!(st, GraphState {
            custom_dimension_input: "   ".into(),
            ..Default::default()
        });
    }

    #[test]
    fn stale_or_dropped_results() {
        let mut st = GraphState::default();
        let mapping: HashMap<String, String> = [("a".to_string(), "X".to_string())].into();
        assert!(!apply_classification(&mut st, "Gender", mapping));
        assert!(st.custom_mappings.is_empty());

        let (tx, pending) = PendingClassification::channel("Gender");
        assert!(pending.poll().is_none());
        drop(tx);
        assert_eq!(pending.poll(), Some(HashMap::new()));
    }
}
