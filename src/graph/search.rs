//! Search matching, cluster navigation and the dimming policy.

use super::types::{GraphNode, GraphState, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Case-insensitive substring match over tags, group labels and person fields.
///
/// `query` must already be lowercase.
pub fn matches(node: &GraphNode, query: &str) -> bool {
    if node.tags.iter().any(|t| contains(t, query)) {
        return true;
    }
    match node.kind {
        NodeKind::Group => contains(&node.label, query),
        NodeKind::Person => [&node.label, &node.company, &node.role, &node.industry]
            .into_iter()
            .any(|field| contains(field, query)),
    }
}

fn contains(haystack: &str, query: &str) -> bool {
    haystack.to_lowercase().contains(query)
}

/// Search tuning and the opacities handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Delay before fitting the current cluster, lets the search force settle
    pub fit_debounce_ms: u64,
    pub dim_node_opacity: f32,
    pub dim_link_opacity: f32,
    pub base_link_opacity: f32,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            fit_debounce_ms: 500,
            dim_node_opacity: 0.1,
            dim_link_opacity: 0.05,
            base_link_opacity: 0.6,
        }
    }
}

/// What changed when the search term was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchChange {
    Unchanged,
    /// Term became non-empty or changed to another non-empty term
    Updated,
    /// Term became empty
    Cleared,
}

/// Hovered node and its direct neighbors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoverFocus {
    pub id: String,
    pub neighbors: HashSet<String>,
}

impl HoverFocus {
    fn lights(&self, id: &str) -> bool {
        self.id == id || self.neighbors.contains(id)
    }
}

/// Tracks matches and clusters for the current search term.
///
/// All matches form a single cluster, so there are zero or one clusters;
/// navigation is written against any cluster count.
#[derive(Debug, Clone)]
pub struct SearchNavigator {
    pub config: NavigatorConfig,
    /// Term seen on the last observation
    last_term: String,
    query: String,
    matched: HashSet<String>,
    clusters: Vec<Vec<String>>,
    /// When the debounced cluster fit fires
    fit_due: Option<Instant>,
}

impl SearchNavigator {
    pub fn new(config: NavigatorConfig) -> Self {
        Self {
            config,
            last_term: String::new(),
            query: String::new(),
            matched: HashSet::new(),
            clusters: Vec::new(),
            fit_due: None,
        }
    }

    pub fn is_searching(&self) -> bool {
        !self.query.is_empty()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn clusters(&self) -> &[Vec<String>] {
        &self.clusters
    }

    pub fn is_match(&self, id: &str) -> bool {
        self.matched.contains(id)
    }

    pub fn matched(&self) -> &HashSet<String> {
        &self.matched
    }

    pub fn match_count(&self) -> usize {
        self.matched.len()
    }

    pub fn fit_pending(&self) -> bool {
        self.fit_due.is_some()
    }

    /// Compare the caller's term with the last one seen and update matches.
    ///
    /// The cluster index is reset only when the term actually changed.
    pub fn observe(
        &mut self,
        state: &mut GraphState,
        nodes: &[GraphNode],
        now: Instant,
    ) -> SearchChange {
        if state.search_term == self.last_term {
            state.clamp_cluster_index(self.clusters.len());
            return SearchChange::Unchanged;
        }
        self.last_term = state.search_term.clone();
        state.current_cluster_index = 0;
        self.recompute(state, nodes, now);

        if self.is_searching() {
            tracing::debug!(
                "Search {:?}: {} matches in {} clusters",
                state.search_term,
                self.matched.len(),
                self.clusters.len()
            );
            SearchChange::Updated
        } else {
            tracing::debug!("Search cleared");
            SearchChange::Cleared
        }
    }

    /// Re-match against a rebuilt node set, keeping the cluster index when still valid.
    pub fn refresh(&mut self, state: &mut GraphState, nodes: &[GraphNode], now: Instant) {
        self.recompute(state, nodes, now);
    }

    fn recompute(&mut self, state: &mut GraphState, nodes: &[GraphNode], now: Instant) {
        self.query = state.search_term.to_lowercase();
        self.matched.clear();
        self.clusters.clear();
        self.fit_due = None;

        if !self.query.is_empty() {
            let members: Vec<String> = nodes
                .iter()
                .filter(|n| matches(n, &self.query))
                .map(|n| n.id.clone())
                .collect();
            self.matched.extend(members.iter().cloned());
            if !members.is_empty() {
                self.clusters.push(members);
            }
        }

        state.clamp_cluster_index(self.clusters.len());
        if !self.clusters.is_empty() {
            self.schedule_fit(now);
        }
    }

    fn schedule_fit(&mut self, now: Instant) {
        self.fit_due = Some(now + Duration::from_millis(self.config.fit_debounce_ms));
    }

    /// Move to the next cluster. No-op with one cluster or none.
    pub fn next(&mut self, state: &mut GraphState, now: Instant) -> bool {
        self.step_cluster(state, now, 1)
    }

    /// Move to the previous cluster. No-op with one cluster or none.
    pub fn prev(&mut self, state: &mut GraphState, now: Instant) -> bool {
        let count = self.clusters.len();
        self.step_cluster(state, now, count.saturating_sub(1))
    }

    fn step_cluster(&mut self, state: &mut GraphState, now: Instant, offset: usize) -> bool {
        let count = self.clusters.len();
        if !self.is_searching() || count <= 1 {
            return false;
        }
        state.current_cluster_index = (state.current_cluster_index % count + offset) % count;
        tracing::debug!("Cluster {}/{}", state.current_cluster_index + 1, count);
        self.schedule_fit(now);
        true
    }

    /// Members of the current cluster once the debounce has elapsed.
    pub fn take_due_fit(&mut self, state: &GraphState, now: Instant) -> Option<&[String]> {
        let due = self.fit_due?;
        if now < due {
            return None;
        }
        self.fit_due = None;
        self.clusters
            .get(state.current_cluster_index)
            .map(Vec::as_slice)
    }

    /// Node opacity: hover focus first, then search matches.
    pub fn node_opacity(&self, id: &str, hover: Option<&HoverFocus>) -> f32 {
        let lit = match hover {
            Some(focus) => focus.lights(id),
            None => !self.is_searching() || self.is_match(id),
        };
        if lit {
            1.0
        } else {
            self.config.dim_node_opacity
        }
    }

    pub fn link_opacity(&self, source: &str, target: &str, hover: Option<&HoverFocus>) -> f32 {
        match hover {
            Some(focus) if focus.id == source || focus.id == target => self.config.base_link_opacity,
            Some(_) => self.config.dim_link_opacity,
            None if self.is_searching() => self.config.dim_link_opacity,
            None => self.config.base_link_opacity,
        }
    }
}

impl Default for SearchNavigator {
    fn default() -> Self {
        Self::new(NavigatorConfig::default())
    }
}
