//! The network view: builder, simulation, viewport, navigator and pointer
//! interaction driven together once per frame.

use super::builder;
use super::interaction::{ClickConfig, Effect, Interaction, PointerEvent};
use super::layout::{ForceLayout, Simulation};
use super::search::{HoverFocus, NavigatorConfig, SearchChange, SearchNavigator};
use super::types::{Entity, GraphData, GraphNode, GraphState, Tag};
use super::viewport::{Viewport, ViewportConfig};
use egui::{Pos2, Vec2};
use petgraph::graphmap::UnGraphMap;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Grouping inputs the current node set was built from
#[derive(Debug, Clone, PartialEq)]
struct BuildKey {
    dimension: String,
    custom_mappings: HashMap<String, String>,
}

/// Pointer input in panel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Moved(Pos2),
    Pressed(Pos2),
    Released(Pos2),
    Left,
}

pub struct NetworkView {
    entities: Vec<Entity>,
    tags: Vec<Tag>,
    data: GraphData,
    node_index: HashMap<String, usize>,
    adjacency: UnGraphMap<usize, ()>,
    built_from: Option<BuildKey>,
    simulation: Simulation,
    viewport: Viewport,
    navigator: SearchNavigator,
    interaction: Interaction,
    hover: Option<HoverFocus>,
    /// Fit all content on the first frame that has positions
    initial_fit: bool,
}

impl NetworkView {
    pub fn new(
        layout: ForceLayout,
        viewport: ViewportConfig,
        search: NavigatorConfig,
        click: ClickConfig,
    ) -> Self {
        Self {
            entities: Vec::new(),
            tags: Vec::new(),
            data: GraphData::default(),
            node_index: HashMap::new(),
            adjacency: UnGraphMap::new(),
            built_from: None,
            simulation: Simulation::new(layout, Pos2::ZERO),
            viewport: Viewport::new(viewport),
            navigator: SearchNavigator::new(search),
            interaction: Interaction::new(click),
            hover: None,
            initial_fit: true,
        }
    }

    /// Replace the entity records; the graph is rebuilt on the next sync.
    pub fn set_entities(&mut self, entities: Vec<Entity>, tags: Vec<Tag>) {
        self.entities = entities;
        self.tags = tags;
        self.built_from = None;
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn data(&self) -> &GraphData {
        &self.data
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn set_layout(&mut self, layout: ForceLayout) {
        self.simulation.set_layout(layout);
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn navigator(&self) -> &SearchNavigator {
        &self.navigator
    }

    pub fn hover(&self) -> Option<&HoverFocus> {
        self.hover.as_ref()
    }

    pub fn position(&self, id: &str) -> Option<Pos2> {
        self.simulation.position(id)
    }

    pub fn set_viewport_size(&mut self, size: Vec2) {
        self.viewport.set_size(size);
        self.simulation.set_center((size / 2.0).to_pos2());
    }

    /// Advance one frame. Returns true while anything is still moving.
    pub fn sync(&mut self, state: &mut GraphState, now: Instant) -> bool {
        let key = BuildKey {
            dimension: state.dimension.clone(),
            custom_mappings: state.custom_mappings.clone(),
        };
        if self.built_from.as_ref() != Some(&key) {
            self.rebuild(state, key, now);
        }

        match self.navigator.observe(state, &self.data.nodes, now) {
            SearchChange::Unchanged => {}
            SearchChange::Updated => {
                self.simulation
                    .set_search_focus(Some(self.navigator.matched().clone()));
                self.simulation.perturb(self.simulation.layout().search_alpha);
            }
            SearchChange::Cleared => {
                self.simulation.set_search_focus(None);
                self.simulation
                    .perturb(self.simulation.layout().search_cleared_alpha);
                self.fit_content(now);
            }
        }

        self.simulation.step();

        if self.initial_fit && !self.data.nodes.is_empty() && self.viewport.size() != Vec2::ZERO {
            self.initial_fit = false;
            self.fit_content(now);
        }

        if let Some(members) = self.navigator.take_due_fit(state, now) {
            let positions: Vec<Pos2> = members
                .iter()
                .filter_map(|id| self.simulation.position(id))
                .collect();
            let mode = self.viewport.config.cluster_fit();
            self.viewport.fit(positions, mode, now);
        }

        self.viewport.tick(now);

        !self.simulation.is_idle() || self.viewport.is_animating() || self.navigator.fit_pending()
    }

    fn rebuild(&mut self, state: &mut GraphState, key: BuildKey, now: Instant) {
        self.data = builder::build(&self.entities, &self.tags, &key.dimension, &key.custom_mappings);
        self.node_index = self
            .data
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        self.adjacency = UnGraphMap::with_capacity(self.data.nodes.len(), self.data.edges.len());
        for i in 0..self.data.nodes.len() {
            self.adjacency.add_node(i);
        }
        for edge in &self.data.edges {
            if let (Some(&a), Some(&b)) = (self.node_index.get(&edge.source), self.node_index.get(&edge.target)) {
                self.adjacency.add_edge(a, b, ());
            }
        }

        let effects = self.interaction.reset();
        self.apply_effects(effects);
        self.simulation.load(&self.data);

        self.navigator.refresh(state, &self.data.nodes, now);
        if self.navigator.is_searching() {
            self.simulation
                .set_search_focus(Some(self.navigator.matched().clone()));
        } else {
            self.simulation.set_search_focus(None);
        }

        tracing::info!(
            "Rebuilt network for {:?}: {} nodes, {} edges",
            key.dimension,
            self.data.nodes.len(),
            self.data.edges.len()
        );
        self.built_from = Some(key);
    }

    /// Report rendered label widths so collision boxes fit the text.
    pub fn set_label_width(&mut self, id: &str, width: f32) {
        let Some(&i) = self.node_index.get(id) else {
            return;
        };
        let node = &mut self.data.nodes[i];
        if (node.label_width - width).abs() < 0.5 {
            return;
        }
        node.set_label_width(width);
        let (w, h) = (node.width, node.height);
        self.simulation.set_node_size(id, w, h);
    }

    /// Ids directly connected to `id`
    pub fn neighbors(&self, id: &str) -> HashSet<String> {
        let Some(&i) = self.node_index.get(id) else {
            return HashSet::new();
        };
        self.adjacency
            .neighbors(i)
            .map(|j| self.data.nodes[j].id.clone())
            .collect()
    }

    /// Topmost node whose marker or label contains the world point
    pub fn node_at(&self, world: Pos2) -> Option<&GraphNode> {
        self.data
            .nodes
            .iter()
            .rev()
            .find(|node| {
                self.simulation
                    .position(&node.id)
                    .is_some_and(|pos| node.contains(pos, world))
            })
    }

    /// Feed pointer input. Returns the id of a person node that was clicked.
    pub fn handle_pointer(&mut self, input: PointerInput, now: Instant) -> Option<String> {
        let hit_at = |view: &Self, screen: Pos2| {
            let world = view.viewport.to_world(screen);
            (world, view.node_at(world).map(|n| n.id.clone()))
        };
        let event = match input {
            PointerInput::Moved(screen) => {
                let (pos, hit) = hit_at(self, screen);
                PointerEvent::Moved { pos, hit }
            }
            PointerInput::Pressed(screen) => {
                let (pos, hit) = hit_at(self, screen);
                let node_pos = hit.as_deref().and_then(|id| self.simulation.position(id));
                PointerEvent::Pressed { pos, hit, node_pos }
            }
            PointerInput::Released(screen) => {
                let (pos, hit) = hit_at(self, screen);
                PointerEvent::Released { pos, hit }
            }
            PointerInput::Left => PointerEvent::Left,
        };
        let effects = self.interaction.handle(event, now);
        self.apply_effects(effects)
    }

    pub fn is_dragging(&self) -> bool {
        self.interaction.dragging().is_some()
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) -> Option<String> {
        let mut selected = None;
        for effect in effects {
            match effect {
                Effect::HoverChanged(id) => {
                    self.hover = id.map(|id| HoverFocus {
                        neighbors: self.neighbors(&id),
                        id,
                    });
                }
                Effect::DragStarted { id, pin } => {
                    self.simulation.pin(&id, pin);
                    let target = self.simulation.layout().drag_alpha_target;
                    self.simulation.set_alpha_target(target);
                }
                Effect::DragMoved { id, pin } => {
                    self.simulation.pin(&id, pin);
                }
                Effect::DragEnded { id } => {
                    self.simulation.unpin(&id);
                    self.simulation.set_alpha_target(0.0);
                }
                Effect::Clicked(id) => {
                    let is_person = self
                        .node_index
                        .get(&id)
                        .is_some_and(|&i| self.data.nodes[i].is_person());
                    if is_person {
                        tracing::debug!("Selected {}", id);
                        selected = Some(id);
                    }
                }
            }
        }
        selected
    }

    /// Pan the panel by a screen-space delta.
    pub fn pan_by(&mut self, delta: Vec2) {
        self.viewport.pan_by(delta);
    }

    /// Scroll/pinch zoom around a panel point.
    pub fn zoom_at(&mut self, factor: f32, anchor: Pos2) {
        self.viewport.zoom_at(factor, anchor);
    }

    pub fn zoom_in(&mut self, now: Instant) {
        let factor = self.viewport.config.zoom_in_factor;
        self.viewport.zoom_by(factor, now);
    }

    pub fn zoom_out(&mut self, now: Instant) {
        let factor = self.viewport.config.zoom_out_factor;
        self.viewport.zoom_by(factor, now);
    }

    /// Animated fit of every node.
    pub fn fit_content(&mut self, now: Instant) {
        if self.simulation.is_empty() {
            return;
        }
        let positions: Vec<Pos2> = self.simulation.current_positions().map(|(_, p)| p).collect();
        let mode = self.viewport.config.content_fit();
        self.viewport.fit(positions, mode, now);
    }

    pub fn next_cluster(&mut self, state: &mut GraphState, now: Instant) -> bool {
        self.navigator.next(state, now)
    }

    pub fn prev_cluster(&mut self, state: &mut GraphState, now: Instant) -> bool {
        self.navigator.prev(state, now)
    }

    /// Empty the search term; the next sync releases the search force and fits content.
    pub fn clear_search(&mut self, state: &mut GraphState) {
        state.search_term.clear();
    }

    /// Back to the company dimension with no custom grouping.
    pub fn reset_dimension(&mut self, state: &mut GraphState, now: Instant) {
        state.reset_dimension();
        if !state.is_searching() {
            self.fit_content(now);
        }
    }
}

impl Default for NetworkView {
    fn default() -> Self {
        Self::new(
            ForceLayout::default(),
            ViewportConfig::default(),
            NavigatorConfig::default(),
            ClickConfig::default(),
        )
    }
}
