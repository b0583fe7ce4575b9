//! Force-directed graph layout simulation.
//!
//! Implements a decaying-energy ("alpha") relaxation with:
//! - Link springs toward a target distance (Hooke's law)
//! - Repulsion between all nodes (inverse-square) - O(n log n) via Barnes-Hut
//! - Centering of the centroid on the viewport center
//! - Rectangle collision between padded label boxes
//! - An optional pull of search matches toward the center
//!
//! Each step moves alpha toward its target by a fixed rate. Once alpha falls
//! below `alpha_min` the simulation is idle until perturbed again.

use super::forces::{self, CollisionParams, Link};
use super::quadtree::{ChargeParams, Quadtree};
use super::spatial::{GridIndex, SpatialIndex, SpatialIndexKind};
use super::types::GraphData;
use egui::{Pos2, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Force-directed layout parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceLayout {
    /// Target separation of linked nodes
    pub link_distance: f32,
    /// Spring coefficient; `None` uses 1 / min(endpoint degree)
    pub link_strength: Option<f32>,
    /// Per-node charge, negative repels
    pub charge_strength: f32,
    /// Barnes-Hut cell size / distance cutoff
    pub theta: f32,
    /// Charge distances below this are softened
    pub charge_distance_min: f32,
    /// Fraction of the centroid offset removed each step
    pub centering: f32,
    /// Gap kept between label boxes
    pub collision_padding: f32,
    pub collision_strength: f32,
    /// Pull of search matches toward the center
    pub search_strength: f32,
    /// Fraction of velocity lost per step
    pub velocity_decay: f32,
    /// Stop threshold
    pub alpha_min: f32,
    /// Rate at which alpha approaches its target
    pub alpha_decay: f32,
    /// Alpha target held while a node is dragged
    pub drag_alpha_target: f32,
    /// Alpha after the search term becomes non-empty
    pub search_alpha: f32,
    /// Alpha after the search term is cleared
    pub search_cleared_alpha: f32,
    /// Index used by the collision force
    pub spatial_index: SpatialIndexKind,
    /// Half-size of the square new nodes are scattered in
    pub initial_spread: f32,
    pub seed: u64,
}

impl Default for ForceLayout {
    fn default() -> Self {
        let alpha_min = 0.001_f32;
        Self {
            link_distance: 450.0,
            link_strength: None,
            charge_strength: -5000.0,
            theta: 0.9,
            charge_distance_min: 1.0,
            centering: 1.0,
            collision_padding: 100.0,
            collision_strength: 1.0,
            search_strength: 1.0,
            velocity_decay: 0.4,
            alpha_min,
            // Reaches alpha_min from 1.0 in 300 steps
            alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
            drag_alpha_target: 0.3,
            search_alpha: 1.0,
            search_cleared_alpha: 0.3,
            spatial_index: SpatialIndexKind::Quadtree,
            initial_spread: 300.0,
            seed: 0x5eed,
        }
    }
}

/// Simulated state of one node
#[derive(Debug, Clone)]
pub struct NodeBody {
    pub id: String,
    pub pos: Pos2,
    pub vel: Vec2,
    /// Fixed position overriding the simulation (set while dragged)
    pub pin: Option<Pos2>,
    pub width: f32,
    pub height: f32,
}

/// The running layout. Other components only see positions and the
/// narrow control surface (`perturb`, `pin`, `unpin`, focus, alpha target).
pub struct Simulation {
    layout: ForceLayout,
    bodies: Vec<NodeBody>,
    index_by_id: HashMap<String, usize>,
    links: Vec<Link>,
    alpha: f32,
    alpha_target: f32,
    center: Pos2,
    /// Ids pulled toward the center while a search is active
    focus: Option<HashSet<String>>,
    focus_flags: Vec<bool>,
    spatial: Box<dyn SpatialIndex>,
    rng: StdRng,
    positions: Vec<Pos2>,
    scratch: Vec<usize>,
}

impl Simulation {
    pub fn new(layout: ForceLayout, center: Pos2) -> Self {
        let spatial = make_index(layout.spatial_index, &layout);
        let rng = StdRng::seed_from_u64(layout.seed);
        Self {
            layout,
            bodies: Vec::new(),
            index_by_id: HashMap::new(),
            links: Vec::new(),
            alpha: 1.0,
            alpha_target: 0.0,
            center,
            focus: None,
            focus_flags: Vec::new(),
            spatial,
            rng,
            positions: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn layout(&self) -> &ForceLayout {
        &self.layout
    }

    /// Replace the physics parameters and wake the simulation.
    pub fn set_layout(&mut self, layout: ForceLayout) {
        if layout.spatial_index != self.layout.spatial_index {
            self.spatial = make_index(layout.spatial_index, &layout);
        }
        self.layout = layout;
        self.rebuild_links_from_current();
        self.perturb(1.0);
    }

    /// Load a freshly built node/edge set.
    ///
    /// Nodes whose id survives keep their position, velocity and pin; new nodes
    /// are scattered around the center. Alpha restarts at 1.
    pub fn load(&mut self, data: &GraphData) {
        let mut previous: HashMap<String, NodeBody> = self
            .bodies
            .drain(..)
            .map(|b| (b.id.clone(), b))
            .collect();

        let spread = self.layout.initial_spread.max(1.0);
        let mut carried = 0usize;
        for node in &data.nodes {
            let body = match previous.remove(&node.id) {
                Some(mut body) => {
                    carried += 1;
                    body.width = node.width;
                    body.height = node.height;
                    body
                }
                None => {
                    let offset = Vec2::new(
                        self.rng.gen_range(-spread..spread),
                        self.rng.gen_range(-spread..spread),
                    );
                    NodeBody {
                        id: node.id.clone(),
                        pos: self.center + offset,
                        vel: Vec2::ZERO,
                        pin: None,
                        width: node.width,
                        height: node.height,
                    }
                }
            };
            self.bodies.push(body);
        }

        self.index_by_id = self
            .bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id.clone(), i))
            .collect();

        let pairs: Vec<(usize, usize)> = data
            .edges
            .iter()
            .filter_map(|e| {
                let source = self.index_by_id.get(&e.source)?;
                let target = self.index_by_id.get(&e.target)?;
                Some((*source, *target))
            })
            .collect();
        debug_assert_eq!(pairs.len(), data.edges.len(), "edge endpoint missing from node set");
        self.links = forces::prepare_links(&pairs, self.bodies.len(), self.layout.link_strength);

        self.refresh_focus_flags();
        self.alpha = 1.0;

        tracing::debug!(
            "Simulation loaded {} nodes ({} carried over), {} links",
            self.bodies.len(),
            carried,
            self.links.len()
        );
    }

    fn rebuild_links_from_current(&mut self) {
        let pairs: Vec<(usize, usize)> = self.links.iter().map(|l| (l.source, l.target)).collect();
        self.links = forces::prepare_links(&pairs, self.bodies.len(), self.layout.link_strength);
    }

    pub fn center(&self) -> Pos2 {
        self.center
    }

    pub fn set_center(&mut self, center: Pos2) {
        self.center = center;
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn alpha_target(&self) -> f32 {
        self.alpha_target
    }

    pub fn set_alpha_target(&mut self, target: f32) {
        self.alpha_target = target.clamp(0.0, 1.0);
    }

    /// Boost alpha so the layout starts moving again.
    pub fn perturb(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    /// No more steps until perturbed or given a positive alpha target
    pub fn is_idle(&self) -> bool {
        self.bodies.is_empty()
            || (self.alpha < self.layout.alpha_min && self.alpha_target < self.layout.alpha_min)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Fix a node at `pos` until [`Simulation::unpin`].
    pub fn pin(&mut self, id: &str, pos: Pos2) -> bool {
        match self.index_by_id.get(id) {
            Some(&i) => {
                self.bodies[i].pin = Some(pos);
                true
            }
            None => false,
        }
    }

    pub fn unpin(&mut self, id: &str) {
        if let Some(&i) = self.index_by_id.get(id) {
            self.bodies[i].pin = None;
        }
    }

    pub fn pinned(&self, id: &str) -> Option<Pos2> {
        self.index_by_id.get(id).and_then(|&i| self.bodies[i].pin)
    }

    pub fn position(&self, id: &str) -> Option<Pos2> {
        self.index_by_id.get(id).map(|&i| self.bodies[i].pos)
    }

    /// Current position of every node
    pub fn current_positions(&self) -> impl Iterator<Item = (&str, Pos2)> + '_ {
        self.bodies.iter().map(|b| (b.id.as_str(), b.pos))
    }

    /// Update a node's collision box (after its label was measured).
    pub fn set_node_size(&mut self, id: &str, width: f32, height: f32) {
        if let Some(&i) = self.index_by_id.get(id) {
            self.bodies[i].width = width;
            self.bodies[i].height = height;
        }
    }

    /// Pull these ids toward the center, or stop pulling with `None`.
    pub fn set_search_focus(&mut self, focus: Option<HashSet<String>>) {
        self.focus = focus;
        self.refresh_focus_flags();
    }

    pub fn has_search_focus(&self) -> bool {
        self.focus.is_some()
    }

    fn refresh_focus_flags(&mut self) {
        self.focus_flags = match &self.focus {
            Some(ids) => self.bodies.iter().map(|b| ids.contains(&b.id)).collect(),
            None => Vec::new(),
        };
    }

    /// Run one iteration. Returns false when idle and nothing moved.
    pub fn step(&mut self) -> bool {
        if self.is_idle() {
            return false;
        }

        self.alpha += (self.alpha_target - self.alpha) * self.layout.alpha_decay;
        let alpha = self.alpha;
        let layout = &self.layout;
        let rng = &mut self.rng;
        let mut jiggle = || (rng.gen::<f32>() - 0.5) * 1e-6;

        forces::apply_links(&mut self.bodies, &self.links, layout.link_distance, alpha, &mut jiggle);

        self.positions.clear();
        self.positions.extend(self.bodies.iter().map(|b| b.pos));
        forces::apply_charge(
            &mut self.bodies,
            &self.positions,
            ChargeParams {
                strength: layout.charge_strength,
                theta: layout.theta,
                distance_min: layout.charge_distance_min,
                alpha,
            },
            &mut jiggle,
        );

        forces::apply_centering(&mut self.bodies, self.center, layout.centering);

        self.positions.clear();
        self.positions.extend(self.bodies.iter().map(|b| b.pos));
        forces::apply_rect_collision(
            self.spatial.as_mut(),
            &mut self.bodies,
            &self.positions,
            CollisionParams {
                padding: layout.collision_padding,
                strength: layout.collision_strength,
                alpha,
            },
            &mut self.scratch,
        );

        if self.focus.is_some() {
            forces::apply_search_pull(
                &mut self.bodies,
                &self.focus_flags,
                self.center,
                layout.search_strength,
                alpha,
            );
        }

        let keep = 1.0 - layout.velocity_decay;
        for body in &mut self.bodies {
            match body.pin {
                Some(pin) => {
                    body.pos = pin;
                    body.vel = Vec2::ZERO;
                }
                None => {
                    body.vel *= keep;
                    body.pos += body.vel;
                }
            }
            if !body.pos.x.is_finite() || !body.pos.y.is_finite() {
                body.pos = self.center;
                body.vel = Vec2::ZERO;
            }
        }

        if self.alpha < layout.alpha_min {
            tracing::debug!("Simulation settled ({} nodes)", self.bodies.len());
        }
        true
    }
}

fn make_index(kind: SpatialIndexKind, layout: &ForceLayout) -> Box<dyn SpatialIndex> {
    match kind {
        SpatialIndexKind::Quadtree => Box::new(Quadtree::build(&[])),
        SpatialIndexKind::Grid => Box::new(GridIndex::new(layout.collision_padding * 2.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::build;
    use crate::graph::types::Entity;

    fn sample_graph() -> GraphData {
        let entities: Vec<Entity> = (0..12)
            .map(|i| {
                let mut e = Entity::new(format!("p{}", i), format!("Person {}", i));
                e.company = ["Acme", "Globex", "Initech"][i % 3].to_string();
                e
            })
            .collect();
        build(&entities, &[], "company", &HashMap::new())
    }

    #[test]
    fn alpha_decays_monotonically_to_idle() {
        let mut sim = Simulation::new(ForceLayout::default(), Pos2::new(400.0, 300.0));
        sim.load(&sample_graph());

        let mut previous = sim.alpha();
        let mut steps = 0;
        while sim.step() {
            assert!(sim.alpha() < previous);
            previous = sim.alpha();
            steps += 1;
            assert!(steps <= 400, "did not settle");
        }
        assert!(sim.is_idle());
        assert!(steps >= 250);
        assert!(!sim.step());
    }

    #[test]
    fn empty_simulation_stays_idle() {
        let mut sim = Simulation::new(ForceLayout::default(), Pos2::ZERO);
        sim.load(&GraphData::default());
        assert!(sim.is_idle());
        assert!(!sim.step());
    }

    #[test]
    fn same_seed_gives_same_layout() {
        let run = || {
            let mut sim = Simulation::new(ForceLayout::default(), Pos2::new(400.0, 300.0));
            sim.load(&sample_graph());
            for _ in 0..50 {
                sim.step();
            }
            sim.current_positions()
                .map(|(id, p)| (id.to_string(), p))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn reload_carries_positions_over() {
        let mut sim = Simulation::new(ForceLayout::default(), Pos2::new(400.0, 300.0));
        let data = sample_graph();
        sim.load(&data);
        for _ in 0..20 {
            sim.step();
        }
        let before = sim.position("p3").unwrap();
        sim.perturb(0.0);
        sim.load(&data);
        assert_eq!(sim.position("p3"), Some(before));
        assert_eq!(sim.alpha(), 1.0);
    }

    #[test]
    fn pinned_node_stays_put() {
        let mut sim = Simulation::new(ForceLayout::default(), Pos2::new(400.0, 300.0));
        sim.load(&sample_graph());
        let pin = Pos2::new(-50.0, 75.0);
        assert!(sim.pin("p1", pin));
        for _ in 0..10 {
            sim.step();
        }
        assert_eq!(sim.position("p1"), Some(pin));
        sim.unpin("p1");
        assert_eq!(sim.pinned("p1"), None);
        assert!(!sim.pin("missing", pin));
    }

    #[test]
    fn alpha_target_keeps_simulation_awake() {
        let mut layout = ForceLayout::default();
        layout.spatial_index = SpatialIndexKind::Grid;
        let mut sim = Simulation::new(layout, Pos2::ZERO);
        sim.load(&sample_graph());
        sim.set_alpha_target(0.3);
        for _ in 0..1000 {
            assert!(sim.step());
        }
        assert!((sim.alpha() - 0.3).abs() < 0.01);
        sim.set_alpha_target(0.0);
        let mut steps = 0;
        while sim.step() {
            steps += 1;
        }
        assert!(steps > 0 && steps < 400);
    }

    #[test]
    fn search_focus_pulls_matches_to_center() {
        let center = Pos2::new(400.0, 300.0);
        let mut sim = Simulation::new(ForceLayout::default(), center);
        sim.load(&sample_graph());
        for _ in 0..100 {
            sim.step();
        }
        let distance = |sim: &Simulation| (sim.position("p0").unwrap() - center).length();
        let before = distance(&sim);

        sim.set_search_focus(Some(["p0".to_string()].into()));
        sim.perturb(1.0);
        for _ in 0..100 {
            sim.step();
        }
        assert!(sim.has_search_focus());
        assert!(distance(&sim) < before);
    }
}
