//! Barnes-Hut quadtree for O(n log n) charge calculation.
//!
//! Instead of calculating repulsion between all pairs of nodes O(n²),
//! we group distant nodes and treat them as a single center of mass.
//! The same tree doubles as a [`SpatialIndex`] for region queries.

use super::spatial::SpatialIndex;
use egui::{Pos2, Rect, Vec2};

/// Depth at which coincident bodies stop splitting and share a leaf
const MAX_DEPTH: u32 = 32;

/// A body stored in the tree: simulation index plus position
#[derive(Debug, Clone, Copy)]
pub struct Body {
    pub index: usize,
    pub pos: Pos2,
}

/// A node in the quadtree - either a leaf with bodies, or an internal node with children
#[derive(Debug, Default)]
pub enum QuadNode {
    #[default]
    Empty,
    /// Usually one body; several only when they coincide at max depth
    Leaf { bodies: Vec<Body> },
    Internal {
        /// Center of mass of all bodies in this cell
        center_of_mass: Pos2,
        /// Number of bodies in this cell
        count: u32,
        /// Children: NW, NE, SW, SE
        children: Box<[QuadNode; 4]>,
    },
}

impl QuadNode {
    fn count(&self) -> u32 {
        match self {
            QuadNode::Empty => 0,
            QuadNode::Leaf { bodies } => bodies.len() as u32,
            QuadNode::Internal { count, .. } => *count,
        }
    }
}

/// Square cell bounds
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub min: Pos2,
    pub max: Pos2,
}

impl Bounds {
    pub fn new(min: Pos2, max: Pos2) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Pos2 {
        Pos2::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    pub fn size(&self) -> f32 {
        (self.max.x - self.min.x).max(self.max.y - self.min.y)
    }

    pub fn contains(&self, pos: Pos2) -> bool {
        pos.x >= self.min.x && pos.x <= self.max.x && pos.y >= self.min.y && pos.y <= self.max.y
    }

    fn rect(&self) -> Rect {
        Rect::from_min_max(self.min, self.max)
    }

    /// Get the quadrant for a position (0=NW, 1=NE, 2=SW, 3=SE)
    pub fn quadrant(&self, pos: Pos2) -> usize {
        let center = self.center();
        let east = pos.x >= center.x;
        let south = pos.y >= center.y;
        match (south, east) {
            (false, false) => 0,
            (false, true) => 1,
            (true, false) => 2,
            (true, true) => 3,
        }
    }

    pub fn child_bounds(&self, quadrant: usize) -> Bounds {
        let center = self.center();
        match quadrant {
            0 => Bounds::new(self.min, center),
            1 => Bounds::new(Pos2::new(center.x, self.min.y), Pos2::new(self.max.x, center.y)),
            2 => Bounds::new(Pos2::new(self.min.x, center.y), Pos2::new(center.x, self.max.y)),
            _ => Bounds::new(center, self.max),
        }
    }

    /// Smallest square covering `points`, padded by `padding`
    fn covering(points: impl Iterator<Item = Pos2>, padding: f32) -> Option<Bounds> {
        let mut min = Pos2::new(f32::INFINITY, f32::INFINITY);
        let mut max = Pos2::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in points.filter(|p| p.x.is_finite() && p.y.is_finite()) {
            min = min.min(p);
            max = max.max(p);
        }
        if !min.x.is_finite() {
            return None;
        }
        min -= Vec2::splat(padding);
        let size = (max.x - min.x).max(max.y - min.y) + padding;
        Some(Bounds::new(min, min + Vec2::splat(size)))
    }
}

/// Parameters for one charge evaluation
#[derive(Debug, Clone, Copy)]
pub struct ChargeParams {
    /// Per-body strength, negative repels
    pub strength: f32,
    /// Barnes-Hut approximation threshold (cell size / distance)
    pub theta: f32,
    /// Distances below this are softened
    pub distance_min: f32,
    pub alpha: f32,
}

/// Barnes-Hut quadtree for efficient force calculation
pub struct Quadtree {
    pub root: QuadNode,
    pub bounds: Bounds,
}

impl Quadtree {
    /// Empty tree covering `bounds`
    pub fn with_bounds(bounds: Bounds) -> Self {
        Self {
            root: QuadNode::Empty,
            bounds,
        }
    }

    /// Build a quadtree over `positions`; body indices are slice indices.
    pub fn build(positions: &[Pos2]) -> Self {
        let bounds = Bounds::covering(positions.iter().copied(), 1.0)
            .unwrap_or(Bounds::new(Pos2::ZERO, Pos2::new(1.0, 1.0)));
        let mut tree = Self::with_bounds(bounds);
        for (index, &pos) in positions.iter().enumerate() {
            tree.insert_body(Body { index, pos });
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.root.count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_body(&mut self, body: Body) {
        if !body.pos.x.is_finite() || !body.pos.y.is_finite() {
            return;
        }
        if !self.bounds.contains(body.pos) {
            self.grow_to(body.pos);
        }
        self.root = Self::insert_into(std::mem::take(&mut self.root), body, self.bounds, 0);
    }

    /// Re-root the tree over larger bounds that include `pos`.
    fn grow_to(&mut self, pos: Pos2) {
        let mut bodies = Vec::new();
        Self::collect(&self.root, &mut bodies);
        let points = bodies.iter().map(|b| b.pos).chain(std::iter::once(pos));
        if let Some(bounds) = Bounds::covering(points, 1.0) {
            self.bounds = bounds;
        }
        self.root = QuadNode::Empty;
        for body in bodies {
            self.root = Self::insert_into(std::mem::take(&mut self.root), body, self.bounds, 0);
        }
    }

    fn collect(node: &QuadNode, out: &mut Vec<Body>) {
        match node {
            QuadNode::Empty => {}
            QuadNode::Leaf { bodies } => out.extend(bodies.iter().copied()),
            QuadNode::Internal { children, .. } => {
                for child in children.iter() {
                    Self::collect(child, out);
                }
            }
        }
    }

    fn insert_into(node: QuadNode, body: Body, bounds: Bounds, depth: u32) -> QuadNode {
        match node {
            QuadNode::Empty => QuadNode::Leaf { bodies: vec![body] },

            QuadNode::Leaf { mut bodies } => {
                let coincident = bodies.iter().all(|b| b.pos == body.pos);
                if depth >= MAX_DEPTH || coincident {
                    bodies.push(body);
                    return QuadNode::Leaf { bodies };
                }

                // Convert to internal node and insert everything again
                let mut internal = QuadNode::Internal {
                    center_of_mass: Pos2::ZERO,
                    count: 0,
                    children: Box::default(),
                };
                for existing in bodies.into_iter().chain(std::iter::once(body)) {
                    internal = Self::insert_into(internal, existing, bounds, depth);
                }
                internal
            }

            QuadNode::Internal {
                center_of_mass,
                count,
                mut children,
            } => {
                let q = bounds.quadrant(body.pos);
                children[q] = Self::insert_into(
                    std::mem::take(&mut children[q]),
                    body,
                    bounds.child_bounds(q),
                    depth + 1,
                );

                let new_count = count + 1;
                let new_com = Pos2::new(
                    (center_of_mass.x * count as f32 + body.pos.x) / new_count as f32,
                    (center_of_mass.y * count as f32 + body.pos.y) / new_count as f32,
                );

                QuadNode::Internal {
                    center_of_mass: new_com,
                    count: new_count,
                    children,
                }
            }
        }
    }

    /// Velocity change from the charge of every other body on body `index` at `pos`.
    ///
    /// `jiggle` supplies tiny random offsets for exactly coincident bodies.
    pub fn charge_on(
        &self,
        index: usize,
        pos: Pos2,
        params: ChargeParams,
        jiggle: &mut impl FnMut() -> f32,
    ) -> Vec2 {
        let theta2 = params.theta * params.theta;
        self.charge_recursive(&self.root, index, pos, params, theta2, self.bounds, jiggle)
    }

    #[allow(clippy::too_many_arguments)]
    fn charge_recursive(
        &self,
        node: &QuadNode,
        index: usize,
        pos: Pos2,
        params: ChargeParams,
        theta2: f32,
        bounds: Bounds,
        jiggle: &mut impl FnMut() -> f32,
    ) -> Vec2 {
        match node {
            QuadNode::Empty => Vec2::ZERO,

            QuadNode::Leaf { bodies } => {
                let mut force = Vec2::ZERO;
                for body in bodies.iter().filter(|b| b.index != index) {
                    force += point_charge(pos, body.pos, params.strength, params, jiggle);
                }
                force
            }

            QuadNode::Internal {
                center_of_mass,
                count,
                children,
            } => {
                let delta = *center_of_mass - pos;
                let distance_sq = delta.length_sq();
                let cell_size = bounds.size();

                // Barnes-Hut criterion: far enough cells act as one body
                if !bounds.contains(pos) && cell_size * cell_size / theta2 < distance_sq {
                    let value = params.strength * *count as f32;
                    return point_charge(pos, *center_of_mass, value, params, jiggle);
                }

                let mut force = Vec2::ZERO;
                for (i, child) in children.iter().enumerate() {
                    force += self.charge_recursive(
                        child,
                        index,
                        pos,
                        params,
                        theta2,
                        bounds.child_bounds(i),
                        jiggle,
                    );
                }
                force
            }
        }
    }

    fn query_recursive(node: &QuadNode, bounds: Bounds, region: Rect, out: &mut Vec<usize>) {
        if !bounds.rect().intersects(region) {
            return;
        }
        match node {
            QuadNode::Empty => {}
            QuadNode::Leaf { bodies } => {
                out.extend(
                    bodies
                        .iter()
                        .filter(|b| region.contains(b.pos))
                        .map(|b| b.index),
                );
            }
            QuadNode::Internal { children, .. } => {
                for (i, child) in children.iter().enumerate() {
                    Self::query_recursive(child, bounds.child_bounds(i), region, out);
                }
            }
        }
    }
}

/// Inverse-square style pull of `value` at `source` on a body at `pos`.
/// Negative values push the body away.
fn point_charge(
    pos: Pos2,
    source: Pos2,
    value: f32,
    params: ChargeParams,
    jiggle: &mut impl FnMut() -> f32,
) -> Vec2 {
    let mut delta = source - pos;
    if delta.x == 0.0 {
        delta.x = jiggle();
    }
    if delta.y == 0.0 {
        delta.y = jiggle();
    }
    let mut l = delta.length_sq();
    let min2 = params.distance_min * params.distance_min;
    if l < min2 {
        l = (min2 * l).sqrt();
    }
    delta * (value * params.alpha / l)
}

impl SpatialIndex for Quadtree {
    fn clear(&mut self) {
        self.root = QuadNode::Empty;
    }

    fn insert(&mut self, index: usize, pos: Pos2) {
        self.insert_body(Body { index, pos });
    }

    fn query_region(&self, region: Rect, out: &mut Vec<usize>) {
        Self::query_recursive(&self.root, self.bounds, region, out);
    }

    fn rebuild(&mut self, positions: &[Pos2]) {
        *self = Quadtree::build(positions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jiggle() -> impl FnMut() -> f32 {
        || 1e-6
    }

    fn params() -> ChargeParams {
        ChargeParams {
            strength: -1000.0,
            theta: 0.9,
            distance_min: 1.0,
            alpha: 1.0,
        }
    }

    #[test]
    fn test_quadtree_build() {
        let positions = vec![
            Pos2::new(0.0, 0.0),
            Pos2::new(100.0, 0.0),
            Pos2::new(0.0, 100.0),
            Pos2::new(100.0, 100.0),
        ];

        let tree = Quadtree::build(&positions);

        match &tree.root {
            QuadNode::Internal { count, .. } => assert_eq!(*count, 4),
            _ => panic!("Expected internal node"),
        }
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_force_calculation() {
        let positions = vec![Pos2::new(0.0, 0.0), Pos2::new(100.0, 0.0)];
        let tree = Quadtree::build(&positions);

        // Negative strength pushes the first body left, away from the second
        let force = tree.charge_on(0, positions[0], params(), &mut no_jiggle());
        assert!(force.x < 0.0, "Force should push left: {:?}", force);
        assert!(force.y.abs() < 1e-3);
    }

    #[test]
    fn test_far_cluster_is_approximated() {
        let mut positions: Vec<Pos2> = (0..20)
            .map(|i| Pos2::new(1000.0 + (i % 5) as f32, 1000.0 + (i / 5) as f32))
            .collect();
        positions.push(Pos2::new(0.0, 0.0));
        let tree = Quadtree::build(&positions);
        let last = positions.len() - 1;

        let approx = tree.charge_on(last, positions[last], params(), &mut no_jiggle());
        let mut exact = Vec2::ZERO;
        for &p in &positions[..last] {
            exact += point_charge(positions[last], p, -1000.0, params(), &mut no_jiggle());
        }
        assert!((approx - exact).length() / exact.length() < 0.05);
    }

    #[test]
    fn test_coincident_bodies_share_leaf() {
        let positions = vec![Pos2::new(5.0, 5.0); 3];
        let tree = Quadtree::build(&positions);
        assert_eq!(tree.len(), 3);
        let force = tree.charge_on(0, positions[0], params(), &mut no_jiggle());
        assert!(force.x.is_finite() && force.y.is_finite());
    }

    #[test]
    fn test_region_query_and_growth() {
        let mut tree = Quadtree::build(&[Pos2::new(0.0, 0.0), Pos2::new(10.0, 10.0)]);
        tree.insert(2, Pos2::new(500.0, -300.0));
        assert_eq!(tree.len(), 3);

        let mut hits = Vec::new();
        tree.query_region(
            Rect::from_min_max(Pos2::new(-1.0, -1.0), Pos2::new(11.0, 11.0)),
            &mut hits,
        );
        hits.sort();
        assert_eq!(hits, vec![0, 1]);
    }
}
