//! Individual forces applied by the layout simulation.
//!
//! Every force adds to body velocities; only centering moves positions directly.

use super::layout::NodeBody;
use super::quadtree::{ChargeParams, Quadtree};
use super::spatial::SpatialIndex;
use egui::{Pos2, Rect, Vec2};

/// A spring between two bodies, with its per-link strength and bias precomputed
#[derive(Debug, Clone, Copy)]
pub(super) struct Link {
    pub(super) source: usize,
    pub(super) target: usize,
    pub(super) strength: f32,
    /// Share of the correction taken by the target
    pub(super) bias: f32,
}

/// Resolve index pairs into springs.
///
/// Without an explicit strength, each link gets `1 / min(degree)` so hubs
/// are not torn apart by their many springs.
pub(super) fn prepare_links(
    pairs: &[(usize, usize)],
    node_count: usize,
    strength: Option<f32>,
) -> Vec<Link> {
    let mut degree = vec![0u32; node_count];
    for &(s, t) in pairs {
        degree[s] += 1;
        degree[t] += 1;
    }
    pairs
        .iter()
        .map(|&(source, target)| {
            let (ds, dt) = (degree[source] as f32, degree[target] as f32);
            Link {
                source,
                target,
                strength: strength.unwrap_or(1.0 / ds.min(dt).max(1.0)),
                bias: ds / (ds + dt),
            }
        })
        .collect()
}

/// Hooke's-law pull toward `distance` along every link, using predicted positions.
pub(super) fn apply_links(
    bodies: &mut [NodeBody],
    links: &[Link],
    distance: f32,
    alpha: f32,
    jiggle: &mut impl FnMut() -> f32,
) {
    for link in links {
        let source = &bodies[link.source];
        let target = &bodies[link.target];
        let mut delta = (target.pos + target.vel) - (source.pos + source.vel);
        if delta.x == 0.0 {
            delta.x = jiggle();
        }
        if delta.y == 0.0 {
            delta.y = jiggle();
        }
        let length = delta.length();
        let correction = delta * ((length - distance) / length * alpha * link.strength);

        bodies[link.target].vel -= correction * link.bias;
        bodies[link.source].vel += correction * (1.0 - link.bias);
    }
}

/// Pairwise repulsion through a Barnes-Hut tree built from current positions.
pub(super) fn apply_charge(
    bodies: &mut [NodeBody],
    positions: &[Pos2],
    params: ChargeParams,
    jiggle: &mut impl FnMut() -> f32,
) {
    if bodies.len() < 2 {
        return;
    }
    let tree = Quadtree::build(positions);
    for (index, body) in bodies.iter_mut().enumerate() {
        body.vel += tree.charge_on(index, positions[index], params, jiggle);
    }
}

/// Shift every body so the centroid moves toward `center`.
pub(super) fn apply_centering(bodies: &mut [NodeBody], center: Pos2, strength: f32) {
    if bodies.is_empty() || strength <= 0.0 {
        return;
    }
    let mut sum = Vec2::ZERO;
    for body in bodies.iter() {
        sum += body.pos.to_vec2();
    }
    let centroid = sum / bodies.len() as f32;
    let shift = (centroid - center.to_vec2()) * strength;
    for body in bodies.iter_mut() {
        body.pos -= shift;
    }
}

/// Collision tuning
#[derive(Debug, Clone, Copy)]
pub(super) struct CollisionParams {
    pub(super) padding: f32,
    pub(super) strength: f32,
    pub(super) alpha: f32,
}

/// Push apart bodies whose padded boxes overlap, along the axis of least overlap.
pub(super) fn apply_rect_collision(
    index: &mut dyn SpatialIndex,
    bodies: &mut [NodeBody],
    positions: &[Pos2],
    params: CollisionParams,
    scratch: &mut Vec<usize>,
) {
    if bodies.len() < 2 {
        return;
    }
    index.rebuild(positions);

    let max_w = bodies.iter().map(|b| b.width).fold(0.0_f32, f32::max);
    let max_h = bodies.iter().map(|b| b.height).fold(0.0_f32, f32::max);

    for i in 0..bodies.len() {
        let (pi, wi, hi) = (positions[i], bodies[i].width, bodies[i].height);
        let reach = Vec2::new(wi + max_w + 2.0 * params.padding, hi + max_h + 2.0 * params.padding);

        scratch.clear();
        index.query_region(Rect::from_center_size(pi, reach), scratch);

        for &j in scratch.iter() {
            if j <= i {
                continue;
            }
            let delta = pi - positions[j];
            let (abs_x, abs_y) = (delta.x.abs(), delta.y.abs());
            let w = (wi + bodies[j].width) / 2.0 + params.padding;
            let h = (hi + bodies[j].height) / 2.0 + params.padding;
            if abs_x >= w || abs_y >= h {
                continue;
            }

            let (ox, oy) = (w - abs_x, h - abs_y);
            let overlap = if ox < oy {
                let sx = if delta.x > 0.0 { 1.0 } else { -1.0 };
                Vec2::new(sx * ox, 0.0)
            } else {
                let sy = if delta.y > 0.0 { 1.0 } else { -1.0 };
                Vec2::new(0.0, sy * oy)
            };
            let push = overlap * (params.strength * params.alpha);

            bodies[i].vel += push;
            bodies[j].vel -= push;
        }
    }
}

/// Pull matching bodies toward `center`; the rest are left alone.
pub(super) fn apply_search_pull(
    bodies: &mut [NodeBody],
    matches: &[bool],
    center: Pos2,
    strength: f32,
    alpha: f32,
) {
    for (body, &is_match) in bodies.iter_mut().zip(matches) {
        if is_match {
            body.vel += (center - body.pos) * (strength * alpha);
        }
    }
}
