//! Pan/zoom transform between simulation space and the graph panel.
//!
//! Screen coordinates here are relative to the panel's top-left corner;
//! the host adds the panel origin when painting.

use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 4.0;

/// Scale range for fitting a single search cluster
const CLUSTER_MIN_SCALE: f32 = 0.5;
const CLUSTER_MAX_SCALE: f32 = 2.0;

/// Extent used for a bounding box with no width or height
const DEGENERATE_EXTENT: f32 = 100.0;

/// Uniform scale followed by a translation: `screen = world * scale + (x, y)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f32,
    pub x: f32,
    pub y: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        scale: 1.0,
        x: 0.0,
        y: 0.0,
    };

    pub fn translation(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn apply(&self, world: Pos2) -> Pos2 {
        Pos2::new(world.x * self.scale + self.x, world.y * self.scale + self.y)
    }

    pub fn invert(&self, screen: Pos2) -> Pos2 {
        Pos2::new((screen.x - self.x) / self.scale, (screen.y - self.y) / self.scale)
    }

    fn is_finite(&self) -> bool {
        self.scale.is_finite() && self.scale > 0.0 && self.x.is_finite() && self.y.is_finite()
    }

    fn lerp(&self, to: &Transform, t: f32) -> Transform {
        Transform {
            scale: self.scale + (to.scale - self.scale) * t,
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }

    /// Transform whose scale is `scale` (clamped), keeping `anchor` fixed on screen.
    fn zoomed_at(&self, scale: f32, anchor: Pos2) -> Transform {
        let scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        let world = self.invert(anchor);
        Transform {
            scale,
            x: anchor.x - world.x * scale,
            y: anchor.y - world.y * scale,
        }
    }
}

/// How a fit chooses its scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitMode {
    /// Padded box fills the viewport, any allowed scale
    Content { padding: f32 },
    /// Box fills `fill` of the viewport, scale kept in the cluster range
    Cluster { fill: f32 },
}

/// Transform that centers `positions` in a `viewport`-sized panel.
///
/// Non-finite positions are ignored; with nothing left, or a degenerate
/// viewport, the identity is returned.
pub fn fit_transform(
    positions: impl IntoIterator<Item = Pos2>,
    viewport: Vec2,
    mode: FitMode,
) -> Transform {
    let mut bounds = Rect::NOTHING;
    for p in positions {
        if p.x.is_finite() && p.y.is_finite() {
            bounds.extend_with(p);
        }
    }
    // Still NOTHING when no finite position was seen
    if !bounds.min.x.is_finite() || viewport.x <= 0.0 || viewport.y <= 0.0 {
        return Transform::IDENTITY;
    }

    let extent = |v: f32| if v > 0.0 { v } else { DEGENERATE_EXTENT };
    let scale = match mode {
        FitMode::Content { padding } => {
            let dx = extent(bounds.width() + padding * 2.0);
            let dy = extent(bounds.height() + padding * 2.0);
            (viewport.x / dx).min(viewport.y / dy).clamp(MIN_SCALE, MAX_SCALE)
        }
        FitMode::Cluster { fill } => {
            let dx = extent(bounds.width());
            let dy = extent(bounds.height());
            (fill / (dx / viewport.x).max(dy / viewport.y)).clamp(CLUSTER_MIN_SCALE, CLUSTER_MAX_SCALE)
        }
    };

    let center = bounds.center();
    let transform = Transform {
        scale,
        x: viewport.x / 2.0 - center.x * scale,
        y: viewport.y / 2.0 - center.y * scale,
    };
    if transform.is_finite() {
        transform
    } else {
        Transform::IDENTITY
    }
}

/// Viewport animation and fit tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Length of animated transitions
    pub transition_ms: u64,
    /// World-space padding around fit-to-content
    pub content_padding: f32,
    /// Share of the panel a fitted cluster occupies
    pub cluster_fill: f32,
    pub zoom_in_factor: f32,
    pub zoom_out_factor: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            transition_ms: 750,
            content_padding: 50.0,
            cluster_fill: 0.8,
            zoom_in_factor: 1.2,
            zoom_out_factor: 0.8,
        }
    }
}

impl ViewportConfig {
    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }

    pub fn content_fit(&self) -> FitMode {
        FitMode::Content {
            padding: self.content_padding,
        }
    }

    pub fn cluster_fit(&self) -> FitMode {
        FitMode::Cluster {
            fill: self.cluster_fill,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: Transform,
    to: Transform,
    start: Instant,
    duration: Duration,
}

/// Current transform plus at most one running transition
#[derive(Debug, Clone)]
pub struct Viewport {
    pub config: ViewportConfig,
    transform: Transform,
    transition: Option<Transition>,
    size: Vec2,
}

impl Viewport {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            transform: Transform::IDENTITY,
            transition: None,
            size: Vec2::ZERO,
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn set_size(&mut self, size: Vec2) {
        self.size = size;
    }

    /// Panel center in screen coordinates
    pub fn screen_center(&self) -> Pos2 {
        (self.size / 2.0).to_pos2()
    }

    pub fn is_animating(&self) -> bool {
        self.transition.is_some()
    }

    /// Jump straight to `target`, cancelling any transition.
    pub fn set_transform(&mut self, target: Transform) {
        if target.is_finite() {
            self.transform = target;
        }
        self.transition = None;
    }

    /// Animate toward `target`. A newer request replaces a running one.
    pub fn animate_to(&mut self, target: Transform, now: Instant) {
        if !target.is_finite() {
            tracing::warn!("Ignoring non-finite viewport target {:?}", target);
            return;
        }
        let duration = self.config.transition();
        if duration.is_zero() {
            self.set_transform(target);
            return;
        }
        self.transition = Some(Transition {
            from: self.transform,
            to: target,
            start: now,
            duration,
        });
    }

    /// Animate to the fit of `positions`.
    pub fn fit(&mut self, positions: impl IntoIterator<Item = Pos2>, mode: FitMode, now: Instant) {
        let target = fit_transform(positions, self.size, mode);
        self.animate_to(target, now);
    }

    /// Advance the running transition. Returns true while still animating.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(transition) = self.transition else {
            return false;
        };
        let elapsed = now.saturating_duration_since(transition.start);
        let t = (elapsed.as_secs_f32() / transition.duration.as_secs_f32()).min(1.0);
        self.transform = transition.from.lerp(&transition.to, ease_cubic_in_out(t));
        if t >= 1.0 {
            self.transform = transition.to;
            self.transition = None;
            return false;
        }
        true
    }

    /// Pan by a screen-space delta. Manual gestures cancel transitions.
    pub fn pan_by(&mut self, delta: Vec2) {
        self.transition = None;
        self.transform.x += delta.x;
        self.transform.y += delta.y;
    }

    /// Zoom by `factor` keeping the screen point `anchor` fixed.
    pub fn zoom_at(&mut self, factor: f32, anchor: Pos2) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.transition = None;
        self.transform = self.transform.zoomed_at(self.transform.scale * factor, anchor);
    }

    /// Animated zoom by `factor` around the panel center (zoom buttons).
    pub fn zoom_by(&mut self, factor: f32, now: Instant) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let base = self.transition.map(|t| t.to).unwrap_or(self.transform);
        let target = base.zoomed_at(base.scale * factor, self.screen_center());
        self.animate_to(target, now);
    }

    pub fn to_screen(&self, world: Pos2) -> Pos2 {
        self.transform.apply(world)
    }

    pub fn to_world(&self, screen: Pos2) -> Pos2 {
        self.transform.invert(screen)
    }
}

fn ease_cubic_in_out(t: f32) -> f32 {
    let t = t * 2.0;
    if t <= 1.0 {
        t * t * t / 2.0
    } else {
        let t = t - 2.0;
        (t * t * t + 2.0) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANEL: Vec2 = Vec2::new(800.0, 600.0);

    #[test]
    fn fit_of_nothing_is_identity() {
        let t = fit_transform(Vec::<Pos2>::new(), PANEL, FitMode::Content { padding: 50.0 });
        assert_eq!(t, Transform::IDENTITY);
    }

    #[test]
    fn fit_ignores_non_finite_positions() {
        let positions = [Pos2::new(f32::NAN, 0.0), Pos2::new(f32::INFINITY, 1.0)];
        assert_eq!(
            fit_transform(positions, PANEL, FitMode::Cluster { fill: 0.8 }),
            Transform::IDENTITY
        );

        let positions = [Pos2::new(f32::NAN, 0.0), Pos2::new(10.0, 20.0)];
        let t = fit_transform(positions, PANEL, FitMode::Content { padding: 50.0 });
        assert!(t.scale.is_finite());
        assert_eq!(t.apply(Pos2::new(10.0, 20.0)), Pos2::new(400.0, 300.0));
    }

    #[test]
    fn content_fit_centers_padded_box() {
        let positions = [Pos2::new(-100.0, -50.0), Pos2::new(100.0, 50.0)];
        let t = fit_transform(positions, PANEL, FitMode::Content { padding: 50.0 });
        // padded box is 300 x 200 -> min(800/300, 600/200) = 2.666..
        assert!((t.scale - 800.0 / 300.0).abs() < 1e-4);
        assert_eq!(t.apply(Pos2::ZERO), Pos2::new(400.0, 300.0));
    }

    #[test]
    fn content_fit_clamps_scale() {
        let huge = [Pos2::new(-1e6, 0.0), Pos2::new(1e6, 0.0)];
        let t = fit_transform(huge, PANEL, FitMode::Content { padding: 0.0 });
        assert_eq!(t.scale, MIN_SCALE);
    }

    #[test]
    fn cluster_fit_stays_in_cluster_range() {
        let single = [Pos2::new(5.0, 5.0)];
        let t = fit_transform(single, PANEL, FitMode::Cluster { fill: 0.8 });
        // zero extent becomes 100: 0.8 / max(100/800, 100/600) = 4.8 -> 2.0
        assert_eq!(t.scale, CLUSTER_MAX_SCALE);

        let wide = [Pos2::new(0.0, 0.0), Pos2::new(10_000.0, 0.0)];
        let t = fit_transform(wide, PANEL, FitMode::Cluster { fill: 0.8 });
        assert_eq!(t.scale, CLUSTER_MIN_SCALE);
    }

    #[test]
    fn transition_eases_to_target_and_last_request_wins() {
        let mut viewport = Viewport::new(ViewportConfig::default());
        viewport.set_size(PANEL);
        let start = Instant::now();

        let first = Transform { scale: 2.0, x: 10.0, y: 10.0 };
        let second = Transform { scale: 0.5, x: -10.0, y: 0.0 };
        viewport.animate_to(first, start);
        assert!(viewport.tick(start + Duration::from_millis(300)));
        viewport.animate_to(second, start + Duration::from_millis(300));

        assert!(viewport.tick(start + Duration::from_millis(700)));
        assert!(!viewport.tick(start + Duration::from_millis(1100)));
        assert_eq!(viewport.transform(), second);
        assert!(!viewport.is_animating());
    }

    #[test]
    fn zoom_at_keeps_anchor_fixed() {
        let mut viewport = Viewport::new(ViewportConfig::default());
        viewport.set_transform(Transform { scale: 1.0, x: 30.0, y: -20.0 });
        let anchor = Pos2::new(200.0, 150.0);
        let world = viewport.to_world(anchor);

        viewport.zoom_at(1.5, anchor);
        let back = viewport.to_screen(world);
        assert!((back - anchor).length() < 1e-3);

        viewport.zoom_at(1000.0, anchor);
        assert_eq!(viewport.transform().scale, MAX_SCALE);
        viewport.zoom_at(0.0, anchor);
        assert_eq!(viewport.transform().scale, MAX_SCALE);
    }

    #[test]
    fn pan_cancels_transition() {
        let mut viewport = Viewport::new(ViewportConfig::default());
        let now = Instant::now();
        viewport.animate_to(Transform { scale: 3.0, x: 0.0, y: 0.0 }, now);
        viewport.pan_by(Vec2::new(5.0, -5.0));
        assert!(!viewport.is_animating());
        assert_eq!(viewport.transform().translation(), Vec2::new(5.0, -5.0));
    }
}
