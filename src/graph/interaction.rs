//! Pointer interaction state machine: idle, hovering a node, or dragging one.
//!
//! Transitions happen only on discrete pointer events; the caller applies the
//! returned effects to the simulation and selection.

use egui::{Pos2, Vec2};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Click-versus-drag thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    /// A press held longer than this while moving counts as a drag
    pub drag_delay_ms: u64,
    /// Minimum world-space travel for a drag
    pub drag_min_distance: f32,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            drag_delay_ms: 100,
            drag_min_distance: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub id: String,
    /// Node position minus pointer position at press time
    pub grab_offset: Vec2,
    pub pressed_at: Instant,
    pub press_pos: Pos2,
    /// Set once the press qualifies as a drag; suppresses the click
    pub moved: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum InteractionState {
    #[default]
    Idle,
    Hovering(String),
    Dragging(DragState),
}

/// Pointer input in world coordinates, with the node under the pointer
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Moved { pos: Pos2, hit: Option<String> },
    /// `node_pos` is the current position of `hit`
    Pressed { pos: Pos2, hit: Option<String>, node_pos: Option<Pos2> },
    Released { pos: Pos2, hit: Option<String> },
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    HoverChanged(Option<String>),
    DragStarted { id: String, pin: Pos2 },
    DragMoved { id: String, pin: Pos2 },
    DragEnded { id: String },
    Clicked(String),
}

#[derive(Debug, Clone, Default)]
pub struct Interaction {
    pub config: ClickConfig,
    state: InteractionState,
}

impl Interaction {
    pub fn new(config: ClickConfig) -> Self {
        Self {
            config,
            state: InteractionState::Idle,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    /// Node under the pointer or being dragged
    pub fn hovered(&self) -> Option<&str> {
        match &self.state {
            InteractionState::Idle => None,
            InteractionState::Hovering(id) => Some(id),
            InteractionState::Dragging(drag) => Some(&drag.id),
        }
    }

    pub fn dragging(&self) -> Option<&str> {
        match &self.state {
            InteractionState::Dragging(drag) => Some(&drag.id),
            _ => None,
        }
    }

    /// Forget everything, e.g. after the node set was rebuilt.
    pub fn reset(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let InteractionState::Dragging(drag) = &self.state {
            effects.push(Effect::DragEnded { id: drag.id.clone() });
        }
        if self.hovered().is_some() {
            effects.push(Effect::HoverChanged(None));
        }
        self.state = InteractionState::Idle;
        effects
    }

    pub fn handle(&mut self, event: PointerEvent, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        let state = std::mem::take(&mut self.state);

        self.state = match (state, event) {
            (InteractionState::Dragging(mut drag), PointerEvent::Moved { pos, .. }) => {
                let held = now.saturating_duration_since(drag.pressed_at);
                let travel = (pos - drag.press_pos).length();
                if held > Duration::from_millis(self.config.drag_delay_ms)
                    && travel >= self.config.drag_min_distance
                {
                    drag.moved = true;
                }
                effects.push(Effect::DragMoved {
                    id: drag.id.clone(),
                    pin: pos + drag.grab_offset,
                });
                InteractionState::Dragging(drag)
            }

            (InteractionState::Dragging(drag), PointerEvent::Released { hit, .. }) => {
                effects.push(Effect::DragEnded { id: drag.id.clone() });
                if !drag.moved {
                    effects.push(Effect::Clicked(drag.id.clone()));
                }
                match hit {
                    Some(id) if id != drag.id => {
                        effects.push(Effect::HoverChanged(Some(id.clone())));
                        InteractionState::Hovering(id)
                    }
                    Some(id) => InteractionState::Hovering(id),
                    None => {
                        effects.push(Effect::HoverChanged(None));
                        InteractionState::Idle
                    }
                }
            }

            // Leaving the panel mid-drag does not end the drag
            (state @ InteractionState::Dragging(_), _) => state,

            (
                previous,
                PointerEvent::Pressed {
                    pos,
                    hit: Some(id),
                    node_pos,
                },
            ) => {
                let node_pos = node_pos.unwrap_or(pos);
                if previous != InteractionState::Hovering(id.clone()) {
                    effects.push(Effect::HoverChanged(Some(id.clone())));
                }
                effects.push(Effect::DragStarted {
                    id: id.clone(),
                    pin: node_pos,
                });
                InteractionState::Dragging(DragState {
                    id,
                    grab_offset: node_pos - pos,
                    pressed_at: now,
                    press_pos: pos,
                    moved: false,
                })
            }

            (previous, PointerEvent::Moved { hit, .. })
            | (previous, PointerEvent::Pressed { hit, .. })
            | (previous, PointerEvent::Released { hit, .. }) => hover(previous, hit, &mut effects),

            (previous, PointerEvent::Left) => hover(previous, None, &mut effects),
        };

        effects
    }
}

fn hover(previous: InteractionState, hit: Option<String>, effects: &mut Vec<Effect>) -> InteractionState {
    let next = match hit {
        Some(id) => InteractionState::Hovering(id),
        None => InteractionState::Idle,
    };
    if next != previous {
        effects.push(Effect::HoverChanged(match &next {
            InteractionState::Hovering(id) => Some(id.clone()),
            _ => None,
        }));
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(x: f32, y: f32, id: &str, node: Pos2) -> PointerEvent {
        PointerEvent::Pressed {
            pos: Pos2::new(x, y),
            hit: Some(id.to_string()),
            node_pos: Some(node),
        }
    }

    fn moved(x: f32, y: f32, hit: Option<&str>) -> PointerEvent {
        PointerEvent::Moved {
            pos: Pos2::new(x, y),
            hit: hit.map(str::to_string),
        }
    }

    fn released(hit: Option<&str>) -> PointerEvent {
        PointerEvent::Released {
            pos: Pos2::ZERO,
            hit: hit.map(str::to_string),
        }
    }

    #[test]
    fn hover_enters_and_leaves() {
        let mut ui = Interaction::default();
        let now = Instant::now();
        assert_eq!(
            ui.handle(moved(0.0, 0.0, Some("a")), now),
            vec![Effect::HoverChanged(Some("a".into()))]
        );
        assert!(ui.handle(moved(1.0, 0.0, Some("a")), now).is_empty());
        assert_eq!(ui.handle(PointerEvent::Left, now), vec![Effect::HoverChanged(None)]);
        assert_eq!(ui.state(), &InteractionState::Idle);
    }

    #[test]
    fn quick_press_release_is_a_click() {
        let mut ui = Interaction::default();
        let now = Instant::now();
        ui.handle(moved(0.0, 0.0, Some("a")), now);
        let effects = ui.handle(press(0.0, 0.0, "a", Pos2::new(2.0, 3.0)), now);
        assert_eq!(
            effects,
            vec![Effect::DragStarted {
                id: "a".into(),
                pin: Pos2::new(2.0, 3.0)
            }]
        );
        ui.handle(moved(5.0, 0.0, Some("a")), now + Duration::from_millis(50));
        let effects = ui.handle(released(Some("a")), now + Duration::from_millis(60));
        assert_eq!(
            effects,
            vec![Effect::DragEnded { id: "a".into() }, Effect::Clicked("a".into())]
        );
        assert_eq!(ui.hovered(), Some("a"));
    }

    #[test]
    fn slow_move_is_a_drag_not_a_click() {
        let mut ui = Interaction::default();
        let now = Instant::now();
        ui.handle(press(10.0, 10.0, "a", Pos2::new(12.0, 10.0)), now);

        let effects = ui.handle(moved(50.0, 40.0, None), now + Duration::from_millis(150));
        // grab offset (2, 0) is kept while dragging
        assert_eq!(
            effects,
            vec![Effect::DragMoved {
                id: "a".into(),
                pin: Pos2::new(52.0, 40.0)
            }]
        );
        assert_eq!(ui.dragging(), Some("a"));

        let effects = ui.handle(released(None), now + Duration::from_millis(200));
        assert_eq!(
            effects,
            vec![Effect::DragEnded { id: "a".into() }, Effect::HoverChanged(None)]
        );
        assert_eq!(ui.dragging(), None);
    }

    #[test]
    fn drag_survives_leaving_panel() {
        let mut ui = Interaction::default();
        let now = Instant::now();
        ui.handle(press(0.0, 0.0, "a", Pos2::ZERO), now);
        assert!(ui.handle(PointerEvent::Left, now).is_empty());
        assert_eq!(ui.dragging(), Some("a"));
        assert_eq!(ui.reset(), vec![Effect::DragEnded { id: "a".into() }, Effect::HoverChanged(None)]);
    }

    #[test]
    fn press_on_background_does_nothing() {
        let mut ui = Interaction::default();
        let effects = ui.handle(
            PointerEvent::Pressed {
                pos: Pos2::ZERO,
                hit: None,
                node_pos: None,
            },
            Instant::now(),
        );
        assert!(effects.is_empty());
        assert_eq!(ui.state(), &InteractionState::Idle);
    }
}
