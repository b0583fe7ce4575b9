//! Main application state and UI rendering.

use eframe::egui::{self, Align2, Color32, FontId, Key, Pos2, Rect, Stroke, Vec2};
use people_graph::classify::{
    apply_classification, resolve_custom_dimension, HttpClassifier, PendingClassification,
};
use people_graph::graph::types::{Field, GraphNode, GraphState, NodeKind, TAG_DIMENSION};
use people_graph::graph::{NetworkView, PointerInput};
use people_graph::settings::Settings;
use people_graph::store::EntityStore;
use people_graph::theme;
use std::path::PathBuf;
use std::time::Instant;

/// Font sizes in world units
const PERSON_FONT: f32 = 12.0;
const GROUP_FONT: f32 = 13.0;

pub struct PeopleGraphApp {
    view: NetworkView,
    state: GraphState,

    // Data source
    data_path_input: String,
    store_error: Option<String>,

    // Classifier
    classifier: Option<HttpClassifier>,
    classifier_connected: bool,
    classifier_error: Option<String>,
    pending: Option<PendingClassification>,

    // Selection (person nodes only)
    selected: Option<String>,
    pointer_inside: bool,
    /// A text field held keyboard focus when the frame started
    text_focused: bool,

    // Settings persistence
    settings: Settings,
    settings_dirty: bool,
    last_settings_save: Instant,
}

impl PeopleGraphApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = Settings::load();

        let view = NetworkView::new(
            settings.physics.clone(),
            settings.viewport.clone(),
            settings.search.clone(),
            settings.interaction.clone(),
        );

        let (classifier, classifier_error) = match HttpClassifier::new(settings.classifier.clone()) {
            Ok(c) => (Some(c), None),
            Err(e) => {
                tracing::warn!("Classifier unavailable: {}", e);
                (None, Some(e))
            }
        };

        let mut app = Self {
            view,
            state: settings.graph_state.clone(),
            data_path_input: settings
                .data_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            store_error: None,
            classifier,
            classifier_connected: false,
            classifier_error,
            pending: None,
            selected: None,
            pointer_inside: false,
            text_focused: false,
            settings,
            settings_dirty: false,
            last_settings_save: Instant::now(),
        };

        app.check_classifier();
        if !app.data_path_input.is_empty() {
            app.load_entities();
        }
        app
    }

    fn check_classifier(&mut self) {
        let Some(classifier) = &self.classifier else {
            return;
        };
        match classifier.health() {
            Ok(healthy) => {
                self.classifier_connected = healthy;
                self.classifier_error = None;
            }
            Err(e) => {
                self.classifier_connected = false;
                self.classifier_error = Some(e);
            }
        }
    }

    fn load_entities(&mut self) {
        let path = PathBuf::from(self.data_path_input.trim());
        match EntityStore::load(&path) {
            Ok(store) => {
                self.view.set_entities(store.entities, store.tags);
                self.store_error = None;
                self.selected = None;
                self.settings.data_path = Some(path);
                self.mark_settings_dirty();
            }
            Err(e) => {
                tracing::warn!("{}", e);
                self.store_error = Some(e);
            }
        }
    }

    /// Mark settings as needing to be saved
    fn mark_settings_dirty(&mut self) {
        self.settings_dirty = true;
    }

    /// Copy current UI state to settings struct
    fn sync_settings_from_ui(&mut self) {
        self.settings.physics = self.view.simulation().layout().clone();
        self.settings.graph_state = self.state.clone();
    }

    /// Save settings if dirty and enough time has passed (debounce)
    fn maybe_save_settings(&mut self) {
        if self.settings_dirty && self.last_settings_save.elapsed().as_secs() >= 2 {
            self.sync_settings_from_ui();
            self.settings.save();
            self.settings_dirty = false;
            self.last_settings_save = Instant::now();
        }
    }

    fn apply_custom_dimension(&mut self) {
        let Some(classifier) = &self.classifier else {
            self.classifier_error = Some("No classifier configured".to_string());
            return;
        };
        let pending = resolve_custom_dimension(
            &mut self.state,
            self.view.entities(),
            self.view.tags(),
            classifier,
        );
        // A newer request replaces an older one
        if pending.is_some() || self.pending.is_some() {
            self.pending = pending;
        }
        self.mark_settings_dirty();
    }

    fn poll_classification(&mut self, ctx: &egui::Context) {
        let Some(pending) = &self.pending else {
            return;
        };
        match pending.poll() {
            Some(mapping) => {
                let dimension = pending.dimension().to_string();
                if mapping.is_empty() {
                    self.classifier_error = Some(format!("No labels returned for {:?}", dimension));
                }
                apply_classification(&mut self.state, &dimension, mapping);
                self.pending = None;
                self.mark_settings_dirty();
            }
            // Still running, check again next frame
            None => ctx.request_repaint(),
        }
    }

    fn render_sidebar(&mut self, ui: &mut egui::Ui) {
        let now = Instant::now();
        ui.heading("People Graph");
        ui.add_space(10.0);

        // Classifier status
        ui.horizontal(|ui| {
            if self.classifier_connected {
                ui.colored_label(Color32::GREEN, "● Classifier Connected");
            } else {
                ui.colored_label(Color32::RED, "● Classifier Offline");
                if ui.button("Retry").clicked() {
                    self.check_classifier();
                }
            }
        });
        if let Some(ref err) = self.classifier_error {
            ui.colored_label(Color32::RED, format!("Error: {}", err));
        }

        ui.add_space(10.0);

        egui::CollapsingHeader::new("Contacts")
            .default_open(true)
            .show(ui, |ui| {
                ui.label("Export file:");
                ui.text_edit_singleline(&mut self.data_path_input);
                if ui.button("Load").clicked() {
                    self.load_entities();
                }
                if let Some(ref err) = self.store_error {
                    ui.colored_label(Color32::RED, err);
                }
                ui.label(format!(
                    "{} people, {} groups",
                    self.view.entities().len(),
                    self.view.data().group_count()
                ));
            });

        egui::CollapsingHeader::new("Search")
            .default_open(true)
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    let response = ui.text_edit_singleline(&mut self.state.search_term);
                    if response.changed() {
                        self.mark_settings_dirty();
                    }
                    if !self.state.search_term.is_empty() && ui.small_button("✕").clicked() {
                        self.view.clear_search(&mut self.state);
                        self.mark_settings_dirty();
                    }
                });

                let navigator = self.view.navigator();
                if navigator.is_searching() {
                    let count = navigator.cluster_count();
                    ui.label(format!("{} matches", navigator.match_count()));
                    if count > 1 {
                        ui.horizontal(|ui| {
                            if ui.button("◀").clicked() {
                                self.view.prev_cluster(&mut self.state, now);
                            }
                            ui.label(format!("{} / {}", self.state.current_cluster_index + 1, count));
                            if ui.button("▶").clicked() {
                                self.view.next_cluster(&mut self.state, now);
                            }
                        });
                    }
                }
            });

        egui::CollapsingHeader::new("Group By")
            .default_open(true)
            .show(ui, |ui| {
                let builtin: Vec<&str> = Field::all()
                    .iter()
                    .map(|f| f.name())
                    .chain(std::iter::once(TAG_DIMENSION))
                    .collect();

                egui::ComboBox::from_id_salt("dimension")
                    .selected_text(self.state.dimension.clone())
                    .show_ui(ui, |ui| {
                        for name in builtin {
                            if ui
                                .selectable_label(self.state.dimension == name, name)
                                .clicked()
                            {
                                self.state.reset_dimension();
                                self.state.dimension = name.to_string();
                                self.pending = None;
                                self.mark_settings_dirty();
                            }
                        }
                    });

                ui.label("Custom dimension:");
                ui.horizontal(|ui| {
                    let response = ui.text_edit_singleline(&mut self.state.custom_dimension_input);
                    let submitted =
                        response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter));
                    if ui.button("Apply").clicked() || submitted {
                        self.apply_custom_dimension();
                    }
                });

                if let Some(pending) = &self.pending {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label(format!("Classifying by {}…", pending.dimension()));
                    });
                }

                if ui.button("Reset grouping").clicked() {
                    self.pending = None;
                    self.view.reset_dimension(&mut self.state, now);
                    self.mark_settings_dirty();
                }
            });

        egui::CollapsingHeader::new("View")
            .default_open(true)
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    if ui.button("＋").clicked() {
                        self.view.zoom_in(now);
                    }
                    if ui.button("－").clicked() {
                        self.view.zoom_out(now);
                    }
                    if ui.button("Fit").clicked() {
                        self.view.fit_content(now);
                    }
                });
            });

        egui::CollapsingHeader::new("Physics")
            .default_open(false)
            .show(ui, |ui| {
                let mut layout = self.view.simulation().layout().clone();
                let mut changed = false;
                changed |= ui
                    .add(egui::Slider::new(&mut layout.link_distance, 50.0..=1000.0).text("Link distance"))
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut layout.charge_strength, -20000.0..=0.0).text("Charge"))
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut layout.collision_padding, 0.0..=200.0).text("Collision padding"))
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut layout.velocity_decay, 0.05..=0.9).text("Velocity decay"))
                    .changed();
                if changed {
                    self.view.set_layout(layout);
                    self.mark_settings_dirty();
                }
            });

        if let Some(id) = self.selected.clone() {
            ui.separator();
            match self.view.data().get_node(&id) {
                Some(node) => render_person(ui, node),
                None => self.selected = None,
            }
        }
    }

    fn render_graph(&mut self, ui: &mut egui::Ui) {
        let now = Instant::now();
        let (response, painter) =
            ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        let rect = response.rect;
        let origin = rect.min.to_vec2();
        self.view.set_viewport_size(rect.size());

        // Gather all input first (allows simultaneous pan+zoom on trackpad)
        let (scroll_delta, zoom_delta, pressed, released, enter, shift) = ui.input(|i| {
            (
                i.smooth_scroll_delta,
                i.zoom_delta(),
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.key_pressed(Key::Enter),
                i.modifiers.shift,
            )
        });
        let hover_pos = response.hover_pos().map(|p| p - origin);

        // Node interaction in panel coordinates
        match hover_pos {
            Some(local) => {
                self.pointer_inside = true;
                if pressed {
                    self.view.handle_pointer(PointerInput::Pressed(local), now);
                }
                self.view.handle_pointer(PointerInput::Moved(local), now);
            }
            None if self.pointer_inside && !self.view.is_dragging() => {
                self.pointer_inside = false;
                self.view.handle_pointer(PointerInput::Left, now);
            }
            None => {}
        }
        if self.view.is_dragging() {
            // Keep following the pointer outside the panel
            if let Some(pos) = ui.input(|i| i.pointer.latest_pos()) {
                self.view.handle_pointer(PointerInput::Moved(pos - origin), now);
            }
        }
        if released {
            let local = ui.input(|i| i.pointer.latest_pos()).map(|p| p - origin);
            if let Some(local) = local.or(hover_pos) {
                if let Some(id) = self.view.handle_pointer(PointerInput::Released(local), now) {
                    self.selected = Some(id);
                }
            }
        }

        // Background drag pans
        if response.dragged_by(egui::PointerButton::Primary) && !self.view.is_dragging() {
            self.view.pan_by(response.drag_delta());
        }
        if scroll_delta != Vec2::ZERO && response.hovered() {
            self.view.pan_by(scroll_delta);
        }
        if let Some(anchor) = hover_pos {
            if zoom_delta != 1.0 {
                self.view.zoom_at(zoom_delta, anchor);
            }
        }

        match cluster_key_step(enter, shift, self.text_focused, self.state.is_searching()) {
            Some(ClusterStep::Next) => {
                self.view.next_cluster(&mut self.state, now);
            }
            Some(ClusterStep::Prev) => {
                self.view.prev_cluster(&mut self.state, now);
            }
            None => {}
        }

        if self.view.sync(&mut self.state, now) {
            ui.ctx().request_repaint();
        }

        self.measure_labels(&painter);

        let transform = self.view.viewport().transform();
        let to_screen = |world: Pos2| transform.apply(world) + origin;
        let navigator = self.view.navigator();
        let hover = self.view.hover();

        // Edges first (behind nodes)
        for edge in &self.view.data().edges {
            let (Some(a), Some(b)) = (self.view.position(&edge.source), self.view.position(&edge.target)) else {
                continue;
            };
            let opacity = navigator.link_opacity(&edge.source, &edge.target, hover);
            let stroke = Stroke::new(1.5 * transform.scale, theme::faded(theme::ink::LINK, opacity));
            painter.line_segment([to_screen(a), to_screen(b)], stroke);
        }

        for node in &self.view.data().nodes {
            let Some(world) = self.view.position(&node.id) else {
                continue;
            };
            let opacity = navigator.node_opacity(&node.id, hover);
            let selected = self.selected.as_deref() == Some(node.id.as_str());
            draw_node(&painter, node, world, transform.scale, opacity, selected, &to_screen);
        }

        if self.view.data().nodes.is_empty() {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "Load a contacts export to see the network",
                FontId::proportional(16.0),
                theme::ink::LABEL,
            );
        }
    }

    /// Report label widths of nodes not measured yet
    fn measure_labels(&mut self, painter: &egui::Painter) {
        let unmeasured: Vec<(String, f32)> = self
            .view
            .data()
            .nodes
            .iter()
            .filter(|n| n.label_width == 0.0)
            .map(|n| {
                let galley = painter.layout_no_wrap(n.label.clone(), font_for(n.kind, 1.0), theme::ink::LABEL);
                (n.id.clone(), galley.size().x)
            })
            .collect();
        for (id, width) in unmeasured {
            self.view.set_label_width(&id, width);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClusterStep {
    Next,
    Prev,
}

/// Enter / Shift+Enter cycles clusters while searching, unless the key went to a text field
fn cluster_key_step(
    enter: bool,
    shift: bool,
    text_focused: bool,
    searching: bool,
) -> Option<ClusterStep> {
    if !enter || text_focused || !searching {
        return None;
    }
    Some(if shift { ClusterStep::Prev } else { ClusterStep::Next })
}

fn font_for(kind: NodeKind, scale: f32) -> FontId {
    let size = match kind {
        NodeKind::Person => PERSON_FONT,
        NodeKind::Group => GROUP_FONT,
    };
    FontId::proportional(size * scale)
}

fn node_color(node: &GraphNode) -> Color32 {
    match node.kind {
        NodeKind::Group => theme::category_color(&node.label),
        NodeKind::Person if node.industry.is_empty() => theme::UNCLASSIFIED,
        NodeKind::Person => theme::category_color(&node.industry),
    }
}

fn draw_node(
    painter: &egui::Painter,
    node: &GraphNode,
    world: Pos2,
    scale: f32,
    opacity: f32,
    selected: bool,
    to_screen: &impl Fn(Pos2) -> Pos2,
) {
    // Label pill
    let pill = node.pill_rect(world);
    let pill = Rect::from_min_max(to_screen(pill.min), to_screen(pill.max));
    painter.rect(
        pill,
        12.0 * scale,
        theme::faded(theme::bg::PILL, opacity),
        Stroke::new(1.0, theme::faded(theme::ink::PILL_BORDER, opacity)),
    );
    let text_pos = to_screen(world + Vec2::new(node.kind.text_offset(), 0.0));
    painter.text(
        text_pos,
        Align2::LEFT_CENTER,
        &node.label,
        font_for(node.kind, scale),
        theme::faded(theme::ink::LABEL, opacity),
    );

    // Marker circle
    let center = to_screen(world);
    let border = if selected {
        Stroke::new(3.0 * scale, theme::faded(theme::ink::SELECTED, opacity))
    } else {
        Stroke::new(2.5 * scale, theme::faded(theme::ink::NODE_BORDER, opacity))
    };
    painter.circle(
        center,
        node.kind.radius() * scale,
        theme::faded(node_color(node), opacity),
        border,
    );

    if node.kind == NodeKind::Group {
        let initial: String = node.label.chars().take(1).flat_map(char::to_uppercase).collect();
        painter.text(
            center,
            Align2::CENTER_CENTER,
            initial,
            FontId::proportional(12.0 * scale),
            theme::faded(Color32::WHITE, opacity),
        );
    }
}

fn render_person(ui: &mut egui::Ui, node: &GraphNode) {
    ui.heading(&node.label);
    egui::Grid::new("person_details").num_columns(2).show(ui, |ui| {
        for (label, value) in [
            ("Company", &node.company),
            ("Role", &node.role),
            ("Industry", &node.industry),
            ("Location", &node.location),
        ] {
            if !value.is_empty() {
                ui.label(label);
                ui.label(value);
                ui.end_row();
            }
        }
    });
    if !node.tags.is_empty() {
        ui.label(format!("Tags: {}", node.tags.join(", ")));
    }
}

impl eframe::App for PeopleGraphApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Sampled before the sidebar runs, since Enter drops a text field's focus
        self.text_focused = ctx.memory(|m| m.focused().is_some());
        self.poll_classification(ctx);
        self.maybe_save_settings();

        egui::SidePanel::left("sidebar")
            .min_width(240.0)
            .frame(egui::Frame::side_top_panel(&ctx.style()).fill(theme::bg::PANEL))
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.render_sidebar(ui);
                });
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(theme::bg::GRAPH))
            .show(ctx, |ui| {
                self.render_graph(ui);
            });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Always persist view state on exit
        self.sync_settings_from_ui();
        self.settings.save();
    }
}
