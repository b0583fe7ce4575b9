//! Colors for the network panel and sidebar.

use egui::Color32;

/// Background colors for different layers
pub mod bg {
    use super::*;

    /// Graph panel background
    pub const GRAPH: Color32 = Color32::from_rgb(248, 250, 252);

    /// Sidebar background
    pub const PANEL: Color32 = Color32::from_rgb(20, 22, 28);

    /// Label pill fill
    pub const PILL: Color32 = Color32::WHITE;
}

/// Strokes and text on the graph panel
pub mod ink {
    use super::*;

    pub const LABEL: Color32 = Color32::from_rgb(30, 41, 59);
    pub const PILL_BORDER: Color32 = Color32::from_rgb(226, 232, 240);
    pub const LINK: Color32 = Color32::from_rgb(153, 153, 153);
    pub const NODE_BORDER: Color32 = Color32::WHITE;
    pub const SELECTED: Color32 = Color32::from_rgb(245, 158, 11);
}

/// Person nodes without an industry
pub const UNCLASSIFIED: Color32 = Color32::from_rgb(100, 116, 139);

/// Ten-color categorical palette
const CATEGORY: [Color32; 10] = [
    Color32::from_rgb(31, 119, 180),
    Color32::from_rgb(255, 127, 14),
    Color32::from_rgb(44, 160, 44),
    Color32::from_rgb(214, 39, 40),
    Color32::from_rgb(148, 103, 189),
    Color32::from_rgb(140, 86, 75),
    Color32::from_rgb(227, 119, 194),
    Color32::from_rgb(127, 127, 127),
    Color32::from_rgb(188, 189, 34),
    Color32::from_rgb(23, 190, 207),
];

/// Stable palette color for a category name (FNV-1a over the bytes)
pub fn category_color(key: &str) -> Color32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    CATEGORY[hash as usize % CATEGORY.len()]
}

/// Fade a color to `opacity` in [0, 1]
pub fn faded(color: Color32, opacity: f32) -> Color32 {
    color.gamma_multiply(opacity.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_colors_are_stable() {
        assert_eq!(category_color("Acme"), category_color("Acme"));
        assert!(CATEGORY.contains(&category_color("")));
    }

    #[test]
    fn faded_clamps_opacity() {
        assert_eq!(faded(Color32::WHITE, 2.0), Color32::WHITE);
        assert_eq!(faded(Color32::WHITE, -1.0), Color32::TRANSPARENT);
    }
}
