/// Fixed rendering parameters shared by the measurement and render passes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Total padding added to each page dimension, split evenly per side.
    pub margin: f64,
    /// Line width used when the path is stroked, in points.
    pub stroke_width: f64,
    pub title: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            margin: 10.0,
            stroke_width: 2.0,
            title: String::from("Path Export"),
        }
    }
}

impl RenderConfig {
    pub fn half_margin(&self) -> f64 {
        self.margin / 2.0
    }
}
