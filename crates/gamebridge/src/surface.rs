//! Drawing surface abstraction.
//!
//! The bridge treats the rendering backend as an opaque target that accepts
//! primitive commands. Hosts implement [`Surface`] for their actual backend
//! (a 2D canvas, a framebuffer, a GPU renderer); [`RecordingSurface`] is the
//! headless implementation used by the CLI runner and the test suite.

/// An RGBA color with 8-bit channels.
///
/// Alpha is carried as a 0-255 byte on the wire and normalized to 0-1 when a
/// backend applies it, see [`Color::alpha_unit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    /// Red channel, 0-255
    pub r: u8,
    /// Green channel, 0-255
    pub g: u8,
    /// Blue channel, 0-255
    pub b: u8,
    /// Alpha channel, 0-255
    pub a: u8,
}

impl Color {
    /// Create a color from 8-bit channels.
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Alpha normalized to the 0.0-1.0 range backends expect.
    pub fn alpha_unit(&self) -> f64 {
        f64::from(self.a) / 255.0
    }
}

/// Line join style for stroked paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    /// Sharp corner (code 0)
    #[default]
    Miter,
    /// Rounded corner (code 1)
    Round,
    /// Flattened corner (code 2)
    Bevel,
}

impl LineJoin {
    /// Map a wire code to a join style. Codes outside 0-2 have no mapping.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(LineJoin::Miter),
            1 => Some(LineJoin::Round),
            2 => Some(LineJoin::Bevel),
            _ => None,
        }
    }
}

/// A host-owned drawing target with a mutable logical size.
///
/// All operations are synchronous and side-effect only the surface. The two
/// dimension queries are the only operations that return a value.
pub trait Surface {
    /// Current logical width.
    fn width(&self) -> f64;

    /// Current logical height.
    fn height(&self) -> f64;

    /// Set the backing width/height. Called from the host resize path only.
    fn resize(&mut self, width: f64, height: f64);

    /// Erase the full surface.
    fn clear(&mut self);

    /// Stroke a line segment.
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64);

    /// Stroke an elliptical arc.
    #[allow(clippy::too_many_arguments)]
    fn ellipse(
        &mut self,
        x: f64,
        y: f64,
        radius_x: f64,
        radius_y: f64,
        rotation: f64,
        start_angle: f64,
        end_angle: f64,
        counterclockwise: bool,
    );

    /// Set the stroke color for subsequent stroke operations.
    fn set_stroke_color(&mut self, color: Color);

    /// Set the stroke width in pixels.
    fn set_stroke_thickness(&mut self, px: f64);

    /// Set the fill color for subsequent fill operations.
    fn set_fill_color(&mut self, color: Color);

    /// Fill a rectangle.
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64);

    /// Stroke a rectangle outline.
    fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64);

    /// Set the font from a pixel size and a family name.
    fn set_font(&mut self, pixel_size: f64, family: &str);

    /// Fill text at a position. `max_width` of `None` means unconstrained.
    fn fill_text(&mut self, text: &str, x: f64, y: f64, max_width: Option<f64>);

    /// Set the line join style.
    fn set_line_join(&mut self, join: LineJoin);
}

/// One recorded drawing command.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Full-surface erase
    Clear,
    /// Line segment stroke
    Line {
        /// Start x
        x1: f64,
        /// Start y
        y1: f64,
        /// End x
        x2: f64,
        /// End y
        y2: f64,
    },
    /// Elliptical arc stroke
    Ellipse {
        /// Center x
        x: f64,
        /// Center y
        y: f64,
        /// Horizontal radius
        radius_x: f64,
        /// Vertical radius
        radius_y: f64,
        /// Rotation in radians
        rotation: f64,
        /// Arc start angle in radians
        start_angle: f64,
        /// Arc end angle in radians
        end_angle: f64,
        /// Sweep direction flag
        counterclockwise: bool,
    },
    /// Stroke color change
    StrokeColor(Color),
    /// Stroke width change
    StrokeThickness(f64),
    /// Fill color change
    FillColor(Color),
    /// Filled rectangle
    FillRect {
        /// Left edge
        x: f64,
        /// Top edge
        y: f64,
        /// Width
        w: f64,
        /// Height
        h: f64,
    },
    /// Rectangle outline
    StrokeRect {
        /// Left edge
        x: f64,
        /// Top edge
        y: f64,
        /// Width
        w: f64,
        /// Height
        h: f64,
    },
    /// Font change
    Font {
        /// Font size in pixels
        pixel_size: f64,
        /// Font family name
        family: String,
    },
    /// Filled text
    FillText {
        /// Decoded text
        text: String,
        /// Baseline x
        x: f64,
        /// Baseline y
        y: f64,
        /// Width cap, `None` for unconstrained
        max_width: Option<f64>,
    },
    /// Line join change
    LineJoin(LineJoin),
}

/// A [`Surface`] that records every command it receives.
///
/// Used as a test double and as the headless backend for the CLI runner.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    width: f64,
    height: f64,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    /// Create a surface with the given logical size and an empty log.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    /// All commands recorded so far, in issue order.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Drop the recorded log, keeping the surface size.
    pub fn clear_log(&mut self) {
        self.commands.clear();
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        self.commands.push(DrawCommand::Line { x1, y1, x2, y2 });
    }

    fn ellipse(
        &mut self,
        x: f64,
        y: f64,
        radius_x: f64,
        radius_y: f64,
        rotation: f64,
        start_angle: f64,
        end_angle: f64,
        counterclockwise: bool,
    ) {
        self.commands.push(DrawCommand::Ellipse {
            x,
            y,
            radius_x,
            radius_y,
            rotation,
            start_angle,
            end_angle,
            counterclockwise,
        });
    }

    fn set_stroke_color(&mut self, color: Color) {
        self.commands.push(DrawCommand::StrokeColor(color));
    }

    fn set_stroke_thickness(&mut self, px: f64) {
        self.commands.push(DrawCommand::StrokeThickness(px));
    }

    fn set_fill_color(&mut self, color: Color) {
        self.commands.push(DrawCommand::FillColor(color));
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.commands.push(DrawCommand::FillRect { x, y, w, h });
    }

    fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.commands.push(DrawCommand::StrokeRect { x, y, w, h });
    }

    fn set_font(&mut self, pixel_size: f64, family: &str) {
        self.commands.push(DrawCommand::Font {
            pixel_size,
            family: family.to_string(),
        });
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, max_width: Option<f64>) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            max_width,
        });
    }

    fn set_line_join(&mut self, join: LineJoin) {
        self.commands.push(DrawCommand::LineJoin(join));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_join_codes() {
        assert_eq!(LineJoin::from_code(0), Some(LineJoin::Miter));
        assert_eq!(LineJoin::from_code(1), Some(LineJoin::Round));
        assert_eq!(LineJoin::from_code(2), Some(LineJoin::Bevel));
        assert_eq!(LineJoin::from_code(3), None);
        assert_eq!(LineJoin::from_code(-1), None);
    }

    #[test]
    fn test_alpha_normalization() {
        assert_eq!(Color::rgba(0, 0, 0, 255).alpha_unit(), 1.0);
        assert_eq!(Color::rgba(0, 0, 0, 0).alpha_unit(), 0.0);
        let half = Color::rgba(0, 0, 0, 51).alpha_unit();
        assert!((half - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_recording_surface_logs_in_order() {
        let mut surface = RecordingSurface::new(320.0, 200.0);
        surface.clear();
        surface.line(1.0, 2.0, 3.0, 4.0);
        surface.fill_text("hi", 5.0, 6.0, None);

        assert_eq!(
            surface.commands(),
            &[
                DrawCommand::Clear,
                DrawCommand::Line {
                    x1: 1.0,
                    y1: 2.0,
                    x2: 3.0,
                    y2: 4.0
                },
                DrawCommand::FillText {
                    text: "hi".to_string(),
                    x: 5.0,
                    y: 6.0,
                    max_width: None
                },
            ]
        );

        surface.clear_log();
        assert!(surface.commands().is_empty());
    }

    #[test]
    fn test_recording_surface_resize() {
        let mut surface = RecordingSurface::new(320.0, 200.0);
        surface.resize(640.0, 480.0);
        assert_eq!(surface.width(), 640.0);
        assert_eq!(surface.height(), 480.0);
    }
}
