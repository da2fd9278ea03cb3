//! Path accumulation in user space.
//!
//! A [`PathRecorder`] is the mutable drawing context the script talks to. Once
//! the script is done, the recorder is frozen into a [`PathSnapshot`] and its
//! [`Extents`] are taken for sizing the output page.

use cgmath::{Point2, Vector2};

pub type Point = Point2<f64>;

/// A single recorded path operation, in user coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    ClosePath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("no current point")]
    NoCurrentPoint,
}

/// Axis-aligned bounding box of a path. Always `x2 >= x1` and `y2 >= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extents {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Extents {
    fn from_point(p: Point) -> Extents {
        Extents {
            x1: p.x,
            y1: p.y,
            x2: p.x,
            y2: p.y,
        }
    }

    fn add_point(&mut self, p: Point) {
        self.x1 = self.x1.min(p.x);
        self.y1 = self.y1.min(p.y);
        self.x2 = self.x2.max(p.x);
        self.y2 = self.y2.max(p.y);
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

/// The mutable drawing context.
///
/// The current point follows the usual graphics-state rules: a `line_to`
/// without a current point acts as a `move_to`, and `close_path` moves the
/// current point back to the start of the subpath.
#[derive(Debug, Default)]
pub struct PathRecorder {
    commands: Vec<PathCommand>,
    current: Option<Point>,
    subpath_start: Option<Point>,
}

impl PathRecorder {
    pub fn new() -> PathRecorder {
        PathRecorder::default()
    }

    pub fn move_to(&mut self, p: Point) {
        self.commands.push(PathCommand::MoveTo(p));
        self.current = Some(p);
        self.subpath_start = Some(p);
    }

    pub fn line_to(&mut self, p: Point) {
        if self.current.is_none() {
            self.move_to(p);
            return;
        }
        self.commands.push(PathCommand::LineTo(p));
        self.current = Some(p);
    }

    pub fn rel_move_to(&mut self, d: Vector2<f64>) -> Result<(), PathError> {
        let current = self.current.ok_or(PathError::NoCurrentPoint)?;
        self.move_to(current + d);
        Ok(())
    }

    pub fn rel_line_to(&mut self, d: Vector2<f64>) -> Result<(), PathError> {
        let current = self.current.ok_or(PathError::NoCurrentPoint)?;
        self.line_to(current + d);
        Ok(())
    }

    pub fn close_path(&mut self) {
        let Some(start) = self.subpath_start else {
            return;
        };
        self.commands.push(PathCommand::ClosePath);
        self.current = Some(start);
    }

    pub fn snapshot(&self) -> PathSnapshot {
        PathSnapshot {
            commands: self.commands.clone(),
        }
    }

    pub fn extents(&self) -> Extents {
        extents_of(&self.commands)
    }
}

/// Immutable copy of a recorded path, replayed once into the output surface.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSnapshot {
    commands: Vec<PathCommand>,
}

impl PathSnapshot {
    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// A move only counts towards the extents once a segment starts from it.
fn extents_of(commands: &[PathCommand]) -> Extents {
    let mut extents: Option<Extents> = None;
    let mut pending_move: Option<Point> = None;
    let mut subpath_start: Option<Point> = None;

    fn add(extents: &mut Option<Extents>, p: Point) {
        match extents {
            Some(e) => e.add_point(p),
            None => *extents = Some(Extents::from_point(p)),
        }
    }

    for cmd in commands {
        match *cmd {
            PathCommand::MoveTo(p) => {
                pending_move = Some(p);
                subpath_start = Some(p);
            }
            PathCommand::LineTo(p) => {
                if let Some(m) = pending_move.take() {
                    add(&mut extents, m);
                }
                add(&mut extents, p);
            }
            PathCommand::ClosePath => {
                if let Some(m) = pending_move.take() {
                    add(&mut extents, m);
                }
                // The current point returns to the subpath start, which may
                // begin the next segment.
                pending_move = subpath_start;
            }
        }
    }
    extents.unwrap_or_default()
}
