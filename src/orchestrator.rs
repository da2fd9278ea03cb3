//! The measure-then-render protocol.
//!
//! ```text
//! INIT -> SCRIPT_LOADED -> SCRIPT_VALIDATED -> MEASURED -> RENDERED -> DONE
//! ```
//!
//! Each stage is its own type and each transition consumes the previous one,
//! so a measurement context can never leak into the render pass. Any error
//! ends the run for that file; whatever the failed stage owned is dropped on
//! the way out.

use std::fmt;
use std::path::{Path, PathBuf};

use cgmath::Point2;

use crate::config::RenderConfig;
use crate::error::{DrawError, DrawResult};
use crate::path::{Extents, PathRecorder, PathSnapshot, Point};
use crate::pdf_export::PdfSurface;
use crate::script::{ScriptEnvironment, ScriptOutputs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    ScriptLoaded,
    ScriptValidated,
    Measured,
    Rendered,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "INIT",
            Stage::ScriptLoaded => "SCRIPT_LOADED",
            Stage::ScriptValidated => "SCRIPT_VALIDATED",
            Stage::Measured => "MEASURED",
            Stage::Rendered => "RENDERED",
            Stage::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// What gets painted once the path is on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintMode {
    Fill,
    Stroke,
    Nothing,
}

impl PaintMode {
    /// `fill` wins whenever it is set, whatever `stroke` says.
    pub fn from_flags(fill: bool, stroke: bool) -> PaintMode {
        if fill {
            PaintMode::Fill
        } else if stroke {
            PaintMode::Stroke
        } else {
            PaintMode::Nothing
        }
    }
}

/// Summary of one successfully drawn script.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawReport {
    pub output_path: PathBuf,
    pub page_size: (f64, f64),
    pub extents: Extents,
    /// Where the extents' minimum corner lands on the page.
    pub origin: Point,
    pub paint: PaintMode,
    pub commands: usize,
}

pub struct Orchestrator {
    config: RenderConfig,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Orchestrator::new(RenderConfig::default())
    }
}

impl Orchestrator {
    pub fn new(config: RenderConfig) -> Orchestrator {
        Orchestrator { config }
    }

    /// Run the whole protocol for the script at `script`.
    pub fn draw_file(&self, script: &Path) -> DrawResult<DrawReport> {
        let trace = |from: Stage, to: Stage| {
            log::debug!("{}: {from} -> {to}", script.display());
        };

        let loaded = ScriptLoaded::load(script)?;
        trace(Stage::Init, Stage::ScriptLoaded);
        let validated = loaded.validate()?;
        trace(Stage::ScriptLoaded, Stage::ScriptValidated);
        let measured = validated.measure()?;
        trace(Stage::ScriptValidated, Stage::Measured);
        let rendered = measured.render(&self.config);
        trace(Stage::Measured, Stage::Rendered);
        let report = rendered.finish(&self.config)?;
        trace(Stage::Rendered, Stage::Done);
        Ok(report)
    }
}

struct ScriptLoaded {
    env: ScriptEnvironment,
}

impl ScriptLoaded {
    fn load(script: &Path) -> DrawResult<ScriptLoaded> {
        let env = ScriptEnvironment::load(script)?;
        Ok(ScriptLoaded { env })
    }

    fn validate(self) -> DrawResult<ScriptValidated> {
        let outputs = self.env.outputs()?;
        Ok(ScriptValidated {
            env: self.env,
            outputs,
        })
    }
}

struct ScriptValidated {
    env: ScriptEnvironment,
    outputs: ScriptOutputs,
}

impl ScriptValidated {
    fn measure(mut self) -> DrawResult<Measured> {
        let slot = self.env.slot().clone();
        let binding = slot.bind(PathRecorder::new())?;
        self.env.invoke(&self.outputs.draw_path)?;
        let recorder = binding.release()?;

        let snapshot = recorder.snapshot();
        let extents = recorder.extents();
        // Each coordinate fits a PDF real, but their spread may not.
        if extents.width() > f32::MAX as f64 || extents.height() > f32::MAX as f64 {
            return Err(DrawError::ScriptExec(format!(
                "path extents {} x {} exceed the PDF coordinate range",
                extents.width(),
                extents.height()
            )));
        }
        if snapshot.is_empty() {
            log::warn!("drawPath recorded no path commands");
        }
        log::debug!(
            "measured {} path commands, extents ({}, {})-({}, {})",
            snapshot.len(),
            extents.x1,
            extents.y1,
            extents.x2,
            extents.y2
        );
        Ok(Measured {
            outputs: self.outputs,
            snapshot,
            extents,
        })
    }
}

struct Measured {
    outputs: ScriptOutputs,
    snapshot: PathSnapshot,
    extents: Extents,
}

impl Measured {
    fn render(self, config: &RenderConfig) -> Rendered {
        let Measured {
            outputs,
            snapshot,
            extents,
        } = self;

        let width = extents.width() + config.margin;
        let height = extents.height() + config.margin;
        let mut surface = PdfSurface::create(&outputs.output_path, width, height, config);

        let half = config.half_margin();
        surface.translate(-extents.x1 + half, -extents.y1 + half);
        surface.append_path(&snapshot);

        Rendered {
            surface,
            paint: PaintMode::from_flags(outputs.fill, outputs.stroke),
            output_path: outputs.output_path,
            extents,
            origin: Point2::new(half, half),
            commands: snapshot.len(),
        }
    }
}

struct Rendered {
    surface: PdfSurface,
    paint: PaintMode,
    output_path: PathBuf,
    extents: Extents,
    origin: Point,
    commands: usize,
}

impl Rendered {
    fn finish(mut self, config: &RenderConfig) -> DrawResult<DrawReport> {
        match self.paint {
            PaintMode::Fill => self.surface.fill(),
            PaintMode::Stroke => self.surface.stroke(config.stroke_width),
            PaintMode::Nothing => {}
        }
        let page_size = self.surface.size();
        self.surface.finish().map_err(|e| DrawError::Io {
            path: self.output_path.clone(),
            message: format!("{e:#}"),
        })?;
        Ok(DrawReport {
            output_path: self.output_path,
            page_size,
            extents: self.extents,
            origin: self.origin,
            paint: self.paint,
            commands: self.commands,
        })
    }
}
