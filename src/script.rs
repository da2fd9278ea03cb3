//! Rhai host for path scripts.
//!
//! A script sees five drawing functions:
//! - `moveTo(x, y)`, `lineTo(x, y)`
//! - `relMoveTo(dx, dy)`, `relLineTo(dx, dy)`
//! - `close()`
//!
//! and must leave `outputPath`, `stroke`, `fill` and a `drawPath` callable
//! behind once its top level has run. The drawing functions act on whatever
//! [`PathRecorder`] is bound to the environment's [`ContextSlot`], which is
//! only the case while `drawPath` runs.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use cgmath::{Point2, Vector2};
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Position, Scope, AST};

use crate::error::{DrawError, DrawResult};
use crate::path::{PathError, PathRecorder};

/// The environment-scoped home of the current drawing context.
///
/// Every bridge closure holds a clone of the same slot, so the bound recorder
/// is reachable from the script without passing it around.
#[derive(Clone, Default)]
pub struct ContextSlot(Rc<RefCell<Option<PathRecorder>>>);

impl ContextSlot {
    pub fn is_bound(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Bind `recorder` as the current context until the guard is released or
    /// dropped.
    pub fn bind(&self, recorder: PathRecorder) -> DrawResult<ContextBinding<'_>> {
        let mut slot = self.0.borrow_mut();
        if slot.is_some() {
            return Err(DrawError::StackConsistency(
                "a drawing context is already bound",
            ));
        }
        *slot = Some(recorder);
        Ok(ContextBinding { slot: self })
    }

    fn with_recorder<R>(
        &self,
        f: impl FnOnce(&mut PathRecorder) -> Result<R, PathError>,
    ) -> Result<R, Box<EvalAltResult>> {
        let mut guard = self.0.borrow_mut();
        let recorder = guard
            .as_mut()
            .ok_or_else(|| runtime_error("no drawing context is active".to_string()))?;
        f(recorder).map_err(|e| runtime_error(e.to_string()))
    }
}

/// Keeps a recorder bound to its slot. Dropping the guard empties the slot,
/// so a failing `drawPath` never leaves a context behind.
pub struct ContextBinding<'a> {
    slot: &'a ContextSlot,
}

impl ContextBinding<'_> {
    /// Unbind and hand back the recorder.
    pub fn release(self) -> DrawResult<PathRecorder> {
        let recorder = self.slot.0.borrow_mut().take();
        recorder.ok_or(DrawError::StackConsistency(
            "drawing context disappeared during drawPath",
        ))
    }
}

impl Drop for ContextBinding<'_> {
    fn drop(&mut self) {
        // Already taken by `release` on the success path.
        let _ = self.slot.0.borrow_mut().take();
    }
}

fn runtime_error(msg: String) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(msg.into(), Position::NONE))
}

// PDF reals are single precision; anything outside that range cannot be
// written to the page.
fn coord(fn_name: &str, v: &Dynamic) -> Result<f64, Box<EvalAltResult>> {
    let value = if let Ok(f) = v.as_float() {
        f
    } else if let Ok(i) = v.as_int() {
        i as f64
    } else {
        return Err(runtime_error(format!(
            "{fn_name}: expected a number, got {}",
            v.type_name()
        )));
    };
    if !value.is_finite() || value.abs() > f32::MAX as f64 {
        return Err(runtime_error(format!(
            "{fn_name}: coordinate {value} is out of range"
        )));
    }
    Ok(value)
}

fn register_bridge(engine: &mut Engine, slot: &ContextSlot) {
    let s = slot.clone();
    engine.register_fn(
        "moveTo",
        move |x: Dynamic, y: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let p = Point2::new(coord("moveTo", &x)?, coord("moveTo", &y)?);
            s.with_recorder(|r| {
                r.move_to(p);
                Ok(())
            })
        },
    );

    let s = slot.clone();
    engine.register_fn(
        "lineTo",
        move |x: Dynamic, y: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let p = Point2::new(coord("lineTo", &x)?, coord("lineTo", &y)?);
            s.with_recorder(|r| {
                r.line_to(p);
                Ok(())
            })
        },
    );

    let s = slot.clone();
    engine.register_fn(
        "relMoveTo",
        move |dx: Dynamic, dy: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let d = Vector2::new(coord("relMoveTo", &dx)?, coord("relMoveTo", &dy)?);
            s.with_recorder(|r| r.rel_move_to(d))
        },
    );

    let s = slot.clone();
    engine.register_fn(
        "relLineTo",
        move |dx: Dynamic, dy: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let d = Vector2::new(coord("relLineTo", &dx)?, coord("relLineTo", &dy)?);
            s.with_recorder(|r| r.rel_line_to(d))
        },
    );

    let s = slot.clone();
    engine.register_fn("close", move || -> Result<(), Box<EvalAltResult>> {
        s.with_recorder(|r| {
            r.close_path();
            Ok(())
        })
    });
}

fn create_engine(slot: &ContextSlot) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(10_000_000);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);

    engine.on_print(|msg| log::info!("script: {msg}"));
    engine.on_debug(|msg, src, pos| {
        log::debug!("script {} {pos}: {msg}", src.unwrap_or("<main>"))
    });

    register_bridge(&mut engine, slot);
    engine
}

/// How the script supplied `drawPath`.
#[derive(Debug, Clone)]
pub enum DrawPath {
    /// `fn drawPath() { ... }` at the top level.
    ScriptFn,
    /// `let drawPath = || { ... };` or `Fn("name")`.
    Pointer(FnPtr),
}

/// The values a script must have defined once its top level has run.
#[derive(Debug, Clone)]
pub struct ScriptOutputs {
    pub output_path: PathBuf,
    pub stroke: bool,
    pub fill: bool,
    pub draw_path: DrawPath,
}

/// One script's isolated execution state.
pub struct ScriptEnvironment {
    engine: Engine,
    scope: Scope<'static>,
    ast: AST,
    slot: ContextSlot,
}

impl ScriptEnvironment {
    /// Compile and run the top level of the script at `path`.
    pub fn load(path: &Path) -> DrawResult<ScriptEnvironment> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| DrawError::ScriptCollect(format!("{}: {e}", path.display())))?;
        let mut env = ScriptEnvironment::compile(&source)?;
        env.ast.set_source(path.to_string_lossy().into_owned());
        env.run_top_level()?;
        Ok(env)
    }

    fn compile(source: &str) -> DrawResult<ScriptEnvironment> {
        let slot = ContextSlot::default();
        let engine = create_engine(&slot);
        let ast = engine
            .compile(source)
            .map_err(|e| DrawError::ScriptCollect(e.to_string()))?;
        Ok(ScriptEnvironment {
            engine,
            scope: Scope::new(),
            ast,
            slot,
        })
    }

    fn run_top_level(&mut self) -> DrawResult<()> {
        self.engine
            .run_ast_with_scope(&mut self.scope, &self.ast)
            .map_err(|e| DrawError::ScriptCollect(e.to_string()))?;
        if self.slot.is_bound() {
            return Err(DrawError::StackConsistency(
                "drawing context bound after script load",
            ));
        }
        Ok(())
    }

    pub fn slot(&self) -> &ContextSlot {
        &self.slot
    }

    fn global(&self, name: &str) -> Option<Dynamic> {
        self.scope.get(name).map(Dynamic::flatten_clone)
    }

    /// Read and type-check the script's outputs.
    pub fn outputs(&self) -> DrawResult<ScriptOutputs> {
        let output_path = self
            .global("outputPath")
            .and_then(|v| v.into_string().ok())
            .filter(|s| !s.is_empty())
            .ok_or(DrawError::MissingParameter("outputPath must be a non-empty string"))?;

        let stroke = self
            .global("stroke")
            .and_then(|v| v.as_bool().ok())
            .ok_or(DrawError::MissingParameter("stroke must be a boolean"))?;

        let fill = self
            .global("fill")
            .and_then(|v| v.as_bool().ok())
            .ok_or(DrawError::MissingParameter("fill must be a boolean"))?;

        let draw_path = self
            .draw_path()
            .ok_or(DrawError::MissingParameter("drawPath must be a function"))?;

        Ok(ScriptOutputs {
            output_path: PathBuf::from(output_path),
            stroke,
            fill,
            draw_path,
        })
    }

    fn draw_path(&self) -> Option<DrawPath> {
        if let Some(value) = self.global("drawPath") {
            // A variable shadows any function of the same name.
            return value.try_cast::<FnPtr>().map(DrawPath::Pointer);
        }
        self.ast
            .iter_functions()
            .any(|f| f.name == "drawPath" && f.params.is_empty())
            .then_some(DrawPath::ScriptFn)
    }

    /// Run `drawPath` against whatever context is currently bound.
    pub fn invoke(&mut self, draw_path: &DrawPath) -> DrawResult<()> {
        let result = match draw_path {
            DrawPath::ScriptFn => self
                .engine
                .call_fn_with_options::<Dynamic>(
                    CallFnOptions::new().eval_ast(false).rewind_scope(true),
                    &mut self.scope,
                    &self.ast,
                    "drawPath",
                    (),
                )
                .map(|_| ()),
            DrawPath::Pointer(fn_ptr) => fn_ptr
                .call::<Dynamic>(&self.engine, &self.ast, ())
                .map(|_| ()),
        };
        result.map_err(|e| DrawError::ScriptExec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(source: &str) -> ScriptEnvironment {
        let mut env = ScriptEnvironment::compile(source).expect("compile");
        env.run_top_level().expect("run");
        env
    }

    fn record(source: &str) -> DrawResult<PathRecorder> {
        let mut env = env(source);
        let outputs = env.outputs()?;
        let slot = env.slot().clone();
        let binding = slot.bind(PathRecorder::new())?;
        env.invoke(&outputs.draw_path)?;
        binding.release()
    }

    const HEADER: &str = r#"
        let outputPath = "out.pdf";
        let stroke = true;
        let fill = false;
    "#;

    #[test]
    fn reads_outputs() {
        let env = env(&format!("{HEADER} fn drawPath() {{ moveTo(0, 0); }}"));
        let outputs = env.outputs().unwrap();
        assert_eq!(outputs.output_path, PathBuf::from("out.pdf"));
        assert!(outputs.stroke);
        assert!(!outputs.fill);
        assert!(matches!(outputs.draw_path, DrawPath::ScriptFn));
    }

    #[test]
    fn closure_draw_path() {
        let rec = record(&format!(
            "{HEADER} let drawPath = || {{ moveTo(1, 2); lineTo(3.5, 4); }};"
        ))
        .unwrap();
        let e = rec.extents();
        assert_eq!((e.x1, e.y1, e.x2, e.y2), (1.0, 2.0, 3.5, 4.0));
    }

    #[test]
    fn function_pointer_draw_path() {
        let rec = record(&format!(
            "{HEADER} fn square() {{ moveTo(0, 0); relLineTo(4, 0); relLineTo(0, 4); close(); }}
             let drawPath = Fn(\"square\");"
        ))
        .unwrap();
        assert_eq!(rec.snapshot().len(), 4);
    }

    #[test]
    fn wrong_types_are_missing_parameters() {
        let cases = [
            (r#"let stroke = true; let fill = true; fn drawPath() {}"#, "outputPath"),
            (r#"let outputPath = ""; let stroke = true; let fill = true; fn drawPath() {}"#, "outputPath"),
            (r#"let outputPath = "a.pdf"; let stroke = 1; let fill = true; fn drawPath() {}"#, "stroke"),
            (r#"let outputPath = "a.pdf"; let stroke = true; let fill = "yes"; fn drawPath() {}"#, "fill"),
            (r#"let outputPath = "a.pdf"; let stroke = true; let fill = true; fn drawPath(x) {}"#, "drawPath"),
            (r#"let outputPath = "a.pdf"; let stroke = true; let fill = true; let drawPath = 3;"#, "drawPath"),
        ];
        for (source, name) in cases {
            match env(source).outputs() {
                Err(DrawError::MissingParameter(msg)) => {
                    assert!(msg.starts_with(name), "{source}: {msg}")
                }
                other => panic!("{source}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn bridge_outside_draw_path_fails() {
        let err = ScriptEnvironment::compile("moveTo(0, 0);")
            .unwrap()
            .run_top_level()
            .unwrap_err();
        match err {
            DrawError::ScriptCollect(msg) => assert!(msg.contains("no drawing context"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_numeric_coordinates_fail() {
        let err = record(&format!("{HEADER} fn drawPath() {{ moveTo(\"a\", 0); }}")).unwrap_err();
        match err {
            DrawError::ScriptExec(msg) => assert!(msg.contains("moveTo"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn out_of_range_coordinates_fail() {
        for call in [
            "lineTo(0.0 / 0.0, 5.0)",
            "moveTo(1e39, 0)",
            "relLineTo(0, -1e39)",
        ] {
            let err = record(&format!("{HEADER} fn drawPath() {{ moveTo(0, 0); {call}; }}"))
                .unwrap_err();
            match err {
                DrawError::ScriptExec(msg) => assert!(msg.contains("out of range"), "{call}: {msg}"),
                other => panic!("{call}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn large_integer_coordinates_are_exact() {
        let rec = record(&format!(
            "{HEADER} fn drawPath() {{ moveTo(16777217, 16777217); lineTo(16777227, 16777227); }}"
        ))
        .unwrap();
        let e = rec.extents();
        assert_eq!((e.x1, e.x2), (16777217.0, 16777227.0));
    }

    #[test]
    fn failed_invoke_unbinds_context() {
        let mut env = env(&format!("{HEADER} fn drawPath() {{ throw \"nope\"; }}"));
        let outputs = env.outputs().unwrap();
        let slot = env.slot().clone();
        {
            let _binding = slot.bind(PathRecorder::new()).unwrap();
            assert!(env.invoke(&outputs.draw_path).is_err());
        }
        assert!(!slot.is_bound());
    }

    #[test]
    fn double_bind_is_inconsistent() {
        let slot = ContextSlot::default();
        let _first = slot.bind(PathRecorder::new()).unwrap();
        assert!(matches!(
            slot.bind(PathRecorder::new()),
            Err(DrawError::StackConsistency(_))
        ));
    }

    #[test]
    fn draw_path_does_not_rerun_top_level() {
        let rec = record(&format!(
            "if is_def_var(\"seen\") {{ throw \"ran twice\"; }}
             let seen = true;
             {HEADER}
             fn drawPath() {{ moveTo(0, 0); lineTo(1, 1); }}"
        ))
        .unwrap();
        assert_eq!(rec.snapshot().len(), 2);
    }
}
