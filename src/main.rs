use std::path::{Path, PathBuf};

use clap::Parser;

mod config;
mod error;
mod orchestrator;
mod path;
mod pdf_export;
mod script;


use orchestrator::Orchestrator;

/// Render the vector path described by each script to a PDF file.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Script files, processed in order
    files: Vec<PathBuf>,
}

pub fn signature() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let orchestrator = Orchestrator::default();
    for file in &cli.files {
        process_file(&orchestrator, file);
    }
}

/// Draw one script, reporting any failure on stderr. Never aborts the run.
fn process_file(orchestrator: &Orchestrator, file: &Path) {
    if let Err(e) = std::fs::File::open(file) {
        log::debug!("cannot open {}: {e}", file.display());
        eprintln!("Item '{}' is not a script.", file.display());
        return;
    }

    match orchestrator.draw_file(file) {
        Ok(report) => {
            log::info!(
                "{} -> {} ({}x{} pt, {} commands, {:?})",
                file.display(),
                report.output_path.display(),
                report.page_size.0,
                report.page_size.1,
                report.commands,
                report.paint,
            );
            log::debug!(
                "extents ({}, {})-({}, {}) placed at ({}, {})",
                report.extents.x1,
                report.extents.y1,
                report.extents.x2,
                report.extents.y2,
                report.origin.x,
                report.origin.y,
            );
        }
        Err(e) => {
            log::debug!("{}: {e:?}", file.display());
            eprintln!("{e}");
        }
    }
}
