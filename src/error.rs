use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop one script from producing its PDF.
///
/// None of these are fatal for the process: the driver reports them and
/// moves on to the next file.
#[derive(Error, Debug)]
pub enum DrawError {
    #[error("error writing '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("error loading code: missing required data ({0})")]
    MissingParameter(&'static str),

    #[error("error loading code: parsing error\n{0}")]
    ScriptCollect(String),

    #[error("error running drawPath:\n{0}")]
    ScriptExec(String),

    #[error("error on stack/consistency state: {0}")]
    StackConsistency(&'static str),
}

pub type DrawResult<T> = Result<T, DrawError>;
