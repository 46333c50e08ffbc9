use std::path::PathBuf;

use thiserror::Error;

/// Everything a shell command can fail with. Rendered once, as `error: <message>`.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] chern_store::Error),

    #[error(transparent)]
    Dite(#[from] chern_dite::Error),

    #[error("unknown command {0}, see help")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(String),

    #[error("unterminated quote in {0:?}")]
    UnterminatedQuote(String),

    #[error("no current project, run chern init or cd_project <name>")]
    NoProject,

    #[error("editor {editor} failed: {reason}")]
    Editor { editor: String, reason: String },

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
