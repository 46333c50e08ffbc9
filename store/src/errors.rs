use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors returned by project, node and impression operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not in a chern project: {0}")]
    NotInProject(PathBuf),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("not impressed: {0}")]
    NotImpressed(String),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed yaml in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unable to process archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns a closure wrapping an [std::io::Error] with the path it occured at,
    /// meant to be passed to `map_err`.
    pub(crate) fn io(path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.as_ref().to_path_buf();
        move |source| Error::Io { path, source }
    }

    pub(crate) fn archive(path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.as_ref().to_path_buf();
        move |source| Error::Archive { path, source }
    }
}

impl From<walkdir::Error> for Error {
    fn from(value: walkdir::Error) -> Self {
        let path = value.path().map(Path::to_path_buf).unwrap_or_default();
        let source = value
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        Error::Io { path, source }
    }
}
