use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by transfers to and from the runner service.
/// Queries degrade to sentinels instead, see [crate::Dispatcher].
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] chern_store::Error),

    #[error("unable to reach DITE: {0}")]
    RunnerUnreachable(String),

    #[error("DITE reports an error: {0}")]
    RunnerReportsError(String),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::RunnerUnreachable(value.without_url().to_string())
    }
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}
