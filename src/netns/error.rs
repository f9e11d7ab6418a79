use std::path::PathBuf;

/// Errors that may occur while reading interface counters from a network namespace.
///
/// These never leave [`super::ProcfsResolver`]; they are logged and replaced by an empty
/// result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open network namespace of pid {pid} at `{path}`: {source}")]
    NamespaceOpen {
        pid: u32,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("network namespace of pid {pid} changed while reading interfaces")]
    NamespaceChanged { pid: u32 },
    #[error("failed to open link list `{path}`: {source}")]
    LinkListOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read link list `{path}`: {source}")]
    LinkListRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed link list `{path}` at line {line}: {reason}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
