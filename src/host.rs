//! Host-level facts that are not tied to a single container.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open file `{path}`: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read line for file `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing `MemTotal` in `{path}`")]
    MissingMemTotal { path: PathBuf },
    /// The value is not an integer, or does not fit in `u64` once converted to bytes.
    #[error("invalid `MemTotal` value in `{path}`: '{value}'")]
    InvalidMemTotal {
        path: PathBuf,
        value: String,
        #[source]
        source: Option<ParseIntError>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returns the total physical memory of the host in bytes, as reported by
/// `<proc_root>/meminfo`.
///
/// # Errors
///
/// Returns an error if `meminfo` cannot be read or does not contain a valid `MemTotal` line.
pub fn memory_capacity(proc_root: impl AsRef<Path>) -> Result<u64> {
    let path = proc_root.as_ref().join("meminfo");
    let mut buf = BufReader::new(File::open(&path).map_err(|source| Error::FileOpen {
        path: path.clone(),
        source,
    })?);

    let mut line = String::with_capacity(64);
    while buf.read_line(&mut line).map_err(|source| Error::ReadLine {
        path: path.clone(),
        source,
    })? != 0
    {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let mut parts = rest.split_whitespace();
            let value = parts.next().unwrap_or_default();
            let amount: u64 = value.parse().map_err(|source| Error::InvalidMemTotal {
                path: path.clone(),
                value: value.to_owned(),
                source: Some(source),
            })?;
            // meminfo reports kibibytes; a missing unit means bytes.
            return match parts.next() {
                Some("kB") => amount.checked_mul(1024).ok_or_else(|| Error::InvalidMemTotal {
                    path: path.clone(),
                    value: value.to_owned(),
                    source: None,
                }),
                _ => Ok(amount),
            };
        }
        line.clear();
    }

    Err(Error::MissingMemTotal { path })
}
