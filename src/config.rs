//! Runtime configuration, read from environment variables.
//!
//! | Variable                 | Default        | Values                          |
//! |--------------------------|----------------|---------------------------------|
//! | `CREO_STATS_LISTEN_ADDR` | `0.0.0.0:3000` | socket address                  |
//! | `HOST_PROC`              | `/proc`        | path to the host's procfs       |
//! | `CREO_STATS_USER_TIME`   | `kernel`       | `kernel`, `user`                |
//! | `CREO_STATS_BLKIO`       | `per-entry`    | `per-entry`, `merge-by-device`  |
//!
//! `CREO_STATS_USER_TIME=user` and `CREO_STATS_BLKIO=merge-by-device` deviate from the
//! established output mapping; see [`crate::stats::NormalizerConfig`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::stats::{BlkioGrouping, NormalizerConfig, UserTimeSource};

pub const LISTEN_ADDR_VAR: &str = "CREO_STATS_LISTEN_ADDR";
pub const PROC_ROOT_VAR: &str = "HOST_PROC";
pub const USER_TIME_VAR: &str = "CREO_STATS_USER_TIME";
pub const BLKIO_VAR: &str = "CREO_STATS_BLKIO";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_PROC_ROOT: &str = "/proc";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{key}`, expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub proc_root: PathBuf,
    pub normalizer: NormalizerConfig,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a variable is set to an unsupported value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration from `lookup`, which returns the value of a variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = parse_var(
            &lookup,
            LISTEN_ADDR_VAR,
            DEFAULT_LISTEN_ADDR,
            "a socket address",
        )?;
        let proc_root = lookup(PROC_ROOT_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT));
        let user_time = parse_var(&lookup, USER_TIME_VAR, "kernel", "`kernel` or `user`")?;
        let blkio = parse_var(
            &lookup,
            BLKIO_VAR,
            "per-entry",
            "`per-entry` or `merge-by-device`",
        )?;

        Ok(Self {
            listen_addr,
            proc_root,
            normalizer: NormalizerConfig { user_time, blkio },
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
    expected: &'static str,
) -> Result<T> {
    let value = lookup(key).unwrap_or_else(|| default.to_owned());
    value.trim().parse().map_err(|_| Error::InvalidValue {
        key,
        value,
        expected,
    })
}

impl FromStr for UserTimeSource {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "kernel" => Ok(UserTimeSource::KernelMode),
            "user" => Ok(UserTimeSource::UserMode),
            _ => Err(()),
        }
    }
}

impl FromStr for BlkioGrouping {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "per-entry" => Ok(BlkioGrouping::PerEntry),
            "merge-by-device" => Ok(BlkioGrouping::MergeByDevice),
            _ => Err(()),
        }
    }
}
