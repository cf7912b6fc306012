//! Database configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where and how to open the state database.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Database directory.
    pub path: PathBuf,
    /// Keep everything in memory (tests and throwaway nodes).
    pub ephemeral: bool,
}

impl Config {
    pub fn ephemeral() -> Config {
        Config {
            path: PathBuf::new(),
            ephemeral: true,
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Config {
        Config {
            path: path.into(),
            ephemeral: false,
        }
    }

    pub(crate) fn open(&self) -> sled::Result<sled::Db> {
        if self.ephemeral {
            sled::Config::new().temporary(true).open()
        } else {
            sled::Config::new().path(&self.path).open()
        }
    }
}
