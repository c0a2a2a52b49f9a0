//! Server Configuration
//!
//! Command-line flags for the server. The same values are served read-only
//! through `CONFIG GET`.

use clap::Parser;
use std::path::PathBuf;

/// snapkv - an in-memory key-value server with RDB snapshots
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "snapkv", version, about, long_about = None)]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding the snapshot file
    #[arg(long, default_value = "/tmp/redis-data")]
    pub dir: String,

    /// Snapshot file name inside `dir`
    #[arg(long, default_value = "dump.rdb")]
    pub dbfilename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            dir: "/tmp/redis-data".to_string(),
            dbfilename: "dump.rdb".to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.dbfilename)
    }

    /// Looks up a parameter by its `CONFIG GET` name (case-insensitive).
    pub fn get(&self, parameter: &str) -> Option<&str> {
        match parameter.to_ascii_lowercase().as_str() {
            "dir" => Some(&self.dir),
            "dbfilename" => Some(&self.dbfilename),
            _ => None,
        }
    }
}
