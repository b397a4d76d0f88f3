//! Shared CLI helpers and small reusable Clap fragments

use crate::config::{ServerConfig, DEFAULT_BIND_HOST, DEFAULT_BIND_PORT, DEFAULT_SAVE_DIR};
use clap::Parser;
use std::path::PathBuf;

/// Daemon options for pixsinkd
#[derive(Clone, Debug, Parser)]
pub struct DaemonOpts {
    /// Bind host
    #[arg(long, env = "PIXSINK_BIND_HOST", default_value = DEFAULT_BIND_HOST)]
    pub host: String,

    /// Bind port
    #[arg(long, env = "PIXSINK_BIND_PORT", default_value_t = DEFAULT_BIND_PORT)]
    pub port: u16,

    /// Persist accepted images to disk
    #[arg(long = "save-images", env = "PIXSINK_SAVE_IMAGES")]
    pub save_images: bool,

    /// Directory for persisted images and the manifest
    #[arg(long = "save-dir", env = "PIXSINK_SAVE_IMAGE_DIR", default_value = DEFAULT_SAVE_DIR)]
    pub save_dir: PathBuf,

    /// Write timestamped event log entries to file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl DaemonOpts {
    pub fn to_config(&self) -> ServerConfig {
        ServerConfig {
            bind_host: self.host.clone(),
            bind_port: self.port,
            persist_images: self.save_images,
            save_directory: self.save_dir.clone(),
            ..ServerConfig::default()
        }
    }
}
