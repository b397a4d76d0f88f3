//! Server configuration
//!
//! Resolved once at startup (defaults, then `PIXSINK_*` environment
//! variables, then CLI flags) and treated as immutable for the lifetime of
//! a bound server.

use crate::protocol::MAX_FRAME_SIZE;
use std::path::PathBuf;

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_BIND_PORT: u16 = 8085;
pub const DEFAULT_SAVE_DIR: &str = "pixsink-images";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub persist_images: bool,
    pub save_directory: PathBuf,
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            bind_port: DEFAULT_BIND_PORT,
            persist_images: false,
            save_directory: PathBuf::from(DEFAULT_SAVE_DIR),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}
