//! Pixsink library
//!
//! Framed TCP image-push protocol: client sends length-prefixed image
//! payloads, server validates, deduplicates, optionally persists, and
//! answers each frame with one ACK.

pub mod ack;
pub mod cli;
pub mod client;
pub mod config;
pub mod dedup;
pub mod framing;
pub mod imagehash;
pub mod logger;
pub mod protocol;
pub mod server;
