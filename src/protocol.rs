//! Shared protocol constants for the pixsink framed transport

// Maximum frame payload size (64MB) - prevents memory exhaustion from a
// hostile declared length while leaving room for any realistic image
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

// Length prefix is a 4-byte big-endian unsigned integer
pub const LEN_PREFIX_BYTES: usize = 4;

// ACK full codes: parent code optionally followed by ':' and a child code
pub mod code {
    pub const OK: &[u8] = b"OK";
    pub const REJ_DUP: &[u8] = b"REJ:DUP";
    pub const REJ_INV: &[u8] = b"REJ:INV";
}

// Accept loop poll interval (ms) so a stop request is observed promptly
pub const ACCEPT_POLL_MS: u64 = 200;

// Client-side ACK read timeout (ms)
pub const ACK_READ_TIMEOUT_MS: u64 = 10_000;
