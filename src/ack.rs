//! Hierarchical acknowledgment codes
//!
//! Every framed request is answered with exactly one ACK. The variant set
//! is closed: `OK`, `REJ:DUP`, `REJ:INV`. Wire form is
//! `[1-byte code length][full_code][1-byte id length][id]`, where the id is
//! an opaque correlation string used only for logging.

use std::io::Read;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AckError {
    #[error("unknown ACK code: {0}")]
    UnknownCode(String),

    #[error("ACK id is not valid UTF-8")]
    InvalidId,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The closed set of acknowledgment variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Ok,
    RejectDuplicate,
    RejectInvalid,
}

impl AckKind {
    pub const ALL: [AckKind; 3] = [
        AckKind::Ok,
        AckKind::RejectDuplicate,
        AckKind::RejectInvalid,
    ];

    pub const fn full_code(self) -> &'static [u8] {
        match self {
            AckKind::Ok => crate::protocol::code::OK,
            AckKind::RejectDuplicate => crate::protocol::code::REJ_DUP,
            AckKind::RejectInvalid => crate::protocol::code::REJ_INV,
        }
    }

    pub const fn status(self) -> &'static str {
        match self {
            AckKind::Ok => "OK",
            AckKind::RejectDuplicate => "DUPLICATE",
            AckKind::RejectInvalid => "INVALID",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            AckKind::Ok => "Successful operation",
            AckKind::RejectDuplicate => "Rejected due to duplicate image data",
            AckKind::RejectInvalid => "Invalid image data received",
        }
    }

    /// Look a variant up by its full code, split on the first ':'.
    pub fn from_code(full_code: &[u8]) -> Option<AckKind> {
        let (parent, child) = match full_code.iter().position(|&b| b == b':') {
            Some(i) => (&full_code[..i], &full_code[i + 1..]),
            None => (full_code, &[][..]),
        };
        match (parent, child) {
            (b"OK", b"") => Some(AckKind::Ok),
            (b"REJ", b"DUP") => Some(AckKind::RejectDuplicate),
            (b"REJ", b"INV") => Some(AckKind::RejectInvalid),
            _ => None,
        }
    }
}

/// One acknowledgment instance: a variant plus a correlation id assigned at
/// construction. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    kind: AckKind,
    id: String,
}

impl Ack {
    pub fn new(kind: AckKind) -> Self {
        Ack {
            kind,
            id: Uuid::new_v4().simple().to_string(),
        }
    }

    fn with_id(kind: AckKind, id: String) -> Self {
        Ack { kind, id }
    }

    pub fn kind(&self) -> AckKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn full_code(&self) -> &'static [u8] {
        self.kind.full_code()
    }

    pub fn status(&self) -> &'static str {
        self.kind.status()
    }

    pub fn description(&self) -> &'static str {
        self.kind.description()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let code = self.kind.full_code();
        let id = self.id.as_bytes();
        // Both lengths fit a byte: codes are at most 7 bytes, ids 32
        let mut buf = Vec::with_capacity(2 + code.len() + id.len());
        buf.push(code.len() as u8);
        buf.extend_from_slice(code);
        buf.push(id.len() as u8);
        buf.extend_from_slice(id);
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Ack, AckError> {
        Ack::read_from(&mut std::io::Cursor::new(data))
    }

    /// Read one ACK straight off a stream; the layout is self-delimiting.
    pub fn read_from<R: Read>(stream: &mut R) -> Result<Ack, AckError> {
        let mut len = [0u8; 1];
        stream.read_exact(&mut len)?;
        let mut code = vec![0u8; len[0] as usize];
        stream.read_exact(&mut code)?;

        let kind = AckKind::from_code(&code)
            .ok_or_else(|| AckError::UnknownCode(String::from_utf8_lossy(&code).into_owned()))?;

        stream.read_exact(&mut len)?;
        let mut id = vec![0u8; len[0] as usize];
        stream.read_exact(&mut id)?;
        let id = String::from_utf8(id).map_err(|_| AckError::InvalidId)?;

        Ok(Ack::with_id(kind, id))
    }
}

impl std::fmt::Display for Ack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {} ({})",
            self.status(),
            self.description(),
            String::from_utf8_lossy(self.full_code())
        )
    }
}
