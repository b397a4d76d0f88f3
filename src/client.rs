//! Push client for the pixsink wire protocol
//!
//! One connection per session. Each `send_*` call writes one frame and
//! blocks for the matching ACK.

use crate::ack::Ack;
use crate::framing;
use crate::protocol::ACK_READ_TIMEOUT_MS;
use anyhow::{Context, Result};
use std::io::Cursor;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

pub struct ImageClient {
    stream: TcpStream,
}

impl ImageClient {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .with_context(|| format!("connecting to {host}:{port}"))?;
        stream.set_read_timeout(Some(Duration::from_millis(ACK_READ_TIMEOUT_MS)))?;
        Ok(ImageClient { stream })
    }

    /// Decode the file and re-encode as PNG before framing, so the server
    /// always receives a payload in a format it can fully decode.
    pub fn send_image(&mut self, path: &Path) -> Result<Ack> {
        let img = image::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png)
            .context("encoding png")?;
        self.send_bytes(&buf.into_inner())
    }

    /// Send a pre-encoded payload as one frame and read the ACK.
    pub fn send_bytes(&mut self, payload: &[u8]) -> Result<Ack> {
        framing::write_frame(&mut self.stream, payload).context("writing frame")?;
        let ack = Ack::read_from(&mut self.stream).context("reading ack")?;
        Ok(ack)
    }
}
