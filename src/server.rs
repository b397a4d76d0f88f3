//! Accept loop and per-connection receive/validate/respond state machine

use crate::ack::{Ack, AckKind};
use crate::config::ServerConfig;
use crate::dedup::{self, SessionIndex};
use crate::framing::{self, FrameError};
use crate::imagehash;
use crate::logger::Logger;
use crate::protocol::ACCEPT_POLL_MS;
use anyhow::{anyhow, bail, Context, Result};
use image::DynamicImage;
use parking_lot::Mutex;
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(ACCEPT_POLL_MS);

/// State shared by every connection handler, passed in at spawn time.
pub struct Shared {
    /// Accepted images, bounded only by the caller's memory budget
    images: Mutex<Vec<DynamicImage>>,
    /// Perceptual hashes seen this session
    session: Mutex<SessionIndex>,
    /// Serializes the whole load/assign/save/append persist step so the
    /// manifest stays append-only with unique numbers
    persist: Mutex<()>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            images: Mutex::new(Vec::new()),
            session: Mutex::new(SessionIndex::new()),
            persist: Mutex::new(()),
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.lock().len()
    }

    pub fn session_hash_count(&self) -> usize {
        self.session.lock().len()
    }
}

/// Framed image-push server. Lifecycle: STOPPED -> bound -> listening ->
/// STOPPED. Host and port are fixed once bound.
pub struct ImageServer {
    config: ServerConfig,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    logger: Arc<dyn Logger>,
    listener: Option<TcpListener>,
}

impl ImageServer {
    pub fn new(config: ServerConfig, logger: Arc<dyn Logger>) -> Self {
        ImageServer {
            config,
            shared: Arc::new(Shared::new()),
            stop: Arc::new(AtomicBool::new(false)),
            logger,
            listener: None,
        }
    }

    pub fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    /// Shared stop flag; setting it stops the accept loop within one poll
    /// interval. Handed to signal handlers.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Bind the listening socket. Fails fast if the port is already taken
    /// or the process lacks permission; neither is retried.
    pub fn bind(&mut self) -> Result<()> {
        if self.listener.is_some() {
            bail!("server is already bound");
        }

        // Probe before binding; port 0 asks the OS for an ephemeral port
        if self.config.bind_port != 0 && !port_is_free(&self.config.bind_host, self.config.bind_port)
        {
            bail!(
                "port {} is not free, cannot bind to it",
                self.config.bind_port
            );
        }

        if self.config.persist_images {
            dedup::ensure_save_dir(&self.config.save_directory)?;
        }

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr).with_context(|| format!("bind {addr}"))?;
        // Non-blocking accept so the stop flag is polled at a bounded interval
        listener.set_nonblocking(true)?;
        self.listener = Some(listener);
        Ok(())
    }

    /// Accept loop. Each accepted connection gets its own handler thread;
    /// handlers share no state beyond `Shared`.
    pub fn listen(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow!("server is not bound"))?;
        eprintln!(
            "pixsinkd listening on {} persist={}",
            listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| self.config.bind_addr()),
            self.config.persist_images
        );

        while !self.stop.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    // Accepted sockets inherit non-blocking on some platforms
                    if let Err(e) = stream.set_nonblocking(false) {
                        eprintln!("failed to configure socket from {peer}: {e}");
                        continue;
                    }
                    let config = self.config.clone();
                    let shared = Arc::clone(&self.shared);
                    let logger = Arc::clone(&self.logger);
                    thread::spawn(move || {
                        let peer = peer.to_string();
                        logger.conn_open(&peer);
                        if let Err(e) = handle_client(stream, &peer, &config, &shared, &logger) {
                            eprintln!("connection error from {peer}: {e:#}");
                            logger.error("conn", &peer, &format!("{e:#}"));
                        }
                        logger.conn_close(&peer);
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    if self.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    eprintln!("accept error: {e}");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        self.bind()?;
        self.listen()
    }

    /// Idempotent: stopping a stopped or never-started server is a no-op.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.listener.take();
    }
}

/// Connect-probe for port availability, mirroring a pre-bind check rather
/// than relying solely on the bind error.
fn port_is_free(host: &str, port: u16) -> bool {
    let probe_host = if host == "0.0.0.0" { "127.0.0.1" } else { host };
    let addrs = match (probe_host, port).to_socket_addrs() {
        Ok(a) => a,
        // Unresolvable host: let bind produce the real error
        Err(_) => return true,
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, Duration::from_millis(250)).is_ok() {
            return false;
        }
    }
    true
}

enum PersistOutcome {
    Saved(u32),
    Duplicate,
}

/// Per-connection loop: read frame, decode, dedupe, optionally persist,
/// respond. A bad frame payload answers a reject and keeps the connection;
/// transport errors tear the connection down with no reply.
pub fn handle_client(
    mut stream: TcpStream,
    peer: &str,
    config: &ServerConfig,
    shared: &Shared,
    logger: &Arc<dyn Logger>,
) -> Result<()> {
    loop {
        let payload = match framing::read_frame_limited(&mut stream, config.max_frame_size) {
            Ok(p) => p,
            Err(FrameError::EndOfStream) => return Ok(()),
            Err(e) => return Err(e).context("reading frame"),
        };

        // Full decode, not just a header sniff, so corrupt pixel data is
        // caught here instead of during persistence
        let img = match image::load_from_memory(&payload) {
            Ok(img) => img,
            Err(e) => {
                logger.rejected(peer, "REJ:INV");
                logger.error("decode", peer, &e.to_string());
                send_ack(&mut stream, AckKind::RejectInvalid)?;
                continue;
            }
        };

        let phash = imagehash::average_hash(&img);
        let seen = shared.session.lock().is_duplicate(phash);
        if seen {
            logger.rejected(peer, "REJ:DUP");
            send_ack(&mut stream, AckKind::RejectDuplicate)?;
            continue;
        }

        let mut file_number = None;
        if config.persist_images {
            match persist_image(&img, config, shared) {
                Ok(PersistOutcome::Saved(n)) => file_number = Some(n),
                Ok(PersistOutcome::Duplicate) => {
                    logger.rejected(peer, "REJ:DUP");
                    send_ack(&mut stream, AckKind::RejectDuplicate)?;
                    continue;
                }
                Err(e) => {
                    // Disk trouble rejects this one image, not the connection
                    logger.error("persist", peer, &format!("{e:#}"));
                    send_ack(&mut stream, AckKind::RejectInvalid)?;
                    continue;
                }
            }
        }

        shared.session.lock().record(phash);
        shared.images.lock().push(img);
        logger.stored(peer, payload.len() as u64, file_number);
        send_ack(&mut stream, AckKind::Ok)?;
    }
}

/// Content-hash the pixels and, if the manifest does not already know them,
/// save `<number>.png` and append the manifest line. The persist lock keeps
/// this a single-writer critical section across all handlers.
fn persist_image(
    img: &DynamicImage,
    config: &ServerConfig,
    shared: &Shared,
) -> Result<PersistOutcome> {
    let _guard = shared.persist.lock();

    let chash = imagehash::content_hash(img);
    let mut data = dedup::load_manifest(&config.save_directory)?;
    if data.known.contains_key(&chash) {
        return Ok(PersistOutcome::Duplicate);
    }

    let number = dedup::assign_number(&mut data);
    let path = config.save_directory.join(format!("{number}.png"));
    img.save(&path)
        .with_context(|| format!("saving {}", path.display()))?;
    dedup::append_manifest(&config.save_directory, &chash, number)?;
    Ok(PersistOutcome::Saved(number))
}

fn send_ack(stream: &mut TcpStream, kind: AckKind) -> Result<()> {
    let ack = Ack::new(kind);
    stream
        .write_all(&ack.serialize())
        .with_context(|| format!("sending {} ack", ack.status()))?;
    Ok(())
}
