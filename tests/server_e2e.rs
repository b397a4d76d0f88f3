use anyhow::Result;
use pixsink::ack::AckKind;
use pixsink::client::ImageClient;
use pixsink::config::ServerConfig;
use pixsink::logger::NoopLogger;
use pixsink::server::{ImageServer, Shared};
use std::io::{Cursor, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 64x64 black/white block image whose content is controlled by `seed`:
/// block i is white iff bit i of the seed is set. Distinct seeds decode to
/// distinct pixels and distinct perceptual hashes.
fn make_png(seed: u64) -> Vec<u8> {
    let mut img = image::RgbaImage::new(64, 64);
    for (x, y, p) in img.enumerate_pixels_mut() {
        let block = (y / 8) * 8 + (x / 8);
        let white = (seed >> block) & 1 == 1;
        let v = if white { 255 } else { 0 };
        *p = image::Rgba([v, v, v, 255]);
    }
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

struct TestServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
}

impl TestServer {
    fn start(persist: bool, save_dir: Option<PathBuf>) -> Result<Self> {
        let config = ServerConfig {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 0,
            persist_images: persist,
            save_directory: save_dir.unwrap_or_else(|| PathBuf::from("unused")),
            ..ServerConfig::default()
        };
        let mut server = ImageServer::new(config, Arc::new(NoopLogger));
        server.bind()?;
        let addr = server.local_addr().expect("bound server has an address");
        let shared = server.shared();
        let stop = server.stop_flag();
        thread::spawn(move || {
            let _ = server.listen();
        });
        Ok(TestServer { addr, shared, stop })
    }

    fn client(&self) -> Result<ImageClient> {
        ImageClient::connect(&self.addr.ip().to_string(), self.addr.port())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[test]
fn ok_then_duplicate_across_connections() -> Result<()> {
    let srv = TestServer::start(false, None)?;
    let png = make_png(0x0123_4567_89AB_CDEF);

    let mut first = srv.client()?;
    assert_eq!(first.send_bytes(&png)?.kind(), AckKind::Ok);

    // Same exact bytes on a fresh connection hit the shared session index
    let mut second = srv.client()?;
    assert_eq!(second.send_bytes(&png)?.kind(), AckKind::RejectDuplicate);

    assert_eq!(srv.shared.image_count(), 1);
    Ok(())
}

#[test]
fn invalid_payload_keeps_connection_open() -> Result<()> {
    let srv = TestServer::start(false, None)?;
    let mut client = srv.client()?;

    let ack = client.send_bytes(b"this is not an image")?;
    assert_eq!(ack.kind(), AckKind::RejectInvalid);

    // The same connection still accepts a valid image afterwards
    let ack = client.send_bytes(&make_png(0xFF00_FF00_00FF_00FF))?;
    assert_eq!(ack.kind(), AckKind::Ok);

    assert_eq!(srv.shared.image_count(), 1);
    Ok(())
}

#[test]
fn truncated_frame_tears_down_without_side_effects() -> Result<()> {
    let srv = TestServer::start(false, None)?;

    {
        // Declare 1000 bytes, deliver 500, then close
        let mut raw = TcpStream::connect(srv.addr)?;
        raw.write_all(&1000u32.to_be_bytes())?;
        raw.write_all(&[0u8; 500])?;
    }
    thread::sleep(Duration::from_millis(300));

    assert_eq!(srv.shared.image_count(), 0);
    assert_eq!(srv.shared.session_hash_count(), 0);

    // Server survived and still serves new connections
    let mut client = srv.client()?;
    assert_eq!(client.send_bytes(&make_png(0x00FF))?.kind(), AckKind::Ok);
    Ok(())
}

#[test]
fn concurrent_distinct_clients_all_ack_ok() -> Result<()> {
    let srv = TestServer::start(false, None)?;
    let seeds: [u64; 4] = [
        0x1111_0000_1111_0000,
        0x0000_2222_0000_2222,
        0xF0F0_F0F0_0F0F_0F0F,
        0x00FF_FF00_FF00_00FF,
    ];

    let mut handles = Vec::new();
    for &seed in &seeds {
        let addr = srv.addr;
        handles.push(thread::spawn(move || -> Result<AckKind> {
            let mut client = ImageClient::connect(&addr.ip().to_string(), addr.port())?;
            Ok(client.send_bytes(&make_png(seed))?.kind())
        }));
    }
    for h in handles {
        assert_eq!(h.join().unwrap()?, AckKind::Ok);
    }

    // No lost updates under the shared lock
    assert_eq!(srv.shared.image_count(), seeds.len());
    Ok(())
}

#[test]
fn persisted_duplicate_survives_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let png = make_png(0xDEAD_BEEF_CAFE_F00D);

    {
        let srv = TestServer::start(true, Some(dir.path().to_path_buf()))?;
        let mut client = srv.client()?;
        assert_eq!(client.send_bytes(&png)?.kind(), AckKind::Ok);
        assert!(dir.path().join("1.png").exists());
        let manifest = std::fs::read_to_string(dir.path().join("hashes.txt"))?;
        assert_eq!(manifest.lines().count(), 1);
        assert!(manifest.trim().ends_with(" 1"));
    }

    // Fresh server, empty session index: the manifest alone must still
    // flag the resent image as a duplicate
    let srv = TestServer::start(true, Some(dir.path().to_path_buf()))?;
    let mut client = srv.client()?;
    assert_eq!(client.send_bytes(&png)?.kind(), AckKind::RejectDuplicate);
    assert_eq!(srv.shared.image_count(), 0);

    let manifest = std::fs::read_to_string(dir.path().join("hashes.txt"))?;
    assert_eq!(manifest.lines().count(), 1, "no duplicate manifest append");
    Ok(())
}

#[test]
fn persistence_fills_number_gaps() -> Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let srv = TestServer::start(true, Some(dir.path().to_path_buf()))?;
        let mut client = srv.client()?;
        for seed in [0x1u64, 0x3, 0x7] {
            assert_eq!(client.send_bytes(&make_png(seed))?.kind(), AckKind::Ok);
        }
    }
    assert!(dir.path().join("3.png").exists());

    // Delete file 2 out of band; a new image should be assigned number 2
    std::fs::remove_file(dir.path().join("2.png"))?;
    let srv = TestServer::start(true, Some(dir.path().to_path_buf()))?;
    let mut client = srv.client()?;
    assert_eq!(client.send_bytes(&make_png(0xF))?.kind(), AckKind::Ok);
    assert!(dir.path().join("2.png").exists());

    assert_eq!(client.send_bytes(&make_png(0x1F))?.kind(), AckKind::Ok);
    assert!(dir.path().join("4.png").exists());
    Ok(())
}

#[test]
fn stop_is_idempotent_and_prompt() -> Result<()> {
    let config = ServerConfig {
        bind_host: "127.0.0.1".to_string(),
        bind_port: 0,
        ..ServerConfig::default()
    };
    let mut server = ImageServer::new(config, Arc::new(NoopLogger));
    server.bind()?;
    let stop = server.stop_flag();

    let handle = thread::spawn(move || server.listen());
    // Let the loop start, then request a stop twice
    thread::sleep(Duration::from_millis(50));
    let asked = std::time::Instant::now();
    stop.store(true, Ordering::SeqCst);
    stop.store(true, Ordering::SeqCst);
    handle.join().unwrap()?;

    // Shutdown latency is bounded by the accept poll interval
    assert!(asked.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[test]
fn bind_fails_when_port_taken() -> Result<()> {
    let srv = TestServer::start(false, None)?;

    let config = ServerConfig {
        bind_host: "127.0.0.1".to_string(),
        bind_port: srv.addr.port(),
        ..ServerConfig::default()
    };
    let mut second = ImageServer::new(config, Arc::new(NoopLogger));
    assert!(second.bind().is_err());
    Ok(())
}
