//! pixsinkd - the long-running image-push daemon

use anyhow::Result;
use clap::Parser;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use pixsink::cli::DaemonOpts;
use pixsink::logger::{Logger, NoopLogger, TextLogger};
use pixsink::server::ImageServer;

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();
    let config = opts.to_config();

    println!("Starting pixsink daemon:");
    println!("  Bind: {}", config.bind_addr());
    println!("  Persist: {}", config.persist_images);
    if config.persist_images {
        println!("  Save dir: {}", config.save_directory.display());
    }
    if config.bind_host == "0.0.0.0" {
        eprintln!("WARNING: binding to 0.0.0.0 exposes the daemon to all interfaces");
        eprintln!("   This protocol is unauthenticated; only use on trusted networks (LAN)");
    }

    let logger: Arc<dyn Logger> = if let Some(ref p) = opts.log_file {
        match TextLogger::new(p) {
            Ok(l) => Arc::new(l),
            Err(e) => {
                eprintln!("could not open log file {}: {e}", p.display());
                Arc::new(NoopLogger)
            }
        }
    } else {
        Arc::new(NoopLogger)
    };

    let mut server = ImageServer::new(config, logger);
    server.bind()?;

    // Ctrl-C requests a stop; the accept loop notices within one poll tick
    let stop = server.stop_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, stopping...");
        stop.store(true, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    server.listen()
}
