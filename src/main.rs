//! pixsink - push images to a pixsinkd server

use anyhow::Result;
use clap::Parser;
use pixsink::ack::AckKind;
use pixsink::client::ImageClient;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Pixsink - push images to a pixsinkd server over the framed transport"
)]
struct Args {
    /// Image files to send
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Server host
    #[arg(long, env = "PIXSINK_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, env = "PIXSINK_PORT", default_value_t = 8085)]
    port: u16,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut client = ImageClient::connect(&args.host, args.port)?;

    let mut rejected = 0usize;
    for path in &args.images {
        let ack = client.send_image(path)?;
        println!("{}: {}", path.display(), ack);
        if ack.kind() != AckKind::Ok {
            rejected += 1;
        }
    }

    if rejected > 0 {
        eprintln!("{rejected} of {} images rejected", args.images.len());
        std::process::exit(1);
    }
    Ok(())
}
