use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub trait Logger: Send + Sync {
    fn conn_open(&self, _peer: &str) {}
    fn conn_close(&self, _peer: &str) {}
    fn stored(&self, _peer: &str, _bytes: u64, _file_number: Option<u32>) {}
    fn rejected(&self, _peer: &str, _code: &str) {}
    fn error(&self, _context: &str, _peer: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn conn_open(&self, peer: &str) {
        self.line(&format!("CONN peer={peer}"));
    }
    fn conn_close(&self, peer: &str) {
        self.line(&format!("CLOSE peer={peer}"));
    }
    fn stored(&self, peer: &str, bytes: u64, file_number: Option<u32>) {
        match file_number {
            Some(n) => self.line(&format!("STORE peer={peer} bytes={bytes} file={n}.png")),
            None => self.line(&format!("STORE peer={peer} bytes={bytes}")),
        }
    }
    fn rejected(&self, peer: &str, code: &str) {
        self.line(&format!("REJECT peer={peer} code={code}"));
    }
    fn error(&self, context: &str, peer: &str, msg: &str) {
        self.line(&format!("ERROR ctx={context} peer={peer} msg={msg}"));
    }
}
