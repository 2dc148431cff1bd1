// TLS secret logging
// (c) 2024 Ross Younger

use std::{
    fs::File,
    io::Write as _,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::Context as _;
use quinn::rustls::KeyLog;
use tracing::warn;

/// Writes TLS session secrets to a file in NSS key log format, so packet captures can be decrypted.
///
/// Unlike `rustls::KeyLogFile` the destination is chosen explicitly rather than via `SSLKEYLOGFILE`.
#[derive(Debug)]
pub struct SecretLog {
    file: Mutex<File>,
}

impl SecretLog {
    /// Creates (truncates) the log file
    pub fn create(path: &Path) -> anyhow::Result<Arc<Self>> {
        let file = File::create(path)
            .with_context(|| format!("could not create TLS secret log {}", path.display()))?;
        Ok(Arc::new(Self {
            file: Mutex::new(file),
        }))
    }

    /// Opens the log if a path was given, ready to hand to rustls
    pub fn open_optional(path: Option<&Path>) -> anyhow::Result<Option<Arc<dyn KeyLog>>> {
        let Some(path) = path else {
            return Ok(None);
        };
        let log: Arc<dyn KeyLog> = Self::create(path)?;
        Ok(Some(log))
    }
}

impl KeyLog for SecretLog {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        let line = format!(
            "{label} {} {}\n",
            hex::encode(client_random),
            hex::encode(secret)
        );
        let Ok(mut file) = self.file.lock() else {
            warn!("TLS secret log is poisoned");
            return;
        };
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|()| file.flush()) {
            warn!("could not write TLS secret log: {e}");
        }
    }
}
