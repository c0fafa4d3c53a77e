use std::sync::OnceLock;

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{Procfs, system};

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Returns the identifier of the machine this process runs on.
///
/// The identifier is the lowercase hex SHA-256 digest of the operating
/// system's machine id, falling back to the hostname and finally to random
/// bytes. It is computed on first use and cached for the lifetime of the
/// process; concurrent first calls are serialized by a [`OnceLock`] and every
/// later call is a plain read.
///
/// ```rust
/// let id = faultreport_telemetry::machine_id();
/// assert_eq!(id.len(), 64);
/// assert_eq!(id, faultreport_telemetry::machine_id());
/// ```
pub fn machine_id() -> &'static str {
    static MACHINE_ID: OnceLock<String> = OnceLock::new();

    MACHINE_ID.get_or_init(|| hash_identifier(&raw_machine_id()))
}

fn raw_machine_id() -> Vec<u8> {
    for path in MACHINE_ID_PATHS {
        if let Ok(content) = std::fs::read_to_string(path) {
            let id = content.trim();
            if !id.is_empty() {
                return id.as_bytes().to_vec();
            }
        }
    }

    if let Some(hostname) = system::hostname(&Procfs::new()) {
        tracing::debug!("no machine id available, deriving guid from the hostname");
        return hostname.into_bytes();
    }

    tracing::debug!("no machine id or hostname available, using a random guid");
    let mut bytes = vec![0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

fn hash_identifier(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}
