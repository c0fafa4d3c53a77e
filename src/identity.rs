use rand::{RngCore, rngs::OsRng};

/// A random report identifier: 16 bytes from the operating system's random
/// source, formatted as lowercase hyphenated hex.
///
/// No version or variant bits are forced.
pub(crate) fn generate_uuid() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    uuid::Uuid::from_bytes(bytes).hyphenated().to_string()
}

/// Seconds since the Unix epoch.
pub(crate) fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The version of the compiler that built this crate.
pub(crate) const LANG_VERSION: &str = env!("FAULTREPORT_RUSTC_VERSION");

/// The version of this crate.
pub(crate) const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
