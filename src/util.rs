use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::time::{SystemTime, UNIX_EPOCH};

/// Builds the value for an `Authorization: Basic ...` header from a
/// client id/secret pair, per RFC 7617 (`base64(id:secret)`).
pub(crate) fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let credentials = format!("{}:{}", client_id, client_secret);
    format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

pub(crate) fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Output filename for a result download: `<prefix><unix-seconds>.csv`,
/// stamped at save time.
pub(crate) fn timestamped_filename(prefix: &str) -> String {
    format!("{}{}.csv", prefix, unix_seconds())
}
