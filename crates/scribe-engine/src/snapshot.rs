//! Suppression of back-to-back identical snapshots.
//!
//! The fingerprint is a cheap heuristic over a bounded prefix of the encoded
//! image. Collisions only ever drop a snapshot, never a step.

use crate::backend::Backend;
use tracing::{debug, error, warn};

pub const DEFAULT_FINGERPRINT_PREFIX: usize = 100;

/// 32-bit rolling hash (`h * 31 + c`, wrapping) over the first `prefix`
/// UTF-16 code units of `raw`, rendered in base 36.
///
/// Returns `None` for an empty input.
pub fn fingerprint(raw: &str, prefix: usize) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let hash = raw.encode_utf16().take(prefix).fold(0i32, |h, unit| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(unit))
    });
    Some(to_base36(hash))
}

fn to_base36(value: i32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = i64::from(value).unsigned_abs();
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    if value < 0 {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Remembers the fingerprint of the last snapshot that was kept.
#[derive(Debug, Clone)]
pub struct SnapshotDeduplicator {
    prefix: usize,
    last_kept: Option<String>,
}

impl Default for SnapshotDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_FINGERPRINT_PREFIX)
    }
}

impl SnapshotDeduplicator {
    /// `prefix` is clamped to at least one code unit; a zero-length prefix
    /// would make every snapshot look identical.
    pub fn new(prefix: usize) -> Self {
        Self {
            prefix: prefix.max(1),
            last_kept: None,
        }
    }

    /// Keep `raw` unless it matches the last kept snapshot. A rejected
    /// snapshot leaves the stored fingerprint untouched.
    pub fn admit(&mut self, raw: String) -> Option<String> {
        let hash = fingerprint(&raw, self.prefix)?;
        if self.last_kept.as_deref() == Some(hash.as_str()) {
            debug!(fingerprint = %hash, "Duplicate snapshot detected, skipping");
            return None;
        }
        self.last_kept = Some(hash);
        Some(raw)
    }

    pub fn last_fingerprint(&self) -> Option<&str> {
        self.last_kept.as_deref()
    }

    pub fn reset(&mut self) {
        self.last_kept = None;
    }
}

/// Ask the provider for one snapshot of the active surface.
///
/// Every failure degrades to `None`: a step without a snapshot is still a step.
pub async fn capture_raw(backend: &dyn Backend) -> Option<String> {
    match backend.capture_visible().await {
        Ok(Some(raw)) => Some(raw),
        Ok(None) => {
            warn!("No active surface for snapshot");
            None
        }
        Err(e) => {
            error!("Snapshot capture failed: {}", e);
            None
        }
    }
}
