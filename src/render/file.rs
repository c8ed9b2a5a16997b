//! Byte-range and cache-validator helpers for file responses.

use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of interpreting a `Range` header against a resource size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Serve the whole resource (no header, or a form we do not honour).
    Full,
    /// Inclusive `start..=end`.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Interpret a `Range: bytes=...` header.
///
/// Only a single range is honoured; multi-range requests get the full body,
/// which clients must accept.
#[must_use]
pub fn parse_range(header: &str, size: u64) -> ByteRange {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return ByteRange::Unsatisfiable;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // suffix range: the last N bytes
        return match last.parse::<u64>() {
            Ok(0) | Err(_) => ByteRange::Unsatisfiable,
            Ok(_) if size == 0 => ByteRange::Unsatisfiable,
            Ok(n) => ByteRange::Partial {
                start: size.saturating_sub(n),
                end: size - 1,
            },
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return ByteRange::Unsatisfiable;
    };
    if start >= size {
        return ByteRange::Unsatisfiable;
    }
    let end = if last.is_empty() {
        size - 1
    } else {
        match last.parse::<u64>() {
            Ok(e) if e >= start => e.min(size - 1),
            _ => return ByteRange::Unsatisfiable,
        }
    };
    ByteRange::Partial { start, end }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// `If-Modified-Since` check at HTTP-date (whole second) precision.
#[must_use]
pub fn not_modified(modified: SystemTime, if_modified_since: Option<&str>) -> bool {
    if_modified_since
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .is_some_and(|since| unix_secs(modified) <= unix_secs(since))
}
