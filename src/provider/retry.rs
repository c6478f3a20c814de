use std::collections::HashMap;
use std::time::Duration;

use crate::http::find_header;

/// Parses a numeric `Retry-After` header (seconds, fractional values allowed).
///
/// HTTP-date values are ignored; vendors send the numeric form. The value is only
/// surfaced on [`crate::error::TornadoError::RateLimit`], never acted upon.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    let value = find_header(headers, "retry-after")?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}
