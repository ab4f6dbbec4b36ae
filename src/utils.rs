use chrono::{DateTime, Utc};

/// Net volumes closer to zero than this are treated as flat.
pub(crate) const FLAT_EPSILON: f64 = 1e-9;

const MILLIS_PER_YEAR: f64 = 365.25 * 24.0 * 60.0 * 60.0 * 1000.0;

/// Milliseconds from `from` to `to`, negative if `to` is earlier.
pub(crate) fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    to.signed_duration_since(from).num_milliseconds()
}

/// Years from `from` to `to`.
pub(crate) fn years_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    millis_between(from, to) as f64 / MILLIS_PER_YEAR
}

/// Snaps float residue to zero.
pub(crate) fn snap_flat(value: f64) -> f64 {
    if value.abs() < FLAT_EPSILON { 0.0 } else { value }
}
