//! Bundle version labels

/// Version used when nothing has been published yet
pub const INITIAL_VERSION: &str = "v1.0";

/// Increment the trailing counter of a `v<major>.<minor>` label.
///
/// A missing minor counts as zero, so `"v2"` becomes `"v2.1"`. A minor at
/// `u64::MAX` rolls over into the next major. Labels that do not parse fall
/// back to `INITIAL_VERSION`.
pub fn bump_version(current: &str) -> String {
    let trimmed = current.trim().trim_start_matches(['v', 'V']);
    let mut parts = trimmed.split('.');
    let major = parts.next().and_then(|p| p.parse::<u64>().ok());
    let minor = match parts.next() {
        None => Some(0),
        Some(p) => p.parse::<u64>().ok(),
    };
    match (major, minor) {
        (Some(major), Some(minor)) => match minor.checked_add(1) {
            Some(next) => format!("v{}.{}", major, next),
            None => major
                .checked_add(1)
                .map_or_else(|| INITIAL_VERSION.to_string(), |next| format!("v{}.0", next)),
        },
        _ => INITIAL_VERSION.to_string(),
    }
}
