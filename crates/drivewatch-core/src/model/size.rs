/// Human-readable capacity strings for drive sizes.
///
/// Sizes stay `u64` bytes everywhere; floating point only appears here, at
/// the display boundary.

/// Binary units with the short labels people expect from a drive list.
const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

/// Format a byte count, e.g. `31020957696` -> `"28.89 GB"`.
///
/// KB and MB get one decimal, larger units two.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }

    if unit < 2 {
        format!("{value:.1} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
