//! Human-readable size parsing and formatting
//!
//! Sizes in the configuration use binary prefixes (1 KB = 1024 bytes), so
//! `"2GB"` means 2 GiB. Parsing is case-insensitive and tolerates
//! whitespace between number and unit.

use tracing::warn;

/// Parses a size string like `"5MB"` or `"2 gb"` into bytes.
///
/// Returns `default` when the string is empty, malformed, or uses an
/// unsupported unit.
pub fn parse_size(size_str: &str, default: u64) -> u64 {
    let raw = size_str.trim().to_ascii_uppercase();
    if raw.is_empty() {
        return default;
    }

    let digits_end = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(digits_end);
    let unit = unit.trim();

    let value: u64 = match number.parse() {
        Ok(v) if v > 0 => v,
        _ => {
            warn!("invalid size value in '{size_str}', using default");
            return default;
        }
    };

    let multiplier: u64 = match unit {
        "" | "B" => 1,
        "KB" => 1 << 10,
        "MB" => 1 << 20,
        "GB" => 1 << 30,
        "TB" => 1 << 40,
        _ => {
            warn!("unsupported size unit '{unit}' in '{size_str}', using default");
            return default;
        }
    };

    value.saturating_mul(multiplier)
}

/// Formats a byte count with binary units for log output.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_units() {
        assert_eq!(parse_size("5MB", 0), 5 * 1024 * 1024);
        assert_eq!(parse_size("2GB", 0), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("512", 0), 512);
        assert_eq!(parse_size("10 kb", 0), 10 * 1024);
    }

    #[test]
    fn falls_back_on_garbage() {
        assert_eq!(parse_size("", 42), 42);
        assert_eq!(parse_size("abc", 42), 42);
        assert_eq!(parse_size("0MB", 42), 42);
        assert_eq!(parse_size("5XB", 42), 42);
    }

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(100), "100 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(104_857_600), "100.00 MB");
    }
}
