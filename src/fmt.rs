//! Provides helpers to parse and render byte sizes and short durations.
//!
//! Cache budgets are configured as human readable sizes (e.g. `64m`) and the statistics of a
//! group are rendered the same way, therefore these helpers are shared by
//! [config](crate::config) and [stats](crate::stats).
use std::fmt::Write;

const UNITS: [&str; 6] = ["Bytes", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Writes a human readable representation of the given byte size into the given output.
///
/// Sizes up to 1023 bytes are written as plain bytes, larger sizes are scaled to the largest
/// binary unit (up to PiB) which keeps the value above 1.
pub fn format_bytes(size_in_bytes: usize, f: &mut dyn Write) -> std::fmt::Result {
    match size_in_bytes {
        1 => return write!(f, "1 byte"),
        n if n < 1024 => return write!(f, "{} bytes", n),
        _ => (),
    }

    let mut unit = 0;
    let mut size = size_in_bytes as f64;
    while size > 1024. && unit < UNITS.len() - 1 {
        size /= 1024.;
        unit += 1;
    }

    if size <= 10. {
        write!(f, "{:.2} {}", size, UNITS[unit])
    } else if size <= 100. {
        write!(f, "{:.1} {}", size, UNITS[unit])
    } else {
        write!(f, "{:.0} {}", size, UNITS[unit])
    }
}

/// Returns a human readable representation of the given byte size.
///
/// # Examples
///
/// ```
/// assert_eq!(peercache::fmt::format_size(0), "0 bytes");
/// assert_eq!(peercache::fmt::format_size(1), "1 byte");
/// assert_eq!(peercache::fmt::format_size(100), "100 bytes");
/// assert_eq!(peercache::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(peercache::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(peercache::fmt::format_size(8_734_000), "8.33 MiB");
/// assert_eq!(peercache::fmt::format_size(8_734_000_000), "8.13 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    let mut result = String::new();
    let _ = format_bytes(size_in_bytes, &mut result);

    result
}

/// Returns a concise representation of a duration given in microseconds.
///
/// # Examples
///
/// ```
/// assert_eq!(peercache::fmt::format_short_duration(100), "100 us");
/// assert_eq!(peercache::fmt::format_short_duration(8_192), "8.19 ms");
/// assert_eq!(peercache::fmt::format_short_duration(128_123), "128 ms");
/// assert_eq!(peercache::fmt::format_short_duration(1_128_123), "1.13 s");
/// assert_eq!(peercache::fmt::format_short_duration(101_000_000), "101 s");
/// ```
pub fn format_short_duration(micros: u64) -> String {
    let mut result = String::new();
    let _ = match micros {
        0..=999 => write!(result, "{} us", micros),
        1_000..=9_999 => write!(result, "{:.2} ms", micros as f64 / 1_000.),
        10_000..=99_999 => write!(result, "{:.1} ms", micros as f64 / 1_000.),
        100_000..=999_999 => write!(result, "{} ms", micros / 1_000),
        1_000_000..=9_999_999 => write!(result, "{:.2} s", micros as f64 / 1_000_000.),
        10_000_000..=99_999_999 => write!(result, "{:.1} s", micros as f64 / 1_000_000.),
        _ => write!(result, "{} s", micros / 1_000_000),
    };

    result
}

/// Parses a byte size like `512`, `8k` or `64 M`.
///
/// Accepted suffixes (case insensitive) are **b** (bytes), **k** (KiB), **m** (MiB), **g** (GiB)
/// and **t** (TiB). Decimal or negative numbers as well as unknown suffixes are rejected.
///
/// # Examples
///
/// ```
/// assert_eq!(peercache::fmt::parse_size("100").unwrap(), 100);
/// assert_eq!(peercache::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(peercache::fmt::parse_size("8k").unwrap(), 8192);
/// assert_eq!(peercache::fmt::parse_size("4 G").unwrap(), 4 * 1024 * 1024 * 1024);
///
/// assert_eq!(peercache::fmt::parse_size("3 Y").is_err(), true);
/// assert_eq!(peercache::fmt::parse_size("1.2g").is_err(), true);
/// assert_eq!(peercache::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(str: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref SIZE_EXPRESSION: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *([bBkKmMgGtT]?) *$").unwrap();
    }

    let captures = SIZE_EXPRESSION.captures(str.as_ref()).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a size. Expected a positive number and optionally \
             'b', 'k', 'm', 'g' or 't' as suffix.",
            str.as_ref()
        )
    })?;

    let number = captures[1].parse::<usize>()?;
    let shift = match captures[2].to_ascii_lowercase().as_str() {
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        _ => 0,
    };

    number
        .checked_mul(1 << shift)
        .ok_or_else(|| anyhow::anyhow!("The size '{}' is too large.", str.as_ref()))
}
