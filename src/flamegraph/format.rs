const BYTE_UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

const DURATION_UNITS: [(u64, &str); 7] = [
    (86_400_000_000_000, "d"),
    (3_600_000_000_000, "h"),
    (60_000_000_000, "m"),
    (1_000_000_000, "s"),
    (1_000_000, "ms"),
    (1_000, "µs"),
    (1, "ns"),
];

/// `512 B`, `1.50 KiB`, `3.00 GiB`, ...
pub(super) fn bytes(n: u64) -> String {
    if n < 1024 {
        return format!("{} B", n);
    }
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < BYTE_UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, BYTE_UNITS[unit])
}

/// The two most significant non-zero parts of a duration given in nanoseconds, e.g. `3m 45s`.
pub(super) fn nanos(mut n: u64) -> String {
    if n == 0 {
        return "0ns".to_string();
    }
    let mut parts = Vec::with_capacity(2);
    for (size, unit) in DURATION_UNITS {
        let count = n / size;
        n %= size;
        if count > 0 {
            parts.push(format!("{}{}", count, unit));
            if parts.len() == 2 {
                break;
            }
        } else if !parts.is_empty() {
            // only adjacent parts are shown
            break;
        }
    }
    parts.join(" ")
}
