// src/format.rs
//
// Human-readable byte counts for throughput reporting.

/// Format a byte count using binary (KiB, MiB, ...) or SI (kB, MB, ...) units.
///
/// Counts below one unit are printed as whole bytes ("512 B"), everything else
/// with one decimal place ("1.5 KiB").
pub fn human_readable_bytes(bytes: u64, si: bool) -> String {
    let unit: u64 = if si { 1000 } else { 1024 };
    if bytes < unit {
        return format!("{} B", bytes);
    }

    let prefixes: &[u8] = if si { b"kMGTPE" } else { b"KMGTPE" };
    let mut exp = 0usize;
    let mut scaled = bytes as f64;
    while scaled >= unit as f64 && exp < prefixes.len() {
        scaled /= unit as f64;
        exp += 1;
    }

    let prefix = prefixes[exp - 1] as char;
    let suffix = if si { "" } else { "i" };
    format!("{:.1} {}{}B", scaled, prefix, suffix)
}
