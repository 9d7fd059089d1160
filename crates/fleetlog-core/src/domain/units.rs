//! Byte-size conversions for log output.

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const TIB: f64 = 1024.0 * 1024.0 * 1024.0 * 1024.0;

/// Converts bytes to mebibytes.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / MIB
}

/// Converts bytes to gibibytes.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

/// Formats a byte count as a human-readable string with auto-scaling.
pub fn format_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if b < MIB {
        format!("{:.2} KB", b / KIB)
    } else if b < GIB {
        format!("{:.2} MB", b / MIB)
    } else if b < TIB {
        format!("{:.2} GB", b / GIB)
    } else {
        format!("{:.2} TB", b / TIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(bytes_to_mb(1_048_576), 1.0);
        assert_eq!(bytes_to_gb(1_073_741_824), 1.0);
    }

    #[test]
    fn format_scales_units() {
        assert_eq!(format_bytes(512), "0.50 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(100 * 1_048_576), "100.00 MB");
        assert_eq!(format_bytes(1_073_741_824), "1.00 GB");
        assert_eq!(format_bytes(5 * 1_099_511_627_776), "5.00 TB");
    }
}
