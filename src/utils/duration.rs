// Elapsed-time formatting for stage logs

use std::time::Duration;

/// Format an elapsed time compactly: `850ms`, `42.3s`, `12m05s`, `3h07m12s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    if total_secs == 0 {
        return format!("{}ms", elapsed.as_millis());
    }
    if total_secs < 60 {
        return format!("{:.1}s", elapsed.as_secs_f64());
    }

    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    if hours > 0 {
        format!("{}h{:02}m{:02}s", hours, mins, secs)
    } else {
        format!("{}m{:02}s", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(850)), "850ms");
        assert_eq!(format_elapsed(Duration::from_millis(42_300)), "42.3s");
        assert_eq!(format_elapsed(Duration::from_secs(725)), "12m05s");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 7 * 60 + 12)), "3h07m12s");
    }
}
