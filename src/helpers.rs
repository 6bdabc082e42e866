use chrono::{DateTime, Utc};

/// Parses a Kubernetes CPU quantity ("4", "3500m", "0.5") into cores.
pub fn parse_cpu(q: &str) -> Option<f64> {
    let q = q.trim();
    if let Some(milli) = q.strip_suffix('m') {
        return milli.parse::<f64>().ok().map(|m| m / 1000.0);
    }
    q.parse::<f64>().ok()
}

/// Parses a Kubernetes memory quantity ("16Gi", "16000000Ki", "512M") into bytes.
pub fn parse_memory(q: &str) -> Option<f64> {
    const SUFFIXES: [(&str, f64); 8] = [
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", 1024.0 * 1024.0 * 1024.0),
        ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("K", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
    ];
    let q = q.trim();
    for (suffix, mult) in SUFFIXES {
        if let Some(n) = q.strip_suffix(suffix) {
            return n.parse::<f64>().ok().map(|v| v * mult);
        }
    }
    q.parse::<f64>().ok()
}

/// Percentage of `capacity` that is not `allocatable`, clamped to 0..=100.
pub fn reserved_percent(capacity: f64, allocatable: f64) -> Option<f64> {
    if capacity <= 0.0 {
        return None;
    }
    Some(((capacity - allocatable) / capacity * 100.0).clamp(0.0, 100.0))
}

pub fn level_marker(value: f64, warning: f64, critical: f64) -> &'static str {
    if value >= critical {
        "🔴"
    } else if value >= warning {
        "🟡"
    } else {
        "🟢"
    }
}

pub fn human_time(t: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let t = match t {
        Some(t) => t,
        None => return "never".to_string(),
    };

    let secs = (now - t).num_seconds();
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        let m = secs / 60;
        if m == 1 {
            "1 minute ago".to_string()
        } else {
            format!("{} minutes ago", m)
        }
    } else if secs < 86400 {
        let h = secs / 3600;
        if h == 1 {
            "1 hour ago".to_string()
        } else {
            format!("{} hours ago", h)
        }
    } else {
        t.format("%b %e, %Y %H:%M").to_string()
    }
}

/// Renders up to `limit` lines and a trailing "... and N more" line.
pub fn capped_lines<I, S>(items: I, limit: usize, prefix: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    let mut total = 0;
    for item in items {
        if total < limit {
            out.push_str(prefix);
            out.push_str(item.as_ref());
            out.push('\n');
        }
        total += 1;
    }
    if total > limit {
        out.push_str(&format!("... and {} more\n", total - limit));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test_case("4", Some(4.0); "whole cores")]
    #[test_case("15500m", Some(15.5); "millicores")]
    #[test_case("0.5", Some(0.5); "fraction")]
    #[test_case("lots", None; "garbage")]
    fn cpu_quantities(q: &str, expected: Option<f64>) {
        assert_eq!(parse_cpu(q), expected);
    }

    #[test_case("1Ki", Some(1024.0); "kibibytes")]
    #[test_case("2Gi", Some(2.0 * 1024.0 * 1024.0 * 1024.0); "gibibytes")]
    #[test_case("512M", Some(512e6); "megabytes")]
    #[test_case("1000", Some(1000.0); "plain bytes")]
    #[test_case("x1Mi", None; "garbage")]
    fn memory_quantities(q: &str, expected: Option<f64>) {
        assert_eq!(parse_memory(q), expected);
    }

    #[test]
    fn reserved_percent_clamps() {
        assert_eq!(reserved_percent(4.0, 3.0), Some(25.0));
        assert_eq!(reserved_percent(4.0, 5.0), Some(0.0));
        assert_eq!(reserved_percent(0.0, 1.0), None);
    }

    #[test]
    fn level_markers() {
        assert_eq!(level_marker(10.0, 50.0, 80.0), "🟢");
        assert_eq!(level_marker(60.0, 50.0, 80.0), "🟡");
        assert_eq!(level_marker(80.0, 50.0, 80.0), "🔴");
    }

    #[test]
    fn human_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(human_time(None, now), "never");
        assert_eq!(human_time(Some(now), now), "just now");
        assert_eq!(human_time(Some(now - chrono::Duration::minutes(5)), now), "5 minutes ago");
        assert_eq!(human_time(Some(now - chrono::Duration::hours(1)), now), "1 hour ago");
    }

    #[test]
    fn capped_lines_reports_overflow() {
        let out = capped_lines(["a", "b", "c"], 2, "• ");
        assert_eq!(out, "• a\n• b\n... and 1 more\n");
        assert_eq!(capped_lines(["a"], 2, "- "), "- a\n");
    }
}
