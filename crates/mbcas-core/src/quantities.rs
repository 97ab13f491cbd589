//! Millicore parsing and formatting for the quantities that cross the
//! PodAllocation record boundary (`desiredCPURequest: "450m"` and friends).

/// Parse a CPU quantity string ("450m", "1", "0.5") into millicores.
pub fn parse_millicores(s: &str) -> Result<i64, String> {
    if let Some(m) = s.strip_suffix('m') {
        m.parse::<i64>()
            .map_err(|e| format!("invalid millicore value '{}': {}", s, e))
    } else if let Ok(cores) = s.parse::<f64>() {
        Ok((cores * 1000.0).round() as i64)
    } else {
        Err(format!("invalid CPU quantity format: {}", s))
    }
}

/// Format millicores back into the canonical `"<n>m"` string form used on
/// PodAllocation records.
pub fn format_millicores(mc: i64) -> String {
    format!("{}m", mc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millicore_suffix() {
        assert_eq!(parse_millicores("450m").unwrap(), 450);
        assert_eq!(parse_millicores("0m").unwrap(), 0);
    }

    #[test]
    fn parses_whole_and_fractional_cores() {
        assert_eq!(parse_millicores("1").unwrap(), 1000);
        assert_eq!(parse_millicores("0.5").unwrap(), 500);
        assert_eq!(parse_millicores("2.5").unwrap(), 2500);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_millicores("banana").is_err());
    }

    #[test]
    fn format_round_trips() {
        assert_eq!(format_millicores(450), "450m");
        assert_eq!(parse_millicores(&format_millicores(733)).unwrap(), 733);
    }
}
