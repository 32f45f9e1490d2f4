//! Common CLI types shared across commands

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Table format - one row per record (default)
    #[default]
    Table,
    /// JSON format - structured for scripts/APIs
    Json,
}

/// Parse a `key=value` query parameter
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("status=open").unwrap(),
            ("status".to_string(), "open".to_string())
        );
        assert_eq!(
            parse_param("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_param("owner=").unwrap().1, "");
        assert!(parse_param("status").is_err());
        assert!(parse_param("=open").is_err());
    }
}
