//! Table output formatting

use serde_json::Value;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Rows},
};

/// One field of a single record
#[derive(Debug, Tabled)]
struct FieldRow {
    #[tabled(rename = "FIELD")]
    field: String,
    #[tabled(rename = "VALUE")]
    value: String,
}

/// Format data as a table
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new(data);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    table.to_string()
}

/// Format one JSON record as a field/value table.
///
/// Arrays of objects fall back to one table row per field of each element;
/// scalars are printed as-is.
pub fn format_record(record: &Value) -> String {
    match record {
        Value::Object(map) => {
            let rows: Vec<FieldRow> = map
                .iter()
                .map(|(field, value)| FieldRow {
                    field: field.clone(),
                    value: scalar_text(value),
                })
                .collect();
            format_table(&rows)
        }
        Value::Array(items) if items.is_empty() => "No results found.".to_string(),
        Value::Array(items) => items
            .iter()
            .map(format_record)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => "(no content)".to_string(),
        other => scalar_text(other),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Tabled)]
    struct TestRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "TITLE")]
        title: String,
    }

    #[test]
    fn test_format_table_empty() {
        let items: Vec<TestRow> = vec![];
        let result = format_table(&items);
        assert_eq!(result, "No results found.");
    }

    #[test]
    fn test_format_table_single_row() {
        let items = vec![TestRow {
            id: "123".to_string(),
            title: "Phishing".to_string(),
        }];

        let result = format_table(&items);

        assert!(result.contains("ID"));
        assert!(result.contains("TITLE"));
        assert!(result.contains("123"));
        assert!(result.contains("Phishing"));
    }

    #[test]
    fn test_format_table_multiple_rows() {
        let items = vec![
            TestRow {
                id: "1".to_string(),
                title: "Vendor breach".to_string(),
            },
            TestRow {
                id: "2".to_string(),
                title: "Insider threat".to_string(),
            },
        ];

        let result = format_table(&items);

        assert!(result.contains("Vendor breach"));
        assert!(result.contains("Insider threat"));
    }

    #[test]
    fn test_format_table_uses_rounded_style() {
        let items = vec![TestRow {
            id: "1".to_string(),
            title: "Phishing".to_string(),
        }];

        let result = format_table(&items);

        // Rounded style uses ╭ for top-left corner
        assert!(result.contains("╭"));
        assert!(result.contains("╰"));
    }

    #[test]
    fn test_format_record_fields() {
        let record = serde_json::json!({"id": 3, "title": "Phishing", "owner": null});
        let result = format_record(&record);
        assert!(result.contains("FIELD"));
        assert!(result.contains("title"));
        assert!(result.contains("Phishing"));
        assert!(result.contains("owner"));
    }

    #[test]
    fn test_format_record_scalars() {
        assert_eq!(format_record(&Value::Null), "(no content)");
        assert_eq!(format_record(&serde_json::json!("ok")), "ok");
        assert_eq!(format_record(&serde_json::json!([])), "No results found.");
    }
}
