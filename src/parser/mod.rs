//! Output Parser (C2): turns raw subprocess stdout into rows without domain
//! knowledge. See spec §4.2.

use crate::artifacts::model::Row;
use serde_json::Value;

/// Attempt to parse `stdout` as structured (JSON) output. Returns `Some(rows)`
/// only if the top level is an object carrying a `rows` or `data` array.
pub fn parse_structured(stdout: &str) -> Option<Vec<Row>> {
    let value: Value = serde_json::from_str(stdout).ok()?;
    let array = value.get("rows").or_else(|| value.get("data"))?.as_array()?;

    let mut rows = Vec::with_capacity(array.len());
    for item in array {
        let obj = item.as_object()?;
        let mut row = Row::new();
        for (key, val) in obj {
            row.insert(key.clone(), value_to_string(val));
        }
        rows.push(row);
    }
    Some(rows)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse `stdout` as whitespace/tab-delimited tabular text. See spec §4.2 for
/// the header-detection and degenerate-row fallback rules.
pub fn parse_tabular(stdout: &str) -> Vec<Row> {
    let mut lines = stdout.lines().filter(|l| !l.trim().is_empty());

    let header_line = match lines.next() {
        Some(l) => l,
        None => return Vec::new(),
    };

    let mut headers: Vec<String> = header_line.split('\t').map(|h| h.trim().to_string()).collect();
    if headers.len() <= 1 || headers.iter().all(|h| h.is_empty()) {
        headers = header_line.split_whitespace().map(|h| h.to_string()).collect();
    }
    headers.retain(|h| !h.is_empty());
    if headers.is_empty() {
        return Vec::new();
    }

    let mut rows = Vec::new();
    for line in lines {
        let mut values: Vec<&str> = line.split('\t').map(|v| v.trim()).collect();
        if values.len() != headers.len() {
            values = line.split_whitespace().collect();
        }

        let mut row = Row::new();
        if values.len() == headers.len() {
            for (header, value) in headers.iter().zip(values.iter()) {
                row.insert(header.clone(), value.to_string());
            }
        } else {
            row.insert("raw".to_string(), line.trim().to_string());
            for (i, header) in headers.iter().enumerate() {
                if let Some(value) = values.get(i) {
                    row.insert(header.clone(), value.to_string());
                }
            }
        }
        rows.push(row);
    }
    rows
}

/// Row-count ceiling enforced by the Driver (spec §5 "row_limit_exceeded").
pub const MAX_ROWS_PER_PLUGIN: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_rows_key() {
        let stdout = r#"{"rows":[{"PID":"4","ImageFileName":"System"}]}"#;
        let rows = parse_structured(stdout).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("PID").unwrap(), "4");
    }

    #[test]
    fn structured_data_key() {
        let stdout = r#"{"data":[{"PID":"1"}]}"#;
        let rows = parse_structured(stdout).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn structured_rejects_non_list() {
        let stdout = r#"{"rows":"not-a-list"}"#;
        assert!(parse_structured(stdout).is_none());
    }

    #[test]
    fn tabular_tab_delimited() {
        let stdout = "PID\tImageFileName\n4\tSystem\n888\texplorer.exe\n";
        let rows = parse_tabular(stdout);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("PID").unwrap(), "4");
        assert_eq!(rows[1].get("ImageFileName").unwrap(), "explorer.exe");
    }

    #[test]
    fn tabular_whitespace_fallback_headers() {
        let stdout = "PID  ImageFileName\n4  System\n";
        let rows = parse_tabular(stdout);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("PID").unwrap(), "4");
    }

    #[test]
    fn tabular_degenerate_row_gets_raw_field() {
        let stdout = "PID\tName\tExtra\n4\tonly-two-fields\n";
        let rows = parse_tabular(stdout);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("raw").unwrap(), "4\tonly-two-fields");
    }

    #[test]
    fn tabular_skips_blank_lines() {
        let stdout = "PID\tName\n\n4\tSystem\n\n";
        let rows = parse_tabular(stdout);
        assert_eq!(rows.len(), 1);
    }
}
