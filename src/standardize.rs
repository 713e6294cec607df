//! Standardization dispatch and shared column-type inference.
//!
//! `standardize` selects the per-format standardizer by file extension and
//! never fails for malformed content: parse problems become a document with
//! `format = "error"`. Only I/O failures (a file that cannot be read at all)
//! are reported as errors, and those happen before this layer.

use std::collections::BTreeMap;

use crate::document::{
    ColumnProfile, ColumnStatistics, ColumnType, DocumentPayload, StandardizedDocument,
    TableAnalysis,
};
use crate::meta::{DocumentMetadata, UploadedFile};
use crate::{standardize_csv, standardize_json, standardize_markdown, standardize_sheet};

/// Convert an uploaded file into its normalized representation.
///
/// Unsupported extensions yield an error-format document rather than a
/// failure; the file is simply excluded from context assembly downstream.
pub fn standardize(file: &UploadedFile) -> StandardizedDocument {
    match file.extension.as_str() {
        "csv" => standardize_csv::standardize(file),
        "xlsx" | "xls" => standardize_sheet::standardize(file),
        "md" => standardize_markdown::standardize(file),
        "json" => standardize_json::standardize(file),
        other => StandardizedDocument {
            metadata: DocumentMetadata::build(file, "error"),
            payload: DocumentPayload::Error {
                error: format!("Unsupported file type: {}", other),
            },
        },
    }
}

/// Fraction of sampled values that must match a pattern before a column is
/// committed to a non-string type.
const TYPE_CONFIDENCE_THRESHOLD: f64 = 0.9;

/// Maximum distinct values for which a string column keeps a full frequency
/// distribution.
const MAX_FREQUENCY_VALUES: usize = 20;

/// Infer per-column types and statistics for a table given its headers and
/// the cell values of each column. Shared by the CSV and spreadsheet
/// standardizers so both report the same analysis shape.
pub fn analyze_table(headers: &[String], column_values: &[Vec<String>]) -> TableAnalysis {
    let mut columns = BTreeMap::new();
    let row_count = column_values.first().map(|c| c.len()).unwrap_or(0);

    for (header, values) in headers.iter().zip(column_values) {
        let non_empty: Vec<&str> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        let (inferred_type, confidence) = infer_column_type(&non_empty);
        let statistics = column_statistics(inferred_type, &non_empty);
        columns.insert(
            header.clone(),
            ColumnProfile {
                inferred_type,
                confidence,
                statistics,
            },
        );
    }

    TableAnalysis {
        columns,
        total_rows: row_count,
        total_columns: headers.len(),
    }
}

/// Infer the dominant type of a column from its non-empty values.
pub fn infer_column_type(values: &[&str]) -> (ColumnType, f64) {
    if values.is_empty() {
        return (ColumnType::Empty, 1.0);
    }

    let mut numeric = 0usize;
    let mut date = 0usize;
    let mut boolean = 0usize;

    for value in values {
        let lower = value.to_lowercase();
        if is_numeric(&lower) {
            numeric += 1;
        }
        if is_date(&lower) {
            date += 1;
        }
        if is_boolean(&lower) {
            boolean += 1;
        }
    }

    let total = values.len() as f64;
    let numeric_share = numeric as f64 / total;
    let date_share = date as f64 / total;
    let boolean_share = boolean as f64 / total;

    if numeric_share > TYPE_CONFIDENCE_THRESHOLD {
        (ColumnType::Numeric, numeric_share)
    } else if date_share > TYPE_CONFIDENCE_THRESHOLD {
        (ColumnType::Date, date_share)
    } else if boolean_share > TYPE_CONFIDENCE_THRESHOLD {
        (ColumnType::Boolean, boolean_share)
    } else {
        (ColumnType::String, 1.0)
    }
}

fn is_numeric(value: &str) -> bool {
    let mut chars = value.chars();
    let mut rest: &str = value;
    if let Some('-') = chars.next() {
        rest = &value[1..];
    }
    if rest.is_empty() {
        return false;
    }
    let mut dot_seen = false;
    let mut digits = 0usize;
    for c in rest.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' if !dot_seen && digits > 0 => dot_seen = true,
            _ => return false,
        }
    }
    digits > 0 && !rest.ends_with('.')
}

fn is_date(value: &str) -> bool {
    // yyyy-mm-dd / yyyy/mm/dd / dd-mm-yyyy / dd/mm/yyyy
    for sep in ['-', '/'] {
        let parts: Vec<&str> = value.split(sep).collect();
        if parts.len() == 3 && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
            let ymd = parts[0].len() == 4 && (1..=2).contains(&parts[1].len()) && (1..=2).contains(&parts[2].len());
            let dmy = parts[2].len() == 4 && (1..=2).contains(&parts[0].len()) && (1..=2).contains(&parts[1].len());
            if ymd || dmy {
                return true;
            }
        }
    }
    false
}

fn is_boolean(value: &str) -> bool {
    matches!(value, "true" | "false" | "yes" | "no" | "1" | "0" | "y" | "n")
}

fn column_statistics(inferred_type: ColumnType, values: &[&str]) -> ColumnStatistics {
    match inferred_type {
        ColumnType::Numeric => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.parse::<f64>().ok()).collect();
            if numbers.is_empty() {
                return ColumnStatistics::None {};
            }
            let sum: f64 = numbers.iter().sum();
            let min = numbers.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            ColumnStatistics::Numeric {
                min,
                max,
                avg: sum / numbers.len() as f64,
                sum,
            }
        }
        ColumnType::String => {
            let mut frequency: BTreeMap<String, u64> = BTreeMap::new();
            for value in values {
                *frequency.entry((*value).to_string()).or_insert(0) += 1;
            }
            let unique_value_count = frequency.len();
            ColumnStatistics::Text {
                unique_value_count,
                value_frequency: (unique_value_count <= MAX_FREQUENCY_VALUES)
                    .then_some(frequency),
                min_length: values.iter().map(|v| v.len()).min().unwrap_or(0),
                max_length: values.iter().map(|v| v.len()).max().unwrap_or(0),
            }
        }
        _ => ColumnStatistics::None {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_is_error_format() {
        let file = UploadedFile::from_bytes("report.pdf", vec![1, 2, 3]);
        let doc = standardize(&file);
        assert_eq!(doc.format(), "error");
        match doc.payload {
            DocumentPayload::Error { error } => assert!(error.contains("pdf")),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn standardization_is_pure_in_content() {
        let file = UploadedFile::from_bytes("t.csv", b"a,b\n1,2\n3,4\n".to_vec());
        let first = standardize(&file);
        let second = standardize(&file);
        // Ids and timestamps differ; data and analysis do not.
        assert_eq!(
            serde_json::to_value(&first.payload).unwrap(),
            serde_json::to_value(&second.payload).unwrap()
        );
    }

    #[test]
    fn numeric_column_wins_above_threshold() {
        let values = vec!["1", "2", "3.5", "-4", "5", "6", "7", "8", "9", "10"];
        let (ty, confidence) = infer_column_type(&values);
        assert_eq!(ty, ColumnType::Numeric);
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn mixed_column_falls_back_to_string() {
        let values = vec!["1", "2", "apple", "4", "5", "pear", "7", "8", "9", "10"];
        let (ty, _) = infer_column_type(&values);
        assert_eq!(ty, ColumnType::String);
    }

    #[test]
    fn empty_column_is_empty_type() {
        let (ty, confidence) = infer_column_type(&[]);
        assert_eq!(ty, ColumnType::Empty);
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn date_detection_accepts_both_orders() {
        assert!(is_date("2024-01-31"));
        assert!(is_date("31/01/2024"));
        assert!(!is_date("2024-01"));
        assert!(!is_date("abc-def-ghij"));
    }

    #[test]
    fn numeric_detection_rejects_trailing_dot() {
        assert!(is_numeric("-12.5"));
        assert!(is_numeric("0"));
        assert!(!is_numeric("12."));
        assert!(!is_numeric(".5"));
        assert!(!is_numeric("1e5"));
    }

    #[test]
    fn numeric_statistics() {
        let analysis = analyze_table(
            &["n".to_string()],
            &[vec!["1".into(), "2".into(), "3".into()]],
        );
        let profile = &analysis.columns["n"];
        match &profile.statistics {
            ColumnStatistics::Numeric { min, max, avg, sum } => {
                assert_eq!(*min, 1.0);
                assert_eq!(*max, 3.0);
                assert_eq!(*avg, 2.0);
                assert_eq!(*sum, 6.0);
            }
            other => panic!("unexpected statistics: {:?}", other),
        }
    }

    #[test]
    fn string_frequency_omitted_above_cutoff() {
        let values: Vec<String> = (0..25).map(|i| format!("v{}", i)).collect();
        let analysis = analyze_table(&["s".to_string()], &[values]);
        match &analysis.columns["s"].statistics {
            ColumnStatistics::Text {
                unique_value_count,
                value_frequency,
                ..
            } => {
                assert_eq!(*unique_value_count, 25);
                assert!(value_frequency.is_none());
            }
            other => panic!("unexpected statistics: {:?}", other),
        }
    }
}
