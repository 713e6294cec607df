//! CSV standardizer.
//!
//! Parses delimited text into header-keyed records with quoted-field support,
//! detects the delimiter from the header line, and runs column-type analysis
//! over the parsed rows.

use serde_json::Value;

use crate::document::{CsvData, DocumentPayload, StandardizedDocument, TableStructure};
use crate::meta::{DocumentMetadata, UploadedFile};
use crate::standardize::analyze_table;

const CANDIDATE_DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

pub fn standardize(file: &UploadedFile) -> StandardizedDocument {
    let metadata = DocumentMetadata::build(file, "csv");
    let content = file.text();

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return StandardizedDocument {
            metadata,
            payload: DocumentPayload::Csv {
                data: CsvData {
                    rows: Vec::new(),
                    structure: TableStructure {
                        headers: Vec::new(),
                        row_count: 0,
                        column_count: 0,
                        delimiter: ',',
                    },
                },
                analysis: Default::default(),
            },
        };
    }

    let delimiter = detect_delimiter(lines[0]);
    let headers: Vec<String> = split_line(lines[0], delimiter)
        .into_iter()
        .map(|h| h.trim_matches('"').to_string())
        .collect();

    let mut rows = Vec::with_capacity(lines.len() - 1);
    let mut column_values: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    for (row_index, line) in lines[1..].iter().enumerate() {
        let values = split_line(line, delimiter);
        let mut record = serde_json::Map::new();
        for (col, header) in headers.iter().enumerate() {
            let value = values.get(col).cloned().unwrap_or_default();
            column_values[col].push(value.clone());
            record.insert(header.clone(), Value::String(value));
        }
        record.insert(
            "_rowId".to_string(),
            Value::String(format!("row-{}", row_index)),
        );
        rows.push(record);
    }

    let analysis = analyze_table(&headers, &column_values);
    let row_count = rows.len();
    let column_count = headers.len();

    StandardizedDocument {
        metadata,
        payload: DocumentPayload::Csv {
            data: CsvData {
                rows,
                structure: TableStructure {
                    headers,
                    row_count,
                    column_count,
                    delimiter,
                },
            },
            analysis,
        },
    }
}

/// Pick the candidate delimiter that occurs most often in the header line,
/// counting only occurrences outside quoted spans. Ties and zero counts fall
/// back to a comma.
fn detect_delimiter(first_line: &str) -> char {
    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    let chars: Vec<char> = first_line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            if in_quotes && chars.get(i + 1) == Some(&'"') {
                i += 1;
            } else {
                in_quotes = !in_quotes;
            }
        } else if !in_quotes {
            if let Some(pos) = CANDIDATE_DELIMITERS.iter().position(|d| *d == c) {
                counts[pos] += 1;
            }
        }
        i += 1;
    }

    let mut best = ',';
    let mut best_count = 0;
    for (pos, delimiter) in CANDIDATE_DELIMITERS.iter().enumerate() {
        if counts[pos] > best_count {
            best_count = counts[pos];
            best = *delimiter;
        }
    }
    best
}

/// Split one line on the delimiter, honouring double-quoted fields with `""`
/// escapes. Values are trimmed.
fn split_line(line: &str, delimiter: char) -> Vec<String> {
    if !line.contains('"') {
        return line.split(delimiter).map(|v| v.trim().to_string()).collect();
    }

    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            if in_quotes && chars.get(i + 1) == Some(&'"') {
                current.push('"');
                i += 1;
            } else {
                in_quotes = !in_quotes;
            }
        } else if c == delimiter && !in_quotes {
            values.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
        i += 1;
    }
    values.push(current.trim().to_string());
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ColumnType;

    fn csv(content: &str) -> StandardizedDocument {
        standardize(&UploadedFile::from_bytes("t.csv", content.as_bytes().to_vec()))
    }

    #[test]
    fn parses_simple_table_with_row_ids() {
        let doc = csv("a,b\n1,2\n3,4\n");
        match doc.payload {
            DocumentPayload::Csv { data, analysis } => {
                assert_eq!(data.structure.headers, vec!["a", "b"]);
                assert_eq!(data.structure.row_count, 2);
                assert_eq!(data.structure.delimiter, ',');
                assert_eq!(data.rows[0]["a"], "1");
                assert_eq!(data.rows[0]["_rowId"], "row-0");
                assert_eq!(data.rows[1]["_rowId"], "row-1");
                assert_eq!(analysis.columns["a"].inferred_type, ColumnType::Numeric);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn detects_semicolon_delimiter() {
        let doc = csv("name;city\nAda;London\n");
        match doc.payload {
            DocumentPayload::Csv { data, .. } => {
                assert_eq!(data.structure.delimiter, ';');
                assert_eq!(data.rows[0]["city"], "London");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn quoted_fields_keep_embedded_delimiters_and_escaped_quotes() {
        let doc = csv("a,b\n\"x,y\",\"he said \"\"hi\"\"\"\n");
        match doc.payload {
            DocumentPayload::Csv { data, .. } => {
                assert_eq!(data.rows[0]["a"], "x,y");
                assert_eq!(data.rows[0]["b"], "he said \"hi\"");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn short_rows_pad_with_empty_strings() {
        let doc = csv("a,b,c\n1,2\n");
        match doc.payload {
            DocumentPayload::Csv { data, .. } => {
                assert_eq!(data.rows[0]["c"], "");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn empty_content_yields_empty_table() {
        let doc = csv("   \n  \n");
        match doc.payload {
            DocumentPayload::Csv { data, .. } => {
                assert!(data.rows.is_empty());
                assert_eq!(data.structure.column_count, 0);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn quoted_header_line_ignores_quoted_delimiters() {
        assert_eq!(detect_delimiter("\"a;b\";c;d"), ';');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("plain"), ',');
    }
}
