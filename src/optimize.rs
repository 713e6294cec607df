//! Format-aware content sampling under a size budget.
//!
//! `optimize` extracts a bounded, representative excerpt from a standardized
//! document. The sampling shapes are deterministic on purpose: two runs over
//! identical input produce identical excerpts, which keeps model behavior
//! reproducible and makes fixtures stable. Whatever the per-format sampler
//! emits, a final head+tail truncation guarantees the budget.

use serde_json::Value;

use crate::document::{DocumentPayload, SheetData, StandardizedDocument};

const TRUNCATION_MARKER: &str = "\n\n... [content truncated due to size] ...\n\n";
const SHEET_KEYWORDS: [&str; 5] = ["summary", "data", "main", "overview", "total"];

/// Produce an excerpt of at most `max_chars` characters.
///
/// The bound holds for any `max_chars >= 1`: if the format-aware sample still
/// overflows, the first and last halves of the budget are kept around an
/// explicit truncation marker.
pub fn optimize(document: &StandardizedDocument, max_chars: usize) -> String {
    let sampled = match &document.payload {
        DocumentPayload::Markdown { data, .. } => sample_markdown(&data.full_text, max_chars),
        DocumentPayload::Csv { data, .. } => {
            sample_rows_table(&data.structure.headers, &data.rows)
        }
        DocumentPayload::Spreadsheet { data } => {
            sample_workbook(&data.sheet_names, &data.sheets)
        }
        DocumentPayload::Json { data, .. } => sample_json(data),
        DocumentPayload::Error { .. } => {
            "File format not fully supported for detailed content extraction".to_string()
        }
    };
    enforce_limit(sampled, max_chars)
}

fn enforce_limit(content: String, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content;
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars > marker_len + 1 {
        let half = (max_chars - marker_len) / 2;
        format!(
            "{}{}{}",
            prefix_chars(&content, half),
            TRUNCATION_MARKER,
            suffix_chars(&content, half)
        )
    } else {
        prefix_chars(&content, max_chars).to_string()
    }
}

fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((byte, _)) => &s[..byte],
        None => s,
    }
}

fn suffix_chars(s: &str, n: usize) -> &str {
    let total = s.chars().count();
    if n >= total {
        return s;
    }
    match s.char_indices().nth(total - n) {
        Some((byte, _)) => &s[byte..],
        None => s,
    }
}

// ---- Markdown ----

/// Verbatim when it fits; otherwise intro (first ~20%, cap 2000) + up to five
/// evenly spaced section samples (cap 1000 each, bounded by the next heading)
/// + conclusion (last ~10%, cap 1000). Documents without headings fall back
/// to three evenly spaced chunks.
fn sample_markdown(content: &str, max_chars: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    let len = chars.len();
    if len <= max_chars {
        return content.to_string();
    }

    let substring = |start: usize, end: usize| -> String {
        chars[start.min(len)..end.min(len)].iter().collect()
    };

    let intro_len = (len / 5).min(2000);
    let intro = substring(0, intro_len);

    let heading_positions = heading_char_positions(&chars);

    let mut sampled = String::new();
    if !heading_positions.is_empty() {
        let count = heading_positions.len().min(5);
        let step = (heading_positions.len() / count).max(1);
        for (taken, i) in (0..heading_positions.len()).step_by(step).enumerate() {
            if taken >= 5 {
                break;
            }
            let start = heading_positions[i];
            let next = heading_positions.get(i + 1).copied().unwrap_or(len);
            let section_len = 1000.min(next - start);
            sampled.push_str(&substring(start, start + section_len));
            sampled.push_str("\n...\n");
        }
    } else {
        let chunk = len / 3;
        for i in 0..3 {
            let start = i * chunk;
            sampled.push_str(&substring(start, start + 1000.min(chunk)));
            sampled.push_str("\n...\n");
        }
    }

    let conclusion_len = (len / 10).min(1000);
    let conclusion = substring(len - conclusion_len, len);

    format!("{intro}\n\n...\n[Content sampled due to size]\n...\n\n{sampled}\n...\n\n{conclusion}")
}

/// Char offsets of lines opening with an ATX heading marker.
fn heading_char_positions(chars: &[char]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut line_start = 0usize;
    let mut i = 0usize;
    while i <= chars.len() {
        if i == chars.len() || chars[i] == '\n' {
            let hashes = chars[line_start..i].iter().take_while(|c| **c == '#').count();
            if (1..=6).contains(&hashes) && chars.get(line_start + hashes).is_some_and(|c| c.is_whitespace()) {
                positions.push(line_start);
            }
            line_start = i + 1;
        }
        i += 1;
    }
    positions
}

// ---- Tabular ----

/// Header line, row count, first 10 rows; for tables over 30 rows also 5 rows
/// around the midpoint and the last rows.
fn sample_rows_table(headers: &[String], rows: &[serde_json::Map<String, Value>]) -> String {
    let mut out = String::new();
    if headers.is_empty() {
        out.push_str("Headers: None\n");
    } else {
        out.push_str(&format!("Headers: {}\n", headers.join(", ")));
    }

    if rows.is_empty() {
        return out;
    }
    out.push_str(&format!("Total rows: {}\n\n", rows.len()));

    let begin = 10.min(rows.len());
    out.push_str(&format!("Beginning sample ({begin} rows):\n"));
    for row in &rows[..begin] {
        out.push_str(&row_json(row));
        out.push('\n');
    }

    if rows.len() > 30 {
        let mid_start = rows.len() / 2 - 2;
        out.push_str(&format!("\nMiddle sample (rows {}-{}):\n", mid_start, mid_start + 4));
        for row in rows.iter().skip(mid_start).take(5) {
            out.push_str(&row_json(row));
            out.push('\n');
        }

        let end_start = (mid_start + 5).max(rows.len() - 5);
        out.push_str(&format!("\nEnd sample (last {} rows):\n", rows.len() - end_start));
        for row in &rows[end_start..] {
            out.push_str(&row_json(row));
            out.push('\n');
        }
    }
    out
}

fn row_json(row: &serde_json::Map<String, Value>) -> String {
    serde_json::to_string(row).unwrap_or_default()
}

// ---- Spreadsheet ----

/// List sheet names, sample up to three sheets (first, keyword-named, then
/// middle/last fill), and note anything omitted.
fn sample_workbook(sheet_names: &[String], sheets: &[SheetData]) -> String {
    let mut out = format!(
        "Excel file with {} sheets: {}\n\n",
        sheet_names.len(),
        sheet_names.join(", ")
    );

    let sample_cap = 3.min(sheet_names.len());
    let mut selected: Vec<&String> = Vec::new();
    if let Some(first) = sheet_names.first() {
        selected.push(first);
    }
    if sheet_names.len() > 1 {
        let keyword_sheets: Vec<&String> = sheet_names
            .iter()
            .filter(|name| {
                let lower = name.to_lowercase();
                SHEET_KEYWORDS.iter().any(|k| lower.contains(k))
            })
            .collect();
        for sheet in keyword_sheets.into_iter().take(2) {
            if !selected.contains(&sheet) {
                selected.push(sheet);
            }
        }
        if selected.len() < sample_cap && sheet_names.len() > 2 {
            let middle = &sheet_names[sheet_names.len() / 2];
            if !selected.contains(&middle) {
                selected.push(middle);
            }
        }
        if selected.len() < sample_cap {
            let last = &sheet_names[sheet_names.len() - 1];
            if !selected.contains(&last) {
                selected.push(last);
            }
        }
    }
    selected.truncate(sample_cap);

    for name in &selected {
        let Some(sheet) = sheets.iter().find(|s| s.name == **name) else {
            continue;
        };
        out.push_str(&format!("=== SHEET: {} ===\n", sheet.name));
        let rows = &sheet.records;
        if rows.is_empty() {
            out.push_str("Empty sheet\n");
        } else {
            out.push_str(&format!("Headers: {}\n", sheet.headers.join(", ")));
            out.push_str(&format!("Total rows: {}\n", rows.len()));

            let begin = 10.min(20.min(rows.len()));
            out.push_str(&format!("Sample (first {begin} rows):\n"));
            for row in &rows[..begin] {
                out.push_str(&row_json(row));
                out.push('\n');
            }

            if rows.len() > 20 {
                let mid = rows.len() / 2;
                out.push_str(&format!("Sample (middle rows {}-{}):\n", mid, mid + 4));
                for row in rows.iter().skip(mid).take(5) {
                    out.push_str(&row_json(row));
                    out.push('\n');
                }
                if rows.len() > begin + 5 {
                    out.push_str("Sample (last 5 rows):\n");
                    for row in &rows[rows.len() - 5..] {
                        out.push_str(&row_json(row));
                        out.push('\n');
                    }
                }
            }
        }
        out.push('\n');
    }

    if sheet_names.len() > selected.len() {
        out.push_str(&format!(
            "[{} additional sheets not shown]\n",
            sheet_names.len() - selected.len()
        ));
    }
    out
}

// ---- JSON ----

fn sample_json(data: &Value) -> String {
    match data {
        Value::Array(items) => {
            let mut out = format!("JSON array with {} items.\n", items.len());
            if !items.is_empty() {
                let sample_size = 5.min(items.len());
                out.push_str(&format!("Beginning items ({sample_size}):\n"));
                out.push_str(&pretty(&items[..sample_size]));
                out.push('\n');

                if items.len() > 15 {
                    let mid_start = items.len() / 2 - 1;
                    out.push_str(&format!("Middle items ({}-{}):\n", mid_start, mid_start + 2));
                    out.push_str(&pretty(&items[mid_start..(mid_start + 3).min(items.len())]));
                    out.push('\n');

                    let end_start = (mid_start + 3).max(items.len() - 3);
                    out.push_str(&format!("End items ({}-{}):\n", end_start, items.len() - 1));
                    out.push_str(&pretty(&items[end_start..]));
                    out.push('\n');
                }
            }
            out
        }
        Value::Object(map) => {
            let keys: Vec<&String> = map.keys().collect();
            let mut out = format!(
                "JSON object with {} keys: {}\n\n",
                keys.len(),
                keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
            );
            if !keys.is_empty() {
                let sample_size = keys.len().min(10);
                let sample: serde_json::Map<String, Value> = map
                    .iter()
                    .take(sample_size)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                out.push_str("Sample of content:\n");
                out.push_str(&pretty(&sample));
                if keys.len() > sample_size {
                    out.push_str(&format!(
                        "\n\n[{} more keys not shown]\n",
                        keys.len() - sample_size
                    ));
                }
            }
            out
        }
        other => format!("JSON value: {}", other),
    }
}

fn pretty<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
