//! Core data model for standardized documents.
//!
//! Every supported input format is normalized into a [`StandardizedDocument`]:
//! a metadata envelope plus a format-tagged payload. The payload is a proper
//! tagged union so the content optimizer's dispatch is exhaustive — a new
//! format cannot be added without the compiler pointing at every place that
//! must handle it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::meta::DocumentMetadata;

/// The normalized representation produced from any supported input file.
///
/// Immutable after creation. A parse failure is a valid terminal state
/// ([`DocumentPayload::Error`]), not an exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardizedDocument {
    pub metadata: DocumentMetadata,
    #[serde(flatten)]
    pub payload: DocumentPayload,
}

impl StandardizedDocument {
    /// The filename from the metadata envelope.
    pub fn name(&self) -> &str {
        &self.metadata.filename
    }

    /// Format tag as it appears on the wire.
    pub fn format(&self) -> &'static str {
        match self.payload {
            DocumentPayload::Csv { .. } => "csv",
            DocumentPayload::Spreadsheet { .. } => "tabular-excel",
            DocumentPayload::Markdown { .. } => "markdown",
            DocumentPayload::Json { .. } => "json",
            DocumentPayload::Error { .. } => "error",
        }
    }

    /// Whether standardization failed. Errored documents are excluded from
    /// context assembly.
    pub fn is_error(&self) -> bool {
        matches!(self.payload, DocumentPayload::Error { .. })
    }
}

/// Format-specific payload, discriminated by the `format` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum DocumentPayload {
    #[serde(rename = "csv")]
    Csv {
        data: CsvData,
        analysis: TableAnalysis,
    },
    #[serde(rename = "tabular-excel")]
    Spreadsheet { data: SpreadsheetData },
    #[serde(rename = "markdown")]
    Markdown {
        data: MarkdownData,
        statistics: MarkdownStatistics,
    },
    #[serde(rename = "json")]
    Json {
        data: Value,
        structure: JsonStructure,
    },
    #[serde(rename = "error")]
    Error { error: String },
}

// ---- CSV ----

/// Parsed CSV content: one record per row, keyed by header, plus structural
/// facts about the table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsvData {
    pub rows: Vec<serde_json::Map<String, Value>>,
    pub structure: TableStructure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableStructure {
    pub headers: Vec<String>,
    pub row_count: usize,
    pub column_count: usize,
    pub delimiter: char,
}

/// Per-column type inference and statistics for tabular data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TableAnalysis {
    pub columns: BTreeMap<String, ColumnProfile>,
    pub total_rows: usize,
    pub total_columns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnProfile {
    pub inferred_type: ColumnType,
    pub confidence: f64,
    pub statistics: ColumnStatistics,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    String,
    Date,
    Boolean,
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ColumnStatistics {
    Numeric {
        min: f64,
        max: f64,
        avg: f64,
        sum: f64,
    },
    Text {
        unique_value_count: usize,
        /// Present only when the column has at most 20 distinct values.
        value_frequency: Option<BTreeMap<String, u64>>,
        min_length: usize,
        max_length: usize,
    },
    None {},
}

// ---- Spreadsheet ----

/// Parsed workbook: ordered sheets with dimensions, records, raw cells, and
/// any formulas. Column analysis is computed for the first sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadsheetData {
    pub sheet_names: Vec<String>,
    pub sheets: Vec<SheetData>,
    pub active_sheet: Option<String>,
    pub total_sheets: usize,
    /// Column analysis for the first sheet only.
    pub analysis: Option<TableAnalysis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetData {
    pub name: String,
    pub headers: Vec<String>,
    pub dimensions: SheetDimensions,
    /// Row-major records, header row as keys.
    pub records: Vec<serde_json::Map<String, Value>>,
    /// Header-less 2-D cell values, including the header row.
    pub raw: Vec<Vec<Value>>,
    /// A1-style cell reference to formula text, when the sheet has formulas.
    pub formulas: Option<BTreeMap<String, String>>,
}

/// Decoded cell range of one sheet. `total_rows`/`total_cols` always equal
/// the extent of the declared range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SheetDimensions {
    pub start_row: u32,
    pub end_row: u32,
    pub start_col: u32,
    pub end_col: u32,
    pub total_rows: u32,
    pub total_cols: u32,
}

// ---- Markdown ----

/// Parsed markdown: the full text, an ordered section list covering the whole
/// document, and flat lists of every extracted structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkdownData {
    pub full_text: String,
    pub sections: Vec<MarkdownSection>,
    pub headings: Vec<MarkdownHeading>,
    pub links: Vec<MarkdownLink>,
    pub images: Vec<MarkdownImage>,
    pub code_blocks: Vec<CodeBlock>,
    pub lists: MarkdownLists,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkdownSection {
    pub id: String,
    pub title: String,
    /// Heading depth that introduced the section; 0 for pre-heading content.
    pub level: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkdownHeading {
    pub title: String,
    pub level: usize,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkdownLink {
    pub text: String,
    pub url: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkdownImage {
    pub alt: String,
    pub url: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MarkdownLists {
    pub ordered: Vec<ListGroup>,
    pub unordered: Vec<ListGroup>,
}

/// A contiguous run of list items at a shared starting indent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListGroup {
    pub items: Vec<ListItem>,
    pub start_line: usize,
    pub end_line: usize,
    pub indent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListItem {
    pub content: String,
    pub line: usize,
    pub indent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkdownStatistics {
    pub total_characters: usize,
    pub total_words: usize,
    pub total_lines: usize,
    pub heading_count: usize,
    pub link_count: usize,
    pub image_count: usize,
    pub code_block_count: usize,
    pub list_count: usize,
}

// ---- JSON ----

/// Structural analysis of a parsed JSON document, mirroring the root type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonStructure {
    Array {
        length: usize,
        /// Key → value-type map of the first element, when it is an object;
        /// otherwise the first element's own type name.
        sample_item_types: Option<Value>,
    },
    Object {
        keys: Vec<String>,
        key_count: usize,
        value_types: BTreeMap<String, String>,
    },
    Scalar {
        value_type: String,
    },
}

/// JSON type name of a value, as reported in structure analyses.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tag_round_trips_through_serde() {
        let doc = DocumentPayload::Error {
            error: "bad input".to_string(),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["format"], "error");
        assert_eq!(json["error"], "bad input");
        let back: DocumentPayload = serde_json::from_value(json).unwrap();
        assert!(matches!(back, DocumentPayload::Error { .. }));
    }

    #[test]
    fn json_type_names() {
        assert_eq!(json_type_name(&Value::Null), "null");
        assert_eq!(json_type_name(&serde_json::json!(1.5)), "number");
        assert_eq!(json_type_name(&serde_json::json!({"a": 1})), "object");
    }
}
