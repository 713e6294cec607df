//! Report and corpus export.
//!
//! The JSON report export strips internal bookkeeping fields (id, generation
//! flags, errors) so the artifact only carries what a reader needs. The
//! markdown export renders numbered sections separated by horizontal rules.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::document::StandardizedDocument;
use crate::report::ReportBlock;

/// One exported report section, internal fields stripped.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportedBlock {
    pub title: String,
    pub prompt: String,
    pub content: String,
    pub relevant_files: Vec<String>,
}

impl From<&ReportBlock> for ExportedBlock {
    fn from(block: &ReportBlock) -> Self {
        Self {
            title: block.title.clone(),
            prompt: block.prompt.clone(),
            content: block.content.clone(),
            relevant_files: block.relevant_files.clone(),
        }
    }
}

/// The report as a JSON array of sections.
pub fn report_json(blocks: &[ReportBlock]) -> serde_json::Result<String> {
    let exported: Vec<ExportedBlock> = blocks.iter().map(ExportedBlock::from).collect();
    serde_json::to_string_pretty(&exported)
}

/// The report as one markdown document: `## n. title` per section, sections
/// separated by horizontal rules.
pub fn report_markdown(blocks: &[ReportBlock]) -> String {
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let title = if block.title.is_empty() {
                "Untitled"
            } else {
                &block.title
            };
            let content = if block.content.is_empty() {
                "_(no content)_"
            } else {
                &block.content
            };
            format!("## {}. {}\n\n{}", i + 1, title, content)
        })
        .collect::<Vec<String>>()
        .join("\n\n---\n\n")
}

/// Envelope for exporting the whole standardized corpus.
#[derive(Debug, Serialize)]
pub struct CorpusExport<'a> {
    pub export_date: DateTime<Utc>,
    pub files: &'a [StandardizedDocument],
}

/// The standardized corpus with an export timestamp.
pub fn corpus_json(files: &[StandardizedDocument]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&CorpusExport {
        export_date: Utc::now(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(title: &str, content: &str) -> ReportBlock {
        ReportBlock {
            id: "block-1-0".to_string(),
            title: title.to_string(),
            prompt: "p".to_string(),
            content: content.to_string(),
            relevant_files: vec!["a.csv".to_string()],
            is_generating: true,
            is_generated: true,
            error: Some("stale".to_string()),
        }
    }

    #[test]
    fn json_export_strips_internal_fields() {
        let json = report_json(&[block("Overview", "text")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entry = &value[0];
        assert_eq!(entry["title"], "Overview");
        assert_eq!(entry["relevant_files"][0], "a.csv");
        assert!(entry.get("id").is_none());
        assert!(entry.get("is_generating").is_none());
        assert!(entry.get("error").is_none());
    }

    #[test]
    fn markdown_export_numbers_and_separates_sections() {
        let md = report_markdown(&[block("One", "first"), block("Two", "second")]);
        assert_eq!(md, "## 1. One\n\nfirst\n\n---\n\n## 2. Two\n\nsecond");
    }

    #[test]
    fn markdown_export_fills_placeholders() {
        let md = report_markdown(&[block("", "")]);
        assert_eq!(md, "## 1. Untitled\n\n_(no content)_");
    }

    #[test]
    fn corpus_export_carries_timestamp_and_files() {
        let json = corpus_json(&[]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("export_date").is_some());
        assert!(value["files"].as_array().unwrap().is_empty());
    }
}
