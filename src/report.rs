//! Report blocks and the pure list operations over them.
//!
//! A block is one section of the assembled report. Reordering, editing, and
//! deletion are plain structural operations with no I/O; generation state
//! lives on the block so the orchestrator can record progress and failures
//! without a side table.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One section of the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportBlock {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub relevant_files: Vec<String>,
    #[serde(default)]
    pub is_generating: bool,
    #[serde(default)]
    pub is_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportBlock {
    /// Block id: creation timestamp plus the position it was created at.
    pub fn make_id(index: usize) -> String {
        format!("block-{}-{}", Utc::now().timestamp_millis(), index)
    }

    /// A user-authored block; the prompt doubles as the title.
    pub fn custom(prompt: &str, index: usize) -> Self {
        Self {
            id: Self::make_id(index),
            title: prompt.to_string(),
            prompt: prompt.to_string(),
            content: String::new(),
            relevant_files: Vec::new(),
            is_generating: false,
            is_generated: false,
            error: None,
        }
    }
}

/// Move the block at `from` to position `to`, shifting the rest.
pub fn reorder(blocks: &mut Vec<ReportBlock>, from: usize, to: usize) {
    if from >= blocks.len() || to >= blocks.len() || from == to {
        return;
    }
    let block = blocks.remove(from);
    blocks.insert(to, block);
}

/// Delete the block at `index`. Out-of-range indices are ignored.
pub fn delete(blocks: &mut Vec<ReportBlock>, index: usize) {
    if index < blocks.len() {
        blocks.remove(index);
    }
}

/// Which user-editable field of a block to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockField {
    Title,
    Prompt,
    Content,
}

/// Edit one field of the block at `index`.
pub fn edit(blocks: &mut [ReportBlock], index: usize, field: BlockField, value: &str) {
    let Some(block) = blocks.get_mut(index) else {
        return;
    };
    match field {
        BlockField::Title => block.title = value.to_string(),
        BlockField::Prompt => block.prompt = value.to_string(),
        BlockField::Content => {
            block.content = value.to_string();
            block.is_generated = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(title: &str) -> ReportBlock {
        ReportBlock {
            id: format!("id-{title}"),
            title: title.to_string(),
            prompt: String::new(),
            content: String::new(),
            relevant_files: Vec::new(),
            is_generating: false,
            is_generated: false,
            error: None,
        }
    }

    #[test]
    fn reorder_moves_and_shifts() {
        let mut blocks = vec![block("a"), block("b"), block("c")];
        reorder(&mut blocks, 0, 2);
        let titles: Vec<&str> = blocks.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c", "a"]);

        reorder(&mut blocks, 2, 0);
        let titles: Vec<&str> = blocks.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn reorder_ignores_out_of_range() {
        let mut blocks = vec![block("a"), block("b")];
        reorder(&mut blocks, 0, 5);
        reorder(&mut blocks, 5, 0);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].title, "a");
    }

    #[test]
    fn delete_by_index() {
        let mut blocks = vec![block("a"), block("b")];
        delete(&mut blocks, 0);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].title, "b");
        delete(&mut blocks, 7);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn editing_content_marks_generated() {
        let mut blocks = vec![block("a")];
        edit(&mut blocks, 0, BlockField::Content, "written by hand");
        assert!(blocks[0].is_generated);
        assert_eq!(blocks[0].content, "written by hand");

        edit(&mut blocks, 0, BlockField::Title, "renamed");
        assert_eq!(blocks[0].title, "renamed");
    }

    #[test]
    fn custom_block_uses_prompt_as_title() {
        let b = ReportBlock::custom("Summarize exposure", 3);
        assert_eq!(b.title, "Summarize exposure");
        assert_eq!(b.prompt, "Summarize exposure");
        assert!(b.id.starts_with("block-"));
        assert!(b.id.ends_with("-3"));
    }

    #[test]
    fn error_field_is_omitted_from_json_when_absent() {
        let b = block("a");
        let json = serde_json::to_value(&b).unwrap();
        assert!(json.get("error").is_none());
    }
}
