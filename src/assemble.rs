//! Context assembly: budget computation, priority ordering, and message
//! construction.
//!
//! The per-file budget shrinks as the file count grows so assembled context
//! grows sub-linearly with the number of selected files; a very long prompt
//! shaves another 20% off.

use crate::document::{DocumentPayload, StandardizedDocument};
use crate::optimize::optimize;

const BASE_MAX_PER_FILE: usize = 100_000;
const LONG_PROMPT_THRESHOLD: usize = 5_000;

const PERSONA: &str =
    "You are Report Forge, an AI assistant for data analysis and document understanding.";

/// System and user message for one inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePair {
    pub system: String,
    pub user: String,
}

/// Derived per-invocation budget. Never persisted; purely a function of the
/// current inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    pub max_per_file_chars: usize,
    pub total_files: usize,
    pub prompt_length: usize,
}

impl ContextBudget {
    pub fn compute(prompt: &str, file_count: usize) -> Self {
        let prompt_length = prompt.chars().count();
        let mut max_per_file = match file_count {
            0 | 1 => BASE_MAX_PER_FILE,
            2 | 3 => BASE_MAX_PER_FILE / 2,
            4 | 5 => BASE_MAX_PER_FILE / 3,
            _ => BASE_MAX_PER_FILE / 4,
        };
        if prompt_length > LONG_PROMPT_THRESHOLD {
            max_per_file = max_per_file * 8 / 10;
        }
        Self {
            max_per_file_chars: max_per_file,
            total_files: file_count,
            prompt_length,
        }
    }
}

fn format_priority(document: &StandardizedDocument) -> u8 {
    match document.payload {
        DocumentPayload::Spreadsheet { .. } => 1,
        DocumentPayload::Json { .. } => 2,
        DocumentPayload::Csv { .. } => 3,
        DocumentPayload::Markdown { .. } => 4,
        DocumentPayload::Error { .. } => 99,
    }
}

/// Build the system/user message pair for a prompt over the selected
/// documents.
///
/// Documents that failed standardization are excluded. The rest are ordered
/// by format priority (stable for ties), excerpted at the computed per-file
/// budget, and wrapped in `--- FILE: <name> ---` markers. With no usable
/// documents the prompt passes through unchanged.
pub fn assemble(
    prompt: &str,
    files: &[&StandardizedDocument],
    default_context: &str,
) -> MessagePair {
    let mut system = PERSONA.to_string();
    if !default_context.trim().is_empty() {
        system.push_str(&format!("\n\nAdditional context: {}", default_context));
    }

    let mut sorted: Vec<&StandardizedDocument> =
        files.iter().copied().filter(|doc| !doc.is_error()).collect();
    if sorted.is_empty() {
        return MessagePair {
            system,
            user: prompt.to_string(),
        };
    }

    let budget = ContextBudget::compute(prompt, sorted.len());
    sorted.sort_by_key(|doc| format_priority(doc));

    let file_contexts: Vec<String> = sorted
        .iter()
        .map(|doc| {
            let excerpt = optimize(doc, budget.max_per_file_chars);
            format!("--- FILE: {} ---\n{}\n", doc.name(), excerpt)
        })
        .collect();

    let user = format!(
        "I have the following files as context:\n\n{}\n\nQuestion: {}",
        file_contexts.join("\n"),
        prompt
    );

    MessagePair { system, user }
}
