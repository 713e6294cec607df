//! Report workflow orchestration.
//!
//! Drives the decompose / fill / regenerate cycle over an inference backend.
//! Generation runs strictly sequentially (one in-flight request), and
//! starting a new top-level operation cancels whatever was running. A
//! cancelled generation reverts the block; it is never recorded as failed.

use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::assemble::{assemble, MessagePair};
use crate::document::StandardizedDocument;
use crate::export::report_markdown;
use crate::inference::{InferenceBackend, InferenceError};
use crate::progress::ProgressReporter;
use crate::report::ReportBlock;

/// Instructions for the corpus-decomposition call. The model must answer
/// with a bare JSON array of section objects.
pub const DECOMPOSITION_PROMPT: &str = "\
You have been provided with a set of files as context. These files are flexible and may change each time.

Your task:

- Read each file carefully.
- Identify the critical categories needed for a thorough, structured report on the provided data.
- Create a JSON array, where each element is one category.
- Each category object must have exactly four keys:
  \"title\" (short heading),
  \"prompt\" (instructions for how to fill \"content\"),
  \"content\" (leave this empty),
  \"relevant_files\" (list the filenames that support the category).

Guidelines:

- Base each category strictly on data explicitly found in the provided files. Do not speculate or assume.
- Only include categories for which you have supporting information in the files.
- Do not overlap categories: each should be distinct and actionable.
- Within \"prompt\", instruct the model that will fill \"content\" to be deterministic, avoid hallucination, rely solely on the listed files, and verify any references against the source files.

You may also include a concluding or summary category synthesizing the overall findings.

Please return your output as a clean JSON array with no additional formatting or commentary.";

const VARIANT_STYLES: [&str; 3] = ["key findings", "detailed analysis", "balanced view"];

#[derive(Debug, Error)]
pub enum ReportError {
    /// The decomposition reply was not a JSON array of sections. Carries the
    /// raw response so the operator can debug prompt or model drift.
    #[error("model response is not a valid JSON array: {source}\nResponse:\n{raw}")]
    InvalidDecomposition {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
    /// The verification reply contained no score to extract.
    #[error("no verification score found in model response:\n{raw}")]
    ScoreNotFound { raw: String },
    #[error("no block at index {index}")]
    NoSuchBlock { index: usize },
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Deserialize)]
struct DecomposedSection {
    #[serde(default)]
    title: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    relevant_files: Vec<String>,
}

pub struct Orchestrator {
    backend: Arc<dyn InferenceBackend>,
    progress: Arc<dyn ProgressReporter>,
    files: Vec<StandardizedDocument>,
    blocks: Vec<ReportBlock>,
    root: CancellationToken,
    current: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        progress: Arc<dyn ProgressReporter>,
        files: Vec<StandardizedDocument>,
    ) -> Self {
        Self {
            backend,
            progress,
            files,
            blocks: Vec::new(),
            root: CancellationToken::new(),
            current: CancellationToken::new(),
        }
    }

    /// Tie every operation to `root`: cancelling it cancels whatever is in
    /// flight. Lets callers hook process signals into the workflow.
    pub fn bind_cancellation(&mut self, root: CancellationToken) {
        self.root = root;
    }

    pub fn blocks(&self) -> &[ReportBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Vec<ReportBlock> {
        &mut self.blocks
    }

    pub fn files(&self) -> &[StandardizedDocument] {
        &self.files
    }

    /// Cancel whatever is in flight and hand out a token for the next
    /// operation. At most one primary request is ever active.
    fn begin_operation(&mut self) -> CancellationToken {
        self.current.cancel();
        self.current = self.root.child_token();
        self.current.clone()
    }

    /// Cancel the in-flight operation, if any.
    pub fn cancel(&self) {
        self.current.cancel();
    }

    /// Ask the model to split the corpus into report sections and replace the
    /// block list with the parsed result.
    pub async fn decompose(&mut self) -> Result<(), ReportError> {
        let cancel = self.begin_operation();
        self.blocks.clear();

        let file_refs: Vec<&StandardizedDocument> = self.files.iter().collect();
        let messages = assemble(DECOMPOSITION_PROMPT, &file_refs, "");
        let response = self
            .backend
            .query(&messages, &cancel, self.progress.as_ref())
            .await?;

        let cleaned = strip_code_fences(&response);
        let sections: Vec<DecomposedSection> = serde_json::from_str(&cleaned).map_err(|source| {
            ReportError::InvalidDecomposition {
                raw: response.clone(),
                source,
            }
        })?;
        debug!(sections = sections.len(), "decomposition parsed");

        self.blocks = sections
            .into_iter()
            .enumerate()
            .map(|(idx, section)| ReportBlock {
                id: ReportBlock::make_id(idx),
                title: section.title,
                prompt: section.prompt,
                content: section.content,
                relevant_files: section.relevant_files,
                is_generating: false,
                is_generated: false,
                error: None,
            })
            .collect();
        Ok(())
    }

    /// Generate content for the block at `index` as a standalone operation.
    pub async fn generate_one(&mut self, index: usize) -> Result<(), ReportError> {
        let cancel = self.begin_operation();
        match self.fill_block(index, &cancel).await {
            Err(InferenceError::Cancelled) => Err(InferenceError::Cancelled.into()),
            _ => Ok(()),
        }
    }

    /// Fill every block in queue order, one request in flight at a time.
    /// Failed blocks keep their error and the queue moves on; cancellation
    /// stops the queue.
    pub async fn generate_all(&mut self) -> Result<(), ReportError> {
        let cancel = self.begin_operation();
        for index in 0..self.blocks.len() {
            match self.fill_block(index, &cancel).await {
                Err(InferenceError::Cancelled) => return Err(InferenceError::Cancelled.into()),
                Err(err) => {
                    warn!(index, %err, "block generation failed, continuing queue");
                }
                Ok(()) => {}
            }
        }
        Ok(())
    }

    /// One block generation against the file subset named by the block. A
    /// cancelled request reverts the block untouched; any other failure is
    /// recorded on the block.
    async fn fill_block(
        &mut self,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<(), InferenceError> {
        let Some(block) = self.blocks.get(index).cloned() else {
            return Ok(());
        };
        if block.is_generating {
            return Ok(());
        }

        if let Some(entry) = self.blocks.get_mut(index) {
            entry.is_generating = true;
            entry.error = None;
        }

        let scoped = self.scoped_files(&block.relevant_files);
        let messages = assemble(&block.prompt, &scoped, "");
        let result = self
            .backend
            .query(&messages, cancel, self.progress.as_ref())
            .await;

        let Some(entry) = self.blocks.get_mut(index) else {
            return Ok(());
        };
        match result {
            Ok(content) => {
                entry.content = content;
                entry.is_generating = false;
                entry.is_generated = true;
                Ok(())
            }
            Err(InferenceError::Cancelled) => {
                entry.is_generating = false;
                Err(InferenceError::Cancelled)
            }
            Err(err) => {
                entry.is_generating = false;
                entry.error = Some(format!("Failed to generate content: {err}"));
                Err(err)
            }
        }
    }

    /// Documents matching the block's filename list, or every document when
    /// nothing matches.
    fn scoped_files<'a>(&'a self, names: &[String]) -> Vec<&'a StandardizedDocument> {
        let matched: Vec<&StandardizedDocument> = self
            .files
            .iter()
            .filter(|doc| names.iter().any(|n| n == doc.name()))
            .collect();
        if matched.is_empty() {
            self.files.iter().collect()
        } else {
            matched
        }
    }

    /// Produce three alternative contents for a block, one per style, issued
    /// concurrently. The caller picks which one (if any) replaces the
    /// block's content.
    pub async fn regenerate(
        &mut self,
        index: usize,
        custom_prompt: &str,
    ) -> Result<[String; 3], ReportError> {
        let cancel = self.begin_operation();
        let Some(block) = self.blocks.get(index).cloned() else {
            return Err(ReportError::NoSuchBlock { index });
        };

        let scoped = self.scoped_files(&block.relevant_files);
        let variant = |style: &str| -> MessagePair {
            assemble(
                &format!("{custom_prompt}\n\nStyle: emphasize {style}."),
                &scoped,
                "",
            )
        };
        let messages: Vec<MessagePair> = VARIANT_STYLES.iter().map(|s| variant(s)).collect();

        let (a, b, c) = futures::future::try_join3(
            self.backend
                .query(&messages[0], &cancel, self.progress.as_ref()),
            self.backend
                .query(&messages[1], &cancel, self.progress.as_ref()),
            self.backend
                .query(&messages[2], &cancel, self.progress.as_ref()),
        )
        .await?;
        Ok([a, b, c])
    }

    /// Best-effort credibility score: ask the model to grade the assembled
    /// report against the source files and pull the first integer out of the
    /// reply, clamped to 0..=100. Unreliable by construction; extraction
    /// failure is a verification error, not a crash.
    pub async fn verify(&mut self) -> Result<u8, ReportError> {
        let cancel = self.begin_operation();
        let report = report_markdown(&self.blocks);
        let prompt = format!(
            "Below is a report assembled from the provided files. Grade how well the report is \
             supported by the files on a scale from 0 to 100, where 100 means every claim is \
             directly backed by the source data. Reply with the number first.\n\n{report}"
        );

        let file_refs: Vec<&StandardizedDocument> = self.files.iter().collect();
        let messages = assemble(&prompt, &file_refs, "");
        let response = self
            .backend
            .query(&messages, &cancel, self.progress.as_ref())
            .await?;

        extract_score(&response).ok_or(ReportError::ScoreNotFound { raw: response })
    }
}

/// Remove markdown code fences around a JSON payload.
pub fn strip_code_fences(response: &str) -> String {
    response.replace("```json", "").replace("```", "").trim().to_string()
}

/// First integer in the reply, clamped to 0..=100.
fn extract_score(response: &str) -> Option<u8> {
    let re = Regex::new(r"\d+").ok()?;
    let digits = re.find(response)?.as_str();
    let value: u64 = digits.parse().unwrap_or(u64::MAX);
    Some(value.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::UploadedFile;
    use crate::progress::NoProgress;
    use crate::standardize::standardize;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend returning scripted responses in order, recording the prompts
    /// it saw.
    struct ScriptedBackend {
        responses: Mutex<Vec<InferenceResultShim>>,
        seen: Mutex<Vec<String>>,
        tokens: Mutex<Vec<CancellationToken>>,
    }

    enum InferenceResultShim {
        Ok(String),
        Err(InferenceError),
    }

    impl ScriptedBackend {
        fn new(responses: Vec<InferenceResultShim>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
                tokens: Mutex::new(Vec::new()),
            })
        }

        fn ok(text: &str) -> InferenceResultShim {
            InferenceResultShim::Ok(text.to_string())
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        async fn query(
            &self,
            messages: &MessagePair,
            cancel: &CancellationToken,
            _progress: &dyn ProgressReporter,
        ) -> Result<String, InferenceError> {
            self.tokens.lock().unwrap().push(cancel.clone());
            if cancel.is_cancelled() {
                return Err(InferenceError::Cancelled);
            }
            self.seen.lock().unwrap().push(messages.user.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(InferenceError::InvalidResponse);
            }
            match responses.remove(0) {
                InferenceResultShim::Ok(text) => Ok(text),
                InferenceResultShim::Err(err) => Err(err),
            }
        }
    }

    fn files() -> Vec<StandardizedDocument> {
        vec![
            standardize(&UploadedFile::from_bytes(
                "table.csv",
                b"name,age\nAlice,30\nBob,25\n".to_vec(),
            )),
            standardize(&UploadedFile::from_bytes(
                "notes.md",
                b"# Title\n\nBody text".to_vec(),
            )),
        ]
    }

    fn orchestrator(backend: Arc<ScriptedBackend>) -> Orchestrator {
        Orchestrator::new(backend, Arc::new(NoProgress), files())
    }

    const DECOMPOSITION: &str = r#"[
        {"title": "Overview", "prompt": "Summarize the table.", "content": "", "relevant_files": ["table.csv"]},
        {"title": "Notes", "prompt": "Summarize the notes.", "content": "", "relevant_files": ["missing.txt"]}
    ]"#;

    #[tokio::test]
    async fn decompose_parses_fenced_json() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::ok(&format!(
            "```json\n{DECOMPOSITION}\n```"
        ))]);
        let mut orch = orchestrator(backend);
        orch.decompose().await.unwrap();

        assert_eq!(orch.blocks().len(), 2);
        assert_eq!(orch.blocks()[0].title, "Overview");
        assert!(!orch.blocks()[0].is_generated);
        assert!(orch.blocks()[0].id.starts_with("block-"));
    }

    #[tokio::test]
    async fn decompose_failure_carries_raw_response() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::ok("I refuse to answer.")]);
        let mut orch = orchestrator(backend);
        let err = orch.decompose().await.unwrap_err();
        match err {
            ReportError::InvalidDecomposition { raw, .. } => {
                assert_eq!(raw, "I refuse to answer.");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn generate_all_is_sequential_and_scopes_files() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::ok(DECOMPOSITION),
            ScriptedBackend::ok("Table summary."),
            ScriptedBackend::ok("Notes summary."),
        ]);
        let mut orch = orchestrator(backend.clone());
        orch.decompose().await.unwrap();
        orch.generate_all().await.unwrap();

        assert_eq!(orch.blocks()[0].content, "Table summary.");
        assert!(orch.blocks()[0].is_generated);
        assert_eq!(orch.blocks()[1].content, "Notes summary.");

        let seen = backend.seen.lock().unwrap();
        // First block matched table.csv only; second matched nothing and fell
        // back to all files.
        assert!(seen[1].contains("--- FILE: table.csv ---"));
        assert!(!seen[1].contains("--- FILE: notes.md ---"));
        assert!(seen[2].contains("--- FILE: table.csv ---"));
        assert!(seen[2].contains("--- FILE: notes.md ---"));
    }

    #[tokio::test]
    async fn failed_block_records_error_and_queue_continues() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::ok(DECOMPOSITION),
            InferenceResultShim::Err(InferenceError::Api {
                status: 500,
                body: "overloaded".to_string(),
            }),
            ScriptedBackend::ok("Notes summary."),
        ]);
        let mut orch = orchestrator(backend);
        orch.decompose().await.unwrap();
        orch.generate_all().await.unwrap();

        assert!(!orch.blocks()[0].is_generated);
        assert!(orch.blocks()[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("500")));
        assert!(orch.blocks()[1].is_generated);
    }

    #[tokio::test]
    async fn cancellation_reverts_block_without_error() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::ok(DECOMPOSITION),
            InferenceResultShim::Err(InferenceError::Cancelled),
        ]);
        let mut orch = orchestrator(backend);
        orch.decompose().await.unwrap();
        let err = orch.generate_all().await.unwrap_err();
        assert!(matches!(err, ReportError::Inference(e) if e.is_cancelled()));

        let block = &orch.blocks()[0];
        assert!(!block.is_generating);
        assert!(!block.is_generated);
        assert!(block.error.is_none());
        assert_eq!(block.content, "");
    }

    #[tokio::test]
    async fn new_operation_cancels_the_previous_token() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::ok(DECOMPOSITION),
            ScriptedBackend::ok("85"),
        ]);
        let mut orch = orchestrator(backend.clone());
        orch.decompose().await.unwrap();

        let first = backend.tokens.lock().unwrap()[0].clone();
        assert!(!first.is_cancelled());

        // Starting verification supersedes the decomposition's token.
        orch.verify().await.unwrap();
        assert!(first.is_cancelled());
    }

    #[tokio::test]
    async fn bound_root_token_cancels_work() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::ok(DECOMPOSITION)]);
        let mut orch = orchestrator(backend);
        let root = CancellationToken::new();
        orch.bind_cancellation(root.clone());

        root.cancel();
        let err = orch.decompose().await.unwrap_err();
        assert!(matches!(err, ReportError::Inference(e) if e.is_cancelled()));
        assert!(orch.blocks().is_empty());
    }

    #[tokio::test]
    async fn regenerate_produces_three_styled_variants() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::ok(DECOMPOSITION),
            ScriptedBackend::ok("v1"),
            ScriptedBackend::ok("v2"),
            ScriptedBackend::ok("v3"),
        ]);
        let mut orch = orchestrator(backend.clone());
        orch.decompose().await.unwrap();
        let variants = orch.regenerate(0, "Rewrite the overview").await.unwrap();
        assert_eq!(variants, ["v1", "v2", "v3"]);

        let seen = backend.seen.lock().unwrap();
        let styled: Vec<&String> = seen.iter().filter(|p| p.contains("Style:")).collect();
        assert_eq!(styled.len(), 3);
        assert!(styled.iter().any(|p| p.contains("key findings")));
        assert!(styled.iter().any(|p| p.contains("detailed analysis")));
        assert!(styled.iter().any(|p| p.contains("balanced view")));
    }

    #[tokio::test]
    async fn verify_extracts_and_clamps_score() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::ok(
            "I would rate this report 85 out of 100.",
        )]);
        let mut orch = orchestrator(backend);
        assert_eq!(orch.verify().await.unwrap(), 85);

        let backend = ScriptedBackend::new(vec![ScriptedBackend::ok("Score: 250")]);
        let mut orch = orchestrator(backend);
        assert_eq!(orch.verify().await.unwrap(), 100);

        let backend = ScriptedBackend::new(vec![ScriptedBackend::ok("no number here")]);
        let mut orch = orchestrator(backend);
        assert!(matches!(
            orch.verify().await,
            Err(ReportError::ScoreNotFound { .. })
        ));
    }

    #[test]
    fn fence_stripping_tolerates_plain_json() {
        assert_eq!(strip_code_fences("[1,2]"), "[1,2]");
        assert_eq!(strip_code_fences("```json\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fences("```\n[1,2]\n```"), "[1,2]");
    }
}
