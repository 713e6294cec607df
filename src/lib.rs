//! # Report Forge
//!
//! A local-first document standardization and report assembly pipeline for
//! local LLMs.
//!
//! Report Forge turns heterogeneous files (CSV, Excel, Markdown, JSON) into a
//! uniform standardized corpus, samples that corpus into size-bounded
//! excerpts, assembles the excerpts into prompts, and drives an Ollama-style
//! backend to decompose the corpus into report sections and fill them in.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────┐
//! │ Standardize │──▶│  Optimize    │──▶│  Assemble   │
//! │ csv/xlsx/   │   │ size-bounded│   │ prompt +    │
//! │ md/json     │   │ excerpts    │   │ budgets     │
//! └─────────────┘   └─────────────┘   └─────┬──────┘
//!                                           │
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                  ┌──────────┐       ┌───────────┐
//!                  │ Inference│◀──────│Orchestrate│
//!                  │ (Ollama) │       │  blocks   │
//!                  └──────────┘       └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rforge standardize data.csv notes.md       # inspect the corpus
//! rforge ask "What changed?" data.csv        # one-shot question
//! rforge report generate data.csv notes.md   # decompose + fill sections
//! rforge report export --format markdown     # render the report
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`meta`] | File metadata capture |
//! | [`document`] | Standardized document model |
//! | [`standardize`] | Format dispatch and table analysis |
//! | [`optimize`] | Size-bounded content sampling |
//! | [`assemble`] | Context budgets and message assembly |
//! | [`inference`] | Ollama client (single-shot and streaming) |
//! | [`orchestrate`] | Report block workflows |
//! | [`report`] | Block types and list operations |
//! | [`export`] | Report and corpus export |
//! | [`storage`] | Key-value persistence |
//! | [`config`] | TOML configuration parsing |

pub mod assemble;
pub mod config;
pub mod document;
pub mod export;
pub mod inference;
pub mod meta;
pub mod optimize;
pub mod orchestrate;
pub mod progress;
pub mod report;
pub mod standardize;
pub mod standardize_csv;
pub mod standardize_json;
pub mod standardize_markdown;
pub mod standardize_sheet;
pub mod storage;
