//! File metadata capture.
//!
//! Builds the common metadata envelope for any uploaded file: filename, size,
//! MIME type, extension, timestamps, and a unique id. Standardizers attach
//! this envelope to every [`crate::document::StandardizedDocument`] they
//! produce.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// A file handed to the pipeline, before standardization.
///
/// Immutable once created; the raw payload is owned by the caller until it is
/// passed to a standardizer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub extension: String,
    pub upload_date: DateTime<Utc>,
    pub raw_payload: Vec<u8>,
}

impl UploadedFile {
    /// Read a file from disk. This is the only place in the pipeline where an
    /// I/O failure propagates as an error; everything downstream treats
    /// malformed content as data.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw_payload = std::fs::read(path)
            .with_context(|| format!("failed to read file: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Ok(Self {
            id: format!("file-{}", Uuid::new_v4()),
            size: raw_payload.len() as u64,
            mime_type: mime_for_extension(&extension).to_string(),
            extension,
            name,
            upload_date: Utc::now(),
            raw_payload,
        })
    }

    /// Build a file record from in-memory bytes (used by tests and by callers
    /// that receive content over the wire rather than from disk).
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        Self {
            id: format!("file-{}", Uuid::new_v4()),
            name: name.to_string(),
            size: bytes.len() as u64,
            mime_type: mime_for_extension(&extension).to_string(),
            extension,
            upload_date: Utc::now(),
            raw_payload: bytes,
        }
    }

    /// The payload decoded as UTF-8 (lossy). Text standardizers work on this;
    /// the spreadsheet standardizer reads the raw bytes directly.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw_payload).into_owned()
    }
}

/// Metadata envelope carried by every standardized document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub extension: String,
    pub upload_date: DateTime<Utc>,
    pub conversion_date: DateTime<Utc>,
    pub standardization_id: String,
}

impl DocumentMetadata {
    /// Build the envelope for one standardization call. The id combines the
    /// conversion timestamp with a random suffix and is never reused.
    pub fn build(file: &UploadedFile, format_tag: &str) -> Self {
        let now = Utc::now();
        Self {
            filename: file.name.clone(),
            file_type: file.mime_type.clone(),
            file_size: file.size,
            extension: file.extension.clone(),
            upload_date: file.upload_date,
            conversion_date: now,
            standardization_id: format!(
                "std-{}-{}-{}",
                format_tag,
                now.timestamp_millis(),
                &Uuid::new_v4().simple().to_string()[..5]
            ),
        }
    }
}

fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "csv" => "text/csv",
        "md" => "text/markdown",
        "json" => "application/json",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_captures_extension_and_size() {
        let file = UploadedFile::from_bytes("data.csv", b"a,b\n1,2\n".to_vec());
        assert_eq!(file.extension, "csv");
        assert_eq!(file.size, 8);
        assert_eq!(file.mime_type, "text/csv");
    }

    #[test]
    fn standardization_ids_are_unique() {
        let file = UploadedFile::from_bytes("x.json", b"{}".to_vec());
        let a = DocumentMetadata::build(&file, "json");
        let b = DocumentMetadata::build(&file, "json");
        assert_ne!(a.standardization_id, b.standardization_id);
        assert!(a.standardization_id.starts_with("std-json-"));
    }

    #[test]
    fn unknown_extension_gets_octet_stream() {
        let file = UploadedFile::from_bytes("notes.docx", vec![0, 1]);
        assert_eq!(file.mime_type, "application/octet-stream");
    }
}
