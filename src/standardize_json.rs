//! JSON standardizer.
//!
//! Validates the document and records a structural summary of the root value.
//! A parse failure becomes an error-format document.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::document::{
    json_type_name, DocumentPayload, JsonStructure, StandardizedDocument,
};
use crate::meta::{DocumentMetadata, UploadedFile};

pub fn standardize(file: &UploadedFile) -> StandardizedDocument {
    let metadata = DocumentMetadata::build(file, "json");
    match serde_json::from_str::<Value>(&file.text()) {
        Ok(value) => {
            let structure = analyze_structure(&value);
            StandardizedDocument {
                metadata,
                payload: DocumentPayload::Json {
                    data: value,
                    structure,
                },
            }
        }
        Err(err) => StandardizedDocument {
            metadata,
            payload: DocumentPayload::Error {
                error: format!("Invalid JSON: {}", err),
            },
        },
    }
}

fn analyze_structure(value: &Value) -> JsonStructure {
    match value {
        Value::Array(items) => JsonStructure::Array {
            length: items.len(),
            sample_item_types: items.first().map(|first| match first {
                Value::Object(map) => {
                    let types: serde_json::Map<String, Value> = map
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(json_type_name(v).to_string())))
                        .collect();
                    Value::Object(types)
                }
                other => Value::String(json_type_name(other).to_string()),
            }),
        },
        Value::Object(map) => JsonStructure::Object {
            keys: map.keys().cloned().collect(),
            key_count: map.len(),
            value_types: map
                .iter()
                .map(|(k, v)| (k.clone(), json_type_name(v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        },
        other => JsonStructure::Scalar {
            value_type: json_type_name(other).to_string(),
        },
    }
}
