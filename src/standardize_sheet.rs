//! Spreadsheet standardizer (.xlsx / .xls).
//!
//! Reads every sheet of a workbook: declared cell range, records keyed by the
//! header row, a raw 2-D cell array, and any formulas keyed by A1 reference.
//! Column-type analysis runs on the first sheet with the same inference the
//! CSV standardizer uses.

use std::collections::BTreeMap;
use std::io::Cursor;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::Value;

use crate::document::{
    DocumentPayload, SheetData, SheetDimensions, SpreadsheetData, StandardizedDocument,
};
use crate::meta::{DocumentMetadata, UploadedFile};
use crate::standardize::analyze_table;

pub fn standardize(file: &UploadedFile) -> StandardizedDocument {
    let metadata = DocumentMetadata::build(file, "excel");
    match read_workbook(file) {
        Ok(data) => StandardizedDocument {
            metadata,
            payload: DocumentPayload::Spreadsheet { data },
        },
        Err(err) => StandardizedDocument {
            metadata,
            payload: DocumentPayload::Error {
                error: format!("Failed to standardize spreadsheet: {:#}", err),
            },
        },
    }
}

fn read_workbook(file: &UploadedFile) -> Result<SpreadsheetData> {
    let cursor = Cursor::new(file.raw_payload.clone());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .with_context(|| format!("cannot open workbook {}", file.name))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(sheet_names.len());

    for name in &sheet_names {
        let range = workbook
            .worksheet_range(name)
            .with_context(|| format!("cannot read sheet {name}"))?;

        let dimensions = match (range.start(), range.end()) {
            (Some((sr, sc)), Some((er, ec))) => SheetDimensions {
                start_row: sr,
                end_row: er,
                start_col: sc,
                end_col: ec,
                total_rows: er - sr + 1,
                total_cols: ec - sc + 1,
            },
            _ => SheetDimensions {
                start_row: 0,
                end_row: 0,
                start_col: 0,
                end_col: 0,
                total_rows: 0,
                total_cols: 0,
            },
        };

        let raw: Vec<Vec<Value>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_value).collect())
            .collect();

        let headers: Vec<String> = raw
            .first()
            .map(|row| row.iter().map(value_to_string).collect())
            .unwrap_or_default();

        let records = raw
            .iter()
            .skip(1)
            .map(|row| {
                let mut record = serde_json::Map::new();
                for (col, header) in headers.iter().enumerate() {
                    record.insert(header.clone(), row.get(col).cloned().unwrap_or(Value::Null));
                }
                record
            })
            .collect();

        let formulas = read_formulas(&mut workbook, name);

        sheets.push(SheetData {
            name: name.clone(),
            headers,
            dimensions,
            records,
            raw,
            formulas,
        });
    }

    let analysis = sheets.first().map(|sheet| {
        let column_values: Vec<Vec<String>> = (0..sheet.headers.len())
            .map(|col| {
                sheet
                    .raw
                    .iter()
                    .skip(1)
                    .map(|row| row.get(col).map(value_to_string).unwrap_or_default())
                    .collect()
            })
            .collect();
        analyze_table(&sheet.headers, &column_values)
    });

    let active_sheet = sheet_names.first().cloned();
    let total_sheets = sheet_names.len();
    Ok(SpreadsheetData {
        sheet_names,
        sheets,
        active_sheet,
        total_sheets,
        analysis,
    })
}

fn read_formulas<R>(workbook: &mut R, sheet: &str) -> Option<BTreeMap<String, String>>
where
    R: Reader<Cursor<Vec<u8>>>,
{
    let range = workbook.worksheet_formula(sheet).ok()?;
    let base = range.start().unwrap_or((0, 0));
    let mut formulas = BTreeMap::new();
    for (row, col, formula) in range.used_cells() {
        if !formula.is_empty() {
            formulas.insert(
                a1_reference(base.0 + row as u32, base.1 + col as u32),
                formula.clone(),
            );
        }
    }
    (!formulas.is_empty()).then_some(formulas)
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Zero-based (row, col) to an A1-style cell reference.
fn a1_reference(row: u32, col: u32) -> String {
    let mut letters = String::new();
    let mut c = col + 1;
    while c > 0 {
        let rem = (c - 1) % 26;
        letters.insert(0, (b'A' + rem as u8) as char);
        c = (c - 1) / 26;
    }
    format!("{}{}", letters, row + 1)
}
