//! CSV and XLSX sinks for carved rows.

use std::path::Path;

use carve_core::carve::CarvedRelation;
use carve_core::materialize::Value;
use rust_xlsxwriter::Workbook;

use crate::error::CliError;

fn value_to_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Int(v) => v.to_string().into_bytes(),
        Value::Timestamp(s) => s.clone().into_bytes(),
        Value::Text(bytes) => bytes.clone(),
        Value::Null => Vec::new(),
    }
}

/// Write one CSV file per relation's rows, via a raw-byte record so
/// non-ASCII/binary varlena payloads survive verbatim — no substitution is
/// applied, unlike the XLSX sink.
pub fn write_csv(relation: &CarvedRelation, path: &Path) -> Result<(), CliError> {
    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .map_err(|e| CliError::OutputWrite {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;

    for carved in &relation.rows {
        let mut record = csv::ByteRecord::new();
        for value in &carved.row.values {
            record.push_field(&value_to_bytes(value));
        }
        record.push_field(carved.row.fingerprint.as_bytes());
        writer
            .write_byte_record(&record)
            .map_err(|e| CliError::OutputWrite {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })?;
    }

    writer.flush().map_err(|e| CliError::OutputWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

fn xlsx_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if (c as u32) >= 128 { '?' } else { c })
        .collect()
}

fn xlsx_safe_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b < 128 { b as char } else { '?' })
        .collect()
}

/// Write one XLSX workbook with a single worksheet for the relation's rows.
/// Any byte at or above 128 in a string value is replaced with `'?'`.
pub fn write_xlsx(relation: &CarvedRelation, path: &Path) -> Result<(), CliError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (row_idx, carved) in relation.rows.iter().enumerate() {
        let row = row_idx as u32;
        let mut col = 0u16;
        for value in &carved.row.values {
            match value {
                Value::Int(v) => {
                    sheet
                        .write_number(row, col, *v as f64)
                        .map_err(|e| CliError::OutputWrite {
                            path: path.to_path_buf(),
                            source: std::io::Error::other(e),
                        })?;
                }
                Value::Timestamp(s) => {
                    sheet
                        .write_string(row, col, xlsx_safe(s))
                        .map_err(|e| CliError::OutputWrite {
                            path: path.to_path_buf(),
                            source: std::io::Error::other(e),
                        })?;
                }
                Value::Text(bytes) => {
                    sheet
                        .write_string(row, col, xlsx_safe_bytes(bytes))
                        .map_err(|e| CliError::OutputWrite {
                            path: path.to_path_buf(),
                            source: std::io::Error::other(e),
                        })?;
                }
                Value::Null => {}
            }
            col += 1;
        }
        sheet
            .write_string(row, col, xlsx_safe(&carved.row.fingerprint))
            .map_err(|e| CliError::OutputWrite {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })?;
    }

    workbook.save(path).map_err(|e| CliError::OutputWrite {
        path: path.to_path_buf(),
        source: std::io::Error::other(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use carve_core::carve::CarvedRow;
    use carve_core::materialize::MaterializedRow;
    use tempfile::tempdir;

    fn sample_relation() -> CarvedRelation {
        CarvedRelation {
            rows: vec![CarvedRow {
                row: MaterializedRow {
                    values: vec![Value::Int(42), Value::Text(b"hi".to_vec())],
                    fingerprint: "DS".to_string(),
                },
            }],
            skipped_pointers: 0,
        }
    }

    fn relation_with_text(bytes: &[u8]) -> CarvedRelation {
        CarvedRelation {
            rows: vec![CarvedRow {
                row: MaterializedRow {
                    values: vec![Value::Text(bytes.to_vec())],
                    fingerprint: "S".to_string(),
                },
            }],
            skipped_pointers: 0,
        }
    }

    #[test]
    fn writes_a_csv_with_trailing_fingerprint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&sample_relation(), &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), "42,hi,DS");
    }

    #[test]
    fn writes_an_xlsx_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        write_xlsx(&sample_relation(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn xlsx_safe_replaces_high_bytes() {
        assert_eq!(xlsx_safe("a\u{1}b"), "a\u{1}b");
        assert_eq!(xlsx_safe(&((128u8 as char)).to_string()), "?");
    }

    #[test]
    fn csv_preserves_non_ascii_bytes_that_xlsx_substitutes() {
        let dir = tempdir().unwrap();
        let relation = relation_with_text(&[0x41, 0xFF, 0x42]);

        let csv_path = dir.path().join("out.csv");
        write_csv(&relation, &csv_path).unwrap();
        let raw = std::fs::read(&csv_path).unwrap();
        assert!(raw.windows(3).any(|w| w == [0x41, 0xFF, 0x42]));

        assert_eq!(xlsx_safe_bytes(&[0x41, 0xFF, 0x42]), "A?B");
    }
}
