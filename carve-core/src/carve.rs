//! Top-level orchestration: drive the page locator, tuple decoder, schema
//! inferencer and materializer over an input stream, relation by relation.

use std::io::{Read, Seek};

use log::{debug, trace, warn};
use nom::Finish;
use nom_language::error::VerboseError;

use crate::bitmap::{assemble_bitmap, bitmap_prefix};
use crate::error::Result;
use crate::locate::locate_relations;
use crate::materialize::{materialize, MaterializedRow};
use crate::page::line_pointers;
use crate::schema::{current_micros_since_pg_epoch, infer_schema};
use crate::tuple::{parse_tuple_header, HeapTupleHeader, HOFF_ANOMALY_THRESHOLD};

/// How often to emit a progress log line while carving, in successfully
/// materialized rows.
const ROW_PROGRESS_INTERVAL: u64 = 20_000;

#[derive(Debug, Clone)]
pub struct CarvedRow {
    pub row: MaterializedRow,
}

#[derive(Debug, Clone, Default)]
pub struct CarvedRelation {
    pub rows: Vec<CarvedRow>,
    /// Line pointers seen with flags other than `Normal`, counted but never
    /// decoded — HOT-redirected and dead pointers are out of scope.
    pub skipped_pointers: u64,
}

fn body_contains_keyword(body: &[u8], keyword: &[u8]) -> bool {
    if keyword.is_empty() {
        return true;
    }
    let lower_body: Vec<u8> = body.iter().map(|b| b.to_ascii_lowercase()).collect();
    lower_body
        .windows(keyword.len())
        .any(|window| window == keyword)
}

fn decode_tuple_header(page: &[u8], offset: u16) -> Option<HeapTupleHeader> {
    let start = offset as usize;
    let chunk = page.get(start..start + crate::tuple::TUPLE_HEADER_LEN + 1)?;
    match parse_tuple_header::<VerboseError<&[u8]>>(chunk).finish() {
        Ok((_, header)) => Some(header),
        Err(_) => None,
    }
}

/// Carve every relation out of `reader`. `keyword`, if present, is matched
/// case-insensitively against each tuple's raw body before schema inference
/// is attempted; tuples whose body does not contain it are dropped.
pub fn carve_file<R: Read + Seek>(
    reader: &mut R,
    keyword: Option<&[u8]>,
) -> Result<Vec<CarvedRelation>> {
    let lowered_keyword = keyword
        .map(|k| k.iter().map(|b| b.to_ascii_lowercase()).collect::<Vec<u8>>())
        .unwrap_or_default();
    let now_micros = current_micros_since_pg_epoch();

    let located = locate_relations(reader)?;
    let mut carved_relations = Vec::with_capacity(located.len());
    let mut total_rows: u64 = 0;

    for relation in located {
        let mut carved = CarvedRelation::default();

        for page in relation.pages {
            let pointers = line_pointers(&page.bytes, page.header.pointer_count());
            for lp in pointers {
                if !lp.is_live() {
                    carved.skipped_pointers += 1;
                    continue;
                }

                let Some(header) = decode_tuple_header(&page.bytes, lp.offset) else {
                    trace!(
                        "could not decode tuple header at page offset {} / lp offset {}",
                        page.offset,
                        lp.offset
                    );
                    break;
                };
                if !header.is_valid() {
                    trace!(
                        "invalid tuple header at page offset {} / lp offset {}, skipping remaining pointers",
                        page.offset,
                        lp.offset
                    );
                    break;
                }
                if header.hoff > HOFF_ANOMALY_THRESHOLD {
                    warn!(
                        "tuple at page offset {} / lp offset {} has anomalous hoff={}",
                        page.offset, lp.offset, header.hoff
                    );
                }

                let body_start = lp.offset as usize + header.hoff as usize;
                let body_end = lp.offset as usize + lp.length as usize;
                if body_start > body_end {
                    continue;
                }
                let Some(body) = page.bytes.get(body_start..body_end) else {
                    continue;
                };

                if !lowered_keyword.is_empty() && !body_contains_keyword(body, &lowered_keyword) {
                    continue;
                }

                let extra_start = lp.offset as usize + crate::tuple::TUPLE_HEADER_LEN + 1;
                let extra_end = lp.offset as usize + header.hoff as usize;
                let extra_bytes = if extra_end > extra_start {
                    page.bytes.get(extra_start..extra_end).unwrap_or(&[])
                } else {
                    &[]
                };

                let bitmap = assemble_bitmap(header.tbits0, extra_bytes);
                let prefix = bitmap_prefix(&bitmap, header.natts as usize);
                let schema = infer_schema(prefix, body, now_micros);

                match materialize(&schema, body) {
                    Some(row) => {
                        total_rows += 1;
                        if total_rows % ROW_PROGRESS_INTERVAL == 0 {
                            debug!("materialized {total_rows} rows so far");
                        }
                        carved.rows.push(CarvedRow { row });
                    }
                    None => {
                        debug!(
                            "tuple body too short for inferred schema at page offset {} / lp offset {}; body = {}",
                            page.offset,
                            lp.offset,
                            hex_dump(body)
                        );
                    }
                }
            }
        }

        carved_relations.push(carved);
    }

    Ok(carved_relations)
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}
