//! Turning an inferred schema plus raw tuple bytes into typed, printable values.

use crate::schema::{fingerprint, Kind, SchemaField};
use chrono::{NaiveDate, TimeDelta};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Timestamp(String),
    /// Raw tuple bytes for a varlena field. Kept unsanitized so a sink that
    /// wants the original bytes (CSV) can have them; a sink that needs valid
    /// text (XLSX) is responsible for its own substitution.
    Text(Vec<u8>),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedRow {
    pub values: Vec<Value>,
    /// The schema fingerprint this row was materialized against, carried
    /// along so rows from differently-shaped tuples can be grouped per relation.
    pub fingerprint: String,
}

fn pg_epoch() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
}

fn format_timestamp(micros: u64) -> String {
    let delta = TimeDelta::microseconds(micros as i64);
    match pg_epoch().checked_add_signed(delta) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => format!("<{micros}us since 2000-01-01>"),
    }
}

/// Read `body` according to `schema`, producing one [`Value`] per visible
/// field. Returns `None` if the schema's declared widths run past the end of
/// `body` — a short body the inferencer itself did not catch.
pub fn materialize(schema: &[SchemaField], body: &[u8]) -> Option<MaterializedRow> {
    let mut values = Vec::with_capacity(schema.len());
    let mut pos = 0usize;

    for field in schema {
        match field.kind {
            Kind::U => {
                pos += field.width;
            }
            Kind::P => {
                pos += field.width;
            }
            Kind::D => {
                let chunk = body.get(pos..pos + 4)?;
                let v = i32::from_le_bytes(chunk.try_into().expect("4 bytes"));
                values.push(Value::Int(v));
                pos += 4;
            }
            Kind::Q => {
                let chunk = body.get(pos..pos + 8)?;
                let v = u64::from_le_bytes(chunk.try_into().expect("8 bytes"));
                values.push(Value::Timestamp(format_timestamp(v)));
                pos += 8;
            }
            Kind::S => {
                if field.width == 0 {
                    values.push(Value::Null);
                    continue;
                }
                let chunk = body.get(pos..pos + field.width)?;
                values.push(Value::Text(chunk.to_vec()));
                pos += field.width;
            }
            Kind::N => {}
        }
    }

    Some(MaterializedRow {
        values,
        fingerprint: fingerprint(schema),
    })
}
