//! Schema inference: guessing a tuple's attribute layout from its bytes and
//! null bitmap, without any catalog.

use chrono::{NaiveDate, Utc};

/// Maximum consecutive padding (`P`) emissions before the inferencer gives up
/// and returns the schema built so far. PostgreSQL alignment never pads more
/// than 7 bytes for any type this carver recognizes.
const MAX_CONSECUTIVE_PADDING: u32 = 7;

/// Tag for one element of an inferred schema vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// 4-byte signed integer.
    D,
    /// 8-byte PostgreSQL timestamp.
    Q,
    /// Variable-length text payload of known byte width.
    S,
    /// Varlena length prefix (1 or 4 bytes), paired with the following `S`.
    U,
    /// Alignment padding byte.
    P,
    /// A null attribute contributing no bytes. Reserved: current inference
    /// rules represent nulls as zero-width `S`, not `N`.
    N,
}

impl Kind {
    /// Whether this kind contributes to the user-visible schema fingerprint.
    pub fn is_visible(self) -> bool {
        !matches!(self, Kind::U | Kind::P)
    }

    pub fn as_char(self) -> char {
        match self {
            Kind::D => 'D',
            Kind::Q => 'Q',
            Kind::S => 'S',
            Kind::U => 'U',
            Kind::P => 'P',
            Kind::N => 'N',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaField {
    pub kind: Kind,
    pub width: usize,
}

/// Microseconds between the PostgreSQL epoch (2000-01-01) and the given date.
fn micros_since_pg_epoch(date: NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time");
    let target = date.and_hms_opt(0, 0, 0).expect("valid time");
    (target - epoch).num_microseconds().expect("fits in i64")
}

/// Microseconds from the PostgreSQL epoch to the current wall-clock time.
/// Used as the plausibility upper bound for timestamp detection (rule 3).
pub fn current_micros_since_pg_epoch() -> u64 {
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
        .and_utc();
    (Utc::now() - epoch).num_microseconds().unwrap_or(0).max(0) as u64
}

/// Lower bound for timestamp plausibility: one year after the PostgreSQL epoch.
fn lower_bound_micros() -> u64 {
    micros_since_pg_epoch(NaiveDate::from_ymd_opt(2001, 1, 1).expect("valid date")) as u64
}

fn is_plausible_timestamp(v: u64, now_micros: u64) -> bool {
    v > lower_bound_micros() && v < now_micros
}

fn is_printable(byte: u8) -> bool {
    (32..=126).contains(&byte) || byte == 0x0A
}

/// Decode a 1-byte varlena header at `body[pos]`, returning the payload size
/// if it looks like a genuine short varlena (odd header byte, printable
/// payload, not one of the spurious zero-padded cases).
fn decode_varlena1(body: &[u8], pos: usize) -> Option<usize> {
    let b = *body.get(pos)?;
    if b == 0 || b % 2 == 0 || b < 5 {
        return None;
    }
    let size = ((b >> 1) & 0x7F) as i32 - 1;
    if size < 0 {
        return None;
    }
    let size = size as usize;
    let payload = body.get(pos + 1..pos + 1 + size)?;
    if !payload.iter().all(|&c| is_printable(c)) {
        return None;
    }
    if (b == 5 || b == 7) && body.get(pos + 1) == Some(&0u8) {
        return None;
    }
    Some(size)
}

/// Decode a 4-byte varlena header at `body[pos..pos+4]`, returning the payload
/// size if it is a plausible long-varlena (size strictly between 126 and 8192).
fn decode_varlena4(body: &[u8], pos: usize) -> Option<i64> {
    let chunk: [u8; 4] = body.get(pos..pos + 4)?.try_into().ok()?;
    let v = i32::from_le_bytes(chunk);
    let size = ((v >> 2) & 0x7FFF_FFFF) as i64 - 4;
    if size > 126 && size < 8192 {
        Some(size)
    } else {
        None
    }
}

/// Walk `body` attribute by attribute, consulting `bitmap` (already truncated
/// to `natts` characters), and infer a schema vector.
///
/// `now_micros` is the plausibility upper bound for timestamp detection
/// (`schema::current_micros_since_pg_epoch()` in production, a fixed value in
/// tests). Terminates early, returning the schema built so far, when the body
/// is exhausted or the padding cap is hit — this is a recoverable condition,
/// not a failure.
pub fn infer_schema(bitmap: &str, body: &[u8], now_micros: u64) -> Vec<SchemaField> {
    let natts = bitmap.len();
    let bits: Vec<u8> = bitmap.bytes().collect();
    let mut schema = Vec::new();
    let mut pos = 0usize;
    let mut counter = 0usize;
    let mut padding_run = 0u32;

    while counter < natts {
        if counter == 0 {
            if body.get(0..4).is_none() {
                break;
            }
            schema.push(SchemaField { kind: Kind::D, width: 4 });
            pos += 4;
            counter += 1;
            continue;
        }

        if bits[counter] == b'0' {
            schema.push(SchemaField { kind: Kind::S, width: 0 });
            counter += 1;
            continue;
        }

        if let Some(chunk) = body.get(pos..pos + 8) {
            let v = u64::from_le_bytes(chunk.try_into().expect("8 bytes"));
            if is_plausible_timestamp(v, now_micros) {
                schema.push(SchemaField { kind: Kind::Q, width: 8 });
                pos += 8;
                counter += 1;
                padding_run = 0;
                continue;
            }
        }

        if pos >= body.len() {
            break;
        }

        if let Some(size) = decode_varlena1(body, pos) {
            schema.push(SchemaField { kind: Kind::U, width: 1 });
            schema.push(SchemaField { kind: Kind::S, width: size });
            pos += size + 1;
            counter += 1;
            padding_run = 0;
            continue;
        }

        if body[pos] == 0 {
            schema.push(SchemaField { kind: Kind::P, width: 1 });
            pos += 1;
            padding_run += 1;
            if padding_run > MAX_CONSECUTIVE_PADDING {
                break;
            }
            continue;
        }
        padding_run = 0;

        match decode_varlena4(body, pos) {
            Some(size) => {
                schema.push(SchemaField { kind: Kind::U, width: 4 });
                schema.push(SchemaField {
                    kind: Kind::S,
                    width: size as usize,
                });
                pos += 4 + size as usize;
                counter += 1;
                continue;
            }
            None => {
                if pos + 4 > body.len() {
                    break;
                }
                schema.push(SchemaField { kind: Kind::D, width: 4 });
                pos += 4;
                counter += 1;
            }
        }
    }

    schema
}

/// Concatenate the kind characters of every non-`U`/non-`P` element — the
/// user-visible schema fingerprint.
pub fn fingerprint(schema: &[SchemaField]) -> String {
    schema
        .iter()
        .filter(|f| f.kind.is_visible())
        .map(|f| f.kind.as_char())
        .collect()
}
