//! HeapTupleHeader decoding and validation.

use nom::bytes::complete::take;
use nom::error::ParseError;
use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::IResult;

/// Fixed 23-byte heap tuple header fields, plus the first byte of the null bitmap.
pub const TUPLE_HEADER_LEN: usize = 23;
/// Minimum legal `t_hoff`: a tuple header can never be shorter than this.
pub const MIN_HOFF: u8 = 24;
/// `t_hoff` above this is logged as an anomaly, though still processed.
pub const HOFF_ANOMALY_THRESHOLD: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapTupleHeader {
    pub xmin: u32,
    pub xmax: u32,
    pub cid: u32,
    pub ctid: [u8; 6],
    pub natts: u8,
    pub flags: u8,
    pub infomask: u16,
    pub hoff: u8,
    pub tbits0: u8,
}

impl HeapTupleHeader {
    /// xmin/xmax/hoff/natts sanity checks per the on-disk invariants; xids are
    /// compared as unsigned wrapping counters.
    pub fn is_valid(&self) -> bool {
        !(self.xmin == 0 || self.xmin > self.xmax) && self.hoff >= MIN_HOFF && self.natts != 0
    }
}

pub fn parse_tuple_header<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], HeapTupleHeader, E> {
    let (input, xmin) = le_u32(input)?;
    let (input, xmax) = le_u32(input)?;
    let (input, cid) = le_u32(input)?;
    let (input, ctid_slice) = take(6usize)(input)?;
    let (input, natts) = le_u8(input)?;
    let (input, flags) = le_u8(input)?;
    let (input, infomask) = le_u16(input)?;
    let (input, hoff) = le_u8(input)?;
    let (input, tbits0) = le_u8(input)?;
    let mut ctid = [0u8; 6];
    ctid.copy_from_slice(ctid_slice);
    Ok((
        input,
        HeapTupleHeader {
            xmin,
            xmax,
            cid,
            ctid,
            natts,
            flags,
            infomask,
            hoff,
            tbits0,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom_language::error::VerboseError;
    use pretty_assertions::assert_eq;

    fn header_bytes(xmin: u32, xmax: u32, natts: u8, hoff: u8, tbits0: u8) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&xmin.to_le_bytes());
        b.extend_from_slice(&xmax.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes()); // cid
        b.extend_from_slice(&[0u8; 6]); // ctid
        b.push(natts);
        b.push(0); // flags
        b.extend_from_slice(&0u16.to_le_bytes()); // infomask
        b.push(hoff);
        b.push(tbits0);
        b
    }

    #[test]
    fn parses_and_validates_a_simple_header() {
        let bytes = header_bytes(1, 0, 1, 24, 0x01);
        let (rest, header) = parse_tuple_header::<VerboseError<&[u8]>>(&bytes).unwrap();
        assert!(rest.is_empty());
        assert!(header.is_valid());
        assert_eq!(header.natts, 1);
        assert_eq!(header.hoff, 24);
    }

    #[test]
    fn rejects_zero_xmin() {
        let bytes = header_bytes(0, 0, 1, 24, 0x01);
        let (_, header) = parse_tuple_header::<VerboseError<&[u8]>>(&bytes).unwrap();
        assert!(!header.is_valid());
    }

    #[test]
    fn rejects_xmin_greater_than_xmax() {
        let bytes = header_bytes(5, 1, 1, 24, 0x01);
        let (_, header) = parse_tuple_header::<VerboseError<&[u8]>>(&bytes).unwrap();
        assert!(!header.is_valid());
    }

    #[test]
    fn rejects_short_hoff_and_zero_natts() {
        let (_, h1) = parse_tuple_header::<VerboseError<&[u8]>>(&header_bytes(1, 0, 1, 23, 0))
            .unwrap();
        assert!(!h1.is_valid());
        let (_, h2) = parse_tuple_header::<VerboseError<&[u8]>>(&header_bytes(1, 0, 0, 24, 0))
            .unwrap();
        assert!(!h2.is_valid());
    }
}
