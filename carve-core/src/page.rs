//! Page header validation and line-pointer decoding.

use bitter::{BitReader, LittleEndianReader};
use nom::error::ParseError;
use nom::number::complete::{le_u16, le_u32, le_u64};
use nom::IResult;

/// PostgreSQL's fixed heap page size.
pub const PAGE_SIZE: usize = 8192;
/// Size of the fixed portion of a `PageHeaderData`, before the line pointer array.
pub const PAGE_HEADER_LEN: usize = 24;
/// Byte width of a single line pointer (`ItemIdData`).
pub const LINE_POINTER_LEN: usize = 4;
/// Stride the page locator sweeps the input stream at.
pub const SECTOR_STRIDE: usize = 512;
/// `pd_pagesize_version` value this carver recognizes (8192-byte pages, layout version 4).
pub const EXPECTED_PAGE_VERSION: u16 = 8196;
/// Upper bound on line pointers derivable from an 8 KiB page.
pub const MAX_POINTERS: usize = 341;

/// The fixed 24-byte prefix of a PostgreSQL heap page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub lsn: u64,
    pub tli: u16,
    pub flags: u16,
    pub lower: u16,
    pub upper: u16,
    pub special: u16,
    pub page_ver: u16,
    pub prune_xid: u32,
}

impl PageHeader {
    /// Number of line pointers implied by `lower`, per `(lower - 24) / 4`.
    pub fn pointer_count(&self) -> usize {
        if (self.lower as usize) < PAGE_HEADER_LEN {
            return 0;
        }
        (self.lower as usize - PAGE_HEADER_LEN) / LINE_POINTER_LEN
    }

    /// Whether this header passes all heap-page plausibility checks.
    pub fn is_valid(&self) -> bool {
        self.lsn != 0
            && self.pointer_count() <= MAX_POINTERS
            && self.upper > 0
            && self.upper as usize <= PAGE_SIZE
            && self.upper >= self.lower
            && self.page_ver == EXPECTED_PAGE_VERSION
    }
}

pub fn parse_page_header<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], PageHeader, E> {
    let (input, lsn) = le_u64(input)?;
    let (input, tli) = le_u16(input)?;
    let (input, flags) = le_u16(input)?;
    let (input, lower) = le_u16(input)?;
    let (input, upper) = le_u16(input)?;
    let (input, special) = le_u16(input)?;
    let (input, page_ver) = le_u16(input)?;
    let (input, prune_xid) = le_u32(input)?;
    Ok((
        input,
        PageHeader {
            lsn,
            tli,
            flags,
            lower,
            upper,
            special,
            page_ver,
            prune_xid,
        },
    ))
}

/// State of a line pointer, per `ItemIdData.lp_flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpFlags {
    Unused,
    Normal,
    Redirect,
    Dead,
}

impl From<u8> for LpFlags {
    fn from(bits: u8) -> Self {
        match bits & 0x3 {
            0 => LpFlags::Unused,
            1 => LpFlags::Normal,
            2 => LpFlags::Redirect,
            _ => LpFlags::Dead,
        }
    }
}

/// A decoded line pointer (`ItemIdData`): length, flags and offset of a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePointer {
    pub length: u16,
    pub flags: LpFlags,
    pub offset: u16,
}

impl LinePointer {
    /// Whether this pointer is eligible for tuple decoding: a normal (non-redirect,
    /// non-dead) pointer whose tuple fits entirely inside the page.
    pub fn is_live(&self) -> bool {
        self.flags == LpFlags::Normal
            && self.length >= PAGE_HEADER_LEN as u16
            && self.offset >= PAGE_HEADER_LEN as u16
            && (self.offset as usize) <= PAGE_SIZE.saturating_sub(self.length as usize)
    }
}

/// Decode a single 4-byte line pointer. The on-disk layout packs `lp_off` in the
/// low 15 bits, `lp_flags` in the next 2, and `lp_len` in the high 15 bits.
fn parse_line_pointer(bytes: &[u8; LINE_POINTER_LEN]) -> LinePointer {
    let mut bits = LittleEndianReader::new(bytes);
    let offset = bits.read_bits(15).unwrap_or(0) as u16;
    let flags = bits.read_bits(2).unwrap_or(0) as u8;
    let length = bits.read_bits(15).unwrap_or(0) as u16;
    LinePointer {
        length,
        flags: LpFlags::from(flags),
        offset,
    }
}

/// Read `count` consecutive line pointers starting at offset 24 in `page`.
pub fn line_pointers(page: &[u8], count: usize) -> Vec<LinePointer> {
    let mut pointers = Vec::with_capacity(count);
    let mut pos = PAGE_HEADER_LEN;
    for _ in 0..count {
        let Some(chunk) = page.get(pos..pos + LINE_POINTER_LEN) else {
            break;
        };
        let bytes: [u8; LINE_POINTER_LEN] = chunk.try_into().expect("slice is 4 bytes");
        pointers.push(parse_line_pointer(&bytes));
        pos += LINE_POINTER_LEN;
    }
    pointers
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom_language::error::VerboseError;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_valid_header() {
        let mut input = vec![0u8; PAGE_HEADER_LEN];
        input[0] = 1; // lsn = 1
        input[12..14].copy_from_slice(&24u16.to_le_bytes()); // lower
        input[14..16].copy_from_slice(&8192u16.to_le_bytes()); // upper
        input[18..20].copy_from_slice(&8196u16.to_le_bytes()); // page_ver
        let (rest, header) = parse_page_header::<VerboseError<&[u8]>>(&input).unwrap();
        assert!(rest.is_empty());
        assert!(header.is_valid());
        assert_eq!(header.pointer_count(), 0);
    }

    #[test]
    fn rejects_wrong_page_version() {
        let mut input = vec![0u8; PAGE_HEADER_LEN];
        input[0] = 1;
        input[12..14].copy_from_slice(&24u16.to_le_bytes());
        input[14..16].copy_from_slice(&8192u16.to_le_bytes());
        input[18..20].copy_from_slice(&4u16.to_le_bytes());
        let (_, header) = parse_page_header::<VerboseError<&[u8]>>(&input).unwrap();
        assert!(!header.is_valid());
    }

    #[test]
    fn rejects_zero_lsn() {
        let mut input = vec![0u8; PAGE_HEADER_LEN];
        input[12..14].copy_from_slice(&24u16.to_le_bytes());
        input[14..16].copy_from_slice(&8192u16.to_le_bytes());
        input[18..20].copy_from_slice(&8196u16.to_le_bytes());
        let (_, header) = parse_page_header::<VerboseError<&[u8]>>(&input).unwrap();
        assert!(!header.is_valid());
    }

    #[test]
    fn decodes_line_pointer_layout() {
        // length=28, flags=Normal(1), offset=8164
        let value: u32 = (8164u32) | (1u32 << 15) | (28u32 << 17);
        let bytes = value.to_le_bytes();
        let lp = parse_line_pointer(&bytes);
        assert_eq!(lp.length, 28);
        assert_eq!(lp.flags, LpFlags::Normal);
        assert_eq!(lp.offset, 8164);
        assert!(lp.is_live());
    }

    #[test]
    fn rejects_redirect_and_dead_pointers() {
        let redirect: u32 = 100 | (2u32 << 15) | (28u32 << 17);
        let dead: u32 = 100 | (3u32 << 15) | (28u32 << 17);
        assert!(!parse_line_pointer(&redirect.to_le_bytes()).is_live());
        assert!(!parse_line_pointer(&dead.to_le_bytes()).is_live());
    }
}
