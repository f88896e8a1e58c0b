//! Sweeping a raw byte stream for heap pages and grouping adjacent pages
//! into relations.

use std::io::{Read, Seek, SeekFrom};

use log::{debug, trace};
use nom::Finish;
use nom_language::error::VerboseError;

use crate::error::Result;
use crate::page::{parse_page_header, PageHeader, PAGE_SIZE};

/// A single heap page located in the input stream.
#[derive(Debug, Clone)]
pub struct LocatedPage {
    /// Byte offset of this page in the input stream.
    pub offset: u64,
    pub header: PageHeader,
    pub bytes: Vec<u8>,
}

/// A run of pages found back-to-back (contiguous or exactly one page apart),
/// treated as belonging to the same relation file.
#[derive(Debug, Clone, Default)]
pub struct Relation {
    pub pages: Vec<LocatedPage>,
}

/// How often to emit a progress log line while sweeping, in validated pages.
const PROGRESS_INTERVAL: u64 = 2000;

/// Sweep `reader`, attempting to parse and validate a heap page header at
/// each candidate offset. Adjacent validated pages (offset deltas of 0 or
/// exactly [`PAGE_SIZE`]) are grouped into a single [`Relation`]; any gap
/// starts a new one.
///
/// The cursor advances by a full [`PAGE_SIZE`] after every candidate, whether
/// or not the header validated — pages not aligned to an 8 KiB boundary from
/// the start of the stream are invisible to this sweep. A true 512-byte
/// stride would be more thorough but is not this carver's default.
pub fn locate_relations<R: Read + Seek>(reader: &mut R) -> Result<Vec<Relation>> {
    let total_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let mut relations: Vec<Relation> = Vec::new();
    let mut validated_count: u64 = 0;
    let mut last_page_end: Option<u64> = None;
    let mut offset = 0u64;
    let mut buf = vec![0u8; PAGE_SIZE];

    while offset + PAGE_SIZE as u64 <= total_len {
        reader.seek(SeekFrom::Start(offset))?;
        if reader.read_exact(&mut buf).is_err() {
            break;
        }

        match parse_page_header::<VerboseError<&[u8]>>(&buf).finish() {
            Ok((_, header)) if header.is_valid() => {
                validated_count += 1;
                if validated_count % PROGRESS_INTERVAL == 0 {
                    debug!("located {validated_count} valid pages (at byte offset {offset})");
                }

                let starts_new_relation = match last_page_end {
                    Some(end) => offset != end,
                    None => true,
                };
                if starts_new_relation || relations.is_empty() {
                    relations.push(Relation::default());
                }
                relations
                    .last_mut()
                    .expect("just pushed")
                    .pages
                    .push(LocatedPage {
                        offset,
                        header,
                        bytes: buf.clone(),
                    });
                last_page_end = Some(offset + PAGE_SIZE as u64);
            }
            _ => {
                trace!("no valid page header at offset {offset}");
            }
        }
        offset += PAGE_SIZE as u64;
    }

    relations.retain(|r| !r.pages.is_empty());
    Ok(relations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn valid_page(lsn: u64) -> Vec<u8> {
        let mut page = vec![0u8; PAGE_SIZE];
        page[0..8].copy_from_slice(&lsn.to_le_bytes());
        page[12..14].copy_from_slice(&24u16.to_le_bytes()); // lower: no pointers
        page[14..16].copy_from_slice(&(PAGE_SIZE as u16).to_le_bytes()); // upper
        page[18..20].copy_from_slice(&8196u16.to_le_bytes()); // page_ver
        page
    }

    #[test]
    fn finds_a_single_page_as_its_own_relation() {
        let mut data = vec![0u8; PAGE_SIZE];
        data.extend(valid_page(1));
        let mut cursor = Cursor::new(data);
        let relations = locate_relations(&mut cursor).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].pages.len(), 1);
        assert_eq!(relations[0].pages[0].offset, PAGE_SIZE as u64);
    }

    #[test]
    fn groups_contiguous_pages_and_splits_on_gaps() {
        let mut data = valid_page(1);
        data.extend(valid_page(2));
        data.extend(vec![0u8; PAGE_SIZE * 2]);
        data.extend(valid_page(3));
        let mut cursor = Cursor::new(data);
        let relations = locate_relations(&mut cursor).unwrap();
        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].pages.len(), 2);
        assert_eq!(relations[1].pages.len(), 1);
    }

    #[test]
    fn empty_input_yields_no_relations() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        let relations = locate_relations(&mut cursor).unwrap();
        assert!(relations.is_empty());
    }
}
