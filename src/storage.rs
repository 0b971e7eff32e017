//! StructuredStorage (§4.2): extraction of named sub-streams from the two
//! container formats legacy Mac word-processor files arrive wrapped in —
//! AppleDouble (resource fork + finder info carried alongside a data fork)
//! and classic OLE2 compound documents (used by Microsoft Word for
//! Windows). The latter backs [`crate::stream::Stream`]'s
//! `is_ole`/`list_ole_entries`/`open_ole` operations; the former is used
//! directly by per-format parsers that need to recover a document dropped
//! onto a foreign (non-Mac) filesystem.

use crate::error::{MwawError, Result};
use std::collections::HashMap;

const APPLEDOUBLE_MAGIC: u32 = 0x0005_1607;
const APPLEDOUBLE_VERSION: u32 = 0x0002_0000;

const ENTRY_ID_RESOURCE_FORK: u32 = 2;
const ENTRY_ID_FINDER_INFO: u32 = 9;

/// One entry of an AppleDouble container, keyed by its symbolic name when
/// known (`"resource-fork"`, `"finder-info"`) or `"entry-<id>"` otherwise,
/// per §4.2's "unknown ids are preserved verbatim".
pub fn parse_applestream(bytes: &[u8]) -> Result<HashMap<String, Vec<u8>>> {
    if bytes.len() < 26 {
        return Err(MwawError::truncated("AppleDouble header"));
    }
    let magic = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let version = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
    if magic != APPLEDOUBLE_MAGIC || version != APPLEDOUBLE_VERSION {
        return Err(MwawError::UnsupportedVersion(format!(
            "not an AppleDouble stream (magic {magic:#010x}, version {version:#010x})"
        )));
    }
    // 16 bytes of filler/padding, then a u16 entry count.
    let count_offset = 8 + 16;
    let count = u16::from_be_bytes(
        bytes
            .get(count_offset..count_offset + 2)
            .ok_or_else(|| MwawError::truncated("AppleDouble entry count"))?
            .try_into()
            .unwrap(),
    ) as usize;

    let mut out = HashMap::with_capacity(count);
    let mut cursor = count_offset + 2;
    for _ in 0..count {
        let entry = bytes
            .get(cursor..cursor + 12)
            .ok_or_else(|| MwawError::truncated("AppleDouble entry descriptor"))?;
        let entry_id = u32::from_be_bytes(entry[0..4].try_into().unwrap());
        let offset = u32::from_be_bytes(entry[4..8].try_into().unwrap()) as usize;
        let length = u32::from_be_bytes(entry[8..12].try_into().unwrap()) as usize;
        cursor += 12;

        let data = bytes
            .get(offset..offset + length)
            .ok_or_else(|| MwawError::truncated("AppleDouble entry data"))?
            .to_vec();
        let name = match entry_id {
            ENTRY_ID_RESOURCE_FORK => "resource-fork".to_string(),
            ENTRY_ID_FINDER_INFO => "finder-info".to_string(),
            other => format!("entry-{other}"),
        };
        out.insert(name, data);
    }
    Ok(out)
}

/// Produces the compound bytes consumed by downstream ODF-packaging
/// tooling — the inverse of [`parse_applestream`] restricted to the two
/// entries this crate ever produces.
pub fn emit_applestream(finder_info: Option<&[u8]>, resource_fork: Option<&[u8]>) -> Vec<u8> {
    let mut entries = Vec::new();
    if let Some(fi) = finder_info {
        entries.push((ENTRY_ID_FINDER_INFO, fi));
    }
    if let Some(rf) = resource_fork {
        entries.push((ENTRY_ID_RESOURCE_FORK, rf));
    }

    let header_len = 8 + 16 + 2;
    let table_len = entries.len() * 12;
    let mut out = Vec::with_capacity(header_len + table_len);
    out.extend_from_slice(&APPLEDOUBLE_MAGIC.to_be_bytes());
    out.extend_from_slice(&APPLEDOUBLE_VERSION.to_be_bytes());
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());

    let mut offset = (header_len + table_len) as u32;
    for (id, data) in &entries {
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        offset += data.len() as u32;
    }
    for (_, data) in &entries {
        out.extend_from_slice(data);
    }
    out
}

/// One decoded record from a PC-Exchange-style `FINDER.DAT` table: a long
/// Mac filename plus the 32-byte Finder info that would otherwise have
/// been lost when the file was copied onto a non-Mac (FAT) volume, and the
/// 8.3 name of the sibling resource-fork file under `RESOURCE.FRK/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderDatEntry {
    pub name: String,
    pub finder_info: [u8; 32],
    pub resource_file_name: String,
}

const FINDER_DAT_PAGE_SIZE: usize = 2048;
const FINDER_DAT_RECORDS_PER_PAGE: usize = 21;
const FINDER_DAT_RECORD_SIZE: usize = 92;

/// Walks the fixed-stride record table described in §4.2. Pages are
/// `FINDER_DAT_PAGE_SIZE` bytes regardless of how many of the trailing
/// bytes the 21 records and their documented 24-byte padding actually
/// account for; any residual bytes at the tail of a page are skipped
/// rather than interpreted, since the original format reserves them for
/// purposes this spec does not name.
pub fn parse_finder_dat(bytes: &[u8]) -> Vec<FinderDatEntry> {
    let mut out = Vec::new();
    let mut page_start = 0;
    while page_start < bytes.len() {
        let page_end = (page_start + FINDER_DAT_PAGE_SIZE).min(bytes.len());
        let mut record_start = page_start;
        for _ in 0..FINDER_DAT_RECORDS_PER_PAGE {
            let record_end = record_start + FINDER_DAT_RECORD_SIZE;
            if record_end > page_end {
                break;
            }
            let record = &bytes[record_start..record_end];
            let name_len = (record[0] as usize).min(31);
            let name = mac_roman_to_string(&record[1..1 + name_len]);
            let mut finder_info = [0u8; 32];
            finder_info.copy_from_slice(&record[32..64]);
            let resource_file_name = record[64..76]
                .iter()
                .take_while(|&&b| b != 0)
                .map(|&b| b as char)
                .collect();
            out.push(FinderDatEntry {
                name,
                finder_info,
                resource_file_name,
            });
            record_start = record_end;
        }
        page_start += FINDER_DAT_PAGE_SIZE;
    }
    out
}

fn mac_roman_to_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| crate::encoding::mac_roman_to_unicode(b))
        .collect()
}

/// Classic OLE2 ("compound file binary") support, backing
/// [`crate::stream::Stream`]'s `is_ole`/`list_ole_entries`/`open_ole`.
/// Scoped to the common case (512-byte sectors, major version 3), which
/// covers every Word-for-Windows file this crate targets; 4096-byte-sector
/// (major version 4) containers postdate the formats in scope.
pub(crate) mod ole {
    use super::*;

    const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    const FREESECT: u32 = 0xFFFF_FFFF;
    const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
    const FATSECT: u32 = 0xFFFF_FFFD;
    const DIFSECT: u32 = 0xFFFF_FFFC;
    const HEADER_SIZE: usize = 512;
    const DIFAT_ENTRIES_IN_HEADER: usize = 109;

    struct Header {
        sector_shift: u16,
        mini_sector_shift: u16,
        num_fat_sectors: u32,
        first_dir_sector: u32,
        first_mini_fat_sector: u32,
        num_mini_fat_sectors: u32,
        first_difat_sector: u32,
        num_difat_sectors: u32,
        mini_stream_cutoff: u32,
        difat: [u32; DIFAT_ENTRIES_IN_HEADER],
    }

    fn u16_at(data: &[u8], offset: usize) -> Result<u16> {
        data.get(offset..offset + 2)
            .map(|b| u16::from_le_bytes(b.try_into().unwrap()))
            .ok_or_else(|| MwawError::truncated("OLE header field"))
    }

    fn u32_at(data: &[u8], offset: usize) -> Result<u32> {
        data.get(offset..offset + 4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
            .ok_or_else(|| MwawError::truncated("OLE header field"))
    }

    fn u64_at(data: &[u8], offset: usize) -> Result<u64> {
        data.get(offset..offset + 8)
            .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
            .ok_or_else(|| MwawError::truncated("OLE header field"))
    }

    pub fn has_signature(data: &[u8]) -> bool {
        data.len() >= 8 && data[0..8] == SIGNATURE
    }

    fn read_header(data: &[u8]) -> Result<Header> {
        if !has_signature(data) {
            return Err(MwawError::UnsupportedVersion("not an OLE2 stream".into()));
        }
        if data.len() < HEADER_SIZE {
            return Err(MwawError::truncated("OLE header"));
        }
        let mut difat = [0xFFFF_FFFFu32; DIFAT_ENTRIES_IN_HEADER];
        for (i, slot) in difat.iter_mut().enumerate() {
            *slot = u32_at(data, 76 + i * 4)?;
        }
        Ok(Header {
            sector_shift: u16_at(data, 30)?,
            mini_sector_shift: u16_at(data, 32)?,
            num_fat_sectors: u32_at(data, 44)?,
            first_dir_sector: u32_at(data, 48)?,
            mini_stream_cutoff: u32_at(data, 56)?,
            first_mini_fat_sector: u32_at(data, 60)?,
            num_mini_fat_sectors: u32_at(data, 64)?,
            first_difat_sector: u32_at(data, 68)?,
            num_difat_sectors: u32_at(data, 72)?,
            difat,
        })
    }

    fn sector_size(header: &Header) -> usize {
        1usize << header.sector_shift
    }

    fn mini_sector_size(header: &Header) -> usize {
        1usize << header.mini_sector_shift
    }

    fn sector_bytes<'d>(data: &'d [u8], header: &Header, sector: u32) -> Result<&'d [u8]> {
        let size = sector_size(header);
        let start = HEADER_SIZE + sector as usize * size;
        data.get(start..start + size)
            .ok_or_else(|| MwawError::truncated("OLE sector beyond end of file"))
    }

    /// Gathers every FAT sector (following DIFAT chain entries beyond the
    /// 109 held in the header) into one flat FAT array.
    fn read_fat(data: &[u8], header: &Header) -> Result<Vec<u32>> {
        let mut fat_sector_ids: Vec<u32> = header
            .difat
            .iter()
            .copied()
            .filter(|&s| s != FREESECT)
            .collect();

        let mut difat_sector = header.first_difat_sector;
        let entries_per_difat_sector = sector_size(header) / 4 - 1;
        for _ in 0..header.num_difat_sectors {
            if difat_sector == ENDOFCHAIN || difat_sector == FREESECT {
                break;
            }
            let bytes = sector_bytes(data, header, difat_sector)?;
            for i in 0..entries_per_difat_sector {
                let s = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
                if s != FREESECT {
                    fat_sector_ids.push(s);
                }
            }
            let next = u32::from_le_bytes(
                bytes[entries_per_difat_sector * 4..entries_per_difat_sector * 4 + 4]
                    .try_into()
                    .unwrap(),
            );
            difat_sector = next;
        }

        let entries_per_sector = sector_size(header) / 4;
        let mut fat = Vec::with_capacity(fat_sector_ids.len() * entries_per_sector);
        for &sector in &fat_sector_ids {
            let bytes = sector_bytes(data, header, sector)?;
            for i in 0..entries_per_sector {
                fat.push(u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap()));
            }
        }
        let _ = header.num_fat_sectors;
        Ok(fat)
    }

    /// Follows a regular-FAT chain from `start` into one contiguous buffer,
    /// truncated to `size` bytes if given.
    fn read_chain(data: &[u8], header: &Header, fat: &[u32], start: u32, size: Option<u64>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut sector = start;
        let size_limit = size.map(|s| s as usize);
        while sector != ENDOFCHAIN && sector != FREESECT {
            let bytes = sector_bytes(data, header, sector)?;
            out.extend_from_slice(bytes);
            if let Some(limit) = size_limit {
                if out.len() >= limit {
                    break;
                }
            }
            sector = *fat
                .get(sector as usize)
                .ok_or_else(|| MwawError::malformed_zone("OLE FAT chain runs off the table"))?;
        }
        if let Some(limit) = size_limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    struct DirEntry {
        name: String,
        obj_type: u8,
        left: u32,
        right: u32,
        child: u32,
        start_sector: u32,
        size: u64,
    }

    const NOSTREAM: u32 = 0xFFFF_FFFF;

    fn read_directory(data: &[u8], header: &Header, fat: &[u32]) -> Result<Vec<DirEntry>> {
        let raw = read_chain(data, header, fat, header.first_dir_sector, None)?;
        let mut entries = Vec::with_capacity(raw.len() / 128);
        for chunk in raw.chunks(128) {
            if chunk.len() < 128 {
                break;
            }
            let name_len = u16::from_le_bytes(chunk[64..66].try_into().unwrap()) as usize;
            let name_bytes = &chunk[0..name_len.saturating_sub(2).min(64)];
            let name: String = name_bytes
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .map(|u| char::from_u32(u as u32).unwrap_or('\u{FFFD}'))
                .collect();
            entries.push(DirEntry {
                name,
                obj_type: chunk[66],
                left: u32::from_le_bytes(chunk[68..72].try_into().unwrap()),
                right: u32::from_le_bytes(chunk[72..76].try_into().unwrap()),
                child: u32::from_le_bytes(chunk[76..80].try_into().unwrap()),
                start_sector: u32::from_le_bytes(chunk[116..120].try_into().unwrap()),
                size: u64::from_le_bytes(chunk[120..128].try_into().unwrap()),
            });
        }
        Ok(entries)
    }

    /// Recursively walks the red-black tree rooted at each storage's
    /// `child` pointer, building `path -> directory index`. Root storage
    /// (index 0) is the implicit `/`.
    fn build_paths(entries: &[DirEntry]) -> HashMap<String, usize> {
        let mut paths = HashMap::new();
        if entries.is_empty() {
            return paths;
        }
        fn walk(entries: &[DirEntry], node: u32, prefix: &str, paths: &mut HashMap<String, usize>) {
            if node == NOSTREAM || node as usize >= entries.len() {
                return;
            }
            let e = &entries[node as usize];
            walk(entries, e.left, prefix, paths);
            walk(entries, e.right, prefix, paths);
            let is_dir = e.obj_type == 1 || e.obj_type == 5;
            let full = if prefix.is_empty() {
                e.name.clone()
            } else {
                format!("{prefix}/{}", e.name)
            };
            let key = if is_dir { format!("{full}/") } else { full.clone() };
            paths.insert(key, node as usize);
            if is_dir {
                walk(entries, e.child, &full, paths);
            }
        }
        walk(entries, entries[0].child, "", &mut paths);
        paths
    }

    fn read_mini_fat(data: &[u8], header: &Header, fat: &[u32]) -> Result<Vec<u32>> {
        let raw = read_chain(data, header, fat, header.first_mini_fat_sector, None)?;
        Ok(raw
            .chunks_exact(4)
            .take(header.num_mini_fat_sectors as usize * sector_size(header) / 4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
            .collect())
    }

    fn read_mini_chain(
        mini_stream: &[u8],
        header: &Header,
        mini_fat: &[u32],
        start: u32,
        size: u64,
    ) -> Result<Vec<u8>> {
        let msize = mini_sector_size(header);
        let mut out = Vec::new();
        let mut sector = start;
        while sector != ENDOFCHAIN && sector != FREESECT && out.len() < size as usize {
            let off = sector as usize * msize;
            let chunk = mini_stream
                .get(off..off + msize)
                .ok_or_else(|| MwawError::malformed_zone("mini-FAT chain runs off the mini stream"))?;
            out.extend_from_slice(chunk);
            sector = *mini_fat
                .get(sector as usize)
                .ok_or_else(|| MwawError::malformed_zone("mini-FAT chain runs off the table"))?;
        }
        out.truncate(size as usize);
        Ok(out)
    }

    pub fn list_entries(data: &[u8]) -> Result<Vec<String>> {
        let header = read_header(data)?;
        let fat = read_fat(data, &header)?;
        let entries = read_directory(data, &header, &fat)?;
        let mut names: Vec<String> = build_paths(&entries).into_keys().collect();
        names.sort();
        Ok(names)
    }

    pub fn extract_stream(data: &[u8], path: &str) -> Result<Vec<u8>> {
        let header = read_header(data)?;
        let fat = read_fat(data, &header)?;
        let entries = read_directory(data, &header, &fat)?;
        let paths = build_paths(&entries);
        let idx = *paths
            .get(path)
            .ok_or_else(|| MwawError::missing_reference(format!("no OLE stream named {path:?}")))?;
        let entry = &entries[idx];
        let requested_size = entry.size;

        let in_root_directory = !path.trim_end_matches('/').contains('/');

        let bytes = if requested_size < header.mini_stream_cutoff as u64 && idx != 0 {
            let root = &entries[0];
            let mini_stream = read_chain(data, &header, &fat, root.start_sector, Some(root.size))?;
            let mini_fat = read_mini_fat(data, &header, &fat)?;
            read_mini_chain(&mini_stream, &header, &mini_fat, entry.start_sector, requested_size)?
        } else {
            read_chain(data, &header, &fat, entry.start_sector, Some(requested_size))?
        };

        if (bytes.len() as u64) < requested_size {
            let ratio = bytes.len() as f64 / requested_size.max(1) as f64;
            if in_root_directory && ratio >= 0.5 {
                log::warn!(
                    "OLE entry {path:?} under-read ({}/{} bytes); accepting via root-directory repair concession",
                    bytes.len(),
                    requested_size
                );
            } else {
                return Err(MwawError::truncated(format!(
                    "OLE entry {path:?} under-read: got {} of {} bytes",
                    bytes.len(),
                    requested_size
                )));
            }
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appledouble_round_trip() {
        let finder_info = vec![1u8; 32];
        let resource_fork = vec![2u8; 64];
        let bytes = emit_applestream(Some(&finder_info), Some(&resource_fork));
        let parsed = parse_applestream(&bytes).unwrap();
        assert_eq!(parsed["finder-info"], finder_info);
        assert_eq!(parsed["resource-fork"], resource_fork);
    }

    #[test]
    fn appledouble_rejects_bad_magic() {
        let bytes = vec![0u8; 32];
        assert!(parse_applestream(&bytes).is_err());
    }

    #[test]
    fn appledouble_preserves_unknown_entry_ids() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&APPLEDOUBLE_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&APPLEDOUBLE_VERSION.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&99u32.to_be_bytes()); // unknown entry id
        bytes.extend_from_slice(&30u32.to_be_bytes()); // offset
        bytes.extend_from_slice(&3u32.to_be_bytes()); // length
        bytes.extend_from_slice(&[7, 8, 9]);
        let parsed = parse_applestream(&bytes).unwrap();
        assert_eq!(parsed["entry-99"], vec![7, 8, 9]);
    }
}
