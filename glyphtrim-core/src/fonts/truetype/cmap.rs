//! Character-to-glyph map (`cmap`) reading and writing

use crate::error::{FontError, Result};
use crate::fonts::binary::{read_i16, read_u16, read_u32, set_u16, set_u32, write_u16, write_u32};
use std::collections::BTreeMap;

/// Character to glyph mapping
#[derive(Debug, Clone, PartialEq)]
pub struct CmapSubtable {
    /// Platform ID
    pub platform_id: u16,
    /// Platform-specific encoding ID
    pub encoding_id: u16,
    /// Format of the cmap subtable
    pub format: u16,
    /// Character to glyph index mapping (glyph 0 entries omitted)
    pub mappings: BTreeMap<u32, u16>,
}

impl CmapSubtable {
    pub fn glyph_id(&self, code: u32) -> Option<u16> {
        self.mappings.get(&code).copied()
    }
}

/// Parse one subtable; `Ok(None)` for formats that are not read
pub(crate) fn parse_subtable(
    cmap: &[u8],
    offset: usize,
    platform_id: u16,
    encoding_id: u16,
    num_glyphs: u16,
) -> Result<Option<CmapSubtable>> {
    let format = read_u16(cmap, offset)?;
    let mut mappings = BTreeMap::new();
    let mut insert = |code: u32, glyph_id: u16| {
        if glyph_id != 0 && glyph_id < num_glyphs {
            mappings.insert(code, glyph_id);
        }
    };

    match format {
        0 => {
            // Format 0: Byte encoding table
            if offset + 262 > cmap.len() {
                return Err(FontError::malformed(offset, "Format 0 cmap subtable too small"));
            }
            for code in 0..256 {
                insert(code as u32, cmap[offset + 6 + code] as u16);
            }
        }
        4 => {
            // Format 4: Segment mapping to delta values
            let seg_count_x2 = read_u16(cmap, offset + 6)? as usize;
            let seg_count = seg_count_x2 / 2;

            let end_codes = offset + 14;
            let start_codes = end_codes + seg_count_x2 + 2;
            let id_deltas = start_codes + seg_count_x2;
            let id_range_offsets = id_deltas + seg_count_x2;

            for i in 0..seg_count {
                let end_code = read_u16(cmap, end_codes + i * 2)?;
                let start_code = read_u16(cmap, start_codes + i * 2)?;
                let id_delta = read_i16(cmap, id_deltas + i * 2)?;
                let id_range_offset = read_u16(cmap, id_range_offsets + i * 2)?;

                if start_code == 0xFFFF {
                    break;
                }

                for code in start_code..=end_code {
                    let glyph_id = if id_range_offset == 0 {
                        (code as i32 + id_delta as i32) as u16
                    } else {
                        let glyph_index_offset = id_range_offsets
                            + i * 2
                            + id_range_offset as usize
                            + 2 * (code - start_code) as usize;
                        match read_u16(cmap, glyph_index_offset)? {
                            0 => 0,
                            raw => (raw as i32 + id_delta as i32) as u16,
                        }
                    };
                    insert(code as u32, glyph_id);
                }
            }
        }
        6 => {
            // Format 6: Trimmed mapping table
            let first_code = read_u16(cmap, offset + 6)? as u32;
            let entry_count = read_u16(cmap, offset + 8)? as usize;
            for i in 0..entry_count {
                insert(first_code + i as u32, read_u16(cmap, offset + 10 + i * 2)?);
            }
        }
        12 => {
            // Format 12: Segmented coverage
            let num_groups = read_u32(cmap, offset + 12)? as usize;
            for group in 0..num_groups {
                let record = offset + 16 + group * 12;
                let start_char_code = read_u32(cmap, record)?;
                let end_char_code = read_u32(cmap, record + 4)?;
                let start_glyph_id = read_u32(cmap, record + 8)?;

                if end_char_code < start_char_code {
                    return Err(FontError::malformed(record, "Format 12 group ends before it starts"));
                }

                for i in 0..=(end_char_code - start_char_code) {
                    let glyph_id = start_glyph_id.saturating_add(i);
                    if glyph_id >= num_glyphs as u32 {
                        break;
                    }
                    insert(start_char_code + i, glyph_id as u16);
                }
            }
        }
        _ => return Ok(None),
    }

    Ok(Some(CmapSubtable {
        platform_id,
        encoding_id,
        format,
        mappings,
    }))
}

/// Builds a `cmap` table from per-encoding mappings
#[derive(Debug, Default)]
pub struct CmapWriter {
    subtables: BTreeMap<(u16, u16), BTreeMap<u32, u16>>,
}

impl CmapWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the mappings for a platform/encoding pair
    pub fn add(&mut self, platform_id: u16, encoding_id: u16, mappings: BTreeMap<u32, u16>) {
        self.subtables.insert((platform_id, encoding_id), mappings);
    }

    pub fn is_empty(&self) -> bool {
        self.subtables.is_empty()
    }

    /// Serialize the table, choosing the smallest fitting format per subtable
    pub fn build(&self) -> Vec<u8> {
        let mut cmap = Vec::new();
        write_u16(&mut cmap, 0); // Version
        write_u16(&mut cmap, self.subtables.len() as u16);

        let records_start = cmap.len();
        for &(platform_id, encoding_id) in self.subtables.keys() {
            write_u16(&mut cmap, platform_id);
            write_u16(&mut cmap, encoding_id);
            write_u32(&mut cmap, 0); // Offset, patched below
        }

        for (i, ((platform_id, _), mappings)) in self.subtables.iter().enumerate() {
            let offset = cmap.len() as u32;
            set_u32(&mut cmap, records_start + i * 8 + 4, offset);

            let max_code = mappings.keys().next_back().copied().unwrap_or(0);
            let max_glyph = mappings.values().max().copied().unwrap_or(0);
            let subtable = if *platform_id == 1 && max_code <= 0xFF && max_glyph <= 0xFF {
                format0(mappings)
            } else if max_code < 0xFFFF {
                format4(mappings)
            } else {
                format12(mappings)
            };
            cmap.extend(subtable);
        }

        cmap
    }
}

/// Runs of consecutive codes mapping to consecutive glyphs
fn contiguous_runs(mappings: &BTreeMap<u32, u16>) -> Vec<(u32, u32, u16)> {
    let mut runs: Vec<(u32, u32, u16)> = Vec::new();
    for (&code, &glyph) in mappings {
        match runs.last_mut() {
            Some((start, end, start_glyph))
                if code == *end + 1 && glyph as u32 == *start_glyph as u32 + (code - *start) =>
            {
                *end = code;
            }
            _ => runs.push((code, code, glyph)),
        }
    }
    runs
}

fn format0(mappings: &BTreeMap<u32, u16>) -> Vec<u8> {
    let mut table = Vec::with_capacity(262);
    write_u16(&mut table, 0); // Format
    write_u16(&mut table, 262); // Length
    write_u16(&mut table, 0); // Language
    for code in 0..256u32 {
        table.push(mappings.get(&code).copied().unwrap_or(0) as u8);
    }
    table
}

fn format4(mappings: &BTreeMap<u32, u16>) -> Vec<u8> {
    let mut segments: Vec<(u16, u16, i16)> = contiguous_runs(mappings)
        .into_iter()
        .map(|(start, end, glyph)| {
            let delta = (glyph as i32 - start as i32) as i16;
            (start as u16, end as u16, delta)
        })
        .collect();
    // Final segment
    segments.push((0xFFFF, 0xFFFF, 1));

    let seg_count = segments.len();
    let (search_range, entry_selector, range_shift) = super::search_params(seg_count, 2);

    let mut table = Vec::new();
    write_u16(&mut table, 4); // Format
    write_u16(&mut table, 0); // Length (placeholder)
    write_u16(&mut table, 0); // Language
    write_u16(&mut table, (seg_count * 2) as u16);
    write_u16(&mut table, search_range);
    write_u16(&mut table, entry_selector);
    write_u16(&mut table, range_shift);

    for &(_, end, _) in &segments {
        write_u16(&mut table, end);
    }
    write_u16(&mut table, 0); // Reserved pad
    for &(start, _, _) in &segments {
        write_u16(&mut table, start);
    }
    for &(_, _, delta) in &segments {
        write_u16(&mut table, delta as u16);
    }
    // ID range offsets (all zero for direct mapping)
    for _ in &segments {
        write_u16(&mut table, 0);
    }

    let length = table.len() as u16;
    set_u16(&mut table, 2, length);
    table
}

fn format12(mappings: &BTreeMap<u32, u16>) -> Vec<u8> {
    let groups = contiguous_runs(mappings);

    let mut table = Vec::new();
    write_u16(&mut table, 12); // Format
    write_u16(&mut table, 0); // Reserved
    write_u32(&mut table, (16 + groups.len() * 12) as u32);
    write_u32(&mut table, 0); // Language
    write_u32(&mut table, groups.len() as u32);
    for (start, end, glyph) in groups {
        write_u32(&mut table, start);
        write_u32(&mut table, end);
        write_u32(&mut table, glyph as u32);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_all(table: &[u8]) -> Vec<CmapSubtable> {
        let count = read_u16(table, 2).unwrap() as usize;
        (0..count)
            .filter_map(|i| {
                let record = 4 + i * 8;
                let platform = read_u16(table, record).unwrap();
                let encoding = read_u16(table, record + 2).unwrap();
                let offset = read_u32(table, record + 4).unwrap() as usize;
                parse_subtable(table, offset, platform, encoding, u16::MAX).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_format_selection() {
        let small: BTreeMap<u32, u16> = [(32, 1), (65, 2), (66, 3)].into_iter().collect();
        let bmp: BTreeMap<u32, u16> = [(0x4E2D, 4), (0x4E2E, 5), (0x41, 1)].into_iter().collect();
        let astral: BTreeMap<u32, u16> = [(0x1F600, 6), (0x41, 1)].into_iter().collect();

        let mut writer = CmapWriter::new();
        writer.add(1, 0, small.clone());
        writer.add(3, 1, bmp.clone());
        writer.add(3, 10, astral.clone());
        let subtables = parse_all(&writer.build());

        let formats: Vec<_> = subtables
            .iter()
            .map(|s| (s.platform_id, s.encoding_id, s.format))
            .collect();
        assert_eq!(formats, vec![(1, 0, 0), (3, 1, 4), (3, 10, 12)]);
        assert_eq!(subtables[0].mappings, small);
        assert_eq!(subtables[1].mappings, bmp);
        assert_eq!(subtables[2].mappings, astral);
    }

    #[test]
    fn test_mac_roman_with_large_glyph_ids_uses_format4() {
        let mappings: BTreeMap<u32, u16> = [(65, 300)].into_iter().collect();
        let mut writer = CmapWriter::new();
        writer.add(1, 0, mappings.clone());
        let subtables = parse_all(&writer.build());
        assert_eq!(subtables[0].format, 4);
        assert_eq!(subtables[0].mappings, mappings);
    }

    #[test]
    fn test_format4_runs_and_negative_deltas() {
        let mappings: BTreeMap<u32, u16> =
            [(0x61, 1), (0x62, 2), (0x63, 3), (0x7A, 4), (0xF000, 5)].into_iter().collect();
        let table = format4(&mappings);

        // three runs plus the final segment
        assert_eq!(read_u16(&table, 6).unwrap(), 8);
        assert_eq!(read_u16(&table, 8).unwrap(), 8); // searchRange
        assert_eq!(read_u16(&table, 10).unwrap(), 2); // entrySelector
        assert_eq!(read_u16(&table, 12).unwrap(), 0); // rangeShift

        let mut cmap = vec![0, 0, 0, 1, 0, 3, 0, 1, 0, 0, 0, 12];
        cmap.extend(table);
        assert_eq!(parse_all(&cmap)[0].mappings, mappings);
    }

    #[test]
    fn test_parse_format6() {
        let mut cmap = vec![0, 0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 12];
        cmap.extend_from_slice(&[0, 6, 0, 16, 0, 0, 0, 0x20, 0, 3, 0, 1, 0, 0, 0, 9]);
        let subtables = parse_all(&cmap);
        let expected: BTreeMap<u32, u16> = [(0x20, 1), (0x22, 9)].into_iter().collect();
        assert_eq!(subtables[0].mappings, expected);
    }
}
