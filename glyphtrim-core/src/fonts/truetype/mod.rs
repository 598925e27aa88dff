//! TrueType font parsing and subsetting
//!
//! This module implements the TrueType side of ISO 32000-1:2008 Section
//! 9.9 (Embedded Font Programs): reading the sfnt table directory, the
//! glyph outline and location tables, metrics and character maps, and
//! rewriting a program so that only a closure of glyphs survives.

pub mod cmap;
mod glyf;
pub mod post;
pub mod subset;

pub use cmap::{CmapSubtable, CmapWriter};
pub use glyf::{component_glyph_ids, ComponentFlags};
pub use subset::{CmapPlan, TrueTypeSubsetter};

use super::binary::{read_i16, read_u16, read_u32};
use crate::error::{FontError, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// TrueType table tags
pub(crate) const HEAD_TABLE: [u8; 4] = *b"head";
pub(crate) const CMAP_TABLE: [u8; 4] = *b"cmap";
pub(crate) const GLYF_TABLE: [u8; 4] = *b"glyf";
pub(crate) const LOCA_TABLE: [u8; 4] = *b"loca";
pub(crate) const MAXP_TABLE: [u8; 4] = *b"maxp";
pub(crate) const HHEA_TABLE: [u8; 4] = *b"hhea";
pub(crate) const HMTX_TABLE: [u8; 4] = *b"hmtx";
pub(crate) const VHEA_TABLE: [u8; 4] = *b"vhea";
pub(crate) const VMTX_TABLE: [u8; 4] = *b"vmtx";
pub(crate) const POST_TABLE: [u8; 4] = *b"post";

/// Tables a glyph-outline program cannot do without
const REQUIRED_TABLES: &[[u8; 4]] = &[
    HEAD_TABLE, GLYF_TABLE, LOCA_TABLE, MAXP_TABLE, HHEA_TABLE, HMTX_TABLE,
];

/// Offset of `numberOfHMetrics` / `numOfLongVerMetrics` in hhea / vhea
pub(crate) const NUM_LONG_METRICS_OFFSET: usize = 34;

/// (searchRange, entrySelector, rangeShift) for `count` entries of `unit` bytes
pub(crate) fn search_params(count: usize, unit: usize) -> (u16, u16, u16) {
    let mut power = 1;
    let mut selector = 0;
    while power * 2 <= count {
        power *= 2;
        selector += 1;
    }
    let range = power * unit;
    (
        range as u16,
        selector,
        (count * unit).saturating_sub(range) as u16,
    )
}

/// Readable form of a table tag
pub(crate) fn tag_name(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// Table directory entry
#[derive(Debug, Clone)]
struct TableEntry {
    offset: u32,
    length: u32,
}

/// Parsed view over TrueType font program bytes
#[derive(Debug)]
pub struct TrueTypeFont<'a> {
    data: &'a [u8],
    tables: BTreeMap<[u8; 4], TableEntry>,
    /// Number of glyphs (`maxp.numGlyphs`)
    pub num_glyphs: u16,
    /// Units per em
    pub units_per_em: u16,
    /// Format of 'loca' table (0 = short, 1 = long)
    pub loca_format: i16,
}

impl<'a> TrueTypeFont<'a> {
    /// Parse the table directory and the header tables
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(FontError::malformed(0, "Font file too small"));
        }

        let signature = read_u32(data, 0)?;
        match signature {
            0x0001_0000 | 0x7472_7565 => {} // 1.0 or 'true'
            0x4F54_544F => {
                return Err(FontError::UnsupportedFormat(
                    "OpenType font with CFF outlines in a TrueType slot".to_string(),
                ))
            }
            0x7474_6366 => {
                return Err(FontError::UnsupportedFormat(
                    "TrueType Collection (TTC) files are not supported".to_string(),
                ))
            }
            _ => {
                return Err(FontError::malformed(
                    0,
                    format!("Invalid font signature: 0x{:08X}", signature),
                ))
            }
        }

        let num_tables = read_u16(data, 4)?;
        let mut tables = BTreeMap::new();
        let mut offset = 12;

        for _ in 0..num_tables {
            let tag: [u8; 4] = super::binary::slice(data, offset, 4)?
                .try_into()
                .map_err(|_| FontError::malformed(offset, "Bad table tag"))?;
            let table_offset = read_u32(data, offset + 8)?;
            let length = read_u32(data, offset + 12)?;

            let end = table_offset as u64 + length as u64;
            if end > data.len() as u64 {
                return Err(FontError::malformed(
                    table_offset as usize,
                    format!("Table '{}' extends beyond file", tag_name(&tag)),
                ));
            }

            tables.insert(
                tag,
                TableEntry {
                    offset: table_offset,
                    length,
                },
            );
            offset += 16;
        }

        for required in REQUIRED_TABLES {
            if !tables.contains_key(required) {
                return Err(FontError::MalformedFontProgram(format!(
                    "Missing required table: {}",
                    tag_name(required)
                )));
            }
        }

        let mut font = TrueTypeFont {
            data,
            tables,
            num_glyphs: 0,
            units_per_em: 0,
            loca_format: 0,
        };

        let head = font.required_table(&HEAD_TABLE)?;
        if head.len() < 54 {
            return Err(FontError::MalformedFontProgram(
                "Head table too small".to_string(),
            ));
        }
        font.units_per_em = read_u16(head, 18)?;
        font.loca_format = read_i16(head, 50)?;

        let maxp = font.required_table(&MAXP_TABLE)?;
        font.num_glyphs = read_u16(maxp, 4)?;

        Ok(font)
    }

    /// Raw bytes of a table, if present
    pub fn table(&self, tag: &[u8; 4]) -> Option<&'a [u8]> {
        let entry = self.tables.get(tag)?;
        let start = entry.offset as usize;
        self.data.get(start..start + entry.length as usize)
    }

    pub(crate) fn required_table(&self, tag: &[u8; 4]) -> Result<&'a [u8]> {
        self.table(tag).ok_or_else(|| {
            FontError::MalformedFontProgram(format!("Missing table: {}", tag_name(tag)))
        })
    }

    pub fn has_table(&self, tag: &[u8; 4]) -> bool {
        self.tables.contains_key(tag)
    }

    /// Table tags in ascending order
    pub fn table_tags(&self) -> impl Iterator<Item = &[u8; 4]> + '_ {
        self.tables.keys()
    }

    /// Byte range of a glyph inside `glyf`
    pub fn glyph_range(&self, glyph_id: u16) -> Result<(usize, usize)> {
        if glyph_id >= self.num_glyphs {
            return Err(FontError::MalformedFontProgram(format!(
                "Glyph {} out of range (numGlyphs = {})",
                glyph_id, self.num_glyphs
            )));
        }

        let loca = self.required_table(&LOCA_TABLE)?;
        let idx = glyph_id as usize;
        let (start, end) = if self.loca_format == 0 {
            (
                read_u16(loca, idx * 2)? as usize * 2,
                read_u16(loca, (idx + 1) * 2)? as usize * 2,
            )
        } else {
            (
                read_u32(loca, idx * 4)? as usize,
                read_u32(loca, (idx + 1) * 4)? as usize,
            )
        };

        let glyf_len = self.required_table(&GLYF_TABLE)?.len();
        if start > end || end > glyf_len {
            return Err(FontError::MalformedFontProgram(format!(
                "Invalid loca entry for glyph {}: {}..{} (glyf is {} bytes)",
                glyph_id, start, end, glyf_len
            )));
        }
        Ok((start, end))
    }

    /// Outline bytes of a glyph (empty for glyphs without contours)
    pub fn glyph_data(&self, glyph_id: u16) -> Result<&'a [u8]> {
        let (start, end) = self.glyph_range(glyph_id)?;
        Ok(&self.required_table(&GLYF_TABLE)?[start..end])
    }

    /// Component glyph ids referenced by a composite glyph
    pub fn components(&self, glyph_id: u16) -> Result<Vec<u16>> {
        let glyph = self.glyph_data(glyph_id)?;
        Ok(component_glyph_ids(glyph)?
            .into_iter()
            .map(|(_, gid)| gid)
            .collect())
    }

    /// Number of long metrics declared by hhea or vhea
    pub(crate) fn num_long_metrics(&self, header: &[u8; 4]) -> Result<u16> {
        read_u16(self.required_table(header)?, NUM_LONG_METRICS_OFFSET)
    }

    /// (advance, side bearing) from hmtx or vmtx
    pub(crate) fn long_metric(
        &self,
        header: &[u8; 4],
        metrics: &[u8; 4],
        glyph_id: u16,
    ) -> Result<(u16, i16)> {
        let num_long = self.num_long_metrics(header)?;
        let table = self.required_table(metrics)?;

        if num_long == 0 {
            return Err(FontError::MalformedFontProgram(format!(
                "{} declares no long metrics",
                tag_name(header)
            )));
        }

        if glyph_id < num_long {
            let offset = glyph_id as usize * 4;
            Ok((read_u16(table, offset)?, read_i16(table, offset + 2)?))
        } else {
            let advance = read_u16(table, (num_long as usize - 1) * 4)?;
            let bearing_offset = num_long as usize * 4 + (glyph_id - num_long) as usize * 2;
            // Trailing bearings are sometimes truncated
            let bearing = read_i16(table, bearing_offset).unwrap_or(0);
            Ok((advance, bearing))
        }
    }

    /// Horizontal metrics of a glyph
    pub fn glyph_metrics(&self, glyph_id: u16) -> Result<(u16, i16)> {
        self.long_metric(&HHEA_TABLE, &HMTX_TABLE, glyph_id)
    }

    /// Parse the cmap table to get character to glyph mappings
    pub fn parse_cmap(&self) -> Result<Vec<CmapSubtable>> {
        let Some(cmap) = self.table(&CMAP_TABLE) else {
            return Ok(Vec::new());
        };

        let num_subtables = read_u16(cmap, 2)?;
        let mut subtables = Vec::new();

        for i in 0..num_subtables as usize {
            let record = 4 + i * 8;
            let platform_id = read_u16(cmap, record)?;
            let encoding_id = read_u16(cmap, record + 2)?;
            let offset = read_u32(cmap, record + 4)? as usize;

            match cmap::parse_subtable(cmap, offset, platform_id, encoding_id, self.num_glyphs) {
                Ok(Some(subtable)) => subtables.push(subtable),
                Ok(None) => debug!(
                    "Skipping unsupported cmap subtable ({}, {})",
                    platform_id, encoding_id
                ),
                Err(e) => return Err(e),
            }
        }

        Ok(subtables)
    }

    /// Glyph for a simple-font character code.
    ///
    /// Tries the (3,0) symbol subtable with `code` and `0xF000 | code`, then
    /// (1,0) Mac Roman, then the Unicode subtables using `unicode` or the
    /// code itself.
    pub fn simple_glyph_id(
        subtables: &[CmapSubtable],
        code: u32,
        unicode: Option<char>,
    ) -> Option<u16> {
        let find = |platform: u16, encoding: Option<u16>| {
            subtables.iter().find(|s| {
                s.platform_id == platform && encoding.map_or(true, |e| s.encoding_id == e)
            })
        };

        if let Some(symbol) = find(3, Some(0)) {
            if let Some(gid) = symbol.glyph_id(code).or_else(|| symbol.glyph_id(0xF000 | code)) {
                return Some(gid);
            }
        }

        if let Some(gid) = find(1, Some(0)).and_then(|mac| mac.glyph_id(code)) {
            return Some(gid);
        }

        let unicode = unicode.map_or(code, |c| c as u32);
        find(3, Some(1))
            .or_else(|| find(3, Some(10)))
            .or_else(|| find(0, None))
            .and_then(|s| s.glyph_id(unicode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fonts::TrueTypeBuilder;

    #[test]
    fn test_invalid_font_signatures() {
        assert!(TrueTypeFont::parse(&[0u8; 12]).is_err());
        assert!(TrueTypeFont::parse(&[0x00, 0x01]).is_err());

        let mut otto = vec![0u8; 12];
        otto[..4].copy_from_slice(b"OTTO");
        assert!(matches!(
            TrueTypeFont::parse(&otto),
            Err(FontError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_search_params() {
        assert_eq!(search_params(9, 16), (128, 3, 16));
        assert_eq!(search_params(4, 2), (8, 2, 0));
        assert_eq!(search_params(1, 16), (16, 0, 0));
    }

    #[test]
    fn test_missing_required_table() {
        let mut data = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        data.resize(12, 0);
        let err = TrueTypeFont::parse(&data).unwrap_err();
        assert!(err.to_string().contains("Missing required table: head"));
    }

    #[test]
    fn test_parse_builder_font() {
        let data = TrueTypeBuilder::latin(8).build();
        let font = TrueTypeFont::parse(&data).unwrap();

        assert_eq!(font.num_glyphs, 8);
        assert_eq!(font.units_per_em, 1000);
        assert!(font.has_table(b"cmap"));
        assert_eq!(font.glyph_metrics(3).unwrap(), (503, 13));
        assert!(!font.glyph_data(1).unwrap().is_empty());
        assert!(font.glyph_range(8).is_err());
    }

    #[test]
    fn test_composite_components() {
        let data = TrueTypeBuilder::latin(6).composite(5, &[1, 3]).build();
        let font = TrueTypeFont::parse(&data).unwrap();
        assert_eq!(font.components(5).unwrap(), vec![1, 3]);
        assert!(font.components(1).unwrap().is_empty());
    }

    #[test]
    fn test_simple_glyph_lookup_order() {
        let data = TrueTypeBuilder::latin(4)
            .map_unicode('A', 1)
            .map_symbol(0xF042, 2)
            .build();
        let font = TrueTypeFont::parse(&data).unwrap();
        let subtables = font.parse_cmap().unwrap();

        // Symbol subtable wins, via 0xF000 | code
        assert_eq!(TrueTypeFont::simple_glyph_id(&subtables, 0x42, None), Some(2));
        // Falls through to the Unicode subtable
        assert_eq!(TrueTypeFont::simple_glyph_id(&subtables, 0x41, None), Some(1));
        assert_eq!(
            TrueTypeFont::simple_glyph_id(&subtables, 0x10, Some('A')),
            Some(1)
        );
        assert_eq!(TrueTypeFont::simple_glyph_id(&subtables, 0x43, None), None);
    }
}
