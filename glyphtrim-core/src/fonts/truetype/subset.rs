//! TrueType program subsetting
//!
//! Retains a closure of glyphs, renumbers them densely in ascending order
//! and rewrites every table that is indexed by glyph id.

use super::cmap::CmapWriter;
use super::post::rebuild_post;
use super::{
    component_glyph_ids, search_params, tag_name, TrueTypeFont, CMAP_TABLE, GLYF_TABLE,
    HEAD_TABLE, HHEA_TABLE, HMTX_TABLE, LOCA_TABLE, MAXP_TABLE, NUM_LONG_METRICS_OFFSET,
    POST_TABLE, VHEA_TABLE, VMTX_TABLE,
};
use crate::error::{FontError, Result};
use crate::fonts::binary::{pad4, read_u32, set_u16, set_u32, write_u16, write_u32};
use crate::fonts::closure::{GlyphClosure, GlyphRenumbering};
use crate::subset::SubsetResult;
use std::collections::BTreeMap;
use tracing::debug;

/// Tables copied byte for byte
const COPIED_TABLES: &[[u8; 4]] = &[*b"cvt ", *b"fpgm", *b"prep", *b"OS/2", *b"name", *b"gasp"];

/// Largest glyph data length addressable by short `loca` offsets
const MAX_SHORT_LOCA_LENGTH: usize = 0x1FFFE;

/// `head.checkSumAdjustment` offset and magic
const CHECKSUM_ADJUSTMENT_OFFSET: usize = 8;
const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

/// `head.indexToLocFormat` offset
const INDEX_TO_LOC_FORMAT_OFFSET: usize = 50;

/// How the subset `cmap` is produced
#[derive(Debug, Clone, PartialEq)]
pub enum CmapPlan {
    /// A single Unicode subtable built from (code point, old glyph id) pairs
    Unicode(Vec<(u32, u16)>),
    /// The program's own subtables, restricted and remapped
    RemapExisting,
}

/// TrueType font subsetter
#[derive(Debug)]
pub struct TrueTypeSubsetter<'a> {
    font: TrueTypeFont<'a>,
    keep_tables: Vec<[u8; 4]>,
}

impl<'a> TrueTypeSubsetter<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        Ok(Self {
            font: TrueTypeFont::parse(data)?,
            keep_tables: Vec::new(),
        })
    }

    /// Extra tables to copy unchanged
    pub fn with_keep_tables(mut self, tags: &[[u8; 4]]) -> Self {
        self.keep_tables = tags.to_vec();
        self
    }

    pub fn font(&self) -> &TrueTypeFont<'a> {
        &self.font
    }

    /// Requested glyphs plus every component reachable from them
    pub fn closure(&self, requested: impl IntoIterator<Item = u16>) -> Result<GlyphClosure> {
        let mut closure = GlyphClosure::new(self.font.num_glyphs);
        let mut pending: Vec<u16> = vec![0];
        for gid in requested {
            if closure.insert(gid) {
                pending.push(gid);
            }
        }

        while let Some(gid) = pending.pop() {
            for component in self.font.components(gid)? {
                if component >= self.font.num_glyphs {
                    return Err(FontError::MalformedFontProgram(format!(
                        "Glyph {} references missing component {}",
                        gid, component
                    )));
                }
                if closure.insert(component) {
                    pending.push(component);
                }
            }
        }

        Ok(closure)
    }

    /// Build the subset program for the requested glyphs
    pub fn subset(
        &self,
        requested: impl IntoIterator<Item = u16>,
        cmap_plan: &CmapPlan,
    ) -> Result<SubsetResult> {
        let closure = self.closure(requested)?;
        let renumbering = closure.renumbering();

        let mut tables: BTreeMap<[u8; 4], Vec<u8>> = BTreeMap::new();

        let (glyf, loca, loca_format) = self.subset_glyf(&renumbering)?;
        tables.insert(GLYF_TABLE, glyf);
        tables.insert(LOCA_TABLE, loca);

        let mut head = self.font.required_table(&HEAD_TABLE)?.to_vec();
        set_u32(&mut head, CHECKSUM_ADJUSTMENT_OFFSET, 0);
        set_u16(&mut head, INDEX_TO_LOC_FORMAT_OFFSET, loca_format);
        tables.insert(HEAD_TABLE, head);

        let glyph_count = renumbering.len() as u16;
        let mut maxp = self.font.required_table(&MAXP_TABLE)?.to_vec();
        set_u16(&mut maxp, 4, glyph_count);
        tables.insert(MAXP_TABLE, maxp);

        for (header, metrics) in [(HHEA_TABLE, HMTX_TABLE), (VHEA_TABLE, VMTX_TABLE)] {
            if !(self.font.has_table(&header) && self.font.has_table(&metrics)) {
                continue;
            }
            let mut header_data = self.font.required_table(&header)?.to_vec();
            if header_data.len() < NUM_LONG_METRICS_OFFSET + 2 {
                return Err(FontError::MalformedFontProgram(format!(
                    "{} table too small",
                    tag_name(&header)
                )));
            }
            set_u16(&mut header_data, NUM_LONG_METRICS_OFFSET, glyph_count);
            tables.insert(header, header_data);
            tables.insert(metrics, self.subset_metrics(&header, &metrics, &renumbering)?);
        }

        if let Some(cmap) = self.subset_cmap(&renumbering, cmap_plan)? {
            tables.insert(CMAP_TABLE, cmap);
        }

        if let Some(post) = self.font.table(&POST_TABLE) {
            tables.insert(POST_TABLE, rebuild_post(post, &renumbering)?);
        }

        for tag in self.font.table_tags() {
            if tables.contains_key(tag) {
                continue;
            }
            if COPIED_TABLES.contains(tag) || self.keep_tables.contains(tag) {
                if let Some(data) = self.font.table(tag) {
                    tables.insert(*tag, data.to_vec());
                }
            } else {
                debug!("Dropping '{}' table from subset", tag_name(tag));
            }
        }

        let sfnt_version = read_u32(self.font.data, 0)?;
        Ok(SubsetResult {
            data: assemble(sfnt_version, &tables),
            gid_map: renumbering,
        })
    }

    /// Subset the glyf and loca tables
    fn subset_glyf(&self, renumbering: &GlyphRenumbering) -> Result<(Vec<u8>, Vec<u8>, u16)> {
        let mut glyf = Vec::new();
        let mut offsets = Vec::with_capacity(renumbering.len() + 1);
        offsets.push(0usize);

        for &old in renumbering.old_ids() {
            let glyph = self.font.glyph_data(old)?;
            let start = glyf.len();
            glyf.extend_from_slice(glyph);

            for (field, component) in component_glyph_ids(glyph)? {
                let new = renumbering.new_id(component).ok_or_else(|| {
                    FontError::MalformedFontProgram(format!(
                        "Component {} of glyph {} missing from closure",
                        component, old
                    ))
                })?;
                set_u16(&mut glyf, start + field, new);
            }

            if glyf.len() % 2 != 0 {
                glyf.push(0);
            }
            offsets.push(glyf.len());
        }

        let mut loca = Vec::new();
        let loca_format = if glyf.len() <= MAX_SHORT_LOCA_LENGTH {
            for offset in offsets {
                write_u16(&mut loca, (offset / 2) as u16);
            }
            0
        } else {
            for offset in offsets {
                write_u32(&mut loca, offset as u32);
            }
            1
        };

        Ok((glyf, loca, loca_format))
    }

    /// Rebuild hmtx or vmtx with one long metric per retained glyph
    fn subset_metrics(
        &self,
        header: &[u8; 4],
        metrics: &[u8; 4],
        renumbering: &GlyphRenumbering,
    ) -> Result<Vec<u8>> {
        let mut table = Vec::with_capacity(renumbering.len() * 4);
        for &old in renumbering.old_ids() {
            let (advance, bearing) = self.font.long_metric(header, metrics, old)?;
            write_u16(&mut table, advance);
            write_u16(&mut table, bearing as u16);
        }
        Ok(table)
    }

    fn subset_cmap(
        &self,
        renumbering: &GlyphRenumbering,
        plan: &CmapPlan,
    ) -> Result<Option<Vec<u8>>> {
        let mut writer = CmapWriter::new();

        match plan {
            CmapPlan::Unicode(entries) => {
                let mappings: BTreeMap<u32, u16> = entries
                    .iter()
                    .filter_map(|&(unicode, old)| {
                        renumbering.new_id(old).filter(|&new| new != 0).map(|new| (unicode, new))
                    })
                    .collect();
                let beyond_bmp = mappings.keys().any(|&u| u > 0xFFFF);
                writer.add(3, if beyond_bmp { 10 } else { 1 }, mappings);
            }
            CmapPlan::RemapExisting => {
                if !self.font.has_table(&CMAP_TABLE) {
                    return Ok(None);
                }
                for subtable in self.font.parse_cmap()? {
                    let mappings = subtable
                        .mappings
                        .iter()
                        .filter_map(|(&code, &old)| renumbering.new_id(old).map(|new| (code, new)))
                        .collect();
                    writer.add(subtable.platform_id, subtable.encoding_id, mappings);
                }
            }
        }

        Ok(Some(writer.build()))
    }
}

/// Sum of big-endian u32 words, zero padded
pub(crate) fn table_checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

/// Serialize tables in tag order with a fresh directory and checksums
pub(crate) fn assemble(sfnt_version: u32, tables: &BTreeMap<[u8; 4], Vec<u8>>) -> Vec<u8> {
    let num_tables = tables.len();
    let (search_range, entry_selector, range_shift) = search_params(num_tables, 16);

    let mut output = Vec::new();
    write_u32(&mut output, sfnt_version);
    write_u16(&mut output, num_tables as u16);
    write_u16(&mut output, search_range);
    write_u16(&mut output, entry_selector);
    write_u16(&mut output, range_shift);

    let mut offset = 12 + num_tables * 16;
    let mut head_offset = None;
    for (tag, data) in tables {
        if tag == &HEAD_TABLE {
            head_offset = Some(offset);
        }
        output.extend_from_slice(tag);
        write_u32(&mut output, table_checksum(data));
        write_u32(&mut output, offset as u32);
        write_u32(&mut output, data.len() as u32);
        offset += (data.len() + 3) & !3;
    }

    for data in tables.values() {
        output.extend_from_slice(data);
        pad4(&mut output);
    }

    if let Some(head_offset) = head_offset {
        let adjustment = CHECKSUM_MAGIC.wrapping_sub(table_checksum(&output));
        set_u32(&mut output, head_offset + CHECKSUM_ADJUSTMENT_OFFSET, adjustment);
    }

    output
}
