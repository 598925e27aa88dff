//! Glyph name table (`post`) rebuilding

use crate::error::{FontError, Result};
use crate::fonts::binary::{read_u16, read_u32, read_u8, slice, write_u16};
use crate::fonts::closure::GlyphRenumbering;

/// Size of the fixed `post` header
const HEADER_LEN: usize = 32;

/// Number of names in the standard Macintosh glyph ordering
const MAC_GLYPH_NAMES: u16 = 258;

const VERSION_1: u32 = 0x0001_0000;
const VERSION_2: u32 = 0x0002_0000;
const VERSION_2_5: u32 = 0x0002_5000;

/// Glyph name reference: a standard Mac name index or a custom name
#[derive(Debug, Clone, PartialEq)]
enum GlyphName {
    Standard(u16),
    Custom(Vec<u8>),
}

/// Rebuild the `post` table for the retained glyphs.
///
/// Formats 1, 2 and 2.5 become format 2 in the new glyph order; any other
/// version carries no glyph names and is returned unchanged.
pub fn rebuild_post(post: &[u8], renumbering: &GlyphRenumbering) -> Result<Vec<u8>> {
    if post.len() < HEADER_LEN {
        return Err(FontError::malformed(0, "post table too small"));
    }

    let names = match read_u32(post, 0)? {
        VERSION_1 => renumbering
            .old_ids()
            .iter()
            .map(|&old| GlyphName::Standard(if old < MAC_GLYPH_NAMES { old } else { 0 }))
            .collect(),
        VERSION_2 => format2_names(post, renumbering)?,
        VERSION_2_5 => format25_names(post, renumbering)?,
        _ => return Ok(post.to_vec()),
    };

    let mut table = post[..HEADER_LEN].to_vec();
    table[..4].copy_from_slice(&VERSION_2.to_be_bytes());
    write_u16(&mut table, renumbering.len() as u16);

    let mut strings: Vec<Vec<u8>> = Vec::new();
    for name in &names {
        let index = match name {
            GlyphName::Standard(index) => *index,
            GlyphName::Custom(bytes) => {
                let position = match strings.iter().position(|s| s == bytes) {
                    Some(position) => position,
                    None => {
                        strings.push(bytes.clone());
                        strings.len() - 1
                    }
                };
                MAC_GLYPH_NAMES + position as u16
            }
        };
        write_u16(&mut table, index);
    }

    for string in strings {
        table.push(string.len() as u8);
        table.extend(string);
    }

    Ok(table)
}

fn format2_names(post: &[u8], renumbering: &GlyphRenumbering) -> Result<Vec<GlyphName>> {
    let num_glyphs = read_u16(post, HEADER_LEN)? as usize;
    let indices_start = HEADER_LEN + 2;

    let mut strings = Vec::new();
    let mut pos = indices_start + num_glyphs * 2;
    while pos < post.len() {
        let len = read_u8(post, pos)? as usize;
        strings.push(slice(post, pos + 1, len)?.to_vec());
        pos += 1 + len;
    }

    renumbering
        .old_ids()
        .iter()
        .map(|&old| {
            if old as usize >= num_glyphs {
                return Ok(GlyphName::Standard(0));
            }
            let index = read_u16(post, indices_start + old as usize * 2)?;
            if index < MAC_GLYPH_NAMES {
                return Ok(GlyphName::Standard(index));
            }
            strings
                .get((index - MAC_GLYPH_NAMES) as usize)
                .cloned()
                .map(GlyphName::Custom)
                .ok_or_else(|| {
                    FontError::MalformedFontProgram(format!(
                        "post name index {} for glyph {} out of range",
                        index, old
                    ))
                })
        })
        .collect()
}

fn format25_names(post: &[u8], renumbering: &GlyphRenumbering) -> Result<Vec<GlyphName>> {
    let num_glyphs = read_u16(post, HEADER_LEN)? as usize;
    renumbering
        .old_ids()
        .iter()
        .map(|&old| {
            if old as usize >= num_glyphs {
                return Ok(GlyphName::Standard(0));
            }
            let delta = read_u8(post, HEADER_LEN + 2 + old as usize)? as i8;
            let index = old as i32 + delta as i32;
            Ok(GlyphName::Standard(
                u16::try_from(index)
                    .ok()
                    .filter(|i| *i < MAC_GLYPH_NAMES)
                    .unwrap_or(0),
            ))
        })
        .collect()
}

/// Glyph names of a format 2 table, for inspection
pub fn custom_glyph_names(post: &[u8]) -> Result<Vec<String>> {
    if read_u32(post, 0)? != VERSION_2 {
        return Ok(Vec::new());
    }
    let num_glyphs = read_u16(post, HEADER_LEN)? as usize;
    let mut names = Vec::new();
    let mut pos = HEADER_LEN + 2 + num_glyphs * 2;
    while pos < post.len() {
        let len = read_u8(post, pos)? as usize;
        names.push(String::from_utf8_lossy(slice(post, pos + 1, len)?).into_owned());
        pos += 1 + len;
    }
    Ok(names)
}
