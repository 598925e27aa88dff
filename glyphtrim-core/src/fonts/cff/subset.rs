//! CFF program subsetting
//!
//! Retained glyphs are renumbered densely. Subroutine numbering is kept:
//! unreachable subroutines become empty INDEX entries so no charstring
//! byte changes.

use super::charset::{write_charset, write_encoding, write_fd_select, Encoding};
use super::charstring::{CharstringScanner, SubrUsage};
use super::dict::{self, Dict};
use super::index::Index;
use super::writer::{CffTables, PrivateTables};
use super::CffFont;
use crate::error::{FontError, Result};
use crate::fonts::closure::{GlyphClosure, GlyphRenumbering};
use crate::subset::SubsetResult;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Glyphs and subroutines reachable from a requested glyph set
#[derive(Debug, Clone)]
struct Reachable {
    closure: GlyphClosure,
    global: BTreeSet<usize>,
    /// Local subroutines per Font DICT index
    local: BTreeMap<usize, BTreeSet<usize>>,
}

/// CFF font subsetter
#[derive(Debug)]
pub struct CffSubsetter<'a> {
    font: CffFont<'a>,
    prune_subroutines: bool,
}

impl<'a> CffSubsetter<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        Ok(Self {
            font: CffFont::parse(data)?,
            prune_subroutines: true,
        })
    }

    /// Empty unreachable subroutines (on by default)
    pub fn with_subroutine_pruning(mut self, prune: bool) -> Self {
        self.prune_subroutines = prune;
        self
    }

    pub fn font(&self) -> &CffFont<'a> {
        &self.font
    }

    /// Glyph for a CID of a composite font
    pub fn glyph_for_cid(&self, cid: u32) -> Option<u16> {
        self.font.glyph_for_cid(cid)
    }

    /// Glyph for a simple-font code, optionally named by the PDF encoding
    pub fn glyph_for_code(&self, code: u32, glyph_name: Option<&str>) -> Result<Option<u16>> {
        self.font.glyph_for_code(code, glyph_name)
    }

    /// Requested glyphs plus accent components of seac-style glyphs
    pub fn closure(&self, requested: impl IntoIterator<Item = u16>) -> Result<GlyphClosure> {
        Ok(self.reach(requested)?.closure)
    }

    fn reach(&self, requested: impl IntoIterator<Item = u16>) -> Result<Reachable> {
        let mut closure = GlyphClosure::new(self.font.num_glyphs());
        let mut pending: Vec<u16> = vec![0];
        for gid in requested {
            if closure.insert(gid) {
                pending.push(gid);
            }
        }

        let mut global = BTreeSet::new();
        let mut local: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();

        while let Some(gid) = pending.pop() {
            let charstring = self.font.charstring(gid).ok_or_else(|| {
                FontError::MalformedFontProgram(format!("Glyph {} has no charstring", gid))
            })?;
            let fd = self.font.font_dict_index(gid)?;
            let mut usage = SubrUsage::default();
            let seac = CharstringScanner::new(self.font.global_subrs(), self.font.local_subrs(gid)?)
                .scan(charstring, &mut usage)
                .map_err(|e| match e {
                    FontError::MalformedFontProgram(msg) => {
                        FontError::MalformedFontProgram(format!("glyph {}: {}", gid, msg))
                    }
                    other => other,
                })?;

            global.extend(usage.global);
            local.entry(fd).or_default().extend(usage.local);

            if let Some(seac) = seac.filter(|_| !self.font.is_cid_keyed()) {
                for code in [seac.base, seac.accent] {
                    let component = self.font.glyph_for_standard_code(code).ok_or_else(|| {
                        FontError::MalformedFontProgram(format!(
                            "Glyph {} composes missing standard code {}",
                            gid, code
                        ))
                    })?;
                    if closure.insert(component) {
                        pending.push(component);
                    }
                }
            }
        }

        Ok(Reachable {
            closure,
            global,
            local,
        })
    }

    /// Build the subset program for the requested glyphs
    pub fn subset(&self, requested: impl IntoIterator<Item = u16>) -> Result<SubsetResult> {
        let reachable = self.reach(requested)?;
        let renumbering = reachable.closure.renumbering();
        let font = &self.font;

        let char_strings = renumbering
            .old_ids()
            .iter()
            .map(|&old| {
                font.charstring(old).ok_or_else(|| {
                    FontError::MalformedFontProgram(format!("Glyph {} has no charstring", old))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let charset_ids = renumbering
            .old_ids()
            .iter()
            .skip(1)
            .map(|&old| {
                font.charset.id(old).ok_or_else(|| {
                    FontError::MalformedFontProgram(format!("Glyph {} missing from charset", old))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut top_dict = font.top_dict.clone();
        let mut tables = CffTables {
            header: font.header.to_vec(),
            // One Top DICT is written, so only the first font of a FontSet survives
            names: font.names.iter().take(1).collect(),
            top_dict: Dict::new(),
            strings: font.strings.iter().collect(),
            global_subrs: self.restrict(&font.global_subrs, &reachable.global),
            char_strings,
            charset: write_charset(&charset_ids),
            encoding: self.subset_encoding(&renumbering)?,
            fd_select: None,
            font_dicts: Vec::new(),
            privates: Vec::new(),
        };

        match &font.cid {
            Some(cid) => {
                // Keep only Font DICTs some retained glyph selects
                let used: BTreeSet<usize> = renumbering
                    .old_ids()
                    .iter()
                    .map(|&old| font.font_dict_index(old))
                    .collect::<Result<_>>()?;
                let new_fd: BTreeMap<usize, u8> = used
                    .iter()
                    .enumerate()
                    .map(|(new, &old)| (old, new as u8))
                    .collect();

                let fds = renumbering
                    .old_ids()
                    .iter()
                    .map(|&old| Ok(new_fd[&font.font_dict_index(old)?]))
                    .collect::<Result<Vec<u8>>>()?;
                tables.fd_select = Some(write_fd_select(&fds));

                let empty = BTreeSet::new();
                for &old_fd in &used {
                    let (font_dict, private) = &cid.font_dicts[old_fd];
                    tables.font_dicts.push(font_dict.clone());
                    let reached = reachable.local.get(&old_fd).unwrap_or(&empty);
                    tables.privates.push(PrivateTables {
                        dict: private.dict.clone(),
                        subrs: private.subrs.as_ref().map(|s| self.restrict(s, reached)),
                    });
                }
                let dropped = cid.font_dicts.len() - used.len();
                if dropped > 0 {
                    debug!("Dropping {} unused Font DICTs", dropped);
                }
            }
            None => {
                if let Some(private) = &font.private {
                    let empty = BTreeSet::new();
                    let reached = reachable.local.get(&0).unwrap_or(&empty);
                    tables.privates.push(PrivateTables {
                        dict: private.dict.clone(),
                        subrs: private.subrs.as_ref().map(|s| self.restrict(s, reached)),
                    });
                }
                if tables.encoding.is_none() {
                    // Predefined encodings stay as their Top DICT number
                    let predefined = match font.encoding {
                        Some(Encoding::Expert) => 1,
                        _ => 0,
                    };
                    top_dict.set(dict::ENCODING, vec![dict::Operand::Integer(predefined)]);
                }
            }
        }

        tables.top_dict = top_dict;

        Ok(SubsetResult {
            data: tables.write(),
            gid_map: renumbering,
        })
    }

    /// Subroutine INDEX entries with unreachable bodies emptied
    fn restrict<'i>(&self, subrs: &Index<'i>, reached: &BTreeSet<usize>) -> Vec<&'i [u8]> {
        subrs
            .iter()
            .enumerate()
            .map(|(i, body)| {
                if !self.prune_subroutines || reached.contains(&i) {
                    body
                } else {
                    &[][..]
                }
            })
            .collect()
    }

    /// Rebuild a custom encoding for the retained glyphs
    fn subset_encoding(&self, renumbering: &GlyphRenumbering) -> Result<Option<Vec<u8>>> {
        let Some(Encoding::Custom { codes, supplements }) = &self.font.encoding else {
            return Ok(None);
        };

        let mut codes_by_glyph: BTreeMap<u16, Vec<u8>> = BTreeMap::new();
        for (&code, &gid) in codes {
            codes_by_glyph.entry(gid).or_default().push(code);
        }
        let taken: BTreeSet<u8> = codes
            .keys()
            .copied()
            .chain(supplements.iter().map(|&(code, _)| code))
            .collect();
        let mut spare = (0..=255u8).filter(|code| !taken.contains(code));

        // Format 0 encodes glyphs 1..=n contiguously
        let last_encoded = renumbering
            .old_ids()
            .iter()
            .rposition(|old| codes_by_glyph.contains_key(old))
            .unwrap_or(0);

        let mut primary = Vec::new();
        let mut extra = Vec::new();
        for &old in renumbering.old_ids().iter().take(last_encoded + 1).skip(1) {
            match codes_by_glyph.get(&old).map(Vec::as_slice) {
                Some([first, rest @ ..]) => {
                    primary.push(*first);
                    if !rest.is_empty() {
                        let sid = self.font.charset.id(old).ok_or_else(|| {
                            FontError::MalformedFontProgram(format!("Glyph {} missing from charset", old))
                        })?;
                        extra.extend(rest.iter().map(|&code| (code, sid)));
                    }
                }
                _ => primary.push(spare.next().ok_or_else(|| {
                    FontError::MalformedFontProgram("No spare code for unencoded glyph".to_string())
                })?),
            }
        }

        extra.extend(supplements.iter().copied().filter(|&(_, sid)| {
            self.font
                .glyph_for_charset_id(sid)
                .and_then(|gid| renumbering.new_id(gid))
                .is_some()
        }));

        write_encoding(&primary, &extra).map(Some)
    }
}
