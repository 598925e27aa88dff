//! Synthetic font programs for tests and benchmarks
//!
//! The builders emit small but structurally complete TrueType and CFF
//! programs, so tests do not depend on binary fixtures.

use crate::fonts::binary::{write_u16, write_u32};
use crate::fonts::cff::charset::{write_charset, write_encoding, write_fd_select};
use crate::fonts::cff::dict::{self, Dict, Operand};
use crate::fonts::cff::strings::{standard_sid, STANDARD_STRING_COUNT};
use crate::fonts::cff::writer::{CffTables, PrivateTables};
use crate::fonts::truetype::subset::assemble;
use crate::fonts::truetype::CmapWriter;
use std::collections::BTreeMap;

/// Builds a TrueType program with `n` glyphs.
///
/// Glyph `g` has advance `500 + g` and left side bearing `10 + g`.
#[derive(Debug, Clone)]
pub struct TrueTypeBuilder {
    num_glyphs: u16,
    composites: BTreeMap<u16, Vec<u16>>,
    mappings: BTreeMap<(u16, u16), BTreeMap<u32, u16>>,
    extra_tables: BTreeMap<[u8; 4], Vec<u8>>,
    post_names: Option<Vec<String>>,
    glyph_size: Option<usize>,
}

impl TrueTypeBuilder {
    /// Without explicit mappings, glyph `g >= 1` maps from `'A' + g - 1`
    pub fn latin(num_glyphs: u16) -> Self {
        Self {
            num_glyphs,
            composites: BTreeMap::new(),
            mappings: BTreeMap::new(),
            extra_tables: BTreeMap::new(),
            post_names: None,
            glyph_size: None,
        }
    }

    /// Make `gid` a composite of `components`
    pub fn composite(mut self, gid: u16, components: &[u16]) -> Self {
        self.composites.insert(gid, components.to_vec());
        self
    }

    /// Map in the (3,1) Unicode subtable
    pub fn map_unicode(self, ch: char, gid: u16) -> Self {
        self.map(3, 1, ch as u32, gid)
    }

    /// Map in the (3,0) symbol subtable
    pub fn map_symbol(self, code: u32, gid: u16) -> Self {
        self.map(3, 0, code, gid)
    }

    /// Map in the (1,0) Mac Roman subtable
    pub fn map_mac(self, code: u32, gid: u16) -> Self {
        self.map(1, 0, code, gid)
    }

    fn map(mut self, platform: u16, encoding: u16, code: u32, gid: u16) -> Self {
        self.mappings
            .entry((platform, encoding))
            .or_default()
            .insert(code, gid);
        self
    }

    pub fn extra_table(mut self, tag: [u8; 4], data: Vec<u8>) -> Self {
        self.extra_tables.insert(tag, data);
        self
    }

    /// Format 2 `post` naming glyph `g >= 1` as `names[g - 1]`
    pub fn post_names(mut self, names: &[&str]) -> Self {
        self.post_names = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Pad every glyph to `size` bytes
    pub fn glyph_size(mut self, size: usize) -> Self {
        self.glyph_size = Some(size);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let n = self.num_glyphs;
        let mut tables: BTreeMap<[u8; 4], Vec<u8>> = BTreeMap::new();

        let mut glyf = Vec::new();
        let mut offsets = vec![0usize];
        for gid in 0..n {
            let mut glyph = match self.composites.get(&gid) {
                Some(components) => composite_glyph(components),
                None => simple_glyph(gid),
            };
            if let Some(size) = self.glyph_size {
                glyph.resize(size.max(glyph.len()), 0);
            }
            if glyph.len() % 2 != 0 {
                glyph.push(0);
            }
            glyf.extend(glyph);
            offsets.push(glyf.len());
        }

        let long_loca = glyf.len() > 0x1FFFE;
        let mut loca = Vec::new();
        for offset in offsets {
            if long_loca {
                write_u32(&mut loca, offset as u32);
            } else {
                write_u16(&mut loca, (offset / 2) as u16);
            }
        }

        let mut head = vec![0u8; 54];
        head[..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
        head[18..20].copy_from_slice(&1000u16.to_be_bytes());
        head[50..52].copy_from_slice(&(long_loca as u16).to_be_bytes());

        let mut maxp = Vec::new();
        write_u32(&mut maxp, 0x0000_5000);
        write_u16(&mut maxp, n);

        let mut hhea = vec![0u8; 36];
        hhea[..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        hhea[34..36].copy_from_slice(&n.to_be_bytes());

        let mut hmtx = Vec::new();
        for gid in 0..n {
            write_u16(&mut hmtx, 500 + gid);
            write_u16(&mut hmtx, 10 + gid);
        }

        let mut cmap = CmapWriter::new();
        if self.mappings.is_empty() {
            let latin = (1..n).map(|gid| ('A' as u32 + gid as u32 - 1, gid)).collect();
            cmap.add(3, 1, latin);
        }
        for (&(platform, encoding), mappings) in &self.mappings {
            cmap.add(platform, encoding, mappings.clone());
        }

        let mut post = Vec::new();
        match &self.post_names {
            Some(names) => {
                write_u32(&mut post, 0x0002_0000);
                post.resize(32, 0);
                write_u16(&mut post, n);
                for gid in 0..n {
                    let index = if gid == 0 || gid as usize > names.len() {
                        0
                    } else {
                        258 + gid - 1
                    };
                    write_u16(&mut post, index);
                }
                for name in names {
                    post.push(name.len() as u8);
                    post.extend_from_slice(name.as_bytes());
                }
            }
            None => {
                write_u32(&mut post, 0x0003_0000);
                post.resize(32, 0);
            }
        }

        tables.insert(*b"glyf", glyf);
        tables.insert(*b"loca", loca);
        tables.insert(*b"head", head);
        tables.insert(*b"maxp", maxp);
        tables.insert(*b"hhea", hhea);
        tables.insert(*b"hmtx", hmtx);
        tables.insert(*b"cmap", cmap.build());
        tables.insert(*b"post", post);
        for (tag, data) in &self.extra_tables {
            tables.insert(*tag, data.clone());
        }

        assemble(0x0001_0000, &tables)
    }
}

/// One-point contour whose coordinates identify the glyph
fn simple_glyph(gid: u16) -> Vec<u8> {
    let mut glyph = Vec::new();
    write_u16(&mut glyph, 1); // numberOfContours
    for bound in [0, 0, gid, gid] {
        write_u16(&mut glyph, bound);
    }
    write_u16(&mut glyph, 0); // endPtsOfContours[0]
    write_u16(&mut glyph, 0); // instructionLength
    glyph.push(0x01); // on curve, word coordinates
    write_u16(&mut glyph, gid);
    write_u16(&mut glyph, gid);
    glyph
}

fn composite_glyph(components: &[u16]) -> Vec<u8> {
    let mut glyph = Vec::new();
    write_u16(&mut glyph, 0xFFFF); // numberOfContours = -1
    glyph.extend_from_slice(&[0u8; 8]);
    for (i, &component) in components.iter().enumerate() {
        // ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES, plus MORE_COMPONENTS
        let more = if i + 1 < components.len() { 0x0020 } else { 0 };
        write_u16(&mut glyph, 0x0003 | more);
        write_u16(&mut glyph, component);
        write_u32(&mut glyph, 0);
    }
    glyph
}

/// Charstring drawing one point at `(n, 0)`, unique per `n`
pub fn outline(n: u8) -> Vec<u8> {
    vec![139 + n % 100, 139, 21, 14]
}

/// `callgsubr` of a subroutine in an INDEX with fewer than 1240 entries
pub fn call_global(index: usize) -> Vec<u8> {
    vec![(index + 32) as u8, 29]
}

/// `callsubr` of a subroutine in an INDEX with fewer than 1240 entries
pub fn call_local(index: usize) -> Vec<u8> {
    vec![(index + 32) as u8, 10]
}

/// Builds a name-keyed or CID-keyed CFF program
#[derive(Debug, Clone)]
pub struct CffBuilder {
    cid: bool,
    /// (SID or CID, Font DICT, charstring); glyph 0 is .notdef
    glyphs: Vec<(u16, u8, Vec<u8>)>,
    strings: Vec<String>,
    global_subrs: Vec<Vec<u8>>,
    local_subrs: Vec<Vec<Vec<u8>>>,
    font_dicts: usize,
    encoding: Option<Vec<u8>>,
    charstring_type: Option<i32>,
    names: Vec<String>,
}

impl CffBuilder {
    /// Name-keyed program using the standard encoding
    pub fn simple() -> Self {
        Self {
            cid: false,
            glyphs: vec![(0, 0, vec![14])],
            strings: Vec::new(),
            global_subrs: Vec::new(),
            local_subrs: Vec::new(),
            font_dicts: 1,
            encoding: None,
            charstring_type: None,
            names: vec!["TestFont".to_string()],
        }
    }

    /// CID-keyed program with `font_dicts` Font DICTs (Adobe-Identity-0)
    pub fn cid(font_dicts: usize) -> Self {
        Self {
            cid: true,
            strings: vec!["Adobe".to_string(), "Identity".to_string()],
            font_dicts: font_dicts.max(1),
            ..Self::simple()
        }
    }

    /// Add another entry to the Name INDEX, making a FontSet
    pub fn font_set_member(mut self, name: &str) -> Self {
        self.names.push(name.to_string());
        self
    }

    /// Append a named glyph
    pub fn glyph(mut self, name: &str, charstring: Vec<u8>) -> Self {
        let sid = match standard_sid(name) {
            Some(sid) => sid,
            None => {
                self.strings.push(name.to_string());
                STANDARD_STRING_COUNT + self.strings.len() as u16 - 1
            }
        };
        self.glyphs.push((sid, 0, charstring));
        self
    }

    /// Append a CID glyph using Font DICT `fd`
    pub fn cid_glyph(mut self, cid: u16, fd: u8, charstring: Vec<u8>) -> Self {
        self.glyphs.push((cid, fd, charstring));
        self
    }

    pub fn global_subr(mut self, body: Vec<u8>) -> Self {
        self.global_subrs.push(body);
        self
    }

    /// Add a local subroutine to Font DICT `fd` (0 for name-keyed programs)
    pub fn local_subr(mut self, fd: usize, body: Vec<u8>) -> Self {
        if self.local_subrs.len() <= fd {
            self.local_subrs.resize(fd + 1, Vec::new());
        }
        self.local_subrs[fd].push(body);
        self
    }

    /// Custom format 0 encoding: `codes[i]` encodes glyph `i + 1`
    pub fn custom_encoding(mut self, codes: &[u8]) -> Self {
        self.encoding = Some(codes.to_vec());
        self
    }

    pub fn charstring_type(mut self, charstring_type: i32) -> Self {
        self.charstring_type = Some(charstring_type);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut top_dict = Dict::new();
        if self.cid {
            top_dict.set(
                dict::ROS,
                vec![
                    Operand::Integer(STANDARD_STRING_COUNT as i32),
                    Operand::Integer(STANDARD_STRING_COUNT as i32 + 1),
                    Operand::Integer(0),
                ],
            );
            top_dict.set(
                dict::escape(34),
                vec![Operand::Integer(self.glyphs.len() as i32)],
            );
        }
        if let Some(charstring_type) = self.charstring_type {
            top_dict.set(dict::CHARSTRING_TYPE, vec![Operand::Integer(charstring_type)]);
        }

        let privates = (0..self.font_dicts)
            .map(|fd| {
                let mut private = Dict::new();
                private.set(20, vec![Operand::Integer(500)]); // defaultWidthX
                PrivateTables {
                    dict: private,
                    subrs: self
                        .local_subrs
                        .get(fd)
                        .filter(|subrs| !subrs.is_empty())
                        .map(|subrs| subrs.iter().map(Vec::as_slice).collect()),
                }
            })
            .collect();

        let ids: Vec<u16> = self.glyphs.iter().skip(1).map(|&(id, _, _)| id).collect();
        let fds: Vec<u8> = self.glyphs.iter().map(|&(_, fd, _)| fd).collect();

        CffTables {
            header: vec![1, 0, 4, 4],
            names: self.names.iter().map(String::as_bytes).collect(),
            top_dict,
            strings: self.strings.iter().map(|s| s.as_bytes()).collect(),
            global_subrs: self.global_subrs.iter().map(Vec::as_slice).collect(),
            char_strings: self.glyphs.iter().map(|(_, _, cs)| cs.as_slice()).collect(),
            charset: write_charset(&ids),
            encoding: self.encoding.as_ref().and_then(|codes| write_encoding(codes, &[]).ok()),
            fd_select: self.cid.then(|| write_fd_select(&fds)),
            font_dicts: if self.cid {
                vec![Dict::new(); self.font_dicts]
            } else {
                Vec::new()
            },
            privates,
        }
        .write()
    }
}
