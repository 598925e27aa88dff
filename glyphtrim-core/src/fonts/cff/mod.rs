//! Compact Font Format (CFF) programs
//!
//! Parses bare CFF data as embedded through `FontFile3` (`Type1C` and
//! `CIDFontType0C`) and resolves character codes, glyph names and CIDs to
//! glyph ids.

pub mod charset;
pub mod charstring;
pub mod dict;
pub mod index;
pub mod strings;
pub mod subset;
pub(crate) mod writer;

pub use charset::{Charset, Encoding};
pub use charstring::{CharstringScanner, SeacComponents, SubrUsage};
pub use dict::{Dict, Operand};
pub use index::Index;
pub use subset::CffSubsetter;

use crate::error::{FontError, Result};
use crate::fonts::binary::{read_u8, slice};
use charset::parse_fd_select;
use std::collections::HashMap;
use strings::{standard_encoding_sid, standard_sid, STANDARD_STRINGS, STANDARD_STRING_COUNT};

/// A Private DICT and its local subroutines
#[derive(Debug, Clone)]
pub struct PrivateData<'a> {
    pub dict: Dict,
    pub subrs: Option<Index<'a>>,
}

/// Per-glyph Font DICTs of a CID-keyed program
#[derive(Debug, Clone)]
pub struct CidData<'a> {
    pub font_dicts: Vec<(Dict, PrivateData<'a>)>,
    /// Font DICT index of every glyph
    pub fd_select: Vec<u8>,
}

/// A parsed CFF program (the first font of its FontSet)
#[derive(Debug, Clone)]
pub struct CffFont<'a> {
    pub(crate) data: &'a [u8],
    pub(crate) header: &'a [u8],
    pub(crate) names: Index<'a>,
    pub(crate) top_dict: Dict,
    pub(crate) strings: Index<'a>,
    pub(crate) global_subrs: Index<'a>,
    pub(crate) char_strings: Index<'a>,
    pub(crate) charset: Charset,
    /// `None` for CID-keyed programs
    pub(crate) encoding: Option<Encoding>,
    pub(crate) private: Option<PrivateData<'a>>,
    pub(crate) cid: Option<CidData<'a>>,
    glyph_by_id: HashMap<u16, u16>,
}

impl<'a> CffFont<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let major = read_u8(data, 0)?;
        if major != 1 {
            return Err(FontError::UnsupportedFormat(format!(
                "CFF major version {}",
                major
            )));
        }
        let header_size = read_u8(data, 2)? as usize;
        let header = slice(data, 0, header_size)?;

        let (names, pos) = Index::parse(data, header_size)?;
        let (top_dicts, pos) = Index::parse(data, pos)?;
        let (strings, pos) = Index::parse(data, pos)?;
        let (global_subrs, _) = Index::parse(data, pos)?;

        let top_data = top_dicts
            .get(0)
            .ok_or_else(|| FontError::malformed(pos, "CFF program has no Top DICT"))?;
        let top_dict = Dict::parse(top_data)?;

        let charstring_type = top_dict.get_int(dict::CHARSTRING_TYPE).unwrap_or(2);
        if charstring_type != 2 {
            return Err(FontError::UnsupportedFormat(format!(
                "CharstringType {}",
                charstring_type
            )));
        }

        let char_strings_offset = top_dict
            .get_int(dict::CHAR_STRINGS)
            .ok_or_else(|| FontError::MalformedFontProgram("Top DICT lacks CharStrings".to_string()))?;
        let (char_strings, _) = Index::parse(data, to_offset(char_strings_offset)?)?;
        let num_glyphs = char_strings.len();
        if num_glyphs == 0 {
            return Err(FontError::MalformedFontProgram(
                "CFF program has no glyphs".to_string(),
            ));
        }

        let charset = Charset::parse(
            data,
            top_dict.get_int(dict::CHARSET).unwrap_or(0),
            num_glyphs,
        )?;

        let is_cid = top_dict.contains(dict::ROS);
        let (encoding, private, cid) = if is_cid {
            (None, None, Some(parse_cid_data(data, &top_dict, num_glyphs)?))
        } else {
            let encoding = Encoding::parse(data, top_dict.get_int(dict::ENCODING).unwrap_or(0))?;
            (Some(encoding), parse_private(data, &top_dict)?, None)
        };

        let glyph_by_id = charset.reverse(num_glyphs);

        Ok(Self {
            data,
            header,
            names,
            top_dict,
            strings,
            global_subrs,
            char_strings,
            charset,
            encoding,
            private,
            cid,
            glyph_by_id,
        })
    }

    pub fn num_glyphs(&self) -> u16 {
        self.char_strings.len().min(u16::MAX as usize) as u16
    }

    pub fn is_cid_keyed(&self) -> bool {
        self.cid.is_some()
    }

    pub fn top_dict(&self) -> &Dict {
        &self.top_dict
    }

    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    pub fn charstring(&self, gid: u16) -> Option<&'a [u8]> {
        self.char_strings.get(gid as usize)
    }

    pub fn global_subrs(&self) -> &Index<'a> {
        &self.global_subrs
    }

    /// Font DICT index of a glyph (always 0 for name-keyed programs)
    pub fn font_dict_index(&self, gid: u16) -> Result<usize> {
        match &self.cid {
            None => Ok(0),
            Some(cid) => {
                let fd = *cid.fd_select.get(gid as usize).ok_or_else(|| {
                    FontError::MalformedFontProgram(format!("Glyph {} missing from FDSelect", gid))
                })? as usize;
                if fd >= cid.font_dicts.len() {
                    return Err(FontError::MalformedFontProgram(format!(
                        "Glyph {} selects Font DICT {} of {}",
                        gid,
                        fd,
                        cid.font_dicts.len()
                    )));
                }
                Ok(fd)
            }
        }
    }

    /// Local subroutines visible to a glyph
    pub fn local_subrs(&self, gid: u16) -> Result<Option<&Index<'a>>> {
        let private = match &self.cid {
            None => self.private.as_ref(),
            Some(cid) => cid
                .font_dicts
                .get(self.font_dict_index(gid)?)
                .map(|(_, private)| private),
        };
        Ok(private.and_then(|p| p.subrs.as_ref()))
    }

    /// String for a SID
    pub fn string(&self, sid: u16) -> Option<&str> {
        if sid < STANDARD_STRING_COUNT {
            return STANDARD_STRINGS.get(sid as usize).copied();
        }
        self.strings
            .get((sid - STANDARD_STRING_COUNT) as usize)
            .and_then(|s| std::str::from_utf8(s).ok())
    }

    /// SID of a glyph name, looking at the standard strings first
    pub fn sid_for_name(&self, name: &str) -> Option<u16> {
        standard_sid(name).or_else(|| {
            self.strings
                .iter()
                .position(|s| s == name.as_bytes())
                .map(|i| i as u16 + STANDARD_STRING_COUNT)
        })
    }

    /// Glyph whose charset entry is `id` (a SID, or a CID when CID-keyed)
    pub fn glyph_for_charset_id(&self, id: u16) -> Option<u16> {
        self.glyph_by_id.get(&id).copied()
    }

    /// Glyph for a CID. Name-keyed programs used as CID fonts map CID to GID.
    pub fn glyph_for_cid(&self, cid: u32) -> Option<u16> {
        if self.is_cid_keyed() {
            u16::try_from(cid).ok().and_then(|c| self.glyph_for_charset_id(c))
        } else {
            u16::try_from(cid).ok().filter(|&gid| gid < self.num_glyphs())
        }
    }

    pub fn glyph_for_name(&self, name: &str) -> Option<u16> {
        if self.is_cid_keyed() {
            return None;
        }
        self.sid_for_name(name).and_then(|sid| self.glyph_for_charset_id(sid))
    }

    /// Glyph for a simple-font code. A glyph name from the PDF encoding
    /// takes precedence over the program's built-in encoding.
    pub fn glyph_for_code(&self, code: u32, glyph_name: Option<&str>) -> Result<Option<u16>> {
        if let Some(gid) = glyph_name.and_then(|name| self.glyph_for_name(name)) {
            return Ok(Some(gid));
        }
        let Ok(code) = u8::try_from(code) else {
            return Ok(None);
        };

        match &self.encoding {
            None => Ok(self.glyph_for_cid(code as u32)),
            Some(Encoding::Standard) => Ok(self.glyph_for_standard_code(code)),
            Some(Encoding::Expert) => Err(FontError::UnsupportedFormat(
                "Expert encoding lookups are not supported".to_string(),
            )),
            Some(Encoding::Custom { codes, supplements }) => {
                if let Some(&gid) = codes.get(&code) {
                    return Ok(Some(gid));
                }
                Ok(supplements
                    .iter()
                    .find(|&&(c, _)| c == code)
                    .and_then(|&(_, sid)| self.glyph_for_charset_id(sid)))
            }
        }
    }

    /// Glyph for a code of the Adobe standard encoding (seac components)
    pub fn glyph_for_standard_code(&self, code: u8) -> Option<u16> {
        match standard_encoding_sid(code) {
            0 => None,
            sid => self.glyph_for_charset_id(sid),
        }
    }
}

fn to_offset(value: i32) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| FontError::MalformedFontProgram(format!("Negative offset {}", value)))
}

/// Parse the Private DICT a Top or Font DICT points at
fn parse_private<'a>(data: &'a [u8], dict: &Dict) -> Result<Option<PrivateData<'a>>> {
    let Some((size, offset)) = dict.get_pair(dict::PRIVATE) else {
        return Ok(None);
    };
    let offset = to_offset(offset)?;
    let private_dict = Dict::parse(slice(data, offset, to_offset(size)?)?)?;

    // Subrs is relative to the Private DICT
    let subrs = match private_dict.get_int(dict::SUBRS) {
        Some(relative) => Some(Index::parse(data, offset + to_offset(relative)?)?.0),
        None => None,
    };

    Ok(Some(PrivateData {
        dict: private_dict,
        subrs,
    }))
}

fn parse_cid_data<'a>(data: &'a [u8], top_dict: &Dict, num_glyphs: usize) -> Result<CidData<'a>> {
    let fd_array_offset = top_dict
        .get_int(dict::FD_ARRAY)
        .ok_or_else(|| FontError::MalformedFontProgram("CID Top DICT lacks FDArray".to_string()))?;
    let (fd_array, _) = Index::parse(data, to_offset(fd_array_offset)?)?;

    let font_dicts = fd_array
        .iter()
        .map(|raw| {
            let font_dict = Dict::parse(raw)?;
            let private = parse_private(data, &font_dict)?.unwrap_or(PrivateData {
                dict: Dict::new(),
                subrs: None,
            });
            Ok((font_dict, private))
        })
        .collect::<Result<Vec<_>>>()?;

    let fd_select = match top_dict.get_int(dict::FD_SELECT) {
        Some(offset) => parse_fd_select(data, to_offset(offset)?, num_glyphs)?,
        // A single Font DICT needs no selector
        None if font_dicts.len() == 1 => vec![0; num_glyphs],
        None => {
            return Err(FontError::MalformedFontProgram(
                "CID Top DICT lacks FDSelect".to_string(),
            ))
        }
    };

    Ok(CidData {
        font_dicts,
        fd_select,
    })
}
