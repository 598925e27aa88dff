//! Charsets, encodings and FDSelect tables

use crate::error::{FontError, Result};
use crate::fonts::binary::{read_u16, read_u8, write_u16};
use std::collections::{BTreeMap, HashMap};

/// Last SID of the predefined ISOAdobe charset
const ISO_ADOBE_LAST_SID: u16 = 228;

/// Glyph id -> SID (name-keyed fonts) or CID (CID-keyed fonts)
#[derive(Debug, Clone, PartialEq)]
pub enum Charset {
    IsoAdobe,
    /// `ids[gid]`, with `ids[0] == 0` for .notdef
    Glyphs(Vec<u16>),
}

impl Charset {
    /// Parse the charset at a Top DICT `charset` offset
    pub fn parse(cff: &[u8], offset: i32, num_glyphs: usize) -> Result<Self> {
        match offset {
            0 => return Ok(Charset::IsoAdobe),
            1 | 2 => {
                return Err(FontError::UnsupportedFormat(
                    "Expert charsets are not supported".to_string(),
                ))
            }
            o if o < 0 => return Err(FontError::malformed(0, "Negative charset offset")),
            _ => {}
        }

        let offset = offset as usize;
        let format = read_u8(cff, offset)?;
        let mut ids = Vec::with_capacity(num_glyphs);
        ids.push(0);
        let mut pos = offset + 1;

        match format {
            0 => {
                while ids.len() < num_glyphs {
                    ids.push(read_u16(cff, pos)?);
                    pos += 2;
                }
            }
            1 | 2 => {
                while ids.len() < num_glyphs {
                    let first = read_u16(cff, pos)?;
                    let n_left = if format == 1 {
                        read_u8(cff, pos + 2)? as u16
                    } else {
                        read_u16(cff, pos + 2)?
                    };
                    pos += if format == 1 { 3 } else { 4 };
                    for i in 0..=n_left {
                        if ids.len() == num_glyphs {
                            break;
                        }
                        ids.push(first.wrapping_add(i));
                    }
                }
            }
            _ => {
                return Err(FontError::malformed(
                    offset,
                    format!("Unknown charset format {}", format),
                ))
            }
        }

        Ok(Charset::Glyphs(ids))
    }

    /// SID or CID of a glyph
    pub fn id(&self, gid: u16) -> Option<u16> {
        match self {
            Charset::IsoAdobe => (gid <= ISO_ADOBE_LAST_SID).then_some(gid),
            Charset::Glyphs(ids) => ids.get(gid as usize).copied(),
        }
    }

    /// SID or CID -> glyph id table
    pub fn reverse(&self, num_glyphs: usize) -> HashMap<u16, u16> {
        (0..num_glyphs.min(u16::MAX as usize + 1))
            .filter_map(|gid| {
                let gid = gid as u16;
                self.id(gid).map(|id| (id, gid))
            })
            .collect()
    }
}

/// Serialize a charset for glyphs 1.., choosing the smaller of format 0 and 2
pub fn write_charset(ids: &[u16]) -> Vec<u8> {
    let mut ranges: Vec<(u16, u16)> = Vec::new();
    for &id in ids {
        match ranges.last_mut() {
            Some((first, n_left)) if *first as u32 + *n_left as u32 + 1 == id as u32 => *n_left += 1,
            _ => ranges.push((id, 0)),
        }
    }

    let mut out = Vec::new();
    if ranges.len() * 4 < ids.len() * 2 {
        out.push(2);
        for (first, n_left) in ranges {
            write_u16(&mut out, first);
            write_u16(&mut out, n_left);
        }
    } else {
        out.push(0);
        for &id in ids {
            write_u16(&mut out, id);
        }
    }
    out
}

/// Code -> glyph mapping of a name-keyed font
#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    Standard,
    Expert,
    Custom {
        /// code -> glyph id
        codes: BTreeMap<u8, u16>,
        /// code -> SID
        supplements: Vec<(u8, u16)>,
    },
}

impl Encoding {
    /// Parse the encoding at a Top DICT `Encoding` offset
    pub fn parse(cff: &[u8], offset: i32) -> Result<Self> {
        match offset {
            0 => return Ok(Encoding::Standard),
            1 => return Ok(Encoding::Expert),
            o if o < 0 => return Err(FontError::malformed(0, "Negative encoding offset")),
            _ => {}
        }

        let offset = offset as usize;
        let format = read_u8(cff, offset)?;
        let mut codes = BTreeMap::new();
        let mut pos = offset + 1;
        let mut gid: u16 = 1;

        match format & 0x7F {
            0 => {
                let n_codes = read_u8(cff, pos)?;
                pos += 1;
                for _ in 0..n_codes {
                    codes.insert(read_u8(cff, pos)?, gid);
                    gid += 1;
                    pos += 1;
                }
            }
            1 => {
                let n_ranges = read_u8(cff, pos)?;
                pos += 1;
                for _ in 0..n_ranges {
                    let first = read_u8(cff, pos)?;
                    let n_left = read_u8(cff, pos + 1)?;
                    for i in 0..=n_left {
                        codes.insert(first.wrapping_add(i), gid);
                        gid += 1;
                    }
                    pos += 2;
                }
            }
            other => {
                return Err(FontError::malformed(
                    offset,
                    format!("Unknown encoding format {}", other),
                ))
            }
        }

        let mut supplements = Vec::new();
        if format & 0x80 != 0 {
            let n_sups = read_u8(cff, pos)?;
            pos += 1;
            for _ in 0..n_sups {
                supplements.push((read_u8(cff, pos)?, read_u16(cff, pos + 1)?));
                pos += 3;
            }
        }

        Ok(Encoding::Custom { codes, supplements })
    }
}

/// Serialize a custom encoding as format 0.
///
/// `codes[i]` is the code of glyph `i + 1`. Both counts are single bytes,
/// so at most 255 codes and 255 supplements fit.
pub fn write_encoding(codes: &[u8], supplements: &[(u8, u16)]) -> Result<Vec<u8>> {
    let n_codes = u8::try_from(codes.len()).map_err(|_| {
        FontError::MalformedFontProgram(format!("{} encoded glyphs do not fit a format 0 encoding", codes.len()))
    })?;
    let n_supplements = u8::try_from(supplements.len()).map_err(|_| {
        FontError::MalformedFontProgram(format!("{} encoding supplements exceed 255", supplements.len()))
    })?;

    let mut out = Vec::new();
    out.push(if supplements.is_empty() { 0 } else { 0x80 });
    out.push(n_codes);
    out.extend_from_slice(codes);
    if !supplements.is_empty() {
        out.push(n_supplements);
        for &(code, sid) in supplements {
            out.push(code);
            write_u16(&mut out, sid);
        }
    }
    Ok(out)
}

/// Parse FDSelect into a per-glyph Font DICT index
pub fn parse_fd_select(cff: &[u8], offset: usize, num_glyphs: usize) -> Result<Vec<u8>> {
    let format = read_u8(cff, offset)?;
    match format {
        0 => (0..num_glyphs).map(|gid| read_u8(cff, offset + 1 + gid)).collect(),
        3 => {
            let n_ranges = read_u16(cff, offset + 1)? as usize;
            let mut fds = vec![0u8; num_glyphs];
            for i in 0..n_ranges {
                let record = offset + 3 + i * 3;
                let first = read_u16(cff, record)? as usize;
                let fd = read_u8(cff, record + 2)?;
                let next = read_u16(cff, record + 3)? as usize;
                if first > next {
                    return Err(FontError::malformed(record, "FDSelect ranges out of order"));
                }
                for slot in fds.iter_mut().take(next).skip(first) {
                    *slot = fd;
                }
            }
            Ok(fds)
        }
        _ => Err(FontError::malformed(
            offset,
            format!("Unknown FDSelect format {}", format),
        )),
    }
}

/// Serialize a per-glyph Font DICT index as FDSelect format 3
pub fn write_fd_select(fds: &[u8]) -> Vec<u8> {
    let mut ranges: Vec<(u16, u8)> = Vec::new();
    for (gid, &fd) in fds.iter().enumerate() {
        if ranges.last().map(|&(_, last)| last) != Some(fd) {
            ranges.push((gid as u16, fd));
        }
    }

    let mut out = vec![3];
    write_u16(&mut out, ranges.len() as u16);
    for (first, fd) in ranges {
        write_u16(&mut out, first);
        out.push(fd);
    }
    write_u16(&mut out, fds.len() as u16);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_formats() {
        // format 0
        let data = [0, 0, 5, 0, 9];
        assert_eq!(
            Charset::parse(&data, 0, 3),
            Ok(Charset::IsoAdobe),
        );
        let cff = [&[0u8; 4][..], &data[..]].concat();
        assert_eq!(
            Charset::parse(&cff, 4, 3).unwrap(),
            Charset::Glyphs(vec![0, 5, 9])
        );

        // format 1: one range 100..=102
        let cff = [0, 0, 0, 0, 1, 0, 100, 2];
        assert_eq!(
            Charset::parse(&cff, 4, 4).unwrap(),
            Charset::Glyphs(vec![0, 100, 101, 102])
        );

        // format 2: 1000..=1001
        let cff = [0, 0, 0, 0, 2, 0x03, 0xE8, 0, 1];
        assert_eq!(
            Charset::parse(&cff, 4, 3).unwrap().id(2),
            Some(1001)
        );
    }

    #[test]
    fn test_expert_charset_unsupported() {
        assert!(matches!(
            Charset::parse(&[], 1, 10),
            Err(FontError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_iso_adobe_lookup() {
        let charset = Charset::IsoAdobe;
        assert_eq!(charset.id(34), Some(34));
        assert_eq!(charset.id(229), None);
        assert_eq!(charset.reverse(40).get(&34), Some(&34));
    }

    #[test]
    fn test_write_charset_picks_smaller_format() {
        let ranged = write_charset(&[1000, 1001, 1002, 1003]);
        assert_eq!(ranged, vec![2, 0x03, 0xE8, 0, 3]);

        let scattered = write_charset(&[5, 9]);
        assert_eq!(scattered, vec![0, 0, 5, 0, 9]);

        let mut cff = vec![0u8; 4];
        cff.extend(ranged);
        assert_eq!(
            Charset::parse(&cff, 4, 5).unwrap(),
            Charset::Glyphs(vec![0, 1000, 1001, 1002, 1003])
        );
    }

    #[test]
    fn test_encoding_counts_must_fit_a_byte() {
        let codes: Vec<u8> = (0..=255u8).collect();
        assert!(matches!(
            write_encoding(&codes, &[]),
            Err(FontError::MalformedFontProgram(_))
        ));
        assert_eq!(write_encoding(&codes[1..], &[]).unwrap()[1], 255);

        let supplements = vec![(32u8, 1u16); 256];
        assert!(write_encoding(&[65], &supplements).is_err());
    }

    #[test]
    fn test_custom_encoding_with_supplements() {
        let mut cff = vec![0u8; 4];
        cff.extend(write_encoding(&[65, 66], &[(97, 34)]).unwrap());
        let encoding = Encoding::parse(&cff, 4).unwrap();

        let expected_codes: BTreeMap<u8, u16> = [(65, 1), (66, 2)].into_iter().collect();
        assert_eq!(
            encoding,
            Encoding::Custom {
                codes: expected_codes,
                supplements: vec![(97, 34)]
            }
        );
        assert_eq!(Encoding::parse(&cff, 0).unwrap(), Encoding::Standard);
    }

    #[test]
    fn test_encoding_format1() {
        let cff = [0, 0, 0, 0, 1, 1, 65, 2];
        let Encoding::Custom { codes, .. } = Encoding::parse(&cff, 4).unwrap() else {
            panic!("expected custom encoding");
        };
        assert_eq!(codes.get(&67), Some(&3));
    }

    #[test]
    fn test_fd_select_round_trip() {
        let fds = vec![0, 0, 1, 1, 1, 0];
        let mut cff = vec![0u8; 2];
        cff.extend(write_fd_select(&fds));
        assert_eq!(parse_fd_select(&cff, 2, 6).unwrap(), fds);

        let format0 = [0, 2, 1, 0];
        assert_eq!(parse_fd_select(&format0, 0, 3).unwrap(), vec![2, 1, 0]);
    }
}
