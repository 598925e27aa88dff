//! CFF serialization
//!
//! Every offset operand is written with the fixed 5-byte encoding, so DICT
//! sizes are known before the layout and one pass places every table.

use super::dict::{self, Dict, Operand};
use super::index::write_index;

/// A Private DICT and the local subroutines written right after it
#[derive(Debug, Clone)]
pub(crate) struct PrivateTables<'b> {
    pub dict: Dict,
    pub subrs: Option<Vec<&'b [u8]>>,
}

impl PrivateTables<'_> {
    /// DICT bytes followed by the local subroutine INDEX
    fn encode(&self) -> (Vec<u8>, Vec<u8>) {
        let mut private = self.dict.clone();
        private.remove(dict::SUBRS);
        let Some(subrs) = &self.subrs else {
            return (private.encode(), Vec::new());
        };

        private.set(dict::SUBRS, vec![Operand::Offset(0)]);
        let size = private.encode().len() as i32;
        private.set(dict::SUBRS, vec![Operand::Offset(size)]);
        (private.encode(), write_index(subrs.iter().copied()))
    }
}

/// The tables of a single-font CFF program, in write order
#[derive(Debug, Clone)]
pub(crate) struct CffTables<'b> {
    pub header: Vec<u8>,
    pub names: Vec<&'b [u8]>,
    pub top_dict: Dict,
    pub strings: Vec<&'b [u8]>,
    pub global_subrs: Vec<&'b [u8]>,
    pub char_strings: Vec<&'b [u8]>,
    /// Serialized charset
    pub charset: Vec<u8>,
    /// Serialized custom encoding; predefined encodings stay in the Top DICT
    pub encoding: Option<Vec<u8>>,
    /// Serialized FDSelect, present for CID-keyed programs
    pub fd_select: Option<Vec<u8>>,
    pub font_dicts: Vec<Dict>,
    /// One per Font DICT when CID-keyed, otherwise at most one
    pub privates: Vec<PrivateTables<'b>>,
}

impl CffTables<'_> {
    pub fn write(&self) -> Vec<u8> {
        let privates: Vec<(Vec<u8>, Vec<u8>)> = self.privates.iter().map(|p| p.encode()).collect();
        let is_cid = self.fd_select.is_some();

        // Font DICTs and the Top DICT with placeholder offsets
        let mut font_dicts = self.font_dicts.clone();
        let mut top = self.top_dict.clone();
        let place = |top: &mut Dict, font_dicts: &mut [Dict], offsets: &Layout| {
            top.set(dict::CHARSET, vec![Operand::Offset(offsets.charset)]);
            top.set(dict::CHAR_STRINGS, vec![Operand::Offset(offsets.char_strings)]);
            if self.encoding.is_some() {
                top.set(dict::ENCODING, vec![Operand::Offset(offsets.encoding)]);
            }
            if is_cid {
                top.remove(dict::PRIVATE);
                top.set(dict::FD_SELECT, vec![Operand::Offset(offsets.fd_select)]);
                top.set(dict::FD_ARRAY, vec![Operand::Offset(offsets.fd_array)]);
                for (i, font_dict) in font_dicts.iter_mut().enumerate() {
                    if let (Some((private, _)), Some(&offset)) = (privates.get(i), offsets.privates.get(i)) {
                        font_dict.set(
                            dict::PRIVATE,
                            vec![Operand::Integer(private.len() as i32), Operand::Offset(offset)],
                        );
                    }
                }
            } else {
                match (privates.first(), offsets.privates.first()) {
                    (Some((private, _)), Some(&offset)) => top.set(
                        dict::PRIVATE,
                        vec![Operand::Integer(private.len() as i32), Operand::Offset(offset)],
                    ),
                    _ => top.remove(dict::PRIVATE),
                }
            }
        };

        let mut layout = Layout {
            privates: vec![0; privates.len()],
            ..Layout::default()
        };
        place(&mut top, &mut font_dicts, &layout);

        let names = write_index(self.names.iter().copied());
        let top_len = write_index([top.encode().as_slice()]).len();
        let strings = write_index(self.strings.iter().copied());
        let global_subrs = write_index(self.global_subrs.iter().copied());
        let char_strings = write_index(self.char_strings.iter().copied());
        let fd_array_len = if is_cid {
            let encoded: Vec<Vec<u8>> = font_dicts.iter().map(Dict::encode).collect();
            write_index(encoded.iter().map(Vec::as_slice)).len()
        } else {
            0
        };

        let mut pos = self.header.len() + names.len() + top_len + strings.len() + global_subrs.len();
        layout.char_strings = pos as i32;
        pos += char_strings.len();
        layout.charset = pos as i32;
        pos += self.charset.len();
        if let Some(encoding) = &self.encoding {
            layout.encoding = pos as i32;
            pos += encoding.len();
        }
        if let Some(fd_select) = &self.fd_select {
            layout.fd_select = pos as i32;
            pos += fd_select.len();
            layout.fd_array = pos as i32;
            pos += fd_array_len;
        }
        for (slot, (private, subrs)) in layout.privates.iter_mut().zip(&privates) {
            *slot = pos as i32;
            pos += private.len() + subrs.len();
        }

        place(&mut top, &mut font_dicts, &layout);

        let mut out = Vec::with_capacity(pos);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&names);
        out.extend(write_index([top.encode().as_slice()]));
        out.extend_from_slice(&strings);
        out.extend_from_slice(&global_subrs);
        out.extend_from_slice(&char_strings);
        out.extend_from_slice(&self.charset);
        if let Some(encoding) = &self.encoding {
            out.extend_from_slice(encoding);
        }
        if let Some(fd_select) = &self.fd_select {
            out.extend_from_slice(fd_select);
            let encoded: Vec<Vec<u8>> = font_dicts.iter().map(Dict::encode).collect();
            out.extend(write_index(encoded.iter().map(Vec::as_slice)));
        }
        for (private, subrs) in &privates {
            out.extend_from_slice(private);
            out.extend_from_slice(subrs);
        }
        out
    }
}

#[derive(Debug, Default)]
struct Layout {
    char_strings: i32,
    charset: i32,
    encoding: i32,
    fd_select: i32,
    fd_array: i32,
    privates: Vec<i32>,
}
