//! CFF INDEX structures

use crate::error::{FontError, Result};
use crate::fonts::binary::{offset_size, read_offset, read_u16, read_u8, write_offset, write_u16};

/// A parsed INDEX: count, offset array and object data
#[derive(Debug, Clone)]
pub struct Index<'a> {
    offsets: Vec<u32>,
    data: &'a [u8],
}

impl<'a> Index<'a> {
    /// Parse an INDEX at `offset`. Returns the index and the offset just past it.
    pub fn parse(cff: &'a [u8], offset: usize) -> Result<(Self, usize)> {
        let count = read_u16(cff, offset)? as usize;
        if count == 0 {
            return Ok((
                Index {
                    offsets: vec![1],
                    data: &[],
                },
                offset + 2,
            ));
        }

        let off_size = read_u8(cff, offset + 2)?;
        let offsets_start = offset + 3;
        let offsets = (0..=count)
            .map(|i| read_offset(cff, offsets_start + i * off_size as usize, off_size))
            .collect::<Result<Vec<u32>>>()?;

        // Object data starts at offset 1 relative to the byte before it
        let data_start = offsets_start + (count + 1) * off_size as usize;
        let data_len = offsets[count] as usize;
        if offsets[0] != 1 || offsets.windows(2).any(|w| w[0] > w[1]) || data_len == 0 {
            return Err(FontError::malformed(offset, "Invalid INDEX offsets"));
        }
        let end = data_start + data_len - 1;
        let data = cff
            .get(data_start..end)
            .ok_or_else(|| FontError::malformed(offset, "INDEX data extends beyond program"))?;

        Ok((Index { offsets, data }, end))
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        let start = *self.offsets.get(index)? as usize - 1;
        let end = *self.offsets.get(index + 1)? as usize - 1;
        self.data.get(start..end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Subroutine number bias for this many entries (Type 2 charstrings)
    pub fn subr_bias(&self) -> i32 {
        match self.len() {
            0..=1239 => 107,
            1240..=33899 => 1131,
            _ => 32768,
        }
    }
}

/// Serialize objects as an INDEX with the smallest offset size
pub fn write_index<'b>(objects: impl IntoIterator<Item = &'b [u8]>) -> Vec<u8> {
    let objects: Vec<&[u8]> = objects.into_iter().collect();
    let mut out = Vec::new();
    write_u16(&mut out, objects.len() as u16);
    if objects.is_empty() {
        return out;
    }

    let data_len: usize = objects.iter().map(|o| o.len()).sum();
    let off_size = offset_size(data_len as u32 + 1);
    out.push(off_size);

    let mut offset = 1u32;
    write_offset(&mut out, offset, off_size);
    for object in &objects {
        offset += object.len() as u32;
        write_offset(&mut out, offset, off_size);
    }
    for object in objects {
        out.extend_from_slice(object);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        let objects: Vec<&[u8]> = vec![b"abc", b"", b"de"];
        let bytes = write_index(objects.iter().copied());
        assert_eq!(bytes, vec![0, 3, 1, 1, 4, 4, 6, b'a', b'b', b'c', b'd', b'e']);

        let (index, end) = Index::parse(&bytes, 0).unwrap();
        assert_eq!(end, bytes.len());
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(1), Some(&b""[..]));
        assert_eq!(index.iter().collect::<Vec<_>>(), objects);
        assert_eq!(index.get(3), None);
    }

    #[test]
    fn test_empty_index() {
        let (index, end) = Index::parse(&[0, 0, 0xFF], 0).unwrap();
        assert!(index.is_empty());
        assert_eq!(end, 2);
        assert_eq!(write_index(std::iter::empty()), vec![0, 0]);
    }

    #[test]
    fn test_large_index_uses_wider_offsets() {
        let big = vec![7u8; 300];
        let bytes = write_index([big.as_slice()]);
        assert_eq!(bytes[2], 2);
        let (index, _) = Index::parse(&bytes, 0).unwrap();
        assert_eq!(index.get(0).map(<[u8]>::len), Some(300));
    }

    #[test]
    fn test_truncated_index_is_malformed() {
        assert!(Index::parse(&[0, 1, 1, 1, 5, b'a'], 0).is_err());
        assert!(Index::parse(&[0, 1, 1, 2, 1], 0).is_err());
    }

    #[test]
    fn test_subr_bias() {
        let small = write_index([&b"x"[..]]);
        assert_eq!(Index::parse(&small, 0).unwrap().0.subr_bias(), 107);

        let entries = vec![&b""[..]; 1240];
        let medium = write_index(entries);
        assert_eq!(Index::parse(&medium, 0).unwrap().0.subr_bias(), 1131);
    }
}
