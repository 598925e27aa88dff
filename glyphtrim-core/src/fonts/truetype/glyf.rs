//! Composite glyph records in the `glyf` table

use crate::error::Result;
use crate::fonts::binary::{read_i16, read_u16};
use bitflags::bitflags;

bitflags! {
    /// Flags of a composite glyph component record
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ComponentFlags: u16 {
        /// Arguments are 16-bit words instead of bytes
        const ARG_1_AND_2_ARE_WORDS = 1 << 0;
        /// Arguments are x/y offsets rather than point numbers
        const ARGS_ARE_XY_VALUES = 1 << 1;
        const ROUND_XY_TO_GRID = 1 << 2;
        /// One F2Dot14 scale follows
        const WE_HAVE_A_SCALE = 1 << 3;
        /// Another component record follows
        const MORE_COMPONENTS = 1 << 5;
        /// Separate x and y scales follow
        const WE_HAVE_AN_X_AND_Y_SCALE = 1 << 6;
        /// A 2x2 transform follows
        const WE_HAVE_A_TWO_BY_TWO = 1 << 7;
        /// Instructions follow the last component
        const WE_HAVE_INSTRUCTIONS = 1 << 8;
        const USE_MY_METRICS = 1 << 9;
        const OVERLAP_COMPOUND = 1 << 10;
        const SCALED_COMPONENT_OFFSET = 1 << 11;
        const UNSCALED_COMPONENT_OFFSET = 1 << 12;
    }
}

/// Size of the glyph header (numberOfContours + bounding box)
const GLYPH_HEADER_LEN: usize = 10;

/// Component references of a glyph as (offset of the glyph id field, glyph id).
///
/// Simple and empty glyphs have none.
pub fn component_glyph_ids(glyph: &[u8]) -> Result<Vec<(usize, u16)>> {
    if glyph.len() < GLYPH_HEADER_LEN || read_i16(glyph, 0)? >= 0 {
        return Ok(Vec::new());
    }

    let mut components = Vec::new();
    let mut pos = GLYPH_HEADER_LEN;
    loop {
        let flags = ComponentFlags::from_bits_retain(read_u16(glyph, pos)?);
        let glyph_id = read_u16(glyph, pos + 2)?;
        components.push((pos + 2, glyph_id));

        pos += 4;
        pos += if flags.contains(ComponentFlags::ARG_1_AND_2_ARE_WORDS) {
            4
        } else {
            2
        };

        if flags.contains(ComponentFlags::WE_HAVE_A_SCALE) {
            pos += 2;
        } else if flags.contains(ComponentFlags::WE_HAVE_AN_X_AND_Y_SCALE) {
            pos += 4;
        } else if flags.contains(ComponentFlags::WE_HAVE_A_TWO_BY_TWO) {
            pos += 8;
        }

        if !flags.contains(ComponentFlags::MORE_COMPONENTS) {
            break;
        }
    }

    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composite_header() -> Vec<u8> {
        let mut glyph = Vec::new();
        glyph.extend_from_slice(&(-1i16).to_be_bytes());
        glyph.extend_from_slice(&[0u8; 8]);
        glyph
    }

    #[test]
    fn test_simple_glyph_has_no_components() {
        let mut glyph = vec![0x00, 0x01];
        glyph.extend_from_slice(&[0u8; 12]);
        assert!(component_glyph_ids(&glyph).unwrap().is_empty());
        assert!(component_glyph_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_component_record_sizes() {
        let mut glyph = composite_header();
        // word args + scale, more components
        let flags = ComponentFlags::ARG_1_AND_2_ARE_WORDS
            | ComponentFlags::WE_HAVE_A_SCALE
            | ComponentFlags::MORE_COMPONENTS;
        glyph.extend_from_slice(&flags.bits().to_be_bytes());
        glyph.extend_from_slice(&7u16.to_be_bytes());
        glyph.extend_from_slice(&[0u8; 6]);
        // byte args + 2x2
        let flags = ComponentFlags::WE_HAVE_A_TWO_BY_TWO;
        glyph.extend_from_slice(&flags.bits().to_be_bytes());
        glyph.extend_from_slice(&300u16.to_be_bytes());
        glyph.extend_from_slice(&[0u8; 10]);

        assert_eq!(component_glyph_ids(&glyph).unwrap(), vec![(12, 7), (22, 300)]);
    }

    #[test]
    fn test_truncated_composite_is_error() {
        let mut glyph = composite_header();
        glyph.extend_from_slice(&ComponentFlags::MORE_COMPONENTS.bits().to_be_bytes());
        glyph.extend_from_slice(&[0, 1, 0, 0]);
        assert!(component_glyph_ids(&glyph).is_err());
    }
}
