//! Big-endian readers and writers shared by the sfnt and CFF code

use crate::error::{FontError, Result};

pub(crate) fn read_u8(data: &[u8], offset: usize) -> Result<u8> {
    data.get(offset)
        .copied()
        .ok_or_else(|| FontError::malformed(offset, "Insufficient data for u8"))
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > data.len() {
        return Err(FontError::malformed(offset, "Insufficient data for u16"));
    }
    Ok(((data[offset] as u16) << 8) | (data[offset + 1] as u16))
}

pub(crate) fn read_i16(data: &[u8], offset: usize) -> Result<i16> {
    read_u16(data, offset).map(|v| v as i16)
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    if offset + 4 > data.len() {
        return Err(FontError::malformed(offset, "Insufficient data for u32"));
    }
    Ok(((data[offset] as u32) << 24)
        | ((data[offset + 1] as u32) << 16)
        | ((data[offset + 2] as u32) << 8)
        | (data[offset + 3] as u32))
}

/// Read a 1 to 4 byte big-endian offset
pub(crate) fn read_offset(data: &[u8], offset: usize, size: u8) -> Result<u32> {
    if !(1..=4).contains(&size) {
        return Err(FontError::malformed(offset, format!("Invalid offset size {}", size)));
    }
    let end = offset + size as usize;
    let bytes = data
        .get(offset..end)
        .ok_or_else(|| FontError::malformed(offset, "Insufficient data for offset"))?;
    Ok(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

pub(crate) fn slice(data: &[u8], offset: usize, length: usize) -> Result<&[u8]> {
    offset
        .checked_add(length)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| FontError::malformed(offset, format!("{} bytes extend beyond data", length)))
}

pub(crate) fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_offset(out: &mut Vec<u8>, value: u32, size: u8) {
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[4 - size as usize..]);
}

pub(crate) fn set_u16(out: &mut [u8], offset: usize, value: u16) {
    out[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

pub(crate) fn set_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Smallest offset size able to hold `max`
pub(crate) fn offset_size(max: u32) -> u8 {
    match max {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

pub(crate) fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}
