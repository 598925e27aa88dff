//! CFF DICT data: Top, Font and Private dictionaries

use crate::error::{FontError, Result};

/// Two-byte operators are stored as `0x0C00 | second byte`
pub const fn escape(op: u8) -> u16 {
    0x0C00 | op as u16
}

pub const CHARSET: u16 = 15;
pub const ENCODING: u16 = 16;
pub const CHAR_STRINGS: u16 = 17;
pub const PRIVATE: u16 = 18;
pub const SUBRS: u16 = 19;
pub const CHARSTRING_TYPE: u16 = escape(6);
pub const ROS: u16 = escape(30);
pub const FD_ARRAY: u16 = escape(36);
pub const FD_SELECT: u16 = escape(37);

/// A DICT operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Integer(i32),
    /// Packed BCD nibbles of a real number, kept verbatim
    Real(Vec<u8>),
    /// An offset, always written with the 5-byte integer encoding
    Offset(i32),
}

impl Operand {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Operand::Integer(i) | Operand::Offset(i) => Some(*i),
            Operand::Real(_) => None,
        }
    }
}

/// Ordered list of (operator, operands) entries
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dict {
    entries: Vec<(u16, Vec<Operand>)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse DICT data
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut operands = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let b0 = data[pos];
            match b0 {
                0..=21 => {
                    let op = if b0 == 12 {
                        pos += 1;
                        escape(*data.get(pos).ok_or_else(|| {
                            FontError::malformed(pos, "Truncated DICT escape operator")
                        })?)
                    } else {
                        b0 as u16
                    };
                    entries.push((op, std::mem::take(&mut operands)));
                    pos += 1;
                }
                28 => {
                    let bytes = data
                        .get(pos + 1..pos + 3)
                        .ok_or_else(|| FontError::malformed(pos, "Truncated DICT integer"))?;
                    operands.push(Operand::Integer(i16::from_be_bytes([bytes[0], bytes[1]]) as i32));
                    pos += 3;
                }
                29 => {
                    let bytes = data
                        .get(pos + 1..pos + 5)
                        .ok_or_else(|| FontError::malformed(pos, "Truncated DICT integer"))?;
                    operands.push(Operand::Integer(i32::from_be_bytes([
                        bytes[0], bytes[1], bytes[2], bytes[3],
                    ])));
                    pos += 5;
                }
                30 => {
                    let start = pos;
                    pos += 1;
                    loop {
                        let byte = *data
                            .get(pos)
                            .ok_or_else(|| FontError::malformed(start, "Unterminated DICT real"))?;
                        pos += 1;
                        if byte & 0x0F == 0x0F || byte >> 4 == 0x0F {
                            break;
                        }
                    }
                    operands.push(Operand::Real(data[start + 1..pos].to_vec()));
                }
                32..=246 => {
                    operands.push(Operand::Integer(b0 as i32 - 139));
                    pos += 1;
                }
                247..=254 => {
                    let b1 = *data
                        .get(pos + 1)
                        .ok_or_else(|| FontError::malformed(pos, "Truncated DICT integer"))?
                        as i32;
                    let value = if b0 <= 250 {
                        (b0 as i32 - 247) * 256 + b1 + 108
                    } else {
                        -(b0 as i32 - 251) * 256 - b1 - 108
                    };
                    operands.push(Operand::Integer(value));
                    pos += 2;
                }
                _ => {
                    return Err(FontError::malformed(
                        pos,
                        format!("Invalid DICT byte {}", b0),
                    ))
                }
            }
        }

        Ok(Dict { entries })
    }

    pub fn get(&self, op: u16) -> Option<&[Operand]> {
        self.entries
            .iter()
            .find(|(o, _)| *o == op)
            .map(|(_, operands)| operands.as_slice())
    }

    /// First operand of `op` as an integer
    pub fn get_int(&self, op: u16) -> Option<i32> {
        self.get(op)?.first()?.as_int()
    }

    /// Two integer operands, e.g. Private's (size, offset)
    pub fn get_pair(&self, op: u16) -> Option<(i32, i32)> {
        match self.get(op)? {
            [a, b] => Some((a.as_int()?, b.as_int()?)),
            _ => None,
        }
    }

    pub fn contains(&self, op: u16) -> bool {
        self.get(op).is_some()
    }

    /// Replace the operands of `op`, appending the entry when absent
    pub fn set(&mut self, op: u16, operands: Vec<Operand>) {
        match self.entries.iter_mut().find(|(o, _)| *o == op) {
            Some((_, slot)) => *slot = operands,
            None => self.entries.push((op, operands)),
        }
    }

    pub fn remove(&mut self, op: u16) {
        self.entries.retain(|(o, _)| *o != op);
    }

    /// Serialize; `ROS` stays first as CID-keyed fonts require
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let ros = self.entries.iter().filter(|(op, _)| *op == ROS);
        let rest = self.entries.iter().filter(|(op, _)| *op != ROS);
        for (op, operands) in ros.chain(rest) {
            for operand in operands {
                encode_operand(&mut out, operand);
            }
            if *op >= 0x0C00 {
                out.push(12);
                out.push((*op & 0xFF) as u8);
            } else {
                out.push(*op as u8);
            }
        }
        out
    }
}

fn encode_operand(out: &mut Vec<u8>, operand: &Operand) {
    match operand {
        Operand::Integer(v) => encode_integer(out, *v),
        Operand::Offset(v) => {
            out.push(29);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Operand::Real(nibbles) => {
            out.push(30);
            out.extend_from_slice(nibbles);
        }
    }
}

fn encode_integer(out: &mut Vec<u8>, v: i32) {
    match v {
        -107..=107 => out.push((v + 139) as u8),
        108..=1131 => {
            let v = v - 108;
            out.push((v / 256 + 247) as u8);
            out.push((v % 256) as u8);
        }
        -1131..=-108 => {
            let v = -v - 108;
            out.push((v / 256 + 251) as u8);
            out.push((v % 256) as u8);
        }
        -32768..=32767 => {
            out.push(28);
            out.extend_from_slice(&(v as i16).to_be_bytes());
        }
        _ => {
            out.push(29);
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
}
