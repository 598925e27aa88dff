//! Type 2 charstring scanning
//!
//! Charstrings are not rendered: the scanner only follows subroutine calls
//! and notes `endchar` accent composition, which is all subsetting needs.

use super::index::Index;
use crate::error::{FontError, Result};
use std::collections::BTreeSet;

/// Maximum subroutine nesting depth allowed by the Type 2 format
const MAX_SUBR_DEPTH: usize = 10;

/// Subroutines reached from a set of charstrings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubrUsage {
    pub global: BTreeSet<usize>,
    pub local: BTreeSet<usize>,
}

/// Codes of the base and accent glyphs of an `endchar` seac composite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeacComponents {
    pub base: u8,
    pub accent: u8,
}

#[derive(Debug, PartialEq)]
enum Flow {
    Return,
    EndChar,
}

/// Walks one charstring and the subroutines it calls
pub struct CharstringScanner<'s, 'a> {
    global_subrs: &'s Index<'a>,
    local_subrs: Option<&'s Index<'a>>,
    stack: Vec<i32>,
    stems: usize,
    seac: Option<SeacComponents>,
    finished: bool,
}

impl<'s, 'a> CharstringScanner<'s, 'a> {
    pub fn new(global_subrs: &'s Index<'a>, local_subrs: Option<&'s Index<'a>>) -> Self {
        Self {
            global_subrs,
            local_subrs,
            stack: Vec::new(),
            stems: 0,
            seac: None,
            finished: false,
        }
    }

    /// Scan a glyph's charstring, recording every subroutine it reaches
    pub fn scan(mut self, charstring: &[u8], usage: &mut SubrUsage) -> Result<Option<SeacComponents>> {
        self.run(charstring, usage, 0)?;
        Ok(self.seac)
    }

    fn run(&mut self, code: &[u8], usage: &mut SubrUsage, depth: usize) -> Result<Flow> {
        let mut pos = 0;
        while pos < code.len() {
            let b0 = code[pos];
            pos += 1;
            match b0 {
                // hstem, vstem, hstemhm, vstemhm
                1 | 3 | 18 | 23 => {
                    self.stems += self.stack.len() / 2;
                    self.stack.clear();
                }
                // hintmask, cntrmask: pending args are implicit vstems
                19 | 20 => {
                    self.stems += self.stack.len() / 2;
                    self.stack.clear();
                    pos += self.stems.div_ceil(8);
                }
                10 | 29 => {
                    let local = b0 == 10;
                    self.call_subr(local, usage, depth)?;
                    if self.finished {
                        return Ok(Flow::EndChar);
                    }
                }
                11 => return Ok(Flow::Return),
                14 => {
                    if self.stack.len() >= 4 {
                        let n = self.stack.len();
                        self.seac = Some(SeacComponents {
                            base: self.stack[n - 2] as u8,
                            accent: self.stack[n - 1] as u8,
                        });
                    }
                    self.stack.clear();
                    return Ok(Flow::EndChar);
                }
                12 => {
                    pos += 1;
                    self.stack.clear();
                }
                28 => {
                    let bytes = code
                        .get(pos..pos + 2)
                        .ok_or_else(|| FontError::malformed(pos, "Truncated charstring integer"))?;
                    self.stack.push(i16::from_be_bytes([bytes[0], bytes[1]]) as i32);
                    pos += 2;
                }
                32..=246 => self.stack.push(b0 as i32 - 139),
                247..=254 => {
                    let b1 = *code
                        .get(pos)
                        .ok_or_else(|| FontError::malformed(pos, "Truncated charstring integer"))?
                        as i32;
                    self.stack.push(if b0 <= 250 {
                        (b0 as i32 - 247) * 256 + b1 + 108
                    } else {
                        -(b0 as i32 - 251) * 256 - b1 - 108
                    });
                    pos += 1;
                }
                255 => {
                    let bytes = code
                        .get(pos..pos + 4)
                        .ok_or_else(|| FontError::malformed(pos, "Truncated charstring fixed"))?;
                    let fixed = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    self.stack.push(fixed >> 16);
                    pos += 4;
                }
                _ => self.stack.clear(),
            }
        }
        Ok(Flow::Return)
    }

    fn call_subr(&mut self, local: bool, usage: &mut SubrUsage, depth: usize) -> Result<()> {
        if depth >= MAX_SUBR_DEPTH {
            return Err(FontError::MalformedFontProgram(
                "Subroutine nesting exceeds 10 levels".to_string(),
            ));
        }

        let kind = if local { "local" } else { "global" };
        let subrs = if local {
            self.local_subrs.ok_or_else(|| {
                FontError::MalformedFontProgram("callsubr without local subroutines".to_string())
            })?
        } else {
            self.global_subrs
        };

        let operand = self.stack.pop().ok_or_else(|| {
            FontError::MalformedFontProgram(format!("{} subroutine call with empty stack", kind))
        })?;
        let index = operand + subrs.subr_bias();
        let body = usize::try_from(index)
            .ok()
            .and_then(|i| subrs.get(i).map(|body| (i, body)));
        let Some((index, body)) = body else {
            return Err(FontError::MalformedFontProgram(format!(
                "{} subroutine {} out of range ({} subroutines)",
                kind,
                index,
                subrs.len()
            )));
        };

        if local {
            usage.local.insert(index);
        } else {
            usage.global.insert(index);
        }

        // endchar inside a subroutine ends the glyph
        if self.run(body, usage, depth + 1)? == Flow::EndChar {
            self.finished = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::cff::index::write_index;

    fn index(objects: &[&[u8]]) -> Vec<u8> {
        write_index(objects.iter().copied())
    }

    #[test]
    fn test_follows_local_and_global_calls() {
        // local subr 0 calls global subr 1; biases are 107
        let gsubrs = index(&[&[11], &[11]]);
        let lsubrs = index(&[&[139 - 106, 29, 11]]);
        let (global, _) = Index::parse(&gsubrs, 0).unwrap();
        let (local, _) = Index::parse(&lsubrs, 0).unwrap();

        let charstring = [139 - 107, 10, 14];
        let mut usage = SubrUsage::default();
        let seac = CharstringScanner::new(&global, Some(&local))
            .scan(&charstring, &mut usage)
            .unwrap();

        assert_eq!(seac, None);
        assert_eq!(usage.local.iter().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(usage.global.iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_hintmask_bytes_are_skipped() {
        let gsubrs = index(&[]);
        let (global, _) = Index::parse(&gsubrs, 0).unwrap();

        // 2 hstems + 8 vstems = 10 stems -> 2 mask bytes; the mask bytes
        // look like callgsubr and must not be read as operators
        let mut charstring = vec![139, 139, 139, 139, 18];
        charstring.extend(std::iter::repeat(139).take(16));
        charstring.extend([23, 19, 29, 29, 14]);

        let mut usage = SubrUsage::default();
        CharstringScanner::new(&global, None)
            .scan(&charstring, &mut usage)
            .unwrap();
        assert!(usage.global.is_empty());
    }

    #[test]
    fn test_endchar_seac() {
        let gsubrs = index(&[]);
        let (global, _) = Index::parse(&gsubrs, 0).unwrap();

        // adx ady bchar achar endchar: 0 0 'A' acute (code 194)
        let mut code = vec![139, 139];
        code.extend([28, 0, 65]);
        code.extend([28, 0, 194]);
        code.push(14);

        let mut usage = SubrUsage::default();
        let seac = CharstringScanner::new(&global, None)
            .scan(&code, &mut usage)
            .unwrap();
        assert_eq!(seac, Some(SeacComponents { base: 65, accent: 194 }));
    }

    #[test]
    fn test_out_of_range_subr_is_malformed() {
        let gsubrs = index(&[&[11]]);
        let (global, _) = Index::parse(&gsubrs, 0).unwrap();

        // -102 + bias 107 = 5, past the single entry
        let charstring = [37, 29, 14];
        let mut usage = SubrUsage::default();
        let err = CharstringScanner::new(&global, None)
            .scan(&charstring, &mut usage)
            .unwrap_err();
        assert!(matches!(err, FontError::MalformedFontProgram(_)));
    }

    #[test]
    fn test_recursion_limit() {
        // global subr 0 calls itself forever
        let gsubrs = index(&[&[139 - 107, 29]]);
        let (global, _) = Index::parse(&gsubrs, 0).unwrap();

        let charstring = [139 - 107, 29];
        let mut usage = SubrUsage::default();
        assert!(CharstringScanner::new(&global, None)
            .scan(&charstring, &mut usage)
            .is_err());
    }
}
