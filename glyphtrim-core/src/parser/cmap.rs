//! CMap and ToUnicode support
//!
//! Implements the subset of ISO 32000-1:2008 Section 9.7.5 (CMaps) and
//! Section 9.10.3 (ToUnicode CMaps) needed to split composite-font strings
//! into character codes, map those codes to CIDs and recover the Unicode
//! values a subset `cmap` table is rebuilt from.

use super::content::{ContentTokenizer, Token};
use super::{ParseError, ParseResult};
use std::collections::HashMap;

/// Largest range expanded when enumerating ToUnicode entries
const MAX_RANGE_EXPANSION: u32 = 0x1_0000;

/// CMap type enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum CMapType {
    /// Maps character codes to CIDs (Character IDs)
    CIDMap,
    /// Maps character codes to Unicode values
    ToUnicode,
    /// Predefined CMap (e.g., Identity-H, Identity-V)
    Predefined(String),
}

/// Character code range from a `begincodespacerange` block
#[derive(Debug, Clone, PartialEq)]
pub struct CodeRange {
    /// Start of the code range
    pub start: Vec<u8>,
    /// End of the code range
    pub end: Vec<u8>,
}

impl CodeRange {
    /// Check if a code is within this range.
    ///
    /// Codespace ranges are multi-dimensional: every byte is compared with
    /// the bounds at the same position.
    pub fn contains(&self, code: &[u8]) -> bool {
        if code.len() != self.start.len() || code.len() != self.end.len() {
            return false;
        }

        code.iter()
            .zip(self.start.iter().zip(&self.end))
            .all(|(b, (lo, hi))| b >= lo && b <= hi)
    }

    pub fn len(&self) -> usize {
        self.start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty()
    }
}

/// A `cidrange` entry
#[derive(Debug, Clone, PartialEq)]
struct CidRange {
    len: u8,
    start: u32,
    end: u32,
    cid: u32,
}

/// Destination of a `bfrange` entry
#[derive(Debug, Clone, PartialEq)]
enum BfDestination {
    /// UTF-16BE units; the last unit is incremented across the range
    Base(Vec<u16>),
    /// One string per code in the range
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
struct BfRange {
    len: u8,
    start: u32,
    end: u32,
    dst: BfDestination,
}

/// CMap structure for character code mappings
#[derive(Debug, Clone)]
pub struct CMap {
    /// CMap name
    pub name: Option<String>,
    /// CMap type
    pub cmap_type: CMapType,
    /// Writing mode (0 = horizontal, 1 = vertical)
    pub wmode: u8,
    /// Code space ranges
    pub codespace_ranges: Vec<CodeRange>,
    cid_singles: HashMap<(u8, u32), u32>,
    cid_ranges: Vec<CidRange>,
    unicode_singles: HashMap<(u8, u32), String>,
    unicode_ranges: Vec<BfRange>,
    /// Set when the CMap `usecmap`s a predefined Identity map
    identity_fallback: bool,
}

impl Default for CMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CMap {
    /// Create a new empty CMap
    pub fn new() -> Self {
        Self {
            name: None,
            cmap_type: CMapType::ToUnicode,
            wmode: 0,
            codespace_ranges: Vec::new(),
            cid_singles: HashMap::new(),
            cid_ranges: Vec::new(),
            unicode_singles: HashMap::new(),
            unicode_ranges: Vec::new(),
            identity_fallback: false,
        }
    }

    fn predefined_identity(name: &str, wmode: u8) -> Self {
        Self {
            name: Some(name.to_string()),
            cmap_type: CMapType::Predefined(name.to_string()),
            wmode,
            codespace_ranges: vec![CodeRange {
                start: vec![0x00, 0x00],
                end: vec![0xFF, 0xFF],
            }],
            ..Self::new()
        }
    }

    /// Create a predefined Identity-H CMap
    pub fn identity_h() -> Self {
        Self::predefined_identity("Identity-H", 0)
    }

    /// Create a predefined Identity-V CMap
    pub fn identity_v() -> Self {
        Self::predefined_identity("Identity-V", 1)
    }

    /// Look up a predefined CMap by name. Only the Identity maps are built in.
    pub fn predefined(name: &str) -> Option<Self> {
        match name {
            "Identity-H" => Some(Self::identity_h()),
            "Identity-V" => Some(Self::identity_v()),
            _ => None,
        }
    }

    /// Whether codes map to CIDs unchanged
    pub fn is_identity(&self) -> bool {
        matches!(&self.cmap_type, CMapType::Predefined(name) if name.starts_with("Identity"))
            || self.identity_fallback
    }

    /// Parse an embedded CMap or ToUnicode CMap stream
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        let mut cmap = Self::new();
        let mut tokenizer = ContentTokenizer::new(data);
        let mut stack: Vec<Value> = Vec::new();
        let mut arrays: Vec<Vec<Value>> = Vec::new();

        while let Some(token) = tokenizer.next_token()? {
            let value = match token {
                Token::ArrayStart => {
                    arrays.push(Vec::new());
                    continue;
                }
                Token::ArrayEnd => {
                    let array = arrays.pop().ok_or_else(|| ParseError::SyntaxError {
                        position: tokenizer.position(),
                        message: "Unbalanced ']' in CMap".to_string(),
                    })?;
                    Value::Array(array)
                }
                Token::Integer(i) => Value::Int(i as i64),
                Token::Number(n) => Value::Int(n as i64),
                Token::String(s) | Token::HexString(s) => Value::Bytes(s),
                Token::Name(n) => Value::Name(n),
                Token::DictStart | Token::DictEnd | Token::Invalid => continue,
                Token::Operator(op) => {
                    cmap.apply_operator(&op, &mut stack);
                    continue;
                }
            };

            match arrays.last_mut() {
                Some(array) => array.push(value),
                None => stack.push(value),
            }
        }

        let has_cids = !cmap.cid_singles.is_empty() || !cmap.cid_ranges.is_empty();
        let has_unicode = !cmap.unicode_singles.is_empty() || !cmap.unicode_ranges.is_empty();
        if has_cids && !has_unicode {
            cmap.cmap_type = CMapType::CIDMap;
        }

        Ok(cmap)
    }

    fn apply_operator(&mut self, op: &str, stack: &mut Vec<Value>) {
        match op {
            "def" => {
                if let [.., Value::Name(key), value] = stack.as_slice() {
                    match (key.as_str(), value) {
                        ("CMapName", Value::Name(name)) => self.name = Some(name.clone()),
                        ("WMode", Value::Int(mode)) => self.wmode = (*mode).clamp(0, 1) as u8,
                        _ => {}
                    }
                }
            }
            "usecmap" => {
                if let Some(Value::Name(parent)) = stack.last() {
                    if let Some(parent) = Self::predefined(parent) {
                        self.identity_fallback = true;
                        if self.codespace_ranges.is_empty() {
                            self.codespace_ranges = parent.codespace_ranges;
                        }
                    }
                }
            }
            "endcodespacerange" => {
                for pair in stack.chunks_exact(2) {
                    if let [Value::Bytes(start), Value::Bytes(end)] = pair {
                        if start.len() == end.len() && !start.is_empty() {
                            self.codespace_ranges.push(CodeRange {
                                start: start.clone(),
                                end: end.clone(),
                            });
                        }
                    }
                }
            }
            "endcidchar" => {
                for pair in stack.chunks_exact(2) {
                    if let [Value::Bytes(src), Value::Int(cid)] = pair {
                        if let (Some((len, code)), Ok(cid)) = (code_value(src), u32::try_from(*cid)) {
                            self.cid_singles.insert((len, code), cid);
                        }
                    }
                }
            }
            "endcidrange" => {
                for triple in stack.chunks_exact(3) {
                    if let [Value::Bytes(lo), Value::Bytes(hi), Value::Int(cid)] = triple {
                        if let (Some((len, start)), Some((_, end)), Ok(cid)) =
                            (code_value(lo), code_value(hi), u32::try_from(*cid))
                        {
                            self.cid_ranges.push(CidRange {
                                len,
                                start,
                                end,
                                cid,
                            });
                        }
                    }
                }
            }
            "endbfchar" => {
                for pair in stack.chunks_exact(2) {
                    if let [Value::Bytes(src), dst] = pair {
                        let text = match dst {
                            Value::Bytes(bytes) => utf16_be_to_string(bytes),
                            Value::Name(name) => Some(name.clone()),
                            _ => None,
                        };
                        if let (Some((len, code)), Some(text)) = (code_value(src), text) {
                            self.unicode_singles.insert((len, code), text);
                        }
                    }
                }
            }
            "endbfrange" => {
                for triple in stack.chunks_exact(3) {
                    if let [Value::Bytes(lo), Value::Bytes(hi), dst] = triple {
                        let dst = match dst {
                            Value::Bytes(bytes) => Some(BfDestination::Base(utf16_units(bytes))),
                            Value::Array(items) => Some(BfDestination::List(
                                items
                                    .iter()
                                    .map(|item| match item {
                                        Value::Bytes(b) => utf16_be_to_string(b).unwrap_or_default(),
                                        _ => String::new(),
                                    })
                                    .collect(),
                            )),
                            _ => None,
                        };
                        if let (Some((len, start)), Some((_, end)), Some(dst)) =
                            (code_value(lo), code_value(hi), dst)
                        {
                            self.unicode_ranges.push(BfRange {
                                len,
                                start,
                                end,
                                dst,
                            });
                        }
                    }
                }
            }
            _ => {}
        }

        // Every operator consumes its operands; block begin markers included
        stack.clear();
    }

    /// Read the next character code from a string.
    ///
    /// Returns the code value and the number of bytes it occupies. Bytes
    /// that match no codespace range consume the shortest codespace length,
    /// as viewers do.
    pub fn next_code(&self, bytes: &[u8]) -> (u32, usize) {
        if bytes.is_empty() {
            return (0, 0);
        }

        for len in 1..=4.min(bytes.len()) {
            let candidate = &bytes[..len];
            if self.codespace_ranges.iter().any(|r| r.contains(candidate)) {
                return (be_value(candidate), len);
            }
        }

        let fallback = self
            .codespace_ranges
            .iter()
            .map(CodeRange::len)
            .min()
            .unwrap_or(1)
            .clamp(1, bytes.len());
        (be_value(&bytes[..fallback]), fallback)
    }

    /// Map a character code of `len` bytes to a CID
    pub fn code_to_cid(&self, code: u32, len: usize) -> Option<u32> {
        let key = (len as u8, code);
        if let Some(&cid) = self.cid_singles.get(&key) {
            return Some(cid);
        }

        let ranged = self
            .cid_ranges
            .iter()
            .find(|r| r.len as usize == len && code >= r.start && code <= r.end)
            .and_then(|r| r.cid.checked_add(code - r.start));

        ranged.or_else(|| self.is_identity().then_some(code))
    }

    /// Map a character code of `len` bytes to its Unicode text
    pub fn to_unicode(&self, code: u32, len: usize) -> Option<String> {
        if let Some(text) = self.unicode_singles.get(&(len as u8, code)) {
            return Some(text.clone());
        }

        self.unicode_ranges
            .iter()
            .find(|r| r.len as usize == len && code >= r.start && code <= r.end)
            .and_then(|r| range_text(r, code - r.start))
    }

    /// Map a one- or two-byte code, whichever the CMap defines
    pub fn lookup_unicode(&self, code: u32) -> Option<String> {
        let preferred = if code > 0xFF { 2 } else { 1 };
        self.to_unicode(code, preferred)
            .or_else(|| self.to_unicode(code, 2))
            .or_else(|| self.to_unicode(code, 1))
    }

    /// All (code, text) pairs of a ToUnicode CMap, ranges expanded
    pub fn unicode_entries(&self) -> Vec<(u32, String)> {
        let mut entries: Vec<(u32, String)> = self
            .unicode_singles
            .iter()
            .map(|(&(_, code), text)| (code, text.clone()))
            .collect();

        for range in &self.unicode_ranges {
            let span = range.end.saturating_sub(range.start).min(MAX_RANGE_EXPANSION);
            for offset in 0..=span {
                if let Some(text) = range_text(range, offset) {
                    entries.push((range.start + offset, text));
                }
            }
        }

        entries.sort();
        entries.dedup_by_key(|(code, _)| *code);
        entries
    }
}

/// Operand values collected while reading a CMap
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    Name(String),
    Array(Vec<Value>),
}

fn be_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn code_value(bytes: &[u8]) -> Option<(u8, u32)> {
    if bytes.is_empty() || bytes.len() > 4 {
        return None;
    }
    Some((bytes.len() as u8, be_value(bytes)))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|chunk| match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => *single as u16,
            _ => 0,
        })
        .collect()
}

fn utf16_be_to_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return String::from_utf8(bytes.to_vec()).ok();
    }
    String::from_utf16(&utf16_units(bytes)).ok()
}

fn range_text(range: &BfRange, offset: u32) -> Option<String> {
    match &range.dst {
        BfDestination::Base(units) => {
            let mut units = units.clone();
            let last = units.last_mut()?;
            *last = last.checked_add(u16::try_from(offset).ok()?)?;
            String::from_utf16(&units).ok()
        }
        BfDestination::List(items) => items.get(offset as usize).cloned(),
    }
}

/// Convert string to UTF-16BE bytes
pub fn string_to_utf16_be_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_range_is_per_byte() {
        let range = CodeRange {
            start: vec![0x81, 0x40],
            end: vec![0x9F, 0xFC],
        };

        assert!(range.contains(&[0x81, 0x40]));
        assert!(range.contains(&[0x90, 0xA0]));
        assert!(!range.contains(&[0x90, 0x20])); // second byte out of bounds
        assert!(!range.contains(&[0x81])); // Wrong length
    }

    #[test]
    fn test_identity_cmap() {
        let cmap = CMap::identity_h();
        assert_eq!(cmap.name, Some("Identity-H".to_string()));
        assert_eq!(cmap.wmode, 0);
        assert!(cmap.is_identity());

        assert_eq!(cmap.next_code(&[0x00, 0x41, 0x00]), (0x41, 2));
        assert_eq!(cmap.code_to_cid(0x41, 2), Some(0x41));
        assert_eq!(CMap::identity_v().wmode, 1);
    }

    #[test]
    fn test_next_code_mixed_lengths() {
        let data = b"
            2 begincodespacerange
            <00> <80>
            <8140> <9FFC>
            endcodespacerange";
        let cmap = CMap::parse(data).unwrap();

        assert_eq!(cmap.next_code(&[0x41, 0x81, 0x40]), (0x41, 1));
        assert_eq!(cmap.next_code(&[0x81, 0x40]), (0x8140, 2));
        // Unmatched bytes fall back to the shortest codespace
        assert_eq!(cmap.next_code(&[0xFF, 0x00]), (0xFF, 1));
    }

    #[test]
    fn test_cid_mappings() {
        let data = b"/CIDInit /ProcSet findresource begin
            12 dict begin
            begincmap
            /CMapName /Custom-H def
            1 begincodespacerange <0000> <FFFF> endcodespacerange
            1 begincidchar <0010> 500 endcidchar
            1 begincidrange <0020> <002F> 100 endcidrange
            endcmap";
        let cmap = CMap::parse(data).unwrap();

        assert_eq!(cmap.name.as_deref(), Some("Custom-H"));
        assert_eq!(cmap.cmap_type, CMapType::CIDMap);
        assert!(!cmap.is_identity());
        assert_eq!(cmap.code_to_cid(0x10, 2), Some(500));
        assert_eq!(cmap.code_to_cid(0x25, 2), Some(105));
        assert_eq!(cmap.code_to_cid(0x30, 2), None);
    }

    #[test]
    fn test_out_of_range_cids_are_dropped() {
        let data = b"1 begincodespacerange <00> <FF> endcodespacerange
            1 begincidrange <00> <FF> -1 endcidrange
            1 begincidchar <41> -7 endcidchar
            1 begincidrange <10> <1F> 4294967295 endcidrange";
        let cmap = CMap::parse(data).unwrap();

        assert_eq!(cmap.code_to_cid(1, 1), None);
        assert_eq!(cmap.code_to_cid(0x41, 1), None);
        assert_eq!(cmap.code_to_cid(0x1F, 1), None);
    }

    #[test]
    fn test_usecmap_identity_fallback() {
        let data = b"/Identity-H usecmap 1 begincidchar <0001> 77 endcidchar";
        let cmap = CMap::parse(data).unwrap();

        assert_eq!(cmap.code_to_cid(1, 2), Some(77));
        assert_eq!(cmap.code_to_cid(2, 2), Some(2));
        assert_eq!(cmap.next_code(&[0x00, 0x02]), (2, 2));
    }

    #[test]
    fn test_simple_tounicode_parsing() {
        let cmap_data = br#"
/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo
<< /Registry (Adobe)
   /Ordering (UCS)
   /Supplement 0
>> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<00> <FF>
endcodespacerange
2 beginbfchar
<20> <0020>
<41> <0041>
endbfchar
2 beginbfrange
<61> <63> <0061>
<70> <71> [<00660069> <4E2D>]
endbfrange
endcmap
"#;

        let cmap = CMap::parse(cmap_data).unwrap();
        assert_eq!(cmap.name.as_deref(), Some("Adobe-Identity-UCS"));
        assert_eq!(cmap.cmap_type, CMapType::ToUnicode);
        assert_eq!(cmap.codespace_ranges.len(), 1);
        assert_eq!(cmap.to_unicode(0x41, 1), Some("A".to_string()));
        assert_eq!(cmap.to_unicode(0x62, 1), Some("b".to_string()));
        assert_eq!(cmap.to_unicode(0x70, 1), Some("fi".to_string()));
        assert_eq!(cmap.to_unicode(0x71, 1), Some("中".to_string()));
        assert_eq!(cmap.to_unicode(0x64, 1), None);
        assert_eq!(cmap.lookup_unicode(0x20), Some(" ".to_string()));

        let entries = cmap.unicode_entries();
        let codes: Vec<u32> = entries.iter().map(|(c, _)| *c).collect();
        assert_eq!(codes, vec![0x20, 0x41, 0x61, 0x62, 0x63, 0x70, 0x71]);
    }

    #[test]
    fn test_supplementary_plane_unicode() {
        let data = b"1 beginbfchar <0003> <D83DDE00> endbfchar";
        let cmap = CMap::parse(data).unwrap();
        assert_eq!(cmap.to_unicode(3, 2), Some("\u{1F600}".to_string()));
    }

    #[test]
    fn test_utf16_helper() {
        assert_eq!(string_to_utf16_be_bytes("A"), vec![0x00, 0x41]);
        assert_eq!(string_to_utf16_be_bytes("中"), vec![0x4E, 0x2D]);
    }
}
