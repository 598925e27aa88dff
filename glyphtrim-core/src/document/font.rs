//! Font resources as seen by the subsetting engine
//!
//! A font resource couples the name-level PDF font dictionary (encoding,
//! CID-to-GID mapping, ToUnicode) with the embedded font program carried by
//! its descriptor. Programs are immutable: subsetting replaces them wholesale.

use crate::error::{FontError, Result};
use crate::fonts::FontProgramDigest;
use crate::parser::CMap;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Container format of an embedded font program
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FontFormat {
    /// sfnt/TrueType outline data (`FontFile2`)
    TrueTypeOutline,
    /// Bare CFF program for a simple font (`FontFile3` / `Type1C`)
    CompactOutlineSimple,
    /// CID-keyed CFF program (`FontFile3` / `CIDFontType0C`)
    CompactOutlineCID,
    /// Anything else (Type 1, OpenType wrappers, ...), never subsetted
    Unknown(String),
}

impl FontFormat {
    /// Map a `FontFile3` stream subtype to a format tag
    pub fn from_font_file3_subtype(subtype: &str) -> Self {
        match subtype {
            "Type1C" => FontFormat::CompactOutlineSimple,
            "CIDFontType0C" => FontFormat::CompactOutlineCID,
            other => FontFormat::Unknown(other.to_string()),
        }
    }

    pub fn is_compact_outline(&self) -> bool {
        matches!(
            self,
            FontFormat::CompactOutlineSimple | FontFormat::CompactOutlineCID
        )
    }
}

/// An embedded font program: raw bytes plus format tag
#[derive(Debug, Clone)]
pub struct FontProgram {
    format: FontFormat,
    data: Vec<u8>,
    digest: OnceLock<FontProgramDigest>,
}

impl PartialEq for FontProgram {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format && self.data == other.data
    }
}

impl FontProgram {
    /// Create a font program from its raw bytes
    pub fn new(format: FontFormat, data: Vec<u8>) -> Self {
        Self {
            format,
            data,
            digest: OnceLock::new(),
        }
    }

    pub fn format(&self) -> &FontFormat {
        &self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Content digest of the program bytes, computed once per instance
    pub fn digest(&self) -> Result<FontProgramDigest> {
        if let Some(digest) = self.digest.get() {
            return Ok(*digest);
        }
        let digest = FontProgramDigest::compute(&self.data)?;
        Ok(*self.digest.get_or_init(|| digest))
    }

    /// Replace the program bytes, keeping the format tag.
    ///
    /// The cached digest is discarded with the old bytes.
    pub fn replace_data(&mut self, data: Vec<u8>) {
        *self = FontProgram::new(self.format.clone(), data);
    }
}

/// Font descriptor: holds at most one live embedded program
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontDescriptor {
    /// `FontFile2` (TrueType outlines)
    pub font_file2: Option<FontProgram>,
    /// `FontFile3` (compact outlines)
    pub font_file3: Option<FontProgram>,
}

impl FontDescriptor {
    /// Descriptor for a TrueType program
    pub fn truetype(data: Vec<u8>) -> Self {
        Self {
            font_file2: Some(FontProgram::new(FontFormat::TrueTypeOutline, data)),
            font_file3: None,
        }
    }

    /// Descriptor for a compact outline program
    pub fn compact(format: FontFormat, data: Vec<u8>) -> Self {
        Self {
            font_file2: None,
            font_file3: Some(FontProgram::new(format, data)),
        }
    }

    /// The embedded program, outline-table data first
    pub fn program(&self) -> Option<&FontProgram> {
        self.font_file2
            .as_ref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.font_file3.as_ref().filter(|p| !p.is_empty()))
    }

    pub fn program_mut(&mut self) -> Option<&mut FontProgram> {
        if self.font_file2.as_ref().is_some_and(|p| !p.is_empty()) {
            return self.font_file2.as_mut();
        }
        self.font_file3.as_mut().filter(|p| !p.is_empty())
    }
}

/// Encoding of a simple font
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleEncoding {
    /// `Differences` array flattened to code -> glyph name
    pub differences: BTreeMap<u32, String>,
}

impl SimpleEncoding {
    pub fn glyph_name(&self, code: u32) -> Option<&str> {
        self.differences.get(&code).map(String::as_str)
    }
}

/// CID to glyph id mapping of a CIDFontType2 font
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CidToGidMap {
    #[default]
    Identity,
    /// `CIDToGIDMap` stream: index is the CID
    Table(Vec<u16>),
}

impl CidToGidMap {
    pub fn glyph_id(&self, cid: u32) -> Option<u16> {
        match self {
            CidToGidMap::Identity => u16::try_from(cid).ok(),
            CidToGidMap::Table(table) => table.get(cid as usize).copied(),
        }
    }

    /// Serialize as a `CIDToGIDMap` stream body (big-endian u16 per CID)
    pub fn to_stream_bytes(&self) -> Option<Vec<u8>> {
        match self {
            CidToGidMap::Identity => None,
            CidToGidMap::Table(table) => {
                Some(table.iter().flat_map(|gid| gid.to_be_bytes()).collect())
            }
        }
    }

    /// Parse a `CIDToGIDMap` stream body
    pub fn from_stream_bytes(bytes: &[u8]) -> Self {
        CidToGidMap::Table(
            bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect(),
        )
    }
}

/// Simple or composite font
#[derive(Debug, Clone)]
pub enum FontKind {
    /// Type1 / TrueType / MMType1: one byte per code
    Simple { encoding: SimpleEncoding },
    /// Type0 with a single descendant CIDFont
    Composite {
        encoding: CMap,
        cid_to_gid: CidToGidMap,
    },
}

/// A font dictionary referenced from a resource table
#[derive(Debug, Clone)]
pub struct FontResource {
    pub base_font: String,
    pub kind: FontKind,
    pub descriptor: FontDescriptor,
    pub to_unicode: Option<CMap>,
}

impl FontResource {
    /// Simple font with the given descriptor
    pub fn simple(base_font: impl Into<String>, descriptor: FontDescriptor) -> Self {
        Self {
            base_font: base_font.into(),
            kind: FontKind::Simple {
                encoding: SimpleEncoding::default(),
            },
            descriptor,
            to_unicode: None,
        }
    }

    /// Type0 font with an Identity-H encoding
    pub fn composite(base_font: impl Into<String>, descriptor: FontDescriptor) -> Self {
        Self {
            base_font: base_font.into(),
            kind: FontKind::Composite {
                encoding: CMap::identity_h(),
                cid_to_gid: CidToGidMap::Identity,
            },
            descriptor,
            to_unicode: None,
        }
    }

    /// Non-embedded standard font
    pub fn standard(base_font: impl Into<String>) -> Self {
        Self::simple(base_font, FontDescriptor::default())
    }

    pub fn with_to_unicode(mut self, cmap: CMap) -> Self {
        self.to_unicode = Some(cmap);
        self
    }

    pub fn with_encoding(mut self, encoding: SimpleEncoding) -> Self {
        if let FontKind::Simple { encoding: slot } = &mut self.kind {
            *slot = encoding;
        }
        self
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, FontKind::Composite { .. })
    }

    pub fn program(&self) -> Option<&FontProgram> {
        self.descriptor.program()
    }

    /// Digest of the embedded program.
    ///
    /// Fails with `DigestComputationFailure` for non-embedded fonts.
    pub fn digest(&self) -> Result<FontProgramDigest> {
        self.program()
            .ok_or_else(|| {
                FontError::DigestComputationFailure(format!(
                    "{} has no embedded font program",
                    self.base_font
                ))
            })?
            .digest()
    }

    /// Split a shown string into usage codes: bytes for simple fonts, CIDs
    /// for composite fonts
    pub fn decode_codes(&self, bytes: &[u8]) -> Vec<u32> {
        match &self.kind {
            FontKind::Simple { .. } => bytes.iter().map(|&b| b as u32).collect(),
            FontKind::Composite { encoding, .. } => {
                let mut codes = Vec::new();
                let mut rest = bytes;
                while !rest.is_empty() {
                    let (code, len) = encoding.next_code(rest);
                    if len == 0 {
                        break;
                    }
                    // Unmapped codes select CID 0
                    codes.push(encoding.code_to_cid(code, len).unwrap_or(0));
                    rest = &rest[len..];
                }
                codes
            }
        }
    }

    /// Unicode text of a simple-font code from the ToUnicode map
    pub fn unicode_of(&self, code: u32) -> Option<String> {
        self.to_unicode.as_ref()?.lookup_unicode(code)
    }
}
