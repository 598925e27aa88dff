//! Glyph usage collection
//!
//! Pages are interpreted without rendering: only font selection and glyph
//! painting are observed. The result is a [`UsedCodeSet`] keyed by font
//! program digest, so byte-identical programs referenced under different
//! names share one entry.

mod collector;
mod interpreter;

pub use collector::{collect_usage, UsageCollector};
pub use interpreter::ContentInterpreter;

use crate::document::FontResource;
use crate::fonts::FontProgramDigest;
use std::collections::{BTreeMap, BTreeSet};

/// Receives the events of a drawing-program interpretation, in program order
pub trait GlyphSink {
    /// `Tf` selected a font present in the resource table
    fn font_selected(&mut self, font: &FontResource, size: f32);

    /// A glyph was painted with the active font. `code` is the byte for
    /// simple fonts and the CID for composite fonts.
    fn glyph_painted(&mut self, font: &FontResource, code: u32);
}

/// Codes painted per font program.
///
/// A font that was selected but never painted has an empty entry; a font
/// that was never selected has none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedCodeSet {
    codes: BTreeMap<FontProgramDigest, BTreeSet<u32>>,
}

impl UsedCodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an entry exists for a selected font
    pub fn mark_selected(&mut self, digest: FontProgramDigest) {
        self.codes.entry(digest).or_default();
    }

    pub fn record(&mut self, digest: FontProgramDigest, code: u32) {
        self.codes.entry(digest).or_default().insert(code);
    }

    pub fn codes(&self, digest: &FontProgramDigest) -> Option<&BTreeSet<u32>> {
        self.codes.get(digest)
    }

    pub fn contains(&self, digest: &FontProgramDigest) -> bool {
        self.codes.contains_key(digest)
    }

    /// Number of distinct font programs
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FontProgramDigest, &BTreeSet<u32>)> {
        self.codes.iter()
    }
}
