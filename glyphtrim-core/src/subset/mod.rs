//! Document subsetting
//!
//! Collects glyph usage over a whole document, subsets each distinct font
//! program once and patches every font dictionary that embeds it.

mod cache;
mod orchestrator;
mod report;

pub use cache::{CachedOutcome, CachedSubset, SubsetResultCache};
pub use orchestrator::{subset_document, SubsetOrchestrator};
pub use report::{DigestOutcome, RemovedFont, SubsetReport};

use crate::fonts::GlyphRenumbering;

/// Options for a subsetting run
#[derive(Debug, Clone)]
pub struct SubsetOptions {
    /// Remove embedded fonts that are never painted
    pub remove_unused_fonts: bool,
    /// Empty CFF subroutines no retained glyph reaches
    pub prune_subroutines: bool,
    /// sfnt tables copied unchanged in addition to the built-in list
    pub keep_tables: Vec<[u8; 4]>,
    /// Nesting limit for Form XObjects
    pub max_form_depth: usize,
}

impl Default for SubsetOptions {
    fn default() -> Self {
        SubsetOptions {
            remove_unused_fonts: true,
            prune_subroutines: true,
            keep_tables: Vec::new(),
            max_form_depth: 12,
        }
    }
}

/// A subset font program
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetResult {
    /// New program bytes, same container format as the input
    pub data: Vec<u8>,
    /// Old glyph id to new glyph id
    pub gid_map: GlyphRenumbering,
}
