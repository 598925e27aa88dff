//! # glyphtrim
//!
//! Shrinks PDF documents by subsetting their embedded font programs down to
//! the glyphs that are actually painted.
//!
//! ## Features
//!
//! - **Usage Collection**: Interprets page, Form XObject and annotation appearance content streams
//! - **Deduplication**: Identical font programs are keyed by SHA-256 and subset once
//! - **TrueType**: Glyph closure over composites, rebuilt `glyf`/`loca`/`hmtx`/`cmap`/`post`
//! - **CFF**: Charstring scanning, subroutine pruning, CID-keyed FDSelect/FDArray rewriting
//! - **Unused Fonts**: Embedded fonts that are never painted are removed
//! - **Fault Isolation**: A font that fails to subset keeps its original bytes
//!
//! ## Quick Start
//!
//! ```rust
//! use glyphtrim::{subset_document, Document, FontResource, Page, Resources, SubsetOptions};
//! use glyphtrim::document::FontDescriptor;
//! use glyphtrim::test_fonts::TrueTypeBuilder;
//!
//! let program = TrueTypeBuilder::latin(30).build();
//! let font = FontResource::simple("Sans", FontDescriptor::truetype(program));
//!
//! let mut document = Document::new();
//! document.add_page(Page::new(
//!     b"BT /F1 12 Tf (CAB) Tj ET".to_vec(),
//!     Resources::new().with_font("F1", font),
//! ));
//!
//! let report = subset_document(&mut document, &SubsetOptions::default());
//! assert_eq!(report.subsetted_count(), 1);
//! assert!(report.bytes_after < report.bytes_before);
//! ```

pub mod document;
pub mod error;
pub mod fonts;
pub mod parser;
pub mod subset;
pub mod usage;

#[doc(hidden)]
pub mod test_fonts;

// Re-export document model
pub use document::{Document, FontResource, Page, Resources};
pub use error::{FontError, Result};

// Re-export subsetting
pub use fonts::FontProgramDigest;
pub use subset::{subset_document, SubsetOptions, SubsetOrchestrator, SubsetReport};
pub use usage::{collect_usage, GlyphSink, UsedCodeSet};

/// Current version of glyphtrim
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_subsets_to_nothing() {
        let mut document = Document::new();
        let report = subset_document(&mut document, &SubsetOptions::default());
        assert!(report.outcomes.is_empty());
        assert_eq!(report.bytes_saved(), 0);
    }

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
    }
}
