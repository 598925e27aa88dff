//! Embedded font programs: identity, glyph closures and subsetting
//!
//! Two container formats are supported: sfnt programs with TrueType
//! outlines (`FontFile2`) and bare CFF programs (`FontFile3`).

pub(crate) mod binary;
pub mod cff;
pub mod closure;
pub mod digest;
pub mod truetype;

pub use cff::{CffFont, CffSubsetter};
pub use closure::{GlyphClosure, GlyphRenumbering};
pub use digest::FontProgramDigest;
pub use truetype::{CmapPlan, TrueTypeFont, TrueTypeSubsetter};
