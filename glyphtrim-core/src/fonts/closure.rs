//! Glyph closures and glyph renumbering

use std::collections::{BTreeSet, HashMap};

/// Set of glyph ids retained by a subsetting pass.
///
/// Always contains glyph 0 and never an id at or beyond the program's
/// glyph count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphClosure {
    glyphs: BTreeSet<u16>,
    num_glyphs: u16,
}

impl GlyphClosure {
    /// Closure holding only the missing glyph
    pub fn new(num_glyphs: u16) -> Self {
        let mut glyphs = BTreeSet::new();
        if num_glyphs > 0 {
            glyphs.insert(0);
        }
        Self { glyphs, num_glyphs }
    }

    /// Build from requested glyphs; out-of-range ids are ignored
    pub fn from_glyphs(num_glyphs: u16, requested: impl IntoIterator<Item = u16>) -> Self {
        let mut closure = Self::new(num_glyphs);
        for gid in requested {
            closure.insert(gid);
        }
        closure
    }

    /// Add a glyph. Returns true when the glyph is new and in range.
    pub fn insert(&mut self, gid: u16) -> bool {
        gid < self.num_glyphs && self.glyphs.insert(gid)
    }

    pub fn contains(&self, gid: u16) -> bool {
        self.glyphs.contains(&gid)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn num_glyphs(&self) -> u16 {
        self.num_glyphs
    }

    /// Glyph ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.glyphs.iter().copied()
    }

    /// Dense, order-preserving old -> new numbering
    pub fn renumbering(&self) -> GlyphRenumbering {
        GlyphRenumbering::new(self.iter().collect())
    }
}

/// Old -> new glyph id table produced by a subset
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlyphRenumbering {
    old_ids: Vec<u16>,
    new_ids: HashMap<u16, u16>,
}

impl GlyphRenumbering {
    /// `old_ids[new] = old`; must be ascending
    pub fn new(old_ids: Vec<u16>) -> Self {
        let new_ids = old_ids
            .iter()
            .enumerate()
            .map(|(new, &old)| (old, new as u16))
            .collect();
        Self { old_ids, new_ids }
    }

    pub fn new_id(&self, old: u16) -> Option<u16> {
        self.new_ids.get(&old).copied()
    }

    pub fn old_id(&self, new: u16) -> Option<u16> {
        self.old_ids.get(new as usize).copied()
    }

    /// Old glyph ids in new-id order
    pub fn old_ids(&self) -> &[u16] {
        &self.old_ids
    }

    pub fn len(&self) -> usize {
        self.old_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old_ids.is_empty()
    }

    /// (old, new) pairs in ascending order
    pub fn pairs(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.old_ids
            .iter()
            .enumerate()
            .map(|(new, &old)| (old, new as u16))
    }
}
