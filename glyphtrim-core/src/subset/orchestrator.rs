//! Collection, per-digest subsetting and patching of a whole document

use super::report::{DigestOutcome, RemovedFont, SubsetReport};
use super::{CachedSubset, SubsetOptions, SubsetResult, SubsetResultCache};
use crate::document::{
    CidToGidMap, Document, FontFormat, FontKind, FontProgram, FontResource, Resources, XObject,
};
use crate::error::{FontError, Result};
use crate::fonts::{CffSubsetter, CmapPlan, FontProgramDigest, GlyphRenumbering, TrueTypeFont, TrueTypeSubsetter};
use crate::parser::CMap;
use crate::usage::{collect_usage, UsedCodeSet};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Subsets every embedded font program of a document.
///
/// Usage is collected over all pages first. Each distinct program is then
/// subset once, and the result is written into every font dictionary that
/// embeds the same bytes. A program that fails to subset keeps its
/// original bytes everywhere.
#[derive(Debug, Clone, Default)]
pub struct SubsetOrchestrator {
    options: SubsetOptions,
    cache: SubsetResultCache,
}

impl SubsetOrchestrator {
    pub fn new(options: SubsetOptions) -> Self {
        Self {
            options,
            cache: SubsetResultCache::new(),
        }
    }

    /// Share a result cache with other runs or threads
    pub fn with_cache(mut self, cache: SubsetResultCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn options(&self) -> &SubsetOptions {
        &self.options
    }

    pub fn cache(&self) -> &SubsetResultCache {
        &self.cache
    }

    pub fn run(&self, document: &mut Document) -> SubsetReport {
        let mut report = SubsetReport::new(document.byte_size());
        let used = collect_usage(document, self.options.max_form_depth);
        debug!("Collected usage for {} font programs", used.len());

        for (index, page) in document.pages.iter_mut().enumerate() {
            self.patch_resources(&mut page.resources, index, 0, &used, &mut report);
            for appearance in page.annotations.iter_mut().filter_map(|a| a.appearance.as_mut()) {
                self.patch_resources(&mut appearance.resources, index, 0, &used, &mut report);
            }
        }

        report.bytes_after = document.byte_size();
        info!(
            "Font subsetting: {} programs subset, {} failed, {} fonts removed, {} -> {} bytes",
            report.subsetted_count(),
            report.failures().count(),
            report.removed.len(),
            report.bytes_before,
            report.bytes_after
        );
        report
    }

    /// Patch or remove the fonts of one resource table.
    ///
    /// Form XObjects are followed only as deep as usage collection went;
    /// deeper tables are left untouched.
    fn patch_resources(
        &self,
        resources: &mut Resources,
        page: usize,
        depth: usize,
        used: &UsedCodeSet,
        report: &mut SubsetReport,
    ) {
        let names: Vec<String> = resources.fonts.keys().cloned().collect();
        for name in names {
            let digest = match resources.fonts.get(&name).map(FontResource::digest) {
                Some(Ok(digest)) => digest,
                Some(Err(err)) => {
                    debug!("Leaving /{} untouched: {}", name, err);
                    continue;
                }
                None => continue,
            };

            match used.codes(&digest) {
                Some(codes) if !codes.is_empty() => {
                    if let Some(font) = resources.fonts.get_mut(&name) {
                        self.patch_font(font, digest, codes, report);
                    }
                }
                _ if self.options.remove_unused_fonts => {
                    if let Some(font) = resources.fonts.remove(&name) {
                        let bytes = font.program().map_or(0, FontProgram::len);
                        info!("Removing unused font /{} ({}, {} bytes)", name, font.base_font, bytes);
                        report.removed.push(RemovedFont {
                            page,
                            resource: name,
                            base_font: font.base_font,
                            bytes,
                        });
                    }
                }
                _ => {}
            }
        }

        if depth + 1 > self.options.max_form_depth {
            return;
        }
        for xobject in resources.xobjects.values_mut() {
            if let XObject::Form(form) = xobject {
                self.patch_resources(&mut form.resources, page, depth + 1, used, report);
            }
        }
    }

    fn patch_font(
        &self,
        font: &mut FontResource,
        digest: FontProgramDigest,
        codes: &BTreeSet<u32>,
        report: &mut SubsetReport,
    ) {
        let outcome = self.cache.get_or_insert_with(digest, codes, || {
            debug!("Subsetting {} ({} codes)", digest.short(), codes.len());
            self.subset_program(font, codes)
                .map(|(result, unresolved_codes)| CachedSubset { result, unresolved_codes })
        });

        let Some(program) = font.program() else {
            return;
        };
        let format = program.format().clone();
        let bytes_before = program.len();

        match &*outcome {
            Ok(CachedSubset { result, unresolved_codes }) => {
                if !report.outcomes.contains_key(&digest) {
                    report.unresolved_codes += unresolved_codes;
                    info!(
                        "Subset {} ({}): {} -> {} bytes, {} glyphs",
                        font.base_font,
                        digest.short(),
                        bytes_before,
                        result.data.len(),
                        result.gid_map.len()
                    );
                    report.outcomes.insert(
                        digest,
                        DigestOutcome::Subsetted {
                            format: format!("{:?}", format),
                            bytes_before,
                            bytes_after: result.data.len(),
                            glyphs: result.gid_map.len(),
                        },
                    );
                }

                if format == FontFormat::TrueTypeOutline {
                    if let FontKind::Composite { cid_to_gid, .. } = &mut font.kind {
                        *cid_to_gid = renumbered_cid_map(cid_to_gid, codes, &result.gid_map);
                    }
                }
                if let Some(program) = font.descriptor.program_mut() {
                    program.replace_data(result.data.clone());
                }
            }
            Err(err) => {
                if !report.outcomes.contains_key(&digest) {
                    warn!(
                        "Keeping original program of {} ({}): {}",
                        font.base_font,
                        digest.short(),
                        err
                    );
                    report.outcomes.insert(digest, DigestOutcome::failed(err));
                }
            }
        }
    }

    /// Subset a font's program; also returns the number of unresolved codes
    fn subset_program(&self, font: &FontResource, codes: &BTreeSet<u32>) -> Result<(SubsetResult, usize)> {
        let program = font.program().ok_or_else(|| {
            FontError::DigestComputationFailure(format!("{} has no embedded program", font.base_font))
        })?;

        let (result, unresolved) = match program.format() {
            FontFormat::TrueTypeOutline => self.subset_truetype(font, program.data(), codes)?,
            FontFormat::CompactOutlineSimple | FontFormat::CompactOutlineCID => {
                self.subset_compact(font, program.data(), codes)?
            }
            FontFormat::Unknown(subtype) => {
                return Err(FontError::UnsupportedFormat(format!(
                    "embedded font program subtype {}",
                    subtype
                )))
            }
        };

        if unresolved > 0 {
            debug!("{} painted codes of {} map to no glyph", unresolved, font.base_font);
        }
        Ok((result, unresolved))
    }

    fn subset_truetype(
        &self,
        font: &FontResource,
        data: &[u8],
        codes: &BTreeSet<u32>,
    ) -> Result<(SubsetResult, usize)> {
        let subsetter = TrueTypeSubsetter::new(data)?.with_keep_tables(&self.options.keep_tables);
        let num_glyphs = subsetter.font().num_glyphs;
        let mut glyphs = BTreeSet::new();
        let mut unresolved = 0;

        let plan = match &font.kind {
            FontKind::Simple { .. } => {
                let subtables = subsetter.font().parse_cmap()?;
                for &code in codes {
                    let unicode = font.unicode_of(code).and_then(|text| single_char(&text));
                    match TrueTypeFont::simple_glyph_id(&subtables, code, unicode) {
                        Some(gid) => {
                            glyphs.insert(gid);
                        }
                        None => unresolved += 1,
                    }
                }
                CmapPlan::RemapExisting
            }
            FontKind::Composite {
                encoding,
                cid_to_gid,
            } => {
                for &cid in codes {
                    match cid_to_gid.glyph_id(cid).filter(|&gid| gid < num_glyphs) {
                        Some(gid) => {
                            glyphs.insert(gid);
                        }
                        None => unresolved += 1,
                    }
                }
                match &font.to_unicode {
                    Some(to_unicode) => {
                        CmapPlan::Unicode(unicode_cmap_entries(to_unicode, encoding, cid_to_gid))
                    }
                    None => CmapPlan::RemapExisting,
                }
            }
        };

        Ok((subsetter.subset(glyphs, &plan)?, unresolved))
    }

    fn subset_compact(
        &self,
        font: &FontResource,
        data: &[u8],
        codes: &BTreeSet<u32>,
    ) -> Result<(SubsetResult, usize)> {
        let subsetter = CffSubsetter::new(data)?.with_subroutine_pruning(self.options.prune_subroutines);
        let mut glyphs = BTreeSet::new();
        let mut unresolved = 0;

        for &code in codes {
            let gid = match &font.kind {
                FontKind::Simple { encoding } => {
                    subsetter.glyph_for_code(code, encoding.glyph_name(code))?
                }
                FontKind::Composite { .. } => {
                    // CIDFontType0 addresses glyphs by CID; renumbering a
                    // name-keyed program would break that
                    if !subsetter.font().is_cid_keyed() {
                        return Err(FontError::UnsupportedFormat(
                            "name-keyed CFF program in a composite font".to_string(),
                        ));
                    }
                    subsetter.glyph_for_cid(code)
                }
            };
            match gid {
                Some(gid) => {
                    glyphs.insert(gid);
                }
                None => unresolved += 1,
            }
        }

        Ok((subsetter.subset(glyphs)?, unresolved))
    }
}

/// Subset a document with a fresh cache
pub fn subset_document(document: &mut Document, options: &SubsetOptions) -> SubsetReport {
    SubsetOrchestrator::new(options.clone()).run(document)
}

fn single_char(text: &str) -> Option<char> {
    let mut chars = text.chars();
    let ch = chars.next()?;
    chars.next().is_none().then_some(ch)
}

/// (code point, original glyph id) pairs from a composite font's ToUnicode map
fn unicode_cmap_entries(to_unicode: &CMap, encoding: &CMap, cid_to_gid: &CidToGidMap) -> Vec<(u32, u16)> {
    to_unicode
        .unicode_entries()
        .into_iter()
        .filter_map(|(code, text)| {
            let ch = single_char(&text)?;
            let cid = encoding
                .code_to_cid(code, 2)
                .or_else(|| encoding.code_to_cid(code, 1))?;
            Some((ch as u32, cid_to_gid.glyph_id(cid)?))
        })
        .collect()
}

/// Explicit CID to new glyph id table for the painted CIDs
fn renumbered_cid_map(
    original: &CidToGidMap,
    cids: &BTreeSet<u32>,
    gid_map: &GlyphRenumbering,
) -> CidToGidMap {
    let cids: Vec<u32> = cids.iter().copied().filter(|&cid| cid <= u16::MAX as u32).collect();
    let len = cids.last().map_or(0, |&max| max as usize + 1);
    let mut table = vec![0u16; len];
    for cid in cids {
        if let Some(new) = original.glyph_id(cid).and_then(|old| gid_map.new_id(old)) {
            table[cid as usize] = new;
        }
    }
    CidToGidMap::Table(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FontDescriptor, FormXObject, Page, SimpleEncoding};
    use crate::test_fonts::{outline, TrueTypeBuilder};
    use pretty_assertions::assert_eq;

    fn truetype_font(name: &str, data: &[u8]) -> FontResource {
        FontResource::simple(name, FontDescriptor::truetype(data.to_vec()))
    }

    #[test]
    fn test_unresolved_codes_are_counted() {
        let data = TrueTypeBuilder::latin(4).build();
        let mut document = Document::new();
        document.add_page(Page::new(
            b"BT /F1 10 Tf (AZ) Tj ET".to_vec(),
            Resources::new().with_font("F1", truetype_font("Latin", &data)),
        ));

        let report = subset_document(&mut document, &SubsetOptions::default());
        assert_eq!(report.unresolved_codes, 1);
        assert_eq!(report.subsetted_count(), 1);
    }

    #[test]
    fn test_composite_truetype_gets_explicit_cid_map() {
        let data = TrueTypeBuilder::latin(10).build();
        let to_unicode = CMap::parse(
            b"begincmap 1 begincodespacerange <0000> <FFFF> endcodespacerange \
              2 beginbfchar <0003> <0043> <0007> <0047> endbfchar endcmap",
        )
        .unwrap();
        let font = FontResource::composite("CJK", FontDescriptor::truetype(data)).with_to_unicode(to_unicode);

        let mut document = Document::new();
        document.add_page(Page::new(
            b"BT /C0 10 Tf <00030007> Tj ET".to_vec(),
            Resources::new().with_font("C0", font),
        ));

        subset_document(&mut document, &SubsetOptions::default());
        let font = &document.pages[0].resources.fonts["C0"];
        let FontKind::Composite { cid_to_gid, .. } = &font.kind else {
            panic!("expected composite font");
        };
        assert_eq!(cid_to_gid.glyph_id(3), Some(1));
        assert_eq!(cid_to_gid.glyph_id(7), Some(2));

        let subset = TrueTypeFont::parse(font.program().unwrap().data()).unwrap();
        assert_eq!(subset.num_glyphs, 3);
        let cmap = subset.parse_cmap().unwrap();
        assert_eq!(cmap.len(), 1);
        assert_eq!(cmap[0].glyph_id('G' as u32), Some(2));
    }

    #[test]
    fn test_unknown_format_is_reported_and_kept() {
        let mut document = Document::new();
        let descriptor = FontDescriptor::compact(FontFormat::Unknown("OpenType".to_string()), vec![1, 2, 3]);
        document.add_page(Page::new(
            b"BT /F1 10 Tf (A) Tj ET".to_vec(),
            Resources::new().with_font("F1", FontResource::simple("Odd", descriptor)),
        ));

        let report = subset_document(&mut document, &SubsetOptions::default());
        let (_, outcome) = report.failures().next().unwrap();
        assert!(matches!(outcome, DigestOutcome::Failed { kind, .. } if kind == "UnsupportedFormat"));
        assert_eq!(
            document.pages[0].resources.fonts["F1"].program().unwrap().data(),
            &[1, 2, 3]
        );
    }

    #[test]
    fn test_cff_simple_font_uses_differences_names() {
        let data = crate::test_fonts::CffBuilder::simple()
            .glyph("A", outline(1))
            .glyph("bullet", outline(2))
            .glyph("B", outline(3))
            .build();
        let mut encoding = SimpleEncoding::default();
        encoding.differences.insert(0x80, "bullet".to_string());
        let font = FontResource::simple(
            "Type1C",
            FontDescriptor::compact(FontFormat::CompactOutlineSimple, data),
        )
        .with_encoding(encoding);

        let mut document = Document::new();
        document.add_page(Page::new(
            b"BT /F1 10 Tf <4180> Tj ET".to_vec(),
            Resources::new().with_font("F1", font),
        ));

        let report = subset_document(&mut document, &SubsetOptions::default());
        assert_eq!(report.unresolved_codes, 0);
        let program = document.pages[0].resources.fonts["F1"].program().unwrap();
        let subset = crate::fonts::CffFont::parse(program.data()).unwrap();
        assert_eq!(subset.num_glyphs(), 3);
        assert_eq!(subset.glyph_for_name("bullet"), Some(2));
        assert_eq!(subset.glyph_for_name("B"), None);
    }

    #[test]
    fn test_keep_unused_fonts_when_removal_disabled() {
        let data = TrueTypeBuilder::latin(4).build();
        let mut document = Document::new();
        document.add_page(Page::new(
            b"".to_vec(),
            Resources::new().with_font("F1", truetype_font("Latin", &data)),
        ));

        let options = SubsetOptions {
            remove_unused_fonts: false,
            ..SubsetOptions::default()
        };
        let report = subset_document(&mut document, &options);
        assert!(report.removed.is_empty());
        assert_eq!(document.pages[0].resources.fonts["F1"].program().unwrap().data(), &data[..]);
    }

    fn latin_document(data: &[u8], contents: &[u8]) -> Document {
        let mut document = Document::new();
        document.add_page(Page::new(
            contents.to_vec(),
            Resources::new().with_font("F1", truetype_font("Latin", data)),
        ));
        document
    }

    #[test]
    fn test_shared_cache_reuses_identical_requests() {
        let data = TrueTypeBuilder::latin(6).build();
        let orchestrator = SubsetOrchestrator::new(SubsetOptions::default());
        let mut first = latin_document(&data, b"BT /F1 10 Tf (AB) Tj ET");
        let mut second = latin_document(&data, b"BT /F1 10 Tf (BA) Tj ET");

        orchestrator.run(&mut first);
        assert_eq!(orchestrator.cache().len(), 1);
        let report = orchestrator.run(&mut second);

        assert_eq!(orchestrator.cache().len(), 1);
        assert_eq!(report.subsetted_count(), 1);
        assert_eq!(
            first.pages[0].resources.fonts["F1"].program().unwrap().data(),
            second.pages[0].resources.fonts["F1"].program().unwrap().data()
        );
    }

    #[test]
    fn test_shared_cache_keeps_glyphs_of_each_document() {
        let data = TrueTypeBuilder::latin(30).build();
        let orchestrator = SubsetOrchestrator::new(SubsetOptions::default());
        let mut first = latin_document(&data, b"BT /F1 10 Tf (A) Tj ET");
        let mut second = latin_document(&data, b"BT /F1 10 Tf (Z) Tj ET");

        orchestrator.run(&mut first);
        let report = orchestrator.run(&mut second);
        assert_eq!(orchestrator.cache().len(), 2);
        assert_eq!(report.unresolved_codes, 0);

        let subset = TrueTypeFont::parse(second.pages[0].resources.fonts["F1"].program().unwrap().data()).unwrap();
        let cmap = subset.parse_cmap().unwrap();
        assert!(cmap[0].glyph_id('Z' as u32).is_some());
        assert!(cmap[0].glyph_id('A' as u32).is_none());
    }

    #[test]
    fn test_cache_hit_still_reports_unresolved_codes() {
        let data = TrueTypeBuilder::latin(4).build();
        let orchestrator = SubsetOrchestrator::new(SubsetOptions::default());

        for _ in 0..2 {
            let mut document = latin_document(&data, b"BT /F1 10 Tf (AZ) Tj ET");
            assert_eq!(orchestrator.run(&mut document).unresolved_codes, 1);
        }
        assert_eq!(orchestrator.cache().len(), 1);
    }

    #[test]
    fn test_forms_past_depth_limit_are_left_untouched() {
        let data = TrueTypeBuilder::latin(4).build();
        let inner = FormXObject::new(
            b"BT /F1 10 Tf (A) Tj ET".to_vec(),
            Resources::new().with_font("F1", truetype_font("Deep", &data)),
        );
        let middle = FormXObject::new(
            b"/Fm2 Do".to_vec(),
            Resources::new().with_xobject("Fm2", XObject::Form(inner)),
        );
        let outer = FormXObject::new(
            b"/Fm1 Do".to_vec(),
            Resources::new().with_xobject("Fm1", XObject::Form(middle)),
        );
        let mut document = Document::new();
        document.add_page(Page::new(
            b"/Fm0 Do".to_vec(),
            Resources::new().with_xobject("Fm0", XObject::Form(outer)),
        ));

        let options = SubsetOptions {
            max_form_depth: 2,
            ..SubsetOptions::default()
        };
        let report = subset_document(&mut document, &options);
        assert!(report.removed.is_empty());

        let mut resources = &document.pages[0].resources;
        for name in ["Fm0", "Fm1", "Fm2"] {
            let XObject::Form(form) = &resources.xobjects[name] else {
                panic!("expected form");
            };
            resources = &form.resources;
        }
        assert_eq!(resources.fonts["F1"].program().unwrap().data(), &data[..]);
    }

    #[test]
    fn test_unreadable_bytes_do_not_hide_later_fonts() {
        let data = TrueTypeBuilder::latin(4).build();
        let other = TrueTypeBuilder::latin(5).build();
        let mut document = Document::new();
        document.add_page(Page::new(
            b"BT /F1 10 Tf (A) Tj <zz> Tj /F2 10 Tf (B) Tj ET".to_vec(),
            Resources::new()
                .with_font("F1", truetype_font("First", &data))
                .with_font("F2", truetype_font("Second", &other)),
        ));

        let report = subset_document(&mut document, &SubsetOptions::default());
        assert!(report.removed.is_empty());
        assert_eq!(report.subsetted_count(), 2);
        let fonts = &document.pages[0].resources.fonts;
        assert!(fonts.contains_key("F1") && fonts.contains_key("F2"));
    }
}
