//! Document-wide usage collection

use super::{ContentInterpreter, GlyphSink, UsedCodeSet};
use crate::document::{Document, FontResource, Page};
use tracing::debug;

/// Records painted codes per font program digest.
///
/// Fonts without an embedded program have no digest and are never recorded.
#[derive(Debug, Default)]
pub struct UsageCollector {
    used: UsedCodeSet,
}

impl UsageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret a page and its annotation appearances
    pub fn collect_page(&mut self, page: &Page, max_form_depth: usize) {
        ContentInterpreter::new(self, max_form_depth).run(&page.contents, &page.resources);
        for appearance in page.annotations.iter().filter_map(|a| a.appearance.as_ref()) {
            ContentInterpreter::new(self, max_form_depth).run(&appearance.contents, &appearance.resources);
        }
    }

    pub fn used(&self) -> &UsedCodeSet {
        &self.used
    }

    pub fn finish(self) -> UsedCodeSet {
        self.used
    }
}

impl GlyphSink for UsageCollector {
    fn font_selected(&mut self, font: &FontResource, _size: f32) {
        match font.digest() {
            Ok(digest) => self.used.mark_selected(digest),
            Err(err) => debug!("Not tracking {}: {}", font.base_font, err),
        }
    }

    fn glyph_painted(&mut self, font: &FontResource, code: u32) {
        if let Ok(digest) = font.digest() {
            self.used.record(digest, code);
        }
    }
}

/// Collect usage over every page. The set is never reset between pages.
pub fn collect_usage(document: &Document, max_form_depth: usize) -> UsedCodeSet {
    let mut collector = UsageCollector::new();
    for page in &document.pages {
        collector.collect_page(page, max_form_depth);
    }
    collector.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Annotation, FontDescriptor, FormXObject, Resources};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn embedded(name: &str, program: &[u8]) -> FontResource {
        FontResource::simple(name, FontDescriptor::truetype(program.to_vec()))
    }

    #[test]
    fn test_identical_programs_share_one_entry() {
        let program = b"same program bytes";
        let mut document = Document::new();
        document.add_page(Page::new(
            b"BT /F1 12 Tf (AB) Tj ET".to_vec(),
            Resources::new().with_font("F1", embedded("Arial", program)),
        ));
        document.add_page(Page::new(
            b"BT /R7 12 Tf (BC) Tj ET".to_vec(),
            Resources::new().with_font("R7", embedded("Arial-Copy", program)),
        ));

        let used = collect_usage(&document, 12);
        assert_eq!(used.len(), 1);
        let digest = document.pages[0].resources.fonts["F1"].digest().unwrap();
        let expected: BTreeSet<u32> = [65, 66, 67].into_iter().collect();
        assert_eq!(used.codes(&digest), Some(&expected));
    }

    #[test]
    fn test_selected_unpainted_and_unreferenced_fonts() {
        let mut document = Document::new();
        document.add_page(Page::new(
            b"BT /F1 12 Tf ET".to_vec(),
            Resources::new()
                .with_font("F1", embedded("Selected", b"one"))
                .with_font("F2", embedded("Unused", b"two"))
                .with_font("F3", FontResource::standard("Helvetica")),
        ));

        let used = collect_usage(&document, 12);
        let fonts = &document.pages[0].resources.fonts;
        assert!(used.codes(&fonts["F1"].digest().unwrap()).unwrap().is_empty());
        assert!(!used.contains(&fonts["F2"].digest().unwrap()));
        assert_eq!(used.len(), 1);
    }

    #[test]
    fn test_standard_fonts_are_never_recorded() {
        let mut document = Document::new();
        document.add_page(Page::new(
            b"BT /F3 12 Tf (Hello) Tj ET".to_vec(),
            Resources::new().with_font("F3", FontResource::standard("Helvetica")),
        ));
        assert!(collect_usage(&document, 12).is_empty());
    }

    #[test]
    fn test_annotation_appearances_are_interpreted() {
        let appearance = FormXObject::new(
            b"BT /Helv 0 Tf (x) Tj ET".to_vec(),
            Resources::new().with_font("Helv", embedded("FieldFont", b"field")),
        );
        let mut document = Document::new();
        document.add_page(
            Page::new(b"".to_vec(), Resources::new())
                .with_annotation(Annotation { appearance: Some(appearance) })
                .with_annotation(Annotation::default()),
        );

        let used = collect_usage(&document, 12);
        assert_eq!(used.len(), 1);
        let (_, codes) = used.iter().next().unwrap();
        assert!(codes.contains(&(b'x' as u32)));
    }
}
