//! Drawing-program interpretation for glyph usage

use super::GlyphSink;
use crate::document::{FontResource, Resources, XObject};
use crate::error::FontError;
use crate::parser::{ContentOperation, ContentParser, TextElement};
use tracing::{debug, warn};

/// Walks drawing programs and reports font selection and glyph painting.
///
/// Only the active font of the graphics state is tracked. Form XObjects
/// run with their own resources and inherit the caller's active font.
pub struct ContentInterpreter<'s, S: GlyphSink + ?Sized> {
    sink: &'s mut S,
    max_form_depth: usize,
}

impl<'s, S: GlyphSink + ?Sized> ContentInterpreter<'s, S> {
    pub fn new(sink: &'s mut S, max_form_depth: usize) -> Self {
        Self {
            sink,
            max_form_depth,
        }
    }

    /// Interpret a page or appearance stream
    pub fn run(&mut self, contents: &[u8], resources: &Resources) {
        self.run_at(contents, resources, None, 0);
    }

    fn run_at<'r>(
        &mut self,
        contents: &[u8],
        resources: &'r Resources,
        inherited: Option<&'r FontResource>,
        depth: usize,
    ) {
        let mut font = inherited;
        let mut saved: Vec<Option<&'r FontResource>> = Vec::new();

        for operation in ContentParser::parse_lenient(contents) {
            match operation {
                ContentOperation::SetFont(name, size) => {
                    font = resources.fonts.get(&name);
                    match font {
                        Some(selected) => self.sink.font_selected(selected, size),
                        None => warn!("{}; no active font", FontError::MissingFontResource(name)),
                    }
                }
                ContentOperation::ShowText(bytes)
                | ContentOperation::NextLineShowText(bytes)
                | ContentOperation::SetSpacingNextLineShowText(_, _, bytes) => {
                    self.show(font, &bytes);
                }
                ContentOperation::ShowTextArray(elements) => {
                    for element in elements {
                        if let TextElement::Text(bytes) = element {
                            self.show(font, &bytes);
                        }
                    }
                }
                ContentOperation::SaveGraphicsState => saved.push(font),
                ContentOperation::RestoreGraphicsState => {
                    if let Some(restored) = saved.pop() {
                        font = restored;
                    }
                }
                ContentOperation::PaintXObject(name) => match resources.xobjects.get(&name) {
                    Some(XObject::Form(form)) => {
                        if depth + 1 > self.max_form_depth {
                            warn!("Form XObject /{} exceeds nesting limit {}", name, self.max_form_depth);
                        } else {
                            self.run_at(&form.contents, &form.resources, font, depth + 1);
                        }
                    }
                    Some(XObject::Image { .. }) => {}
                    None => debug!("XObject /{} not found", name),
                },
                ContentOperation::BeginText
                | ContentOperation::EndText
                | ContentOperation::InlineImage
                | ContentOperation::Other(_) => {}
            }
        }
    }

    fn show(&mut self, font: Option<&FontResource>, bytes: &[u8]) {
        let Some(font) = font else {
            debug!("Text shown with no active font");
            return;
        };
        for code in font.decode_codes(bytes) {
            self.sink.glyph_painted(font, code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FontDescriptor, FormXObject};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl GlyphSink for Recorder {
        fn font_selected(&mut self, font: &FontResource, size: f32) {
            self.events.push(format!("select {} {}", font.base_font, size));
        }

        fn glyph_painted(&mut self, font: &FontResource, code: u32) {
            self.events.push(format!("{}:{}", font.base_font, code));
        }
    }

    fn font(name: &str) -> FontResource {
        FontResource::simple(name, FontDescriptor::truetype(name.as_bytes().to_vec()))
    }

    fn resources() -> Resources {
        Resources::new()
            .with_font("F1", font("Alpha"))
            .with_font("F2", font("Beta"))
    }

    fn events(contents: &[u8], resources: &Resources, max_depth: usize) -> Vec<String> {
        let mut recorder = Recorder::default();
        ContentInterpreter::new(&mut recorder, max_depth).run(contents, resources);
        recorder.events
    }

    #[test]
    fn test_text_showing_operators() {
        let contents = b"BT /F1 12 Tf (A) Tj [(B) -250 (C)] TJ (D) ' 1 2 (E) \" ET";
        assert_eq!(
            events(contents, &resources(), 4),
            vec!["select Alpha 12", "Alpha:65", "Alpha:66", "Alpha:67", "Alpha:68", "Alpha:69"]
        );
    }

    #[test]
    fn test_restore_brings_back_saved_font() {
        let contents = b"BT /F1 10 Tf q /F2 10 Tf (A) Tj Q (B) Tj ET";
        let events = events(contents, &resources(), 4);
        assert_eq!(&events[events.len() - 2..], &["Beta:65", "Alpha:66"]);
    }

    #[test]
    fn test_missing_font_leaves_no_active_font() {
        let contents = b"BT /F1 10 Tf (A) Tj /F9 10 Tf (B) Tj /F2 10 Tf (C) Tj ET";
        assert_eq!(
            events(contents, &resources(), 4),
            vec!["select Alpha 10", "Alpha:65", "select Beta 10", "Beta:67"]
        );
    }

    #[test]
    fn test_malformed_font_selection_is_skipped() {
        let contents = b"BT /F1 Tf (A) Tj /F2 8 Tf (B) Tj ET";
        assert_eq!(events(contents, &resources(), 4), vec!["select Beta 8", "Beta:66"]);
    }

    #[test]
    fn test_forms_inherit_font_and_respect_depth() {
        let inner = FormXObject::new(b"(I) Tj".to_vec(), Resources::new());
        let middle = FormXObject::new(
            b"(M) Tj /Fm1 Do".to_vec(),
            Resources::new().with_xobject("Fm1", XObject::Form(inner)),
        );
        let page = resources().with_xobject("Fm0", XObject::Form(middle));

        let contents = b"BT /F1 10 Tf ET /Fm0 Do /Im0 Do";
        assert_eq!(
            events(contents, &page, 2),
            vec!["select Alpha 10", "Alpha:77", "Alpha:73"]
        );
        assert_eq!(events(contents, &page, 1), vec!["select Alpha 10", "Alpha:77"]);
    }

    #[test]
    fn test_composite_font_reports_cids() {
        let composite = FontResource::composite("Gamma", FontDescriptor::truetype(vec![1, 2, 3]));
        let resources = Resources::new().with_font("C0", composite);
        let contents = b"BT /C0 9 Tf <00410102> Tj ET";
        assert_eq!(
            events(contents, &resources, 4),
            vec!["select Gamma 9", "Gamma:65", "Gamma:258"]
        );
    }
}
