//! In-memory document model
//!
//! Loading and saving PDF files belongs to the caller. The engine works on
//! this owned page tree: drawing programs, resource tables and the font
//! programs they embed. Only font program bytes and font resource
//! membership are ever mutated.

mod font;

pub use font::{
    CidToGidMap, FontDescriptor, FontFormat, FontKind, FontProgram, FontResource, SimpleEncoding,
};

use std::collections::BTreeMap;

/// Resource table of a page, form or appearance stream
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub fonts: BTreeMap<String, FontResource>,
    pub xobjects: BTreeMap<String, XObject>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(mut self, name: impl Into<String>, font: FontResource) -> Self {
        self.fonts.insert(name.into(), font);
        self
    }

    pub fn with_xobject(mut self, name: impl Into<String>, xobject: XObject) -> Self {
        self.xobjects.insert(name.into(), xobject);
        self
    }

    fn byte_size(&self) -> usize {
        let fonts: usize = self
            .fonts
            .values()
            .filter_map(FontResource::program)
            .map(FontProgram::len)
            .sum();
        let xobjects: usize = self.xobjects.values().map(XObject::byte_size).sum();
        fonts + xobjects
    }
}

/// A Form XObject: a reusable drawing program with its own resources
#[derive(Debug, Clone, Default)]
pub struct FormXObject {
    pub contents: Vec<u8>,
    pub resources: Resources,
}

impl FormXObject {
    pub fn new(contents: impl Into<Vec<u8>>, resources: Resources) -> Self {
        Self {
            contents: contents.into(),
            resources,
        }
    }

    fn byte_size(&self) -> usize {
        self.contents.len() + self.resources.byte_size()
    }
}

/// External object referenced by `Do`
#[derive(Debug, Clone)]
pub enum XObject {
    Form(FormXObject),
    Image { data: Vec<u8> },
}

impl XObject {
    fn byte_size(&self) -> usize {
        match self {
            XObject::Form(form) => form.byte_size(),
            XObject::Image { data } => data.len(),
        }
    }
}

/// Annotation with an optional normal appearance stream
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub appearance: Option<FormXObject>,
}

/// A document page
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub contents: Vec<u8>,
    pub resources: Resources,
    pub annotations: Vec<Annotation>,
}

impl Page {
    pub fn new(contents: impl Into<Vec<u8>>, resources: Resources) -> Self {
        Self {
            contents: contents.into(),
            resources,
            annotations: Vec::new(),
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    fn byte_size(&self) -> usize {
        let annotations: usize = self
            .annotations
            .iter()
            .filter_map(|a| a.appearance.as_ref())
            .map(FormXObject::byte_size)
            .sum();
        self.contents.len() + self.resources.byte_size() + annotations
    }
}

/// Ordered page list
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Approximate serialized size: drawing programs plus embedded data.
    ///
    /// Shared objects are counted once per reference.
    pub fn byte_size(&self) -> usize {
        self.pages.iter().map(Page::byte_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_counts_nested_resources() {
        let font = FontResource::simple("F", FontDescriptor::truetype(vec![0; 100]));
        let form = FormXObject::new(b"BT ET".to_vec(), Resources::new().with_font("F1", font.clone()));
        let resources = Resources::new()
            .with_font("F1", font.clone())
            .with_font("F2", FontResource::standard("Helvetica"))
            .with_xobject("Fm0", XObject::Form(form))
            .with_xobject("Im0", XObject::Image { data: vec![0; 10] });

        let page = Page::new(b"q Q".to_vec(), resources).with_annotation(Annotation {
            appearance: Some(FormXObject::new(b"x".to_vec(), Resources::new().with_font("F", font))),
        });

        let mut document = Document::new();
        document.add_page(page);

        // 3 + 100 + (5 + 100) + 10 + (1 + 100)
        assert_eq!(document.byte_size(), 319);
        assert_eq!(document.page_count(), 1);
    }
}
