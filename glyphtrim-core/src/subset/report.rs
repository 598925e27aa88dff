//! Per-run report: subsetted and failed programs, removed fonts, sizes

use crate::error::FontError;
use crate::fonts::FontProgramDigest;
use std::collections::BTreeMap;

/// What happened to one font program
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum DigestOutcome {
    Subsetted {
        format: String,
        bytes_before: usize,
        bytes_after: usize,
        glyphs: usize,
    },
    /// Original bytes were kept
    Failed { kind: String, message: String },
}

impl DigestOutcome {
    pub(crate) fn failed(error: &FontError) -> Self {
        DigestOutcome::Failed {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DigestOutcome::Failed { .. })
    }
}

/// A font resource entry removed because nothing painted with it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RemovedFont {
    pub page: usize,
    pub resource: String,
    pub base_font: String,
    pub bytes: usize,
}

/// Summary of a subsetting run
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SubsetReport {
    pub outcomes: BTreeMap<FontProgramDigest, DigestOutcome>,
    pub removed: Vec<RemovedFont>,
    /// Painted codes that resolve to no glyph of their font program
    pub unresolved_codes: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

impl SubsetReport {
    pub fn new(bytes_before: usize) -> Self {
        Self {
            bytes_before,
            ..Self::default()
        }
    }

    pub fn outcome(&self, digest: &FontProgramDigest) -> Option<&DigestOutcome> {
        self.outcomes.get(digest)
    }

    pub fn subsetted_count(&self) -> usize {
        self.outcomes.values().filter(|o| !o.is_failure()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&FontProgramDigest, &DigestOutcome)> {
        self.outcomes.iter().filter(|(_, o)| o.is_failure())
    }

    pub fn bytes_saved(&self) -> usize {
        self.bytes_before.saturating_sub(self.bytes_after)
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_savings() {
        let ok = FontProgramDigest::compute(b"ok").unwrap();
        let bad = FontProgramDigest::compute(b"bad").unwrap();

        let mut report = SubsetReport::new(1000);
        report.outcomes.insert(
            ok,
            DigestOutcome::Subsetted {
                format: "TrueTypeOutline".to_string(),
                bytes_before: 800,
                bytes_after: 200,
                glyphs: 3,
            },
        );
        report.outcomes.insert(
            bad,
            DigestOutcome::failed(&FontError::MalformedFontProgram("bad subr".to_string())),
        );
        report.bytes_after = 400;

        assert_eq!(report.subsetted_count(), 1);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.bytes_saved(), 600);
        assert!(matches!(
            report.outcome(&bad),
            Some(DigestOutcome::Failed { kind, .. }) if kind == "MalformedFontProgram"
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_uses_hex_digests() {
        let digest = FontProgramDigest::compute(b"ok").unwrap();
        let mut report = SubsetReport::new(10);
        report.outcomes.insert(
            digest,
            DigestOutcome::failed(&FontError::UnsupportedFormat("Type3".to_string())),
        );

        let json = report.to_json().unwrap();
        assert!(json.contains(&digest.to_hex()));
        assert!(json.contains("\"status\": \"failed\""));
    }
}
