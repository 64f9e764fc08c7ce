use std::collections::BTreeSet;

use crate::foundation::{
    core::Fps,
    error::{FramecastError, FramecastResult},
};

/// Thematic role of a script section.
///
/// Kinds outside the five scripted roles fall back to the default accent color
/// when painted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// Attention-grabbing opener.
    Hook,
    /// High-level outline of what follows.
    Overview,
    /// Main explanatory content.
    Core,
    /// Misconception being addressed.
    Myth,
    /// Closing recap.
    Summary,
    /// Anything else.
    Other,
}

impl SectionKind {
    /// Short uppercase label drawn on the section badge.
    pub fn badge_label(self) -> &'static str {
        match self {
            Self::Hook => "HOOK",
            Self::Overview => "OVERVIEW",
            Self::Core => "CORE",
            Self::Myth => "MYTH",
            Self::Summary => "SUMMARY",
            Self::Other => "NOTE",
        }
    }
}

/// One timed script segment. Immutable once submitted; caller-owned.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Section {
    /// Unique section id.
    pub id: String,
    /// Thematic role.
    pub kind: SectionKind,
    /// Heading drawn at the title anchor.
    pub title: String,
    /// Body text, word-wrapped at paint-cache build time.
    pub content: String,
    /// On-screen duration in seconds, must be > 0.
    pub duration_secs: f64,
    /// Position in the script; sections are rendered in ascending order.
    pub order: u32,
}

impl Section {
    /// Number of frames this section occupies at `fps`: `ceil(duration × fps)`.
    pub fn frame_count(&self, fps: Fps) -> u64 {
        (self.duration_secs * fps.as_f64()).ceil() as u64
    }

    /// Validate a single section.
    pub fn validate(&self) -> FramecastResult<()> {
        if self.id.trim().is_empty() {
            return Err(FramecastError::validation("section id must be non-empty"));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(FramecastError::validation(format!(
                "section '{}' duration must be finite and > 0",
                self.id
            )));
        }
        Ok(())
    }
}

/// Validate a caller-supplied section list.
///
/// Rejects empty lists (fatal setup error by design), invalid sections and
/// duplicate ids.
pub fn validate_sections(sections: &[Section]) -> FramecastResult<()> {
    if sections.is_empty() {
        return Err(FramecastError::validation("section list must be non-empty"));
    }

    let mut seen = BTreeSet::new();
    for section in sections {
        section.validate()?;
        if !seen.insert(section.id.as_str()) {
            return Err(FramecastError::validation(format!(
                "duplicate section id '{}'",
                section.id
            )));
        }
    }
    Ok(())
}

/// Sections in render order (ascending `order`, stable for ties).
pub fn ordered_sections(sections: &[Section]) -> Vec<&Section> {
    let mut out: Vec<&Section> = sections.iter().collect();
    out.sort_by_key(|s| s.order);
    out
}

/// Total frames across the whole script: `Σ ceil(dᵢ × fps)`.
pub fn total_frame_count(sections: &[Section], fps: Fps) -> u64 {
    sections.iter().map(|s| s.frame_count(fps)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, duration_secs: f64, order: u32) -> Section {
        Section {
            id: id.to_string(),
            kind: SectionKind::Core,
            title: format!("Title {id}"),
            content: "one two three".to_string(),
            duration_secs,
            order,
        }
    }

    #[test]
    fn json_roundtrip() {
        let s = section("s0", 2.5, 0);
        let json = serde_json::to_string(&s).unwrap();
        let de: Section = serde_json::from_str(&json).unwrap();
        assert_eq!(de.id, "s0");
        assert_eq!(de.kind, SectionKind::Core);
        assert_eq!(de.duration_secs, 2.5);
    }

    #[test]
    fn validate_rejects_empty_list() {
        assert!(validate_sections(&[]).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let list = vec![section("a", 1.0, 0), section("a", 1.0, 1)];
        assert!(validate_sections(&list).is_err());
    }

    #[test]
    fn validate_rejects_non_positive_duration() {
        assert!(section("a", 0.0, 0).validate().is_err());
        assert!(section("a", -1.0, 0).validate().is_err());
        assert!(section("a", f64::NAN, 0).validate().is_err());
    }

    #[test]
    fn frame_count_uses_ceiling() {
        let fps = Fps::whole(2).unwrap();
        assert_eq!(section("a", 2.0, 0).frame_count(fps), 4);
        assert_eq!(section("a", 2.1, 0).frame_count(fps), 5);
        assert_eq!(section("a", 0.1, 0).frame_count(fps), 1);
    }

    #[test]
    fn total_frames_sum_ceilings_per_section() {
        let fps = Fps::whole(2).unwrap();
        let list = vec![section("a", 2.0, 0), section("b", 3.0, 1)];
        assert_eq!(total_frame_count(&list, fps), 10);

        let fps = Fps::whole(10).unwrap();
        let list = vec![section("a", 1.05, 0), section("b", 0.33, 1)];
        // ceil(10.5) + ceil(3.3) = 11 + 4
        assert_eq!(total_frame_count(&list, fps), 15);
    }

    #[test]
    fn ordered_sections_sorts_by_order_field() {
        let list = vec![section("b", 1.0, 2), section("a", 1.0, 1)];
        let ordered = ordered_sections(&list);
        assert_eq!(ordered[0].id, "a");
        assert_eq!(ordered[1].id, "b");
    }
}
