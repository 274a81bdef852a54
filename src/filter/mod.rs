//! Record filter predicates
//!
//! Language or script detection is a pluggable collaborator. The orchestrator
//! only asks whether a record's text is accepted; absent or blank text is
//! always rejected.

use crate::config::{FilterConfig, FilterKind};
use std::collections::HashSet;

/// Lowercase letters specific to Vietnamese orthography
pub const VIETNAMESE_MARKERS: &str = "ăâđêôơư\
    áàảãạắằẳẵặấầẩẫậéèẻẽẹếềểễệíìỉĩịóòỏõọốồổỗộớờởỡợúùủũụứừửữựýỳỷỹỵ";

/// Decides whether a record is kept
pub trait FilterPredicate: Send + Sync {
    fn is_accepted(&self, text: Option<&str>) -> bool;
}

/// Accepts any non-blank text
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptNonEmpty;

impl FilterPredicate for AcceptNonEmpty {
    fn is_accepted(&self, text: Option<&str>) -> bool {
        text.map_or(false, |t| !t.trim().is_empty())
    }
}

/// Accepts text containing at least `min_markers` characters from a marker alphabet
///
/// Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct MarkerFilter {
    markers: HashSet<char>,
    min_markers: usize,
}

impl MarkerFilter {
    pub fn new(alphabet: &str, min_markers: usize) -> Self {
        Self {
            markers: alphabet.chars().flat_map(char::to_lowercase).collect(),
            min_markers: min_markers.max(1),
        }
    }

    pub fn vietnamese() -> Self {
        Self::new(VIETNAMESE_MARKERS, 2)
    }
}

impl FilterPredicate for MarkerFilter {
    fn is_accepted(&self, text: Option<&str>) -> bool {
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return false;
        };

        text.chars()
            .flat_map(char::to_lowercase)
            .filter(|c| self.markers.contains(c))
            .take(self.min_markers)
            .count()
            >= self.min_markers
    }
}

/// Builds the predicate selected by the `[filter]` section
pub fn build_filter(config: &FilterConfig) -> Box<dyn FilterPredicate> {
    match config.kind {
        FilterKind::Any => Box::new(AcceptNonEmpty),
        FilterKind::Markers => Box::new(MarkerFilter::new(&config.markers, config.min_markers)),
    }
}
