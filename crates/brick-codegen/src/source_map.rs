//! Source mapping: generated text ranges → originating block ids.
//!
//! Intervals are byte offsets into the generated source, recorded in
//! emission order. Nested constructs are recorded after their children, so
//! a linear scan for the first containing interval finds the innermost
//! block.

use brick_types::BlockId;
use serde::{Deserialize, Serialize};

/// Ordered block intervals for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    pub entries: Vec<SourceInterval>,
}

/// `[start, end)` of the text emitted for `block`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInterval {
    pub block: BlockId,
    pub start: usize,
    pub end: usize,
}

/// A text range in the generated source, as reported by downstream tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub length: usize,
}

impl Span {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }
}

impl SourceMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record an interval. Empty intervals are dropped.
    pub fn push(&mut self, block: BlockId, start: usize, end: usize) {
        if start < end {
            self.entries.push(SourceInterval { block, start, end });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first interval that fully contains `span`.
    pub fn find(&self, span: Span) -> Option<&SourceInterval> {
        self.entries
            .iter()
            .find(|e| e.start <= span.start && e.end >= span.start.saturating_add(span.length))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}

/// Resolve a generated-text span back to the block it came from.
///
/// Returns `None` without a span or when no interval contains it.
pub fn find_block_id(map: &SourceMap, span: Option<Span>) -> Option<BlockId> {
    map.find(span?).map(|e| e.block.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SourceMap {
        let mut sm = SourceMap::new();
        sm.push(BlockId::new("inner"), 4, 9);
        sm.push(BlockId::new("outer"), 0, 20);
        sm.push(BlockId::new("empty"), 7, 7);
        sm
    }

    #[test]
    fn empty_intervals_are_skipped() {
        assert_eq!(sample().len(), 2);
    }

    #[test]
    fn first_containing_interval_wins() {
        let sm = sample();
        assert_eq!(
            find_block_id(&sm, Some(Span::new(5, 2))),
            Some(BlockId::new("inner"))
        );
        assert_eq!(
            find_block_id(&sm, Some(Span::new(4, 5))),
            Some(BlockId::new("inner"))
        );
        // Straddles the end of "inner".
        assert_eq!(
            find_block_id(&sm, Some(Span::new(8, 3))),
            Some(BlockId::new("outer"))
        );
    }

    #[test]
    fn no_match() {
        let sm = sample();
        assert_eq!(find_block_id(&sm, Some(Span::new(18, 5))), None);
        assert_eq!(find_block_id(&sm, None), None);
        assert_eq!(find_block_id(&SourceMap::new(), Some(Span::new(0, 0))), None);
        assert_eq!(find_block_id(&sm, Some(Span::new(5, usize::MAX))), None);
    }

    #[test]
    fn json_shape() {
        let json = sample().to_json();
        assert!(json.contains(r#"{"block":"inner","start":4,"end":9}"#));
        let back = SourceMap::from_json(&json).expect("parse failed");
        assert_eq!(back, sample());
    }
}
