//! Frames: the render-ready output of [`LayoutIndex::build_frame`](crate::LayoutIndex::build_frame).
//!
//! Building a frame happens in two steps. The layout index first collects the visible text as
//! a [`FrameContent`] and hands it to every [`FrameDecorator`], which attach style layers
//! (text, background and whole-line decorations). The index then resolves those layers into
//! positioned [`TextRun`]s, [`BackgroundRect`]s, [`FrameLine`]s and [`ScrollbarMark`]s.
//!
//! Styles are opaque to this crate; `S` is whatever the host uses (a class name, a theme id).

use crate::anchor::OffsetRange;
use crate::range_tree::RangeTree;
use ropey::Rope;
use std::cell::RefCell;

/// Visible viewport, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextRect {
    /// Left edge.
    pub left: f64,
    /// Top edge.
    pub top: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl TextRect {
    /// Create a new rect.
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// How content coordinates map onto the scrollbar track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollbarParams {
    /// Scrollbar pixels per content pixel.
    pub ratio: f64,
    /// Minimum height of a scrollbar mark.
    pub min_decoration_height: f64,
}

/// A run of text drawn with a single style.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun<S> {
    /// Left edge of the run.
    pub x: f64,
    /// Top of the line.
    pub y: f64,
    /// The text.
    pub content: String,
    /// Style.
    pub style: S,
}

/// A styled background rectangle spanning one line.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundRect<S> {
    /// Left edge.
    pub x: f64,
    /// Top of the line.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Style.
    pub style: S,
}

/// A mark on the scrollbar track.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollbarMark<S> {
    /// Top of the mark.
    pub y: f64,
    /// Height of the mark.
    pub height: f64,
    /// Style.
    pub style: S,
}

/// A visual line of the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLine<S> {
    /// First document line displayed on this visual line.
    pub first: usize,
    /// Last document line displayed on this visual line. Differs from `first` only when
    /// hidden ranges join lines.
    pub last: usize,
    /// Top of the line.
    pub y: f64,
    /// Line decoration styles, without duplicates.
    pub styles: Vec<S>,
}

/// Positioned output of a frame build.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<S = String> {
    /// X coordinate of the left-most visible point of any line.
    pub line_left: f64,
    /// X coordinate of the right-most visible point of any line.
    pub line_right: f64,
    /// Line height.
    pub line_height: f64,
    /// Styled text runs.
    pub text: Vec<TextRun<S>>,
    /// Styled backgrounds.
    pub background: Vec<BackgroundRect<S>>,
    /// Scrollbar marks.
    pub scrollbar: Vec<ScrollbarMark<S>>,
    /// Visual lines, top to bottom.
    pub lines: Vec<FrameLine<S>>,
}

impl<S> Frame<S> {
    /// An empty frame for the given viewport.
    pub fn new(rect: &TextRect, line_height: f64) -> Self {
        Self {
            line_left: rect.left,
            line_right: rect.right(),
            line_height,
            text: Vec::new(),
            background: Vec::new(),
            scrollbar: Vec::new(),
            lines: Vec::new(),
        }
    }
}

/// Ranges of a single whole-line style.
pub struct LineDecorations<S> {
    /// Style applied to every line touched by `ranges`.
    pub style: S,
    /// Decorated ranges.
    pub ranges: RangeTree<()>,
}

/// Visible text of a frame, handed to decorators.
pub struct FrameContent<S = String> {
    /// Text snapshot the frame was built from.
    pub text: Rope,
    /// Total range of frame contents.
    pub range: OffsetRange,
    /// Continuous ranges of visible text.
    pub ranges: Vec<VisibleRange>,
    /// Layers of styled ranges decorating the text.
    pub text_decorations: Vec<RangeTree<S>>,
    /// Layers of styled ranges decorating the text background.
    pub background_decorations: Vec<RangeTree<S>>,
    /// Whole-line decorations, grouped by style.
    pub line_decorations: Vec<LineDecorations<S>>,
}

impl<S> FrameContent<S> {
    /// Content without decorations.
    pub fn new(text: Rope, range: OffsetRange, ranges: Vec<VisibleRange>) -> Self {
        Self {
            text,
            range,
            ranges,
            text_decorations: Vec::new(),
            background_decorations: Vec::new(),
            line_decorations: Vec::new(),
        }
    }
}

/// Attaches decorations to a frame.
pub trait FrameDecorator<S> {
    /// Adds decoration layers to `content`.
    fn decorate(&mut self, content: &mut FrameContent<S>);
}

impl<S, F: FnMut(&mut FrameContent<S>)> FrameDecorator<S> for F {
    fn decorate(&mut self, content: &mut FrameContent<S>) {
        self(content)
    }
}

#[derive(Debug)]
struct CachedContent {
    content: String,
    left: usize,
    right: usize,
}

/// A continuous range of visible text.
#[derive(Debug)]
pub struct VisibleRange {
    text: Rope,
    /// Start offset.
    pub from: usize,
    /// End offset.
    pub to: usize,
    cache: RefCell<Option<CachedContent>>,
}

impl VisibleRange {
    /// Create a range over a text snapshot.
    pub fn new(text: Rope, from: usize, to: usize) -> Self {
        Self {
            text,
            from,
            to,
            cache: RefCell::new(None),
        }
    }

    /// The range as plain offsets.
    pub fn range(&self) -> OffsetRange {
        OffsetRange::new(self.from, self.to)
    }

    /// Text of the range, extended by up to `padding_left` characters before and
    /// `padding_right` after (clamped to the text).
    ///
    /// Fetched text is cached; asking again with the same or smaller padding does not touch
    /// the rope.
    pub fn content(&self, padding_left: usize, padding_right: usize) -> String {
        let left = padding_left.min(self.from);
        let right = padding_right.min(self.text.len_chars().saturating_sub(self.to));

        let mut cache = self.cache.borrow_mut();
        let stale = cache
            .as_ref()
            .is_none_or(|cached| cached.left < left || cached.right < right);
        if stale {
            let (cached_left, cached_right) = cache
                .as_ref()
                .map_or((left, right), |c| (c.left.max(left), c.right.max(right)));
            *cache = Some(CachedContent {
                content: self
                    .text
                    .slice(self.from - cached_left..self.to + cached_right)
                    .to_string(),
                left: cached_left,
                right: cached_right,
            });
        }

        let Some(cached) = cache.as_ref() else {
            return String::new();
        };
        cached
            .content
            .chars()
            .skip(cached.left - left)
            .take(left + (self.to - self.from) + right)
            .collect()
    }
}

/// Joins visible ranges separated by short gaps.
///
/// Gaps are joined shortest first (ties by position) while their total length stays within half
/// of the total visible length. Fetching a little invisible text is cheaper for decorators than
/// handling many tiny ranges.
pub fn join_ranges(ranges: &[OffsetRange], text: &Rope) -> Vec<VisibleRange> {
    let total: usize = ranges.iter().map(OffsetRange::len).sum();
    let mut gaps: Vec<(usize, usize)> = ranges
        .windows(2)
        .enumerate()
        .map(|(i, pair)| (pair[1].from.saturating_sub(pair[0].to), i))
        .collect();
    gaps.sort_unstable();

    let mut join = vec![false; ranges.len()];
    let mut remaining = total as f64 * 0.5;
    for (len, i) in gaps {
        remaining -= len as f64;
        if remaining < 0.0 {
            break;
        }
        join[i] = true;
    }

    let mut result: Vec<VisibleRange> = Vec::new();
    for (i, range) in ranges.iter().enumerate() {
        match result.last_mut() {
            Some(last) if i > 0 && join[i - 1] => last.to = range.to,
            _ => result.push(VisibleRange::new(text.clone(), range.from, range.to)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spans(ranges: &[VisibleRange]) -> Vec<(usize, usize)> {
        ranges.iter().map(|r| (r.from, r.to)).collect()
    }

    #[test]
    fn test_visible_range_content_with_padding() {
        let text = Rope::from_str("0123456789");
        let range = VisibleRange::new(text, 3, 6);
        assert_eq!(range.content(0, 0), "345");
        assert_eq!(range.content(1, 2), "234567");
        assert_eq!(range.content(10, 0), "012345");
        assert_eq!(range.content(0, 10), "3456789");
        assert_eq!(range.content(2, 1), "123456");
        assert_eq!(range.range(), OffsetRange::new(3, 6));
    }

    #[test]
    fn test_join_ranges() {
        let text = Rope::from_str(&"x".repeat(100));
        let ranges = [
            OffsetRange::new(0, 10),
            OffsetRange::new(12, 20),
            OffsetRange::new(40, 50),
            OffsetRange::new(51, 60),
        ];
        // Total 37, so up to 18 characters of gaps are joined: 1 and 2, but not 20.
        assert_eq!(spans(&join_ranges(&ranges, &text)), vec![(0, 20), (40, 60)]);

        let ranges = [OffsetRange::new(0, 10), OffsetRange::new(15, 20)];
        assert_eq!(spans(&join_ranges(&ranges, &text)), vec![(0, 20)]);

        assert!(join_ranges(&[], &text).is_empty());
        let single = join_ranges(&[OffsetRange::new(5, 5)], &text);
        assert_eq!(spans(&single), vec![(5, 5)]);
    }

    #[test]
    fn test_closure_decorator() {
        let mut calls = 0;
        let mut decorator = |content: &mut FrameContent<u32>| {
            calls += 1;
            let mut layer = RangeTree::new();
            layer.add(content.range.from, content.range.to, 7u32).unwrap();
            content.text_decorations.push(layer);
        };
        let mut content = FrameContent::new(Rope::from_str("abc"), OffsetRange::new(0, 3), Vec::new());
        decorator.decorate(&mut content);
        assert_eq!(calls, 1);
        assert_eq!(content.text_decorations[0].count_all(), 1);
    }

    #[test]
    fn test_frame_edges_follow_rect() {
        let rect = TextRect::new(10.0, 20.0, 100.0, 50.0);
        let frame: Frame = Frame::new(&rect, 16.0);
        assert_eq!(frame.line_left, 10.0);
        assert_eq!(frame.line_right, 110.0);
        assert_eq!(rect.bottom(), 70.0);
        assert!(frame.lines.is_empty());
    }
}
