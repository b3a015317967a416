//! Layout index: geometry of the whole document, kept up to date incrementally.
//!
//! The document is split into chunks of at most [`LayoutConfig::chunk_size`] characters, stored
//! in an ordered-monoid [`Tree`] keyed by [`TextMetrics`]. That makes `offset -> point` and
//! `point -> offset` logarithmic plus the size of one chunk.
//!
//! Chunks are measured lazily. An edit replaces the chunks it touches with a single unmeasured
//! placeholder and marks the region (plus the neighbouring chunks, so a word at the boundary is
//! rewrapped) as undone in a [`WorkAllocator`]. The visible range is then re-measured right
//! away; everything else is picked up by background work, driven through [`Job`].
//!
//! ```text
//!  Document change ──► replace() ──► placeholder chunk + WorkAllocator::undone
//!                                             │
//!                     rechunk(last frame) ◄───┤
//!                     Job::do_work ◄──────────┘  (Scheduler::schedule while work remains)
//! ```

use crate::anchor::{Anchor, OffsetRange};
use crate::document::{Document, DocumentChange, Replacement};
use crate::error::{LayoutError, MeasureError};
use crate::frame::{
    BackgroundRect, Frame, FrameContent, FrameDecorator, FrameLine, ScrollbarMark,
    ScrollbarParams, TextRect, TextRun, join_ranges,
};
use crate::measurer::{
    LineWrappingTextMeasurer, Measurer, PlainTextMeasurer, TextMeasurer, WordWrappingTextMeasurer,
};
use crate::metrics::{Point, RoundMode, TextLookupKey, TextMetrics};
use crate::range_tree::RangeTree;
use crate::scheduler::{Job, Scheduler};
use crate::tree::{Tree, TreeFactory};
use crate::work_allocator::WorkAllocator;
use ropey::Rope;
use std::rc::Rc;

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default number of characters measured by one rechunk pass without wrapping.
pub const DEFAULT_RECHUNK_BUDGET: usize = 10_000_000;
/// Default number of characters measured by one rechunk pass with wrapping.
pub const DEFAULT_WRAPPING_RECHUNK_BUDGET: usize = 5_000_000;

/// How far past its nominal end a chunk may grow to end at a word start. Longer words may wrap
/// differently depending on where chunks end.
const WORD_BOUNDARY_SEARCH: usize = 1024;

/// Tuning knobs of a [`LayoutIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutConfig {
    /// Maximum chunk length, in characters.
    pub chunk_size: usize,
    /// Characters measured by one rechunk pass without wrapping.
    pub rechunk_budget: usize,
    /// Characters measured by one rechunk pass with wrapping.
    pub wrapping_rechunk_budget: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            rechunk_budget: DEFAULT_RECHUNK_BUDGET,
            wrapping_rechunk_budget: DEFAULT_WRAPPING_RECHUNK_BUDGET,
        }
    }
}

/// Soft wrapping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrappingMode {
    /// Lines break at `'\n'` only.
    #[default]
    None,
    /// Wrap at the limit, anywhere.
    Line,
    /// Wrap at the limit between words.
    Word,
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn starts_word(prev: char, ch: char) -> bool {
    prev == '\n' || (!is_word_char(prev) && is_word_char(ch))
}

#[derive(Clone)]
enum ChunkData {
    Unmeasured,
    Measured {
        measurer: Rc<dyn TextMeasurer>,
        state_before: f64,
        state_after: f64,
    },
}

/// Part of a visual line measured by a single text measurer.
struct LineRange {
    from: usize,
    to: usize,
    x: f64,
    measurer: Rc<dyn TextMeasurer>,
}

struct Line {
    y: f64,
    start: usize,
    end: usize,
    ranges: Vec<LineRange>,
}

/// See the module documentation.
pub struct LayoutIndex {
    config: LayoutConfig,
    factory: TreeFactory,
    tree: Tree<ChunkData, TextMetrics>,
    text: Rope,
    measurer: Rc<dyn Measurer>,
    text_measurer: Rc<dyn TextMeasurer>,
    default_width: f64,
    line_height: f64,
    wrapping_mode: WrappingMode,
    wrapping_limit: Option<f64>,
    content_width: f64,
    content_height: f64,
    allocator: WorkAllocator,
    hidden_ranges: RangeTree<()>,
    last_frame_range: OffsetRange,
    scheduler: Rc<dyn Scheduler>,
}

impl LayoutIndex {
    /// Index `document` with the default configuration.
    pub fn new(
        measurer: Rc<dyn Measurer>,
        document: &Document,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self, LayoutError> {
        Self::with_config(LayoutConfig::default(), measurer, document, scheduler)
    }

    /// Index `document` with a custom configuration.
    ///
    /// Nothing is measured synchronously; the whole document is left to background work.
    pub fn with_config(
        config: LayoutConfig,
        measurer: Rc<dyn Measurer>,
        document: &Document,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self, LayoutError> {
        let text = document.text().clone();
        let len = text.len_chars();
        let text_measurer: Rc<dyn TextMeasurer> =
            Rc::new(PlainTextMeasurer::new(measurer.clone()));
        let mut factory = TreeFactory::new();
        let tree = if len > 0 {
            factory.build([(ChunkData::Unmeasured, text_measurer.unmapped_value(len))])
        } else {
            Tree::new()
        };

        let mut index = Self {
            config: LayoutConfig {
                chunk_size: config.chunk_size.max(1),
                ..config
            },
            factory,
            tree,
            text,
            default_width: measurer.default_width(),
            line_height: measurer.line_height(),
            measurer,
            text_measurer,
            wrapping_mode: WrappingMode::None,
            wrapping_limit: None,
            content_width: 0.0,
            content_height: 0.0,
            allocator: WorkAllocator::new(len),
            hidden_ranges: RangeTree::new(),
            last_frame_range: OffsetRange::default(),
            scheduler,
        };
        index.rechunk_last_frame_range()?;
        Ok(index)
    }

    /// Configuration.
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Text snapshot the index is built on.
    pub fn text(&self) -> &Rope {
        &self.text
    }

    /// Line height, in pixels.
    pub fn line_height(&self) -> f64 {
        self.line_height
    }

    /// Default character width, in pixels.
    pub fn default_width(&self) -> f64 {
        self.default_width
    }

    /// Width of the widest line measured so far, in pixels.
    pub fn content_width(&self) -> f64 {
        self.content_width
    }

    /// Height of the content measured so far, in pixels.
    pub fn content_height(&self) -> f64 {
        self.content_height
    }

    /// Current wrapping mode.
    pub fn wrapping_mode(&self) -> WrappingMode {
        self.wrapping_mode
    }

    /// Current wrapping limit, in default-width units.
    pub fn wrapping_limit(&self) -> Option<f64> {
        self.wrapping_limit
    }

    /// Range of the last built frame.
    pub fn last_frame_range(&self) -> OffsetRange {
        self.last_frame_range
    }

    /// Whether some chunks still need measuring.
    pub fn has_pending_work(&self) -> bool {
        self.allocator.has_work()
    }

    /// Switches to another host measurer. Everything is measured again.
    pub fn set_measurer(&mut self, measurer: Rc<dyn Measurer>) -> Result<(), LayoutError> {
        if Rc::ptr_eq(&self.measurer, &measurer) {
            return Ok(());
        }
        self.default_width = measurer.default_width();
        self.line_height = measurer.line_height();
        self.measurer = measurer;
        self.recreate_text_measurer()
    }

    /// Changes soft wrapping. `limit` is in pixels and is required by the wrapping modes; it
    /// must be at least two default widths.
    pub fn set_wrapping_mode(
        &mut self,
        mode: WrappingMode,
        limit: Option<f64>,
    ) -> Result<(), LayoutError> {
        let limit = match mode {
            WrappingMode::None => None,
            WrappingMode::Line | WrappingMode::Word => {
                Some(limit.unwrap_or(0.0) / self.default_width)
            }
        };
        if mode == self.wrapping_mode && limit == self.wrapping_limit {
            return Ok(());
        }
        // An approximation of the widest character.
        if let Some(limit) = limit.filter(|&limit| limit < 2.0) {
            return Err(LayoutError::WrappingLimitTooSmall(limit));
        }

        tracing::debug!(?mode, ?limit, "wrapping mode changed");
        self.wrapping_mode = mode;
        self.wrapping_limit = limit;
        self.recreate_text_measurer()
    }

    /// Hides `[from, to)`: the text takes no space and is skipped by frames. Hidden ranges
    /// follow edits and may not touch each other.
    pub fn hide_range(
        &mut self,
        from: impl Into<Anchor>,
        to: impl Into<Anchor>,
    ) -> Result<(), LayoutError> {
        let (from, to) = (from.into(), to.into());
        if self.hidden_ranges.count_touching(from, to) > 0 {
            return Err(LayoutError::HiddenRangesIntersect);
        }
        self.hidden_ranges.add(from, to, ())?;
        self.allocator.undone(from.offset..to.offset);
        self.rechunk_last_frame_range()
    }

    /// Applies a document change. The last frame range is measured again right away.
    pub fn on_document_changed(&mut self, change: &DocumentChange) -> Result<(), LayoutError> {
        if change.replacements.is_empty() {
            return Ok(());
        }
        for replacement in &change.replacements {
            self.replace(replacement)?;
        }
        self.rechunk_last_frame_range()
    }

    /// Rebuilds every chunk with `chunk_size` characters, measuring the whole document now.
    /// The configured chunk size is used again afterwards.
    pub fn rechunk_with(&mut self, chunk_size: usize) -> Result<(), LayoutError> {
        let config = self.config;
        let len = self.text.len_chars().max(1);
        self.config = LayoutConfig {
            chunk_size: chunk_size.max(1),
            rechunk_budget: len,
            wrapping_rechunk_budget: len,
        };
        self.allocator.undone(..);
        let result = self.rechunk_everything();
        self.config = config;
        result
    }

    /// Point of `offset` in pixels. The offset is clamped to the text.
    pub fn offset_to_point(&self, offset: usize) -> Result<Point, LayoutError> {
        let point = self.offset_to_virtual_point(offset)?;
        Ok(Point::new(
            point.x * self.default_width,
            point.y * self.line_height,
        ))
    }

    /// Offset at `point` (in pixels). The point is clamped to the content.
    pub fn point_to_offset(&self, point: Point, round: RoundMode) -> Result<usize, LayoutError> {
        self.virtual_point_to_offset(
            Point::new(point.x / self.default_width, point.y / self.line_height),
            round,
        )
    }

    /// Builds a frame for the viewport `rect`.
    ///
    /// Decorators see the visible text as a [`FrameContent`] and attach decoration layers,
    /// which are then resolved into positioned runs.
    pub fn build_frame<S: Clone + PartialEq>(
        &mut self,
        rect: TextRect,
        scrollbar: ScrollbarParams,
        decorators: &mut [&mut dyn FrameDecorator<S>],
    ) -> Result<Frame<S>, LayoutError> {
        let (lines, ranges) = self.frame_lines(&rect)?;

        let joined = join_ranges(&ranges, &self.text);
        let total = match (joined.first(), joined.last()) {
            (Some(first), Some(last)) => OffsetRange::new(first.from, last.to),
            _ => OffsetRange::default(),
        };
        let mut content = FrameContent::new(self.text.clone(), total, joined);
        for decorator in decorators.iter_mut() {
            decorator.decorate(&mut content);
        }

        let mut frame = Frame::new(&rect, self.line_height);
        self.build_frame_contents(&mut frame, &lines, &content);
        self.build_frame_scrollbar(&mut frame, &content, &scrollbar)?;

        tracing::trace!(
            from = total.from,
            to = total.to,
            lines = frame.lines.len(),
            "frame built"
        );
        self.last_frame_range = total;
        Ok(frame)
    }

    fn recreate_text_measurer(&mut self) -> Result<(), LayoutError> {
        let measurer = self.measurer.clone();
        self.text_measurer = match (self.wrapping_mode, self.wrapping_limit) {
            (WrappingMode::Line, Some(limit)) => {
                Rc::new(LineWrappingTextMeasurer::new(measurer, limit))
            }
            (WrappingMode::Word, Some(limit)) => {
                Rc::new(WordWrappingTextMeasurer::new(measurer, limit))
            }
            _ => Rc::new(PlainTextMeasurer::new(measurer)),
        };
        self.allocator = WorkAllocator::new(self.text.len_chars());
        self.rechunk_last_frame_range()
    }

    fn replace(&mut self, replacement: &Replacement) -> Result<(), LayoutError> {
        let from = replacement.offset;
        let to = replacement.end();
        let inserted = replacement.inserted_len();

        if self.last_frame_range.from >= to {
            let range = self.last_frame_range;
            self.last_frame_range = OffsetRange::new(
                range.from - (to - from) + inserted,
                range.to - (to - from) + inserted,
            );
        }
        self.text = replacement.after.clone();
        self.allocator.replace(from, to, inserted)?;
        self.hidden_ranges.replace(from, to, inserted)?;

        let split = self
            .tree
            .split(&TextLookupKey::Offset(from), &TextLookupKey::Offset(to));
        let new_from = split.left.value().length;
        let new_to = self
            .text
            .len_chars()
            .saturating_sub(split.right.value().length);

        // Also cover the neighbouring chunks, most likely including the word at the edit
        // boundary, so it is wrapped as a whole.
        let undone_from = new_from - split.left.last().map_or(0, |(_, value)| value.length);
        let undone_to = new_to + split.right.first().map_or(0, |(_, value)| value.length);
        self.allocator.undone(undone_from..undone_to);

        let middle = if new_from != new_to {
            let value = self.text_measurer.unmapped_value(new_to - new_from);
            self.factory.build([(ChunkData::Unmeasured, value)])
        } else {
            Tree::new()
        };
        self.tree = Tree::merge(&split.left, &Tree::merge(&middle, &split.right));
        Ok(())
    }

    fn rechunk_last_frame_range(&mut self) -> Result<(), LayoutError> {
        let range = self.last_frame_range;
        self.rechunk(range.from, range.to)
    }

    fn rechunk_everything(&mut self) -> Result<(), LayoutError> {
        self.rechunk(0, self.text.len_chars())
    }

    fn rechunk(&mut self, from: usize, to: usize) -> Result<(), LayoutError> {
        let mut budget = match self.wrapping_mode {
            WrappingMode::None => self.config.rechunk_budget,
            WrappingMode::Line | WrappingMode::Word => self.config.wrapping_rechunk_budget,
        };
        let mut passes = 0;
        while budget > 0 {
            let Some(range) = self.allocator.work_range(from..to) else {
                break;
            };
            let end = range.to.min(range.from + budget);
            let done = self.rechunk_range(range.from, end, budget)?;
            budget = budget.saturating_sub(done.len());
            passes += 1;
        }

        let metrics = self.tree.value();
        self.content_width = metrics.longest_width * self.default_width;
        self.content_height = (1 + metrics.line_breaks) as f64 * self.line_height;
        if passes > 0 {
            tracing::trace!(from, to, passes, chunks = self.tree.len(), "rechunked");
        }

        if self.allocator.has_work() && !self.scheduler.is_scheduled() {
            tracing::trace!("scheduling background rechunk");
            self.scheduler.schedule();
        }
        Ok(())
    }

    fn rechunk_range(
        &mut self,
        from: usize,
        to: usize,
        budget: usize,
    ) -> Result<OffsetRange, LayoutError> {
        // A boundary inside a word pulls in the chunk before it.
        let mut split_from = from;
        let split = loop {
            let split = self
                .tree
                .split(&TextLookupKey::Offset(split_from), &TextLookupKey::Offset(to));
            let start = split.left.value().length;
            if start == 0 || self.is_word_start(start) {
                break split;
            }
            split_from = start - 1;
        };
        let new_from = split.left.value().length;
        let mut new_to = self
            .text
            .len_chars()
            .saturating_sub(split.right.value().length);

        // Do not measure far past the budget; the rest stays a placeholder.
        let mut correction = None;
        if new_to > new_from + budget + 2 * self.config.chunk_size {
            correction = Some(new_to);
            new_to = self.snap_to_word_start((new_from + budget).max(from + 1), new_to);
        }

        let mut state = match split.left.last() {
            Some((
                ChunkData::Measured {
                    measurer,
                    state_after,
                    ..
                },
                _,
            )) if Rc::ptr_eq(measurer, &self.text_measurer) => *state_after,
            _ => self.text_measurer.empty_state(),
        };

        let mut items = Vec::new();
        let mut offset = new_from;
        let hidden = self
            .hidden_ranges
            .list_touching(new_from, Anchor::left(new_to));
        let boundaries = hidden
            .iter()
            .map(|range| (range.from.offset, range.to.offset))
            .chain([(new_to, new_to)]);
        for (hidden_from, hidden_to) in boundaries {
            let visible_to = hidden_from.clamp(offset, new_to);
            while offset < visible_to {
                let end = self.chunk_end(offset, visible_to);
                let chunk = self.chunk_text(offset, end - offset);
                let (value, state_after) = self.text_measurer.map_value(&chunk, state)?;
                items.push((
                    ChunkData::Measured {
                        measurer: self.text_measurer.clone(),
                        state_before: state,
                        state_after,
                    },
                    value,
                ));
                state = state_after;
                offset = end;
            }

            let hidden_to = hidden_to.clamp(offset, new_to);
            if offset < hidden_to {
                items.push((
                    ChunkData::Unmeasured,
                    self.text_measurer.unmapped_value(hidden_to - offset),
                ));
                offset = hidden_to;
            }
        }

        match correction.filter(|&correction| correction > new_to) {
            Some(correction) => items.push((
                ChunkData::Unmeasured,
                self.text_measurer.unmapped_value(correction - new_to),
            )),
            None => {
                // The next chunk was measured with another state before it.
                if let Some((next, value)) = split.right.first() {
                    let changed = match next {
                        ChunkData::Unmeasured => true,
                        ChunkData::Measured {
                            measurer,
                            state_before,
                            ..
                        } => {
                            !Rc::ptr_eq(measurer, &self.text_measurer)
                                || !self.text_measurer.states_equal(*state_before, state)
                        }
                    };
                    if changed {
                        self.allocator.undone(new_to..new_to + value.length);
                    }
                }
            }
        }

        let middle = self.factory.build(items);
        self.tree = Tree::merge(&split.left, &Tree::merge(&middle, &split.right));
        self.allocator.done(new_from..new_to);
        Ok(OffsetRange::new(new_from, new_to))
    }

    fn chunk_end(&self, from: usize, to: usize) -> usize {
        self.snap_to_word_start((from + self.config.chunk_size).min(to), to)
    }

    /// Word wrapping measures whole words, so in that mode a chunk boundary moves forward to
    /// the next word start (or line start) when one is close enough.
    fn snap_to_word_start(&self, offset: usize, to: usize) -> usize {
        if self.wrapping_mode != WrappingMode::Word || offset == 0 || offset >= to {
            return offset;
        }
        let limit = to.min(offset + WORD_BOUNDARY_SEARCH);
        let mut chars = self.text.chars_at(offset - 1);
        let Some(mut prev) = chars.next() else {
            return offset;
        };
        for (position, ch) in (offset..limit).zip(chars) {
            if starts_word(prev, ch) {
                return position;
            }
            prev = ch;
        }
        limit
    }

    /// Whether a chunk may start at `offset` without splitting a word. Always true unless word
    /// wrapping.
    fn is_word_start(&self, offset: usize) -> bool {
        if self.wrapping_mode != WrappingMode::Word
            || offset == 0
            || offset >= self.text.len_chars()
        {
            return true;
        }
        starts_word(self.text.char(offset - 1), self.text.char(offset))
    }

    fn chunk_text(&self, from: usize, len: usize) -> String {
        self.text.slice(from..from + len).to_string()
    }

    fn clamp_virtual_point(&self, point: Point) -> Point {
        if point.y < 0.0 {
            return Point::new(0.0, 0.0);
        }
        if point.x < 0.0 {
            return Point::new(0.0, point.y);
        }
        let metrics = self.tree.value();
        let max = Point::new(metrics.last_width, metrics.line_breaks as f64);
        if point.y >= max.y + 1.0 {
            return max;
        }
        point
    }

    fn virtual_point_to_offset(&self, point: Point, round: RoundMode) -> Result<usize, LayoutError> {
        let point = self.clamp_virtual_point(point);
        let mut cursor = self.tree.cursor();
        cursor.locate(&TextLookupKey::Point(point));
        let Some(&before) = cursor.before() else {
            return Ok(0);
        };
        match (cursor.data(), cursor.value()) {
            (
                Some(ChunkData::Measured {
                    measurer,
                    state_before,
                    ..
                }),
                Some(value),
            ) => {
                let chunk = self.chunk_text(before.length, value.length);
                let location =
                    measurer.locate_by_point(&chunk, *state_before, &before, point, round)?;
                Ok(location.offset)
            }
            _ => Ok(before.length),
        }
    }

    fn offset_to_virtual_point(&self, offset: usize) -> Result<Point, LayoutError> {
        let offset = offset.min(self.text.len_chars());
        let mut cursor = self.tree.cursor();
        cursor.locate(&TextLookupKey::Offset(offset));
        let Some(&before) = cursor.before() else {
            return Ok(Point::default());
        };
        match (cursor.data(), cursor.value()) {
            (
                Some(ChunkData::Measured {
                    measurer,
                    state_before,
                    ..
                }),
                Some(value),
            ) => {
                let chunk = self.chunk_text(before.length, value.length);
                let location = measurer.locate_by_offset(&chunk, *state_before, &before, offset)?;
                Ok(Point::new(location.x, location.y))
            }
            _ => Ok(Point::new(before.last_width, before.line_breaks as f64)),
        }
    }

    /// Visual lines intersecting `rect`, and the visible ranges in document order.
    fn frame_lines(&self, rect: &TextRect) -> Result<(Vec<Line>, Vec<OffsetRange>), LayoutError> {
        let mut lines = Vec::new();
        let mut ranges = Vec::new();

        if self.tree.is_empty() {
            lines.push(Line {
                y: 0.0,
                start: 0,
                end: 0,
                ranges: vec![LineRange {
                    from: 0,
                    to: 0,
                    x: 0.0,
                    measurer: self.text_measurer.clone(),
                }],
            });
            return Ok((lines, ranges));
        }

        let top = self.point_to_offset(Point::new(rect.left, rect.top), RoundMode::Floor)?;
        let mut y = self.offset_to_point(top)?.y;
        while y <= rect.bottom() {
            let line_y = y / self.line_height;
            let point = self.clamp_virtual_point(Point::new(rect.left / self.default_width, line_y));
            let mut cursor = self.tree.cursor();
            cursor.locate(&TextLookupKey::Point(point));
            let Some(&before) = cursor.before() else {
                break;
            };

            let mut offset = before.length;
            let mut x = before.last_width;
            let mut chunk_text = None;
            match (cursor.data(), cursor.value()) {
                (
                    Some(ChunkData::Measured {
                        measurer,
                        state_before,
                        ..
                    }),
                    Some(value),
                ) => {
                    let chunk = self.chunk_text(offset, value.length);
                    let location = measurer.locate_by_point(
                        &chunk,
                        *state_before,
                        &before,
                        point,
                        RoundMode::Floor,
                    )?;
                    offset = location.offset;
                    x = location.x;
                    chunk_text = Some(chunk);
                }
                (Some(ChunkData::Unmeasured), _) => {}
                _ => {
                    if (before.line_breaks as f64) < line_y {
                        break;
                    }
                }
            }
            x *= self.default_width;

            let mut line = Line {
                y,
                start: self.point_to_offset(Point::new(0.0, y), RoundMode::Floor)?,
                end: self.point_to_offset(Point::new(self.content_width, y), RoundMode::Floor)?,
                ranges: Vec::new(),
            };
            if cursor.after().is_none() {
                line.ranges.push(LineRange {
                    from: offset,
                    to: offset,
                    x,
                    measurer: self.text_measurer.clone(),
                });
                lines.push(line);
                break;
            }

            while x <= rect.right() {
                let (Some(data), Some(&before), Some(&after), Some(&value)) = (
                    cursor.data().cloned(),
                    cursor.before(),
                    cursor.after(),
                    cursor.value(),
                ) else {
                    break;
                };
                match data {
                    ChunkData::Unmeasured => {
                        if before.last_width != after.last_width {
                            return Err(MeasureError::Inconsistent("unmeasured chunk has width").into());
                        }
                    }
                    ChunkData::Measured {
                        measurer,
                        state_before,
                        ..
                    } => {
                        let mut end = after.length;
                        let right = Point::new(rect.right() / self.default_width, line_y);
                        let after_y = after.line_breaks as f64;
                        let overflow = after_y > right.y
                            || (after_y == right.y && after.last_width >= right.x);
                        if overflow {
                            let chunk = match chunk_text.take() {
                                Some(chunk) => chunk,
                                None => self.chunk_text(before.length, value.length),
                            };
                            end = measurer
                                .locate_by_point(&chunk, state_before, &before, right, RoundMode::Ceil)?
                                .offset;
                        }
                        chunk_text = None;

                        ranges.push(OffsetRange::new(offset, end));
                        match line.ranges.last_mut() {
                            Some(prev) if prev.to == offset && Rc::ptr_eq(&prev.measurer, &measurer) => {
                                prev.to = end;
                            }
                            _ => line.ranges.push(LineRange {
                                from: offset,
                                to: end,
                                x,
                                measurer,
                            }),
                        }
                        if overflow {
                            break;
                        }
                    }
                }

                cursor.next();
                let Some(&before) = cursor.before() else {
                    break;
                };
                x = before.last_width * self.default_width;
                offset = before.length;
                if cursor.after().is_none() {
                    break;
                }
            }

            lines.push(line);
            y += self.line_height;
        }
        Ok((lines, ranges))
    }

    fn build_frame_contents<S: Clone + PartialEq>(
        &self,
        frame: &mut Frame<S>,
        lines: &[Line],
        content: &FrameContent<S>,
    ) {
        for line in lines {
            let last_index = line.ranges.len().saturating_sub(1);
            for (index, range) in line.ranges.iter().enumerate() {
                let text = self.chunk_text(range.from, range.to - range.from);
                let chars: Vec<char> = text.chars().collect();
                let map = range.measurer.fill_x_map(&text, range.x, self.default_width);

                for layer in &content.text_decorations {
                    layer.visit_touching(range.from, Anchor::right(range.to), |decoration| {
                        let mut from = range.from.max(decoration.from.offset);
                        let to = range.to.min(decoration.to.offset);
                        while from < to {
                            let mut end = from + 1;
                            while end < to && !map.rtl[end - range.from] {
                                end += 1;
                            }
                            frame.text.push(TextRun {
                                x: map.x[from - range.from],
                                y: line.y,
                                content: chars[from - range.from..end - range.from].iter().collect(),
                                style: decoration.data.clone(),
                            });
                            from = end;
                        }
                    });
                }

                let range_left = if index == 0 {
                    frame.line_left
                } else {
                    map.x[0]
                };
                let range_right = if index == last_index {
                    frame.line_right
                } else {
                    map.x[range.to - range.from]
                };
                // One extra character on both sides catches borders extending past the viewport.
                for layer in &content.background_decorations {
                    layer.visit_touching(range.from.saturating_sub(1), range.to + 1, |decoration| {
                        let from = decoration.from.offset;
                        let to = decoration.to.offset;
                        let left = if from < line.start {
                            range_left
                        } else {
                            map.x[from.clamp(range.from, range.to) - range.from]
                        };
                        let right = if to > line.end {
                            range_right
                        } else {
                            map.x[to.clamp(range.from, range.to) - range.from]
                        };
                        if left <= right {
                            frame.background.push(BackgroundRect {
                                x: left,
                                y: line.y,
                                width: right - left,
                                style: decoration.data.clone(),
                            });
                        }
                    });
                }
            }

            // The line start is excluded so a decoration ending there does not mark this line.
            let mut styles: Vec<S> = Vec::new();
            for decorations in &content.line_decorations {
                let touched = decorations
                    .ranges
                    .count_touching(Anchor::right(line.start), Anchor::right(line.end))
                    > 0;
                if touched && !styles.contains(&decorations.style) {
                    styles.push(decorations.style.clone());
                }
            }
            frame.lines.push(FrameLine {
                first: self.text.char_to_line(line.start),
                last: self.text.char_to_line(line.end),
                y: line.y,
                styles,
            });
        }
    }

    fn build_frame_scrollbar<S: Clone>(
        &self,
        frame: &mut Frame<S>,
        content: &FrameContent<S>,
        params: &ScrollbarParams,
    ) -> Result<(), LayoutError> {
        if params.ratio <= 0.0 {
            return Ok(());
        }
        for decorations in &content.line_decorations {
            let mut current: Option<(f64, f64)> = None;
            let mut error = None;
            decorations.ranges.sparse_visit_all(|decoration| {
                let (top, bottom, next) =
                    match self.scrollbar_extent(decoration.from.offset, decoration.to.offset, params) {
                        Ok(extent) => extent,
                        Err(err) => {
                            error = Some(err);
                            return Anchor::MAX;
                        }
                    };
                let merged = match current.as_mut() {
                    Some((_, last_bottom)) if top <= *last_bottom => {
                        *last_bottom = bottom;
                        true
                    }
                    _ => false,
                };
                if !merged {
                    if let Some((last_top, last_bottom)) = current.replace((top, bottom)) {
                        frame.scrollbar.push(ScrollbarMark {
                            y: last_top,
                            height: last_bottom - last_top,
                            style: decorations.style.clone(),
                        });
                    }
                }
                decoration.to.max(Anchor::left(next))
            })?;
            if let Some(err) = error {
                return Err(err);
            }
            if let Some((top, bottom)) = current {
                frame.scrollbar.push(ScrollbarMark {
                    y: top,
                    height: bottom - top,
                    style: decorations.style.clone(),
                });
            }
        }
        Ok(())
    }

    /// Top and bottom of the scrollbar mark for `[from, to)`, and the first offset below it.
    fn scrollbar_extent(
        &self,
        from: usize,
        to: usize,
        params: &ScrollbarParams,
    ) -> Result<(f64, f64, usize), LayoutError> {
        let top = self.offset_to_point(from)?.y * params.ratio;
        let bottom = ((self.offset_to_point(to)?.y + self.line_height) * params.ratio)
            .max(top + params.min_decoration_height);
        let next = self.point_to_offset(Point::new(0.0, bottom / params.ratio), RoundMode::Floor)?;
        Ok((top, bottom, next))
    }
}

impl Job for LayoutIndex {
    fn do_work(&mut self) -> bool {
        if let Err(err) = self.rechunk_everything() {
            tracing::warn!(%err, "background rechunk failed");
            return false;
        }
        self.allocator.has_work()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurer::CellMeasurer;
    use crate::scheduler::SyncScheduler;
    use pretty_assertions::assert_eq;

    /// `'a'..='z'` measure their index plus one, everything else 100. Lines are 3 pixels high.
    struct LetterMeasurer;

    impl Measurer for LetterMeasurer {
        fn default_width(&self) -> f64 {
            1.0
        }

        fn line_height(&self) -> f64 {
            3.0
        }

        fn measure_string(&self, s: &str) -> f64 {
            match s.chars().next() {
                Some(ch @ 'a'..='z') => (ch as u32 - 'a' as u32 + 1) as f64,
                _ => 100.0,
            }
        }
    }

    fn letter_width(s: &str) -> f64 {
        s.chars().map(|ch| (ch as u32 - 'a' as u32 + 1) as f64).sum()
    }

    fn index_with(
        measurer: Rc<dyn Measurer>,
        document: &Document,
    ) -> (Rc<SyncScheduler>, LayoutIndex) {
        let scheduler = Rc::new(SyncScheduler::new());
        let mut index = LayoutIndex::new(measurer, document, scheduler.clone()).unwrap();
        scheduler.run_until_idle(&mut index);
        (scheduler, index)
    }

    /// The Park-Miller generator, so the scenario is stable.
    fn lehmer(seed: u64) -> impl FnMut() -> usize {
        let mut seed = seed;
        move || {
            seed = seed * 48271 % 2147483647;
            seed as usize
        }
    }

    #[test]
    fn test_replace_at_chunk_boundary() {
        let mut document = Document::from_text(&"a".repeat(6835));
        let (scheduler, mut index) = index_with(Rc::new(LetterMeasurer), &document);
        assert_eq!(index.content_width(), 6835.0);

        let change = document.replace(1674, 6835, "");
        index.on_document_changed(&change).unwrap();
        assert!(scheduler.is_scheduled());
        scheduler.run_until_idle(&mut index);
        assert_eq!(index.content_width(), 1674.0);
        assert!(!index.has_pending_work());
    }

    #[test]
    fn test_rechunk_wide_characters() {
        let document = Document::from_text("😀😀😀😀😀😀");
        let (_, mut index) = index_with(Rc::new(LetterMeasurer), &document);
        index.rechunk_with(3).unwrap();
        assert_eq!(index.content_width(), 600.0);
        assert_eq!(index.offset_to_point(4).unwrap(), Point::new(400.0, 0.0));
    }

    #[test]
    fn test_points_for_all_chunk_sizes() {
        struct Query {
            offset: usize,
            x: f64,
            y: f64,
            rounded: bool,
            beyond: Option<f64>,
        }

        let query = |offset, x, y| Query {
            offset,
            x,
            y,
            rounded: false,
            beyond: None,
        };

        let alphabet = "abcdefghijklmnopqrstuvwxyz";
        let mut random = lehmer(143);
        let line_count = 200;
        let mut content = String::new();
        let mut longest: f64 = 0.0;
        let mut queries = Vec::new();
        let mut offset = 0;
        for i in 0..line_count {
            let length = 1 + random() % (alphabet.len() - 1);
            let line = &alphabet[..length];
            let width = letter_width(line);
            let y = (i * 3) as f64;
            longest = longest.max(width);
            content.push_str(line);
            content.push('\n');

            queries.push(Query {
                rounded: true,
                ..query(offset, 0.0, y)
            });
            queries.push(query(offset + 1, 1.0, y));
            queries.push(query(offset + length, width, y));
            queries.push(Query {
                beyond: Some(width + 3.0),
                ..query(offset + length, width, y)
            });
            queries.push(Query {
                beyond: Some(width + 100.0),
                ..query(offset + length, width, y)
            });
            let column = random() % length;
            queries.push(query(offset + column, letter_width(&line[..column]), y));
            offset += length + 1;
        }
        let len = content.chars().count();
        let bottom = (line_count * 3) as f64;
        queries.push(query(len, 0.0, bottom));
        queries.push(Query {
            beyond: Some(15.0),
            ..query(len, 0.0, bottom)
        });

        let document = Document::from_text(&content);
        for chunk_size in 1..=100 {
            let (_, mut index) = index_with(Rc::new(LetterMeasurer), &document);
            index.rechunk_with(chunk_size).unwrap();
            assert_eq!(index.content_width(), longest);
            assert_eq!(index.content_height(), ((line_count + 1) * 3) as f64);
            assert_eq!(index.offset_to_point(0).unwrap(), Point::new(0.0, 0.0));
            assert_eq!(index.offset_to_point(len).unwrap(), Point::new(0.0, bottom));
            assert_eq!(index.offset_to_point(len + 1).unwrap(), Point::new(0.0, bottom));

            let at = |x: f64, y: f64, round: RoundMode| {
                index.point_to_offset(Point::new(x, y), round).unwrap()
            };
            for q in &queries {
                if let Some(x) = q.beyond {
                    assert_eq!(at(x, q.y, RoundMode::Floor), q.offset, "chunk size {chunk_size}");
                    continue;
                }
                assert_eq!(
                    index.offset_to_point(q.offset).unwrap(),
                    Point::new(q.x, q.y),
                    "offset {} with chunk size {chunk_size}",
                    q.offset
                );
                assert_eq!(at(q.x, q.y, RoundMode::Floor), q.offset);
                assert_eq!(at(q.x + 0.5, q.y + 0.5, RoundMode::Floor), q.offset);
                if q.rounded {
                    assert_eq!(at(q.x + 0.4, q.y, RoundMode::Round), q.offset);
                    assert_eq!(at(q.x + 0.5, q.y, RoundMode::Round), q.offset);
                    assert_eq!(at(q.x + 0.6, q.y, RoundMode::Round), q.offset + 1);
                    assert_eq!(at(q.x, q.y, RoundMode::Ceil), q.offset);
                    assert_eq!(at(q.x + 0.5, q.y, RoundMode::Ceil), q.offset + 1);
                    assert_eq!(at(q.x + 1.0, q.y, RoundMode::Ceil), q.offset + 1);
                }
            }
        }
    }

    #[test]
    fn test_points_are_clamped() {
        let document = Document::from_text("abc\nde");
        let (_, index) = index_with(Rc::new(LetterMeasurer), &document);
        assert_eq!(index.point_to_offset(Point::new(5.0, -1.0), RoundMode::Floor).unwrap(), 0);
        assert_eq!(index.point_to_offset(Point::new(-5.0, 3.0), RoundMode::Floor).unwrap(), 4);
        assert_eq!(index.point_to_offset(Point::new(0.0, 300.0), RoundMode::Floor).unwrap(), 6);
        assert_eq!(index.offset_to_point(100).unwrap(), Point::new(9.0, 3.0));
    }

    #[test]
    fn test_empty_document() {
        let document = Document::new();
        let (scheduler, mut index) = index_with(Rc::new(LetterMeasurer), &document);
        assert!(!scheduler.is_scheduled());
        assert_eq!(index.content_width(), 0.0);
        assert_eq!(index.content_height(), 3.0);
        assert_eq!(index.offset_to_point(10).unwrap(), Point::default());
        assert_eq!(index.point_to_offset(Point::new(10.0, 10.0), RoundMode::Floor).unwrap(), 0);

        let frame: Frame = index
            .build_frame(
                TextRect::new(0.0, 0.0, 100.0, 100.0),
                ScrollbarParams {
                    ratio: 1.0,
                    min_decoration_height: 0.0,
                },
                &mut [],
            )
            .unwrap();
        assert_eq!(frame.lines.len(), 1);
        assert_eq!(frame.lines[0].first, 0);
    }

    #[test]
    fn test_line_wrapping_is_chunking_independent() {
        let text = "the quick brown fox\njumps over\n\nthe lazy dog and keeps running";
        let document = Document::from_text(text);
        let (scheduler, mut index) = index_with(Rc::new(CellMeasurer::new()), &document);
        index.set_wrapping_mode(WrappingMode::Line, Some(7.0)).unwrap();
        scheduler.run_until_idle(&mut index);
        let height = index.content_height();
        let ends: Vec<Point> = (0..=text.len())
            .map(|offset| index.offset_to_point(offset).unwrap())
            .collect();
        assert_eq!(index.content_width(), 7.0);
        // 19 -> 3 lines, 10 -> 2, empty -> 1, 30 -> 5.
        assert_eq!(height, 11.0);

        for chunk_size in 1..=20 {
            index.rechunk_with(chunk_size).unwrap();
            assert_eq!(index.content_height(), height, "chunk size {chunk_size}");
            for (offset, point) in ends.iter().enumerate() {
                assert_eq!(index.offset_to_point(offset).unwrap(), *point);
                assert_eq!(index.point_to_offset(*point, RoundMode::Floor).unwrap(), offset);
            }
        }
    }

    #[test]
    fn test_word_wrapping_is_chunking_independent() {
        let text = "the quick brown fox\njumps over\n\nthe lazy dog and keeps running";
        let document = Document::from_text(text);
        let (scheduler, mut index) = index_with(Rc::new(CellMeasurer::new()), &document);
        index.set_wrapping_mode(WrappingMode::Word, Some(7.0)).unwrap();
        scheduler.run_until_idle(&mut index);
        let ends: Vec<Point> = (0..=text.len())
            .map(|offset| index.offset_to_point(offset).unwrap())
            .collect();
        assert_eq!(index.content_width(), 7.0);
        assert_eq!(index.content_height(), 13.0);

        for chunk_size in 1..=20 {
            index.rechunk_with(chunk_size).unwrap();
            assert_eq!(index.content_height(), 13.0, "chunk size {chunk_size}");
            for (offset, point) in ends.iter().enumerate() {
                assert_eq!(index.offset_to_point(offset).unwrap(), *point);
                assert_eq!(index.point_to_offset(*point, RoundMode::Floor).unwrap(), offset);
            }
        }
    }

    #[test]
    fn test_word_wrapping() {
        let document = Document::from_text("hello big world");
        let (scheduler, mut index) = index_with(Rc::new(CellMeasurer::new()), &document);
        assert_eq!(index.content_width(), 15.0);

        index.set_wrapping_mode(WrappingMode::Word, Some(10.0)).unwrap();
        scheduler.run_until_idle(&mut index);
        assert_eq!(index.wrapping_limit(), Some(10.0));
        assert_eq!(index.content_width(), 10.0);
        assert_eq!(index.content_height(), 2.0);
        assert_eq!(index.offset_to_point(10).unwrap(), Point::new(0.0, 1.0));
        assert_eq!(index.offset_to_point(12).unwrap(), Point::new(2.0, 1.0));

        assert_eq!(
            index.set_wrapping_mode(WrappingMode::Word, Some(1.5)),
            Err(LayoutError::WrappingLimitTooSmall(1.5))
        );
        index.set_wrapping_mode(WrappingMode::None, None).unwrap();
        scheduler.run_until_idle(&mut index);
        assert_eq!(index.content_height(), 1.0);
    }

    #[test]
    fn test_wrapping_limit_is_in_pixels() {
        let measurer = CellMeasurer::new().with_cell_width(8.0).with_line_height(16.0);
        let document = Document::from_text("abcdefghij");
        let (scheduler, mut index) = index_with(Rc::new(measurer), &document);
        index.set_wrapping_mode(WrappingMode::Line, Some(32.0)).unwrap();
        scheduler.run_until_idle(&mut index);
        assert_eq!(index.wrapping_limit(), Some(4.0));
        assert_eq!(index.content_width(), 32.0);
        assert_eq!(index.content_height(), 48.0);
        assert_eq!(index.offset_to_point(5).unwrap(), Point::new(8.0, 16.0));
    }

    #[test]
    fn test_hidden_ranges() {
        let mut document = Document::from_text("aaaa\nbbbb\ncccc");
        let (scheduler, mut index) = index_with(Rc::new(CellMeasurer::new()), &document);
        assert_eq!(index.content_height(), 3.0);

        index.hide_range(4usize, 10usize).unwrap();
        scheduler.run_until_idle(&mut index);
        assert_eq!(index.content_height(), 1.0);
        assert_eq!(index.content_width(), 8.0);
        assert_eq!(index.offset_to_point(7).unwrap(), Point::new(4.0, 0.0));
        assert_eq!(index.offset_to_point(12).unwrap(), Point::new(6.0, 0.0));

        assert_eq!(
            index.hide_range(9usize, 12usize),
            Err(LayoutError::HiddenRangesIntersect)
        );

        // The hidden range follows edits.
        let change = document.replace(0, 0, "zz");
        index.on_document_changed(&change).unwrap();
        scheduler.run_until_idle(&mut index);
        assert_eq!(index.content_height(), 1.0);
        assert_eq!(index.content_width(), 10.0);
    }

    #[test]
    fn test_edits_measure_last_frame_synchronously() {
        let mut document = Document::from_text("abc\ndef\nghi");
        let (scheduler, mut index) = index_with(Rc::new(CellMeasurer::new()), &document);
        let mut none: [&mut dyn FrameDecorator<String>; 0] = [];
        index
            .build_frame(
                TextRect::new(0.0, 0.0, 100.0, 10.0),
                ScrollbarParams {
                    ratio: 1.0,
                    min_decoration_height: 0.0,
                },
                &mut none,
            )
            .unwrap();
        assert_eq!(index.last_frame_range(), OffsetRange::new(0, 11));

        let change = document.replace(1, 1, "xx");
        index.on_document_changed(&change).unwrap();
        assert_eq!(index.last_frame_range(), OffsetRange::new(0, 11));
        assert_eq!(index.content_width(), 5.0);
        assert!(!index.has_pending_work());
        assert_eq!(scheduler.run_until_idle(&mut index), 0);

        // Text inserted before the frame shifts it and is measured later.
        let change = document.replace(0, 0, "zz");
        index.on_document_changed(&change).unwrap();
        assert_eq!(index.last_frame_range(), OffsetRange::new(2, 13));
        assert!(index.has_pending_work());
        assert!(scheduler.run_until_idle(&mut index) > 0);
        assert_eq!(index.content_width(), 7.0);
    }

    #[test]
    fn test_build_frame() {
        let document = Document::from_text("abc\ndef\nghi");
        let (_, mut index) = index_with(Rc::new(CellMeasurer::new()), &document);

        let mut decorate = |content: &mut FrameContent<String>| {
            assert_eq!(content.range, OffsetRange::new(0, 11));
            assert_eq!(content.ranges.len(), 1);
            assert_eq!(content.ranges[0].content(0, 0), "abc\ndef\nghi");

            let mut text = RangeTree::new();
            text.add(content.range.from, content.range.to, "text".to_string())
                .unwrap();
            content.text_decorations.push(text);

            let mut background = RangeTree::new();
            background.add(1usize, 2usize, "selection".to_string()).unwrap();
            content.background_decorations.push(background);

            let mut marks = RangeTree::new();
            marks.add(4usize, 5usize, ()).unwrap();
            content.line_decorations.push(crate::frame::LineDecorations {
                style: "error".to_string(),
                ranges: marks,
            });
        };
        let frame = index
            .build_frame::<String>(
                TextRect::new(0.0, 0.0, 100.0, 10.0),
                ScrollbarParams {
                    ratio: 1.0,
                    min_decoration_height: 0.0,
                },
                &mut [&mut decorate],
            )
            .unwrap();

        let runs: Vec<(&str, f64, f64)> = frame
            .text
            .iter()
            .map(|run| (run.content.as_str(), run.x, run.y))
            .collect();
        assert_eq!(runs, vec![("abc", 0.0, 0.0), ("def", 0.0, 1.0), ("ghi", 0.0, 2.0)]);
        assert_eq!(
            frame.background,
            vec![BackgroundRect {
                x: 1.0,
                y: 0.0,
                width: 1.0,
                style: "selection".to_string()
            }]
        );
        let lines: Vec<(usize, usize, Vec<String>)> = frame
            .lines
            .iter()
            .map(|line| (line.first, line.last, line.styles.clone()))
            .collect();
        assert_eq!(
            lines,
            vec![
                (0, 0, vec![]),
                (1, 1, vec!["error".to_string()]),
                (2, 2, vec![]),
            ]
        );
        assert_eq!(
            frame.scrollbar,
            vec![ScrollbarMark {
                y: 1.0,
                height: 1.0,
                style: "error".to_string()
            }]
        );
        assert_eq!(frame.line_height, 1.0);
    }

    #[test]
    fn test_frame_is_clipped_to_viewport() {
        let text = (0..50).map(|i| format!("line{i:02} tail")).collect::<Vec<_>>().join("\n");
        let document = Document::from_text(&text);
        let (_, mut index) = index_with(Rc::new(CellMeasurer::new()), &document);

        let mut decorate = |content: &mut FrameContent<String>| {
            let mut layer = RangeTree::new();
            layer.add(0usize, content.text.len_chars(), "t".to_string()).unwrap();
            content.text_decorations.push(layer);
        };
        let frame = index
            .build_frame::<String>(
                TextRect::new(0.0, 10.0, 5.0, 2.0),
                ScrollbarParams {
                    ratio: 0.5,
                    min_decoration_height: 1.0,
                },
                &mut [&mut decorate],
            )
            .unwrap();
        let runs: Vec<&str> = frame.text.iter().map(|run| run.content.as_str()).collect();
        assert_eq!(runs, vec!["line1", "line1", "line1"]);
        assert_eq!(frame.lines.iter().map(|line| line.first).collect::<Vec<_>>(), vec![10, 11, 12]);
        assert_eq!(index.last_frame_range(), OffsetRange::new(140, 173));
    }

    #[test]
    fn test_background_work_runs_as_job() {
        let document = Document::from_text(&"word ".repeat(3000));
        let scheduler = Rc::new(SyncScheduler::new());
        let config = LayoutConfig {
            chunk_size: 100,
            rechunk_budget: 1000,
            wrapping_rechunk_budget: 1000,
        };
        let mut index =
            LayoutIndex::with_config(config, Rc::new(CellMeasurer::new()), &document, scheduler.clone())
                .unwrap();
        assert!(index.has_pending_work());
        assert!(scheduler.is_scheduled());
        assert_eq!(index.content_width(), 0.0);

        let slices = scheduler.run_until_idle(&mut index);
        assert_eq!(slices, 15);
        assert!(!index.has_pending_work());
        assert_eq!(index.content_width(), 15000.0);
    }
}
