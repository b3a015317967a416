//! Text measurement: turning chunks of text into [`TextMetrics`] and locating positions
//! inside a measured chunk.
//!
//! Two layers live here:
//! - [`Measurer`] is supplied by the host (font metrics, terminal cells, ...). It only knows how
//!   wide a string is.
//! - [`TextMeasurer`] is the strategy the layout index stores next to every chunk. It maps a chunk
//!   to its metrics, carrying a wrapping state from chunk to chunk, and answers point/offset
//!   queries within the chunk. [`PlainTextMeasurer`] breaks lines at `'\n'` only,
//!   [`LineWrappingTextMeasurer`] and [`WordWrappingTextMeasurer`] also wrap at a width limit.
//!
//! All widths produced by text measurers are in default-width units.

use crate::error::MeasureError;
use crate::metrics::{Location, Point, RoundMode, TextMetrics};
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;
use unicode_width::UnicodeWidthChar;

/// Host-provided string measurement.
pub trait Measurer {
    /// Width of a default-width character. Must be positive.
    fn default_width(&self) -> f64;

    /// Height of a line.
    fn line_height(&self) -> f64;

    /// Matches strings made only of default-width characters (and `'\n'`). Used as a fast path.
    fn default_width_regex(&self) -> Option<Regex> {
        None
    }

    /// Width of a string with no line breaks.
    fn measure_string(&self, s: &str) -> f64;
}

/// Default number of cells a tab occupies.
pub const DEFAULT_TAB_WIDTH: usize = 4;

static PRINTABLE_ASCII: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\n\x20-\x7e]*$").expect("valid printable ascii regex"));

/// Monospace [`Measurer`]: every character occupies a whole number of cells, as reported by
/// `unicode-width`.
#[derive(Debug, Clone)]
pub struct CellMeasurer {
    cell_width: f64,
    line_height: f64,
    tab_width: usize,
}

impl Default for CellMeasurer {
    fn default() -> Self {
        Self::new()
    }
}

impl CellMeasurer {
    /// One unit per cell and per line.
    pub fn new() -> Self {
        Self {
            cell_width: 1.0,
            line_height: 1.0,
            tab_width: DEFAULT_TAB_WIDTH,
        }
    }

    /// Sets the width of a single cell.
    pub fn with_cell_width(mut self, cell_width: f64) -> Self {
        self.cell_width = cell_width;
        self
    }

    /// Sets the line height.
    pub fn with_line_height(mut self, line_height: f64) -> Self {
        self.line_height = line_height;
        self
    }

    /// Sets how many cells a tab occupies.
    pub fn with_tab_width(mut self, tab_width: usize) -> Self {
        self.tab_width = tab_width;
        self
    }

    fn cells(&self, ch: char) -> usize {
        if ch == '\t' {
            self.tab_width
        } else {
            UnicodeWidthChar::width(ch).unwrap_or(1)
        }
    }
}

impl Measurer for CellMeasurer {
    fn default_width(&self) -> f64 {
        self.cell_width
    }

    fn line_height(&self) -> f64 {
        self.line_height
    }

    fn default_width_regex(&self) -> Option<Regex> {
        Some(PRINTABLE_ASCII.clone())
    }

    fn measure_string(&self, s: &str) -> f64 {
        s.chars().map(|ch| self.cells(ch)).sum::<usize>() as f64 * self.cell_width
    }
}

/// Whether a code point belongs to a right-to-left script.
pub fn is_rtl_code_point(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x0590..=0x089F
            | 0x200F
            | 0xFB1D..=0xFDFF
            | 0xFE70..=0xFEFF
            | 0x10800..=0x10FFF
            | 0x1E800..=0x1EFFF
    )
}

/// X coordinates of every offset in a single line, see [`TextMeasurer::fill_x_map`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XMap {
    /// `x[i]` is the x coordinate before the `i`-th character; `x.len() == chars + 1`.
    pub x: Vec<f64>,
    /// `rtl[i]` is set when the `i`-th character is right-to-left and must be drawn as its own
    /// run; `rtl.len() == chars + 1`.
    pub rtl: Vec<bool>,
}

/// Chunk measuring strategy stored alongside every measured chunk.
///
/// The state is the width already occupied on the current visual line when the chunk starts.
/// Measurers that do not wrap ignore it.
pub trait TextMeasurer {
    /// Metrics of `s` and the state to pass to the next chunk.
    fn map_value(&self, s: &str, state: f64) -> Result<(TextMetrics, f64), MeasureError>;

    /// Placeholder metrics for `length` characters that have not been measured yet.
    fn unmapped_value(&self, length: usize) -> TextMetrics {
        TextMetrics {
            length,
            ..TextMetrics::default()
        }
    }

    /// State at the start of the document.
    fn empty_state(&self) -> f64 {
        0.0
    }

    /// Whether two states produce the same measurements.
    fn states_equal(&self, a: f64, b: f64) -> bool;

    /// Locates `point` in `s`, where `before` is the combined metrics of everything preceding
    /// `s`. The returned location is absolute. `point` must not precede the chunk start.
    fn locate_by_point(
        &self,
        s: &str,
        state: f64,
        before: &TextMetrics,
        point: Point,
        round: RoundMode,
    ) -> Result<Location, MeasureError>;

    /// Locates the absolute `offset`, which must fall inside `s`.
    fn locate_by_offset(
        &self,
        s: &str,
        state: f64,
        before: &TextMetrics,
        offset: usize,
    ) -> Result<Location, MeasureError>;

    /// Per-offset x coordinates of `s`, starting at `start_x`, with widths scaled by
    /// `multiplier`. `s` must fit on a single line.
    fn fill_x_map(&self, s: &str, start_x: f64, multiplier: f64) -> XMap;
}

/// A chunk split into characters, with the default-width fast path decided once.
struct Chars {
    chars: Vec<char>,
    width_one: bool,
}

impl Chars {
    fn len(&self) -> usize {
        self.chars.len()
    }

    fn find_line_break(&self, from: usize) -> Option<usize> {
        self.chars[from..]
            .iter()
            .position(|&ch| ch == '\n')
            .map(|i| from + i)
    }
}

/// Per-character width cache over a [`Measurer`], in default-width units.
struct WidthCache {
    measurer: Rc<dyn Measurer>,
    default_width: f64,
    width_one: Option<Regex>,
    widths: RefCell<HashMap<char, f64>>,
}

impl WidthCache {
    fn new(measurer: Rc<dyn Measurer>) -> Self {
        Self {
            default_width: measurer.default_width(),
            width_one: measurer.default_width_regex(),
            measurer,
            widths: RefCell::new(HashMap::new()),
        }
    }

    fn chars(&self, s: &str) -> Chars {
        Chars {
            chars: s.chars().collect(),
            width_one: self.width_one.as_ref().is_some_and(|re| re.is_match(s)),
        }
    }

    fn char_width(&self, ch: char) -> f64 {
        if let Some(&width) = self.widths.borrow().get(&ch) {
            return width;
        }
        let mut buf = [0u8; 4];
        let width = self.measurer.measure_string(ch.encode_utf8(&mut buf)) / self.default_width;
        self.widths.borrow_mut().insert(ch, width);
        width
    }

    /// Width of `[from, to)`, which must not contain line breaks.
    fn measure(&self, text: &Chars, from: usize, to: usize) -> Result<f64, MeasureError> {
        if from >= to {
            return Ok(0.0);
        }
        if text.width_one {
            return Ok((to - from) as f64);
        }
        let mut result = 0.0;
        for &ch in &text.chars[from..to] {
            if ch == '\n' {
                return Err(MeasureError::LineBreak);
            }
            result += self.char_width(ch);
        }
        Ok(result)
    }

    /// Finds the offset in `[from, to)` at which the running width reaches `width`.
    ///
    /// Returns `None` as the offset when the whole range is narrower than `width`, together with
    /// the width actually covered.
    fn locate_by_width(
        &self,
        text: &Chars,
        from: usize,
        to: usize,
        width: f64,
        round: RoundMode,
    ) -> Result<(Option<usize>, f64), MeasureError> {
        if width <= 0.0 {
            return Ok((Some(from), 0.0));
        }

        if text.width_one {
            let total = (to - from) as f64;
            if width > total {
                return Ok((None, total));
            }
            let whole = width.floor();
            let offset = from + whole as usize;
            if whole == width || round == RoundMode::Floor {
                return Ok((Some(offset), whole));
            }
            if round == RoundMode::Ceil || width - whole > whole + 1.0 - width {
                return Ok((Some(offset + 1), whole + 1.0));
            }
            return Ok((Some(offset), whole));
        }

        let mut w = 0.0;
        for offset in from..to {
            let ch = text.chars[offset];
            if ch == '\n' {
                return Err(MeasureError::LineBreak);
            }
            let next_w = w + self.char_width(ch);
            if next_w > width {
                if w == width || round == RoundMode::Floor {
                    return Ok((Some(offset), w));
                }
                if round == RoundMode::Ceil || width - w > next_w - width {
                    return Ok((Some(offset + 1), next_w));
                }
                return Ok((Some(offset), w));
            }
            w = next_w;
        }

        if w < width {
            Ok((None, w))
        } else {
            Ok((Some(to), w))
        }
    }

    fn fill_x_map(&self, s: &str, start_x: f64, multiplier: f64) -> XMap {
        let mut x = start_x;
        let mut map = XMap {
            x: vec![x],
            rtl: Vec::new(),
        };
        for ch in s.chars() {
            map.rtl.push(is_rtl_code_point(ch));
            x += self.char_width(ch) * multiplier;
            map.x.push(x);
        }
        map.rtl.push(false);
        map
    }
}

/// A visual line found inside a chunk.
struct LineSpan {
    start: usize,
    end: usize,
    x: f64,
    y: f64,
}

/// Line lookups that differ between wrapping strategies.
trait LineLocator {
    fn cache(&self) -> &WidthCache;

    fn locate_line_by_point(
        &self,
        text: &Chars,
        state: f64,
        x: f64,
        y: f64,
        point: Point,
    ) -> Result<LineSpan, MeasureError>;

    /// Returns the start offset, x and y of the line containing the chunk-relative `offset`.
    fn locate_line_by_offset(
        &self,
        text: &Chars,
        state: f64,
        offset: usize,
        x: f64,
        y: f64,
    ) -> Result<(usize, f64, f64), MeasureError>;
}

fn locate_by_point<L: LineLocator>(
    locator: &L,
    s: &str,
    state: f64,
    before: &TextMetrics,
    point: Point,
    round: RoundMode,
) -> Result<Location, MeasureError> {
    let x = before.last_width;
    let y = before.line_breaks as f64;
    if point.y < y || (point.y < y + 1.0 && point.x < x) {
        return Err(MeasureError::Inconsistent("point precedes the chunk"));
    }

    let text = locator.cache().chars(s);
    let line = locator.locate_line_by_point(&text, state, x, y, point)?;
    let (offset, width) =
        locator
            .cache()
            .locate_by_width(&text, line.start, line.end, point.x - line.x, round)?;
    Ok(Location {
        offset: before.length + offset.unwrap_or(line.end),
        x: line.x + width,
        y: line.y,
    })
}

fn locate_by_offset<L: LineLocator>(
    locator: &L,
    s: &str,
    state: f64,
    before: &TextMetrics,
    offset: usize,
) -> Result<Location, MeasureError> {
    let text = locator.cache().chars(s);
    let Some(relative) = offset
        .checked_sub(before.length)
        .filter(|&relative| relative <= text.len())
    else {
        return Err(MeasureError::Inconsistent("offset outside of the chunk"));
    };

    let (line_start, x, y) = locator.locate_line_by_offset(
        &text,
        state,
        relative,
        before.last_width,
        before.line_breaks as f64,
    )?;
    let width = locator.cache().measure(&text, line_start, relative)?;
    Ok(Location {
        offset,
        x: x + width,
        y,
    })
}

/// Breaks lines at `'\n'` only.
pub struct PlainTextMeasurer {
    cache: WidthCache,
}

impl PlainTextMeasurer {
    /// Create a measurer over a host [`Measurer`].
    pub fn new(measurer: Rc<dyn Measurer>) -> Self {
        Self {
            cache: WidthCache::new(measurer),
        }
    }
}

impl LineLocator for PlainTextMeasurer {
    fn cache(&self) -> &WidthCache {
        &self.cache
    }

    fn locate_line_by_point(
        &self,
        text: &Chars,
        _state: f64,
        mut x: f64,
        mut y: f64,
        point: Point,
    ) -> Result<LineSpan, MeasureError> {
        let mut start = 0;
        while y + 1.0 <= point.y {
            let line_break = text
                .find_line_break(start)
                .ok_or(MeasureError::Inconsistent("point below the chunk"))?;
            y += 1.0;
            x = 0.0;
            start = line_break + 1;
        }
        let end = text.find_line_break(start).unwrap_or(text.len());
        Ok(LineSpan { start, end, x, y })
    }

    fn locate_line_by_offset(
        &self,
        text: &Chars,
        _state: f64,
        offset: usize,
        mut x: f64,
        mut y: f64,
    ) -> Result<(usize, f64, f64), MeasureError> {
        let mut start = 0;
        while let Some(line_break) = text.find_line_break(start).filter(|&lb| lb < offset) {
            y += 1.0;
            x = 0.0;
            start = line_break + 1;
        }
        Ok((start, x, y))
    }
}

impl TextMeasurer for PlainTextMeasurer {
    fn map_value(&self, s: &str, state: f64) -> Result<(TextMetrics, f64), MeasureError> {
        let text = self.cache.chars(s);
        let mut metrics = TextMetrics {
            length: text.len(),
            ..TextMetrics::default()
        };
        let mut start = 0;
        loop {
            let line_break = text.find_line_break(start);
            let width = self
                .cache
                .measure(&text, start, line_break.unwrap_or(text.len()))?;
            if start == 0 {
                metrics.first_width = width;
            }
            metrics.longest_width = metrics.longest_width.max(width);
            match line_break {
                Some(line_break) => {
                    metrics.line_breaks += 1;
                    start = line_break + 1;
                }
                None => {
                    metrics.last_width = width;
                    break;
                }
            }
        }
        Ok((metrics, state))
    }

    fn states_equal(&self, _a: f64, _b: f64) -> bool {
        true
    }

    fn locate_by_point(
        &self,
        s: &str,
        state: f64,
        before: &TextMetrics,
        point: Point,
        round: RoundMode,
    ) -> Result<Location, MeasureError> {
        locate_by_point(self, s, state, before, point, round)
    }

    fn locate_by_offset(
        &self,
        s: &str,
        state: f64,
        before: &TextMetrics,
        offset: usize,
    ) -> Result<Location, MeasureError> {
        locate_by_offset(self, s, state, before, offset)
    }

    fn fill_x_map(&self, s: &str, start_x: f64, multiplier: f64) -> XMap {
        self.cache.fill_x_map(s, start_x, multiplier)
    }
}

/// End of a visual line: the offset where the next line starts and the line width.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LineEnd {
    offset: usize,
    width: f64,
}

/// Splits a chunk into visual lines.
trait Wrap {
    /// Line ends of `text`; the first width excludes `state`. Never empty.
    fn wrap(&self, text: &Chars, state: f64) -> Result<Vec<LineEnd>, MeasureError>;
}

fn wrapped_line_by_point<W: Wrap>(
    wrapper: &W,
    text: &Chars,
    state: f64,
    mut x: f64,
    mut y: f64,
    point: Point,
) -> Result<LineSpan, MeasureError> {
    let wrapped = wrapper.wrap(text, state)?;
    let mut index = 0;
    while y + 1.0 <= point.y {
        if index + 1 >= wrapped.len() {
            return Err(MeasureError::Inconsistent("point below the chunk"));
        }
        y += 1.0;
        x = 0.0;
        index += 1;
    }
    let start = if index == 0 {
        0
    } else {
        wrapped[index - 1].offset
    };
    let mut end = wrapped[index].offset;
    if end > start && text.chars[end - 1] == '\n' {
        end -= 1;
    }
    Ok(LineSpan { start, end, x, y })
}

fn wrapped_line_by_offset<W: Wrap>(
    wrapper: &W,
    text: &Chars,
    state: f64,
    offset: usize,
    x: f64,
    y: f64,
) -> Result<(usize, f64, f64), MeasureError> {
    let wrapped = wrapper.wrap(text, state)?;
    // A soft wrap position belongs to the next line, the chunk end to the last one.
    let mut index = 0;
    while index + 1 < wrapped.len() && offset >= wrapped[index].offset {
        index += 1;
    }
    if index == 0 {
        Ok((0, x, y))
    } else {
        Ok((wrapped[index - 1].offset, 0.0, y + index as f64))
    }
}

fn wrapped_metrics(
    wrapped: &[LineEnd],
    length: usize,
    state: f64,
) -> (TextMetrics, f64) {
    let mut metrics = TextMetrics {
        length,
        ..TextMetrics::default()
    };
    for (i, line) in wrapped.iter().enumerate() {
        if i == 0 {
            metrics.first_width = line.width;
        } else {
            metrics.line_breaks += 1;
        }
        metrics.longest_width = metrics.longest_width.max(line.width);
        metrics.last_width = line.width;
    }
    let state = if metrics.line_breaks > 0 {
        metrics.last_width
    } else {
        metrics.last_width + state
    };
    (metrics, state)
}

macro_rules! wrapping_text_measurer {
    ($name:ident) => {
        impl $name {
            /// Create a measurer wrapping at `limit` default-width units.
            pub fn new(measurer: Rc<dyn Measurer>, limit: f64) -> Self {
                Self {
                    cache: WidthCache::new(measurer),
                    limit,
                }
            }

            /// Wrapping limit in default-width units.
            pub fn limit(&self) -> f64 {
                self.limit
            }
        }

        impl LineLocator for $name {
            fn cache(&self) -> &WidthCache {
                &self.cache
            }

            fn locate_line_by_point(
                &self,
                text: &Chars,
                state: f64,
                x: f64,
                y: f64,
                point: Point,
            ) -> Result<LineSpan, MeasureError> {
                wrapped_line_by_point(self, text, state, x, y, point)
            }

            fn locate_line_by_offset(
                &self,
                text: &Chars,
                state: f64,
                offset: usize,
                x: f64,
                y: f64,
            ) -> Result<(usize, f64, f64), MeasureError> {
                wrapped_line_by_offset(self, text, state, offset, x, y)
            }
        }

        impl TextMeasurer for $name {
            fn map_value(&self, s: &str, state: f64) -> Result<(TextMetrics, f64), MeasureError> {
                let text = self.cache.chars(s);
                let wrapped = self.wrap(&text, state)?;
                Ok(wrapped_metrics(&wrapped, text.len(), state))
            }

            fn states_equal(&self, a: f64, b: f64) -> bool {
                a == b
            }

            fn locate_by_point(
                &self,
                s: &str,
                state: f64,
                before: &TextMetrics,
                point: Point,
                round: RoundMode,
            ) -> Result<Location, MeasureError> {
                locate_by_point(self, s, state, before, point, round)
            }

            fn locate_by_offset(
                &self,
                s: &str,
                state: f64,
                before: &TextMetrics,
                offset: usize,
            ) -> Result<Location, MeasureError> {
                locate_by_offset(self, s, state, before, offset)
            }

            fn fill_x_map(&self, s: &str, start_x: f64, multiplier: f64) -> XMap {
                self.cache.fill_x_map(s, start_x, multiplier)
            }
        }
    };
}

/// Wraps lines at the limit, possibly in the middle of a word.
pub struct LineWrappingTextMeasurer {
    cache: WidthCache,
    limit: f64,
}

wrapping_text_measurer!(LineWrappingTextMeasurer);

impl Wrap for LineWrappingTextMeasurer {
    fn wrap(&self, text: &Chars, state: f64) -> Result<Vec<LineEnd>, MeasureError> {
        let mut result = Vec::new();
        let mut width = state;
        let mut line_start = 0;
        loop {
            let line_break = text.find_line_break(line_start);
            let line_end = line_break.unwrap_or(text.len());
            let next_line = line_break.map_or(line_end, |lb| lb + 1);

            if line_start == line_end {
                result.push(LineEnd {
                    offset: next_line,
                    width,
                });
            } else {
                let mut offset = line_start;
                while offset < line_end {
                    let (located, mut w) = self.cache.locate_by_width(
                        text,
                        offset,
                        line_end,
                        self.limit - width,
                        RoundMode::Floor,
                    )?;
                    let mut next = located.unwrap_or(line_end);
                    if next == offset {
                        if width > 0.0 {
                            result.push(LineEnd { offset, width });
                            width = 0.0;
                            continue;
                        }
                        // Wider than the limit: give it a line of its own.
                        next = offset + 1;
                        w = self.cache.char_width(text.chars[offset]);
                    }
                    result.push(LineEnd {
                        offset: next,
                        width: width + w,
                    });
                    offset = next;
                    width = 0.0;
                }
                if let Some(last) = result.last_mut() {
                    last.offset = next_line;
                }
            }

            width = 0.0;
            if line_break.is_none() {
                break;
            }
            line_start = next_line;
        }
        result[0].width -= state;
        Ok(result)
    }
}

/// Word-wrap units: a word with the separators that follow it, or a leading separator run.
static WORD_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_]+[^A-Za-z0-9_]*|[^A-Za-z0-9_]+").expect("valid word unit regex")
});

/// Wraps lines at the limit between words; words longer than the limit are split.
pub struct WordWrappingTextMeasurer {
    cache: WidthCache,
    limit: f64,
}

wrapping_text_measurer!(WordWrappingTextMeasurer);

impl Wrap for WordWrappingTextMeasurer {
    fn wrap(&self, text: &Chars, state: f64) -> Result<Vec<LineEnd>, MeasureError> {
        let mut result = Vec::new();
        let mut width = state;
        let mut line_start = 0;
        loop {
            let line_break = text.find_line_break(line_start);
            let line_end = line_break.unwrap_or(text.len());
            let line: String = text.chars[line_start..line_end].iter().collect();

            let mut word_start = line_start;
            for unit in WORD_UNIT.find_iter(&line) {
                let word_end = word_start + unit.as_str().chars().count();
                let mut w = self.cache.measure(text, word_start, word_end)?;
                let mut start = word_start;
                while width + w > self.limit {
                    if width > 0.0 {
                        result.push(LineEnd {
                            offset: start,
                            width,
                        });
                        width = 0.0;
                        continue;
                    }
                    let (located, mut located_width) = self.cache.locate_by_width(
                        text,
                        start,
                        word_end,
                        self.limit,
                        RoundMode::Floor,
                    )?;
                    let mut next = located.unwrap_or(word_end);
                    if next == start {
                        next = start + 1;
                        located_width = self.cache.char_width(text.chars[start]);
                    }
                    if next >= word_end {
                        // A single character wider than the limit.
                        break;
                    }
                    result.push(LineEnd {
                        offset: next,
                        width: located_width,
                    });
                    w -= located_width;
                    start = next;
                }
                width += w;
                word_start = word_end;
            }

            match line_break {
                Some(line_break) => {
                    result.push(LineEnd {
                        offset: line_break + 1,
                        width,
                    });
                    width = 0.0;
                    line_start = line_break + 1;
                }
                None => {
                    result.push(LineEnd {
                        offset: line_end,
                        width,
                    });
                    break;
                }
            }
        }
        result[0].width -= state;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// `'a'..='z'` measure their index plus one, everything else 100.
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

    /// Every character has the default width.
    struct UnitMeasurer;

    impl Measurer for UnitMeasurer {
        fn default_width(&self) -> f64 {
            1.0
        }

        fn line_height(&self) -> f64 {
            1.0
        }

        fn default_width_regex(&self) -> Option<Regex> {
            Some(Regex::new(r"^[\x{0}-\x{d7ff}]*$").unwrap())
        }

        fn measure_string(&self, _s: &str) -> f64 {
            1.0
        }
    }

    fn letters() -> PlainTextMeasurer {
        PlainTextMeasurer::new(Rc::new(LetterMeasurer))
    }

    fn units() -> PlainTextMeasurer {
        PlainTextMeasurer::new(Rc::new(UnitMeasurer))
    }

    fn measure(m: &PlainTextMeasurer, s: &str, from: usize, to: usize) -> f64 {
        let text = m.cache.chars(s);
        m.cache.measure(&text, from, to).unwrap()
    }

    fn locate(
        m: &PlainTextMeasurer,
        s: &str,
        from: usize,
        to: usize,
        width: f64,
        round: RoundMode,
    ) -> (Option<usize>, f64) {
        let text = m.cache.chars(s);
        m.cache.locate_by_width(&text, from, to, width, round).unwrap()
    }

    fn metrics(length: usize, line_breaks: usize, first: f64, last: f64, longest: f64) -> TextMetrics {
        TextMetrics {
            length,
            line_breaks,
            first_width: first,
            last_width: last,
            longest_width: longest,
        }
    }

    fn location(offset: usize, x: f64, y: f64) -> Location {
        Location { offset, x, y }
    }

    fn before() -> TextMetrics {
        metrics(15, 10, 0.0, 5.0, 5.0)
    }

    #[test]
    fn test_measure_string() {
        let m = letters();
        assert_eq!(measure(&m, "abc", 1, 2), 2.0);
        assert_eq!(measure(&m, "abc", 0, 3), 6.0);
        assert_eq!(measure(&m, "abc", 2, 2), 0.0);
        assert_eq!(measure(&m, "abc𐀀𐀀", 2, 4), 103.0);
        assert_eq!(measure(&m, "abc𐀀𐀀", 4, 5), 100.0);
        assert_eq!(measure(&m, "abc𐀀𐀀", 0, 5), 206.0);
        assert_eq!(measure(&m, "a😀b𐀀c", 1, 4), 202.0);
        assert_eq!(measure(&m, "😀", 0, 1), 100.0);

        let text = m.cache.chars("a\nb");
        assert_eq!(m.cache.measure(&text, 0, 3), Err(MeasureError::LineBreak));
    }

    #[test]
    fn test_locate_by_width() {
        let m = letters();
        assert_eq!(locate(&m, "abc", 0, 3, 3.0, RoundMode::Floor), (Some(2), 3.0));
        assert_eq!(locate(&m, "abc", 0, 3, 3.0, RoundMode::Round), (Some(2), 3.0));
        assert_eq!(locate(&m, "abc", 0, 3, 3.0, RoundMode::Ceil), (Some(2), 3.0));
        assert_eq!(locate(&m, "abc", 0, 3, 4.5, RoundMode::Floor), (Some(2), 3.0));
        assert_eq!(locate(&m, "abc", 0, 3, 4.5, RoundMode::Round), (Some(2), 3.0));
        assert_eq!(locate(&m, "abc", 0, 3, 4.5, RoundMode::Ceil), (Some(3), 6.0));
        assert_eq!(locate(&m, "abc", 0, 3, 4.6, RoundMode::Floor), (Some(2), 3.0));
        assert_eq!(locate(&m, "abc", 0, 3, 4.6, RoundMode::Round), (Some(3), 6.0));
        assert_eq!(locate(&m, "abc", 0, 3, 4.6, RoundMode::Ceil), (Some(3), 6.0));
        assert_eq!(locate(&m, "abc𐀀𐀀", 2, 5, 103.0, RoundMode::Round), (Some(4), 103.0));
        assert_eq!(locate(&m, "abc𐀀𐀀", 2, 5, 153.0, RoundMode::Round), (Some(4), 103.0));
        assert_eq!(locate(&m, "abc𐀀𐀀", 2, 5, 153.0, RoundMode::Ceil), (Some(5), 203.0));
        assert_eq!(locate(&m, "abc𐀀𐀀", 2, 5, 154.0, RoundMode::Floor), (Some(4), 103.0));
        assert_eq!(locate(&m, "abc𐀀𐀀", 2, 5, 154.0, RoundMode::Round), (Some(5), 203.0));
        assert_eq!(locate(&m, "a😀b𐀀c", 0, 5, 204.0, RoundMode::Round), (None, 203.0));
        assert_eq!(locate(&m, "a😀b𐀀c", 0, 5, 203.0, RoundMode::Round), (Some(5), 203.0));
        assert_eq!(locate(&m, "", 0, 0, 0.0, RoundMode::Ceil), (Some(0), 0.0));
        assert_eq!(locate(&m, "", 0, 0, 5.0, RoundMode::Floor), (None, 0.0));

        let u = units();
        assert_eq!(locate(&u, "abc", 0, 3, 0.5, RoundMode::Floor), (Some(0), 0.0));
        assert_eq!(locate(&u, "abc", 0, 3, 0.5, RoundMode::Round), (Some(0), 0.0));
        assert_eq!(locate(&u, "abc", 0, 3, 0.6, RoundMode::Round), (Some(1), 1.0));
        assert_eq!(locate(&u, "abc", 0, 3, 0.5, RoundMode::Ceil), (Some(1), 1.0));
        assert_eq!(locate(&u, "abc", 0, 3, 7.0, RoundMode::Ceil), (None, 3.0));
    }

    #[test]
    fn test_map_value() {
        let u = units();
        let value = |s: &str| u.map_value(s, 0.0).unwrap().0;
        assert_eq!(value("one line"), metrics(8, 0, 8.0, 8.0, 8.0));
        assert_eq!(value("\none line"), metrics(9, 1, 0.0, 8.0, 8.0));
        assert_eq!(value("one line\n"), metrics(9, 1, 8.0, 0.0, 8.0));
        assert_eq!(value("\none line\n"), metrics(10, 2, 0.0, 0.0, 8.0));
        assert_eq!(value("short\nlongest\nlonger\ntiny"), metrics(25, 3, 5.0, 4.0, 7.0));

        let m = letters();
        let value = |s: &str| m.map_value(s, 0.0).unwrap().0;
        assert_eq!(value("a"), metrics(1, 0, 1.0, 1.0, 1.0));
        assert_eq!(value("a\nb"), metrics(3, 1, 1.0, 2.0, 2.0));
        assert_eq!(value("b\na"), metrics(3, 1, 2.0, 1.0, 2.0));
        assert_eq!(value("bac"), metrics(3, 0, 6.0, 6.0, 6.0));
        assert_eq!(value("b\naaaa\nc"), metrics(8, 2, 2.0, 3.0, 4.0));
        assert_eq!(value("b😀😀"), metrics(3, 0, 202.0, 202.0, 202.0));
        assert_eq!(value("😀\n𐀀😀\n𐀀a"), metrics(7, 2, 100.0, 101.0, 200.0));
        assert_eq!(value("\n𐀀"), metrics(2, 1, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_locate_round_trip() {
        let u = units();
        let cases = [
            ("short", location(18, 8.0, 10.0)),
            ("short\nlonger", location(18, 8.0, 10.0)),
            ("short\nlonger", location(20, 10.0, 10.0)),
            ("short\nlonger", location(21, 0.0, 11.0)),
            ("1\n23\n456\n78\n9\n0", location(28, 1.0, 14.0)),
        ];
        for (chunk, expected) in cases {
            assert_eq!(u.locate_by_offset(chunk, 0.0, &before(), expected.offset).unwrap(), expected);
            let point = Point::new(expected.x, expected.y);
            assert_eq!(
                u.locate_by_point(chunk, 0.0, &before(), point, RoundMode::Floor).unwrap(),
                expected
            );
        }

        let past_line_end = [
            ("short", Point::new(15.0, 10.0), location(20, 10.0, 10.0)),
            ("short\nlonger", Point::new(15.0, 10.0), location(20, 10.0, 10.0)),
            ("short\nlonger", Point::new(22.0, 11.0), location(27, 6.0, 11.0)),
            ("1\n23\n456\n78\n9\n0", Point::new(42.0, 14.0), location(28, 1.0, 14.0)),
        ];
        for (chunk, point, expected) in past_line_end {
            assert_eq!(
                u.locate_by_point(chunk, 0.0, &before(), point, RoundMode::Floor).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn test_locate_with_wide_characters() {
        let m = letters();
        let cases = [
            ("abc", location(18, 11.0, 10.0)),
            ("abc\na😀b𐀀c", location(18, 11.0, 10.0)),
            ("abc\na😀b𐀀c", location(19, 0.0, 11.0)),
            ("abc\na😀b𐀀c", location(23, 203.0, 11.0)),
            ("a\n😀b\n𐀀ca\n𐀀𐀀\n😀\n0", location(28, 100.0, 14.0)),
        ];
        for (chunk, expected) in cases {
            assert_eq!(m.locate_by_offset(chunk, 0.0, &before(), expected.offset).unwrap(), expected);
            let point = Point::new(expected.x, expected.y);
            assert_eq!(
                m.locate_by_point(chunk, 0.0, &before(), point, RoundMode::Floor).unwrap(),
                expected
            );
        }

        let past_line_end = [
            ("abc", Point::new(15.0, 10.0), location(18, 11.0, 10.0)),
            ("abc\na😀b𐀀c", Point::new(220.0, 11.5), location(24, 206.0, 11.0)),
            ("a\n😀b\n𐀀ca\n𐀀𐀀\n😀\n0", Point::new(420.0, 14.5), location(28, 100.0, 14.0)),
        ];
        for (chunk, point, expected) in past_line_end {
            assert_eq!(
                m.locate_by_point(chunk, 0.0, &before(), point, RoundMode::Floor).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn test_locate_by_point_round_modes() {
        let m = letters();
        let chunk = "a\nb\naaaa\nbac\nc";
        let cases = [
            (Point::new(5.0, 10.0), location(15, 5.0, 10.0), RoundMode::Floor),
            (Point::new(6.0, 10.0), location(16, 6.0, 10.0), RoundMode::Floor),
            (Point::new(7.0, 10.0), location(16, 6.0, 10.0), RoundMode::Floor),
            (Point::new(5.0, 10.5), location(15, 5.0, 10.0), RoundMode::Floor),
            (Point::new(0.0, 11.0), location(17, 0.0, 11.0), RoundMode::Floor),
            (Point::new(1.0, 11.0), location(17, 0.0, 11.0), RoundMode::Floor),
            (Point::new(0.9, 11.0), location(17, 0.0, 11.0), RoundMode::Round),
            (Point::new(1.0, 11.0), location(17, 0.0, 11.0), RoundMode::Round),
            (Point::new(1.1, 11.0), location(18, 2.0, 11.0), RoundMode::Round),
            (Point::new(0.0, 11.0), location(17, 0.0, 11.0), RoundMode::Ceil),
            (Point::new(1.0, 11.0), location(18, 2.0, 11.0), RoundMode::Ceil),
            (Point::new(1.1, 11.0), location(18, 2.0, 11.0), RoundMode::Ceil),
            (Point::new(2.0, 11.0), location(18, 2.0, 11.0), RoundMode::Floor),
            (Point::new(42.0, 11.5), location(18, 2.0, 11.0), RoundMode::Floor),
            (Point::new(0.0, 12.0), location(19, 0.0, 12.0), RoundMode::Floor),
            (Point::new(1.0, 12.0), location(20, 1.0, 12.0), RoundMode::Floor),
            (Point::new(2.0, 12.0), location(21, 2.0, 12.0), RoundMode::Floor),
            (Point::new(3.0, 12.1), location(22, 3.0, 12.0), RoundMode::Floor),
            (Point::new(4.0, 12.7), location(23, 4.0, 12.0), RoundMode::Floor),
            (Point::new(3.0, 13.0), location(26, 3.0, 13.0), RoundMode::Floor),
            (Point::new(42.0, 13.0), location(27, 6.0, 13.0), RoundMode::Floor),
        ];
        for (point, expected, round) in cases {
            assert_eq!(
                m.locate_by_point(chunk, 0.0, &before(), point, round).unwrap(),
                expected,
                "{point:?} {round:?}"
            );
        }
    }

    #[test]
    fn test_locate_rejects_positions_before_chunk() {
        let m = letters();
        assert!(matches!(
            m.locate_by_point("abc", 0.0, &before(), Point::new(4.0, 10.0), RoundMode::Floor),
            Err(MeasureError::Inconsistent(_))
        ));
        assert!(matches!(
            m.locate_by_point("abc", 0.0, &before(), Point::new(0.0, 11.0), RoundMode::Floor),
            Err(MeasureError::Inconsistent(_))
        ));
        assert!(matches!(
            m.locate_by_offset("abc", 0.0, &before(), 14),
            Err(MeasureError::Inconsistent(_))
        ));
        assert!(matches!(
            m.locate_by_offset("abc", 0.0, &before(), 19),
            Err(MeasureError::Inconsistent(_))
        ));
    }

    fn line_wrap(limit: f64) -> LineWrappingTextMeasurer {
        LineWrappingTextMeasurer::new(Rc::new(UnitMeasurer), limit)
    }

    fn word_wrap(limit: f64) -> WordWrappingTextMeasurer {
        WordWrappingTextMeasurer::new(Rc::new(UnitMeasurer), limit)
    }

    #[test]
    fn test_line_wrapping() {
        let m = line_wrap(4.0);
        let (value, state) = m.map_value("abcdefghij", 0.0).unwrap();
        assert_eq!(value, metrics(10, 2, 4.0, 2.0, 4.0));
        assert_eq!(state, 2.0);

        // Continuing a line that already holds three units.
        let (value, state) = m.map_value("abcdef", 3.0).unwrap();
        assert_eq!(value, metrics(6, 2, 1.0, 1.0, 4.0));
        assert_eq!(state, 1.0);

        let (value, state) = m.map_value("ab", 1.0).unwrap();
        assert_eq!(value, metrics(2, 0, 2.0, 2.0, 2.0));
        assert_eq!(state, 3.0);

        let (value, _) = m.map_value("ab\n\ncd\n", 0.0).unwrap();
        assert_eq!(value, metrics(7, 3, 2.0, 0.0, 2.0));

        let (value, _) = m.map_value("", 2.0).unwrap();
        assert_eq!(value, metrics(0, 0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_word_wrapping() {
        let m = word_wrap(10.0);
        let (value, _) = m.map_value("hello big world", 0.0).unwrap();
        // "hello big " fits exactly, "world" moves to the next line.
        assert_eq!(value, metrics(15, 1, 10.0, 5.0, 10.0));

        let (value, _) = m.map_value("abcdefghijklmnopqrstuvwxyz", 0.0).unwrap();
        assert_eq!(value, metrics(26, 2, 10.0, 6.0, 10.0));

        let (value, state) = m.map_value("hi there", 6.0).unwrap();
        assert_eq!(value, metrics(8, 1, 3.0, 5.0, 5.0));
        assert_eq!(state, 5.0);

        let (value, _) = m.map_value("one\ntwo", 0.0).unwrap();
        assert_eq!(value, metrics(7, 1, 3.0, 3.0, 3.0));
    }

    #[test]
    fn test_character_wider_than_limit_gets_own_line() {
        let m = WordWrappingTextMeasurer::new(Rc::new(LetterMeasurer), 10.0);
        let (value, _) = m.map_value("😀😀", 0.0).unwrap();
        assert_eq!(value.line_breaks, 1);
        assert_eq!(value.longest_width, 100.0);

        let m = LineWrappingTextMeasurer::new(Rc::new(LetterMeasurer), 10.0);
        let (value, _) = m.map_value("a😀", 0.0).unwrap();
        assert_eq!(value, metrics(2, 1, 1.0, 100.0, 100.0));
    }

    #[test]
    fn test_wrapped_locate() {
        let m = line_wrap(4.0);
        let empty = TextMetrics::default();
        let chunk = "abcdefghij";
        assert_eq!(m.locate_by_offset(chunk, 0.0, &empty, 4).unwrap(), location(4, 0.0, 1.0));
        assert_eq!(m.locate_by_offset(chunk, 0.0, &empty, 3).unwrap(), location(3, 3.0, 0.0));
        assert_eq!(m.locate_by_offset(chunk, 0.0, &empty, 10).unwrap(), location(10, 2.0, 2.0));
        assert_eq!(
            m.locate_by_point(chunk, 0.0, &empty, Point::new(2.0, 1.0), RoundMode::Floor).unwrap(),
            location(6, 2.0, 1.0)
        );
        assert_eq!(
            m.locate_by_point(chunk, 0.0, &empty, Point::new(9.0, 2.0), RoundMode::Floor).unwrap(),
            location(10, 2.0, 2.0)
        );

        let chunk = "ab\n";
        assert_eq!(m.locate_by_offset(chunk, 0.0, &empty, 3).unwrap(), location(3, 0.0, 1.0));
        assert_eq!(m.locate_by_offset(chunk, 0.0, &empty, 2).unwrap(), location(2, 2.0, 0.0));
    }

    #[test]
    fn test_fill_x_map() {
        let m = letters();
        let map = m.fill_x_map("ab\u{05d0}c", 10.0, 2.0);
        assert_eq!(map.x, vec![10.0, 12.0, 16.0, 216.0, 222.0]);
        assert_eq!(map.rtl, vec![false, false, true, false, false]);
    }

    #[test]
    fn test_rtl_code_points() {
        assert!(is_rtl_code_point('\u{05d0}'));
        assert!(is_rtl_code_point('\u{0627}'));
        assert!(is_rtl_code_point('\u{200f}'));
        assert!(is_rtl_code_point('\u{10800}'));
        assert!(!is_rtl_code_point('a'));
        assert!(!is_rtl_code_point('\u{4e2d}'));
    }

    #[test]
    fn test_cell_measurer() {
        let m = CellMeasurer::new().with_cell_width(8.0).with_line_height(16.0);
        assert_eq!(m.default_width(), 8.0);
        assert_eq!(m.line_height(), 16.0);
        assert_eq!(m.measure_string("ab"), 16.0);
        assert_eq!(m.measure_string("中"), 16.0);
        assert_eq!(m.measure_string("\t"), 32.0);
        assert_eq!(CellMeasurer::new().with_tab_width(2).measure_string("\tx"), 3.0);

        let re = m.default_width_regex().unwrap();
        assert!(re.is_match("plain ascii\n"));
        assert!(!re.is_match("tab\there"));
        assert!(!re.is_match("中"));

        let text = PlainTextMeasurer::new(Rc::new(m));
        let (value, _) = text.map_value("a中b\tc", 0.0).unwrap();
        assert_eq!(value.first_width, 9.0);
    }
}
