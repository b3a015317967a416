//! Text metrics monoid and geometric lookup keys.
//!
//! All widths here are in "default width" units: a character of the measurer's default width
//! measures `1.0`. Line numbers (`y`) count line breaks, so `y` of the first line is `0`.

use crate::monoid::{Monoid, OrderedMonoid};

/// Aggregated metrics of a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextMetrics {
    /// Number of characters.
    pub length: usize,
    /// Number of line breaks (hard or wrapped).
    pub line_breaks: usize,
    /// Width of the first line.
    pub first_width: f64,
    /// Width of the last line.
    pub last_width: f64,
    /// Width of the widest line.
    pub longest_width: f64,
}

impl TextMetrics {
    /// Metrics of `length` characters on a single line of the given width.
    pub fn single_line(length: usize, width: f64) -> Self {
        Self {
            length,
            line_breaks: 0,
            first_width: width,
            last_width: width,
            longest_width: width,
        }
    }
}

impl Monoid for TextMetrics {
    fn identity() -> Self {
        Self::default()
    }

    fn combine(&self, other: &Self) -> Self {
        Self {
            length: self.length + other.length,
            line_breaks: self.line_breaks + other.line_breaks,
            first_width: self.first_width
                + if self.line_breaks > 0 {
                    0.0
                } else {
                    other.first_width
                },
            last_width: other.last_width
                + if other.line_breaks > 0 {
                    0.0
                } else {
                    self.last_width
                },
            longest_width: self
                .longest_width
                .max(self.last_width + other.first_width)
                .max(other.longest_width),
        }
    }
}

/// A 2D position in default-width units (`x`) and lines (`y`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position (line number, possibly fractional).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An offset together with its point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Location {
    /// Character offset.
    pub offset: usize,
    /// Horizontal position.
    pub x: f64,
    /// Line number.
    pub y: f64,
}

/// Lookup key for [`TextMetrics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextLookupKey {
    /// Pure length comparison.
    Offset(usize),
    /// Line first, then width on that line.
    Point(Point),
}

impl OrderedMonoid for TextMetrics {
    type Key = TextLookupKey;

    fn greater_than_key(&self, key: &TextLookupKey) -> bool {
        match key {
            TextLookupKey::Offset(offset) => self.length > *offset,
            TextLookupKey::Point(point) => {
                let line = self.line_breaks as f64;
                line > point.y || (line + 1.0 > point.y && self.last_width > point.x)
            }
        }
    }

    fn greater_or_equal_than_key(&self, key: &TextLookupKey) -> bool {
        match key {
            TextLookupKey::Offset(offset) => self.length >= *offset,
            TextLookupKey::Point(point) => {
                let line = self.line_breaks as f64;
                line > point.y || (line + 1.0 > point.y && self.last_width >= point.x)
            }
        }
    }
}

/// How to snap a point that falls between two code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoundMode {
    /// Snap to the earlier code point.
    #[default]
    Floor,
    /// Snap to the later code point.
    Ceil,
    /// Snap to the nearer code point; an exact tie snaps to the earlier one.
    Round,
}
