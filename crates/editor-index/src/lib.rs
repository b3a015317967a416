#![warn(missing_docs)]
//! Editor Index - Incremental Indexing Core for Text Editors
//!
//! # Overview
//!
//! `editor-index` keeps derived data about a constantly changing text (geometry, decorations,
//! dirty regions) up to date without rescanning the document on every keystroke. It does not
//! render anything: the host supplies a [`Measurer`] and draws the [`Frame`]s it gets back.
//!
//! # Core Features
//!
//! - **Ordered-monoid tree**: persistent treap with `O(log n)` prefix lookups ([`Tree`])
//! - **Anchored ranges**: range sets rebased by edits in `O(log n + k)` ([`RangeTree`])
//! - **Chunked layout**: offset/point conversion with soft wrapping and hidden ranges
//!   ([`LayoutIndex`])
//! - **Cooperative scheduling**: indexing work runs in small slices ([`Scheduler`], [`Job`])
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Frames & Decorators                        │  ← Render Data
//! ├─────────────────────────────────────────────┤
//! │  Layout Index (chunked, lazily measured)    │  ← Geometry
//! ├─────────────────────────────────────────────┤
//! │  Measurers (plain, line wrap, word wrap)    │  ← Text Metrics
//! ├─────────────────────────────────────────────┤
//! │  Range Tree / Work Allocator / Schedulers   │  ← Incremental Work
//! ├─────────────────────────────────────────────┤
//! │  Ordered-Monoid Tree                        │  ← Aggregation
//! ├─────────────────────────────────────────────┤
//! │  Document (Rope)                            │  ← Text Storage
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use editor_index::{CellMeasurer, Document, LayoutIndex, Point, RoundMode, SyncScheduler};
//! use std::rc::Rc;
//!
//! let mut document = Document::from_text("fn main() {\n    println!(\"hi\");\n}\n");
//! let scheduler = Rc::new(SyncScheduler::new());
//! let mut layout =
//!     LayoutIndex::new(Rc::new(CellMeasurer::new()), &document, scheduler.clone()).unwrap();
//! scheduler.run_until_idle(&mut layout);
//!
//! assert_eq!(layout.offset_to_point(16).unwrap(), Point::new(4.0, 1.0));
//! assert_eq!(layout.point_to_offset(Point::new(4.0, 1.0), RoundMode::Floor).unwrap(), 16);
//!
//! let change = document.replace(0, 2, "pub fn");
//! layout.on_document_changed(&change).unwrap();
//! scheduler.run_until_idle(&mut layout);
//! assert_eq!(layout.content_width(), 19.0);
//! assert_eq!(layout.offset_to_point(20).unwrap(), Point::new(4.0, 1.0));
//! ```
//!
//! # Module Description
//!
//! - [`anchor`] - Offsets with an alignment bit
//! - [`monoid`] - Monoid traits aggregated by trees
//! - [`tree`] - Ordered-monoid treap
//! - [`metrics`] - Text metrics monoid and lookup keys
//! - [`range_tree`] - Anchored range sets
//! - [`work_allocator`] - Dirty-region bookkeeping
//! - [`scheduler`] - Cooperative work pumps
//! - [`range_scheduler`] - Chunked processing of a pending range
//! - [`document`] - Text, selection and change notifications
//! - [`measurer`] - Host measurers and chunk text measurers
//! - [`frame`] - Frame contents, decorators and positioned output
//! - [`layout`] - The layout index
//!
//! # Coordinates
//!
//! Offsets count Unicode scalar values. Points returned by [`LayoutIndex`] are in pixels, as
//! defined by the measurer's default width and line height.

pub mod anchor;
pub mod document;
pub mod error;
pub mod frame;
pub mod layout;
pub mod measurer;
pub mod metrics;
pub mod monoid;
pub mod range_scheduler;
pub mod range_tree;
pub mod scheduler;
pub mod tree;
pub mod work_allocator;

pub use anchor::{Align, Anchor, AnchorRange, OffsetRange};
pub use document::{Document, DocumentChange, Replacement};
pub use error::{LayoutError, MeasureError, RangeTreeError};
pub use frame::{
    BackgroundRect, Frame, FrameContent, FrameDecorator, FrameLine, LineDecorations,
    ScrollbarMark, ScrollbarParams, TextRect, TextRun, VisibleRange, join_ranges,
};
pub use layout::{LayoutConfig, LayoutIndex, WrappingMode};
pub use measurer::{
    CellMeasurer, LineWrappingTextMeasurer, Measurer, PlainTextMeasurer, TextMeasurer,
    WordWrappingTextMeasurer, XMap,
};
pub use metrics::{Location, Point, RoundMode, TextLookupKey, TextMetrics};
pub use monoid::{Monoid, OrderedMonoid};
pub use range_scheduler::{RangeProcessor, RangeScheduler};
pub use range_tree::{Handle, RangeEntry, RangeTree};
pub use scheduler::{IdleScheduler, Job, Scheduler, SyncScheduler};
pub use tree::{Cursor, Split, Tree, TreeFactory};
pub use work_allocator::WorkAllocator;
