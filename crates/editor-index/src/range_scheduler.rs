//! Chunked (re)processing of a document range.
//!
//! A [`RangeScheduler`] keeps a single pending range: the union of everything that needs
//! processing since it was last drained. Background work processes it front to back in chunks
//! of `chunk_size`; frames process whatever is about to become visible synchronously, so the
//! visible text is never shown stale.

use crate::anchor::OffsetRange;
use crate::document::Document;
use crate::frame::FrameContent;
use crate::scheduler::{Job, Scheduler};
use std::rc::Rc;

/// The processing side of a [`RangeScheduler`], typically an incremental indexer.
pub trait RangeProcessor {
    /// Converts a visible range into the range that must be processed for it, for example
    /// widened to whole lines. `None` means nothing needs processing.
    fn processing_range(&self, visible: OffsetRange) -> Option<OffsetRange>;

    /// Processes `range` and returns the range actually processed, which may be smaller or
    /// larger than requested. It must overlap the start of `range` for processing to make
    /// progress.
    fn process_range(&mut self, range: OffsetRange) -> OffsetRange;

    /// Called after a batch of synchronous processing, when no more is planned.
    fn done_processing(&mut self) {}
}

/// Drives a [`RangeProcessor`] over the parts of a document that need it.
pub struct RangeScheduler<P> {
    scheduler: Rc<dyn Scheduler>,
    processor: P,
    chunk_size: usize,
    range_to_process: Option<OffsetRange>,
}

impl<P: RangeProcessor> RangeScheduler<P> {
    /// Create a scheduler processing at most `chunk_size` characters per background slice.
    pub fn new(scheduler: Rc<dyn Scheduler>, processor: P, chunk_size: usize) -> Self {
        Self {
            scheduler,
            processor,
            chunk_size: chunk_size.max(1),
            range_to_process: None,
        }
    }

    /// The processor.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// The processor, mutably.
    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Characters processed per background slice.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Pending range, if any.
    pub fn range_to_process(&self) -> Option<OffsetRange> {
        self.range_to_process
    }

    /// Whether anything is pending.
    pub fn needs_processing(&self) -> bool {
        self.range_to_process.is_some()
    }

    /// Marks the whole document as needing processing.
    pub fn start(&mut self, document: &Document) {
        if let Some(range) = self
            .processor
            .processing_range(OffsetRange::new(0, document.len()))
        {
            self.mark_needs_processing(range);
        }
    }

    /// Cancels background work and forgets the pending range.
    pub fn stop(&mut self) {
        self.scheduler.cancel();
        self.range_to_process = None;
    }

    /// Called before building a frame: processes the pending range right away if it fits in a
    /// single chunk.
    pub fn on_before_frame(&mut self) {
        let Some(pending) = self.range_to_process else {
            return;
        };
        if pending.len() > self.chunk_size {
            return;
        }
        self.process_next_chunk();
        self.processor.done_processing();
    }

    /// Called with the content of a frame being built: processes every visible range if the
    /// pending range intersects the frame.
    pub fn on_frame<S>(&mut self, content: &FrameContent<S>) {
        let Some(pending) = self.range_to_process else {
            return;
        };
        let Some(frame_range) = self.processor.processing_range(content.range) else {
            return;
        };
        if pending.from >= frame_range.to || pending.to <= frame_range.from {
            return;
        }

        let mut processed_something = false;
        for visible in &content.ranges {
            if let Some(range) = self.processor.processing_range(visible.range()) {
                let processed = self.processor.process_range(range);
                self.processed(processed);
                processed_something = true;
            }
        }
        if processed_something {
            tracing::trace!(
                from = frame_range.from,
                to = frame_range.to,
                "processed visible ranges"
            );
            self.processor.done_processing();
        }
    }

    /// Called for every replacement of `[from, to)` with `inserted` characters.
    ///
    /// The pending range is rebased through the edit, and the inserted text is marked as
    /// needing processing.
    pub fn on_replace(&mut self, from: usize, to: usize, inserted: usize) {
        if let Some(pending) = self.range_to_process {
            let rebase = |offset: usize| {
                if offset <= from {
                    offset
                } else if offset >= to {
                    offset - (to - from) + inserted
                } else {
                    from
                }
            };
            self.range_to_process = Some(OffsetRange::new(rebase(pending.from), rebase(pending.to)));
        }
        if let Some(range) = self
            .processor
            .processing_range(OffsetRange::new(from, from + inserted))
        {
            self.mark_needs_processing(range);
        }
    }

    /// Processes the next chunk of the pending range. Returns whether anything is still pending.
    pub fn process_next_chunk(&mut self) -> bool {
        let Some(pending) = self.range_to_process else {
            return false;
        };
        let to = pending.to.min(pending.from + self.chunk_size);
        tracing::trace!(from = pending.from, to, "processing chunk");
        let processed = self
            .processor
            .process_range(OffsetRange::new(pending.from, to));
        self.processed(processed);
        self.range_to_process.is_some()
    }

    fn mark_needs_processing(&mut self, range: OffsetRange) {
        let range = match self.range_to_process {
            Some(pending) => OffsetRange::new(
                range.from.min(pending.from),
                range.to.max(pending.to),
            ),
            None => range,
        };
        self.range_to_process = Some(range);
        self.scheduler.schedule();
    }

    fn processed(&mut self, range: OffsetRange) {
        let Some(pending) = self.range_to_process.as_mut() else {
            return;
        };
        if range.from <= pending.from && range.to >= pending.to {
            self.range_to_process = None;
            self.scheduler.cancel();
            return;
        }
        if range.from <= pending.from && range.to >= pending.from {
            pending.from = range.to;
        } else if range.from <= pending.to && range.to >= pending.to {
            pending.to = range.from;
        }
    }
}

impl<P: RangeProcessor> Job for RangeScheduler<P> {
    fn do_work(&mut self) -> bool {
        self.process_next_chunk()
    }

    fn done_work(&mut self) {
        self.processor.done_processing();
    }
}
