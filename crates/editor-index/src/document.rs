//! Document text and change notifications.
//!
//! Offsets are character offsets (Unicode scalar values). Every mutation returns a
//! [`DocumentChange`] that indices consume to rebase themselves.

use crate::anchor::OffsetRange;
use ropey::Rope;

/// A single replacement, in document order.
#[derive(Debug, Clone)]
pub struct Replacement {
    /// Start of the replaced range, in the text before this replacement.
    pub offset: usize,
    /// Removed text.
    pub removed: Rope,
    /// Inserted text.
    pub inserted: Rope,
    /// Whole document right after this replacement.
    pub after: Rope,
}

impl Replacement {
    /// Length of the removed text.
    pub fn removed_len(&self) -> usize {
        self.removed.len_chars()
    }

    /// Length of the inserted text.
    pub fn inserted_len(&self) -> usize {
        self.inserted.len_chars()
    }

    /// End of the replaced range, in the text before this replacement.
    pub fn end(&self) -> usize {
        self.offset + self.removed_len()
    }
}

/// Everything that changed during one logical edit.
#[derive(Debug, Clone, Default)]
pub struct DocumentChange {
    /// Replacements, to be applied in order.
    pub replacements: Vec<Replacement>,
    /// Whether the selection changed.
    pub selection_changed: bool,
}

impl DocumentChange {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty() && !self.selection_changed
    }
}

/// Editable text plus selection.
#[derive(Debug, Clone)]
pub struct Document {
    text: Rope,
    selection: Vec<OffsetRange>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self {
            text: Rope::new(),
            selection: Vec::new(),
        }
    }

    /// Create a document from text.
    pub fn from_text(text: &str) -> Self {
        Self {
            text: Rope::from_str(text),
            selection: Vec::new(),
        }
    }

    /// Current text. Cloning the rope is cheap.
    pub fn text(&self) -> &Rope {
        &self.text
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.len_chars()
    }

    /// Whether the document is empty.
    pub fn is_empty(&self) -> bool {
        self.text.len_chars() == 0
    }

    /// Text in `[from, to)`, clamped to the document.
    pub fn content(&self, from: usize, to: usize) -> String {
        let to = to.min(self.len());
        let from = from.min(to);
        self.text.slice(from..to).to_string()
    }

    /// Current selection.
    pub fn selection(&self) -> &[OffsetRange] {
        &self.selection
    }

    /// Replaces `[from, to)` (clamped to the document) with `insertion`.
    pub fn replace(&mut self, from: usize, to: usize, insertion: &str) -> DocumentChange {
        self.apply([(from, to, insertion)])
    }

    /// Applies several replacements as one logical edit. Each replacement is expressed in the
    /// text produced by the previous ones.
    pub fn apply<'a>(
        &mut self,
        edits: impl IntoIterator<Item = (usize, usize, &'a str)>,
    ) -> DocumentChange {
        let mut change = DocumentChange::default();
        for (from, to, insertion) in edits {
            let to = to.min(self.len());
            let from = from.min(to);
            let removed = Rope::from(self.text.slice(from..to));
            let inserted = Rope::from_str(insertion);
            let inserted_len = inserted.len_chars();

            self.text.remove(from..to);
            self.text.insert(from, insertion);

            for range in &mut self.selection {
                let rebased = OffsetRange::new(
                    rebase_offset(range.from, from, to, inserted_len),
                    rebase_offset(range.to, from, to, inserted_len),
                );
                if rebased != *range {
                    *range = rebased;
                    change.selection_changed = true;
                }
            }

            change.replacements.push(Replacement {
                offset: from,
                removed,
                inserted,
                after: self.text.clone(),
            });
        }
        if !change.replacements.is_empty() {
            tracing::trace!(
                replacements = change.replacements.len(),
                len = self.len(),
                "document changed"
            );
        }
        change
    }

    /// Replaces the selection. Ranges are clamped to the document.
    pub fn set_selection(&mut self, ranges: Vec<OffsetRange>) -> DocumentChange {
        let len = self.len();
        self.selection = ranges
            .into_iter()
            .map(|r| OffsetRange::new(r.from.min(len), r.to.min(len)))
            .collect();
        DocumentChange {
            replacements: Vec::new(),
            selection_changed: true,
        }
    }

    /// Replaces the whole content and clears the selection.
    pub fn reset(&mut self, text: &str) -> DocumentChange {
        let had_selection = !self.selection.is_empty();
        self.selection.clear();
        let mut change = self.replace(0, self.len(), text);
        change.selection_changed |= had_selection;
        change
    }
}

/// Maps an offset through a replacement of `[from, to)` with `inserted` characters.
/// Offsets inside the removed range land after the inserted text.
fn rebase_offset(offset: usize, from: usize, to: usize, inserted: usize) -> usize {
    if offset <= from {
        offset
    } else if offset >= to {
        offset - (to - from) + inserted
    } else {
        from + inserted
    }
}
