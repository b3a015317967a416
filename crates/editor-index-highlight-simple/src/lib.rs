//! `editor-index-highlight-simple` - Incremental regex-based highlighting on top of `editor-index`.
//!
//! This crate is intended for lightweight formats (JSON/INI/etc.) where full parsing is
//! unnecessary. Tokens live in a [`RangeTree`], so edits only shift them; the lines around an
//! edit are re-highlighted in chunks by a [`RangeScheduler`], and whatever is about to be shown
//! is highlighted synchronously while a frame is built.

use editor_index::{
    Anchor, Document, DocumentChange, FrameContent, FrameDecorator, Job, OffsetRange,
    RangeProcessor, RangeScheduler, RangeTree, RangeTreeError, Replacement, Scheduler,
};
use regex::Regex;
use ropey::Rope;
use std::rc::Rc;

/// Style identifier attached to tokens. The UI/theme layer maps it to actual colors.
pub type StyleId = u32;

/// Default number of characters highlighted per background slice.
pub const DEFAULT_HIGHLIGHT_CHUNK_SIZE: usize = 10_000;

/// A highlighted range, in char offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Start offset.
    pub from: usize,
    /// End offset.
    pub to: usize,
    /// Style.
    pub style_id: StyleId,
}

/// A single regex highlighting rule.
#[derive(Debug, Clone)]
pub struct RegexRule {
    regex: Regex,
    style_id: StyleId,
    capture_group: Option<usize>,
}

impl RegexRule {
    /// Create a rule highlighting every match of `pattern`.
    pub fn new(pattern: &str, style_id: StyleId) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            style_id,
            capture_group: None,
        })
    }

    /// Highlight only a capture group of each match.
    ///
    /// Example (INI key):
    /// - pattern: `^\\s*([^=\\s]+)\\s*=`
    /// - capture_group: `1` (the key)
    pub fn with_capture_group(mut self, group: usize) -> Self {
        self.capture_group = Some(group);
        self
    }

    /// Style of the highlighted ranges.
    pub fn style_id(&self) -> StyleId {
        self.style_id
    }
}

/// A simple regex-based syntax highlighter.
///
/// Rules run line by line; a token never spans a line break. Designed for simple formats
/// (JSON/INI/etc.), it is *not* intended to be a full parser.
#[derive(Debug, Clone)]
pub struct RegexHighlighter {
    rules: Vec<RegexRule>,
}

impl RegexHighlighter {
    /// Create a highlighter running `rules` in order.
    pub fn new(rules: Vec<RegexRule>) -> Self {
        Self { rules }
    }

    /// The rules.
    pub fn rules(&self) -> &[RegexRule] {
        &self.rules
    }

    /// Highlights a single line (without its line break) starting at `line_start`.
    pub fn highlight_line(&self, line: &str, line_start: usize, tokens: &mut Vec<Token>) {
        for rule in &self.rules {
            if let Some(group) = rule.capture_group {
                for caps in rule.regex.captures_iter(line) {
                    let Some(m) = caps.get(group) else {
                        continue;
                    };
                    tokens.extend(token_from_match(line_start, line, m.start(), m.end(), rule.style_id));
                }
            } else {
                for m in rule.regex.find_iter(line) {
                    tokens.extend(token_from_match(line_start, line, m.start(), m.end(), rule.style_id));
                }
            }
        }
    }

    /// Runs all rules over the whole text.
    pub fn highlight(&self, text: &Rope) -> Vec<Token> {
        let mut tokens = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.to_string();
            self.highlight_line(trim_line_break(&line), text.line_to_char(index), &mut tokens);
        }
        tokens
    }

    /// A small default JSON grammar (strings, numbers, booleans, null).
    pub fn json_default(styles: SimpleJsonStyles) -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            // JSON string (single-line, handles escapes)
            RegexRule::new(r#""(?:\\.|[^"\\])*""#, styles.string)?,
            RegexRule::new(r#"-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?"#, styles.number)?,
            RegexRule::new(r#"\b(?:true|false)\b"#, styles.boolean)?,
            RegexRule::new(r#"\bnull\b"#, styles.null)?,
        ]))
    }

    /// A small default INI grammar (section, key, comment).
    pub fn ini_default(styles: SimpleIniStyles) -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            // Section header: [section]
            RegexRule::new(r#"^\s*\[([^\]]+)\]\s*$"#, styles.section)?.with_capture_group(1),
            // Key: key = value
            RegexRule::new(r#"^\s*([^=\s]+)\s*="#, styles.key)?.with_capture_group(1),
            // Comment: ;... or #...
            RegexRule::new(r#"^\s*[;#].*$"#, styles.comment)?,
        ]))
    }
}

/// Tokens of a document, re-highlighted line by line as the document changes.
///
/// As a [`RangeProcessor`], every requested range is widened to whole lines.
pub struct IncrementalHighlighter {
    highlighter: RegexHighlighter,
    text: Rope,
    tokens: RangeTree<StyleId>,
}

impl IncrementalHighlighter {
    /// Create a highlighter for `document`. Nothing is highlighted yet.
    pub fn new(highlighter: RegexHighlighter, document: &Document) -> Self {
        Self {
            highlighter,
            text: document.text().clone(),
            tokens: RangeTree::new(),
        }
    }

    /// The rules.
    pub fn highlighter(&self) -> &RegexHighlighter {
        &self.highlighter
    }

    /// Current tokens, in document order.
    pub fn tokens(&self) -> Vec<Token> {
        let mut tokens = Vec::with_capacity(self.tokens.count_all());
        self.tokens.visit_all(|entry| {
            tokens.push(Token {
                from: entry.from.offset,
                to: entry.to.offset,
                style_id: *entry.data,
            });
        });
        tokens
    }

    /// Shifts tokens through a replacement. Lines around it still need highlighting.
    pub fn on_replacement(&mut self, replacement: &Replacement) -> Result<(), RangeTreeError> {
        self.tokens.replace(
            replacement.offset,
            replacement.end(),
            replacement.inserted_len(),
        )?;
        self.text = replacement.after.clone();
        Ok(())
    }

    /// Adds a text decoration layer with the tokens inside the frame.
    pub fn decorate(&self, content: &mut FrameContent<StyleId>) {
        let mut layer = RangeTree::new();
        let mut failed = None;
        self.tokens.visit_touching(
            content.range.from,
            Anchor::right(content.range.to),
            |entry| {
                if let Err(err) = layer.add(entry.from, entry.to, *entry.data) {
                    failed = Some(err);
                }
            },
        );
        if let Some(err) = failed {
            tracing::warn!(%err, "skipping malformed token");
        }
        content.text_decorations.push(layer);
    }

    /// Widens `range` to whole lines. A non-empty range ending at a line start keeps its end.
    fn line_range(&self, range: OffsetRange) -> OffsetRange {
        let len = self.text.len_chars();
        let (from, to) = (range.from.min(len), range.to.min(len));
        let from = self.text.line_to_char(self.text.char_to_line(from));
        let last_line = self.text.char_to_line(to);
        let to = if to > from && self.text.line_to_char(last_line) == to {
            to
        } else {
            self.text
                .line_to_char((last_line + 1).min(self.text.len_lines()))
        };
        OffsetRange::new(from, to)
    }
}

impl RangeProcessor for IncrementalHighlighter {
    fn processing_range(&self, visible: OffsetRange) -> Option<OffsetRange> {
        if self.text.len_chars() == 0 {
            return None;
        }
        Some(self.line_range(visible))
    }

    fn process_range(&mut self, range: OffsetRange) -> OffsetRange {
        let mut range = self.line_range(range);
        // Tokens stretched by an edit are highlighted again as a whole.
        let mut end = range.to;
        self.tokens
            .visit_starting(range.from, range.to, |entry| end = end.max(entry.to.offset));
        if end > range.to {
            range = self.line_range(OffsetRange::new(range.from, end));
        }
        let cleared = self.tokens.clear_starting(range.from, range.to);

        let mut tokens = Vec::new();
        let first_line = self.text.char_to_line(range.from);
        let mut line_start = range.from;
        for (index, line) in self.text.lines_at(first_line).enumerate() {
            if line_start >= range.to {
                break;
            }
            let line = line.to_string();
            self.highlighter
                .highlight_line(trim_line_break(&line), line_start, &mut tokens);
            line_start = self.text.line_to_char(first_line + index + 1);
        }
        for token in &tokens {
            // Matches are non-empty and ordered, so adding cannot fail.
            if let Err(err) = self.tokens.add(token.from, token.to, token.style_id) {
                tracing::warn!(%err, "dropping token");
            }
        }
        tracing::trace!(
            from = range.from,
            to = range.to,
            cleared,
            added = tokens.len(),
            "highlighted lines"
        );
        range
    }
}

/// Syntax highlighting of a live document: an [`IncrementalHighlighter`] driven by a
/// [`RangeScheduler`].
///
/// Use it as a [`FrameDecorator`] when building frames, and as a [`Job`] for background work.
pub struct SyntaxHighlighting {
    scheduler: RangeScheduler<IncrementalHighlighter>,
}

impl SyntaxHighlighting {
    /// Starts highlighting `document` in chunks of [`DEFAULT_HIGHLIGHT_CHUNK_SIZE`].
    pub fn new(
        scheduler: Rc<dyn Scheduler>,
        highlighter: RegexHighlighter,
        document: &Document,
    ) -> Self {
        Self::with_chunk_size(scheduler, highlighter, document, DEFAULT_HIGHLIGHT_CHUNK_SIZE)
    }

    /// Starts highlighting `document` in chunks of `chunk_size` characters.
    pub fn with_chunk_size(
        scheduler: Rc<dyn Scheduler>,
        highlighter: RegexHighlighter,
        document: &Document,
        chunk_size: usize,
    ) -> Self {
        let processor = IncrementalHighlighter::new(highlighter, document);
        let mut scheduler = RangeScheduler::new(scheduler, processor, chunk_size);
        scheduler.start(document);
        Self { scheduler }
    }

    /// The highlighter.
    pub fn highlighter(&self) -> &IncrementalHighlighter {
        self.scheduler.processor()
    }

    /// Whether some lines still need highlighting.
    pub fn needs_processing(&self) -> bool {
        self.scheduler.needs_processing()
    }

    /// Applies a document change.
    pub fn on_document_changed(&mut self, change: &DocumentChange) -> Result<(), RangeTreeError> {
        for replacement in &change.replacements {
            self.scheduler.processor_mut().on_replacement(replacement)?;
            self.scheduler.on_replace(
                replacement.offset,
                replacement.end(),
                replacement.inserted_len(),
            );
        }
        Ok(())
    }

    /// Highlights small pending edits right away; call before building a frame.
    pub fn on_before_frame(&mut self) {
        self.scheduler.on_before_frame();
    }

    /// Stops highlighting.
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }
}

impl FrameDecorator<StyleId> for SyntaxHighlighting {
    fn decorate(&mut self, content: &mut FrameContent<StyleId>) {
        self.scheduler.on_frame(content);
        self.scheduler.processor().decorate(content);
    }
}

impl Job for SyntaxHighlighting {
    fn do_work(&mut self) -> bool {
        self.scheduler.do_work()
    }

    fn done_work(&mut self) {
        self.scheduler.done_work();
    }
}

/// Styles used by [`RegexHighlighter::json_default`].
#[derive(Debug, Clone, Copy)]
pub struct SimpleJsonStyles {
    /// Strings.
    pub string: StyleId,
    /// Numbers.
    pub number: StyleId,
    /// `true` and `false`.
    pub boolean: StyleId,
    /// `null`.
    pub null: StyleId,
}

impl Default for SimpleJsonStyles {
    fn default() -> Self {
        Self {
            string: SIMPLE_STYLE_STRING,
            number: SIMPLE_STYLE_NUMBER,
            boolean: SIMPLE_STYLE_BOOLEAN,
            null: SIMPLE_STYLE_NULL,
        }
    }
}

/// Styles used by [`RegexHighlighter::ini_default`].
#[derive(Debug, Clone, Copy)]
pub struct SimpleIniStyles {
    /// Section names.
    pub section: StyleId,
    /// Keys.
    pub key: StyleId,
    /// Comment lines.
    pub comment: StyleId,
}

impl Default for SimpleIniStyles {
    fn default() -> Self {
        Self {
            section: SIMPLE_STYLE_SECTION,
            key: SIMPLE_STYLE_KEY,
            comment: SIMPLE_STYLE_COMMENT,
        }
    }
}

/// JSON string.
pub const SIMPLE_STYLE_STRING: StyleId = 0x0200_0001;
/// JSON number.
pub const SIMPLE_STYLE_NUMBER: StyleId = 0x0200_0002;
/// JSON boolean.
pub const SIMPLE_STYLE_BOOLEAN: StyleId = 0x0200_0003;
/// JSON null.
pub const SIMPLE_STYLE_NULL: StyleId = 0x0200_0004;
/// INI section.
pub const SIMPLE_STYLE_SECTION: StyleId = 0x0200_0010;
/// INI key.
pub const SIMPLE_STYLE_KEY: StyleId = 0x0200_0011;
/// INI comment.
pub const SIMPLE_STYLE_COMMENT: StyleId = 0x0200_0012;

fn trim_line_break(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn token_from_match(
    line_start: usize,
    line: &str,
    match_start_byte: usize,
    match_end_byte: usize,
    style_id: StyleId,
) -> Option<Token> {
    if match_start_byte >= match_end_byte || match_end_byte > line.len() {
        return None;
    }

    let start_col = line[..match_start_byte].chars().count();
    let end_col = start_col + line[match_start_byte..match_end_byte].chars().count();
    Some(Token {
        from: line_start + start_col,
        to: line_start + end_col,
        style_id,
    })
}
