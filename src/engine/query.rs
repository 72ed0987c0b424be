//! Per-occurrence context and the answer protocol.
//!
//! A [`Query`] is created for every resolved occurrence. It carries the text
//! the occurrence was found in and the text as modified by its own answers:
//!
//! ```text
//! current_text: "say {upper hi}$ now"          (never changes)
//! answer(Some("HI"))
//! text:         "say HI now"                   (span 4..6 remembered)
//! answer(Some("HELLO"))
//! text:         "say HELLO now"                (previous span replaced)
//! ```
//!
//! Only the first literal occurrence of the expression is replaced, even when
//! the same expression appears more than once. Later answers replace the span
//! written by the previous answer, so the latest answer wins.
//!
//! Cursor offsets are chars; `answer_span` is a byte range into `text`.

use std::ops::Range;

use crate::surface::{Surface, SurfaceId, char_offset};

#[derive(Debug, Clone)]
pub struct Query {
    surface: SurfaceId,
    current_text: String,
    expression: String,
    args: String,
    text: String,
    answer_span: Option<Range<usize>>,
}

impl Query {
    pub fn new(
        surface: SurfaceId,
        current_text: impl Into<String>,
        expression: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        let current_text = current_text.into();
        Query {
            surface,
            text: current_text.clone(),
            current_text,
            expression: expression.into(),
            args: args.into(),
            answer_span: None,
        }
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// The text snapshot this query was created from.
    pub fn current_text(&self) -> &str {
        &self.current_text
    }

    /// The matched trigger expression, e.g. `{echo hi}$`.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn args(&self) -> &str {
        &self.args
    }

    /// The text after this query's answers.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Replace the expression (or the previous answer) with `reply` and move
    /// the caret just past it. `None` erases the expression.
    ///
    /// Returns whether both surface writes succeeded.
    pub fn answer(&mut self, surface: &mut dyn Surface, reply: Option<&str>) -> bool {
        self.answer_with(surface, reply, false)
    }

    /// Like [`answer`](Self::answer); with `cursor_to_end` the caret goes to
    /// the end of the text instead.
    pub fn answer_with(&mut self, surface: &mut dyn Surface, reply: Option<&str>, cursor_to_end: bool) -> bool {
        let message = reply.unwrap_or("");
        let (selection_start, _) = surface.read_selection();

        let replaced_chars = match self.target_span() {
            Some(span) => {
                let replaced = self.text[span.clone()].chars().count();
                self.text.replace_range(span.clone(), message);
                self.answer_span = Some(span.start..span.start + message.len());
                replaced
            }
            None => {
                tracing::debug!(expression = %self.expression, "expression not found in query text");
                0
            }
        };

        let cursor = if cursor_to_end {
            self.text.chars().count()
        } else {
            (selection_start + message.chars().count()).saturating_sub(replaced_chars)
        };

        let wrote_text = surface.write_text(&self.text);
        let wrote_selection = surface.write_selection(cursor, cursor);
        if !(wrote_text && wrote_selection) {
            tracing::warn!(surface = %self.surface, wrote_text, wrote_selection, "answer write failed");
        }
        wrote_text && wrote_selection
    }

    /// Deliver `reply` through the clipboard: stage it, select the span it
    /// replaces, paste, and verify the resulting length.
    ///
    /// A failed verification restores the text and retries, up to `attempts`
    /// times, then falls back to [`answer`](Self::answer).
    pub fn answer_pasted(&mut self, surface: &mut dyn Surface, reply: Option<&str>, attempts: usize) -> bool {
        let Some(reply) = reply else {
            return self.answer(surface, None);
        };
        let Some(span) = self.target_span() else {
            return self.answer(surface, Some(reply));
        };

        let start = char_offset(&self.text, span.start);
        let end = char_offset(&self.text, span.end);
        let mut expected = self.text.clone();
        expected.replace_range(span.clone(), reply);
        let expected_chars = expected.chars().count();
        let (sel_start, sel_end) = surface.read_selection();

        for attempt in 1..=attempts {
            if !surface.write_clipboard(reply) {
                tracing::debug!(surface = %self.surface, "clipboard unavailable, answering directly");
                break;
            }
            if surface.write_selection(start, end) && surface.paste() {
                let pasted = surface.read_text().map(|t| t.chars().count());
                if pasted == Some(expected_chars) {
                    self.text = expected;
                    self.answer_span = Some(span.start..span.start + reply.len());
                    return true;
                }
            }
            tracing::debug!(surface = %self.surface, attempt, "pasted answer not verified, restoring");
            surface.write_text(&self.text);
        }

        // The attempts moved the caret; the fallback measures from the original.
        surface.write_selection(sel_start, sel_end);
        self.answer(surface, Some(reply))
    }

    /// Char offset of the expression in [`current_text`](Self::current_text).
    pub fn start_position(&self) -> Option<usize> {
        self.current_text.find(&self.expression).map(|byte| char_offset(&self.current_text, byte))
    }

    /// [`current_text`](Self::current_text) with the first occurrence of the
    /// expression replaced.
    pub fn replace_expression(&self, replacement: &str) -> String {
        self.current_text.replacen(&self.expression, replacement, 1)
    }

    fn target_span(&self) -> Option<Range<usize>> {
        match &self.answer_span {
            Some(span) => Some(span.clone()),
            None => self.text.find(&self.expression).map(|start| start..start + self.expression.len()),
        }
    }
}
