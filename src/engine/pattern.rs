//! Trigger scanning.
//!
//! This module turns a text snapshot into the list of trigger occurrences the
//! dispatcher will resolve.
//!
//! The scan is a single pass of `captures_iter` over the snapshot: matches are
//! non-overlapping and reported left to right. The dispatcher never re-scans
//! within one event, so every [`Occurrence::range`] refers to the text as it
//! was *before* any handler ran.
//!
//! ## Group conventions
//!
//! - A group named `name` (or, failing that, group 2) captures the command name.
//! - A group named `args` (or, failing that, group 3) captures the arguments.
//! - Group 0 is the whole trigger expression.
//!
//! The defaults follow the `{name args}$` grammar. The numbered fallback keeps
//! patterns written for the classic grammar working unchanged.
//!
//! ## Design notes
//!
//! - The built-in grammars cannot match without a `$`, so a cheap substring
//!   gate skips the regex entirely for most keystrokes. Custom patterns are
//!   always run.

use std::ops::Range;

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// One trigger expression found in a text snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// The whole matched expression, e.g. `{echo hi}$`.
    pub expression: String,
    /// The trigger name.
    pub name: String,
    /// Raw argument text (empty when absent).
    pub args: String,
    /// Byte range of `expression` in the scanned snapshot.
    pub range: Range<usize>,
}

/// A compiled trigger grammar.
#[derive(Debug, Clone)]
pub struct TriggerPattern {
    regex: Regex,
    name_group: usize,
    args_group: Option<usize>,
    gate: Option<&'static str>,
}

impl TriggerPattern {
    /// Compile `pattern` with dot-matches-newline enabled.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern).dot_matches_new_line(true).build()?;
        let name_group = group_index(&regex, "name", 2).ok_or_else(|| Error::MissingNameGroup(pattern.to_string()))?;
        let args_group = group_index(&regex, "args", 3);
        Ok(TriggerPattern { regex, name_group, args_group, gate: None })
    }

    /// The stricter grammar: names are letters, underscores and hyphens only.
    pub fn strict() -> Self {
        Self::builtin(regex!(r"(?s)(\{([A-Za-z_-]+)(?:\s([\S\s]+?)\}*)?\}\$)+").clone())
    }

    fn builtin(regex: Regex) -> Self {
        TriggerPattern { regex, name_group: 2, args_group: Some(3), gate: Some("$") }
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Find every occurrence in `text`, left to right.
    pub fn scan(&self, text: &str) -> Vec<Occurrence> {
        if let Some(gate) = self.gate {
            if !text.contains(gate) {
                return Vec::new();
            }
        }

        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(self.name_group)?;
                let args = self.args_group.and_then(|idx| caps.get(idx)).map(|m| m.as_str()).unwrap_or("");
                Some(Occurrence {
                    expression: whole.as_str().to_string(),
                    name: name.as_str().to_string(),
                    args: args.to_string(),
                    range: whole.start()..whole.end(),
                })
            })
            .collect()
    }
}

impl Default for TriggerPattern {
    fn default() -> Self {
        Self::builtin(regex!(r"(?s)(\{(\S+?)(?:\s([\S\s]+?)\}*)?\}\$)+").clone())
    }
}

fn group_index(regex: &Regex, name: &str, fallback: usize) -> Option<usize> {
    regex
        .capture_names()
        .position(|n| n == Some(name))
        .or_else(|| (regex.captures_len() > fallback).then_some(fallback))
}
