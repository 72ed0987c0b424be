use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use crate::engine::TriggerPattern;
use crate::error::{Error, Result};

/// Default trigger grammar: one or more `{name args}` groups followed by `$`.
///
/// Compiled with dot-matches-newline, so arguments may span lines.
pub const DEFAULT_PATTERN: &str = r"(\{(\S+?)(?:\s([\S\s]+?)\}*)?\}\$)+";

const DEFAULT_PASTE_ATTEMPTS: usize = 3;

/// Engine settings, read-only to the engine once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Trigger-matching regular expression.
    pub pattern: String,
    /// Alias name to canonical command name.
    pub aliases: HashMap<String, String>,
    /// When false, menus render but never track selection changes.
    pub receive_selection_changes: bool,
    /// Allow answers delivered through clipboard paste.
    pub pasted_answers: bool,
    /// Paste attempts before falling back to a plain answer.
    pub paste_attempts: usize,
    /// Module paths that are not loaded.
    pub unloaded: BTreeSet<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            pattern: DEFAULT_PATTERN.to_string(),
            aliases: HashMap::new(),
            receive_selection_changes: true,
            pasted_answers: true,
            paste_attempts: DEFAULT_PASTE_ATTEMPTS,
            unloaded: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    pattern: Option<String>,
    aliases: Option<HashMap<String, String>>,
    #[serde(alias = "receiveSelectionChanges")]
    receive_selection_changes: Option<bool>,
    #[serde(alias = "pastedAnswers")]
    pasted_answers: Option<bool>,
    #[serde(alias = "pasteAttempts")]
    paste_attempts: Option<usize>,
    unloaded: Option<BTreeSet<String>>,
}

impl Settings {
    /// Parse settings from TOML; missing keys keep their defaults.
    ///
    /// ```
    /// let settings = inkline::Settings::from_toml_str("[aliases]\ne = \"echo\"").unwrap();
    /// assert_eq!(settings.aliases["e"], "echo");
    /// assert!(settings.receive_selection_changes);
    /// ```
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Settings::default());
        }
        let raw: RawSettings = toml::from_str(contents)?;
        Ok(Settings::from_raw(raw))
    }

    /// Read settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Io { path: path.display().to_string(), error })?;
        Self::from_toml_str(&contents)
    }

    /// Compile the configured trigger pattern.
    pub fn trigger_pattern(&self) -> Result<TriggerPattern> {
        if self.pattern == DEFAULT_PATTERN {
            return Ok(TriggerPattern::default());
        }
        TriggerPattern::new(&self.pattern)
    }

    fn from_raw(raw: RawSettings) -> Self {
        let defaults = Settings::default();
        Settings {
            pattern: raw.pattern.filter(|p| !p.trim().is_empty()).unwrap_or(defaults.pattern),
            aliases: raw.aliases.unwrap_or_default(),
            receive_selection_changes: raw.receive_selection_changes.unwrap_or(defaults.receive_selection_changes),
            pasted_answers: raw.pasted_answers.unwrap_or(defaults.pasted_answers),
            paste_attempts: raw.paste_attempts.unwrap_or(defaults.paste_attempts).max(1),
            unloaded: raw.unloaded.unwrap_or_default(),
        }
    }
}
