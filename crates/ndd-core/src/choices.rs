//! Parser for the `select_choices_or_calculations` column of a REDCap
//! data dictionary.
//!
//! The column holds `code, label` pairs separated by `|`:
//!
//! ```text
//! 1, Proband | 2, Mother | 3, Father | 10, Non-biological mother
//! ```
//!
//! Codes are normally integers. Some projects use text codes, so when the
//! integer form does not match the entry is split on its last `, `.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

static CHOICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([0-9]+),\s*(.*)\s*$").expect("Invalid choice regex")
});

static ALT_CHOICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(.*),\s*(.*)\s*$").expect("Invalid alternate choice regex")
});

// Dictionaries from other studies carry `[piping]` and line-break markup in labels.
static MARKUP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*\]|<(br|div).*>").expect("Invalid markup regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Remove `[...]` segments and `<br>`/`<div>` tags before matching.
    pub strip_markup: bool,
}

/// Code → label mapping for one dictionary field.
///
/// Insertion order is kept so that expanded checkbox columns come out in
/// dictionary order. A repeated code overwrites the earlier label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChoiceMap {
    entries: Vec<(String, String)>,
}

impl ChoiceMap {
    pub fn parse(raw: &str) -> Self {
        Self::parse_with(raw, ParseOptions::default())
    }

    pub fn parse_with(raw: &str, options: ParseOptions) -> Self {
        let mut map = Self::default();
        for entry in raw.split('|') {
            let cleaned;
            let entry = if options.strip_markup {
                cleaned = MARKUP_PATTERN.replace_all(entry, "");
                cleaned.as_ref()
            } else {
                entry
            };
            let entry = entry.trim_end();
            if entry.is_empty() {
                continue;
            }
            let Some(captures) = CHOICE_PATTERN
                .captures(entry)
                .or_else(|| ALT_CHOICE_PATTERN.captures(entry))
            else {
                continue;
            };
            let (Some(code), Some(label)) = (captures.get(1), captures.get(2)) else {
                warn!(entry, "choice entry did not yield a code and a label");
                break;
            };
            map.insert(code.as_str().trim(), label.as_str().trim());
        }
        map
    }

    fn insert(&mut self, code: &str, label: &str) {
        if let Some(slot) = self.entries.iter_mut().find(|(c, _)| c == code) {
            slot.1 = label.to_string();
        } else {
            self.entries.push((code.to_string(), label.to_string()));
        }
    }

    pub fn label(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, l)| l.as_str())
    }

    /// Reverse lookup. When two codes share a label the later one wins.
    pub fn code(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(_, l)| l == label)
            .map(|(c, _)| c.as_str())
    }

    /// Label → code map.
    #[must_use]
    pub fn invert(&self) -> Self {
        let mut inverted = Self::default();
        for (code, label) in &self.entries {
            inverted.insert(label, code);
        }
        inverted
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, l)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, l)| (c.as_str(), l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
