//! Policy documents.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::deny_list::DenyList;
use super::line::{GeneralKey, GeneralSetting, MatchRule, RuleLine, Section, Strategy};
use super::parse::parse_lines;

/// A traffic policy: an ordered list of document lines plus the settings
/// derived from its `[General]` section.
///
/// The derived fields never diverge from the `[General]` lines. Every setter
/// rewrites (or inserts) the matching setting line, and replacing the text
/// re-derives every field.
#[derive(Debug, Clone)]
pub struct Policy {
    lines: Vec<RuleLine>,
    name: String,
    default_strategy: Strategy,
    deny_list_enabled: bool,
    created_at: Option<String>,
    author: Option<String>,
    note: Option<String>,
    deny_list: OnceCell<Arc<DenyList>>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            name: String::new(),
            default_strategy: Strategy::Direct,
            deny_list_enabled: true,
            created_at: None,
            author: None,
            note: None,
            deny_list: OnceCell::new(),
        }
    }
}

impl Policy {
    /// Creates an empty policy with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let mut policy = Self::default();
        policy.set_name(name);
        policy
    }

    /// Parses a policy document.
    pub fn parse(text: &str) -> Self {
        let mut policy = Self::default();
        policy.set_text(text);
        policy
    }

    /// Reads and parses a policy document from disk.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Uses `deny_list` instead of the bundled default deny-list.
    pub fn with_deny_list(self, deny_list: Arc<DenyList>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(deny_list);
        Self {
            deny_list: cell,
            ..self
        }
    }

    /// Replaces the whole document and re-derives every setting.
    pub fn set_text(&mut self, text: &str) {
        self.lines = parse_lines(text);
        self.derive_settings();
    }

    /// Serializes the document, one line per entry.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out
    }

    /// Returns every line in document order.
    pub fn lines(&self) -> &[RuleLine] {
        &self.lines
    }

    /// Returns the match rules in document order.
    pub fn rules(&self) -> impl Iterator<Item = &MatchRule> {
        self.lines.iter().filter_map(RuleLine::as_rule)
    }

    /// Returns the deny-list consulted before the policy's own rules.
    ///
    /// Loaded on first use and kept for the policy's lifetime.
    pub fn deny_list(&self) -> &DenyList {
        self.deny_list.get_or_init(DenyList::bundled)
    }

    // === Derived settings ===

    /// Returns the policy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the strategy for requests no rule matches.
    pub fn default_strategy(&self) -> Strategy {
        self.default_strategy
    }

    /// Returns true if the default deny-list is consulted.
    pub fn deny_list_enabled(&self) -> bool {
        self.deny_list_enabled
    }

    /// Returns the creation time as written in the document.
    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    /// Returns the author.
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Returns the note.
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Sets the policy name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.add(RuleLine::General(GeneralSetting::new(GeneralKey::Name, name)));
    }

    /// Sets the default strategy.
    pub fn set_default_strategy(&mut self, strategy: Strategy) {
        self.add(RuleLine::General(GeneralSetting::new(
            GeneralKey::DefaultStrategy,
            strategy.token(),
        )));
    }

    /// Enables or disables the default deny-list.
    pub fn set_deny_list_enabled(&mut self, enabled: bool) {
        self.add(RuleLine::General(GeneralSetting::new(
            GeneralKey::DefaultDirectEnable,
            enabled.to_string(),
        )));
    }

    /// Sets the creation time.
    pub fn set_created_at(&mut self, created_at: impl Into<String>) {
        self.add(RuleLine::General(GeneralSetting::new(
            GeneralKey::CreateTime,
            created_at,
        )));
    }

    /// Sets the author.
    pub fn set_author(&mut self, author: impl Into<String>) {
        self.add(RuleLine::General(GeneralSetting::new(GeneralKey::Author, author)));
    }

    /// Sets the note.
    pub fn set_note(&mut self, note: impl Into<String>) {
        self.add(RuleLine::General(GeneralSetting::new(GeneralKey::Note, note)));
    }

    // === Editing ===

    /// Adds a line.
    ///
    /// - A general setting overwrites every existing setting with the same
    ///   key in place, in whichever `[General]` section it sits. With none,
    ///   it is inserted right after the first `[General]` header. Accessors
    ///   read the last setting for a key, so every copy must carry the new
    ///   value.
    /// - A match rule is inserted right after the `[Rule]` header.
    /// - Headers and opaque lines are appended.
    ///
    /// A missing `[General]` or `[Rule]` header is appended first.
    pub fn add(&mut self, line: RuleLine) {
        match line {
            RuleLine::General(setting) => self.add_setting(setting),
            RuleLine::Rule(rule) => {
                let header = self.find_or_append_section(Section::Rule);
                self.lines.insert(header + 1, RuleLine::Rule(rule));
            }
            other => {
                self.lines.push(other);
                self.derive_settings();
            }
        }
    }

    /// Removes the line at `index`.
    pub fn remove(&mut self, index: usize) -> Option<RuleLine> {
        if index >= self.lines.len() {
            return None;
        }
        let removed = self.lines.remove(index);
        self.derive_settings();
        Some(removed)
    }

    /// Replaces the line at `index`, returning the previous line.
    pub fn replace(&mut self, index: usize, line: RuleLine) -> Option<RuleLine> {
        let slot = self.lines.get_mut(index)?;
        let previous = std::mem::replace(slot, line);
        self.derive_settings();
        Some(previous)
    }

    fn add_setting(&mut self, setting: GeneralSetting) {
        let mut found = false;
        for line in &mut self.lines {
            if let RuleLine::General(existing) = line {
                if existing.key == setting.key {
                    existing.value = setting.value.clone();
                    if setting.comment.is_some() {
                        existing.comment = setting.comment.clone();
                    }
                    found = true;
                }
            }
        }

        if !found {
            let header = self.find_or_append_section(Section::General);
            self.lines.insert(header + 1, RuleLine::General(setting));
        }

        self.derive_settings();
    }

    /// Returns the index of the first header for `section`, appending one if
    /// the document has none.
    fn find_or_append_section(&mut self, section: Section) -> usize {
        match self
            .lines
            .iter()
            .position(|line| line.as_section() == Some(section))
        {
            Some(index) => index,
            None => {
                self.lines.push(RuleLine::Section(section));
                self.lines.len() - 1
            }
        }
    }

    fn derive_settings(&mut self) {
        let defaults = Self::default();
        self.name = defaults.name;
        self.default_strategy = defaults.default_strategy;
        self.deny_list_enabled = defaults.deny_list_enabled;
        self.created_at = None;
        self.author = None;
        self.note = None;

        for setting in self.lines.iter().filter_map(RuleLine::as_general) {
            let value = setting.value.as_str();
            match setting.key {
                GeneralKey::Name => self.name = value.to_string(),
                GeneralKey::DefaultStrategy => {
                    self.default_strategy = Strategy::parse(value).unwrap_or_default();
                }
                GeneralKey::DefaultDirectEnable => {
                    self.deny_list_enabled = parse_bool(value).unwrap_or(true);
                }
                GeneralKey::CreateTime => self.created_at = Some(value.to_string()),
                GeneralKey::Author => self.author = Some(value.to_string()),
                GeneralKey::Note => self.note = Some(value.to_string()),
            }
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
