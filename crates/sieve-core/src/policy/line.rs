//! Line types of a policy document.

use std::fmt;

use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// A section header of a policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// `[General]`: key/value settings.
    General,
    /// `[Rule]`: ordered match rules.
    Rule,
    /// `[Host]`: host aliases.
    Host,
}

impl Section {
    /// Returns the header text, brackets included.
    pub fn header(&self) -> &'static str {
        match self {
            Section::General => "[General]",
            Section::Rule => "[Rule]",
            Section::Host => "[Host]",
        }
    }

    /// Parses a header line, ignoring case and surrounding whitespace.
    pub fn parse_header(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "[general]" => Some(Section::General),
            "[rule]" => Some(Section::Rule),
            "[host]" => Some(Section::Host),
            _ => None,
        }
    }
}

/// How a matched request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Strategy {
    /// Pass the request through without capturing it.
    #[default]
    Direct,
    /// Refuse the request.
    Reject,
    /// Capture the request.
    Copy,
    /// Defer to the policy's default strategy.
    Default,
    /// No strategy (`-`).
    None,
}

impl Strategy {
    /// Returns the document token for this strategy.
    pub fn token(&self) -> &'static str {
        match self {
            Strategy::Direct => "DIRECT",
            Strategy::Reject => "REJECT",
            Strategy::Copy => "COPY",
            Strategy::Default => "DEFAULT",
            Strategy::None => "-",
        }
    }

    /// Parses a document token, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DIRECT" => Some(Strategy::Direct),
            "REJECT" => Some(Strategy::Reject),
            "COPY" => Some(Strategy::Copy),
            "DEFAULT" => Some(Strategy::Default),
            "-" | "NONE" => Some(Strategy::None),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// What a match rule's pattern is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum MatchKind {
    /// Exact host.
    Domain,
    /// Substring of the host or the full URL.
    DomainKeyword,
    /// Suffix of the host.
    DomainSuffix,
    /// Address range. Reserved; never matches.
    IpCidr,
    /// Substring of the client identifier.
    UserAgent,
    /// Full-string regular expression over host or URL.
    UrlRegex,
}

impl MatchKind {
    /// Returns the document token for this kind.
    pub fn token(&self) -> &'static str {
        match self {
            MatchKind::Domain => "DOMAIN",
            MatchKind::DomainKeyword => "DOMAIN-KEYWORD",
            MatchKind::DomainSuffix => "DOMAIN-SUFFIX",
            MatchKind::IpCidr => "IP-CIDR",
            MatchKind::UserAgent => "USER-AGENT",
            MatchKind::UrlRegex => "URL-REGEX",
        }
    }

    /// Parses a document token, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DOMAIN" => Some(MatchKind::Domain),
            "DOMAIN-KEYWORD" => Some(MatchKind::DomainKeyword),
            "DOMAIN-SUFFIX" => Some(MatchKind::DomainSuffix),
            "IP-CIDR" => Some(MatchKind::IpCidr),
            "USER-AGENT" => Some(MatchKind::UserAgent),
            "URL-REGEX" => Some(MatchKind::UrlRegex),
            _ => None,
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A recognised `[General]` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneralKey {
    /// `name`
    Name,
    /// `default-strategy`
    DefaultStrategy,
    /// `default-direct-enable`
    DefaultDirectEnable,
    /// `createtime`
    CreateTime,
    /// `author`
    Author,
    /// `note`
    Note,
}

impl GeneralKey {
    /// Returns the key as written in a document.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneralKey::Name => "name",
            GeneralKey::DefaultStrategy => "default-strategy",
            GeneralKey::DefaultDirectEnable => "default-direct-enable",
            GeneralKey::CreateTime => "createtime",
            GeneralKey::Author => "author",
            GeneralKey::Note => "note",
        }
    }

    /// Parses a key, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Some(GeneralKey::Name),
            "default-strategy" => Some(GeneralKey::DefaultStrategy),
            "default-direct-enable" => Some(GeneralKey::DefaultDirectEnable),
            "createtime" => Some(GeneralKey::CreateTime),
            "author" => Some(GeneralKey::Author),
            "note" => Some(GeneralKey::Note),
            _ => None,
        }
    }
}

/// A `key = value` line of the `[General]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralSetting {
    /// The setting key.
    pub key: GeneralKey,
    /// The raw value, trimmed.
    pub value: String,
    /// Trailing comment without the `//` delimiter.
    pub comment: Option<String>,
}

impl GeneralSetting {
    /// Creates a setting without a comment.
    pub fn new(key: GeneralKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            comment: None,
        }
    }

    /// Sets the trailing comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

impl fmt::Display for GeneralSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ={}{}", self.key.as_str(), separator(&self.value), self.value)?;
        if let Some(comment) = &self.comment {
            write!(f, " // {}", comment)?;
        }
        Ok(())
    }
}

/// A `KIND, pattern, STRATEGY[, extra]` line of the `[Rule]` section.
#[derive(Debug, Clone)]
pub struct MatchRule {
    /// What the pattern is tested against.
    pub kind: MatchKind,
    /// The pattern text.
    pub pattern: String,
    /// How a matching request is handled.
    pub strategy: Strategy,
    /// Free-form trailing parameters.
    pub extra: Option<String>,
    /// Trailing comment without the `//` delimiter.
    pub comment: Option<String>,
    /// Compiled `URL-REGEX` pattern; `Some(None)` once compilation failed.
    regex: OnceCell<Option<Regex>>,
}

impl MatchRule {
    /// Creates a rule with no extra parameters or comment.
    pub fn new(kind: MatchKind, pattern: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
            strategy,
            extra: None,
            comment: None,
            regex: OnceCell::new(),
        }
    }

    /// Sets the trailing parameters.
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Sets the trailing comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Returns the pattern compiled as a case-insensitive full-string regex.
    ///
    /// Compiled on first use and cached. Returns `None` if the pattern does
    /// not compile.
    pub fn regex(&self) -> Option<&Regex> {
        self.regex
            .get_or_init(|| {
                RegexBuilder::new(&format!("^(?:{})$", self.pattern))
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .as_ref()
    }
}

impl PartialEq for MatchRule {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.pattern == other.pattern
            && self.strategy == other.strategy
            && self.extra == other.extra
            && self.comment == other.comment
    }
}

impl Eq for MatchRule {}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}{}, {}",
            self.kind,
            separator(&self.pattern),
            self.pattern,
            self.strategy
        )?;
        if let Some(extra) = &self.extra {
            write!(f, ",{}{}", separator(extra), extra)?;
        }
        if let Some(comment) = &self.comment {
            write!(f, " //{}", comment)?;
        }
        Ok(())
    }
}

/// Space written before a field.
///
/// A `//` after whitespace starts a comment, so a field that begins with
/// `//` is written directly after its delimiter.
fn separator(field: &str) -> &'static str {
    if field.starts_with("//") {
        ""
    } else {
        " "
    }
}

/// One line of a policy document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleLine {
    /// A section header.
    Section(Section),
    /// A `[General]` setting.
    General(GeneralSetting),
    /// A `[Rule]` entry.
    Rule(MatchRule),
    /// A `[Host]` alias line, kept verbatim.
    ///
    /// Only produced when host aliasing is supported (see
    /// [`HOST_ALIAS_SUPPORTED`](super::parse::HOST_ALIAS_SUPPORTED)). Until
    /// then alias lines parse as [`RuleLine::Opaque`].
    HostAlias(String),
    /// Anything else, kept verbatim.
    Opaque(String),
}

impl RuleLine {
    /// Returns the general setting, if this is one.
    pub fn as_general(&self) -> Option<&GeneralSetting> {
        match self {
            RuleLine::General(setting) => Some(setting),
            _ => None,
        }
    }

    /// Returns the match rule, if this is one.
    pub fn as_rule(&self) -> Option<&MatchRule> {
        match self {
            RuleLine::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    /// Returns the section, if this is a header.
    pub fn as_section(&self) -> Option<Section> {
        match self {
            RuleLine::Section(section) => Some(*section),
            _ => None,
        }
    }

    /// Returns true if this line is kept verbatim.
    pub fn is_opaque(&self) -> bool {
        matches!(self, RuleLine::Opaque(_))
    }
}

impl fmt::Display for RuleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleLine::Section(section) => f.write_str(section.header()),
            RuleLine::General(setting) => setting.fmt(f),
            RuleLine::Rule(rule) => rule.fmt(f),
            RuleLine::HostAlias(raw) | RuleLine::Opaque(raw) => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Token Tests ====================

    #[test]
    fn section_headers_ignore_case() {
        assert_eq!(Section::parse_header("[General]"), Some(Section::General));
        assert_eq!(Section::parse_header("  [RULE] "), Some(Section::Rule));
        assert_eq!(Section::parse_header("[host]"), Some(Section::Host));
        assert_eq!(Section::parse_header("[Proxy]"), None);
    }

    #[test]
    fn strategy_tokens() {
        for strategy in [
            Strategy::Direct,
            Strategy::Reject,
            Strategy::Copy,
            Strategy::Default,
            Strategy::None,
        ] {
            assert_eq!(Strategy::parse(strategy.token()), Some(strategy));
        }
        assert_eq!(Strategy::parse("reject"), Some(Strategy::Reject));
        assert_eq!(Strategy::parse("PROXY"), None);
    }

    #[test]
    fn match_kind_tokens() {
        assert_eq!(MatchKind::parse("domain-suffix"), Some(MatchKind::DomainSuffix));
        assert_eq!(MatchKind::parse("URL-REGEX"), Some(MatchKind::UrlRegex));
        assert_eq!(MatchKind::parse("GEOIP"), None);
        assert_eq!(MatchKind::IpCidr.token(), "IP-CIDR");
    }

    #[test]
    fn general_keys() {
        assert_eq!(GeneralKey::parse("Default-Strategy"), Some(GeneralKey::DefaultStrategy));
        assert_eq!(GeneralKey::parse("createtime"), Some(GeneralKey::CreateTime));
        assert_eq!(GeneralKey::parse("skip-proxy"), None);
    }

    // ==================== Rendering Tests ====================

    #[test]
    fn general_setting_renders() {
        let setting = GeneralSetting::new(GeneralKey::Name, "Test");
        assert_eq!(setting.to_string(), "name = Test");

        let setting = setting.with_comment("shown in the list");
        assert_eq!(setting.to_string(), "name = Test // shown in the list");
    }

    #[test]
    fn match_rule_renders() {
        let rule = MatchRule::new(MatchKind::DomainSuffix, "example.com", Strategy::Reject);
        assert_eq!(rule.to_string(), "DOMAIN-SUFFIX, example.com, REJECT");

        let rule = MatchRule::new(MatchKind::Domain, "a.com", Strategy::None)
            .with_extra("no-resolve")
            .with_comment("ads");
        assert_eq!(rule.to_string(), "DOMAIN, a.com, -, no-resolve //ads");
    }

    #[test]
    fn leading_slashes_stay_attached() {
        let setting = GeneralSetting::new(GeneralKey::Note, "//shared");
        assert_eq!(setting.to_string(), "note =//shared");

        let rule = MatchRule::new(MatchKind::DomainKeyword, "//cdn", Strategy::Copy)
            .with_extra("//x");
        assert_eq!(rule.to_string(), "DOMAIN-KEYWORD,//cdn, COPY,//x");
    }

    #[test]
    fn opaque_renders_verbatim() {
        let line = RuleLine::Opaque("  # keep me  ".to_string());
        assert_eq!(line.to_string(), "  # keep me  ");
    }

    #[test]
    fn host_alias_renders_verbatim() {
        let line = RuleLine::HostAlias("example.com = 10.0.0.1".to_string());
        assert_eq!(line.to_string(), "example.com = 10.0.0.1");
        assert!(!line.is_opaque());
    }

    // ==================== Regex Tests ====================

    #[test]
    fn regex_is_anchored_and_case_insensitive() {
        let rule = MatchRule::new(MatchKind::UrlRegex, r"api\.example\.com/v\d+/.*", Strategy::Copy);
        let regex = rule.regex().unwrap();
        assert!(regex.is_match("API.example.com/v1/users"));
        assert!(!regex.is_match("xapi.example.com/v1/users"));
    }

    #[test]
    fn invalid_regex_is_none() {
        let rule = MatchRule::new(MatchKind::UrlRegex, "([a-z", Strategy::Copy);
        assert!(rule.regex().is_none());
    }

    #[test]
    fn rule_equality_ignores_regex_cache() {
        let a = MatchRule::new(MatchKind::UrlRegex, ".*", Strategy::Copy);
        let b = a.clone();
        let _ = a.regex();
        assert_eq!(a, b);
    }
}
