//! Line-oriented policy parser.
//!
//! Parsing never fails. A line that does not fit the grammar of its section
//! becomes [`RuleLine::Opaque`] and is written back unchanged, so a malformed
//! document still loads and only the bad lines lose their effect.

use tracing::debug;

use super::line::{GeneralKey, GeneralSetting, MatchKind, MatchRule, RuleLine, Section, Strategy};

/// `[Host]` lines are recognised as a section but not interpreted; every
/// alias line falls through to an opaque line.
pub const HOST_ALIAS_SUPPORTED: bool = false;

/// Parses a whole document into lines.
pub fn parse_lines(text: &str) -> Vec<RuleLine> {
    let mut current: Option<Section> = None;
    let mut lines = Vec::new();

    for raw in text.lines() {
        if let Some(section) = Section::parse_header(raw) {
            current = Some(section);
            lines.push(RuleLine::Section(section));
            continue;
        }

        let parsed = match current {
            Some(Section::General) => parse_general_line(raw).map(RuleLine::General),
            Some(Section::Rule) => parse_rule_line(raw).map(RuleLine::Rule),
            Some(Section::Host) => parse_host_line(raw),
            None => None,
        };

        match parsed {
            Some(line) => lines.push(line),
            None => {
                if !raw.trim().is_empty() {
                    debug!(line = raw, section = ?current, "Keeping unparsed policy line");
                }
                lines.push(RuleLine::Opaque(raw.to_string()));
            }
        }
    }

    lines
}

/// Splits a trailing `//` comment off a line.
///
/// The delimiter only counts at the start of the line or after whitespace,
/// which keeps `scheme://` inside patterns intact.
pub fn split_comment(line: &str) -> (&str, Option<&str>) {
    let bytes = line.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = line[search_from..].find("//") {
        let idx = search_from + offset;
        if idx == 0 || bytes[idx - 1].is_ascii_whitespace() {
            return (&line[..idx], Some(line[idx + 2..].trim()));
        }
        search_from = idx + 2;
    }

    (line, None)
}

/// Parses a `key = value [// comment]` line.
///
/// Unknown keys are rejected so the line is preserved verbatim.
pub fn parse_general_line(line: &str) -> Option<GeneralSetting> {
    let (payload, comment) = split_comment(line);
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    let (key, value) = payload.split_once('=')?;
    let key = GeneralKey::parse(key)?;

    Some(GeneralSetting {
        key,
        value: value.trim().to_string(),
        comment: non_empty(comment),
    })
}

/// Parses a `KIND, pattern, STRATEGY[, extra] [//comment]` line.
pub fn parse_rule_line(line: &str) -> Option<MatchRule> {
    let (payload, comment) = split_comment(line);
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    let mut fields = payload.splitn(4, ',');
    let kind = MatchKind::parse(fields.next()?)?;
    let pattern = fields.next()?.trim();
    if pattern.is_empty() {
        return None;
    }
    let strategy = Strategy::parse(fields.next()?)?;
    let extra = fields.next().map(str::trim).filter(|s| !s.is_empty());

    let mut rule = MatchRule::new(kind, pattern, strategy);
    rule.extra = extra.map(str::to_string);
    rule.comment = non_empty(comment);
    Some(rule)
}

/// Parses a `[Host]` line into [`RuleLine::HostAlias`].
///
/// Declines while [`HOST_ALIAS_SUPPORTED`] is false, so the caller keeps the
/// line opaque.
pub fn parse_host_line(line: &str) -> Option<RuleLine> {
    if !HOST_ALIAS_SUPPORTED || line.trim().is_empty() {
        return None;
    }
    Some(RuleLine::HostAlias(line.to_string()))
}

fn non_empty(comment: Option<&str>) -> Option<String> {
    comment.filter(|c| !c.is_empty()).map(str::to_string)
}
