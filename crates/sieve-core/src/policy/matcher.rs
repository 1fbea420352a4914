//! Rule matcher.
//!
//! ## Evaluation Order
//!
//! 1. The default deny-list, when the policy passes traffic through by
//!    default and the deny-list is enabled
//! 2. The policy's own rules, in document order
//!
//! The first matching rule wins. A `URL-REGEX` rule whose pattern does not
//! compile ends the evaluation with no match.

use std::borrow::Cow;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::document::Policy;
use super::line::{MatchKind, MatchRule, Strategy};

/// Characters escaped when a URL or pattern is percent-encoded for matching.
const URL_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Returns true if `uri` starts with a `scheme://` prefix.
///
/// A `://` that appears later, such as in a query value, does not make a
/// path absolute.
pub fn is_absolute_uri(uri: &str) -> bool {
    if uri.starts_with('/') {
        return false;
    }
    let Some(end) = uri.find("://") else {
        return false;
    };
    let scheme = &uri[..end];
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// The request attributes a rule can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext<'a> {
    /// Target host, without port.
    pub host: &'a str,
    /// Absolute URL or path plus query.
    pub uri: &'a str,
    /// Client identifier, usually the User-Agent.
    pub client_identifier: &'a str,
}

impl<'a> RequestContext<'a> {
    pub fn new(host: &'a str, uri: &'a str, client_identifier: &'a str) -> Self {
        Self {
            host,
            uri,
            client_identifier,
        }
    }

    /// Returns true if `uri` is a path rather than an absolute URL.
    pub fn is_relative(&self) -> bool {
        !is_absolute_uri(self.uri)
    }

    /// Returns the full URL: `host + uri` for a relative uri, the uri itself
    /// otherwise.
    pub fn effective_url(&self) -> Cow<'a, str> {
        if self.is_relative() {
            Cow::Owned(format!("{}{}", self.host, self.uri))
        } else {
            Cow::Borrowed(self.uri)
        }
    }
}

/// Which list supplied the matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrigin {
    /// The bundled default deny-list.
    DenyList,
    /// The policy's `[Rule]` section.
    Policy,
}

/// Result of matching a request against a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A rule matched.
    Matched {
        /// The first matching rule.
        rule: MatchRule,
        /// Where the rule came from.
        origin: MatchOrigin,
    },
    /// No rule matched, or evaluation was aborted.
    Unmatched,
}

impl MatchOutcome {
    /// Returns true if a rule matched.
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }

    /// Returns the matched rule's strategy.
    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            MatchOutcome::Matched { rule, .. } => Some(rule.strategy),
            MatchOutcome::Unmatched => None,
        }
    }

    /// Returns the matched rule.
    pub fn rule(&self) -> Option<&MatchRule> {
        match self {
            MatchOutcome::Matched { rule, .. } => Some(rule),
            MatchOutcome::Unmatched => None,
        }
    }

    /// Returns where the matched rule came from.
    pub fn origin(&self) -> Option<MatchOrigin> {
        match self {
            MatchOutcome::Matched { origin, .. } => Some(*origin),
            MatchOutcome::Unmatched => None,
        }
    }
}

/// Evaluation was cut short by an uncompilable pattern.
struct Aborted;

/// Matches a request against a policy.
pub fn matches(ctx: &RequestContext<'_>, policy: &Policy) -> MatchOutcome {
    match evaluate(ctx, policy) {
        Ok(Some((rule, origin))) => {
            debug!(
                host = ctx.host,
                rule = %rule,
                origin = ?origin,
                "Request matched"
            );
            MatchOutcome::Matched {
                rule: rule.clone(),
                origin,
            }
        }
        Ok(None) | Err(Aborted) => MatchOutcome::Unmatched,
    }
}

fn evaluate<'p>(
    ctx: &RequestContext<'_>,
    policy: &'p Policy,
) -> Result<Option<(&'p MatchRule, MatchOrigin)>, Aborted> {
    if policy.default_strategy() == Strategy::Direct && policy.deny_list_enabled() {
        for rule in policy.deny_list().rules() {
            if rule_matches(rule, ctx)? {
                return Ok(Some((rule, MatchOrigin::DenyList)));
            }
        }
    }

    for rule in policy.rules() {
        if rule_matches(rule, ctx)? {
            return Ok(Some((rule, MatchOrigin::Policy)));
        }
    }

    Ok(None)
}

fn rule_matches(rule: &MatchRule, ctx: &RequestContext<'_>) -> Result<bool, Aborted> {
    let pattern = rule.pattern.as_str();

    let matched = match rule.kind {
        MatchKind::Domain => ctx.host.eq_ignore_ascii_case(pattern),
        MatchKind::DomainKeyword => {
            contains_ignore_case(ctx.host, pattern)
                || (ctx.is_relative() && contains_ignore_case(&ctx.effective_url(), pattern))
        }
        MatchKind::DomainSuffix => ends_with_ignore_case(ctx.host, pattern),
        MatchKind::UrlRegex => {
            let Some(regex) = rule.regex() else {
                warn!(pattern, "URL-REGEX pattern does not compile, aborting match");
                return Err(Aborted);
            };
            let url = ctx.effective_url();
            regex.is_match(ctx.host)
                || regex.is_match(&url)
                || regex.is_match(&percent_encode(&url))
        }
        MatchKind::UserAgent => {
            contains_ignore_case(ctx.client_identifier, pattern)
                || contains_ignore_case(ctx.client_identifier, &percent_encode(pattern))
        }
        MatchKind::IpCidr => false,
    };

    Ok(matched)
}

fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, URL_ESCAPE).to_string()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

fn ends_with_ignore_case(haystack: &str, suffix: &str) -> bool {
    haystack.len() >= suffix.len()
        && haystack.is_char_boundary(haystack.len() - suffix.len())
        && haystack[haystack.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::policy::deny_list::DenyList;

    const EXAMPLE: &str = "[General]\nname = Test\ndefault-strategy = DIRECT\n[Rule]\nDOMAIN-SUFFIX,example.com,REJECT\n";

    fn ctx<'a>(host: &'a str, uri: &'a str) -> RequestContext<'a> {
        RequestContext::new(host, uri, "agent/1.0")
    }

    fn policy(rules: &str) -> Policy {
        Policy::parse(&format!(
            "[General]\ndefault-strategy = COPY\n[Rule]\n{}",
            rules
        ))
    }

    // ==================== Context Tests ====================

    #[test]
    fn effective_url_joins_relative_uri() {
        assert_eq!(ctx("a.com", "/x?y=1").effective_url(), "a.com/x?y=1");
        assert_eq!(
            ctx("a.com", "https://a.com/x").effective_url(),
            "https://a.com/x"
        );
    }

    #[test]
    fn embedded_scheme_in_query_is_relative() {
        let request = ctx("a.com", "/redirect?to=https://b.com");
        assert!(request.is_relative());
        assert_eq!(request.effective_url(), "a.com/redirect?to=https://b.com");

        let outcome = matches(&request, &policy("URL-REGEX,^a\\.com/redirect.*,REJECT\n"));
        assert_eq!(outcome.strategy(), Some(Strategy::Reject));
    }

    #[test]
    fn absolute_uri_detection() {
        assert!(is_absolute_uri("https://a.com/x"));
        assert!(is_absolute_uri("svn+ssh://host/repo"));
        assert!(!is_absolute_uri("/x?u=http://b.com"));
        assert!(!is_absolute_uri("x?u=http://b.com"));
        assert!(!is_absolute_uri("://a.com"));
        assert!(!is_absolute_uri("a.com"));
    }

    // ==================== Scenario Tests ====================

    #[test]
    fn example_policy_matches_suffix() {
        let policy = Policy::parse(EXAMPLE);
        let outcome = matches(&ctx("api.example.com", "/v1/x"), &policy);

        assert!(outcome.is_match());
        assert_eq!(outcome.strategy(), Some(Strategy::Reject));
        assert_eq!(outcome.origin(), Some(MatchOrigin::Policy));
    }

    #[test]
    fn example_policy_skips_other_host() {
        let policy = Policy::parse(EXAMPLE);
        assert_eq!(matches(&ctx("other.com", "/"), &policy), MatchOutcome::Unmatched);
    }

    #[test]
    fn first_rule_wins() {
        let policy = policy("DOMAIN,a.com,REJECT\nDOMAIN-SUFFIX,a.com,DIRECT\n");
        let outcome = matches(&ctx("a.com", "/"), &policy);

        assert_eq!(outcome.strategy(), Some(Strategy::Reject));
        assert_eq!(outcome.rule().map(|r| r.kind), Some(MatchKind::Domain));
    }

    // ==================== Deny-list Tests ====================

    fn deny_list() -> Arc<DenyList> {
        Arc::new(DenyList::parse("[Rule]\nDOMAIN-SUFFIX,push.apple.com,DIRECT\n"))
    }

    #[test]
    fn deny_list_consulted_for_direct_default() {
        let policy = Policy::parse("[General]\ndefault-strategy = DIRECT\n[Rule]\nDOMAIN-SUFFIX,apple.com,REJECT\n")
            .with_deny_list(deny_list());
        let outcome = matches(&ctx("api.push.apple.com", "/"), &policy);

        assert_eq!(outcome.origin(), Some(MatchOrigin::DenyList));
        assert_eq!(outcome.strategy(), Some(Strategy::Direct));
    }

    #[test]
    fn deny_list_skipped_for_copy_default() {
        let policy = policy("").with_deny_list(deny_list());
        assert!(!matches(&ctx("api.push.apple.com", "/"), &policy).is_match());
    }

    #[test]
    fn deny_list_skipped_when_disabled() {
        let policy =
            Policy::parse("[General]\ndefault-direct-enable = false\n").with_deny_list(deny_list());
        assert!(!matches(&ctx("api.push.apple.com", "/"), &policy).is_match());
    }

    #[test]
    fn bundled_deny_list_applies_by_default() {
        let policy = Policy::parse("[General]\nname = Default\n");
        let outcome = matches(&ctx("api.push.apple.com", "/"), &policy);
        assert_eq!(outcome.origin(), Some(MatchOrigin::DenyList));
    }

    // ==================== Match Kind Tests ====================

    #[test]
    fn domain_is_exact_and_case_insensitive() {
        let policy = policy("DOMAIN,A.com,REJECT\n");
        assert!(matches(&ctx("a.COM", "/"), &policy).is_match());
        assert!(!matches(&ctx("b.a.com", "/"), &policy).is_match());
    }

    #[test]
    fn keyword_checks_host_and_relative_url() {
        let policy = policy("DOMAIN-KEYWORD,track,REJECT\n");
        assert!(matches(&ctx("tracker.io", "/"), &policy).is_match());
        assert!(matches(&ctx("a.com", "/TRACK/x"), &policy).is_match());
        assert!(!matches(&ctx("a.com", "https://a.com/track"), &policy).is_match());
    }

    #[test]
    fn suffix_is_case_insensitive() {
        let policy = policy("DOMAIN-SUFFIX,Example.com,REJECT\n");
        assert!(matches(&ctx("API.EXAMPLE.COM", "/"), &policy).is_match());
        assert!(!matches(&ctx("example.org", "/"), &policy).is_match());
    }

    #[test]
    fn regex_is_full_string() {
        let policy = policy(r"URL-REGEX,a\.com/v\d+/.*,COPY");
        assert!(matches(&ctx("a.com", "/v2/users"), &policy).is_match());
        assert!(!matches(&ctx("xa.com", "/v2/users"), &policy).is_match());
    }

    #[test]
    fn regex_tests_host_alone() {
        let policy = policy(r"URL-REGEX,.*\.cdn\.net,COPY");
        assert!(matches(&ctx("img.cdn.net", "/a.png"), &policy).is_match());
    }

    #[test]
    fn regex_tests_encoded_url() {
        let policy = policy(r"URL-REGEX,a\.com/search\?q=a%20b,COPY");
        assert!(matches(&ctx("a.com", "/search?q=a b"), &policy).is_match());
    }

    #[test]
    fn invalid_regex_aborts_match() {
        let policy = policy("URL-REGEX,([a-z,COPY\nDOMAIN,a.com,REJECT\n");
        assert_eq!(matches(&ctx("a.com", "/"), &policy), MatchOutcome::Unmatched);
    }

    #[test]
    fn user_agent_substring() {
        let policy = policy("USER-AGENT,MyApp,COPY\n");
        let hit = RequestContext::new("a.com", "/", "myapp/2.1 CFNetwork");
        let miss = RequestContext::new("a.com", "/", "Safari");
        assert!(matches(&hit, &policy).is_match());
        assert!(!matches(&miss, &policy).is_match());
    }

    #[test]
    fn user_agent_encoded_pattern() {
        let policy = policy("USER-AGENT,My App,COPY\n");
        let ctx = RequestContext::new("a.com", "/", "My%20App/1.0");
        assert!(matches(&ctx, &policy).is_match());
    }

    #[test]
    fn ip_cidr_never_matches() {
        let policy = policy("IP-CIDR,10.0.0.0/8,REJECT\n");
        assert!(!matches(&ctx("10.1.2.3", "/"), &policy).is_match());
    }
}
