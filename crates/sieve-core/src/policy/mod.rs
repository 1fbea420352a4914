//! Traffic policies: document model, parser, deny-list and matcher.

pub mod deny_list;
pub mod document;
pub mod line;
pub mod matcher;
pub mod parse;
pub mod store;

pub use deny_list::DenyList;
pub use document::Policy;
pub use line::{GeneralKey, GeneralSetting, MatchKind, MatchRule, RuleLine, Section, Strategy};
pub use matcher::{is_absolute_uri, matches, MatchOrigin, MatchOutcome, RequestContext};
pub use parse::HOST_ALIAS_SUPPORTED;
pub use store::{PolicyId, PolicyStore};
