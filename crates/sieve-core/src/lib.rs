//! Sieve Core - traffic policies, request matching and body recovery.
//!
//! This crate has no I/O of its own apart from loading a policy file. Storage
//! and export live in `sieve-storage` and `sieve-export`.

pub mod codec;
pub mod policy;

pub use codec::{recover, recover_text, try_recover, Codec, Recovery};
pub use policy::{
    is_absolute_uri, matches, MatchKind, MatchOrigin, MatchOutcome, MatchRule, Policy, PolicyId,
    PolicyStore, RequestContext, RuleLine, Strategy,
};
