//! # codecite-link
//!
//! Linking passes that connect publications to repositories and citation records:
//! - Date-window validation of provider candidates
//! - Repository identity resolution with an optional reference ceiling
//! - Canonical (earliest) ownership of repositories
//! - Throttled provider access with bounded retry

pub mod citation_matcher;
pub mod date_window;
pub mod identity_resolver;
pub mod ownership;
pub mod providers;
pub mod repository_linker;

pub use citation_matcher::{CitationMatcher, MatchCandidate, MatchOutcome, MatchReport};
pub use date_window::{validate_candidate, year_in_window, WindowVerdict};
pub use identity_resolver::{IdentityResolver, Resolution};
pub use ownership::{LinkOutcome, LinkReport, OwnershipAssignor};
pub use repository_linker::{LinkSource, LinkedReference, LinkingReport, RepositoryLinker};
