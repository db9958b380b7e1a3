pub mod catalog;
pub mod pool;

pub use catalog::{validate_draft, RoutingRuleCatalog, RuleTestReport};
pub use pool::{compare_candidates, rank, ProviderCandidatePool};
