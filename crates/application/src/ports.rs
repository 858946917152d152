//! Collaborator ports consumed by the application services.
//!
//! The real cloud clients live outside the core; these narrow traits are what
//! the services are wired against, and what tests fake.

mod analysis;
mod directory;
mod resource_manager;
mod signing;

pub use analysis::{
    AccessControlEntry, AnalysisBinding, AnalysisEntry, AnalysisIdentity, PolicyAnalysis,
    PolicyAnalyzer, PolicyWithSource, CONDITION_EVALUATION_CONDITIONAL, CONDITION_EVALUATION_TRUE,
};
pub use directory::DirectoryGroups;
pub use resource_manager::{ResourceManager, ResourceTag};
pub use signing::{service_account_jwks_url, JwtSigner, KeySetSource, SecretStore};
