//! Application services and collaborator ports for the Elevara activation
//! engine.

#![forbid(unsafe_code)]

mod activation_service;
mod asset_inventory_repository;
mod binding_mutator;
mod catalog;
mod diagnostics;
mod executor;
mod notification;
mod policy_analyzer_repository;
mod ports;
mod repository;
mod token_service;

pub use activation_service::Activator;
pub use asset_inventory_repository::{AssetInventoryRepository, AssetInventoryRepositoryOptions};
pub use binding_mutator::{ApplyOptions, BindingMutator};
pub use catalog::{CatalogOptions, ProjectRoleCatalog};
pub use diagnostics::{Diagnosable, DiagnosticResult, DiagnosticsService, ReadinessReport};
pub use executor::BoundedExecutor;
pub use notification::{NotificationEvent, NotificationService, NotificationSink};
pub use policy_analyzer_repository::{
    PolicyAnalyzerRepository, PolicyAnalyzerRepositoryOptions,
};
pub use ports::{
    service_account_jwks_url, AccessControlEntry, AnalysisBinding, AnalysisEntry,
    AnalysisIdentity, DirectoryGroups, JwtSigner, KeySetSource, PolicyAnalysis, PolicyAnalyzer,
    PolicyWithSource, ResourceManager, ResourceTag, SecretStore, CONDITION_EVALUATION_CONDITIONAL,
    CONDITION_EVALUATION_TRUE,
};
pub use repository::ProjectRoleRepository;
pub use token_service::{
    deobfuscate_token, obfuscate_token, SignedApproval, TokenService, TokenServiceOptions,
};
