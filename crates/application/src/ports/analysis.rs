use async_trait::async_trait;

use elevara_core::{AppResult, ProjectId, ResourceId, UserId};
use elevara_domain::{IamCondition, IamPolicy};

/// Evaluation value of a condition that held at analysis time.
pub const CONDITION_EVALUATION_TRUE: &str = "TRUE";

/// Evaluation value of a condition the analyzer could not decide; the
/// sentinel markers always evaluate to this.
pub const CONDITION_EVALUATION_CONDITIONAL: &str = "CONDITIONAL";

/// The IAM binding a policy analysis entry refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisBinding {
    /// Role name.
    pub role: String,
    /// Condition attached to the binding, if any.
    pub condition: Option<IamCondition>,
}

/// One access-control entry of an analysis result: how a binding applies to a
/// set of resources under a condition evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlEntry {
    /// Evaluation value, e.g. `TRUE` or `CONDITIONAL`; absent for
    /// unconditional bindings.
    pub condition_evaluation: Option<String>,
    /// Fully qualified names of the resources the entry covers.
    pub resource_full_names: Vec<String>,
}

/// A principal surfaced by a principals-by-resource analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisIdentity {
    /// Tagged principal reference, e.g. `user:alice@example.com`.
    pub name: String,
}

/// One entry of a policy analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnalysisEntry {
    /// The analyzed binding; absent for malformed entries.
    pub binding: Option<AnalysisBinding>,
    /// Access-control entries derived from the binding.
    pub access_control_entries: Vec<AccessControlEntry>,
    /// Principals the binding applies to, for principals-by-resource queries.
    pub identities: Vec<AnalysisIdentity>,
}

/// Result of a policy analysis query.
#[derive(Debug, Clone, Default)]
pub struct PolicyAnalysis {
    /// Analysis entries.
    pub entries: Vec<AnalysisEntry>,
    /// Non-critical errors encountered during analysis; surfaced to callers
    /// as warnings, never failing the query.
    pub non_critical_errors: Vec<String>,
}

/// An IAM policy together with the resource it is attached to.
#[derive(Debug, Clone)]
pub struct PolicyWithSource {
    /// Fully qualified name of the resource carrying the policy.
    pub attached_resource: String,
    /// The policy document.
    pub policy: IamPolicy,
}

/// Policy-analysis collaborator.
#[async_trait]
pub trait PolicyAnalyzer: Send + Sync {
    /// Finds resources a user can access within a scope, optionally filtered
    /// by permission or by a single resource. With `expand_resources`, the
    /// analysis lists every descendant resource a binding applies to.
    async fn find_accessible_resources_by_user(
        &self,
        scope: &ResourceId,
        user: &UserId,
        permission_filter: Option<&str>,
        resource_filter: Option<&str>,
        expand_resources: bool,
    ) -> AppResult<PolicyAnalysis>;

    /// Finds principals holding a role on a resource.
    async fn find_permissioned_principals_by_resource(
        &self,
        scope: &ResourceId,
        resource_full_name: &str,
        role: &str,
    ) -> AppResult<PolicyAnalysis>;

    /// Returns the effective IAM policies applying to a project: the
    /// project's own policy plus the policies of its ancestry.
    async fn get_effective_iam_policies(
        &self,
        scope: &ResourceId,
        project: &ProjectId,
    ) -> AppResult<Vec<PolicyWithSource>>;
}
