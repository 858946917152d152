//! Entitlement repository backed by the policy-analysis collaborator.
//!
//! Entitlements are role bindings annotated with a sentinel IAM condition
//! that makes the binding eligible rather than effective.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use elevara_core::{AppResult, ProjectId, ProjectRoleBinding, ResourceId, RoleBinding, UserId};
use elevara_domain::{
    is_activated, is_approval_marker, is_jit_marker, is_mpa_marker, ActivationType, Entitlement,
    EntitlementSet, EntitlementStatus, IamCondition,
};

use crate::ports::{
    PolicyAnalysis, PolicyAnalyzer, ResourceManager, CONDITION_EVALUATION_CONDITIONAL,
    CONDITION_EVALUATION_TRUE,
};
use crate::repository::ProjectRoleRepository;

/// Permission used to discover projects. It only applies to projects, has no
/// meaning on descendant resources, and represents the lowest level of
/// project access, which keeps expanded analysis results small.
const PROJECT_DISCOVERY_PERMISSION: &str = "resourcemanager.projects.get";

/// Options for [`PolicyAnalyzerRepository`].
#[derive(Debug, Clone)]
pub struct PolicyAnalyzerRepositoryOptions {
    /// Scope for analysis queries.
    pub scope: ResourceId,
    /// When set, only projects carrying this namespaced tag value are
    /// surfaced by project discovery.
    pub required_project_tag_path: Option<String>,
}

/// Repository that uses the policy-analysis API to find entitlements.
pub struct PolicyAnalyzerRepository {
    policy_analyzer: Arc<dyn PolicyAnalyzer>,
    resource_manager: Arc<dyn ResourceManager>,
    options: PolicyAnalyzerRepositoryOptions,
}

impl PolicyAnalyzerRepository {
    /// Creates a repository over the analysis and resource-manager ports.
    #[must_use]
    pub fn new(
        policy_analyzer: Arc<dyn PolicyAnalyzer>,
        resource_manager: Arc<dyn ResourceManager>,
        options: PolicyAnalyzerRepositoryOptions,
    ) -> Self {
        Self {
            policy_analyzer,
            resource_manager,
            options,
        }
    }

    /// Extracts project role bindings from an analysis, keeping entries whose
    /// binding condition satisfies `condition_matches` and whose access
    /// control entries satisfy `evaluation_matches`.
    fn find_role_bindings(
        analysis: &PolicyAnalysis,
        condition_matches: impl Fn(Option<&IamCondition>) -> bool,
        evaluation_matches: impl Fn(Option<&str>) -> bool,
    ) -> Vec<RoleBinding> {
        // The attached resource does not matter here; what matters is which
        // resources an entry applies to.
        analysis
            .entries
            .iter()
            .filter_map(|entry| entry.binding.as_ref().map(|binding| (entry, binding)))
            .filter(|(_, binding)| condition_matches(binding.condition.as_ref()))
            .flat_map(|(entry, binding)| {
                entry
                    .access_control_entries
                    .iter()
                    .filter(|ace| evaluation_matches(ace.condition_evaluation.as_deref()))
                    .flat_map(|ace| ace.resource_full_names.iter())
                    .filter(|name| ProjectId::is_project_full_resource_name(name))
                    .map(|name| RoleBinding::new(name.clone(), binding.role.clone()))
            })
            .collect()
    }

    async fn filter_by_required_tag(
        &self,
        projects: BTreeSet<ProjectId>,
        tag_path: &str,
    ) -> AppResult<BTreeSet<ProjectId>> {
        // Tags are filtered last; each check costs one resource-manager call.
        let mut filtered = BTreeSet::new();
        for project in projects {
            let tags = self
                .resource_manager
                .get_project_effective_tags(&project.full_resource_name())
                .await?;

            if tags.iter().any(|tag| tag.namespaced_value == tag_path) {
                filtered.insert(project);
            }
        }

        Ok(filtered)
    }
}

#[async_trait]
impl ProjectRoleRepository for PolicyAnalyzerRepository {
    async fn find_projects_with_entitlements(
        &self,
        user: &UserId,
    ) -> AppResult<BTreeSet<ProjectId>> {
        // Inherited bindings only become visible with expanded resources, so
        // the analysis is filtered to a minimal project-level permission to
        // keep the result below the API's truncation limits.
        let analysis = self
            .policy_analyzer
            .find_accessible_resources_by_user(
                &self.options.scope,
                user,
                Some(PROJECT_DISCOVERY_PERMISSION),
                None,
                true,
            )
            .await?;

        // Consider permanent and eligible bindings alike.
        let role_bindings = Self::find_role_bindings(
            &analysis,
            |condition| {
                condition.is_none() || is_jit_marker(condition) || is_mpa_marker(condition)
            },
            |evaluation| {
                evaluation.is_none_or(|value| {
                    value.eq_ignore_ascii_case(CONDITION_EVALUATION_TRUE)
                        || value.eq_ignore_ascii_case(CONDITION_EVALUATION_CONDITIONAL)
                })
            },
        );

        let projects: BTreeSet<ProjectId> = role_bindings
            .iter()
            .filter_map(|binding| {
                ProjectId::from_full_resource_name(binding.resource_full_name()).ok()
            })
            .collect();

        match self.options.required_project_tag_path.as_deref() {
            Some(tag_path) if !tag_path.trim().is_empty() => {
                self.filter_by_required_tag(projects, tag_path).await
            }
            _ => Ok(projects),
        }
    }

    async fn find_entitlements(
        &self,
        user: &UserId,
        project: &ProjectId,
        types: &BTreeSet<ActivationType>,
        statuses: &BTreeSet<EntitlementStatus>,
    ) -> AppResult<EntitlementSet> {
        // The existence of an eligibility condition alone is not sufficient;
        // it must sit on a binding that applies to this user. The analysis
        // considers group memberships on the caller's behalf.
        let analysis = self
            .policy_analyzer
            .find_accessible_resources_by_user(
                &self.options.scope,
                user,
                None,
                Some(&project.full_resource_name()),
                false,
            )
            .await?;

        let mut available: BTreeSet<Entitlement> = BTreeSet::new();
        if statuses.contains(&EntitlementStatus::Available) {
            let jit_eligible: BTreeSet<ProjectRoleBinding> =
                if types.contains(&ActivationType::Jit) {
                    Self::find_role_bindings(
                        &analysis,
                        |condition| is_jit_marker(condition),
                        |evaluation| {
                            evaluation.is_some_and(|value| {
                                value.eq_ignore_ascii_case(CONDITION_EVALUATION_CONDITIONAL)
                            })
                        },
                    )
                    .into_iter()
                    .filter_map(|binding| ProjectRoleBinding::new(binding).ok())
                    .collect()
                } else {
                    BTreeSet::new()
                };

            let mpa_eligible: BTreeSet<ProjectRoleBinding> =
                if types.contains(&ActivationType::Mpa) {
                    Self::find_role_bindings(
                        &analysis,
                        |condition| is_mpa_marker(condition),
                        |evaluation| {
                            evaluation.is_some_and(|value| {
                                value.eq_ignore_ascii_case(CONDITION_EVALUATION_CONDITIONAL)
                            })
                        },
                    )
                    .into_iter()
                    .filter_map(|binding| ProjectRoleBinding::new(binding).ok())
                    .collect()
                } else {
                    BTreeSet::new()
                };

            // When a role is both JIT- and MPA-eligible, only the
            // JIT-eligible entitlement is retained.
            for binding in &jit_eligible {
                available.insert(Entitlement::new(
                    binding.clone(),
                    ActivationType::Jit,
                    EntitlementStatus::Available,
                ));
            }
            for binding in mpa_eligible {
                if !jit_eligible.contains(&binding) {
                    available.insert(Entitlement::new(
                        binding,
                        ActivationType::Mpa,
                        EntitlementStatus::Available,
                    ));
                }
            }
        }

        let mut active: BTreeSet<ProjectRoleBinding> = BTreeSet::new();
        if statuses.contains(&EntitlementStatus::Active) {
            // Bindings that have already been activated carry the reserved
            // time condition, and the analyzer reports it as currently true.
            let active_bindings = Self::find_role_bindings(
                &analysis,
                |condition| is_activated(condition),
                |evaluation| {
                    evaluation
                        .is_some_and(|value| value.eq_ignore_ascii_case(CONDITION_EVALUATION_TRUE))
                },
            );

            active.extend(
                active_bindings
                    .into_iter()
                    .filter_map(|binding| ProjectRoleBinding::new(binding).ok()),
            );
        }

        let warnings: BTreeSet<String> = analysis.non_critical_errors.iter().cloned().collect();

        Ok(EntitlementSet::new(available, active, warnings))
    }

    async fn find_entitlement_holders(
        &self,
        binding: &ProjectRoleBinding,
        activation_type: ActivationType,
    ) -> AppResult<BTreeSet<UserId>> {
        let analysis = self
            .policy_analyzer
            .find_permissioned_principals_by_resource(
                &self.options.scope,
                binding.role_binding().resource_full_name(),
                binding.role(),
            )
            .await?;

        let mut holders = BTreeSet::new();
        for entry in &analysis.entries {
            let has_marker = entry
                .binding
                .as_ref()
                .is_some_and(|analyzed| {
                    is_approval_marker(analyzed.condition.as_ref(), activation_type)
                });
            if !has_marker {
                continue;
            }

            for identity in &entry.identities {
                if let Some(email) = identity.name.strip_prefix("user:") {
                    if let Ok(user) = UserId::new(email) {
                        holders.insert(user);
                    }
                }
            }
        }

        Ok(holders)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use async_trait::async_trait;

    use elevara_core::{
        AppError, AppResult, ProjectId, ProjectRoleBinding, ResourceId, UserId,
    };
    use elevara_domain::{
        temporary_condition, ActivationType, EntitlementStatus, IamCondition, IamPolicy,
    };

    use crate::ports::{
        AccessControlEntry, AnalysisBinding, AnalysisEntry, AnalysisIdentity, PolicyAnalysis,
        PolicyAnalyzer, PolicyWithSource, ResourceManager, ResourceTag,
    };
    use crate::repository::ProjectRoleRepository;

    use super::{PolicyAnalyzerRepository, PolicyAnalyzerRepositoryOptions};

    fn scope() -> ResourceId {
        ResourceId::Organization(
            elevara_core::OrganizationId::new("123").unwrap_or_else(|_| unreachable!()),
        )
    }

    fn user(email: &str) -> UserId {
        UserId::new(email).unwrap_or_else(|_| unreachable!())
    }

    fn project(id: &str) -> ProjectId {
        ProjectId::new(id).unwrap_or_else(|_| unreachable!())
    }

    fn conditional_entry(role: &str, expression: &str, project_id: &str) -> AnalysisEntry {
        AnalysisEntry {
            binding: Some(AnalysisBinding {
                role: role.to_owned(),
                condition: Some(IamCondition::from_expression(expression)),
            }),
            access_control_entries: vec![AccessControlEntry {
                condition_evaluation: Some("CONDITIONAL".to_owned()),
                resource_full_names: vec![project(project_id).full_resource_name()],
            }],
            identities: Vec::new(),
        }
    }

    struct FakeAnalyzer {
        analysis: PolicyAnalysis,
    }

    #[async_trait]
    impl PolicyAnalyzer for FakeAnalyzer {
        async fn find_accessible_resources_by_user(
            &self,
            _scope: &ResourceId,
            _user: &UserId,
            _permission_filter: Option<&str>,
            _resource_filter: Option<&str>,
            _expand_resources: bool,
        ) -> AppResult<PolicyAnalysis> {
            Ok(self.analysis.clone())
        }

        async fn find_permissioned_principals_by_resource(
            &self,
            _scope: &ResourceId,
            _resource_full_name: &str,
            _role: &str,
        ) -> AppResult<PolicyAnalysis> {
            Ok(self.analysis.clone())
        }

        async fn get_effective_iam_policies(
            &self,
            _scope: &ResourceId,
            _project: &ProjectId,
        ) -> AppResult<Vec<PolicyWithSource>> {
            Err(AppError::NotSupported(
                "not needed by these tests".to_owned(),
            ))
        }
    }

    struct FakeResourceManager {
        tagged_projects: BTreeSet<String>,
        tag_path: String,
    }

    #[async_trait]
    impl ResourceManager for FakeResourceManager {
        async fn get_iam_policy(&self, _project: &ProjectId) -> AppResult<IamPolicy> {
            Err(AppError::NotSupported("not needed".to_owned()))
        }

        async fn set_iam_policy(
            &self,
            _project: &ProjectId,
            _policy: IamPolicy,
            _reason: &str,
        ) -> AppResult<()> {
            Err(AppError::NotSupported("not needed".to_owned()))
        }

        async fn get_project_effective_tags(
            &self,
            resource_full_name: &str,
        ) -> AppResult<Vec<ResourceTag>> {
            if self.tagged_projects.contains(resource_full_name) {
                Ok(vec![ResourceTag {
                    namespaced_value: self.tag_path.clone(),
                }])
            } else {
                Ok(Vec::new())
            }
        }

        async fn search_projects(&self, _query: &str) -> AppResult<BTreeSet<ProjectId>> {
            Ok(BTreeSet::new())
        }
    }

    fn repository(
        analysis: PolicyAnalysis,
        required_project_tag_path: Option<String>,
        tagged_projects: BTreeSet<String>,
    ) -> PolicyAnalyzerRepository {
        PolicyAnalyzerRepository::new(
            Arc::new(FakeAnalyzer { analysis }),
            Arc::new(FakeResourceManager {
                tagged_projects,
                tag_path: "org/team/access".to_owned(),
            }),
            PolicyAnalyzerRepositoryOptions {
                scope: scope(),
                required_project_tag_path,
            },
        )
    }

    #[tokio::test]
    async fn jit_marker_yields_available_jit_entitlement() {
        let analysis = PolicyAnalysis {
            entries: vec![conditional_entry(
                "roles/browser",
                "has({}.jitAccessConstraint)",
                "project-1",
            )],
            non_critical_errors: Vec::new(),
        };

        let set = repository(analysis, None, BTreeSet::new())
            .find_entitlements(
                &user("alice@example.com"),
                &project("project-1"),
                &BTreeSet::from([ActivationType::Jit, ActivationType::Mpa]),
                &BTreeSet::from([EntitlementStatus::Available, EntitlementStatus::Active]),
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(set.available().len(), 1);
        assert!(set
            .available()
            .iter()
            .all(|entitlement| entitlement.activation_type() == ActivationType::Jit));
        assert!(set.active().is_empty());
    }

    #[tokio::test]
    async fn marker_with_extra_conjunct_is_ignored() {
        let analysis = PolicyAnalysis {
            entries: vec![conditional_entry(
                "roles/browser",
                "has({}.jitAccessConstraint) && resource.name.startsWith(\"x\")",
                "project-1",
            )],
            non_critical_errors: Vec::new(),
        };

        let set = repository(analysis, None, BTreeSet::new())
            .find_entitlements(
                &user("alice@example.com"),
                &project("project-1"),
                &BTreeSet::from([ActivationType::Jit, ActivationType::Mpa]),
                &BTreeSet::from([EntitlementStatus::Available]),
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(set.available().is_empty());
    }

    #[tokio::test]
    async fn jit_wins_over_mpa_for_the_same_binding() {
        let analysis = PolicyAnalysis {
            entries: vec![
                conditional_entry("roles/browser", "has({}.jitAccessConstraint)", "project-1"),
                conditional_entry(
                    "roles/browser",
                    "has({}.multiPartyApprovalConstraint)",
                    "project-1",
                ),
            ],
            non_critical_errors: Vec::new(),
        };

        let set = repository(analysis, None, BTreeSet::new())
            .find_entitlements(
                &user("alice@example.com"),
                &project("project-1"),
                &BTreeSet::from([ActivationType::Jit, ActivationType::Mpa]),
                &BTreeSet::from([EntitlementStatus::Available]),
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(set.available().len(), 1);
        assert!(set
            .available()
            .iter()
            .all(|entitlement| entitlement.activation_type() == ActivationType::Jit));
    }

    #[tokio::test]
    async fn duplicate_jit_bindings_collapse_into_one_entitlement() {
        let analysis = PolicyAnalysis {
            entries: vec![
                conditional_entry("roles/browser", "has({}.jitAccessConstraint)", "project-1"),
                conditional_entry("roles/browser", "has({}.jitAccessConstraint)", "project-1"),
            ],
            non_critical_errors: Vec::new(),
        };

        let set = repository(analysis, None, BTreeSet::new())
            .find_entitlements(
                &user("alice@example.com"),
                &project("project-1"),
                &BTreeSet::from([ActivationType::Jit]),
                &BTreeSet::from([EntitlementStatus::Available]),
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(set.available().len(), 1);
    }

    #[tokio::test]
    async fn active_grants_require_true_evaluation() {
        let grant = temporary_condition(chrono::Utc::now(), chrono::Duration::minutes(5));
        let mut entry = conditional_entry("roles/browser", &grant.expression, "project-1");
        if let Some(binding) = entry.binding.as_mut() {
            binding.condition = Some(grant);
        }
        entry.access_control_entries[0].condition_evaluation = Some("TRUE".to_owned());

        let analysis = PolicyAnalysis {
            entries: vec![entry],
            non_critical_errors: Vec::new(),
        };

        let set = repository(analysis, None, BTreeSet::new())
            .find_entitlements(
                &user("alice@example.com"),
                &project("project-1"),
                &BTreeSet::from([ActivationType::Jit]),
                &BTreeSet::from([EntitlementStatus::Available, EntitlementStatus::Active]),
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(set.available().is_empty());
        assert_eq!(set.active().len(), 1);
    }

    #[tokio::test]
    async fn warnings_surface_non_critical_errors_verbatim() {
        let analysis = PolicyAnalysis {
            entries: Vec::new(),
            non_critical_errors: vec!["folder 99 truncated".to_owned()],
        };

        let set = repository(analysis, None, BTreeSet::new())
            .find_entitlements(
                &user("alice@example.com"),
                &project("project-1"),
                &BTreeSet::from([ActivationType::Jit]),
                &BTreeSet::from([EntitlementStatus::Available]),
            )
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(set.warnings().contains("folder 99 truncated"));
    }

    #[tokio::test]
    async fn project_discovery_filters_by_required_tag() {
        let analysis = PolicyAnalysis {
            entries: vec![
                conditional_entry("roles/browser", "has({}.jitAccessConstraint)", "project-1"),
                conditional_entry("roles/browser", "has({}.jitAccessConstraint)", "project-2"),
            ],
            non_critical_errors: Vec::new(),
        };

        let tagged =
            BTreeSet::from([project("project-2").full_resource_name()]);
        let projects = repository(
            analysis,
            Some("org/team/access".to_owned()),
            tagged,
        )
        .find_projects_with_entitlements(&user("alice@example.com"))
        .await
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(projects, BTreeSet::from([project("project-2")]));
    }

    #[tokio::test]
    async fn entitlement_holders_keep_only_marked_user_identities() {
        let mut entry = conditional_entry(
            "roles/browser",
            "has({}.multiPartyApprovalConstraint)",
            "project-1",
        );
        entry.identities = vec![
            AnalysisIdentity {
                name: "user:bob@example.com".to_owned(),
            },
            AnalysisIdentity {
                name: "serviceAccount:svc@example.iam.gserviceaccount.com".to_owned(),
            },
        ];

        let analysis = PolicyAnalysis {
            entries: vec![entry],
            non_critical_errors: Vec::new(),
        };

        let binding = ProjectRoleBinding::for_project(project("project-1"), "roles/browser");
        let holders = repository(analysis, None, BTreeSet::new())
            .find_entitlement_holders(&binding, ActivationType::Mpa)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(holders, BTreeSet::from([user("bob@example.com")]));
    }
}
