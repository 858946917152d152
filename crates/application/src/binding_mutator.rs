//! Read-modify-write mutation of project IAM policies.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use elevara_core::{AppError, AppResult, PrincipalRef, ProjectId, UserId};
use elevara_domain::{bindings_equal, is_activated, temporary_condition, IamBinding};

use crate::ports::ResourceManager;

/// Retries after the initial attempt when the conditional write loses.
const CONFLICT_RETRIES: u32 = 3;

/// Initial backoff before the first conflict retry.
const INITIAL_BACKOFF: StdDuration = StdDuration::from_millis(100);

/// Options of a single apply operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Remove prior temporary bindings for the same principal and role
    /// before appending the new one.
    pub purge_existing_temporary_bindings: bool,
    /// Fail with `AlreadyExists` when a structurally equal binding remains
    /// in the policy. The purge runs first, so a leftover identical
    /// temporary grant is replaced rather than reported.
    pub fail_if_binding_exists: bool,
}

/// Applies time-bounded role bindings to project IAM policies.
///
/// The policy document is never cached; every apply re-reads it, and the
/// etag-conditional write serializes concurrent mutations.
pub struct BindingMutator {
    resource_manager: Arc<dyn ResourceManager>,
}

impl BindingMutator {
    /// Creates a mutator over the resource-manager port.
    #[must_use]
    pub fn new(resource_manager: Arc<dyn ResourceManager>) -> Self {
        Self { resource_manager }
    }

    /// Grants `role` to `principal` on `project` for `[start, end)`.
    ///
    /// The supplied `reason` becomes both the condition description and the
    /// justification recorded with the policy change.
    pub async fn apply_temporary_binding(
        &self,
        project: &ProjectId,
        principal: &UserId,
        role: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reason: &str,
        options: ApplyOptions,
    ) -> AppResult<()> {
        if end <= start {
            return Err(AppError::InvalidArgument(
                "the binding end time must lie after its start time".to_owned(),
            ));
        }

        let member = PrincipalRef::user(principal);
        let mut condition = temporary_condition(start, end - start);
        condition.description = Some(reason.to_owned());
        let new_binding =
            IamBinding::with_condition(role, vec![member.as_str().to_owned()], condition);

        let mut backoff = INITIAL_BACKOFF;
        for attempt in 0..=CONFLICT_RETRIES {
            let mut policy = self.resource_manager.get_iam_policy(project).await?;

            if options.purge_existing_temporary_bindings {
                let before = policy.bindings.len();
                policy.bindings.retain(|binding| {
                    let owned_temporary = is_activated(binding.condition.as_ref())
                        && binding.role == role
                        && binding.members == [member.as_str().to_owned()];
                    !owned_temporary
                });

                let purged = before - policy.bindings.len();
                if purged > 0 {
                    tracing::info!(
                        project = %project,
                        principal = %principal,
                        role,
                        purged,
                        "replacing prior temporary bindings"
                    );
                }
            }

            if options.fail_if_binding_exists
                && policy
                    .bindings
                    .iter()
                    .any(|binding| bindings_equal(binding, &new_binding, true))
            {
                return Err(AppError::AlreadyExists(format!(
                    "'{principal}' already holds '{role}' on '{project}' for this window"
                )));
            }

            policy.bindings.push(new_binding.clone());

            match self
                .resource_manager
                .set_iam_policy(project, policy, reason)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        project = %project,
                        principal = %principal,
                        role,
                        %start,
                        %end,
                        "applied temporary binding"
                    );
                    return Ok(());
                }
                Err(AppError::Conflict(message)) => {
                    if attempt == CONFLICT_RETRIES {
                        return Err(AppError::ConflictRetryExhausted(format!(
                            "updating the policy of '{project}' kept conflicting: {message}"
                        )));
                    }

                    tracing::warn!(
                        project = %project,
                        attempt = attempt + 1,
                        "policy write conflicted, re-reading"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(error) => return Err(error),
            }
        }

        // The loop either returns a write result or exhausts its retries.
        Err(AppError::Internal(
            "the apply loop ended without a write outcome".to_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use tokio::sync::Mutex;

    use elevara_core::{AppError, AppResult, ProjectId, UserId};
    use elevara_domain::{
        temporary_condition, IamBinding, IamCondition, IamPolicy,
    };

    use crate::ports::{ResourceManager, ResourceTag};

    use super::{ApplyOptions, BindingMutator};

    fn project() -> ProjectId {
        ProjectId::new("project-1").unwrap_or_else(|_| unreachable!())
    }

    fn alice() -> UserId {
        UserId::new("alice@example.com").unwrap_or_else(|_| unreachable!())
    }

    struct FakeResourceManager {
        policy: Mutex<IamPolicy>,
        conflicts_left: AtomicUsize,
        writes: AtomicUsize,
    }

    impl FakeResourceManager {
        fn with_policy(policy: IamPolicy) -> Self {
            Self {
                policy: Mutex::new(policy),
                conflicts_left: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ResourceManager for FakeResourceManager {
        async fn get_iam_policy(&self, _project: &ProjectId) -> AppResult<IamPolicy> {
            Ok(self.policy.lock().await.clone())
        }

        async fn set_iam_policy(
            &self,
            _project: &ProjectId,
            policy: IamPolicy,
            _reason: &str,
        ) -> AppResult<()> {
            if self.conflicts_left.load(Ordering::SeqCst) > 0 {
                self.conflicts_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Conflict("etag mismatch".to_owned()));
            }

            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.policy.lock().await = policy;
            Ok(())
        }

        async fn get_project_effective_tags(
            &self,
            _resource_full_name: &str,
        ) -> AppResult<Vec<ResourceTag>> {
            Ok(Vec::new())
        }

        async fn search_projects(&self, _query: &str) -> AppResult<BTreeSet<ProjectId>> {
            Ok(BTreeSet::new())
        }
    }

    fn stale_grant(role: &str, member: &str) -> IamBinding {
        let start = Utc
            .with_ymd_and_hms(2023, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!());
        IamBinding::with_condition(
            role,
            vec![member.to_owned()],
            temporary_condition(start, Duration::minutes(5)),
        )
    }

    #[tokio::test]
    async fn purge_removes_only_owned_temporary_bindings() {
        let mut policy = IamPolicy::new("etag-1");
        policy.bindings = vec![
            // Stale grant of the same principal and role: purged.
            stale_grant("roles/browser", "user:alice@example.com"),
            // Same role, different principal: preserved.
            stale_grant("roles/browser", "user:bob@example.com"),
            // Same principal and role, but a permanent unrelated condition:
            // preserved.
            IamBinding::with_condition(
                "roles/browser",
                vec!["user:alice@example.com".to_owned()],
                IamCondition::from_expression("resource.name.startsWith(\"folders/9\")"),
            ),
        ];

        let resource_manager = Arc::new(FakeResourceManager::with_policy(policy));
        let mutator = BindingMutator::new(Arc::clone(&resource_manager) as Arc<_>);

        let start = Utc::now();
        let applied = mutator
            .apply_temporary_binding(
                &project(),
                &alice(),
                "roles/browser",
                start,
                start + Duration::minutes(5),
                "case-123",
                ApplyOptions {
                    purge_existing_temporary_bindings: true,
                    fail_if_binding_exists: false,
                },
            )
            .await;
        assert!(applied.is_ok());

        let written = resource_manager.policy.lock().await;
        assert_eq!(written.bindings.len(), 3);
        assert!(written
            .bindings
            .iter()
            .any(|binding| binding.members == ["user:bob@example.com"]));
        assert!(written.bindings.iter().any(|binding| {
            binding
                .condition
                .as_ref()
                .is_some_and(|condition| condition.expression.starts_with("resource.name"))
        }));
    }

    #[tokio::test]
    async fn applying_twice_is_idempotent_under_purge() {
        let resource_manager =
            Arc::new(FakeResourceManager::with_policy(IamPolicy::new("etag-1")));
        let mutator = BindingMutator::new(Arc::clone(&resource_manager) as Arc<_>);

        let start = Utc
            .with_ymd_and_hms(2030, 6, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!());
        let options = ApplyOptions {
            purge_existing_temporary_bindings: true,
            fail_if_binding_exists: false,
        };

        for _ in 0..2 {
            let applied = mutator
                .apply_temporary_binding(
                    &project(),
                    &alice(),
                    "roles/browser",
                    start,
                    start + Duration::minutes(5),
                    "case-123",
                    options,
                )
                .await;
            assert!(applied.is_ok());
        }

        let written = resource_manager.policy.lock().await;
        assert_eq!(written.bindings.len(), 1);
    }

    #[tokio::test]
    async fn replayed_approval_purges_and_reapplies_instead_of_failing() {
        // The purge runs before the existence check, so a replay with both
        // options set swaps the identical binding instead of failing.
        let resource_manager =
            Arc::new(FakeResourceManager::with_policy(IamPolicy::new("etag-1")));
        let mutator = BindingMutator::new(Arc::clone(&resource_manager) as Arc<_>);

        let start = Utc
            .with_ymd_and_hms(2030, 6, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!());
        let options = ApplyOptions {
            purge_existing_temporary_bindings: true,
            fail_if_binding_exists: true,
        };

        for _ in 0..2 {
            let applied = mutator
                .apply_temporary_binding(
                    &project(),
                    &alice(),
                    "roles/browser",
                    start,
                    start + Duration::minutes(5),
                    "case-123",
                    options,
                )
                .await;
            assert!(applied.is_ok());
        }

        let written = resource_manager.policy.lock().await;
        assert_eq!(written.bindings.len(), 1);
    }

    #[tokio::test]
    async fn existing_binding_fails_without_purge() {
        let resource_manager =
            Arc::new(FakeResourceManager::with_policy(IamPolicy::new("etag-1")));
        let mutator = BindingMutator::new(Arc::clone(&resource_manager) as Arc<_>);

        let start = Utc
            .with_ymd_and_hms(2030, 6, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!());
        let options = ApplyOptions {
            purge_existing_temporary_bindings: false,
            fail_if_binding_exists: true,
        };

        let first = mutator
            .apply_temporary_binding(
                &project(),
                &alice(),
                "roles/browser",
                start,
                start + Duration::minutes(5),
                "case-123",
                options,
            )
            .await;
        assert!(first.is_ok());

        let second = mutator
            .apply_temporary_binding(
                &project(),
                &alice(),
                "roles/browser",
                start,
                start + Duration::minutes(5),
                "case-123",
                options,
            )
            .await;
        assert!(matches!(second, Err(AppError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn conflicting_writes_are_retried() {
        let resource_manager =
            Arc::new(FakeResourceManager::with_policy(IamPolicy::new("etag-1")));
        resource_manager.conflicts_left.store(2, Ordering::SeqCst);
        let mutator = BindingMutator::new(Arc::clone(&resource_manager) as Arc<_>);

        let start = Utc::now();
        let applied = mutator
            .apply_temporary_binding(
                &project(),
                &alice(),
                "roles/browser",
                start,
                start + Duration::minutes(5),
                "case-123",
                ApplyOptions::default(),
            )
            .await;

        assert!(applied.is_ok());
        assert_eq!(resource_manager.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_conflicts_exhaust_retries() {
        let resource_manager =
            Arc::new(FakeResourceManager::with_policy(IamPolicy::new("etag-1")));
        resource_manager.conflicts_left.store(16, Ordering::SeqCst);
        let mutator = BindingMutator::new(Arc::clone(&resource_manager) as Arc<_>);

        let start = Utc::now();
        let applied = mutator
            .apply_temporary_binding(
                &project(),
                &alice(),
                "roles/browser",
                start,
                start + Duration::minutes(5),
                "case-123",
                ApplyOptions::default(),
            )
            .await;

        assert!(matches!(
            applied,
            Err(AppError::ConflictRetryExhausted(_))
        ));
    }

    #[tokio::test]
    async fn inverted_windows_are_rejected() {
        let resource_manager =
            Arc::new(FakeResourceManager::with_policy(IamPolicy::new("etag-1")));
        let mutator = BindingMutator::new(resource_manager as Arc<_>);

        let start = Utc::now();
        let applied = mutator
            .apply_temporary_binding(
                &project(),
                &alice(),
                "roles/browser",
                start,
                start - Duration::minutes(5),
                "case-123",
                ApplyOptions::default(),
            )
            .await;

        assert!(matches!(applied, Err(AppError::InvalidArgument(_))));
    }
}
