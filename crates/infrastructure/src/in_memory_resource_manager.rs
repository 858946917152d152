//! In-memory resource manager for development and tests.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use elevara_application::{
    Diagnosable, DiagnosticResult, ResourceManager, ResourceTag,
};
use elevara_core::{AppError, AppResult, ProjectId};
use elevara_domain::{IamPolicy, REQUESTED_POLICY_VERSION};

/// Etag-checking in-memory IAM policy store.
///
/// Writes must present the etag of the policy they read; a stale etag fails
/// with [`AppError::Conflict`], matching the platform's conditional-update
/// contract that the binding mutator retries against.
pub struct InMemoryResourceManager {
    state: Mutex<State>,
}

struct State {
    policies: HashMap<ProjectId, IamPolicy>,
    tags: HashMap<String, Vec<ResourceTag>>,
    etag_counter: u64,
}

impl InMemoryResourceManager {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                policies: HashMap::new(),
                tags: HashMap::new(),
                etag_counter: 0,
            }),
        }
    }

    /// Seeds a project with a policy. The stored etag is freshly assigned.
    pub async fn seed_policy(&self, project: ProjectId, mut policy: IamPolicy) {
        let mut state = self.state.lock().await;
        state.etag_counter += 1;
        policy.etag = format!("etag-{}", state.etag_counter);
        state.policies.insert(project, policy);
    }

    /// Seeds the effective tags of a resource.
    pub async fn seed_tags(&self, resource_full_name: impl Into<String>, tags: Vec<ResourceTag>) {
        self.state
            .lock()
            .await
            .tags
            .insert(resource_full_name.into(), tags);
    }
}

impl Default for InMemoryResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceManager for InMemoryResourceManager {
    async fn get_iam_policy(&self, project: &ProjectId) -> AppResult<IamPolicy> {
        let mut state = self.state.lock().await;
        if let Some(policy) = state.policies.get(project) {
            return Ok(policy.clone());
        }

        // Projects start with an empty policy, like a fresh project would.
        state.etag_counter += 1;
        let policy = IamPolicy {
            version: REQUESTED_POLICY_VERSION,
            etag: format!("etag-{}", state.etag_counter),
            bindings: Vec::new(),
        };
        state.policies.insert(project.clone(), policy.clone());
        Ok(policy)
    }

    async fn set_iam_policy(
        &self,
        project: &ProjectId,
        policy: IamPolicy,
        reason: &str,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let stored = state.policies.get(project).ok_or_else(|| {
            AppError::ResourceNotFound(format!("project '{project}' has no policy"))
        })?;

        if stored.etag != policy.etag {
            return Err(AppError::Conflict(format!(
                "etag '{}' is stale, policy of '{project}' was modified",
                policy.etag
            )));
        }

        tracing::debug!(project = %project, reason, "storing policy");

        state.etag_counter += 1;
        let next_etag = format!("etag-{}", state.etag_counter);
        state.policies.insert(
            project.clone(),
            IamPolicy {
                etag: next_etag,
                ..policy
            },
        );
        Ok(())
    }

    async fn get_project_effective_tags(
        &self,
        resource_full_name: &str,
    ) -> AppResult<Vec<ResourceTag>> {
        Ok(self
            .state
            .lock()
            .await
            .tags
            .get(resource_full_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn search_projects(&self, _query: &str) -> AppResult<BTreeSet<ProjectId>> {
        Ok(self.state.lock().await.policies.keys().cloned().collect())
    }
}

#[async_trait]
impl Diagnosable for InMemoryResourceManager {
    fn name(&self) -> String {
        "resource-manager (in-memory)".to_owned()
    }

    async fn run_diagnostic(&self) -> DiagnosticResult {
        DiagnosticResult::success(self.name())
    }
}

#[cfg(test)]
mod tests {
    use elevara_application::ResourceManager;
    use elevara_core::{AppError, ProjectId};
    use elevara_domain::{IamBinding, IamPolicy};

    use super::InMemoryResourceManager;

    fn project() -> ProjectId {
        ProjectId::new("project-1").unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn reads_create_an_empty_policy() {
        let store = InMemoryResourceManager::new();
        let policy = store.get_iam_policy(&project()).await;

        let policy = policy.unwrap_or_else(|_| unreachable!());
        assert!(policy.bindings.is_empty());
        assert_eq!(policy.version, 3);
    }

    #[tokio::test]
    async fn stale_etags_conflict() {
        let store = InMemoryResourceManager::new();
        store.seed_policy(project(), IamPolicy::new("ignored")).await;

        let fresh = store
            .get_iam_policy(&project())
            .await
            .unwrap_or_else(|_| unreachable!());

        let mut concurrent = fresh.clone();
        concurrent
            .bindings
            .push(IamBinding::new("roles/editor", vec!["user:bob@example.com".to_owned()]));
        assert!(store
            .set_iam_policy(&project(), concurrent, "first write")
            .await
            .is_ok());

        // The second writer still holds the old etag.
        let mut stale = fresh;
        stale
            .bindings
            .push(IamBinding::new("roles/browser", vec!["user:alice@example.com".to_owned()]));
        let result = store.set_iam_policy(&project(), stale, "second write").await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn successful_writes_rotate_the_etag() {
        let store = InMemoryResourceManager::new();
        let first = store
            .get_iam_policy(&project())
            .await
            .unwrap_or_else(|_| unreachable!());

        assert!(store
            .set_iam_policy(&project(), first.clone(), "write")
            .await
            .is_ok());

        let second = store
            .get_iam_policy(&project())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_ne!(first.etag, second.etag);
    }
}
