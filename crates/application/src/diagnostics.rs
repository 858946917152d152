//! Per-collaborator self-checks backing the readiness probe.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use elevara_core::AppError;

use crate::executor::BoundedExecutor;

/// Outcome of one collaborator self-check.
#[derive(Debug, Clone)]
pub struct DiagnosticResult {
    /// Name of the checked collaborator.
    pub name: String,
    /// Whether the check passed.
    pub successful: bool,
    /// Failure details; logged, never exposed to external callers.
    pub details: Option<String>,
}

impl DiagnosticResult {
    /// Creates a passing result.
    #[must_use]
    pub fn success(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            successful: true,
            details: None,
        }
    }

    /// Creates a failing result with details for the log.
    #[must_use]
    pub fn failure(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            successful: false,
            details: Some(details.into()),
        }
    }
}

/// A collaborator that can check its own health.
#[async_trait]
pub trait Diagnosable: Send + Sync {
    /// Stable name for logs and reports.
    fn name(&self) -> String;

    /// Runs the self-check.
    async fn run_diagnostic(&self) -> DiagnosticResult;
}

/// Aggregated readiness of all registered collaborators.
#[derive(Debug, Clone)]
pub struct ReadinessReport {
    /// AND of every check's `successful` flag.
    pub healthy: bool,
    /// Per-collaborator outcome, details stripped.
    pub checks: Vec<(String, bool)>,
}

/// Runs all registered self-checks concurrently.
pub struct DiagnosticsService {
    diagnosables: Vec<Arc<dyn Diagnosable>>,
    executor: BoundedExecutor,
}

impl DiagnosticsService {
    /// Creates a diagnostics service over the registered collaborators.
    #[must_use]
    pub fn new(diagnosables: Vec<Arc<dyn Diagnosable>>, executor: BoundedExecutor) -> Self {
        Self {
            diagnosables,
            executor,
        }
    }

    /// Checks every collaborator and aggregates the verdict. Failure details
    /// go to the log only.
    pub async fn check_readiness(&self) -> ReadinessReport {
        let checks = self.diagnosables.iter().map(|diagnosable| {
            let diagnosable = Arc::clone(diagnosable);
            self.executor.run(async move {
                Ok::<DiagnosticResult, AppError>(diagnosable.run_diagnostic().await)
            })
        });

        let mut results = Vec::with_capacity(self.diagnosables.len());
        for (index, outcome) in join_all(checks).await.into_iter().enumerate() {
            match outcome {
                Ok(result) => results.push(result),
                Err(error) => {
                    let name = self
                        .diagnosables
                        .get(index)
                        .map_or_else(|| "unknown".to_owned(), |diagnosable| diagnosable.name());
                    results.push(DiagnosticResult::failure(name, error.to_string()));
                }
            }
        }

        for result in &results {
            if !result.successful {
                tracing::warn!(
                    check = %result.name,
                    details = result.details.as_deref().unwrap_or("none"),
                    "readiness check failed"
                );
            }
        }

        ReadinessReport {
            healthy: results.iter().all(|result| result.successful),
            checks: results
                .into_iter()
                .map(|result| (result.name, result.successful))
                .collect(),
        }
    }
}
