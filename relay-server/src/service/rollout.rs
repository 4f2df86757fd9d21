//! Rollout service
//!
//! Resolves which workloads a deployment target applies to and moves them to
//! the new image:
//! - Lists Deployments and StatefulSets carrying the repository's label key
//! - Keeps the workloads whose label value names the target branch
//! - Re-reads each one and replaces the labelled container's image, retrying
//!   on optimistic concurrency conflicts
//!
//! Every workload is handled independently; a failure on one never stops
//! the others.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use relay_core::{LabelError, Target, decode_label_value, label_key_for};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterError, ControlPlane, InvalidContainerIndex, Workload, WorkloadKind};
use crate::notifier::Notifier;
use crate::service::retry::RetryPolicy;

/// Request-wide rollout failure
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("Could not list {kind}s labelled {label_key}: {source}")]
    Query {
        kind: WorkloadKind,
        label_key: String,
        #[source]
        source: ClusterError,
    },
}

/// Why a single workload was not updated
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error(transparent)]
    MalformedLabel(#[from] LabelError),

    #[error(transparent)]
    InvalidContainerIndex(#[from] InvalidContainerIndex),

    #[error("Update still conflicting after {attempts} attempts")]
    ConflictRetryExhausted { attempts: u32 },

    #[error(transparent)]
    ControlPlane(#[from] ClusterError),
}

/// Result of handling one workload
#[derive(Debug)]
pub enum Outcome {
    Updated { attempts: u32 },
    Skipped,
    Failed(WorkloadError),
}

#[derive(Debug)]
pub struct WorkloadReport {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    pub outcome: Outcome,
}

/// Outcome of every candidate workload of one rollout
#[derive(Debug, Default)]
pub struct RolloutReport {
    pub workloads: Vec<WorkloadReport>,
}

impl RolloutReport {
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Updated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    /// Report entry of the workload called `name`
    pub fn find(&self, name: &str) -> Option<&WorkloadReport> {
        self.workloads.iter().find(|w| w.name == name)
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.workloads.iter().filter(|w| pred(&w.outcome)).count()
    }
}

/// Longest wait for one chat notification before the rollout moves on
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Applies deployment targets to the cluster
pub struct RolloutService {
    control_plane: Arc<dyn ControlPlane>,
    notifier: Arc<dyn Notifier>,
    label_prefix: String,
    retry: RetryPolicy,
    notify_timeout: Duration,
}

impl RolloutService {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        notifier: Arc<dyn Notifier>,
        label_prefix: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            control_plane,
            notifier,
            label_prefix: label_prefix.into(),
            retry,
            notify_timeout: NOTIFY_TIMEOUT,
        }
    }

    /// Overrides how long a single notification may take
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Rolls `target` out to every matching workload
    ///
    /// Fails only when a candidate listing fails, before any workload is touched.
    pub async fn apply(&self, target: &Target) -> Result<RolloutReport, RolloutError> {
        let label_key = label_key_for(&self.label_prefix, &target.repository);

        let mut candidates = Vec::new();
        for kind in WorkloadKind::ALL {
            let listed = self
                .control_plane
                .list(kind, &label_key)
                .await
                .map_err(|source| RolloutError::Query {
                    kind,
                    label_key: label_key.clone(),
                    source,
                })?;
            info!(
                "Got {} {}(s) with label {}",
                listed.len(),
                kind,
                label_key
            );
            candidates.extend(listed);
        }

        let reports = join_all(
            group_by_identity(candidates)
                .into_iter()
                .map(|group| self.process_group(group, &label_key, target)),
        )
        .await;

        let report = RolloutReport {
            workloads: reports.into_iter().flatten().collect(),
        };

        info!(
            "Rollout of {} finished: {} updated, {} skipped, {} failed",
            target,
            report.updated(),
            report.skipped(),
            report.failed()
        );

        Ok(report)
    }

    /// Handles copies of the same workload one after another
    async fn process_group(
        &self,
        group: Vec<Workload>,
        label_key: &str,
        target: &Target,
    ) -> Vec<WorkloadReport> {
        let mut reports = Vec::with_capacity(group.len());
        for workload in &group {
            reports.push(WorkloadReport {
                kind: workload.kind(),
                namespace: workload.namespace().to_string(),
                name: workload.name().to_string(),
                outcome: self.process(workload, label_key, target).await,
            });
        }
        reports
    }

    async fn process(&self, workload: &Workload, label_key: &str, target: &Target) -> Outcome {
        let value = workload.label(label_key).unwrap_or_default();

        let label = match decode_label_value(value) {
            Ok(label) => label,
            Err(e) => {
                warn!("{} has a malformed label: {}. Skipping...", workload, e);
                return Outcome::Failed(e.into());
            }
        };

        if label.branch != target.branch {
            info!(
                "Skipping {}: tracks branch {}, not {}",
                workload, label.branch, target.branch
            );
            return Outcome::Skipped;
        }

        info!("{} is ready to be updated", workload);

        match self
            .update_image(
                workload.kind(),
                workload.namespace(),
                workload.name(),
                label.container_index,
                &target.image,
            )
            .await
        {
            Ok(attempts) => {
                let text = format!(
                    "Successfully updated {} with image {}.",
                    workload, target.image
                );
                info!("{}", text);
                self.send_notification(&text).await;
                Outcome::Updated { attempts }
            }
            Err(e @ WorkloadError::InvalidContainerIndex(_)) => {
                warn!("Label {} of {} is misconfigured: {}", value, workload, e);
                Outcome::Failed(e)
            }
            Err(e) => {
                error!("Failure updating {}: {}", workload, e);
                Outcome::Failed(e)
            }
        }
    }

    /// Delivers a notification without letting a stalled sink hold up the rollout
    async fn send_notification(&self, text: &str) {
        if tokio::time::timeout(self.notify_timeout, self.notifier.notify(text))
            .await
            .is_err()
        {
            warn!(
                "Chat notification not delivered within {:?}, moving on",
                self.notify_timeout
            );
        }
    }

    /// Sets the image of one container with optimistic concurrency
    ///
    /// Each attempt reads the workload fresh and submits it with the observed
    /// resource version. Only conflicts are retried. Returns the number of
    /// update attempts made.
    pub async fn update_image(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
        container_index: usize,
        image: &str,
    ) -> Result<u32, WorkloadError> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let current = self.control_plane.get(kind, namespace, name).await?;
            let updated = current.with_updated_image(container_index, image)?;

            match self.control_plane.update(&updated).await {
                Ok(_) => return Ok(attempt),
                Err(e) if e.is_conflict() => {
                    if attempt >= self.retry.max_attempts {
                        return Err(WorkloadError::ConflictRetryExhausted { attempts: attempt });
                    }

                    debug!(
                        "Conflict updating {} {}/{} (attempt {}/{}), retrying in {:?}",
                        kind, namespace, name, attempt, self.retry.max_attempts, backoff
                    );

                    tokio::time::sleep(backoff).await;
                    backoff = self.retry.next_backoff(backoff);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Groups listed workloads by kind, namespace and name, keeping list order
fn group_by_identity(workloads: Vec<Workload>) -> Vec<Vec<Workload>> {
    let mut groups: Vec<Vec<Workload>> = Vec::new();

    for workload in workloads {
        let existing = groups.iter_mut().find(|group| {
            let first = &group[0];
            first.kind() == workload.kind()
                && first.namespace() == workload.namespace()
                && first.name() == workload.name()
        });

        match existing {
            Some(group) => group.push(workload),
            None => groups.push(vec![workload]),
        }
    }

    groups
}
