//! Cluster control plane
//!
//! Workloads eligible for deployment are Deployments and StatefulSets. Both
//! are wrapped in [`Workload`] so the updater can treat them alike, and all
//! control plane access goes through the [`ControlPlane`] trait.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, ListParams, PostParams};
use thiserror::Error;

/// HTTP status the API server answers with when the resource version is stale
const CONFLICT_STATUS: u16 = 409;

/// Control plane errors
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Update rejected because the workload changed since it was read
    #[error("Conflicting update: {0}")]
    Conflict(String),

    /// Any other API failure
    #[error("Control plane request failed: {0}")]
    Request(#[source] kube::Error),

    /// Failure reported by a non-Kubernetes control plane
    #[error("Control plane request failed: {0}")]
    Other(String),
}

impl ClusterError {
    /// Check if this error is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) if response.code == CONFLICT_STATUS => {
                ClusterError::Conflict(response.message)
            }
            other => ClusterError::Request(other),
        }
    }
}

/// Container index outside the workload's container list
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Container index {index} is out of range, the workload has {containers} container(s)")]
pub struct InvalidContainerIndex {
    pub index: usize,
    pub containers: usize,
}

/// Kind of workload at the control plane boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 2] = [WorkloadKind::Deployment, WorkloadKind::StatefulSet];
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::Deployment => write!(f, "deployment"),
            WorkloadKind::StatefulSet => write!(f, "statefulset"),
        }
    }
}

/// A deployable workload of either kind
#[derive(Debug, Clone)]
pub enum Workload {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
}

impl Workload {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::StatefulSet(_) => WorkloadKind::StatefulSet,
        }
    }

    fn metadata(&self) -> &ObjectMeta {
        match self {
            Workload::Deployment(d) => &d.metadata,
            Workload::StatefulSet(s) => &s.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata().labels.as_ref()
    }

    /// Value of the label `key`, if set
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels()?.get(key).map(String::as_str)
    }

    /// Resource version observed when this copy was read
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }

    fn pod_spec(&self) -> Option<&PodSpec> {
        match self {
            Workload::Deployment(d) => d.spec.as_ref()?.template.spec.as_ref(),
            Workload::StatefulSet(s) => s.spec.as_ref()?.template.spec.as_ref(),
        }
    }

    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        match self {
            Workload::Deployment(d) => d.spec.as_mut()?.template.spec.as_mut(),
            Workload::StatefulSet(s) => s.spec.as_mut()?.template.spec.as_mut(),
        }
    }

    /// Containers of the pod template, in declaration order
    pub fn containers(&self) -> &[Container] {
        self.pod_spec()
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default()
    }

    /// Returns this workload with the image of container `index` replaced
    ///
    /// The resource version is kept, so submitting the result only succeeds
    /// if nobody else changed the workload in between.
    pub fn with_updated_image(
        mut self,
        index: usize,
        image: &str,
    ) -> Result<Self, InvalidContainerIndex> {
        let containers = self.containers().len();
        let container = self
            .pod_spec_mut()
            .and_then(|spec| spec.containers.get_mut(index))
            .ok_or(InvalidContainerIndex { index, containers })?;

        container.image = Some(image.to_string());
        Ok(self)
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} in namespace {}",
            self.kind(),
            self.name(),
            self.namespace()
        )
    }
}

/// Access to the workloads of a cluster
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Lists workloads of `kind` in all namespaces that carry the label `label_key`
    async fn list(
        &self,
        kind: WorkloadKind,
        label_key: &str,
    ) -> Result<Vec<Workload>, ClusterError>;

    /// Reads a single workload
    async fn get(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<Workload, ClusterError>;

    /// Replaces a workload, guarded by its resource version
    async fn update(&self, workload: &Workload) -> Result<Workload, ClusterError>;
}

/// Kubernetes API server backed control plane
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using the in-cluster service account or the local kubeconfig
    pub async fn connect() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Underlying client, shared with other cluster adapters
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Version reported by the API server, used as a reachability check
    pub async fn server_version(&self) -> Result<String, ClusterError> {
        let info = self.client.apiserver_version().await?;
        Ok(info.git_version)
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn list(
        &self,
        kind: WorkloadKind,
        label_key: &str,
    ) -> Result<Vec<Workload>, ClusterError> {
        let params = ListParams::default().labels(label_key);

        let workloads = match kind {
            WorkloadKind::Deployment => Api::<Deployment>::all(self.client.clone())
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(Workload::Deployment)
                .collect(),
            WorkloadKind::StatefulSet => Api::<StatefulSet>::all(self.client.clone())
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(Workload::StatefulSet)
                .collect(),
        };

        Ok(workloads)
    }

    async fn get(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<Workload, ClusterError> {
        let workload = match kind {
            WorkloadKind::Deployment => Workload::Deployment(
                Api::<Deployment>::namespaced(self.client.clone(), namespace)
                    .get(name)
                    .await?,
            ),
            WorkloadKind::StatefulSet => Workload::StatefulSet(
                Api::<StatefulSet>::namespaced(self.client.clone(), namespace)
                    .get(name)
                    .await?,
            ),
        };

        Ok(workload)
    }

    async fn update(&self, workload: &Workload) -> Result<Workload, ClusterError> {
        let params = PostParams::default();
        let namespace = workload.namespace();
        let name = workload.name();

        let updated = match workload {
            Workload::Deployment(d) => Workload::Deployment(
                Api::<Deployment>::namespaced(self.client.clone(), namespace)
                    .replace(name, &params, d)
                    .await?,
            ),
            Workload::StatefulSet(s) => Workload::StatefulSet(
                Api::<StatefulSet>::namespaced(self.client.clone(), namespace)
                    .replace(name, &params, s)
                    .await?,
            ),
        };

        Ok(updated)
    }
}
