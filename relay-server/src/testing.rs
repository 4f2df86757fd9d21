//! In-memory collaborators for tests

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio::sync::mpsc;

use crate::cluster::{ClusterError, ControlPlane, Workload, WorkloadKind};
use crate::notifier::Notifier;

fn metadata(namespace: &str, name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        resource_version: Some("1".to_string()),
        labels: Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Default::default()
    }
}

fn template(images: &[&str]) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: None,
        spec: Some(PodSpec {
            containers: images
                .iter()
                .enumerate()
                .map(|(i, image)| Container {
                    name: format!("c{}", i),
                    image: Some(image.to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
    }
}

pub fn deployment(namespace: &str, name: &str, labels: &[(&str, &str)], images: &[&str]) -> Workload {
    Workload::Deployment(Deployment {
        metadata: metadata(namespace, name, labels),
        spec: Some(DeploymentSpec {
            template: template(images),
            ..Default::default()
        }),
        status: None,
    })
}

pub fn stateful_set(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    images: &[&str],
) -> Workload {
    Workload::StatefulSet(StatefulSet {
        metadata: metadata(namespace, name, labels),
        spec: Some(StatefulSetSpec {
            template: template(images),
            ..Default::default()
        }),
        status: None,
    })
}

/// Image of container `index`, or empty
pub fn image_of(workload: &Workload, index: usize) -> String {
    workload
        .containers()
        .get(index)
        .and_then(|c| c.image.clone())
        .unwrap_or_default()
}

/// Control plane call, as recorded by [`FakeControlPlane`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(WorkloadKind),
    Get(String),
    Update(String),
}

type Key = (WorkloadKind, String, String);

fn key_of(workload: &Workload) -> Key {
    (
        workload.kind(),
        workload.namespace().to_string(),
        workload.name().to_string(),
    )
}

/// Control plane holding workloads in memory
///
/// Updates honour resource versions like the API server does, and a number
/// of conflicts can be injected per workload name.
#[derive(Default)]
pub struct FakeControlPlane {
    workloads: Mutex<Vec<Workload>>,
    conflicts: Mutex<HashMap<String, u32>>,
    failing_list: Mutex<Option<WorkloadKind>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeControlPlane {
    pub fn new(workloads: Vec<Workload>) -> Self {
        Self {
            workloads: Mutex::new(workloads),
            ..Default::default()
        }
    }

    /// Rejects the next `count` updates of `name` with a conflict
    pub fn inject_conflicts(&self, name: &str, count: u32) {
        self.conflicts
            .lock()
            .unwrap()
            .insert(name.to_string(), count);
    }

    /// Makes listing `kind` fail
    pub fn fail_list(&self, kind: WorkloadKind) {
        *self.failing_list.lock().unwrap() = Some(kind);
    }

    /// Changes a stored workload behind the updater's back, bumping its version
    pub fn touch(&self, name: &str) {
        let mut workloads = self.workloads.lock().unwrap();
        if let Some(stored) = workloads.iter_mut().find(|w| w.name() == name) {
            bump_version(stored);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Update(_)))
            .count()
    }

    pub fn stored(&self, name: &str) -> Option<Workload> {
        self.workloads
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.name() == name)
            .cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn metadata_mut(workload: &mut Workload) -> &mut ObjectMeta {
    match workload {
        Workload::Deployment(d) => &mut d.metadata,
        Workload::StatefulSet(s) => &mut s.metadata,
    }
}

fn bump_version(workload: &mut Workload) {
    let meta = metadata_mut(workload);
    let next = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    meta.resource_version = Some(next.to_string());
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list(
        &self,
        kind: WorkloadKind,
        label_key: &str,
    ) -> Result<Vec<Workload>, ClusterError> {
        self.record(Call::List(kind));

        if *self.failing_list.lock().unwrap() == Some(kind) {
            return Err(ClusterError::Other("list refused".to_string()));
        }

        Ok(self
            .workloads
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.kind() == kind && w.label(label_key).is_some())
            .cloned()
            .collect())
    }

    async fn get(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<Workload, ClusterError> {
        self.record(Call::Get(name.to_string()));

        let key = (kind, namespace.to_string(), name.to_string());
        self.workloads
            .lock()
            .unwrap()
            .iter()
            .find(|w| key_of(w) == key)
            .cloned()
            .ok_or_else(|| ClusterError::Other(format!("{} {} not found", kind, name)))
    }

    async fn update(&self, workload: &Workload) -> Result<Workload, ClusterError> {
        self.record(Call::Update(workload.name().to_string()));

        if let Some(remaining) = self.conflicts.lock().unwrap().get_mut(workload.name()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClusterError::Conflict("object has been modified".to_string()));
            }
        }

        let mut workloads = self.workloads.lock().unwrap();
        let stored = workloads
            .iter_mut()
            .find(|w| key_of(w) == key_of(workload))
            .ok_or_else(|| ClusterError::Other(format!("{} not found", workload)))?;

        if stored.resource_version() != workload.resource_version() {
            return Err(ClusterError::Conflict("stale resource version".to_string()));
        }

        let mut updated = workload.clone();
        bump_version(&mut updated);
        *stored = updated.clone();
        Ok(updated)
    }
}

/// Notifier forwarding every message to a channel
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<String>,
}

impl RecordingNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) {
        let _ = self.tx.send(text.to_string());
    }
}
