//! Inbound notifications
//!
//! Two notification shapes are in use while senders migrate:
//!
//! - Build notifications (`source.repoSource` + `images`), emitted when a
//!   build finishes. Timing and step metadata are accepted but not interpreted.
//! - Push notifications (`github` + `image`), where the commit hash becomes
//!   the image tag.
//!
//! The shape is picked structurally and both normalize into a [`Target`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors raised while decoding a notification
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Body is not valid JSON or does not fit the detected shape
    #[error("Invalid notification body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Body matches neither known notification shape
    #[error("Unrecognized notification: expected a 'source.repoSource' or a 'github' object")]
    UnknownSchema,

    /// A field required to deploy is missing or empty
    #[error("Notification is missing '{0}'")]
    MissingField(&'static str),
}

impl DecodeError {
    /// True when the body was understood but lacks something the sender must provide
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::MissingField(_))
    }
}

/// What to deploy and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub repository: String,
    pub branch: String,
    pub image: String,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} -> {}", self.repository, self.branch, self.image)
    }
}

// =============================================================================
// Build notification
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildNotification {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub source: BuildSource,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSource {
    pub repo_source: RepoSource,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSource {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub repo_name: String,
    #[serde(default)]
    pub branch_name: String,
    #[serde(default)]
    pub commit_sha: Option<String>,
}

impl BuildNotification {
    /// Build duration, when both timestamps were reported
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finish_time? - self.start_time?)
    }
}

/// Timestamps are informational, so unparseable values become `None`
fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(JsonValue::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc)))
}

// =============================================================================
// Push notification
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PushNotification {
    pub github: GithubPush,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubPush {
    #[serde(default)]
    pub repository: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub sha: String,
}

// =============================================================================
// Decoding
// =============================================================================

/// A decoded notification of either shape
#[derive(Debug, Clone)]
pub enum Notification {
    Build(BuildNotification),
    Push(PushNotification),
}

impl Notification {
    /// Decodes a raw body, selecting the shape by which top-level object is present
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let value: JsonValue = serde_json::from_slice(raw)?;

        if value.get("github").is_some_and(JsonValue::is_object) {
            return Ok(Notification::Push(serde_json::from_value(value)?));
        }

        if value
            .pointer("/source/repoSource")
            .is_some_and(JsonValue::is_object)
        {
            return Ok(Notification::Build(serde_json::from_value(value)?));
        }

        Err(DecodeError::UnknownSchema)
    }

    /// Repository the notification is about, as sent
    pub fn repository(&self) -> &str {
        match self {
            Notification::Build(build) => &build.source.repo_source.repo_name,
            Notification::Push(push) => &push.github.repository,
        }
    }

    /// Converts into the deployment target
    pub fn normalize(&self) -> Result<Target, DecodeError> {
        let repository = self.repository().trim();
        if repository.is_empty() {
            return Err(DecodeError::MissingField("repository"));
        }

        let (branch, image) = match self {
            Notification::Build(build) => {
                let image = build
                    .images
                    .iter()
                    .map(|image| image.trim())
                    .find(|image| !image.is_empty())
                    .ok_or(DecodeError::MissingField("images"))?
                    .to_string();
                (build.source.repo_source.branch_name.as_str(), image)
            }
            Notification::Push(push) => {
                let base = push.image.trim();
                if base.is_empty() {
                    return Err(DecodeError::MissingField("image"));
                }
                let sha = push.github.sha.trim();
                if sha.is_empty() {
                    return Err(DecodeError::MissingField("github.sha"));
                }
                (push.github.git_ref.as_str(), format!("{}:{}", base, sha))
            }
        };

        let branch = branch_from_ref(branch.trim());
        if branch.is_empty() {
            return Err(DecodeError::MissingField("branch"));
        }

        Ok(Target {
            repository: repository.to_string(),
            branch: branch.to_string(),
            image,
        })
    }
}

/// Decodes a raw body straight into a deployment target
pub fn decode(raw: &[u8]) -> Result<Target, DecodeError> {
    Notification::decode(raw)?.normalize()
}

/// Strips the `refs/heads/` (or `refs/tags/`) prefix of a full ref path
pub fn branch_from_ref(reference: &str) -> &str {
    reference
        .strip_prefix("refs/heads/")
        .or_else(|| reference.strip_prefix("refs/tags/"))
        .unwrap_or(reference)
}
