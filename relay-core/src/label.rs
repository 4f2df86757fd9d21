//! Deployment labels
//!
//! A workload opts in to automatic deployment by carrying a label whose key is
//! derived from the repository (`<prefix>/<repository>`) and whose value names
//! the branch and the container to update: `<branch>.<containerIndex>`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Default prefix of deployment label keys
pub const DEFAULT_LABEL_PREFIX: &str = "ki-cd";

const DELIMITER: char = '.';

/// Errors raised while decoding a label value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("Label value '{value}' is malformed: exactly two dot separated values are required")]
    WrongPartCount { value: String },

    #[error("Label value '{value}' is malformed: the container index must be a non-negative integer")]
    InvalidIndex { value: String },

    #[error("Branch '{0}' cannot be encoded in a label value")]
    UnencodableBranch(String),
}

/// Label key marking workloads deployed from `repository`
///
/// The repository is lower-cased and path separators become underscores.
///
/// # Example
/// ```
/// use relay_core::label_key_for;
///
/// assert_eq!(label_key_for("ki-cd", "Acme/API"), "ki-cd/acme_api");
/// ```
pub fn label_key_for(prefix: &str, repository: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        repository.to_lowercase().replace('/', "_")
    )
}

/// Branch and container a labelled workload tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTarget {
    pub branch: String,
    pub container_index: usize,
}

impl LabelTarget {
    /// Creates a label target, rejecting branches that would not decode back
    pub fn new(branch: impl Into<String>, container_index: usize) -> Result<Self, LabelError> {
        let branch = branch.into();
        if branch.is_empty() || branch.contains(DELIMITER) {
            return Err(LabelError::UnencodableBranch(branch));
        }

        Ok(Self {
            branch,
            container_index,
        })
    }
}

impl FromStr for LabelTarget {
    type Err = LabelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(DELIMITER).collect();
        let [branch, index] = parts.as_slice() else {
            return Err(LabelError::WrongPartCount {
                value: value.to_string(),
            });
        };

        let container_index = index.parse::<usize>().map_err(|_| LabelError::InvalidIndex {
            value: value.to_string(),
        })?;

        Ok(Self {
            branch: branch.to_string(),
            container_index,
        })
    }
}

impl fmt::Display for LabelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.branch, DELIMITER, self.container_index)
    }
}

/// Decodes a `<branch>.<containerIndex>` label value
pub fn decode_label_value(value: &str) -> Result<LabelTarget, LabelError> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_key_normalizes_repository() {
        assert_eq!(label_key_for("ki-cd", "acme/api"), "ki-cd/acme_api");
        assert_eq!(label_key_for("ki-cd/", "Org/Team/Repo"), "ki-cd/org_team_repo");
        assert_eq!(
            label_key_for(DEFAULT_LABEL_PREFIX, "plain"),
            label_key_for(DEFAULT_LABEL_PREFIX, "PLAIN")
        );
    }

    #[test]
    fn test_decode_valid_value() {
        assert_eq!(
            decode_label_value("main.2").unwrap(),
            LabelTarget {
                branch: "main".to_string(),
                container_index: 2
            }
        );
    }

    #[test]
    fn test_decode_malformed_values() {
        assert!(matches!(
            decode_label_value("main"),
            Err(LabelError::WrongPartCount { .. })
        ));
        assert!(matches!(
            decode_label_value("release.1.2"),
            Err(LabelError::WrongPartCount { .. })
        ));
        assert!(matches!(
            decode_label_value("main.x"),
            Err(LabelError::InvalidIndex { .. })
        ));
        assert!(matches!(
            decode_label_value("main.-1"),
            Err(LabelError::InvalidIndex { .. })
        ));
        assert!(matches!(
            decode_label_value("main."),
            Err(LabelError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_display_decodes_back() {
        let target = LabelTarget::new("develop", 1).unwrap();
        assert_eq!(target.to_string(), "develop.1");
        assert_eq!(decode_label_value(&target.to_string()).unwrap(), target);
    }

    #[test]
    fn test_new_rejects_dotted_branch() {
        assert_eq!(
            LabelTarget::new("release.1", 0).unwrap_err(),
            LabelError::UnencodableBranch("release.1".to_string())
        );
        assert!(LabelTarget::new("", 0).is_err());
    }
}
