//! Error types for the gradebook store.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GradebookError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Student,
    Grade,
    Group,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Student => write!(f, "student"),
            Entity::Grade => write!(f, "grade"),
            Entity::Group => write!(f, "group"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GradebookError {
    #[error("{entity} #{id} not found, supply a valid id")]
    NotFound { entity: Entity, id: i64 },

    /// A relation row points at an entity that does not exist.
    #[error("data integrity error in {file}: {message}; fix the file and retry")]
    DataIntegrity { file: String, message: String },

    #[error("malformed row in {file} at line {line}: {reason}")]
    Malformed {
        file: String,
        line: usize,
        reason: String,
    },

    #[error(
        "student #{student_id} is already registered in group #{group_id}, check groups/{group_id}"
    )]
    DuplicateRelation { student_id: i64, group_id: i64 },

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bundle error: {0}")]
    Bundle(String),
}

impl GradebookError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DataIntegrity { .. } => "data_integrity",
            Self::Malformed { .. } => "malformed_data",
            Self::DuplicateRelation { .. } => "duplicate_relation",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Io { .. } => "io_failed",
            Self::Bundle(_) => "bad_bundle",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::DuplicateRelation { .. } => 409,
            Self::PreconditionFailed(_) => 400,
            Self::Bundle(_) => 400,
            Self::DataIntegrity { .. } | Self::Malformed { .. } | Self::Io { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_id_and_remedy() {
        let e = GradebookError::not_found(Entity::Student, 7);
        assert_eq!(e.to_string(), "student #7 not found, supply a valid id");
        assert_eq!(e.code(), "not_found");
        assert_eq!(e.http_status(), 404);
    }

    #[test]
    fn duplicate_relation_maps_to_conflict() {
        let e = GradebookError::DuplicateRelation {
            student_id: 1,
            group_id: 2,
        };
        assert_eq!(e.http_status(), 409);
        assert!(e.to_string().contains("group #2"));
    }
}
