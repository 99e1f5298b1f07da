#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("observation {0} not found")]
    ObservationNotFound(i64),

    #[error("change '{0}' not found")]
    ChangeNotFound(String),

    #[error("project root not found (no sdd/sdd.json above current directory)")]
    ProjectRootNotFound,

    #[error("expected stage '{expected}', current stage is '{actual}'")]
    WrongStage { expected: String, actual: String },

    #[error("a change is already active: '{0}'")]
    ChangeAlreadyActive(String),

    #[error("relation ({from}, {to}, {kind}) already exists")]
    DuplicateRelation { from: i64, to: i64, kind: String },

    #[error("io error: {0}")]
    Io(String),

    #[error("fatal startup error: {0}")]
    Fatal(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InvalidInput(format!("malformed json: {e}"))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_input() {
        let err = CoreError::InvalidInput("title must not be empty".into());
        assert_eq!(err.to_string(), "invalid input: title must not be empty");
    }

    #[test]
    fn test_display_observation_not_found() {
        let err = CoreError::ObservationNotFound(42);
        assert_eq!(err.to_string(), "observation 42 not found");
    }

    #[test]
    fn test_display_change_not_found() {
        let err = CoreError::ChangeNotFound("empty-query-crash".into());
        assert_eq!(err.to_string(), "change 'empty-query-crash' not found");
    }

    #[test]
    fn test_display_project_root_not_found() {
        let err = CoreError::ProjectRootNotFound;
        assert_eq!(
            err.to_string(),
            "project root not found (no sdd/sdd.json above current directory)"
        );
    }

    #[test]
    fn test_display_wrong_stage() {
        let err = CoreError::WrongStage {
            expected: "clarify".into(),
            actual: "design".into(),
        };
        assert_eq!(
            err.to_string(),
            "expected stage 'clarify', current stage is 'design'"
        );
    }

    #[test]
    fn test_display_change_already_active() {
        let err = CoreError::ChangeAlreadyActive("refactor-auth".into());
        assert_eq!(
            err.to_string(),
            "a change is already active: 'refactor-auth'"
        );
    }

    #[test]
    fn test_display_duplicate_relation() {
        let err = CoreError::DuplicateRelation {
            from: 1,
            to: 2,
            kind: "depends_on".into(),
        };
        assert_eq!(
            err.to_string(),
            "relation (1, 2, depends_on) already exists"
        );
    }

    #[test]
    fn test_display_boundary_values() {
        let err = CoreError::ObservationNotFound(0);
        assert_eq!(err.to_string(), "observation 0 not found");

        let err = CoreError::ObservationNotFound(i64::MAX);
        assert!(err.to_string().contains(&i64::MAX.to_string()));

        let err = CoreError::InvalidInput(String::new());
        assert_eq!(err.to_string(), "invalid input: ");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoreError>();
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: CoreError = io_err.into();
        assert!(matches!(err, CoreError::Io(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }
}
