use serde::Serialize;

use crate::error::{Result, RundownError};

/// Tagged success/error envelope for every service call
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClientResponse<T> {
    Ok {
        result: T,
    },
    Error {
        code: u16,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl<T> ClientResponse<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ok { result: value },
            Err(error) => Self::from_error(error),
        }
    }

    pub fn from_error(error: RundownError) -> Self {
        let details = match &error {
            RundownError::Conflict {
                active_rundowns, ..
            } => Some(serde_json::json!({ "activeRundowns": active_rundowns })),
            _ => None,
        };
        Self::Error {
            code: error.code(),
            message: error.to_string(),
            details,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn error_code(&self) -> Option<u16> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { code, .. } => Some(*code),
        }
    }

    /// Unwrap for tests
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Ok { result } => Ok(result),
            Self::Error { code, message, .. } => Err(match code {
                404 => RundownError::NotFound(message),
                409 => RundownError::Conflict {
                    studio_id: message,
                    active_rundowns: Vec::new(),
                },
                412 => RundownError::PreconditionFailed(message),
                _ => RundownError::Internal(message),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::precondition;

    #[test]
    fn test_ok_envelope() {
        let response = ClientResponse::from_result(Ok(7));
        assert!(response.is_ok());
        assert_eq!(response.error_code(), None);
    }

    #[test]
    fn test_error_envelope_carries_code() {
        let response: ClientResponse<()> = ClientResponse::from_result(Err(precondition("no next part")));
        assert!(!response.is_ok());
        assert_eq!(response.error_code(), Some(412));
    }

    #[test]
    fn test_conflict_carries_rundown_names() {
        let response: ClientResponse<()> = ClientResponse::from_error(RundownError::Conflict {
            studio_id: "studio0".into(),
            active_rundowns: vec!["Evening News".into()],
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], 409);
        assert_eq!(json["details"]["activeRundowns"][0], "Evening News");
    }
}
