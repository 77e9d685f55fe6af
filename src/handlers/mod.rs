pub mod configfiles;
pub mod ippools;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::codec::ImportError;
use crate::compiler::CompileError;
use crate::tree::{TreeError, ValidationError};

/// Error response body: {"error": "message"}
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// API error type
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{} not found", resource),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse::new(self.message)),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Check for typed NotFoundError first (no fragile string matching)
        if let Some(nf) = err.downcast_ref::<crate::db::NotFoundError>() {
            return Self::not_found(&nf.to_string());
        }
        if let Some(te) = err.downcast_ref::<TreeError>() {
            return te.clone().into();
        }
        Self::internal(err.to_string())
    }
}

impl From<TreeError> for ApiError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::UnknownNode(id) => Self::not_found(&format!("Configfile {}", id)),
            TreeError::Cycle(_) => Self::unprocessable(err.to_string()),
        }
    }
}

impl From<CompileError> for ApiError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Io { .. } => {
                tracing::error!("Compiler I/O failure: {}", err);
                Self::internal(err.to_string())
            }
            CompileError::MissingDeviceClass | CompileError::Compilation(_) => Self::unprocessable(err.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Compile(e) => e.into(),
            ValidationError::Invalid { .. } => Self::unprocessable(err.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::InvalidJson(_) | ImportError::Malformed(_) => Self::bad_request(err.to_string()),
            ImportError::Validation {
                source: ValidationError::Compile(CompileError::Io { .. }),
                ..
            } => Self::internal(err.to_string()),
            ImportError::Validation { .. } => Self::unprocessable(err.to_string()),
            ImportError::Tree(e) => e.into(),
            ImportError::Store(e) => e.into(),
        }
    }
}

/// Response helper: return 201 Created with JSON body
pub fn created<T: Serialize>(item: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(item))
}

/// Healthcheck endpoint — returns 200 OK with status
pub async fn healthcheck() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "prov-base",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    impl ApiError {
        fn status(&self) -> StatusCode {
            self.status
        }
    }

    #[test]
    fn test_api_error_status_mapping() {
        let nf: ApiError = anyhow::Error::new(crate::db::NotFoundError::new("Configfile", "3")).into();
        assert_eq!(nf.status(), StatusCode::NOT_FOUND);

        let cycle: ApiError = anyhow::Error::new(TreeError::Cycle(2)).into();
        assert_eq!(cycle.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let compile: ApiError = CompileError::Compilation("line 9".into()).into();
        assert_eq!(compile.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let io: ApiError = CompileError::Io {
            path: "/tftpboot/cm".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
        .into();
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bad_json: ApiError = ImportError::Malformed("dup".into()).into();
        assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);
    }
}
