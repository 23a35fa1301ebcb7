use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rolegate_core::{AppError, RejectionReason};
use serde::Serialize;

/// API error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    message: String,
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Rejected(reason, _) => match reason {
                RejectionReason::SystemRoleProtected => StatusCode::FORBIDDEN,
                RejectionReason::UnknownPermissionReference
                | RejectionReason::InactivePermissionReference => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                RejectionReason::RoleInUse
                | RejectionReason::AdminFloorViolation
                | RejectionReason::PermissionInUse => StatusCode::CONFLICT,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn payload(&self) -> ErrorResponse {
        let (code, reason) = match &self.0 {
            AppError::Validation(_) => ("validation", None),
            AppError::NotFound(_) => ("not_found", None),
            AppError::Conflict(_) => ("conflict", None),
            AppError::Unauthorized(_) => ("unauthorized", Some("unauthenticated".to_owned())),
            AppError::Forbidden(reason) => ("forbidden", Some(reason.clone())),
            AppError::Rejected(reason, _) => ("rejected", Some(reason.as_str().to_owned())),
            AppError::Internal(_) => ("internal", None),
        };

        ErrorResponse {
            code,
            reason,
            message: self.0.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self.0, AppError::Internal(_)) {
            tracing::error!(error = %self.0, "request failed");
        }

        (self.status(), Json(self.payload())).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use rolegate_core::{AppError, RejectionReason};
    use serde_json::json;

    use super::ApiError;

    #[test]
    fn forbidden_carries_missing_permissions_as_reason() {
        let error = ApiError(AppError::Forbidden("missing:projects.view".to_owned()));

        assert_eq!(error.status(), StatusCode::FORBIDDEN);
        let Ok(body) = serde_json::to_value(error.payload()) else {
            panic!("payload should serialize");
        };
        assert_eq!(body["code"], json!("forbidden"));
        assert_eq!(body["reason"], json!("missing:projects.view"));
    }

    #[test]
    fn rejections_map_to_distinct_statuses() {
        let floor = ApiError(AppError::Rejected(
            RejectionReason::AdminFloorViolation,
            "last administrator".to_owned(),
        ));
        let system = ApiError(AppError::Rejected(
            RejectionReason::SystemRoleProtected,
            "system role".to_owned(),
        ));
        let reference = ApiError(AppError::Rejected(
            RejectionReason::InactivePermissionReference,
            "inactive".to_owned(),
        ));

        assert_eq!(floor.status(), StatusCode::CONFLICT);
        assert_eq!(system.status(), StatusCode::FORBIDDEN);
        assert_eq!(reference.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let Ok(body) = serde_json::to_value(floor.payload()) else {
            panic!("payload should serialize");
        };
        assert_eq!(body["reason"], json!("admin-floor-violation"));
    }

    #[test]
    fn unauthenticated_requests_map_to_401() {
        let error = ApiError(AppError::Unauthorized("authentication required".to_owned()));

        assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
        let Ok(body) = serde_json::to_value(error.payload()) else {
            panic!("payload should serialize");
        };
        assert_eq!(body["reason"], json!("unauthenticated"));
        assert!(body.get("message").is_some());
    }
}
