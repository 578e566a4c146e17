//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relx_core::error::PlannerError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Planner(
                PlannerError::InvalidPlan(_)
                | PlannerError::InvalidProgram(_)
                | PlannerError::InvalidOperand(_)
                | PlannerError::UnknownTable(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::Planner(PlannerError::NoPlan { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Planner(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
