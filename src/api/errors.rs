use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{
    export::ExportError,
    sensors::RegistryError,
    settings::InvalidSettings,
    store::StorageError,
    upload::{PreconditionError, UploadError},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("collection is running; stop it before changing sensors")]
    Collecting,
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Settings(#[from] InvalidSettings),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Collecting => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Registry(e) => match e {
                RegistryError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
                RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
                RegistryError::Export { .. } | RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Settings(_) => StatusCode::BAD_REQUEST,
            AppError::Precondition(e) => precondition_status(e),
            AppError::Upload(e) => match e {
                UploadError::Precondition(p) => precondition_status(p),
                UploadError::UnknownSensor(_) => StatusCode::NOT_FOUND,
                UploadError::NotEnabled(_) | UploadError::AlreadyUploaded => StatusCode::CONFLICT,
                UploadError::Status(_) | UploadError::Transport(_) => StatusCode::BAD_GATEWAY,
                UploadError::Storage(_) | UploadError::Encode(_) | UploadError::Aborted(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Storage(_) | AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn precondition_status(e: &PreconditionError) -> StatusCode {
    match e {
        PreconditionError::MissingApiKey | PreconditionError::MissingFeedId => StatusCode::PRECONDITION_FAILED,
        PreconditionError::Offline => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
