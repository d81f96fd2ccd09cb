use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_typed_multipart::TypedMultipartError;
use serde::Serialize;
use tracing::error;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("access not allowed")]
    Forbidden,
    #[error("folder {0} does not exist")]
    FolderNotFound(String),
    #[error("image {0} does not exist")]
    ItemNotFound(String),
    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("unsupported output format {0}")]
    UnsupportedFormat(String),
    #[error("cannot decode upload: {0}")]
    Undecodable(#[source] image::ImageError),
    #[error("image {0}")]
    Codec(#[from] image::ImageError),
    #[error("io {0}")]
    Io(#[from] std::io::Error),
    #[error("task {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("config {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// JSON body sent with every non-2xx response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Forbidden => StatusCode::UNAUTHORIZED,
            Error::FolderNotFound(_) | Error::UnsupportedFormat(_) | Error::Undecodable(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::ItemNotFound(_) => StatusCode::NOT_FOUND,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Codec(_) | Error::Io(_) | Error::Task(_) | Error::Config(_) => {
                error!("internal error: {err}");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<TypedMultipartError> for ApiError {
    fn from(err: TypedMultipartError) -> Self {
        let status = match err.get_status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (Error::Forbidden, StatusCode::UNAUTHORIZED),
            (Error::FolderNotFound("a".into()), StatusCode::BAD_REQUEST),
            (Error::ItemNotFound("b".into()), StatusCode::NOT_FOUND),
            (
                Error::PayloadTooLarge { limit: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (Error::UnsupportedFormat("xyz".into()), StatusCode::BAD_REQUEST),
            (
                Error::Io(std::io::Error::other("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn forbidden_message() {
        let api = ApiError::from(Error::Forbidden);
        assert_eq!(api.message(), "access not allowed");
    }

    #[test]
    fn internal_detail_is_hidden() {
        let api = ApiError::from(Error::Config("PORT".into()));
        assert_eq!(api.message(), "internal error");
    }
}
