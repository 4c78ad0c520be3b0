use axum::{
    body::Body,
    http::{Response, StatusCode},
    response::IntoResponse,
};

/// Request problems the caller can fix. Rendered as 400 with the message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
}

// Any error a handler bubbles up with `?`
pub struct Report(color_eyre::Report);

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<E> From<E> for Report
where
    E: Into<color_eyre::Report>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for Report {
    fn into_response(self) -> Response<Body> {
        let err = self.0;

        if let Some(ApiError::BadRequest(message)) = err.downcast_ref::<ApiError>() {
            log::debug!("Rejected request: {}", message);
            return (StatusCode::BAD_REQUEST, message.clone()).into_response();
        }

        log::error!("{err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong".to_string(),
        )
            .into_response()
    }
}
