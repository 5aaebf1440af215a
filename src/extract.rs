use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

use crate::error::AppError;

/// JsonBody
///
/// `Json<T>` whose rejection is an `AppError`, so malformed bodies are
/// answered with the usual `{"error": ...}` shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Note {
        title: String,
    }

    fn request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn well_formed_bodies_are_extracted() {
        let JsonBody(note) = JsonBody::<Note>::from_request(
            request(Some("application/json"), r#"{"title":"Vespers"}"#),
            &(),
        )
        .await
        .unwrap();
        assert_eq!(note.title, "Vespers");
    }

    #[tokio::test]
    async fn bad_bodies_are_validation_errors() {
        for (content_type, body) in [
            (Some("application/json"), r#"{"title": 5}"#),
            (Some("application/json"), "{not json"),
            (None, r#"{"title":"Vespers"}"#),
        ] {
            let result = JsonBody::<Note>::from_request(request(content_type, body), &()).await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{body}");
        }
    }
}
