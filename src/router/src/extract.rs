use api::ApiError;
use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

/// JSON request body whose rejection is an [`ApiError`] rather than axum's
/// plain-text response.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        title: String,
    }

    fn request(body: &'static str, content_type: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_rejections_are_api_errors() {
        for (body, content_type) in [
            (r#"{"title": 1"#, Some("application/json")),
            (r#"{"title": 1}"#, Some("application/json")),
            (r#"{"title": "a"}"#, None),
        ] {
            let err = ApiJson::<Payload>::from_request(request(body, content_type), &())
                .await
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(err.code.as_deref(), Some("validation_failed"));
        }
    }

    #[tokio::test]
    async fn test_valid_body_is_extracted() {
        let ApiJson(payload) =
            ApiJson::<Payload>::from_request(request(r#"{"title": "a"}"#, Some("application/json")), &())
                .await
                .unwrap();
        assert_eq!(payload.title, "a");
    }
}
