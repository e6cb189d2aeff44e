use axum::{
    extract::{FromRequest, Request},
    Json,
};

use crate::handlers::error::ApiError;

/// JSON body extractor whose rejections use the API error shape instead of plain text
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                tracing::warn!(error = %rejection.body_text(), "Rejected JSON body");
                Err(ApiError::bad_request(format!(
                    "Invalid request body: {}",
                    rejection.body_text()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, StatusCode},
        routing::post,
        Router,
    };
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Deserialize)]
    struct NamePayload {
        name: String,
    }

    async fn echo(AppJson(body): AppJson<NamePayload>) -> String {
        body.name
    }

    #[tokio::test]
    async fn malformed_body_is_a_json_400() {
        let app = Router::new().route("/children", post(echo));
        let response = app
            .oneshot(
                Request::post("/children")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"name\":"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], 400);
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body"));
    }
}
