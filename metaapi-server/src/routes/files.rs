//! Per-user file endpoints: key creation, presigned uploads, listings

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use metaapi_db::Connector;
use serde::Serialize;

use crate::error::ApiError;
use crate::extractors::FormFields;
use crate::state::AppState;
use crate::storage::{display_name, upload_key, user_prefix, PresignedUpload};
use crate::validation::{form_context, validate_required};

const USER_KEY_FIELDS: &[(&str, &str)] = &[
    ("email", "email"),
    ("email_verified", "email_verified"),
    ("userPoolId", "user_pool_id"),
    ("userName", "user_id"),
];

/// One entry of a user's file listing
#[derive(Debug, Serialize)]
pub struct UserFile {
    pub key: String,
    pub size: i64,
    #[serde(rename = "mod")]
    pub modified: Option<String>,
}

/// POST /createCognitoUserKey - answers `True` or `False`
async fn create_cognito_user_key<C: Connector>(
    State(state): State<Arc<AppState<C>>>,
    FormFields(form): FormFields,
) -> Result<&'static str, ApiError> {
    let data = form_context(&form, USER_KEY_FIELDS);
    validate_required(&data, &["email", "email_verified", "user_pool_id", "user_id"])?;

    let user_id = data["user_id"].as_str().unwrap_or_default();
    let created = state.storage.add_user_key(state.bucket(), user_id).await;
    tracing::info!(user_id, created, "User key requested");

    Ok(if created { "True" } else { "False" })
}

/// GET /getPresignedUserDataUrl?user_id=..&file_name=..
async fn presigned_user_data_url<C: Connector>(
    State(state): State<Arc<AppState<C>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PresignedUpload>, ApiError> {
    let data = form_context(&params, &[("user_id", "user_id"), ("file_name", "file_name")]);
    validate_required(&data, &["user_id", "file_name"])?;

    let key = upload_key(
        &params["user_id"],
        &params["file_name"],
        chrono::Local::now().naive_local(),
    );
    tracing::debug!(key = %key, "Presigning upload");

    let upload = state
        .storage
        .presign_upload(state.bucket(), &key, state.storage_config.presign_expiry)
        .await?;
    Ok(Json(upload))
}

/// GET /getDataByUser?user_id=..
async fn data_by_user<C: Connector>(
    State(state): State<Arc<AppState<C>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<UserFile>>, ApiError> {
    let data = form_context(&params, &[("user_id", "user_id")]);
    validate_required(&data, &["user_id"])?;

    let prefix = user_prefix(&params["user_id"]);
    let objects = state.storage.list_objects(state.bucket(), &prefix).await?;

    let files = objects
        .into_iter()
        .filter(|object| object.key != prefix)
        .map(|object| UserFile {
            key: display_name(&object.key),
            size: object.size,
            modified: object.last_modified,
        })
        .collect();
    Ok(Json(files))
}

pub fn router<C: Connector>() -> Router<Arc<AppState<C>>> {
    Router::new()
        .route("/createCognitoUserKey", post(create_cognito_user_key::<C>))
        .route("/getPresignedUserDataUrl", get(presigned_user_data_url::<C>))
        .route("/getDataByUser", get(data_by_user::<C>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BUCKET;
    use crate::routes::test_support::{get, post_form, post_multipart, send, state_with};
    use crate::storage::memory::MemoryStore;
    use axum::http::StatusCode;
    use metaapi_db::testing::FakeConnector;
    use serde_json::{json, Value};

    async fn app(storage: Arc<MemoryStore>) -> Router {
        let state = state_with(FakeConnector::new(), storage).await;
        router::<FakeConnector>().with_state(state)
    }

    #[tokio::test]
    async fn user_key_is_created() {
        let storage = Arc::new(MemoryStore::default());
        let form = "email=a%40b.c&email_verified=true&userPoolId=pool&userName=u-1";
        let (status, body) = send(app(storage.clone()).await, post_form("/createCognitoUserKey", form)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "True");
        assert!(storage.contains(DEFAULT_BUCKET, "u-1/"));
    }

    #[tokio::test]
    async fn user_key_accepts_multipart_form() {
        let storage = Arc::new(MemoryStore::default());
        let request = post_multipart(
            "/createCognitoUserKey",
            &[("email", "a@b.c"), ("email_verified", "true"), ("userPoolId", "pool"), ("userName", "u-2")],
        );
        let (status, body) = send(app(storage.clone()).await, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "True");
        assert!(storage.contains(DEFAULT_BUCKET, "u-2/"));
    }

    #[tokio::test]
    async fn user_key_failure_answers_false() {
        let form = "email=a&email_verified=true&userPoolId=pool&userName=u-1";
        let (status, body) = send(
            app(Arc::new(MemoryStore::failing())).await,
            post_form("/createCognitoUserKey", form),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "False");
    }

    #[tokio::test]
    async fn user_key_requires_user_name() {
        let (status, body) = send(
            app(Arc::new(MemoryStore::default())).await,
            post_form("/createCognitoUserKey", "email=a&email_verified=true&userPoolId=p"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("user_id"));
    }

    #[tokio::test]
    async fn presigned_url_uses_timestamped_key() {
        let (status, body) = send(
            app(Arc::new(MemoryStore::default())).await,
            get("/getPresignedUserDataUrl?user_id=u-1&file_name=my%20report.pdf"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let body: Value = serde_json::from_str(&body).unwrap();
        let key = body["key"].as_str().unwrap();
        assert!(key.starts_with("u-1/my_report"));
        assert!(key.ends_with(".pdf"));
        assert_eq!(display_name(key), "my_report.pdf");
        assert_eq!(body["method"], "PUT");
        assert_eq!(body["expires_in"], 3600);
    }

    #[tokio::test]
    async fn presigned_url_requires_file_name() {
        let (status, _) = send(
            app(Arc::new(MemoryStore::default())).await,
            get("/getPresignedUserDataUrl?user_id=u-1"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_strips_prefix_and_timestamp() {
        let storage = Arc::new(MemoryStore::with_objects(
            DEFAULT_BUCKET,
            &[
                ("u-1/", 0),
                ("u-1/scan2024-03-05T10-11-12.png", 2048),
                ("u-2/other.txt", 5),
            ],
        ));
        let (status, body) = send(app(storage).await, get("/getDataByUser?user_id=u-1")).await;
        assert_eq!(status, StatusCode::OK);

        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            body,
            json!([{"key": "scan.png", "size": 2048, "mod": "2024-03-05T10:11:12Z"}])
        );
    }

    #[tokio::test]
    async fn listing_failure_is_502() {
        let (status, _) = send(
            app(Arc::new(MemoryStore::failing())).await,
            get("/getDataByUser?user_id=u-1"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
