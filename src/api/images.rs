//! Image history endpoint
//!
//! GET /v1/images - list stored PNG images with their public URLs

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;
use serde::Serialize;
use tracing::error;

use super::{error_response, AppState};
use crate::storage::{StorageSettings, StoredObject};

/// Maximum number of objects listed per request
pub const LIST_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub key: String,
    pub url: String,
    pub size: i64,
    pub last_modified: String,
}

#[derive(Debug, Serialize)]
pub struct ListImagesResponse {
    pub images: Vec<ImageInfo>,
}

/// Keep PNG objects (after the cap) and attach public URLs
fn render(objects: Vec<StoredObject>, settings: &StorageSettings) -> Vec<ImageInfo> {
    objects
        .into_iter()
        .take(LIST_LIMIT)
        .filter(|object| object.key.ends_with(".png"))
        .map(|object| ImageInfo {
            url: settings.public_url_for(&object.key),
            size: object.size,
            last_modified: object
                .last_modified
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            key: object.key,
        })
        .collect()
}

/// List stored images
pub async fn list_images(State(state): State<AppState>) -> Response {
    let settings = state.config.storage();
    if settings.bucket.is_empty() {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "bucket not configured");
    }

    let store = match state.storage.connect() {
        Ok(store) => store,
        Err(e) => {
            error!("failed to create storage client: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to create storage client",
            );
        }
    };

    let objects = match store.list(None, LIST_LIMIT).await {
        Ok(objects) => objects,
        Err(e) => {
            error!("failed to list objects: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to list objects");
        }
    };

    let images = render(objects, &settings);
    Json(ListImagesResponse { images }).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Method;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::api::router;
    use crate::api::testing::{json, send, state};
    use crate::storage::{BucketClient, ObjectStore, StorageError, StoreConnector};
    use crate::tools::testing::FakeStores;

    /// Serves a fixed bucket
    struct Seeded(Arc<dyn ObjectStore>);

    impl StoreConnector for Seeded {
        fn connect(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
            Ok(self.0.clone())
        }
    }

    /// Reports every object regardless of the requested limit
    struct Unbounded(Vec<StoredObject>);

    #[async_trait]
    impl ObjectStore for Unbounded {
        async fn put(&self, key: &str, _: Bytes, _: &str) -> Result<String, StorageError> {
            Ok(key.to_string())
        }

        async fn list(
            &self,
            _prefix: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<StoredObject>, StorageError> {
            Ok(self.0.clone())
        }
    }

    /// Always fails to list
    struct Broken;

    #[async_trait]
    impl ObjectStore for Broken {
        async fn put(&self, _: &str, _: Bytes, _: &str) -> Result<String, StorageError> {
            Err(StorageError::NotConfigured)
        }

        async fn list(
            &self,
            _prefix: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<StoredObject>, StorageError> {
            Err(StorageError::NotConfigured)
        }
    }

    fn object(key: &str) -> StoredObject {
        StoredObject {
            key: key.to_string(),
            size: 42,
            last_modified: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    async fn seeded_bucket(keys: &[String]) -> Arc<dyn ObjectStore> {
        let bucket = BucketClient::in_memory();
        for key in keys {
            bucket
                .put(key, Bytes::from_static(b"img"), "image/png")
                .await
                .unwrap();
        }
        Arc::new(bucket)
    }

    #[test]
    fn test_render_formats_entries() {
        let settings = StorageSettings {
            bucket: "lgtm".to_string(),
            region: "auto".to_string(),
            endpoint: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            account_id: String::new(),
            public_url: "https://pub.example.dev/".to_string(),
            timeout: std::time::Duration::from_secs(1),
        };
        let images = render(vec![object("abc-gopher.png")], &settings);
        assert_eq!(
            images,
            vec![ImageInfo {
                key: "abc-gopher.png".to_string(),
                url: "https://pub.example.dev/abc-gopher.png".to_string(),
                size: 42,
                last_modified: "2025-01-02T03:04:05Z".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_filters_non_png() {
        let mut keys: Vec<String> = (0..6).map(|i| format!("img-{}.png", i)).collect();
        keys.extend(["a.jpg", "b.gif", "c.txt", "d.png.bak"].map(String::from));
        let bucket = seeded_bucket(&keys).await;

        let router = router(state("lgtm", Arc::new(Seeded(bucket))));
        let response = send(router, Method::GET, "/v1/images", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        let images = body["images"].as_array().unwrap();
        assert_eq!(images.len(), 6);
        assert!(images
            .iter()
            .all(|i| i["url"].as_str().unwrap().starts_with("https://pub.example.dev/img-")));
    }

    #[tokio::test]
    async fn test_caps_at_limit() {
        let keys: Vec<String> = (0..250).map(|i| format!("{:03}.png", i)).collect();
        let bucket = seeded_bucket(&keys).await;

        let router = router(state("lgtm", Arc::new(Seeded(bucket))));
        let body = json(send(router, Method::GET, "/v1/images", Body::empty()).await).await;
        assert!(body["images"].as_array().unwrap().len() <= LIST_LIMIT);
    }

    #[tokio::test]
    async fn test_caps_even_if_store_ignores_limit() {
        let objects = (0..250).map(|i| object(&format!("{}.png", i))).collect();
        let store: Arc<dyn ObjectStore> = Arc::new(Unbounded(objects));

        let router = router(state("lgtm", Arc::new(Seeded(store))));
        let body = json(send(router, Method::GET, "/v1/images", Body::empty()).await).await;
        assert_eq!(body["images"].as_array().unwrap().len(), LIST_LIMIT);
    }

    #[tokio::test]
    async fn test_empty_bucket_yields_empty_array() {
        let bucket = seeded_bucket(&[]).await;
        let router = router(state("lgtm", Arc::new(Seeded(bucket))));
        let body = json(send(router, Method::GET, "/v1/images", Body::empty()).await).await;
        assert_eq!(body, serde_json::json!({"images": []}));
    }

    #[tokio::test]
    async fn test_post_not_allowed() {
        let stores = Arc::new(FakeStores::default());
        let router = router(state("lgtm", stores.clone()));
        let response = send(router, Method::POST, "/v1/images", Body::from("{}")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            stores.connects.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_bucket_not_configured() {
        let router = router(state("", Arc::new(FakeStores::default())));
        let response = send(router, Method::GET, "/v1/images", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json(response).await,
            serde_json::json!({"error": "bucket not configured"})
        );
    }

    #[tokio::test]
    async fn test_list_failure() {
        let store: Arc<dyn ObjectStore> = Arc::new(Broken);
        let router = router(state("lgtm", Arc::new(Seeded(store))));
        let response = send(router, Method::GET, "/v1/images", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json(response).await,
            serde_json::json!({"error": "failed to list objects"})
        );
    }

    #[tokio::test]
    async fn test_client_failure() {
        let stores = Arc::new(FakeStores {
            fail_connect: true,
            ..FakeStores::default()
        });
        let router = router(state("lgtm", stores));
        let response = send(router, Method::GET, "/v1/images", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
