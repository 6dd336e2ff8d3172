//! Photo API endpoints
//!
//! - GET /api/v1/photos/categories - All categories
//! - POST /api/v1/photos - Upload (multipart)
//! - GET /api/v1/photos - Browse with filters
//! - GET /api/v1/photos/{photo_id} - Details, counts a view
//! - DELETE /api/v1/photos/{photo_id} - Owner only
//! - POST /api/v1/photos/{photo_id}/like - Like
//! - DELETE /api/v1/photos/{photo_id}/like - Unlike
//! - GET /api/v1/photos/{photo_id}/download - Original bytes as an attachment

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{
    clamp_page, default_limit, image_error, multipart_error, read_file, read_text,
    upload_body_limit, UploadedFile,
};
use crate::api::middleware::{self, ApiError, AppState, AuthenticatedUser, MaybeUser, MessageResponse};
use crate::api::responses::{CategoryResponse, PhotoListItem, PhotoResponse};
use crate::models::PhotoFilter;
use crate::services::photo::{parse_id_list, PhotoServiceError, UploadPhotoInput};

#[derive(Debug, Deserialize)]
pub struct ListPhotosQuery {
    /// Comma separated
    pub category_ids: Option<String>,
    pub owner_id: Option<i64>,
    pub search: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub fn router(state: AppState) -> Router<AppState> {
    let rate_limited = Router::new()
        .route("/", post(upload_photo))
        .layer(DefaultBodyLimit::max(upload_body_limit(&state.config.upload)))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .route_layer(axum_middleware::from_fn(middleware::require_verified))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let verified = Router::new()
        .route("/{photo_id}", delete(delete_photo))
        .route("/{photo_id}/like", post(like_photo).delete(unlike_photo))
        .route_layer(axum_middleware::from_fn(middleware::require_verified))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let authenticated = Router::new()
        .route("/{photo_id}/download", get(download_photo))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let optional = Router::new()
        .route("/", get(list_photos))
        .route("/{photo_id}", get(get_photo))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ));

    Router::new()
        .route("/categories", get(list_categories))
        .merge(optional)
        .merge(authenticated)
        .merge(verified)
        .merge(rate_limited)
}

fn photo_error(e: PhotoServiceError) -> ApiError {
    match e {
        PhotoServiceError::ValidationError(msg) => ApiError::validation_error(msg),
        PhotoServiceError::NotFound
        | PhotoServiceError::NotLiked
        | PhotoServiceError::FileNotFound => ApiError::not_found(e.to_string()),
        PhotoServiceError::NotAuthorized => ApiError::forbidden(e.to_string()),
        PhotoServiceError::AlreadyLiked => ApiError::bad_request(e.to_string()),
        PhotoServiceError::Image(e) => image_error(e),
        PhotoServiceError::InternalError(e) => ApiError::internal(e),
    }
}

/// GET /api/v1/photos/categories
async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let categories = state
        .photo_service
        .categories()
        .await
        .map_err(photo_error)?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

/// POST /api/v1/photos
async fn upload_photo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<UploadedFile> = None;
    let mut title = String::new();
    let mut description = None;
    let mut category_ids = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => file = Some(read_file(field).await?),
            Some("title") => title = read_text(field).await?,
            Some("description") => description = Some(read_text(field).await?),
            Some("category_ids") => {
                category_ids = parse_id_list(&read_text(field).await?).map_err(photo_error)?
            }
            _ => {}
        }
    }
    let file = file.ok_or_else(|| ApiError::validation_error("Missing file"))?;

    let details = state
        .photo_service
        .upload(
            &user.0,
            UploadPhotoInput {
                title,
                description,
                category_ids,
                file_name: file.file_name,
                bytes: file.bytes,
            },
        )
        .await
        .map_err(photo_error)?;

    Ok((
        StatusCode::CREATED,
        Json(PhotoResponse::new(details, &state.config.app.backend_url)),
    ))
}

/// GET /api/v1/photos
async fn list_photos(
    State(state): State<AppState>,
    Query(query): Query<ListPhotosQuery>,
) -> Result<Json<Vec<PhotoListItem>>, ApiError> {
    let category_ids = match query.category_ids.as_deref() {
        Some(raw) => parse_id_list(raw).map_err(photo_error)?,
        None => Vec::new(),
    };
    let (skip, limit) = clamp_page(query.skip, query.limit);
    let filter = PhotoFilter {
        category_ids,
        owner_id: query.owner_id,
        search: query.search.filter(|s| !s.trim().is_empty()),
        skip,
        limit,
    };

    let photos = state.photo_service.list(&filter).await.map_err(photo_error)?;
    let backend_url = &state.config.app.backend_url;
    Ok(Json(
        photos
            .into_iter()
            .map(|photo| PhotoListItem::new(photo, backend_url))
            .collect(),
    ))
}

/// GET /api/v1/photos/{photo_id}
async fn get_photo(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(photo_id): Path<i64>,
) -> Result<Json<PhotoResponse>, ApiError> {
    let details = state
        .photo_service
        .get(photo_id, viewer.id())
        .await
        .map_err(photo_error)?;
    Ok(Json(PhotoResponse::new(details, &state.config.app.backend_url)))
}

/// DELETE /api/v1/photos/{photo_id}
async fn delete_photo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(photo_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .photo_service
        .delete(&user.0, photo_id)
        .await
        .map_err(photo_error)?;
    Ok(MessageResponse::new("Photo deleted successfully"))
}

/// POST /api/v1/photos/{photo_id}/like
async fn like_photo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(photo_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .photo_service
        .like(user.0.id, photo_id)
        .await
        .map_err(photo_error)?;
    Ok(MessageResponse::new("Photo liked successfully"))
}

/// DELETE /api/v1/photos/{photo_id}/like
async fn unlike_photo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(photo_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .photo_service
        .unlike(user.0.id, photo_id)
        .await
        .map_err(photo_error)?;
    Ok(MessageResponse::new("Photo unliked successfully"))
}

/// GET /api/v1/photos/{photo_id}/download
async fn download_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let (file_name, bytes) = state
        .photo_service
        .download(photo_id)
        .await
        .map_err(photo_error)?;

    let disposition = format!("attachment; filename=\"{}\"", file_name.replace('"', "_"));
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{test_app, tiny_png, TestApp};
    use axum::http::{header, StatusCode};
    use axum_test::multipart::{MultipartForm, Part};
    use serde_json::Value;

    async fn upload(app: &TestApp, token: &str, title: &str, categories: &str) -> Value {
        let form = MultipartForm::new()
            .add_text("title", title)
            .add_text("description", "Taken at dawn")
            .add_text("category_ids", categories)
            .add_part(
                "file",
                Part::bytes(tiny_png()).file_name("lake.png").mime_type("image/png"),
            );
        let response = app
            .server
            .post("/api/v1/photos")
            .authorization_bearer(token)
            .multipart(form)
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    #[tokio::test]
    async fn test_categories_are_public() {
        let app = test_app().await;
        let response = app.server.get("/api/v1/photos/categories").await;
        response.assert_status_ok();
        let categories: Vec<Value> = response.json();
        assert_eq!(categories.len(), 8);
        assert_eq!(categories[0]["name"], "Abstract");
    }

    #[tokio::test]
    async fn test_upload_and_get() {
        let app = test_app().await;
        let (alice, token) = app.user("alice", true).await;

        let photo = upload(&app, &token, "Lake", "1, 999").await;
        assert_eq!(photo["title"], "Lake");
        assert_eq!(photo["owner_id"], alice.id);
        assert_eq!(photo["file_name"], "lake.png");
        assert_eq!(photo["width"], 1);
        assert!(photo["file_path"]
            .as_str()
            .unwrap()
            .starts_with("http://testserver/uploads/photos/"));
        assert_eq!(photo["categories"].as_array().unwrap().len(), 1);

        let id = photo["id"].as_i64().unwrap();
        let response = app.server.get(&format!("/api/v1/photos/{}", id)).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["views_count"], 1);
        assert_eq!(body["is_liked"], false);

        let response = app.server.get("/api/v1/photos/9999").await;
        response.assert_status_not_found();
        assert_eq!(response.json::<Value>()["error"]["message"], "Photo not found");
    }

    #[tokio::test]
    async fn test_upload_requires_verified_user() {
        let app = test_app().await;
        let (_, token) = app.user("alice", false).await;

        let form = MultipartForm::new().add_text("title", "Lake");
        let response = app
            .server
            .post("/api/v1/photos")
            .authorization_bearer(&token)
            .multipart(form)
            .await;
        response.assert_status_forbidden();
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_type_and_category_list() {
        let app = test_app().await;
        let (_, token) = app.user("alice", true).await;

        let form = MultipartForm::new()
            .add_text("title", "Doc")
            .add_part("file", Part::bytes(b"%PDF".to_vec()).file_name("doc.pdf"));
        let response = app
            .server
            .post("/api/v1/photos")
            .authorization_bearer(&token)
            .multipart(form)
            .await;
        response.assert_status_bad_request();
        assert_eq!(
            response.json::<Value>()["error"]["message"],
            "Invalid file type. Allowed types: jpg, jpeg, png, gif, webp"
        );

        let form = MultipartForm::new()
            .add_text("title", "Lake")
            .add_text("category_ids", "one,two")
            .add_part("file", Part::bytes(tiny_png()).file_name("lake.png"));
        let response = app
            .server
            .post("/api/v1/photos")
            .authorization_bearer(&token)
            .multipart(form)
            .await;
        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn test_list_filters() {
        let app = test_app().await;
        let (alice, alice_token) = app.user("alice", true).await;
        let (_, bob_token) = app.user("bob", true).await;

        upload(&app, &alice_token, "Mountain lake", "1").await;
        upload(&app, &bob_token, "City street", "4").await;

        let all: Vec<Value> = app.server.get("/api/v1/photos").await.json();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["title"], "City street");

        let by_owner: Vec<Value> = app
            .server
            .get("/api/v1/photos")
            .add_query_param("owner_id", alice.id)
            .await
            .json();
        assert_eq!(by_owner.len(), 1);

        let by_search: Vec<Value> = app
            .server
            .get("/api/v1/photos")
            .add_query_param("search", "LAKE")
            .await
            .json();
        assert_eq!(by_search.len(), 1);
        assert_eq!(by_search[0]["title"], "Mountain lake");

        let by_category: Vec<Value> = app
            .server
            .get("/api/v1/photos")
            .add_query_param("category_ids", "4")
            .await
            .json();
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0]["owner_username"], "bob");

        let limited: Vec<Value> = app
            .server
            .get("/api/v1/photos")
            .add_query_param("limit", 1)
            .await
            .json();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_like_unlike_and_delete() {
        let app = test_app().await;
        let (_, alice_token) = app.user("alice", true).await;
        let (_, bob_token) = app.user("bob", true).await;
        let id = upload(&app, &alice_token, "Lake", "").await["id"]
            .as_i64()
            .unwrap();
        let like_path = format!("/api/v1/photos/{}/like", id);

        app.server
            .post(&like_path)
            .authorization_bearer(&bob_token)
            .await
            .assert_status_ok();
        let again = app.server.post(&like_path).authorization_bearer(&bob_token).await;
        again.assert_status_bad_request();
        assert_eq!(again.json::<Value>()["error"]["message"], "Photo already liked");

        let body: Value = app
            .server
            .get(&format!("/api/v1/photos/{}", id))
            .authorization_bearer(&bob_token)
            .await
            .json();
        assert_eq!(body["likes_count"], 1);
        assert_eq!(body["is_liked"], true);

        app.server
            .delete(&like_path)
            .authorization_bearer(&bob_token)
            .await
            .assert_status_ok();
        let again = app.server.delete(&like_path).authorization_bearer(&bob_token).await;
        again.assert_status_not_found();
        assert_eq!(again.json::<Value>()["error"]["message"], "Photo not liked");

        let photo_path = format!("/api/v1/photos/{}", id);
        let response = app.server.delete(&photo_path).authorization_bearer(&bob_token).await;
        response.assert_status_forbidden();
        assert_eq!(
            response.json::<Value>()["error"]["message"],
            "Not authorized to delete this photo"
        );

        let response = app.server.delete(&photo_path).authorization_bearer(&alice_token).await;
        response.assert_status_ok();
        response.assert_json(&serde_json::json!({"message": "Photo deleted successfully"}));
        app.server.get(&photo_path).await.assert_status_not_found();
    }

    #[tokio::test]
    async fn test_download() {
        let app = test_app().await;
        let (_, token) = app.user("alice", true).await;
        let id = upload(&app, &token, "Lake", "").await["id"].as_i64().unwrap();
        let path = format!("/api/v1/photos/{}/download", id);

        app.server.get(&path).await.assert_status_unauthorized();

        let response = app.server.get(&path).authorization_bearer(&token).await;
        response.assert_status_ok();
        assert_eq!(
            response.header(header::CONTENT_TYPE),
            "application/octet-stream"
        );
        assert_eq!(
            response.header(header::CONTENT_DISPOSITION),
            "attachment; filename=\"lake.png\""
        );
        assert!(!response.as_bytes().is_empty());
    }
}
