use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequestParts, MatchedPath, Path, Query, State},
    http::{header, request::Parts, Request, StatusCode},
    response::{Html, IntoResponse, Response},
    routing, Json, Router,
};
use axum_typed_multipart::{BaseMultipart, FieldData, TryFromMultipart};
use log::info;
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info_span};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    codec,
    config::Config,
    error::{ApiError, ErrorBody},
    ingest::{Ingestor, MAX_UPLOAD_BYTES},
    storage::{Folder, FolderStore, MediaRoot},
    transform::{Directive, TransformQuery},
};

/// Room for multipart boundaries and headers on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct AppState {
    store: FolderStore,
    ingestor: Ingestor,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let store = FolderStore::new(MediaRoot::new(&config.media_dir));
        let ingestor = Ingestor::new(store.clone());
        Self { store, ingestor }
    }

    pub fn store(&self) -> &FolderStore {
        &self.store
    }
}

pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        // The route template, not the concrete path.
        let matched_path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str);

        info_span!(
            "http_request",
            method = ?request.method(),
            matched_path,
        )
    });
    let cors_layer = CorsLayer::new()
        .allow_headers(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_origin(tower_http::cors::Any);
    Router::new()
        .route("/", routing::get(root))
        .route("/images/:folder", routing::get(list_images))
        .route("/images/:folder/:id", routing::get(fetch_image))
        .route(
            "/upload/:folder",
            routing::post(upload)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD)),
        )
        .route("/folders", routing::get(list_folders))
        .route("/folders/new", routing::get(new_folder))
        .route("/folders/clear", routing::get(clear_all))
        .route("/folders/clear/:folder", routing::get(clear_folder))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer)
        .layer(trace_layer)
        .layer(CompressionLayer::new().gzip(true).deflate(true))
}

/// The `:folder` path segment, resolved and confirmed on disk. Runs on the
/// request head only, so a bad folder is rejected before the body is read.
#[derive(Debug)]
pub struct ExistingFolder(pub Folder);

#[async_trait]
impl FromRequestParts<AppState> for ExistingFolder {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let Path(name) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|err| ApiError::new(err.status(), err.body_text()))?;
        let folder = state.store.existing_folder(&name).await?;
        Ok(Self(folder))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IdResponse {
    pub id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContentResponse {
    pub content: Vec<String>,
}

#[derive(TryFromMultipart, ToSchema)]
pub struct UploadImageRequest {
    #[form_data(limit = "20MiB")]
    #[schema(value_type = String, format = Binary)]
    image: FieldData<Bytes>,
}

async fn root() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

#[utoipa::path(
    get,
    path = "/images/{folder}/{id}",
    params(
        ("folder" = String, Path, description = "Folder name"),
        ("id" = String, Path, description = "Image id"),
        TransformQuery,
    ),
    responses(
        (status = 200, description = "Encoded image bytes, WebP unless `format` says otherwise"),
        (status = 400, description = "Unsupported output format", body = ErrorBody),
        (status = 401, description = "Folder name not allowed", body = ErrorBody),
        (status = 404, description = "No such image, including ids that contain a dot", body = ErrorBody),
    )
)]
async fn fetch_image(
    State(state): State<AppState>,
    Path((folder, id)): Path<(String, String)>,
    Query(query): Query<TransformQuery>,
) -> Result<Response, ApiError> {
    let stored = state.store.read_item(&folder, &id).await?;
    let directive = Directive::from(&query);
    debug!(%folder, %id, ?directive, "rendering image");
    let rendered = codec::render_blocking(stored, directive).await?;
    Ok(([(header::CONTENT_TYPE, rendered.content_type())], rendered.bytes).into_response())
}

#[utoipa::path(
    get,
    path = "/images/{folder}",
    params(("folder" = String, Path, description = "Folder name")),
    responses(
        (status = 200, description = "Ids of the images in the folder", body = ContentResponse),
        (status = 400, description = "Folder does not exist", body = ErrorBody),
        (status = 401, description = "Folder name not allowed", body = ErrorBody),
    )
)]
async fn list_images(
    State(state): State<AppState>,
    Path(folder): Path<String>,
) -> Result<Json<ContentResponse>, ApiError> {
    let content = state.store.list_items(&folder).await?;
    Ok(Json(ContentResponse { content }))
}

#[utoipa::path(
    post,
    path = "/upload/{folder}",
    params(("folder" = String, Path, description = "Folder name")),
    request_body(content = UploadImageRequest, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Stored image id", body = IdResponse),
        (status = 400, description = "Folder does not exist or payload is not an image", body = ErrorBody),
        (status = 401, description = "Folder name not allowed", body = ErrorBody),
        (status = 413, description = "Image larger than 20 MiB", body = ErrorBody),
    )
)]
async fn upload(
    State(state): State<AppState>,
    ExistingFolder(folder): ExistingFolder,
    multipart: BaseMultipart<UploadImageRequest, ApiError>,
) -> Result<Json<IdResponse>, ApiError> {
    let image = multipart.data.image;
    info!(
        "upload to {}: {} ({} bytes)",
        folder.name(),
        image.metadata.file_name.as_deref().unwrap_or("unnamed"),
        image.contents.len()
    );
    let id = state.ingestor.ingest_into(&folder, image.contents).await?;
    Ok(Json(IdResponse { id }))
}

#[utoipa::path(
    get,
    path = "/folders/new",
    responses((status = 200, description = "Created folder id", body = IdResponse))
)]
async fn new_folder(State(state): State<AppState>) -> Result<Json<IdResponse>, ApiError> {
    let id = state.store.create_folder().await?;
    Ok(Json(IdResponse { id }))
}

#[utoipa::path(
    get,
    path = "/folders",
    responses((status = 200, description = "Folder names", body = ContentResponse))
)]
async fn list_folders(State(state): State<AppState>) -> Result<Json<ContentResponse>, ApiError> {
    let content = state.store.list_folders().await?;
    Ok(Json(ContentResponse { content }))
}

#[utoipa::path(
    get,
    path = "/folders/clear/{folder}",
    params(("folder" = String, Path, description = "Folder name")),
    responses(
        (status = 200, description = "Folder deleted"),
        (status = 400, description = "Folder does not exist", body = ErrorBody),
        (status = 401, description = "Folder name not allowed", body = ErrorBody),
    )
)]
async fn clear_folder(
    State(state): State<AppState>,
    Path(folder): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.clear_folder(&folder).await?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/folders/clear",
    responses((status = 200, description = "Every folder deleted"))
)]
async fn clear_all(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    info!("clearing every folder");
    state.store.clear_all().await?;
    Ok(StatusCode::OK)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        fetch_image,
        list_images,
        upload,
        new_folder,
        list_folders,
        clear_folder,
        clear_all,
    ),
    components(schemas(IdResponse, ContentResponse, ErrorBody, UploadImageRequest)),
    tags(
        (name = "imgbucket", description = "Folder-based image storage with on-the-fly resizing")
    )
)]
pub struct ApiDoc;
