//! REST API server
//!
//! Provides HTTP endpoints for:
//! - Configuration and collection management
//! - Document ingestion (JSON, multipart, multipart with SSE progress)
//! - Hybrid search with property filters
//! - Permission administration
//! - Health, readiness and embedding-model discovery

use crate::auth::{AuthenticatedUser, IdentityProvider, KeycloakIdentityProvider, RejectAllIdentityProvider};
use crate::chunker::RecursiveChunker;
use crate::config::Settings;
use crate::domain::{ChunkingStrategy, Document, Permission, PropertyType, SearchFilter};
use crate::embedding::OpenAiEmbeddingClient;
use crate::error::{RagError, Result};
use crate::parser::parse_file;
use crate::rbac::DbPermissionChecker;
use crate::store::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::usecases::{
    CollectionService, ConfigurationService, DocumentService, IngestDocument, IngestProperty,
    NewConfiguration, PermissionService, PropertySchemaService, SearchHit, SearchRequest,
    SearchService,
};
use axum::extract::{FromRequest, FromRequestParts, Multipart, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Connection pool, used directly only by the readiness probe
    pub pool: PgPool,
    pub documents: Arc<DocumentService>,
    pub collections: Arc<CollectionService>,
    pub search: Arc<SearchService>,
    pub permissions: Arc<PermissionService>,
    pub configurations: Arc<ConfigurationService>,
    pub properties: Arc<PropertySchemaService>,
    /// Embedding client, also serving the model listing
    pub models: Arc<OpenAiEmbeddingClient>,
    pub identity: Arc<dyn IdentityProvider>,
    cors_origins: Vec<String>,
}

impl AppState {
    /// Wire all services against one pool and the given settings
    pub fn new(settings: Settings, pool: PgPool) -> Self {
        let embedder = Arc::new(OpenAiEmbeddingClient::new(
            &settings.embedding_api_url,
            &settings.embedding_api_key,
            &settings.embedding_model,
        ));
        let checker = Arc::new(DbPermissionChecker::new(pool.clone()));
        let chunker = Arc::new(RecursiveChunker);

        let identity: Arc<dyn IdentityProvider> = if settings.keycloak_client_secret.is_empty() {
            Arc::new(RejectAllIdentityProvider)
        } else {
            Arc::new(KeycloakIdentityProvider::new(
                &settings.keycloak_url,
                &settings.keycloak_realm,
                &settings.keycloak_client_id,
                &settings.keycloak_client_secret,
            ))
        };

        Self {
            documents: Arc::new(DocumentService::new(
                pool.clone(),
                checker.clone(),
                chunker.clone(),
                embedder.clone(),
            )),
            collections: Arc::new(CollectionService::new(
                pool.clone(),
                checker.clone(),
                chunker,
                embedder.clone(),
            )),
            search: Arc::new(SearchService::new(
                pool.clone(),
                checker.clone(),
                embedder.clone(),
            )),
            permissions: Arc::new(PermissionService::new(pool.clone(), checker.clone())),
            configurations: Arc::new(ConfigurationService::new(pool.clone(), embedder.clone())),
            properties: Arc::new(PropertySchemaService::new(pool.clone(), checker)),
            models: embedder,
            identity,
            cors_origins: settings.cors_origin_list(),
            pool,
        }
    }
}

// ============= Request/response types =============

/// Health check response
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status
    #[schema(example = "ok")]
    pub status: String,
    /// API version
    #[schema(example = "0.2.0")]
    pub version: String,
}

/// Error response
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    #[schema(example = "Invalid request")]
    pub error: String,
}

/// Embedding model listing
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ModelsResponse {
    pub items: Vec<ModelItem>,
}

/// One embedding model
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ModelItem {
    #[schema(example = "text-embedding-3-small")]
    pub id: String,
    #[schema(example = 1536)]
    pub dimensions: u32,
}

/// Cursor-paginated listing query
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// Request to create a configuration
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateConfigurationRequest {
    /// Chunking strategy; defaults to "recursive"
    #[serde(default)]
    #[schema(example = "recursive")]
    pub chunking_strategy: Option<String>,
    /// Embedding model name
    #[schema(example = "text-embedding-3-small")]
    pub embedding_model: String,
    /// Expected vector width; probed from the model when omitted
    #[serde(default)]
    #[schema(example = 1536)]
    pub embedding_dimensions: Option<i32>,
    /// Window size in characters
    #[schema(example = 512)]
    pub chunk_size: i32,
    /// Overlap between consecutive windows; defaults to 50
    #[serde(default)]
    #[schema(example = 50)]
    pub chunk_overlap: Option<i32>,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

/// A configuration
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ConfigurationResponse {
    pub id: Uuid,
    pub chunking_strategy: ChunkingStrategy,
    pub embedding_model: String,
    pub embedding_dimensions: i32,
    pub chunk_size: i32,
    pub chunk_overlap: i32,
    pub name: Option<String>,
}

impl From<crate::domain::Configuration> for ConfigurationResponse {
    fn from(c: crate::domain::Configuration) -> Self {
        Self {
            id: c.id,
            chunking_strategy: c.chunking_strategy,
            embedding_model: c.embedding_model,
            embedding_dimensions: c.embedding_dimensions,
            chunk_size: c.chunk_size,
            chunk_overlap: c.chunk_overlap,
            name: c.name,
        }
    }
}

/// One page of configurations
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ConfigurationPage {
    pub items: Vec<ConfigurationResponse>,
    pub next_cursor: Option<String>,
}

/// Request to create a collection
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateCollectionRequest {
    pub configuration_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
}

/// A collection
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CollectionResponse {
    pub id: Uuid,
    pub configuration_id: Uuid,
    pub name: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::domain::Collection> for CollectionResponse {
    fn from(c: crate::domain::Collection) -> Self {
        Self {
            id: c.id,
            configuration_id: c.configuration_id,
            name: c.name,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// One page of collections
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CollectionPage {
    pub items: Vec<CollectionResponse>,
    pub next_cursor: Option<String>,
}

/// Request to migrate a collection to a new configuration
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct MigrateRequest {
    pub new_configuration_id: Uuid,
}

/// Migration outcome
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct MigrateResponse {
    /// Number of packs re-chunked and re-embedded
    #[schema(example = 3)]
    pub migrated: u64,
}

/// A typed property value in an ingest request
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PropertyValueBody {
    /// Scalar value; booleans stringify as "true"/"false"
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
    /// One of string, int, float, bool, date
    #[serde(rename = "type")]
    #[schema(example = "string")]
    pub property_type: String,
}

/// JSON ingest request
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct IngestRequest {
    pub collection_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub properties: Option<HashMap<String, PropertyValueBody>>,
}

/// A document
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub content: String,
    /// Hex-encoded MD5 of the ingested content
    pub source_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Document> for DocumentResponse {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            content: d.content,
            source_hash: hex_encode(&d.source_hash),
            created_at: d.created_at,
            updated_at: d.updated_at,
            deleted_at: d.deleted_at,
        }
    }
}

/// Per-file ingest failure
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct FileError {
    pub filename: String,
    pub error: String,
}

/// Multipart ingest outcome; per-file failures do not abort the batch
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BatchIngestResponse {
    pub documents: Vec<DocumentResponse>,
    pub errors: Vec<FileError>,
}

/// Query parameters for reading one document
#[derive(Debug, Deserialize)]
pub struct GetDocumentQuery {
    pub collection_id: Uuid,
}

/// Hybrid search request
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SearchRequestBody {
    #[serde(default)]
    #[schema(example = "test")]
    pub query: String,
    #[serde(default)]
    pub vector_weight: Option<f64>,
    #[serde(default)]
    pub fts_weight: Option<f64>,
    #[serde(default)]
    pub limit: Option<i64>,
    /// Per-key filter specs: a bare value, {eq}, {one_of}, or {gte/lte}
    #[serde(default)]
    #[schema(value_type = Object)]
    pub filters: Option<serde_json::Map<String, serde_json::Value>>,
}

/// One ranked search result
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SearchResultItem {
    pub chunk_id: Uuid,
    pub pack_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub vector_score: f64,
    pub fts_score: f64,
    pub score: f64,
    pub document_title: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<SearchHit> for SearchResultItem {
    fn from(hit: SearchHit) -> Self {
        Self {
            chunk_id: hit.chunk_id,
            pack_id: hit.pack_id,
            document_id: hit.document_id,
            content: hit.content,
            vector_score: round6(hit.vector_score),
            fts_score: round6(hit.fts_score),
            score: round6(hit.score),
            document_title: hit.document_title,
            metadata: hit.metadata,
        }
    }
}

/// Search response
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
}

/// Request to assign or update a permission
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AssignPermissionRequest {
    pub subject: String,
    /// Role name: viewer, editor or admin
    #[schema(example = "viewer")]
    pub role: String,
    /// When present, replaces the role's action set
    #[serde(default)]
    pub actions_override: Option<Vec<String>>,
}

/// A permission binding
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PermissionResponse {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub subject: String,
    pub role_id: Uuid,
    pub actions_override: Option<Vec<String>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Permission> for PermissionResponse {
    fn from(p: Permission) -> Self {
        Self {
            id: p.id,
            collection_id: p.collection_id,
            subject: p.subject,
            role_id: p.role_id,
            actions_override: p.actions_override,
            created_at: p.created_at,
        }
    }
}

/// One property available for filtering
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PropertySchemaEntry {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub values: Vec<String>,
}

/// Property schema of a collection
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PropertySchemaResponse {
    pub properties: Vec<PropertySchemaEntry>,
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

// ============= Errors and extractors =============

/// Custom error type for API responses
#[derive(Debug)]
pub enum ApiError {
    /// Bearer token present but invalid
    Unauthorized,
    Rag(RagError),
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        ApiError::Rag(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Rag(err) => {
                let status = match &err {
                    RagError::NotFound { .. } => StatusCode::NOT_FOUND,
                    RagError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                    RagError::Validation(_) => StatusCode::BAD_REQUEST,
                    RagError::DuplicateDocument => StatusCode::CONFLICT,
                    RagError::Upstream(_) => StatusCode::BAD_GATEWAY,
                    RagError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    RagError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if let RagError::Internal(source) = &err {
                    error!("internal error: {:#}", source);
                    (status, "Internal server error".to_string())
                } else {
                    (status, err.to_string())
                }
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Convert Result<T> to Result<T, ApiError>
type ApiResult<T> = std::result::Result<T, ApiError>;

/// The authenticated caller, resolved by [`auth_middleware`]. Rejects with
/// 401 when a bearer token was sent but did not introspect to a user.
pub struct CurrentUser(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> ApiResult<Self> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Resolve the caller identity once per request.
///
/// No Authorization header means the anonymous subject; a bearer token is
/// introspected, and an invalid one leaves no identity so gated handlers
/// answer 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    match bearer {
        None => {
            request.extensions_mut().insert(AuthenticatedUser::anonymous());
        }
        Some(token) => match state.identity.introspect(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(user);
            }
            Ok(None) => {}
            Err(err) => return ApiError::from(err).into_response(),
        },
    }

    next.run(request).await
}

// ============= OpenAPI =============

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        ready_handler,
        list_models_handler,
        create_configuration_handler,
        list_configurations_handler,
        create_collection_handler,
        list_collections_handler,
        get_collection_handler,
        migrate_collection_handler,
        list_permissions_handler,
        assign_permission_handler,
        revoke_permission_handler,
        property_schema_handler,
        get_document_handler,
        search_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            ModelsResponse,
            ModelItem,
            CreateConfigurationRequest,
            ConfigurationResponse,
            ConfigurationPage,
            CreateCollectionRequest,
            CollectionResponse,
            CollectionPage,
            MigrateRequest,
            MigrateResponse,
            IngestRequest,
            PropertyValueBody,
            DocumentResponse,
            FileError,
            BatchIngestResponse,
            SearchRequestBody,
            SearchResultItem,
            SearchResponse,
            AssignPermissionRequest,
            PermissionResponse,
            PropertySchemaEntry,
            PropertySchemaResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "configurations", description = "Chunking and embedding configurations"),
        (name = "collections", description = "Collections, migration and permissions"),
        (name = "documents", description = "Document ingestion and retrieval"),
        (name = "search", description = "Hybrid search")
    ),
    info(
        title = "RagStore API",
        version = "0.2.0",
        description = "Multi-tenant RAG indexing and search service"
    )
)]
struct ApiDoc;

// ============= Router =============

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.cors_origins);

    Router::new()
        // Health
        .route("/v1/health", get(health_handler))
        .route("/v1/health/ready", get(ready_handler))
        // Embedding models
        .route("/v1/models", get(list_models_handler))
        // Configurations
        .route(
            "/v1/configurations",
            post(create_configuration_handler).get(list_configurations_handler),
        )
        // Collections
        .route(
            "/v1/collections",
            post(create_collection_handler).get(list_collections_handler),
        )
        .route("/v1/collections/{id}", get(get_collection_handler))
        .route("/v1/collections/{id}/migrate", post(migrate_collection_handler))
        .route(
            "/v1/collections/{id}/permissions",
            get(list_permissions_handler).post(assign_permission_handler),
        )
        .route(
            "/v1/collections/{id}/permissions/{subject}",
            delete(revoke_permission_handler),
        )
        .route(
            "/v1/collections/{id}/property-schema",
            get(property_schema_handler),
        )
        .route("/v1/collections/{id}/search", post(search_handler))
        // Documents
        .route("/v1/documents", post(ingest_documents_handler))
        .route("/v1/documents/stream", post(stream_documents_handler))
        .route("/v1/documents/{id}", get(get_document_handler))
        // OpenAPI spec endpoint
        .route("/api-docs/openapi.json", get(openapi_spec_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// OpenAPI specification endpoint
async fn openapi_spec_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// ============= Handlers =============

/// Liveness probe
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// Readiness probe; checks the database
#[utoipa::path(
    get,
    path = "/v1/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = ErrorResponse)
    )
)]
async fn ready_handler(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(RagError::from)?;
    Ok(Json(HealthResponse {
        status: "ready".to_string(),
        version: crate::VERSION.to_string(),
    }))
}

/// List embedding models
#[utoipa::path(
    get,
    path = "/v1/models",
    tag = "configurations",
    responses(
        (status = 200, description = "Available embedding models", body = ModelsResponse)
    )
)]
async fn list_models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    let items = state
        .models
        .list_models()
        .await
        .into_iter()
        .map(|m| ModelItem {
            id: m.id,
            dimensions: m.dimensions,
        })
        .collect();
    Json(ModelsResponse { items })
}

/// Create a configuration
#[utoipa::path(
    post,
    path = "/v1/configurations",
    tag = "configurations",
    request_body = CreateConfigurationRequest,
    responses(
        (status = 201, description = "Configuration created", body = ConfigurationResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse)
    )
)]
async fn create_configuration_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateConfigurationRequest>,
) -> ApiResult<(StatusCode, Json<ConfigurationResponse>)> {
    let chunking_strategy = match body.chunking_strategy.as_deref() {
        Some(raw) => ChunkingStrategy::from_str(raw).map_err(ApiError::from)?,
        None => ChunkingStrategy::Recursive,
    };
    let configuration = state
        .configurations
        .create(NewConfiguration {
            chunking_strategy,
            embedding_model: body.embedding_model,
            embedding_dimensions: body.embedding_dimensions,
            chunk_size: body.chunk_size,
            chunk_overlap: body.chunk_overlap.unwrap_or(50),
            name: body.name,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(configuration.into())))
}

/// List configurations with cursor pagination
#[utoipa::path(
    get,
    path = "/v1/configurations",
    tag = "configurations",
    params(
        ("cursor" = Option<String>, Query, description = "Last id of the previous page"),
        ("limit" = Option<i64>, Query, description = "Page size, at most 100")
    ),
    responses(
        (status = 200, description = "One page of configurations", body = ConfigurationPage)
    )
)]
async fn list_configurations_handler(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ConfigurationPage>> {
    let (cursor, limit) = parse_page(&query)?;
    let (items, next) = state.configurations.list(cursor, limit).await?;
    Ok(Json(ConfigurationPage {
        items: items.into_iter().map(Into::into).collect(),
        next_cursor: next.map(|id| id.to_string()),
    }))
}

/// Create a collection; the creator becomes its admin
#[utoipa::path(
    post,
    path = "/v1/collections",
    tag = "collections",
    request_body = CreateCollectionRequest,
    responses(
        (status = 201, description = "Collection created", body = CollectionResponse),
        (status = 404, description = "Unknown configuration", body = ErrorResponse)
    )
)]
async fn create_collection_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateCollectionRequest>,
) -> ApiResult<(StatusCode, Json<CollectionResponse>)> {
    let collection = state
        .collections
        .create(&user.user_id, body.configuration_id, body.name)
        .await?;
    Ok((StatusCode::CREATED, Json(collection.into())))
}

/// List collections the caller holds any permission on
#[utoipa::path(
    get,
    path = "/v1/collections",
    tag = "collections",
    params(
        ("cursor" = Option<String>, Query, description = "Last id of the previous page"),
        ("limit" = Option<i64>, Query, description = "Page size, at most 100")
    ),
    responses(
        (status = 200, description = "One page of collections", body = CollectionPage)
    )
)]
async fn list_collections_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<CollectionPage>> {
    let (cursor, limit) = parse_page(&query)?;
    let (items, next) = state
        .collections
        .list_mine(&user.user_id, cursor, limit)
        .await?;
    Ok(Json(CollectionPage {
        items: items.into_iter().map(Into::into).collect(),
        next_cursor: next.map(|id| id.to_string()),
    }))
}

/// Read one collection
#[utoipa::path(
    get,
    path = "/v1/collections/{id}",
    tag = "collections",
    params(("id" = Uuid, Path, description = "Collection id")),
    responses(
        (status = 200, description = "The collection", body = CollectionResponse),
        (status = 403, description = "Missing read permission", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn get_collection_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(collection_id): Path<Uuid>,
) -> ApiResult<Json<CollectionResponse>> {
    let collection = state.collections.get(&user.user_id, collection_id).await?;
    Ok(Json(collection.into()))
}

/// Re-chunk and re-embed the collection under a new configuration
#[utoipa::path(
    post,
    path = "/v1/collections/{id}/migrate",
    tag = "collections",
    params(("id" = Uuid, Path, description = "Collection id")),
    request_body = MigrateRequest,
    responses(
        (status = 200, description = "Migration finished", body = MigrateResponse),
        (status = 403, description = "Missing migrate permission", body = ErrorResponse),
        (status = 404, description = "Unknown collection or configuration", body = ErrorResponse)
    )
)]
async fn migrate_collection_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(collection_id): Path<Uuid>,
    Json(body): Json<MigrateRequest>,
) -> ApiResult<Json<MigrateResponse>> {
    let migrated = state
        .collections
        .migrate(&user.user_id, collection_id, body.new_configuration_id)
        .await?;
    Ok(Json(MigrateResponse { migrated }))
}

/// List permissions on a collection
#[utoipa::path(
    get,
    path = "/v1/collections/{id}/permissions",
    tag = "collections",
    params(("id" = Uuid, Path, description = "Collection id")),
    responses(
        (status = 200, description = "Permissions", body = [PermissionResponse]),
        (status = 403, description = "Missing admin permission", body = ErrorResponse)
    )
)]
async fn list_permissions_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(collection_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PermissionResponse>>> {
    let permissions = state.permissions.list(&user.user_id, collection_id).await?;
    Ok(Json(permissions.into_iter().map(Into::into).collect()))
}

/// Assign or update a permission
#[utoipa::path(
    post,
    path = "/v1/collections/{id}/permissions",
    tag = "collections",
    params(("id" = Uuid, Path, description = "Collection id")),
    request_body = AssignPermissionRequest,
    responses(
        (status = 201, description = "Permission assigned", body = PermissionResponse),
        (status = 403, description = "Missing admin permission", body = ErrorResponse),
        (status = 404, description = "Unknown role", body = ErrorResponse)
    )
)]
async fn assign_permission_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(collection_id): Path<Uuid>,
    Json(body): Json<AssignPermissionRequest>,
) -> ApiResult<(StatusCode, Json<PermissionResponse>)> {
    let permission = state
        .permissions
        .assign(
            &user.user_id,
            collection_id,
            &body.subject,
            &body.role,
            body.actions_override,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(permission.into())))
}

/// Revoke a subject's permission
#[utoipa::path(
    delete,
    path = "/v1/collections/{id}/permissions/{subject}",
    tag = "collections",
    params(
        ("id" = Uuid, Path, description = "Collection id"),
        ("subject" = String, Path, description = "Subject to revoke")
    ),
    responses(
        (status = 204, description = "Permission revoked"),
        (status = 403, description = "Missing admin permission", body = ErrorResponse),
        (status = 404, description = "No such permission", body = ErrorResponse)
    )
)]
async fn revoke_permission_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((collection_id, subject)): Path<(Uuid, String)>,
) -> ApiResult<StatusCode> {
    state
        .permissions
        .revoke(&user.user_id, collection_id, &subject)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Property keys, types and values available for filtering
#[utoipa::path(
    get,
    path = "/v1/collections/{id}/property-schema",
    tag = "collections",
    params(("id" = Uuid, Path, description = "Collection id")),
    responses(
        (status = 200, description = "Property schema", body = PropertySchemaResponse),
        (status = 403, description = "Missing read permission", body = ErrorResponse)
    )
)]
async fn property_schema_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(collection_id): Path<Uuid>,
) -> ApiResult<Json<PropertySchemaResponse>> {
    let schema = state.properties.schema(&user.user_id, collection_id).await?;
    Ok(Json(PropertySchemaResponse {
        properties: schema
            .into_iter()
            .map(|item| PropertySchemaEntry {
                label: crate::usecases::property_key_label(&item.key).to_string(),
                key: item.key,
                property_type: item.property_type,
                values: item.values,
            })
            .collect(),
    }))
}

/// Read one document within a collection the caller can read
#[utoipa::path(
    get,
    path = "/v1/documents/{id}",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Document id"),
        ("collection_id" = Uuid, Query, description = "Collection context")
    ),
    responses(
        (status = 200, description = "The document", body = DocumentResponse),
        (status = 403, description = "Missing read permission", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn get_document_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<Uuid>,
    Query(query): Query<GetDocumentQuery>,
) -> ApiResult<Json<DocumentResponse>> {
    let document = state
        .documents
        .get(&user.user_id, document_id, query.collection_id)
        .await?;
    Ok(Json(document.into()))
}

/// Ingest documents: JSON body for one document, multipart for files
async fn ingest_documents_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    request: Request,
) -> ApiResult<Response> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &()).await.map_err(|e| {
            ApiError::from(RagError::Validation(format!("invalid multipart: {}", e)))
        })?;
        let upload = read_upload(multipart).await?;

        let mut documents = Vec::new();
        let mut errors = Vec::new();
        for (data, filename) in upload.files {
            match ingest_one_file(&state, &user.user_id, upload.collection_id, &data, &filename)
                .await
            {
                Ok(document) => documents.push(DocumentResponse::from(document)),
                Err(err @ RagError::PermissionDenied { .. }) => return Err(err.into()),
                Err(err) => errors.push(FileError {
                    filename,
                    error: err.to_string(),
                }),
            }
        }
        Ok((
            StatusCode::CREATED,
            Json(BatchIngestResponse { documents, errors }),
        )
            .into_response())
    } else {
        let Json(body): Json<IngestRequest> =
            Json::from_request(request, &()).await.map_err(|e| {
                ApiError::from(RagError::Validation(format!("invalid request body: {}", e)))
            })?;
        let properties = convert_properties(body.properties.unwrap_or_default())?;
        let document = state
            .documents
            .load(
                &user.user_id,
                IngestDocument {
                    collection_id: body.collection_id,
                    content: body.content,
                    properties,
                    source_hash: None,
                },
            )
            .await?;
        Ok((StatusCode::CREATED, Json(DocumentResponse::from(document))).into_response())
    }
}

/// Multipart ingest with SSE progress: one `progress` event per file, a fatal
/// `error` event on authorization failure, `done` with the batch outcome.
async fn stream_documents_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> ApiResult<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let upload = read_upload(multipart).await?;

    let (tx, rx) = tokio::sync::mpsc::channel::<Event>(16);
    let subject = user.user_id;
    tokio::spawn(async move {
        let total = upload.files.len();
        let mut documents = Vec::new();
        let mut errors = Vec::new();

        for (index, (data, filename)) in upload.files.into_iter().enumerate() {
            let current = index + 1;
            let _ = tx
                .send(sse_event(
                    "progress",
                    serde_json::json!({
                        "total": total,
                        "current": current,
                        "filename": filename,
                        "status": "processing",
                    }),
                ))
                .await;

            match ingest_one_file(&state, &subject, upload.collection_id, &data, &filename).await {
                Ok(document) => {
                    documents.push(DocumentResponse::from(document));
                    let _ = tx
                        .send(sse_event(
                            "progress",
                            serde_json::json!({
                                "total": total,
                                "current": current,
                                "filename": filename,
                                "status": "ok",
                            }),
                        ))
                        .await;
                }
                Err(RagError::PermissionDenied { .. }) => {
                    let _ = tx
                        .send(sse_event(
                            "error",
                            serde_json::json!({
                                "message": "Permission denied",
                                "filename": filename,
                            }),
                        ))
                        .await;
                    return;
                }
                Err(err) => {
                    let message = err.to_string();
                    errors.push(FileError {
                        filename: filename.clone(),
                        error: message.clone(),
                    });
                    let _ = tx
                        .send(sse_event(
                            "progress",
                            serde_json::json!({
                                "total": total,
                                "current": current,
                                "filename": filename,
                                "status": "error",
                                "error": message,
                            }),
                        ))
                        .await;
                }
            }
        }

        let done = serde_json::json!({
            "documents": documents,
            "errors": errors,
        });
        let _ = tx.send(sse_event("done", done)).await;
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Hybrid search over a collection
#[utoipa::path(
    post,
    path = "/v1/collections/{id}/search",
    tag = "search",
    params(("id" = Uuid, Path, description = "Collection id")),
    request_body = SearchRequestBody,
    responses(
        (status = 200, description = "Ranked results", body = SearchResponse),
        (status = 403, description = "Missing read permission", body = ErrorResponse),
        (status = 502, description = "Embedding endpoint failed", body = ErrorResponse)
    )
)]
async fn search_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(collection_id): Path<Uuid>,
    Json(body): Json<SearchRequestBody>,
) -> ApiResult<Json<SearchResponse>> {
    let filters = body
        .filters
        .as_ref()
        .map(|map| SearchFilter::parse_map(map))
        .unwrap_or_default();

    let request = SearchRequest {
        collection_id,
        query: body.query,
        vector_weight: body.vector_weight.unwrap_or(crate::usecases::DEFAULT_VECTOR_WEIGHT),
        fts_weight: body.fts_weight.unwrap_or(crate::usecases::DEFAULT_FTS_WEIGHT),
        limit: body
            .limit
            .unwrap_or(crate::usecases::DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_PAGE_SIZE),
        filters,
    };
    let hits = state.search.execute(&user.user_id, request).await?;
    Ok(Json(SearchResponse {
        results: hits.into_iter().map(Into::into).collect(),
    }))
}

// ============= Helpers =============

struct Upload {
    collection_id: Uuid,
    files: Vec<(Vec<u8>, String)>,
}

/// Drain a multipart body into the collection id and its files
async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    let mut collection_id: Option<String> = None;
    let mut files: Vec<(Vec<u8>, String)> = Vec::new();
    let mut file_index = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::from(RagError::Validation(format!("invalid multipart: {}", e)))
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "collection_id" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::from(RagError::Validation(format!("invalid multipart: {}", e)))
                })?;
                collection_id = Some(text.trim().to_string());
            }
            "files" | "files[]" => {
                let filename = field
                    .file_name()
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty());
                let data = field.bytes().await.map_err(|e| {
                    ApiError::from(RagError::Validation(format!("invalid multipart: {}", e)))
                })?;
                if data.is_empty() {
                    continue;
                }
                file_index += 1;
                let filename = filename.unwrap_or_else(|| format!("file_{}", file_index));
                files.push((data.to_vec(), filename));
            }
            _ => {}
        }
    }

    let collection_id = collection_id
        .ok_or_else(|| ApiError::from(RagError::Validation("collection_id required".to_string())))?;
    let collection_id = Uuid::parse_str(&collection_id)
        .map_err(|_| ApiError::from(RagError::Validation("invalid collection_id".to_string())))?;
    if files.is_empty() {
        return Err(ApiError::from(RagError::Validation(
            "at least one file required".to_string(),
        )));
    }

    Ok(Upload {
        collection_id,
        files,
    })
}

async fn ingest_one_file(
    state: &AppState,
    subject: &str,
    collection_id: Uuid,
    data: &[u8],
    filename: &str,
) -> Result<Document> {
    let parsed = parse_file(data, filename)?;
    state
        .documents
        .load(
            subject,
            IngestDocument {
                collection_id,
                content: if parsed.text.is_empty() {
                    " ".to_string()
                } else {
                    parsed.text
                },
                properties: parsed.properties,
                source_hash: None,
            },
        )
        .await
}

fn convert_properties(
    properties: HashMap<String, PropertyValueBody>,
) -> ApiResult<Vec<IngestProperty>> {
    let mut converted = Vec::with_capacity(properties.len());
    for (key, body) in properties {
        let value = crate::domain::stringify_scalar(&body.value).ok_or_else(|| {
            ApiError::from(RagError::Validation(format!(
                "property '{}' must be a scalar value",
                key
            )))
        })?;
        let property_type = PropertyType::from_str(&body.property_type).map_err(ApiError::from)?;
        converted.push(IngestProperty {
            key,
            value,
            property_type,
        });
    }
    Ok(converted)
}

fn parse_page(query: &PageQuery) -> ApiResult<(Option<Uuid>, i64)> {
    let cursor = match &query.cursor {
        Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
            ApiError::from(RagError::Validation("invalid cursor".to_string()))
        })?),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    Ok((cursor, limit))
}

fn sse_event(name: &str, data: serde_json::Value) -> Event {
    match Event::default().event(name).json_data(&data) {
        Ok(event) => event,
        Err(_) => Event::default().event(name).data("{}"),
    }
}

/// Start the API server
pub async fn start_server(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    info!("starting API server on {}", addr);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RagError::Unavailable(format!("failed to bind to {}: {}", addr, e)))?;

    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| RagError::Internal(anyhow::anyhow!("server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0x00, 0xff, 0x10]), "00ff10");
    }

    #[test]
    fn test_round6() {
        assert_eq!(round6(0.123_456_789), 0.123_457);
        assert_eq!(round6(1.0), 1.0);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (RagError::not_found("Document", "x"), StatusCode::NOT_FOUND),
            (RagError::permission_denied("write"), StatusCode::FORBIDDEN),
            (RagError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (RagError::DuplicateDocument, StatusCode::CONFLICT),
            (RagError::Upstream("embed".into()), StatusCode::BAD_GATEWAY),
            (
                RagError::Unavailable("pool".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_unauthorized_maps_to_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_search_request_body_defaults() {
        let body: SearchRequestBody = serde_json::from_str("{}").unwrap();
        assert_eq!(body.query, "");
        assert!(body.vector_weight.is_none());
        assert!(body.filters.is_none());
    }

    #[test]
    fn test_ingest_request_parses_properties() {
        let body: IngestRequest = serde_json::from_value(serde_json::json!({
            "collection_id": "7b9c1d2e-0000-4000-8000-000000000000",
            "content": "text",
            "properties": {"status": {"value": "open", "type": "string"}}
        }))
        .unwrap();
        let properties = convert_properties(body.properties.unwrap()).unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].key, "status");
        assert_eq!(properties[0].property_type, PropertyType::String);
    }

    #[test]
    fn test_convert_properties_rejects_non_scalars() {
        let mut map = HashMap::new();
        map.insert(
            "nested".to_string(),
            PropertyValueBody {
                value: serde_json::json!({"a": 1}),
                property_type: "string".to_string(),
            },
        );
        assert!(convert_properties(map).is_err());
    }

    #[test]
    fn test_parse_page_clamps_limit() {
        let query = PageQuery {
            cursor: None,
            limit: Some(100_000),
        };
        let (_, limit) = parse_page(&query).unwrap();
        assert_eq!(limit, MAX_PAGE_SIZE);

        let query = PageQuery {
            cursor: Some("not-a-uuid".to_string()),
            limit: None,
        };
        assert!(parse_page(&query).is_err());
    }
}
