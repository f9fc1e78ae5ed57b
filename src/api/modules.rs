//! Handlers for the `/v1/modules/` protocol.
//!
//! Routes:
//! - `GET  /v1/modules/` and `/v1/modules/{namespace}` - paginated listing
//! - `GET  /v1/modules/{namespace}/{name}` - latest version per provider
//! - `GET  /v1/modules/{namespace}/{name}/{provider}` - latest version
//! - `GET  /v1/modules/{namespace}/{name}/{provider}/versions` - all versions
//! - `GET  /v1/modules/{namespace}/{name}/{provider}/download` - 302 to the latest download pointer
//! - `GET  /v1/modules/{namespace}/{name}/{provider}/{version}` - exact version
//! - `POST /v1/modules/{namespace}/{name}/{provider}/{version}` - publish
//! - `GET  /v1/modules/{namespace}/{name}/{provider}/{version}/download` - 204 download pointer
//! - `GET  /v1/modules/{namespace}/{name}/{provider}/{version}/data.tgz` - artifact bytes

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{StreamExt, TryStreamExt};
use log::debug;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Deserialize;

use super::AppState;
use super::error::ApiError;
use super::types::{ModuleVersions, ModuleView, PaginatedList, PaginationMeta, VersionsList};
use crate::module::{Module, ModuleFilter};
use crate::scope::RequestScope;

pub const BASE_PATH: &str = "/v1/modules/";
pub const DOWNLOAD_HEADER: &str = "x-terraform-get";
const DEFAULT_LIMIT: usize = 10;

/// Bytes escaped inside one path segment of a generated link.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/modules", get(list_all))
        .route("/v1/modules/", get(list_all))
        .route("/v1/modules/{namespace}", get(list_namespace))
        .route("/v1/modules/{namespace}/{name}", get(latest_per_provider))
        .route("/v1/modules/{namespace}/{name}/{provider}", get(latest))
        .route(
            "/v1/modules/{namespace}/{name}/{provider}/versions",
            get(list_versions),
        )
        .route(
            "/v1/modules/{namespace}/{name}/{provider}/download",
            get(latest_download),
        )
        .route(
            "/v1/modules/{namespace}/{name}/{provider}/{version}",
            get(get_module).post(publish),
        )
        .route(
            "/v1/modules/{namespace}/{name}/{provider}/{version}/download",
            get(download),
        )
        .route(
            "/v1/modules/{namespace}/{name}/{provider}/{version}/data.tgz",
            get(data),
        )
}

fn segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// `/v1/modules/{namespace}/{name}/{provider}/{version}` with every segment
/// escaped, so the router decodes it back to the same coordinate.
fn version_path(module: &Module) -> String {
    format!(
        "{}{}/{}/{}/{}",
        BASE_PATH,
        segment(&module.namespace),
        segment(&module.name),
        segment(&module.provider),
        segment(&module.version)
    )
}

/// Path of the download pointer for one version.
pub fn download_path(module: &Module) -> String {
    format!("{}/download", version_path(module))
}

/// Path the download pointer refers to.
pub fn data_path(module: &Module) -> String {
    format!("{}/data.tgz", version_path(module))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    offset: Option<usize>,
    limit: Option<usize>,
    provider: Option<String>,
    verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NamePath {
    namespace: String,
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProviderPath {
    namespace: String,
    name: String,
    provider: String,
}

impl ProviderPath {
    fn filter(&self) -> ModuleFilter {
        ModuleFilter::versions_of(&self.namespace, &self.name, &self.provider)
    }
}

#[derive(Debug, Deserialize)]
pub struct VersionPath {
    namespace: String,
    name: String,
    provider: String,
    version: String,
}

impl From<VersionPath> for Module {
    fn from(path: VersionPath) -> Self {
        Module::new(path.namespace, path.name, path.provider, path.version)
    }
}

async fn list_all(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    list(&state, None, params).await
}

async fn list_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    list(&state, Some(namespace), params).await
}

async fn list(
    state: &AppState,
    namespace: Option<String>,
    params: ListParams,
) -> Result<Response, ApiError> {
    if params.verified.is_some() {
        debug!("Ignoring verified filter, modules are never verified");
    }

    let path = match &namespace {
        Some(namespace) => format!("{}{}", BASE_PATH, segment(namespace)),
        None => BASE_PATH.to_string(),
    };
    let mut filter = ModuleFilter::all();
    if let Some(namespace) = namespace {
        filter = filter.namespace(namespace);
    }
    if let Some(provider) = &params.provider {
        filter = filter.provider(provider);
    }
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    let page = state
        .service()
        .query(&state.scope(), &filter, offset, limit)
        .await?;
    if page.is_empty() {
        return Err(ApiError::not_found());
    }

    let meta = PaginationMeta::new(&path, params.provider.as_deref(), offset, limit, page.total);
    Ok(Json(PaginatedList::new(meta, page.modules)).into_response())
}

async fn list_versions(
    State(state): State<AppState>,
    Path(path): Path<ProviderPath>,
) -> Result<Response, ApiError> {
    let versions = state
        .service()
        .query_versions(&state.scope(), &path.filter())
        .await?;
    if versions.is_empty() {
        return Err(ApiError::not_found());
    }

    let body = VersionsList {
        modules: vec![ModuleVersions {
            source: format!("{}/{}/{}", path.namespace, path.name, path.provider),
            versions: versions.into_iter().map(ModuleView::from).collect(),
        }],
    };
    Ok(Json(body).into_response())
}

async fn latest_per_provider(
    State(state): State<AppState>,
    Path(path): Path<NamePath>,
) -> Result<Response, ApiError> {
    let filter = ModuleFilter::all()
        .namespace(path.namespace)
        .name(path.name);
    let latest = state
        .service()
        .latest_per_provider(&state.scope(), &filter)
        .await?;
    if latest.is_empty() {
        return Err(ApiError::not_found());
    }

    let meta = PaginationMeta::whole(latest.len());
    Ok(Json(PaginatedList::new(meta, latest)).into_response())
}

async fn latest(
    State(state): State<AppState>,
    Path(path): Path<ProviderPath>,
) -> Result<Response, ApiError> {
    let latest = state
        .service()
        .latest(&state.scope(), &path.filter())
        .await?
        .ok_or_else(ApiError::not_found)?;
    Ok(Json(ModuleView::from(latest)).into_response())
}

async fn latest_download(
    State(state): State<AppState>,
    Path(path): Path<ProviderPath>,
) -> Result<Response, ApiError> {
    let latest = state
        .service()
        .latest(&state.scope(), &path.filter())
        .await?
        .ok_or_else(ApiError::not_found)?;
    Ok((StatusCode::FOUND, [(header::LOCATION, download_path(&latest))]).into_response())
}

async fn get_module(
    State(state): State<AppState>,
    Path(path): Path<VersionPath>,
) -> Result<Response, ApiError> {
    let module = state
        .service()
        .get(&state.scope(), &Module::from(path))
        .await?
        .ok_or_else(ApiError::not_found)?;
    Ok(Json(ModuleView::from(module)).into_response())
}

async fn download(
    State(state): State<AppState>,
    Path(path): Path<VersionPath>,
) -> Result<Response, ApiError> {
    download_pointer(&state, &state.scope(), &Module::from(path)).await
}

async fn download_pointer(
    state: &AppState,
    scope: &RequestScope,
    module: &Module,
) -> Result<Response, ApiError> {
    if !state.service().exists(scope, module).await? {
        return Err(ApiError::not_found());
    }
    Ok((StatusCode::NO_CONTENT, [(DOWNLOAD_HEADER, data_path(module))]).into_response())
}

async fn publish(
    State(state): State<AppState>,
    Path(path): Path<VersionPath>,
    body: Body,
) -> Result<Response, ApiError> {
    let module = Module::from(path);
    let data = body
        .into_data_stream()
        .map_err(std::io::Error::other)
        .boxed();

    let scope = state.scope();
    state.service().publish(&scope, &module, data).await?;
    download_pointer(&state, &scope, &module).await
}

async fn data(
    State(state): State<AppState>,
    Path(path): Path<VersionPath>,
) -> Result<Response, ApiError> {
    let stream = state
        .service()
        .get_data(&state.scope(), &Module::from(path))
        .await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(stream),
    )
        .into_response())
}
