use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Json, Response},
};
use log::{debug, info};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::api::context::RequestContext;
use crate::api::render::{
    error_response, link, redirect, render_payload, with_content_type, ApiResult,
};
use crate::config::{AppConfig, Workspace};
use crate::error::{ResolveError, ResolveResult};
use crate::logic::{
    parse_operation, DependencyGraph, GraphBuilder, JsonSchemaValidator, ReasonerCommand,
    Registry, SchemaId, SchemaValidator,
};
use crate::model::{DescriptorFile, GraphListing, Href, Operation, OperationKind, Resolved};
use crate::store::{
    DescriptorStore, ProcessRunner, ReqwestFetcher, ScratchSpace, TokioProcessRunner,
    UpstreamFetcher,
};

/// Everything a request needs, built once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub workspace: Arc<Workspace>,
    pub validator: Arc<dyn SchemaValidator>,
    pub runner: Arc<dyn ProcessRunner>,
    pub fetcher: Arc<dyn UpstreamFetcher>,
    pub descriptors: DescriptorStore,
    pub scratch: ScratchSpace,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        workspace: Arc<Workspace>,
        validator: Arc<dyn SchemaValidator>,
        runner: Arc<dyn ProcessRunner>,
        fetcher: Arc<dyn UpstreamFetcher>,
    ) -> Self {
        Self {
            descriptors: DescriptorStore::new(workspace.clone()),
            scratch: ScratchSpace::new(workspace.clone()),
            config,
            workspace,
            validator,
            runner,
            fetcher,
        }
    }

    /// Production wiring: bundled schemas, tokio process runner, reqwest client.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let workspace = Arc::new(Workspace::open(&config.workspace)?);
        let validator = Arc::new(JsonSchemaValidator::new()?);
        let runner = TokioProcessRunner::new(Duration::from_secs(config.reasoner.timeout_secs))
            .with_working_dir(workspace.root());
        let fetcher = ReqwestFetcher::new(Duration::from_secs(config.upstream.timeout_secs))?;

        Ok(Self::new(
            config,
            workspace,
            validator,
            Arc::new(runner),
            Arc::new(fetcher),
        ))
    }

    fn registry(&self) -> Registry {
        Registry::new(self.workspace.clone())
    }
}

/// Run file-system bound work off the async executor.
async fn blocking<T, F>(task: F) -> ApiResult<T>
where
    F: FnOnce() -> ResolveResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| error_response(ResolveError::Internal(format!("blocking task failed: {e}"))))?
        .map_err(error_response)
}

/// Fresh graph over the current workspace; virtual references use the request's public URLs.
async fn build_graph(state: &SharedState, ctx: &RequestContext) -> ApiResult<DependencyGraph> {
    let builder = GraphBuilder::new(
        state.workspace.clone(),
        state.validator.clone(),
        Arc::new(ctx.public_paths(&state.workspace)),
    );
    blocking(move || builder.build()).await
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub workspace: String,
    pub timestamp: String,
}

pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        workspace: state.workspace.root().display().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Every operation in the workspace, expanded, with its dependency edges.
pub async fn list_operations(
    State(state): State<SharedState>,
    ctx: RequestContext,
) -> ApiResult<Json<GraphListing>> {
    let graph = build_graph(&state, &ctx).await?;
    Ok(Json(graph.listing()))
}

/// Serve an operation, a directory index or a plain file.
pub async fn get_resource(
    State(state): State<SharedState>,
    ctx: RequestContext,
    request: Request,
) -> ApiResult<Response> {
    let graph = build_graph(&state, &ctx).await?;
    if let Some(operation) = ctx.operation_id().and_then(|id| graph.get(&id).cloned()) {
        debug!("Serving {} operation {}", operation.tag(), ctx.local_href());
        return serve_operation(&state, &ctx, operation).await;
    }

    let local = ctx.local_path(&state.workspace).map_err(error_response)?;
    if local.is_dir() {
        let state = state.clone();
        let index = blocking(move || directory_index(&state, &ctx, &local)).await?;
        return Ok(Json(index).into_response());
    }
    if local.is_file() {
        return serve_file(&local, request).await;
    }

    Err(error_response(ResolveError::NotFound {
        href: ctx.local_href().to_string(),
        searched: state.workspace.root().to_path_buf(),
    }))
}

async fn serve_operation(
    state: &SharedState,
    ctx: &RequestContext,
    operation: Operation,
) -> ApiResult<Response> {
    let processor = &state.config.processor;
    let declared_type = operation.content_type;

    match operation.kind {
        OperationKind::Raw(value) => {
            let content_type = declared_type.unwrap_or_else(|| processor.raw_content_type.clone());
            Ok(render_payload(&content_type, &value))
        }
        OperationKind::Href(href) => {
            let content_type =
                declared_type.unwrap_or_else(|| processor.href_content_type.clone());
            match href {
                Href::Resolved(Resolved::File(path)) if path.is_file() => {
                    let body = tokio::fs::read(&path)
                        .await
                        .map_err(|e| error_response(ResolveError::io(&path, e)))?;
                    Ok(with_content_type(&content_type, body))
                }
                Href::Resolved(Resolved::File(path)) => Ok(redirect(
                    &ctx.resource_url(&state.workspace, &path),
                    &content_type,
                )),
                other => Ok(redirect(&other.to_string(), &content_type)),
            }
        }
        OperationKind::Inference(inference) => {
            let content_type =
                declared_type.unwrap_or_else(|| processor.sparql_query_content_type.clone());
            let inference = state
                .scratch
                .prepare(inference)
                .await
                .map_err(error_response)?;
            let command = ReasonerCommand::for_inference(&state.config.reasoner.program, &inference)
                .map_err(error_response)?;
            info!("Reasoning for {}: {}", ctx.local_href(), command);
            let output = state.runner.run(&command).await.map_err(error_response)?;
            Ok(with_content_type(&content_type, output))
        }
        OperationKind::Query(query) => {
            let content_type =
                declared_type.unwrap_or_else(|| processor.sparql_query_content_type.clone());
            let mut params = vec![("query".to_string(), query.raw)];
            if let Some(graph) = query.default_graph_uri {
                params.push(("default-graph-uri".to_string(), graph));
            }
            let body = state
                .fetcher
                .get(&query.endpoint, &params, "text/turtle")
                .await
                .map_err(error_response)?;
            Ok(with_content_type(&content_type, body))
        }
        OperationKind::Imports(_) => Err(error_response(ResolveError::Internal(format!(
            "{} was not expanded",
            ctx.local_href()
        )))),
    }
}

async fn serve_file(path: &Path, request: Request) -> ApiResult<Response> {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(never) => match never {},
    }
}

/// Descriptor of `dir` enriched with links to sub-directories, files and operations.
fn directory_index(state: &AppState, ctx: &RequestContext, dir: &Path) -> ResolveResult<Value> {
    let workspace = &state.workspace;
    let processor = &state.config.processor;
    let current = ctx.current_path();

    let descriptor = workspace.descriptor_path(dir);
    let file = if descriptor.is_file() {
        DescriptorFile::read(&descriptor)?
    } else {
        DescriptorFile::default()
    };

    let mut result = Map::new();
    if let Some(kind) = &file.kind {
        result.insert("@type".to_string(), Value::String(kind.clone()));
    }
    result.extend(file.extra.clone());
    result.insert("@id".to_string(), Value::String(current.clone()));

    let (directories, files) = list_dir(dir)?;

    if processor.show_directories {
        for directory in &directories {
            let name = file_name(directory);
            let kind = DescriptorFile::read(&workspace.descriptor_path(directory))
                .ok()
                .and_then(|index| index.kind)
                .unwrap_or_else(|| "this:Resource".to_string());
            result.insert(
                format!("this:{name}"),
                link(&format!("{current}/{name}"), &kind),
            );
        }
    }

    if processor.show_files {
        let public: Vec<Value> = files
            .iter()
            .filter(|path| !workspace.is_descriptor(path))
            .map(|path| link(&ctx.resource_url(workspace, path), "Resource"))
            .collect();
        if !public.is_empty() {
            result.insert("this:files".to_string(), Value::Array(public));
        }
    }

    if file.meta.is_some() {
        let operations: Vec<Value> = file
            .entries()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?;
                let mut op_link = link(&format!("{current}/{name}"), "Operation");
                if let Some(description) = entry.get("description") {
                    op_link["description"] = description.clone();
                }
                Some(op_link)
            })
            .collect();
        result.insert("this:operation".to_string(), Value::Array(operations));
    }

    Ok(Value::Object(result))
}

/// Visible sub-directories and files of `dir`, each sorted by name.
fn list_dir(dir: &Path) -> ResolveResult<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut directories = Vec::new();
    let mut files = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| ResolveError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ResolveError::io(dir, e))?;
        let path = entry.path();
        if file_name(&path).starts_with('.') {
            continue;
        }
        if path.is_dir() {
            directories.push(path);
        } else if path.is_file() {
            files.push(path);
        }
    }
    directories.sort();
    files.sort();
    Ok((directories, files))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Split an operation path into its directory and name.
fn split_operation(local: &Path) -> ResolveResult<(PathBuf, String)> {
    match (local.parent(), local.file_name()) {
        (Some(dir), Some(name)) => Ok((dir.to_path_buf(), name.to_string_lossy().into_owned())),
        _ => Err(ResolveError::BadRequest {
            path: local.to_path_buf(),
            reason: "does not name an operation".to_string(),
        }),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false)
}

/// Create or update: an operation when the path names a declared operation
/// (or a JSON body targets a directory with a descriptor file), a file otherwise.
pub async fn put_resource(
    State(state): State<SharedState>,
    ctx: RequestContext,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let local = ctx.local_path(&state.workspace).map_err(error_response)?;

    let registry = state.registry();
    let workspace = state.workspace.clone();
    let probe = local.clone();
    let json_body = is_json(&headers);
    let manages_operation = blocking(move || {
        if registry.is_declared(&probe)? {
            return Ok(true);
        }
        let has_descriptor = probe
            .parent()
            .map(|dir| workspace.descriptor_path(dir).is_file())
            .unwrap_or(false);
        Ok(json_body && has_descriptor && !probe.exists())
    })
    .await?;

    if manages_operation {
        upsert_operation(&state, &ctx, &local, &body).await?;
    } else {
        state
            .descriptors
            .write_resource(&local, &body)
            .await
            .map_err(error_response)?;
    }

    Ok(Json(json!({ "@id": ctx.current_path() })))
}

async fn upsert_operation(
    state: &SharedState,
    ctx: &RequestContext,
    local: &Path,
    body: &[u8],
) -> ApiResult<()> {
    let bad_request = |reason: String| {
        error_response(ResolveError::BadRequest {
            path: local.to_path_buf(),
            reason,
        })
    };

    let mut document: Value = serde_json::from_slice(body)
        .map_err(|e| bad_request(format!("body is not JSON: {e}")))?;
    state
        .validator
        .validate(SchemaId::CrudOperation, &document)
        .map_err(|errors| {
            error_response(ResolveError::BadDescriptor {
                message: "operation body does not match the operation schema".to_string(),
                errors,
            })
        })?;

    let target_id = document["imports"]["@id"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let target = ctx
        .to_local_path(&state.workspace, &target_id)
        .ok_or_else(|| bad_request(format!("cannot find operation at: {target_id}")))?;
    let registry = state.registry();
    let probe = target.clone();
    if !blocking(move || registry.is_declared(&probe)).await? {
        return Err(bad_request(format!("cannot find operation at: {target_id}")));
    }

    let href = state.workspace.relative(&target).unwrap_or_default();
    if let Some(imports) = document["imports"].as_object_mut() {
        imports.remove("@id");
        imports.insert("href".to_string(), Value::String(href));
    }

    let (dir, name) = split_operation(local).map_err(error_response)?;
    if let Some(object) = document.as_object_mut() {
        object.insert("name".to_string(), Value::String(name.clone()));
    }
    parse_operation(state.validator.as_ref(), &document).map_err(error_response)?;

    state
        .descriptors
        .upsert_operation(&dir, &name, document)
        .await
        .map_err(error_response)
}

/// Delete a declared operation from its descriptor file, or a file or directory.
pub async fn delete_resource(
    State(state): State<SharedState>,
    ctx: RequestContext,
) -> ApiResult<Json<Value>> {
    let local = ctx.local_path(&state.workspace).map_err(error_response)?;
    let registry = state.registry();
    let probe = local.clone();
    let declared = blocking(move || registry.is_declared(&probe)).await?;

    let deleted = if declared {
        let (dir, name) = split_operation(&local).map_err(error_response)?;
        state.descriptors.remove_operation(&dir, &name).await
    } else {
        state.descriptors.delete_resource(&local).await
    }
    .map_err(error_response)?;

    if !deleted {
        return Err(error_response(ResolveError::NotFound {
            href: ctx.local_href().to_string(),
            searched: state.workspace.root().to_path_buf(),
        }));
    }

    Ok(Json(json!({ "deleted": { "@id": ctx.current_path() } })))
}
