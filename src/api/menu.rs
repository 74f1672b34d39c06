//! Menu administration and rating endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{bounded, parse_id, require, success, ApiResult};
use crate::errors::AppError;
use crate::menu::{build_menu_tree, CacheLookup};
use crate::models::{
    Content, ContentRequest, CreateMenuNodeRequest, FullMenuNode, MenuNode, PageParams,
    RateRequest, Rating, RatingSummary, UpdateMenuNodeRequest,
};
use crate::search::SearchHit;
use crate::store::TreeStore;
use crate::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/menu - The whole menu as one nested tree.
pub async fn get_full_menu(State(state): State<AppState>) -> ApiResult<FullMenuNode> {
    let generation = match state.tree_cache.get().await {
        CacheLookup::Hit(tree) => return success(tree),
        CacheLookup::Miss(generation) => generation,
    };

    let nodes = bounded(&state, "menu listing", state.repo.list_all()).await?;
    let tree = build_menu_tree(nodes);
    tracing::debug!("Menu tree rebuilt with {} nodes", tree.len());
    state.tree_cache.put(generation, tree.clone()).await;
    success(tree)
}

/// GET /api/menu/root
pub async fn get_root(State(state): State<AppState>) -> ApiResult<MenuNode> {
    match bounded(&state, "root lookup", state.repo.get_root()).await? {
        Some(node) => success(node),
        None => Err(AppError::NotFound("Menu has no root".to_string())),
    }
}

/// GET /api/menu/search-by-name?name= - Exact name lookup.
pub async fn search_by_name(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> ApiResult<MenuNode> {
    match bounded(&state, "node lookup", state.repo.get_node_by_name(&query.name)).await? {
        Some(node) => success(node),
        None => Err(AppError::NotFound(format!("Menu {:?} not found", query.name))),
    }
}

/// GET /api/menu/search?q=&limit= - Full-text search over names and texts.
pub async fn search_menu(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<SearchHit>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(MAX_SEARCH_LIMIT);
    success(state.search.search(&query.q, limit)?)
}

/// GET /api/menu/{id}
pub async fn get_node(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<MenuNode> {
    let id = parse_id(&id, "menu")?;
    match bounded(&state, "node lookup", state.repo.get_node(id)).await? {
        Some(node) => success(node),
        None => Err(AppError::NotFound(format!("Menu {} not found", id))),
    }
}

/// POST /api/menu
pub async fn create_node(
    State(state): State<AppState>,
    Json(request): Json<CreateMenuNodeRequest>,
) -> ApiResult<MenuNode> {
    require(&request.name, "name")?;

    let node = bounded(&state, "node create", state.repo.create_node(&request)).await?;
    after_node_change(&state, &node).await;
    tracing::info!("Created menu {} ({})", node.name, node.id);
    success(node)
}

/// PUT /api/menu/{id}
pub async fn update_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateMenuNodeRequest>,
) -> ApiResult<MenuNode> {
    let id = parse_id(&id, "menu")?;
    if let Some(name) = &request.name {
        require(name, "name")?;
    }

    let node = bounded(&state, "node update", state.repo.update_node(id, &request)).await?;
    after_node_change(&state, &node).await;
    success(node)
}

/// DELETE /api/menu/{id} - Leaves only; a node with children is a conflict.
pub async fn delete_node(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let id = parse_id(&id, "menu")?;
    bounded(&state, "node delete", state.repo.delete_node(id)).await?;

    state.tree_cache.invalidate().await;
    if let Err(e) = state.search.remove(id).await {
        tracing::warn!("Failed to remove menu {} from index: {}", id, e);
    }
    tracing::info!("Deleted menu {}", id);
    success(())
}

/// POST /api/menu/{id}/content
pub async fn add_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ContentRequest>,
) -> ApiResult<Content> {
    let id = parse_id(&id, "menu")?;
    request.validate()?;

    let content = bounded(&state, "content create", state.repo.add_content(id, &request)).await?;
    state.tree_cache.invalidate().await;
    success(content)
}

/// PUT /api/menu/{id}/content/{content_id}
pub async fn update_content(
    State(state): State<AppState>,
    Path((id, content_id)): Path<(String, String)>,
    Json(request): Json<ContentRequest>,
) -> ApiResult<Content> {
    let id = parse_id(&id, "menu")?;
    let content_id = parse_id(&content_id, "content")?;
    request.validate()?;

    let content = bounded(
        &state,
        "content update",
        state.repo.update_content(id, content_id, &request),
    )
    .await?;
    state.tree_cache.invalidate().await;
    success(content)
}

/// DELETE /api/menu/{id}/content/{content_id}
pub async fn delete_content(
    State(state): State<AppState>,
    Path((id, content_id)): Path<(String, String)>,
) -> ApiResult<()> {
    let id = parse_id(&id, "menu")?;
    let content_id = parse_id(&content_id, "content")?;

    bounded(
        &state,
        "content delete",
        state.repo.delete_content(id, content_id),
    )
    .await?;
    state.tree_cache.invalidate().await;
    success(())
}

/// GET /api/menu/{id}/rate - Vote counts.
pub async fn get_rating_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RatingSummary> {
    let id = parse_id(&id, "menu")?;
    success(bounded(&state, "rating summary", state.recorder.summarize_ratings(id)).await?)
}

/// POST /api/menu/{id}/rate - Create or overwrite a vote.
pub async fn rate_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RateRequest>,
) -> ApiResult<Rating> {
    let id = parse_id(&id, "menu")?;
    require(&request.user_id, "userId")?;
    success(
        bounded(
            &state,
            "rating write",
            state
                .recorder
                .record_rating(&request.user_id, id, request.is_useful),
        )
        .await?,
    )
}

/// GET /api/menu/{id}/rates-all - Every vote, paginated.
pub async fn list_ratings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Vec<Rating>> {
    let id = parse_id(&id, "menu")?;
    let page = params.page()?;
    success(bounded(&state, "rating listing", state.repo.list_ratings(id, page)).await?)
}

async fn after_node_change(state: &AppState, node: &MenuNode) {
    state.tree_cache.invalidate().await;
    if let Err(e) = state.search.upsert(node).await {
        tracing::warn!("Failed to index menu {}: {}", node.id, e);
    }
}
