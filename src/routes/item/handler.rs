use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::{AppJson, AppPath, AppQuery},
};

use super::model::{Item, ItemPatch, ItemRequest, ListItemsQuery, MessageResponse};

fn item_not_found() -> AppError {
    AppError::NotFound("Item not found".into())
}

#[axum::debug_handler]
pub async fn create_item(
    State(state): State<AppState>,
    AppJson(req): AppJson<ItemRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    let item = Item::create(&state.pool, &req).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[axum::debug_handler]
pub async fn list_items(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListItemsQuery>,
) -> AppResult<Json<Vec<Item>>> {
    let (column, direction, skip, limit) = query.resolve()?;
    let items = Item::list(&state.pool, column, direction, skip, limit).await?;
    Ok(Json(items))
}

#[axum::debug_handler]
pub async fn read_item(
    State(state): State<AppState>,
    AppPath(item_id): AppPath<i64>,
) -> AppResult<Json<Item>> {
    Item::find_by_id(&state.pool, item_id)
        .await?
        .map(Json)
        .ok_or_else(item_not_found)
}

#[axum::debug_handler]
pub async fn update_item(
    State(state): State<AppState>,
    AppPath(item_id): AppPath<i64>,
    AppJson(req): AppJson<ItemRequest>,
) -> AppResult<Json<Item>> {
    req.validate()?;
    Item::update(&state.pool, item_id, &req)
        .await?
        .map(Json)
        .ok_or_else(item_not_found)
}

#[axum::debug_handler]
pub async fn patch_item(
    State(state): State<AppState>,
    AppPath(item_id): AppPath<i64>,
    AppJson(patch): AppJson<ItemPatch>,
) -> AppResult<Json<Item>> {
    patch.validate()?;
    Item::patch(&state.pool, item_id, &patch)
        .await?
        .map(Json)
        .ok_or_else(item_not_found)
}

#[axum::debug_handler]
pub async fn delete_item(
    State(state): State<AppState>,
    AppPath(item_id): AppPath<i64>,
) -> AppResult<Json<MessageResponse>> {
    if !Item::delete(&state.pool, item_id).await? {
        return Err(item_not_found());
    }
    tracing::info!("Deleted item {}", item_id);
    Ok(Json(MessageResponse {
        message: "Item deleted successfully".into(),
    }))
}
