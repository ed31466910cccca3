use std::path::Path;

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
};

use crate::{
    AppState,
    error::{AppError, AppResult},
};

use super::model::{MultiUploadResponse, UploadResponse, sanitize_filename};

/// 把一个文件字段写入上传目录，返回实际保存的文件名
async fn save_field(dir: &Path, field: Field<'_>) -> AppResult<String> {
    let filename = field
        .file_name()
        .and_then(sanitize_filename)
        .ok_or_else(|| AppError::BadRequest("Invalid file name".into()))?;
    let bytes = field.bytes().await?;

    tokio::fs::write(dir.join(&filename), &bytes).await?;
    tracing::info!("Saved upload {} ({} bytes)", filename, bytes.len());
    Ok(filename)
}

/// 读取所有名为 `name` 的文件字段并保存，其余字段忽略
async fn save_fields(state: &AppState, mut multipart: Multipart, name: &str) -> AppResult<Vec<String>> {
    let dir = Path::new(&state.config.upload_dir);
    tokio::fs::create_dir_all(dir).await?;

    let mut saved = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(name) {
            saved.push(save_field(dir, field).await?);
        }
    }

    if saved.is_empty() {
        return Err(AppError::Validation(format!("{} is required", name)));
    }
    Ok(saved)
}

#[axum::debug_handler]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UploadResponse>> {
    let mut saved = save_fields(&state, multipart?, "file").await?;
    // 单文件接口只取第一个
    let filename = saved.swap_remove(0);

    Ok(Json(UploadResponse {
        message: "File saved".into(),
        filename,
    }))
}

#[axum::debug_handler]
pub async fn upload_multiple(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<MultiUploadResponse>> {
    let files = save_fields(&state, multipart?, "files").await?;

    Ok(Json(MultiUploadResponse {
        message: "Files saved".into(),
        files,
    }))
}
