use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRequest {
    pub name: String,
    pub price: f64,
    pub quantity: i64,
}

/// 部分更新，只修改提供的字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListItemsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

const SORT_COLUMNS: [&str; 4] = ["id", "name", "price", "quantity"];
const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".into()));
    }
    Ok(())
}

fn validate_price(price: f64) -> AppResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation(
            "price must be a non-negative number".into(),
        ));
    }
    Ok(())
}

fn validate_quantity(quantity: i64) -> AppResult<()> {
    if quantity < 0 {
        return Err(AppError::Validation("quantity must not be negative".into()));
    }
    Ok(())
}

impl ItemRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_name(&self.name)?;
        validate_price(self.price)?;
        validate_quantity(self.quantity)
    }
}

impl ItemPatch {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        Ok(())
    }
}

impl ListItemsQuery {
    /// 校验排序参数并返回 (列名, 方向, offset, limit)
    pub fn resolve(&self) -> AppResult<(&'static str, &'static str, i64, i64)> {
        let sort_by = self.sort_by.as_deref().unwrap_or("id");
        let column = SORT_COLUMNS
            .iter()
            .copied()
            .find(|c| *c == sort_by)
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Invalid sort_by value. Choose from {:?}",
                    SORT_COLUMNS
                ))
            })?;

        let direction = match self.sort_order.as_deref().unwrap_or("asc") {
            "asc" => "ASC",
            "desc" => "DESC",
            _ => {
                return Err(AppError::BadRequest(
                    r#"Invalid sort_order value. Choose either "asc" or "desc"."#.into(),
                ));
            }
        };

        let skip = self.skip.unwrap_or(0).max(0);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Ok((column, direction, skip, limit))
    }
}

impl Item {
    pub async fn create(pool: &SqlitePool, req: &ItemRequest) -> Result<Self, sqlx::Error> {
        let item = sqlx::query_as::<_, Item>(
            r#"
            INSERT INTO items (name, price, quantity)
            VALUES (?, ?, ?)
            RETURNING id, name, price, quantity
            "#,
        )
        .bind(req.name.trim())
        .bind(req.price)
        .bind(req.quantity)
        .fetch_one(pool)
        .await?;

        tracing::debug!("Created item {}", item.id);
        Ok(item)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Item>("SELECT id, name, price, quantity FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        column: &'static str,
        direction: &'static str,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        // 列名和方向来自白名单，可以直接拼接
        let sql = format!(
            "SELECT id, name, price, quantity FROM items ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            column, direction
        );
        sqlx::query_as::<_, Item>(&sql)
            .bind(limit)
            .bind(skip)
            .fetch_all(pool)
            .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: i64,
        req: &ItemRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Item>(
            r#"
            UPDATE items
            SET name = ?, price = ?, quantity = ?
            WHERE id = ?
            RETURNING id, name, price, quantity
            "#,
        )
        .bind(req.name.trim())
        .bind(req.price)
        .bind(req.quantity)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn patch(
        pool: &SqlitePool,
        id: i64,
        patch: &ItemPatch,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Item>(
            r#"
            UPDATE items
            SET name = COALESCE(?, name),
                price = COALESCE(?, price),
                quantity = COALESCE(?, quantity)
            WHERE id = ?
            RETURNING id, name, price, quantity
            "#,
        )
        .bind(patch.name.as_deref().map(str::trim))
        .bind(patch.price)
        .bind(patch.quantity)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_defaults() {
        let (column, direction, skip, limit) = ListItemsQuery::default().resolve().unwrap();
        assert_eq!((column, direction, skip, limit), ("id", "ASC", 0, 10));
    }

    #[test]
    fn list_query_clamps_and_rejects() {
        let query = ListItemsQuery {
            skip: Some(-5),
            limit: Some(1000),
            sort_by: Some("price".into()),
            sort_order: Some("desc".into()),
        };
        assert_eq!(query.resolve().unwrap(), ("price", "DESC", 0, 100));

        let bad_column = ListItemsQuery {
            sort_by: Some("password".into()),
            ..Default::default()
        };
        assert!(matches!(bad_column.resolve(), Err(AppError::BadRequest(_))));

        let bad_order = ListItemsQuery {
            sort_order: Some("sideways".into()),
            ..Default::default()
        };
        assert!(matches!(bad_order.resolve(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn request_validation() {
        let ok = ItemRequest {
            name: "Widget".into(),
            price: 2.5,
            quantity: 3,
        };
        assert!(ok.validate().is_ok());

        let blank = ItemRequest {
            name: "   ".into(),
            ..ok.clone()
        };
        assert!(matches!(blank.validate(), Err(AppError::Validation(_))));

        let negative = ItemRequest {
            price: -1.0,
            ..ok.clone()
        };
        assert!(negative.validate().is_err());

        let patch = ItemPatch {
            quantity: Some(-1),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
        assert!(ItemPatch::default().validate().is_ok());
    }
}
