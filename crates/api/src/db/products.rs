//! Product repository for database operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use orchard_core::ProductId;

use super::RepositoryError;
use crate::models::Product;

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    description: Option<String>,
    price: Decimal,
    stock: i32,
    category: String,
    image_urls: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Self {
            id: ProductId::new(r.id),
            name: r.name,
            description: r.description,
            price: r.price,
            stock: r.stock,
            category: r.category,
            image_urls: r.image_urls,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, stock, category, image_urls,
                   created_at, updated_at
            FROM products
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    /// List products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, stock, category, image_urls,
                   created_at, updated_at
            FROM products
            ORDER BY created_at DESC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        price: Decimal,
        stock: i32,
        category: &str,
        image_urls: &[String],
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO products (name, description, price, stock, category, image_urls)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, description, price, stock, category, image_urls,
                      created_at, updated_at
            ",
        )
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(stock)
        .bind(category)
        .bind(image_urls)
        .fetch_one(self.pool)
        .await?;

        Ok(Product::from(row))
    }

    /// Atomically decrement stock, but only if enough units remain.
    ///
    /// Returns `true` if the decrement was applied, `false` if it would
    /// have driven stock negative (the row is left untouched). This is the
    /// oversell guard for the materializer: the check and the write are a
    /// single statement, so concurrent orders cannot both take the last
    /// unit.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn decrement_stock(
        &self,
        id: ProductId,
        quantity: i32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE products
            SET stock = stock - $1, updated_at = NOW()
            WHERE id = $2 AND stock >= $1
            ",
        )
        .bind(quantity)
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Update a product's stock to an absolute value (admin restock).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn set_stock(&self, id: ProductId, stock: i32) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE products
            SET stock = $1, updated_at = NOW()
            WHERE id = $2
            ",
        )
        .bind(stock)
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}
