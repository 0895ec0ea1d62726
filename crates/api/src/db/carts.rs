//! Cart repository for database operations.
//!
//! One cart per customer, created lazily on first mutation. Line rows are
//! keyed by `(cart_id, product_id)` so quantities stay deduplicated per
//! product.

use rust_decimal::Decimal;
use sqlx::PgPool;

use orchard_core::{CartId, CustomerId, ProductId};

use super::RepositoryError;
use crate::models::{Cart, CartItem};

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: i32,
    name: String,
    price: Decimal,
    image_url: Option<String>,
    quantity: i32,
    stock: i32,
}

impl From<CartItemRow> for CartItem {
    fn from(r: CartItemRow) -> Self {
        Self {
            product_id: ProductId::new(r.product_id),
            name: r.name,
            price: r.price,
            image_url: r.image_url,
            quantity: r.quantity,
            stock: r.stock,
        }
    }
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the customer's cart, creating an empty one if none exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_or_create(&self, customer_id: CustomerId) -> Result<Cart, RepositoryError> {
        let cart_id = self.get_or_create_id(customer_id).await?;
        let items = self.load_items(cart_id).await?;

        Ok(Cart {
            id: cart_id,
            customer_id,
            items,
        })
    }

    /// Add `quantity` of a product, or bump the existing line's quantity.
    ///
    /// The caller is responsible for the advisory stock check; this method
    /// only maintains the dedup invariant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn add_item(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, RepositoryError> {
        let cart_id = self.get_or_create_id(customer_id).await?;

        sqlx::query(
            r"
            INSERT INTO cart_items (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id) DO UPDATE
            SET quantity = cart_items.quantity + EXCLUDED.quantity
            ",
        )
        .bind(cart_id.as_i32())
        .bind(product_id.as_i32())
        .bind(quantity)
        .execute(self.pool)
        .await?;

        self.get_or_create(customer_id).await
    }

    /// Set the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the customer has no cart or
    /// the product is not in it.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn set_quantity(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE cart_items
            SET quantity = $1
            WHERE product_id = $2
              AND cart_id = (SELECT id FROM carts WHERE customer_id = $3)
            ",
        )
        .bind(quantity)
        .bind(product_id.as_i32())
        .bind(customer_id.as_i32())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.get_or_create(customer_id).await
    }

    /// Remove a product from the cart. Removing an absent line is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn remove_item(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
    ) -> Result<Cart, RepositoryError> {
        sqlx::query(
            r"
            DELETE FROM cart_items
            WHERE product_id = $1
              AND cart_id = (SELECT id FROM carts WHERE customer_id = $2)
            ",
        )
        .bind(product_id.as_i32())
        .bind(customer_id.as_i32())
        .execute(self.pool)
        .await?;

        self.get_or_create(customer_id).await
    }

    /// Remove every line from the customer's cart.
    ///
    /// Called by the materializer after an order commits, and by the
    /// explicit clear endpoint. Clearing a missing cart is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn clear(&self, customer_id: CustomerId) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            DELETE FROM cart_items
            WHERE cart_id = (SELECT id FROM carts WHERE customer_id = $1)
            ",
        )
        .bind(customer_id.as_i32())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    async fn get_or_create_id(&self, customer_id: CustomerId) -> Result<CartId, RepositoryError> {
        // Lazy creation: insert-or-fetch in one statement. DO UPDATE is
        // needed (not DO NOTHING) so RETURNING yields the existing row too.
        let (id,): (i32,) = sqlx::query_as(
            r"
            INSERT INTO carts (customer_id)
            VALUES ($1)
            ON CONFLICT (customer_id) DO UPDATE SET customer_id = EXCLUDED.customer_id
            RETURNING id
            ",
        )
        .bind(customer_id.as_i32())
        .fetch_one(self.pool)
        .await?;

        Ok(CartId::new(id))
    }

    async fn load_items(&self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT ci.product_id, p.name, p.price,
                   (p.image_urls)[1] AS image_url,
                   ci.quantity, p.stock
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.added_at ASC
            ",
        )
        .bind(cart_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(CartItem::from).collect())
    }
}
