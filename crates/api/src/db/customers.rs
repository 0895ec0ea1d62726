//! Customer repository for database operations.
//!
//! Customers are created and deleted by identity-provider lifecycle events
//! (see `routes::identity`); checkout only reads them and caches the
//! payment-processor mapping.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use orchard_core::{CustomerId, ExternalId, ProcessorCustomerId};

use super::RepositoryError;
use crate::models::Customer;

/// Repository for customer database operations.
pub struct CustomerRepository<'a> {
    pool: &'a PgPool,
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: i32,
    external_id: String,
    email: String,
    name: String,
    image_url: Option<String>,
    processor_customer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(r: CustomerRow) -> Self {
        Self {
            id: CustomerId::new(r.id),
            external_id: ExternalId::new(r.external_id),
            email: r.email,
            name: r.name,
            image_url: r.image_url,
            processor_customer_id: r.processor_customer_id.map(ProcessorCustomerId::new),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const SELECT_COLUMNS: &str = r"
    SELECT id, external_id, email, name, image_url, processor_customer_id,
           created_at, updated_at
    FROM customers
";

impl<'a> CustomerRepository<'a> {
    /// Create a new customer repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a customer by their identity-provider subject.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!("{SELECT_COLUMNS} WHERE external_id = $1"))
            .bind(external_id.as_str())
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Customer::from))
    }

    /// Get a customer by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_i32())
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Customer::from))
    }

    /// Upsert a customer from an identity-provider `user.created` event.
    ///
    /// Replaying the same event updates the profile fields in place rather
    /// than failing, since the provider delivers at least once.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    pub async fn upsert_from_identity(
        &self,
        external_id: &ExternalId,
        email: &str,
        name: &str,
        image_url: Option<&str>,
    ) -> Result<Customer, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r"
            INSERT INTO customers (external_id, email, name, image_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (external_id) DO UPDATE
            SET email = EXCLUDED.email,
                name = EXCLUDED.name,
                image_url = EXCLUDED.image_url,
                updated_at = NOW()
            RETURNING id, external_id, email, name, image_url, processor_customer_id,
                      created_at, updated_at
            ",
        )
        .bind(external_id.as_str())
        .bind(email)
        .bind(name)
        .bind(image_url)
        .fetch_one(self.pool)
        .await?;

        Ok(Customer::from(row))
    }

    /// Delete a customer on an identity-provider `user.deleted` event.
    ///
    /// Returns `true` if a row was deleted. Deleting an unknown subject is
    /// not an error: the provider retries deliveries.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM customers WHERE external_id = $1")
            .bind(external_id.as_str())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Cache the payment-processor customer mapping, idempotently.
    ///
    /// A pre-existing mapping always wins: the update only applies when the
    /// column is NULL, and the canonical value is read back afterwards, so
    /// two concurrent first checkouts converge on one processor customer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the customer doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn cache_processor_customer(
        &self,
        id: CustomerId,
        processor_customer_id: &ProcessorCustomerId,
    ) -> Result<ProcessorCustomerId, RepositoryError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            r"
            UPDATE customers
            SET processor_customer_id = COALESCE(processor_customer_id, $1),
                updated_at = NOW()
            WHERE id = $2
            RETURNING processor_customer_id
            ",
        )
        .bind(processor_customer_id.as_str())
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some((Some(canonical),)) => Ok(ProcessorCustomerId::new(canonical)),
            Some((None,)) => Err(RepositoryError::DataCorruption(
                "processor_customer_id NULL after COALESCE upsert".to_owned(),
            )),
            None => Err(RepositoryError::NotFound),
        }
    }
}
