//! Customer domain type.

use chrono::{DateTime, Utc};
use serde::Serialize;

use orchard_core::{CustomerId, ExternalId, ProcessorCustomerId};

/// A shop customer, bridged from the external identity provider.
///
/// Rows are created and deleted by identity-provider lifecycle events; the
/// checkout pipeline only ever reads them, except for caching the
/// payment-processor mapping.
#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: CustomerId,
    /// Subject issued by the identity provider.
    pub external_id: ExternalId,
    pub email: String,
    pub name: String,
    pub image_url: Option<String>,
    /// Payment-processor customer handle, set lazily on first checkout
    /// and never overwritten afterwards.
    pub processor_customer_id: Option<ProcessorCustomerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
