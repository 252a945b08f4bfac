//! Storage abstraction layer for the dispatcher.
//!
//! Provides a trait seam over delivery-record persistence so dispatch logic
//! can be tested without a database. Production wires in the concrete
//! `spb_core::storage::Storage`; tests use the in-memory mock.

use std::{future::Future, pin::Pin, sync::Arc};

use spb_core::{
    error::Result,
    models::{RequestId, WebhookDelivery},
    storage::webhook_deliveries::NewWebhookDelivery,
};

/// Storage operations required by the dispatcher.
///
/// One record is written per dispatch sequence, after the attempt loop has
/// finished. The read side exists for verification and operator inspection.
pub trait DeliveryStorage: Send + Sync + 'static {
    /// Persists the summary record for a completed dispatch sequence.
    ///
    /// Returns the new row id.
    fn record_delivery(
        &self,
        delivery: NewWebhookDelivery,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;

    /// Finds the delivery records written for a request.
    fn find_deliveries(
        &self,
        request_id: RequestId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<WebhookDelivery>>> + Send + '_>>;
}

/// Production storage implementation using PostgreSQL.
///
/// Wraps the concrete `spb_core::storage::Storage` so all database access
/// stays behind the repository layer.
pub struct PostgresDeliveryStorage {
    storage: Arc<spb_core::storage::Storage>,
}

impl PostgresDeliveryStorage {
    /// Creates a new PostgreSQL storage adapter.
    pub fn new(storage: Arc<spb_core::storage::Storage>) -> Self {
        Self { storage }
    }
}

impl DeliveryStorage for PostgresDeliveryStorage {
    fn record_delivery(
        &self,
        delivery: NewWebhookDelivery,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_deliveries.record(&delivery).await })
    }

    fn find_deliveries(
        &self,
        request_id: RequestId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<WebhookDelivery>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_deliveries.find_by_request(&request_id).await })
    }
}

pub mod mock {
    //! Mock storage implementation for testing.
    //!
    //! Stores delivery records in memory and supports injecting a write
    //! failure to exercise the dispatcher's persistence error path.

    use std::{future::Future, pin::Pin, sync::Arc};

    use chrono::Utc;
    use spb_core::error::{CoreError, Result};
    use tokio::sync::RwLock;

    use super::{DeliveryStorage, NewWebhookDelivery, RequestId, WebhookDelivery};

    /// In-memory delivery storage for tests.
    #[derive(Clone, Default)]
    pub struct MockDeliveryStorage {
        records: Arc<RwLock<Vec<WebhookDelivery>>>,
        record_error: Arc<RwLock<Option<String>>>,
    }

    impl MockDeliveryStorage {
        /// Creates a new mock storage with empty state.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next `record_delivery` call fail with a database error.
        pub async fn fail_next_record(&self, message: impl Into<String>) {
            *self.record_error.write().await = Some(message.into());
        }

        /// All records written so far, in write order.
        pub async fn records(&self) -> Vec<WebhookDelivery> {
            self.records.read().await.clone()
        }
    }

    impl DeliveryStorage for MockDeliveryStorage {
        fn record_delivery(
            &self,
            delivery: NewWebhookDelivery,
        ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
            Box::pin(async move {
                if let Some(message) = self.record_error.write().await.take() {
                    return Err(CoreError::Database(message));
                }

                let mut records = self.records.write().await;
                let id = records.len() as i64 + 1;
                records.push(WebhookDelivery {
                    id,
                    request_id: delivery.request_id,
                    url: delivery.url,
                    status: delivery.status,
                    http_code: delivery.http_code,
                    attempts: delivery.attempts,
                    response_body: delivery.response_body,
                    created_at: Utc::now(),
                });
                Ok(id)
            })
        }

        fn find_deliveries(
            &self,
            request_id: RequestId,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<WebhookDelivery>>> + Send + '_>> {
            Box::pin(async move {
                let records = self.records.read().await;
                Ok(records.iter().filter(|r| r.request_id == request_id).cloned().collect())
            })
        }
    }
}
