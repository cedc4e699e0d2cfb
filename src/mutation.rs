//! Post-mutation cache coordination.
//!
//! The engine does not issue writes itself; the UI shell POSTs through its
//! own forms and then reports the mutation here. Invalidation is coarse by
//! collection: a write anywhere in a collection drops every cached view
//! derived from it, synchronously, before the acknowledgement returns. A
//! best-effort warm refetch of the page the user is looking at follows, so
//! the next render is a cache hit again.

use crate::error::Result;
use crate::fetcher::CollectionFetcher;
use crate::http::ApiClient;

/// Which collection a mutation touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Customer,
    Order,
    Expense,
    HotelOrder,
    HotelExpense,
}

/// The list view the user currently has open, for warm refetching.
#[derive(Clone, Debug, Default)]
pub struct ViewCursor {
    pub page: u64,
    pub page_size: u64,
    pub search: String,
    /// Set when the user is on a customer's order detail rather than a list.
    pub customer_id: Option<u64>,
}

impl ViewCursor {
    pub fn list(page: u64, page_size: u64, search: impl Into<String>) -> Self {
        ViewCursor {
            page,
            page_size,
            search: search.into(),
            customer_id: None,
        }
    }

    pub fn customer_detail(customer_id: u64) -> Self {
        ViewCursor {
            customer_id: Some(customer_id),
            ..ViewCursor::default()
        }
    }
}

/// Applies the invalidation fan-out after a write.
pub struct MutationCoordinator<C: ApiClient> {
    fetcher: CollectionFetcher<C>,
}

impl<C: ApiClient> MutationCoordinator<C> {
    pub fn new(fetcher: CollectionFetcher<C>) -> Self {
        MutationCoordinator { fetcher }
    }

    /// A record was created in `kind`.
    pub async fn on_create(&self, kind: EntityKind, view: &ViewCursor) -> Result<()> {
        self.apply(kind, view).await
    }

    /// A record in `kind` was edited.
    pub async fn on_update(&self, kind: EntityKind, view: &ViewCursor) -> Result<()> {
        self.apply(kind, view).await
    }

    /// A record in `kind` was deleted.
    ///
    /// A customer deletion also drops the order caches: their orders are
    /// gone from the backend, and rollups naming the customer are wrong.
    pub async fn on_delete(&self, kind: EntityKind, view: &ViewCursor) -> Result<()> {
        if kind == EntityKind::Customer {
            self.fetcher.caches().invalidate_orders();
        }
        self.apply(kind, view).await
    }

    async fn apply(&self, kind: EntityKind, view: &ViewCursor) -> Result<()> {
        let caches = self.fetcher.caches();
        match kind {
            EntityKind::Customer => {
                caches.invalidate_customers();
            }
            EntityKind::Order => match view.customer_id {
                // From a detail view, the targeted entry plus the shared
                // collections; from a list, everything order-derived.
                Some(customer_id) => caches.invalidate_orders_for(customer_id),
                None => caches.invalidate_orders(),
            },
            EntityKind::Expense => caches.invalidate_expenses(),
            EntityKind::HotelOrder => caches.invalidate_hotel_orders(),
            EntityKind::HotelExpense => caches.invalidate_hotel_expenses(),
        }
        info!("✓ Invalidated {:?} caches after mutation", kind);

        self.warm(kind, view).await;
        Ok(())
    }

    /// Refetch the page the user is looking at so the next render hits the
    /// cache. Best effort: a warm failure is logged, the invalidation has
    /// already taken effect.
    async fn warm(&self, kind: EntityKind, view: &ViewCursor) {
        let warmed = match (kind, view.customer_id) {
            (EntityKind::Order, Some(customer_id)) => self
                .fetcher
                .fetch_customer_orders(customer_id, true)
                .await
                .map(|_| ()),
            (EntityKind::Customer, _) => self
                .fetcher
                .fetch_customers_page(view.page.max(1), view.page_size.max(1), &view.search, true)
                .await
                .map(|_| ()),
            // Ledger and hotel views are report-driven; the next report
            // request repopulates them.
            _ => return,
        };

        if let Err(error) = warmed {
            warn!("⚠ Warm refetch after {:?} mutation failed: {}", kind, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::fetcher::SessionCaches;
    use crate::http::MockApi;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (
        MutationCoordinator<MockApi>,
        CollectionFetcher<MockApi>,
        Arc<MockApi>,
    ) {
        let api = Arc::new(MockApi::new());
        api.route(
            "https://t/customers/?page=1&page_size=25",
            json!({
                "results": [{"id": 1, "name": "Wanjiku"}],
                "next": null, "previous": null, "count": 1
            }),
        );
        api.route(
            "https://t/orders/?customer=1",
            json!({"results": [], "next": null, "previous": null, "count": 0}),
        );
        api.route(
            "https://t/orders/",
            json!({"results": [], "next": null, "previous": null, "count": 0}),
        );

        let config = EngineConfig::default().with_base_url("https://t");
        let caches = Arc::new(SessionCaches::new(&config));
        let fetcher = CollectionFetcher::new(Arc::clone(&api), caches, config);
        (MutationCoordinator::new(fetcher.clone()), fetcher, api)
    }

    #[tokio::test]
    async fn test_customer_create_invalidates_and_warms_list_page() {
        let (coordinator, fetcher, api) = setup();

        fetcher
            .fetch_customers_page(1, 25, "", false)
            .await
            .expect("Failed to fetch");
        assert_eq!(api.calls(), 1);

        coordinator
            .on_create(EntityKind::Customer, &ViewCursor::list(1, 25, ""))
            .await
            .expect("Mutation ack failed");

        // The warm refetch already went to the network...
        assert_eq!(api.calls(), 2);

        // ...so the next render is a cache hit.
        fetcher
            .fetch_customers_page(1, 25, "", false)
            .await
            .expect("Failed to fetch");
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_order_mutation_from_detail_invalidates_customer_orders() {
        let (coordinator, fetcher, api) = setup();

        fetcher
            .fetch_customer_orders(1, false)
            .await
            .expect("Failed to fetch");
        fetcher
            .fetch_all_orders(false)
            .await
            .expect("Failed to fetch");
        let before = api.calls();

        coordinator
            .on_update(EntityKind::Order, &ViewCursor::customer_detail(1))
            .await
            .expect("Mutation ack failed");

        // Warm refetch of the detail view.
        assert_eq!(api.calls(), before + 1);

        // The shared order collection was invalidated too.
        fetcher
            .fetch_all_orders(false)
            .await
            .expect("Failed to refetch");
        assert_eq!(api.calls(), before + 2);
    }

    #[tokio::test]
    async fn test_customer_delete_also_drops_order_caches() {
        let (coordinator, fetcher, api) = setup();

        fetcher
            .fetch_all_orders(false)
            .await
            .expect("Failed to fetch");
        let before = api.calls();

        coordinator
            .on_delete(EntityKind::Customer, &ViewCursor::list(1, 25, ""))
            .await
            .expect("Mutation ack failed");

        fetcher
            .fetch_all_orders(false)
            .await
            .expect("Failed to refetch");
        // Warm of the customer list plus the order refetch.
        assert_eq!(api.calls(), before + 2);
    }

    #[tokio::test]
    async fn test_warm_failure_does_not_fail_the_ack() {
        let (coordinator, fetcher, api) = setup();
        api.fail(
            "https://t/customers/?page=1&page_size=25",
            crate::error::Error::Network("down".to_string()),
        );

        coordinator
            .on_create(EntityKind::Customer, &ViewCursor::list(1, 25, ""))
            .await
            .expect("Ack must succeed even when warming fails");
    }

    #[tokio::test]
    async fn test_expense_mutation_skips_warming() {
        let (coordinator, fetcher, api) = setup();
        let before = api.calls();

        coordinator
            .on_create(EntityKind::Expense, &ViewCursor::default())
            .await
            .expect("Mutation ack failed");

        assert_eq!(api.calls(), before);
    }
}
