//! The dashboard report engine.
//!
//! Materializes the five collections concurrently, resolves the date window,
//! and hands everything to the pure aggregation layer. All clock reads
//! happen here: the aggregates receive an explicit as-of date.

use crate::aggregate::{self, CustomerRollup, DashboardReport, DateWindow};
use crate::error::{Error, Result};
use crate::fetcher::CollectionFetcher;
use crate::http::ApiClient;
use crate::model;
use chrono::{Datelike, Utc};

/// A built report plus the health of the data behind it.
#[derive(Clone, Debug)]
pub struct ReportOutcome {
    pub report: DashboardReport,
    /// At least one collection came from an expired cache entry after a
    /// failed refresh.
    pub stale: bool,
    /// At least one drain stopped at a page cap or a malformed page.
    pub truncated: bool,
    /// The refresh failures behind `stale`, for the UI banner.
    pub notices: Vec<Error>,
}

/// Builds dashboard and customer reports over the cached collections.
pub struct ReportEngine<C: ApiClient> {
    fetcher: CollectionFetcher<C>,
}

impl<C: ApiClient> ReportEngine<C> {
    pub fn new(fetcher: CollectionFetcher<C>) -> Self {
        ReportEngine { fetcher }
    }

    /// Build the full dashboard report.
    ///
    /// The five collection drains run concurrently; the first hard failure
    /// aborts the report. With `window` unset, the window resolves to the
    /// most recent year with data.
    ///
    /// # Errors
    ///
    /// Any collection that can neither be refreshed nor served stale fails
    /// the whole report: partial aggregates would silently misreport
    /// revenue.
    pub async fn dashboard(
        &self,
        window: Option<DateWindow>,
        force_refresh: bool,
    ) -> Result<ReportOutcome> {
        let (mut orders, customers, expenses, hotel_orders, hotel_expenses) = tokio::try_join!(
            self.fetcher.fetch_all_orders(force_refresh),
            self.fetcher.fetch_all_customers(force_refresh),
            self.fetcher.fetch_all_expenses(force_refresh),
            self.fetcher.fetch_all_hotel_orders(force_refresh),
            self.fetcher.fetch_all_hotel_expenses(force_refresh),
        )?;

        model::resolve_customer_names(&mut orders.records, &customers.records);

        let as_of = Utc::now().date_naive();
        let window = DateWindow::resolve(
            window,
            orders
                .records
                .iter()
                .filter_map(|o| o.created_date())
                .chain(expenses.records.iter().filter_map(|e| e.date()))
                .chain(hotel_orders.records.iter().filter_map(|o| o.created_date()))
                .chain(hotel_expenses.records.iter().filter_map(|e| e.date())),
            as_of.year(),
        );

        let report = aggregate::dashboard_report(
            &orders.records,
            &expenses.records,
            &hotel_orders.records,
            &hotel_expenses.records,
            window,
            as_of,
        );

        let stale =
            orders.stale || customers.stale || expenses.stale || hotel_orders.stale || hotel_expenses.stale;
        let truncated = orders.truncated
            || customers.truncated
            || expenses.truncated
            || hotel_orders.truncated
            || hotel_expenses.truncated;
        let notices: Vec<Error> = [
            orders.notice,
            customers.notice,
            expenses.notice,
            hotel_orders.notice,
            hotel_expenses.notice,
        ]
        .into_iter()
        .flatten()
        .collect();

        if stale {
            warn!("⚠ Dashboard report built over stale data ({} notices)", notices.len());
        } else {
            info!(
                "✓ Dashboard report built: {} orders in window {:?}",
                report.orders.total, window
            );
        }

        Ok(ReportOutcome {
            report,
            stale,
            truncated,
            notices,
        })
    }

    /// Rollup for one customer's detail screen.
    pub async fn customer_summary(
        &self,
        customer_id: u64,
        force_refresh: bool,
    ) -> Result<CustomerRollup> {
        let orders = self.fetcher.fetch_customer_orders(customer_id, force_refresh);
        let customers = self.fetcher.fetch_all_customers(force_refresh);
        let (orders, customers) = tokio::try_join!(orders, customers)?;

        let customer = customers.records.iter().find(|c| c.id == customer_id);
        Ok(aggregate::customer_summary(&orders.records, customer))
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

    fn page(results: serde_json::Value) -> serde_json::Value {
        json!({"results": results, "next": null, "previous": null})
    }

    fn seeded_api() -> Arc<MockApi> {
        let api = Arc::new(MockApi::new());
        api.route(
            "https://t/customers/",
            page(json!([
                {"id": 1, "name": "Wanjiku"},
                {"id": 2, "name": "Otieno"}
            ])),
        );
        api.route(
            "https://t/orders/",
            page(json!([
                {"id": 1, "customer": 1, "shop": "Shop A", "payment_type": "cash",
                 "payment_status": "completed", "order_status": "Completed",
                 "total_price": "100.00", "amount_paid": "100.00",
                 "created_at": "2026-01-10T08:00:00Z"},
                {"id": 2, "customer": 1, "shop": "Shop A", "payment_type": "mpesa",
                 "payment_status": "pending", "order_status": "pending",
                 "total_price": "50.00", "created_at": "2026-02-01T08:00:00Z"},
                {"id": 3, "customer": 2, "shop": "Shop B", "payment_type": "cash",
                 "payment_status": "completed", "order_status": "Delivered_picked",
                 "total_price": "80.00", "amount_paid": "80.00",
                 "created_at": "2026-02-05T08:00:00Z"}
            ])),
        );
        api.route(
            "https://t/expense-records/",
            page(json!([
                {"id": 1, "shop": "Shop A", "amount": "40.00", "date": "2026-01-15"}
            ])),
        );
        api.route(
            "https://t/hotel/orders/",
            page(json!([
                {"id": 1, "created_at": "2026-02-01", "items": [
                    {"price": "200.00", "quantity": 2, "oncredit": false},
                    {"price": "500.00", "quantity": 1, "oncredit": true}
                ]}
            ])),
        );
        api.route(
            "https://t/hotel/Hotelexpense-records/",
            page(json!([{"id": 1, "amount": "100.00", "date": "2026-02-02"}])),
        );
        api
    }

    fn engine(api: Arc<MockApi>) -> ReportEngine<MockApi> {
        let config = EngineConfig::default().with_base_url("https://t");
        let caches = Arc::new(SessionCaches::new(&config));
        ReportEngine::new(CollectionFetcher::new(api, caches, config))
    }

    #[tokio::test]
    async fn test_dashboard_aggregates_across_domains() {
        let api = seeded_api();
        let engine = engine(Arc::clone(&api));

        let outcome = engine.dashboard(None, false).await.expect("Failed to build");
        let report = &outcome.report;

        assert!(!outcome.stale);
        assert!(!outcome.truncated);
        assert_eq!(report.window, DateWindow::year(2026));

        assert_eq!(report.orders.total, 3);
        assert_eq!(report.growth.laundry_revenue, 230.0);
        assert_eq!(report.growth.hotel_revenue, 400.0);
        // 230 + 400 revenue, 40 + 100 expenses.
        assert_eq!(report.growth.net_profit, 490.0);

        // Names resolved from the customer collection.
        let wanjiku = report.customers.get(&1).expect("Missing rollup");
        assert_eq!(wanjiku.name.as_deref(), Some("Wanjiku"));
        assert_eq!(wanjiku.order_count, 2);
        assert_eq!(wanjiku.total_billed, 150.0);
    }

    #[tokio::test]
    async fn test_dashboard_reuses_cached_collections() {
        let api = seeded_api();
        let engine = engine(Arc::clone(&api));

        engine.dashboard(None, false).await.expect("Failed to build");
        let after_first = api.calls();
        assert_eq!(after_first, 5);

        engine.dashboard(None, false).await.expect("Failed to rebuild");
        assert_eq!(api.calls(), after_first);

        // Force refresh redrains everything.
        engine.dashboard(None, true).await.expect("Failed to refresh");
        assert_eq!(api.calls(), after_first + 5);
    }

    #[tokio::test]
    async fn test_dashboard_fails_when_a_collection_is_unavailable() {
        let api = seeded_api();
        api.fail(
            "https://t/expense-records/",
            Error::Timeout("injected".to_string()),
        );
        let engine = engine(api);

        let result = engine.dashboard(None, false).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_window_resolution_sees_every_ledger() {
        // The only recent activity is a hotel expense; the window must still
        // resolve to its year.
        let api = Arc::new(MockApi::new());
        api.route("https://t/customers/", page(json!([])));
        api.route(
            "https://t/orders/",
            page(json!([
                {"id": 1, "customer": 1, "shop": "Shop A",
                 "total_price": "10.00", "created_at": "2025-06-01"}
            ])),
        );
        api.route("https://t/expense-records/", page(json!([])));
        api.route("https://t/hotel/orders/", page(json!([])));
        api.route(
            "https://t/hotel/Hotelexpense-records/",
            page(json!([{"id": 1, "amount": "75.00", "date": "2026-03-01"}])),
        );
        let engine = engine(api);

        let outcome = engine.dashboard(None, false).await.expect("Failed to build");
        assert_eq!(outcome.report.window, DateWindow::year(2026));
        assert_eq!(outcome.report.hotel.expenses, 75.0);
    }

    #[tokio::test]
    async fn test_explicit_window_narrows_the_report() {
        let api = seeded_api();
        let engine = engine(api);

        let january = DateWindow::new(
            chrono::NaiveDate::from_ymd_opt(2026, 1, 1).expect("Invalid date"),
            chrono::NaiveDate::from_ymd_opt(2026, 1, 31).expect("Invalid date"),
        );
        let outcome = engine
            .dashboard(Some(january), false)
            .await
            .expect("Failed to build");

        assert_eq!(outcome.report.orders.total, 1);
        assert_eq!(outcome.report.growth.laundry_revenue, 100.0);
    }

    #[tokio::test]
    async fn test_customer_summary_uses_roster_name() {
        let api = seeded_api();
        api.route(
            "https://t/orders/?customer=1",
            page(json!([
                {"id": 1, "customer": 1, "shop": "Shop A",
                 "order_status": "Completed", "total_price": "100.00",
                 "created_at": "2026-01-10"}
            ])),
        );
        let engine = engine(api);

        let summary = engine
            .customer_summary(1, false)
            .await
            .expect("Failed to summarize");

        assert_eq!(summary.customer_id, 1);
        assert_eq!(summary.name.as_deref(), Some("Wanjiku"));
        assert_eq!(summary.order_count, 1);
        assert_eq!(summary.completed, 1);
    }
}
