//! Pure aggregation over materialized collections.
//!
//! Everything here is a function of its inputs: records in, report out, no
//! clock reads and no I/O. The report engine resolves the date window and the
//! as-of date up front and passes them down, so the same inputs always
//! produce the same report.

use crate::model::{
    Customer, Expense, HotelExpense, HotelOrder, Order, OrderStatus, PaymentStatus, PaymentType,
};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Inclusive date window every aggregate is filtered by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        DateWindow { from, to }
    }

    /// The calendar year `year`, January 1 through December 31.
    pub fn year(year: i32) -> Self {
        // Jan 1 and Dec 31 exist in every calendar year.
        let from = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN);
        let to = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX);
        DateWindow { from, to }
    }

    /// Resolve the effective window.
    ///
    /// An explicit window wins. Otherwise the window is the most recent year
    /// that has any data, so a dashboard opened in January still shows last
    /// year's activity; with no data at all it falls back to `fallback_year`.
    pub fn resolve(
        explicit: Option<DateWindow>,
        dates: impl IntoIterator<Item = NaiveDate>,
        fallback_year: i32,
    ) -> Self {
        if let Some(window) = explicit {
            return window;
        }
        let year = dates
            .into_iter()
            .map(|d| d.year())
            .max()
            .unwrap_or(fallback_year);
        DateWindow::year(year)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Year the monthly chart series are bucketed into.
    pub fn chart_year(&self) -> i32 {
        self.from.year()
    }
}

/// Order lifecycle counts within the window.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OrderStats {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub delivered_picked: u64,
    /// Billed total over finished orders (completed or delivered).
    pub completed_revenue: f64,
}

pub fn order_stats(orders: &[Order]) -> OrderStats {
    let mut stats = OrderStats::default();
    for order in orders {
        stats.total += 1;
        match order.order_status {
            OrderStatus::Pending | OrderStatus::Processing => stats.pending += 1,
            OrderStatus::Completed => stats.completed += 1,
            OrderStatus::DeliveredPicked => stats.delivered_picked += 1,
            OrderStatus::Cancelled => {}
        }
        if matches!(
            order.order_status,
            OrderStatus::Completed | OrderStatus::DeliveredPicked
        ) {
            stats.completed_revenue += order.total_price.amount();
        }
    }
    stats
}

/// Payment-side counts and amounts within the window.
///
/// The amounts follow the ledger's convention: a pending order contributes
/// its billed total, a partial order only what was actually paid, a settled
/// order its billed total.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PaymentStats {
    pub pending_count: u64,
    pub partial_count: u64,
    pub completed_count: u64,
    pub pending_amount: f64,
    pub partial_amount: f64,
    pub completed_amount: f64,
    /// Unsettled orders created before the as-of date.
    pub overdue_count: u64,
    /// Outstanding balance across overdue orders.
    pub overdue_amount: f64,
}

pub fn payment_stats(orders: &[Order], as_of: NaiveDate) -> PaymentStats {
    let mut stats = PaymentStats::default();
    for order in orders {
        match order.payment_status {
            PaymentStatus::Pending => {
                stats.pending_count += 1;
                stats.pending_amount += order.total_price.amount();
            }
            PaymentStatus::Partial => {
                stats.partial_count += 1;
                stats.partial_amount += order.amount_paid.amount();
            }
            PaymentStatus::Completed => {
                stats.completed_count += 1;
                stats.completed_amount += order.total_price.amount();
            }
        }

        let unsettled = matches!(
            order.payment_status,
            PaymentStatus::Pending | PaymentStatus::Partial
        );
        let overdue = order.created_date().map(|d| d < as_of).unwrap_or(false);
        if unsettled && overdue {
            stats.overdue_count += 1;
            stats.overdue_amount += outstanding(order);
        }
    }
    stats
}

/// What is still owed on an order. The wire `balance` wins when it parses to
/// something positive; otherwise it is derived from total minus paid.
fn outstanding(order: &Order) -> f64 {
    let balance = order.balance.amount();
    if balance > 0.0 {
        balance
    } else {
        (order.total_price.amount() - order.amount_paid.amount()).max(0.0)
    }
}

/// Per-customer rollup derived from the order collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CustomerRollup {
    pub customer_id: u64,
    pub name: Option<String>,
    pub order_count: u64,
    pub total_billed: f64,
    pub amount_paid: f64,
    /// What the customer still owes across all their orders.
    pub total_balance: f64,
    pub pending: u64,
    pub completed: u64,
    pub delivered_picked: u64,
    pub last_order_date: Option<NaiveDate>,
}

/// Roll orders up by customer. BTreeMap keeps the output ordered by id, so
/// serialized reports are deterministic.
pub fn customer_rollups(orders: &[Order]) -> BTreeMap<u64, CustomerRollup> {
    let mut rollups: BTreeMap<u64, CustomerRollup> = BTreeMap::new();
    for order in orders {
        let rollup = rollups
            .entry(order.customer_id)
            .or_insert_with(|| CustomerRollup {
                customer_id: order.customer_id,
                ..CustomerRollup::default()
            });

        if rollup.name.is_none() {
            rollup.name = order.customer_name.clone();
        }
        rollup.order_count += 1;
        rollup.total_billed += order.total_price.amount();
        rollup.amount_paid += order.amount_paid.amount();
        if matches!(
            order.payment_status,
            PaymentStatus::Pending | PaymentStatus::Partial
        ) {
            rollup.total_balance += outstanding(order);
        }
        match order.order_status {
            OrderStatus::Completed => rollup.completed += 1,
            OrderStatus::DeliveredPicked => rollup.delivered_picked += 1,
            OrderStatus::Pending | OrderStatus::Processing => rollup.pending += 1,
            OrderStatus::Cancelled => {}
        }
        if let Some(date) = order.created_date() {
            if rollup.last_order_date.map(|d| date > d).unwrap_or(true) {
                rollup.last_order_date = Some(date);
            }
        }
    }
    rollups
}

/// Per-shop revenue and expense rollup, with the payment-status split.
///
/// The split follows the same ledger conventions as [`payment_stats`]:
/// pending contributes billed totals, partial only what was paid, settled
/// its billed total.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ShopRollup {
    pub order_count: u64,
    pub revenue: f64,
    pub expenses: f64,
    pub net: f64,
    pub pending_count: u64,
    pub partial_count: u64,
    pub completed_count: u64,
    pub pending_amount: f64,
    pub partial_amount: f64,
    pub completed_amount: f64,
}

/// Roll orders and the expense ledger up by shop name.
pub fn shop_rollups(orders: &[Order], expenses: &[Expense]) -> BTreeMap<String, ShopRollup> {
    let mut rollups: BTreeMap<String, ShopRollup> = BTreeMap::new();
    for order in orders {
        let rollup = rollups.entry(order.shop.clone()).or_default();
        rollup.order_count += 1;
        rollup.revenue += order.total_price.amount();
        match order.payment_status {
            PaymentStatus::Pending => {
                rollup.pending_count += 1;
                rollup.pending_amount += order.total_price.amount();
            }
            PaymentStatus::Partial => {
                rollup.partial_count += 1;
                rollup.partial_amount += order.amount_paid.amount();
            }
            PaymentStatus::Completed => {
                rollup.completed_count += 1;
                rollup.completed_amount += order.total_price.amount();
            }
        }
    }
    for expense in expenses {
        if let Some(shop) = &expense.shop {
            rollups.entry(shop.clone()).or_default().expenses += expense.amount.amount();
        }
    }
    for rollup in rollups.values_mut() {
        rollup.net = rollup.revenue - rollup.expenses;
    }
    rollups
}

/// Hotel-side rollup. Revenue counts only non-credit line items.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HotelRollup {
    pub order_count: u64,
    pub revenue: f64,
    pub expenses: f64,
    pub net_profit: f64,
    pub avg_order_value: f64,
}

pub fn hotel_rollup(orders: &[HotelOrder], expenses: &[HotelExpense]) -> HotelRollup {
    let revenue: f64 = orders.iter().map(HotelOrder::revenue).sum();
    let expense_total: f64 = expenses.iter().map(|e| e.amount.amount()).sum();
    let order_count = orders.len() as u64;

    HotelRollup {
        order_count,
        revenue,
        expenses: expense_total,
        net_profit: revenue - expense_total,
        avg_order_value: if order_count > 0 {
            revenue / order_count as f64
        } else {
            0.0
        },
    }
}

/// Cross-domain totals: laundry plus hotel.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BusinessGrowth {
    pub laundry_revenue: f64,
    pub hotel_revenue: f64,
    pub total_revenue: f64,
    pub total_expenses: f64,
    pub net_profit: f64,
}

pub fn business_growth(
    orders: &[Order],
    expenses: &[Expense],
    hotel_orders: &[HotelOrder],
    hotel_expenses: &[HotelExpense],
) -> BusinessGrowth {
    let laundry_revenue: f64 = orders.iter().map(|o| o.total_price.amount()).sum();
    let hotel_revenue: f64 = hotel_orders.iter().map(HotelOrder::revenue).sum();
    let total_expenses: f64 = expenses.iter().map(|e| e.amount.amount()).sum::<f64>()
        + hotel_expenses.iter().map(|e| e.amount.amount()).sum::<f64>();
    let total_revenue = laundry_revenue + hotel_revenue;

    BusinessGrowth {
        laundry_revenue,
        hotel_revenue,
        total_revenue,
        total_expenses,
        net_profit: total_revenue - total_expenses,
    }
}

/// Twelve monthly buckets for one chart year. Records outside the year are
/// dropped, not clamped into January or December.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlySeries {
    pub year: i32,
    pub values: [f64; 12],
}

impl MonthlySeries {
    pub fn new(year: i32) -> Self {
        MonthlySeries {
            year,
            values: [0.0; 12],
        }
    }

    fn add(&mut self, date: NaiveDate, amount: f64) {
        if date.year() == self.year {
            self.values[date.month0() as usize] += amount;
        }
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Monthly laundry revenue for the chart year.
pub fn monthly_revenue(orders: &[Order], year: i32) -> MonthlySeries {
    let mut series = MonthlySeries::new(year);
    for order in orders {
        if let Some(date) = order.created_date() {
            series.add(date, order.total_price.amount());
        }
    }
    series
}

/// Monthly hotel revenue for the chart year, non-credit items only.
pub fn monthly_hotel_revenue(orders: &[HotelOrder], year: i32) -> MonthlySeries {
    let mut series = MonthlySeries::new(year);
    for order in orders {
        if let Some(date) = order.created_date() {
            series.add(date, order.revenue());
        }
    }
    series
}

/// Monthly expense series per shop for the chart year. Ledger entries without
/// a shop are bucketed under "unassigned".
pub fn monthly_expenses_by_shop(
    expenses: &[Expense],
    year: i32,
) -> BTreeMap<String, MonthlySeries> {
    let mut by_shop: BTreeMap<String, MonthlySeries> = BTreeMap::new();
    for expense in expenses {
        if let Some(date) = expense.date() {
            let shop = expense
                .shop
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "unassigned".to_string());
            by_shop
                .entry(shop)
                .or_insert_with(|| MonthlySeries::new(year))
                .add(date, expense.amount.amount());
        }
    }
    by_shop
}

/// Monthly net across both domains: all revenue minus all expenses.
pub fn monthly_business_growth(
    orders: &[Order],
    expenses: &[Expense],
    hotel_orders: &[HotelOrder],
    hotel_expenses: &[HotelExpense],
    year: i32,
) -> MonthlySeries {
    let mut series = MonthlySeries::new(year);
    for order in orders {
        if let Some(date) = order.created_date() {
            series.add(date, order.total_price.amount());
        }
    }
    for order in hotel_orders {
        if let Some(date) = order.created_date() {
            series.add(date, order.revenue());
        }
    }
    for expense in expenses {
        if let Some(date) = expense.date() {
            series.add(date, -expense.amount.amount());
        }
    }
    for expense in hotel_expenses {
        if let Some(date) = expense.date() {
            series.add(date, -expense.amount.amount());
        }
    }
    series
}

/// One row of a top-N ranking.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedEntry {
    pub label: String,
    pub value: f64,
}

/// Rank accumulated (label, value) pairs descending by value, keeping the
/// first-seen order on ties (stable sort), and truncate to `n`.
fn ranked(entries: Vec<(String, f64)>, n: usize) -> Vec<RankedEntry> {
    let mut entries = entries;
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    entries
        .into_iter()
        .take(n)
        .map(|(label, value)| RankedEntry { label, value })
        .collect()
}

/// Accumulate values per label, preserving first-seen label order.
struct Tally {
    order: Vec<String>,
    values: HashMap<String, f64>,
}

impl Tally {
    fn new() -> Self {
        Tally {
            order: Vec::new(),
            values: HashMap::new(),
        }
    }

    fn add(&mut self, label: &str, value: f64) {
        if !self.values.contains_key(label) {
            self.order.push(label.to_string());
        }
        *self.values.entry(label.to_string()).or_insert(0.0) += value;
    }

    fn into_pairs(mut self) -> Vec<(String, f64)> {
        self.order
            .into_iter()
            .map(|label| {
                let value = self.values.remove(&label).unwrap_or(0.0);
                (label, value)
            })
            .collect()
    }
}

/// Top customers by billed total.
pub fn top_customers(orders: &[Order], n: usize) -> Vec<RankedEntry> {
    let mut tally = Tally::new();
    for order in orders {
        let label = order
            .customer_name
            .clone()
            .unwrap_or_else(|| format!("customer #{}", order.customer_id));
        tally.add(&label, order.total_price.amount());
    }
    ranked(tally.into_pairs(), n)
}

/// Most frequent service types across order items.
pub fn top_services(orders: &[Order], n: usize) -> Vec<RankedEntry> {
    let mut tally = Tally::new();
    for order in orders {
        for item in &order.items {
            for service in item.servicetype.names() {
                tally.add(service, 1.0);
            }
        }
    }
    ranked(tally.into_pairs(), n)
}

/// Most frequent item names. `itemname` is comma-separated on the wire.
pub fn top_items(orders: &[Order], n: usize) -> Vec<RankedEntry> {
    let mut tally = Tally::new();
    for order in orders {
        for item in &order.items {
            for name in item.itemname.split(',') {
                let name = name.trim();
                if !name.is_empty() {
                    tally.add(name, 1.0);
                }
            }
        }
    }
    ranked(tally.into_pairs(), n)
}

/// One payment-method slice of the revenue breakdown.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentMethodSlice {
    pub method: &'static str,
    pub order_count: u64,
    pub amount: f64,
}

/// Revenue split by payment method, in a fixed bucket order. Empty buckets
/// are omitted.
pub fn payment_method_breakdown(orders: &[Order]) -> Vec<PaymentMethodSlice> {
    const BUCKETS: [PaymentType; 5] = [
        PaymentType::Cash,
        PaymentType::Mpesa,
        PaymentType::Card,
        PaymentType::BankTransfer,
        PaymentType::Other,
    ];

    let mut counts: HashMap<PaymentType, (u64, f64)> = HashMap::new();
    for order in orders {
        let bucket = PaymentType::bucket(&order.payment_type);
        let entry = counts.entry(bucket).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += order.total_price.amount();
    }

    BUCKETS
        .iter()
        .filter_map(|bucket| {
            counts.get(bucket).map(|(count, amount)| PaymentMethodSlice {
                method: bucket.label(),
                order_count: *count,
                amount: *amount,
            })
        })
        .collect()
}

/// The full dashboard payload.
#[derive(Clone, Debug, Serialize)]
pub struct DashboardReport {
    pub window: DateWindow,
    pub orders: OrderStats,
    pub payments: PaymentStats,
    pub customers: BTreeMap<u64, CustomerRollup>,
    pub shops: BTreeMap<String, ShopRollup>,
    pub hotel: HotelRollup,
    pub growth: BusinessGrowth,
    pub monthly_revenue: MonthlySeries,
    pub monthly_hotel_revenue: MonthlySeries,
    pub monthly_expenses_by_shop: BTreeMap<String, MonthlySeries>,
    pub monthly_growth: MonthlySeries,
    pub top_customers: Vec<RankedEntry>,
    pub top_services: Vec<RankedEntry>,
    pub top_items: Vec<RankedEntry>,
    pub payment_methods: Vec<PaymentMethodSlice>,
}

/// How many rows the top-N rankings keep.
pub const TOP_N: usize = 5;

/// Build the full report over window-filtered inputs.
///
/// Records with unparseable dates are excluded by the window filter; they can
/// never be proven inside the window.
pub fn dashboard_report(
    orders: &[Order],
    expenses: &[Expense],
    hotel_orders: &[HotelOrder],
    hotel_expenses: &[HotelExpense],
    window: DateWindow,
    as_of: NaiveDate,
) -> DashboardReport {
    let orders: Vec<Order> = orders
        .iter()
        .filter(|o| o.created_date().map(|d| window.contains(d)).unwrap_or(false))
        .cloned()
        .collect();
    let expenses: Vec<Expense> = expenses
        .iter()
        .filter(|e| e.date().map(|d| window.contains(d)).unwrap_or(false))
        .cloned()
        .collect();
    let hotel_orders: Vec<HotelOrder> = hotel_orders
        .iter()
        .filter(|o| o.created_date().map(|d| window.contains(d)).unwrap_or(false))
        .cloned()
        .collect();
    let hotel_expenses: Vec<HotelExpense> = hotel_expenses
        .iter()
        .filter(|e| e.date().map(|d| window.contains(d)).unwrap_or(false))
        .cloned()
        .collect();

    let year = window.chart_year();
    DashboardReport {
        window,
        orders: order_stats(&orders),
        payments: payment_stats(&orders, as_of),
        customers: customer_rollups(&orders),
        shops: shop_rollups(&orders, &expenses),
        hotel: hotel_rollup(&hotel_orders, &hotel_expenses),
        growth: business_growth(&orders, &expenses, &hotel_orders, &hotel_expenses),
        monthly_revenue: monthly_revenue(&orders, year),
        monthly_hotel_revenue: monthly_hotel_revenue(&hotel_orders, year),
        monthly_expenses_by_shop: monthly_expenses_by_shop(&expenses, year),
        monthly_growth: monthly_business_growth(
            &orders,
            &expenses,
            &hotel_orders,
            &hotel_expenses,
            year,
        ),
        top_customers: top_customers(&orders, TOP_N),
        top_services: top_services(&orders, TOP_N),
        top_items: top_items(&orders, TOP_N),
        payment_methods: payment_method_breakdown(&orders),
    }
}

/// Summary view for one customer's detail screen.
pub fn customer_summary(orders: &[Order], customer: Option<&Customer>) -> CustomerRollup {
    let mut rollup = customer_rollups(orders)
        .into_values()
        .next()
        .unwrap_or_default();
    if let Some(customer) = customer {
        rollup.customer_id = customer.id;
        rollup.name = Some(customer.name.clone());
    }
    rollup
}
