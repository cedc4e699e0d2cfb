//! Canonical record types and defensive field parsing.
//!
//! Records are normalized at the fetch boundary: source variants embed either
//! a full customer object or a bare id on each order, and money fields arrive
//! as decimal-as-string, plain numbers, or garbage. Everything downstream of
//! this module sees one canonical shape, and every dirty-data decision lives
//! in one visible place (`money`, `dates`) instead of scattered catch blocks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Defensive money parsing.
///
/// The one place where dirty financial input is allowed to collapse to zero.
/// Call sites use [`money::or_zero`] so the swallowing is a single testable
/// decision; a financial dashboard must never crash on `total_price: "N/A"`.
pub mod money {
    /// A money field that could not be parsed.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ParseError {
        pub raw: String,
    }

    impl std::fmt::Display for ParseError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "unparseable money value: {:?}", self.raw)
        }
    }

    /// Parse a decimal-as-string money value.
    ///
    /// Accepts thousands separators ("1,250.00"). Rejects empty input and
    /// non-finite values.
    pub fn parse(raw: &str) -> Result<f64, ParseError> {
        let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
        if cleaned.is_empty() {
            return Err(ParseError {
                raw: raw.to_string(),
            });
        }
        cleaned
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ParseError {
                raw: raw.to_string(),
            })
    }

    /// Collapse a parse failure to zero.
    pub fn or_zero(raw: &str) -> f64 {
        parse(raw).unwrap_or(0.0)
    }
}

/// Defensive timestamp parsing.
///
/// `created_at` is the source of truth for all date filtering, but the wire
/// formats vary (RFC 3339 from the API, "YYYY-MM-DD HH:MM" from admin
/// exports, bare dates on expense ledgers). Unparseable dates yield `None`
/// and are excluded from window filtering and max-date calculations.
pub mod dates {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};

    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    /// Parse a timestamp in any of the wire formats.
    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_utc());
        }
        for format in FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(dt);
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    /// Parse just the calendar date.
    pub fn parse_date(raw: &str) -> Option<NaiveDate> {
        parse(raw).map(|dt| dt.date())
    }
}

/// A money field as it appears on the wire: decimal-as-string or a bare
/// number. Parsed defensively via [`money`]; missing fields default to an
/// empty string, which reads as zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Money {
    Text(String),
    Number(f64),
}

impl Default for Money {
    fn default() -> Self {
        Money::Text(String::new())
    }
}

impl Money {
    /// Numeric value, with parse failures collapsed to zero.
    pub fn amount(&self) -> f64 {
        match self {
            Money::Text(raw) => money::or_zero(raw),
            Money::Number(n) if n.is_finite() => *n,
            Money::Number(_) => 0.0,
        }
    }
}

/// Order lifecycle status.
///
/// Wire strings are the Django choice values, including the historical
/// capitalized variants. Unknown statuses fold into `Pending`, matching the
/// model default, rather than dropping the order from financial totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Delivered_picked")]
    DeliveredPicked,
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl From<String> for OrderStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" => OrderStatus::Completed,
            "delivered_picked" | "delivered" | "picked" => OrderStatus::DeliveredPicked,
            "processing" => OrderStatus::Processing,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            _ => OrderStatus::Pending,
        }
    }
}

/// Payment progress on an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum PaymentStatus {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "partial")]
    Partial,
    #[serde(rename = "completed")]
    Completed,
}

impl From<String> for PaymentStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "partial" => PaymentStatus::Partial,
            "completed" | "complete" => PaymentStatus::Completed,
            _ => PaymentStatus::Pending,
        }
    }
}

/// Free-form payment type bucketed into the fixed reporting set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PaymentType {
    Cash,
    Mpesa,
    Card,
    BankTransfer,
    Other,
}

impl PaymentType {
    /// Bucket a raw payment-type string.
    pub fn bucket(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cash" => PaymentType::Cash,
            "m-pesa" | "mpesa" => PaymentType::Mpesa,
            "card" | "credit" | "debit" | "credit/debit card" => PaymentType::Card,
            "bank_transfer" | "bank transfer" | "bank" => PaymentType::BankTransfer,
            _ => PaymentType::Other,
        }
    }

    /// Display label used in breakdowns.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentType::Cash => "cash",
            PaymentType::Mpesa => "M-Pesa",
            PaymentType::Card => "card",
            PaymentType::BankTransfer => "bank_transfer",
            PaymentType::Other => "other",
        }
    }
}

/// A laundry customer.
///
/// Derived fields (order counts, balances, last-activity date) are never
/// stored here; they are views computed from the order collection by the
/// aggregator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Customer {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

/// One line item on a laundry order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(default)]
    pub servicetype: ServiceTypes,
    /// Comma-separated item names, split by the aggregator.
    #[serde(default)]
    pub itemname: String,
}

/// Service types on an item: a list in newer payloads, a single string in
/// older ones.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceTypes {
    Many(Vec<String>),
    One(String),
}

impl Default for ServiceTypes {
    fn default() -> Self {
        ServiceTypes::Many(Vec::new())
    }
}

impl ServiceTypes {
    /// Flatten to a list of non-empty service names.
    pub fn names(&self) -> Vec<&str> {
        match self {
            ServiceTypes::Many(list) => list
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect(),
            ServiceTypes::One(s) => {
                let s = s.trim();
                if s.is_empty() {
                    Vec::new()
                } else {
                    vec![s]
                }
            }
        }
    }
}

/// A laundry order, normalized to one canonical shape.
///
/// `customer_id` is always present; `customer_name` is populated either from
/// the embedded customer object or by [`resolve_customer_names`], so the
/// aggregator never branches on wire shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "WireOrder")]
pub struct Order {
    pub id: u64,
    pub uniquecode: String,
    pub customer_id: u64,
    pub customer_name: Option<String>,
    pub shop: String,
    pub payment_type: String,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub total_price: Money,
    pub amount_paid: Money,
    pub balance: Money,
    pub created_at: String,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Parsed creation timestamp, if the wire value is usable.
    pub fn created_at(&self) -> Option<chrono::NaiveDateTime> {
        dates::parse(&self.created_at)
    }

    /// Parsed creation date, if the wire value is usable.
    pub fn created_date(&self) -> Option<chrono::NaiveDate> {
        dates::parse_date(&self.created_at)
    }
}

/// Customer reference as it appears on the wire: a bare id or an embedded
/// object.
#[derive(Deserialize)]
#[serde(untagged)]
enum CustomerRef {
    Id(u64),
    Embedded {
        id: u64,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Deserialize)]
struct WireOrder {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    uniquecode: String,
    #[serde(default)]
    customer: Option<CustomerRef>,
    #[serde(default)]
    customer_id: Option<u64>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    shop: String,
    #[serde(default)]
    payment_type: String,
    #[serde(default)]
    payment_status: PaymentStatus,
    #[serde(default)]
    order_status: OrderStatus,
    #[serde(default)]
    total_price: Money,
    #[serde(default)]
    amount_paid: Money,
    #[serde(default)]
    balance: Money,
    #[serde(default)]
    created_at: String,
    #[serde(default, alias = "order_items")]
    items: Vec<OrderItem>,
}

impl From<WireOrder> for Order {
    fn from(wire: WireOrder) -> Self {
        let (ref_id, ref_name) = match wire.customer {
            Some(CustomerRef::Id(id)) => (Some(id), None),
            Some(CustomerRef::Embedded { id, name }) => (Some(id), name),
            None => (None, None),
        };

        Order {
            id: wire.id,
            uniquecode: wire.uniquecode,
            customer_id: wire.customer_id.or(ref_id).unwrap_or(0),
            customer_name: wire.customer_name.or(ref_name),
            shop: wire.shop,
            payment_type: wire.payment_type,
            payment_status: wire.payment_status,
            order_status: wire.order_status,
            total_price: wire.total_price,
            amount_paid: wire.amount_paid,
            balance: wire.balance,
            created_at: wire.created_at,
            items: wire.items,
        }
    }
}

/// A laundry expense ledger entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expense {
    pub id: u64,
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default)]
    pub amount: Money,
    #[serde(default)]
    pub date: String,
}

impl Expense {
    pub fn date(&self) -> Option<chrono::NaiveDate> {
        dates::parse_date(&self.date)
    }
}

/// One line item on a hotel order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HotelOrderItem {
    #[serde(default)]
    pub price: Money,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub oncredit: bool,
}

fn one() -> u32 {
    1
}

/// A hotel order with nested items.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HotelOrder {
    pub id: u64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, alias = "order_items")]
    pub items: Vec<HotelOrderItem>,
}

impl HotelOrder {
    pub fn created_date(&self) -> Option<chrono::NaiveDate> {
        dates::parse_date(&self.created_at)
    }

    /// Revenue from non-credit items: Σ price × quantity.
    pub fn revenue(&self) -> f64 {
        self.items
            .iter()
            .filter(|item| !item.oncredit)
            .map(|item| item.price.amount() * f64::from(item.quantity))
            .sum()
    }
}

/// A hotel expense ledger entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HotelExpense {
    pub id: u64,
    #[serde(default)]
    pub amount: Money,
    #[serde(default)]
    pub date: String,
}

impl HotelExpense {
    pub fn date(&self) -> Option<chrono::NaiveDate> {
        dates::parse_date(&self.date)
    }
}

/// Decode raw drained rows into typed records, skipping rows that do not
/// deserialize instead of failing the whole collection.
pub fn decode_records<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Vec<T> {
    let total = rows.len();
    let records: Vec<T> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect();

    if records.len() < total {
        warn!(
            "⚠ Skipped {} of {} malformed records during decode",
            total - records.len(),
            total
        );
    }
    records
}

/// Fill in missing `customer_name` fields from the customer collection.
pub fn resolve_customer_names(orders: &mut [Order], customers: &[Customer]) {
    use std::collections::HashMap;

    let by_id: HashMap<u64, &str> = customers
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();

    for order in orders.iter_mut() {
        if order.customer_name.is_none() {
            order.customer_name = by_id.get(&order.customer_id).map(|n| n.to_string());
        }
    }
}
