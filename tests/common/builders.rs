use affinity_core::mining::OrderLine;
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Fixed reference instant so weights are reproducible
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
}

/// Builder for order-line fixtures
#[derive(Debug, Default)]
pub struct OrderLinesBuilder {
    lines: Vec<OrderLine>,
}

impl OrderLinesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One order containing `items`, observed `days_ago` days before [`base_time`].
    /// Item ids are derived from the names (`coffee` -> `sku-coffee`).
    pub fn order(mut self, order_id: &str, days_ago: i64, items: &[&str]) -> Self {
        let observed_at = base_time() - Duration::days(days_ago);
        for item in items {
            self.lines.push(OrderLine::new(
                order_id,
                format!("sku-{item}"),
                *item,
                observed_at,
            ));
        }
        self
    }

    /// `count` identical orders, ids prefixed with `prefix`
    pub fn repeated(mut self, prefix: &str, count: usize, days_ago: i64, items: &[&str]) -> Self {
        for i in 0..count {
            self = self.order(&format!("{prefix}-{i:03}"), days_ago, items);
        }
        self
    }

    pub fn build(self) -> Vec<OrderLine> {
        self.lines
    }
}

/// A small grocery data set with a strong coffee/milk association
pub fn grocery_lines() -> Vec<OrderLine> {
    OrderLinesBuilder::new()
        .repeated("cm", 6, 1, &["coffee", "milk"])
        .repeated("cms", 2, 3, &["coffee", "milk", "sugar"])
        .repeated("b", 2, 2, &["bread"])
        .build()
}
