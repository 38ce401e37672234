//! Order lines to weighted transactions.
//!
//! Every line gets a recency weight `exp(-decay_rate * days)`, where `days`
//! is the whole number of calendar days between the line's date and the
//! latest date in the batch. The batch, not the wall clock, anchors the
//! decay, so replaying an old extract yields the same weights.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// One raw order line as read from the order source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: String,
    pub item_id: String,
    pub item_name: String,
    pub observed_at: DateTime<Utc>,
}

impl OrderLine {
    pub fn new(
        order_id: impl Into<String>,
        item_id: impl Into<String>,
        item_name: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            item_id: item_id.into(),
            item_name: item_name.into(),
            observed_at,
        }
    }
}

/// Distinct items of one order with their recency weights
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub order_id: String,
    /// Item display names in first-seen order
    pub items: Vec<String>,
    /// Recency weight per entry of `items`
    pub item_weights: Vec<f64>,
    /// Latest calendar date among the order's lines
    pub observed_on: NaiveDate,
}

impl Transaction {
    /// Mean of the item weights
    pub fn weight(&self) -> f64 {
        if self.item_weights.is_empty() {
            return 0.0;
        }
        self.item_weights.iter().sum::<f64>() / self.item_weights.len() as f64
    }

    pub fn contains_all<S: AsRef<str>>(&self, items: &[S]) -> bool {
        items
            .iter()
            .all(|wanted| self.items.iter().any(|item| item == wanted.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Item name to id lookup built for a single pipeline run.
///
/// When the same name maps to several ids the last line read wins.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    name_to_id: HashMap<String, String>,
    id_to_name: HashMap<String, String>,
}

impl ItemCatalog {
    pub fn from_lines(lines: &[OrderLine]) -> Self {
        let mut catalog = Self::default();
        for line in lines {
            catalog.insert(&line.item_id, &line.item_name);
        }
        catalog
    }

    pub fn insert(&mut self, item_id: &str, item_name: &str) {
        self.name_to_id
            .insert(item_name.to_string(), item_id.to_string());
        self.id_to_name
            .insert(item_id.to_string(), item_name.to_string());
    }

    /// Item id for a display name, or the name itself when unknown
    pub fn id_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.name_to_id.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn name_for(&self, item_id: &str) -> Option<&str> {
        self.id_to_name.get(item_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }
}

/// Output of [`TransactionBuilder::build`]
#[derive(Debug, Clone, Default)]
pub struct TransactionSet {
    /// Ascending by order id
    pub transactions: Vec<Transaction>,
    pub catalog: ItemCatalog,
    /// Number of distinct orders seen in the input
    pub total_orders: usize,
    /// Number of distinct item names seen in the input
    pub distinct_items: usize,
}

impl TransactionSet {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }
}

/// Groups order lines into recency-weighted transactions
#[derive(Debug, Clone, Copy)]
pub struct TransactionBuilder {
    decay_rate: f64,
}

impl TransactionBuilder {
    pub fn new(decay_rate: f64) -> Self {
        Self { decay_rate }
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    /// Weight of a line observed `days_ago` calendar days before the batch maximum
    pub fn recency_weight(&self, days_ago: i64) -> f64 {
        (-self.decay_rate * days_ago as f64).exp()
    }

    pub fn build(&self, lines: &[OrderLine]) -> TransactionSet {
        let Some(max_date) = lines.iter().map(|l| l.observed_at.date_naive()).max() else {
            debug!("No order lines to build transactions from");
            return TransactionSet::default();
        };

        let catalog = ItemCatalog::from_lines(lines);
        let mut orders: BTreeMap<&str, Transaction> = BTreeMap::new();
        let mut seen: HashMap<&str, HashSet<&str>> = HashMap::new();
        let mut min_weight = f64::INFINITY;
        let mut max_weight = f64::NEG_INFINITY;

        for line in lines {
            let date = line.observed_at.date_naive();
            let weight = self.recency_weight((max_date - date).num_days());
            min_weight = min_weight.min(weight);
            max_weight = max_weight.max(weight);

            let transaction = orders
                .entry(line.order_id.as_str())
                .or_insert_with(|| Transaction {
                    order_id: line.order_id.clone(),
                    items: Vec::new(),
                    item_weights: Vec::new(),
                    observed_on: date,
                });
            transaction.observed_on = transaction.observed_on.max(date);

            if seen
                .entry(line.order_id.as_str())
                .or_default()
                .insert(line.item_name.as_str())
            {
                transaction.items.push(line.item_name.clone());
                transaction.item_weights.push(weight);
            }
        }

        let total_orders = orders.len();
        let transactions: Vec<Transaction> = orders
            .into_values()
            .filter(|t| !t.is_empty())
            .collect();

        info!(
            lines = lines.len(),
            transactions = transactions.len(),
            distinct_items = catalog.len(),
            min_weight = min_weight,
            max_weight = max_weight,
            "🧺 Built weighted transactions"
        );

        TransactionSet {
            transactions,
            distinct_items: catalog.len(),
            catalog,
            total_orders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn sample_lines() -> Vec<OrderLine> {
        vec![
            OrderLine::new("o-2", "11", "bread", at(10, 9)),
            OrderLine::new("o-2", "12", "butter", at(10, 9)),
            OrderLine::new("o-1", "12", "butter", at(8, 23)),
            OrderLine::new("o-1", "13", "jam", at(8, 1)),
            OrderLine::new("o-1", "12", "butter", at(8, 2)),
        ]
    }

    #[test]
    fn test_empty_input() {
        let set = TransactionBuilder::new(0.05).build(&[]);
        assert!(set.is_empty());
        assert_eq!(set.total_orders, 0);
        assert!(set.catalog.is_empty());
    }

    #[test]
    fn test_groups_by_order_in_ascending_order() {
        let set = TransactionBuilder::new(0.05).build(&sample_lines());
        let ids: Vec<&str> = set.transactions.iter().map(|t| t.order_id.as_str()).collect();
        assert_eq!(ids, vec!["o-1", "o-2"]);
        assert_eq!(set.transactions[0].items, vec!["butter", "jam"]);
        assert_eq!(set.transactions[1].items, vec!["bread", "butter"]);
        assert_eq!(set.total_orders, 2);
        assert_eq!(set.distinct_items, 3);
    }

    #[test]
    fn test_weights_use_calendar_days_from_batch_max() {
        let set = TransactionBuilder::new(0.05).build(&sample_lines());
        let older = &set.transactions[0];
        let newest = &set.transactions[1];

        // 23:00 on the 8th is still two calendar days before the 10th
        let expected = (-0.05f64 * 2.0).exp();
        assert!((older.item_weights[0] - expected).abs() < 1e-12);
        assert!((older.weight() - expected).abs() < 1e-12);
        assert_eq!(newest.item_weights, vec![1.0, 1.0]);
        assert_eq!(newest.weight(), 1.0);
        assert_eq!(older.observed_on, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());
    }

    #[test]
    fn test_zero_decay_gives_unit_weights() {
        let set = TransactionBuilder::new(0.0).build(&sample_lines());
        assert!(set
            .transactions
            .iter()
            .flat_map(|t| t.item_weights.iter())
            .all(|w| *w == 1.0));
    }

    #[test]
    fn test_catalog_lookup_with_fallback() {
        let catalog = ItemCatalog::from_lines(&sample_lines());
        assert_eq!(catalog.id_for("butter"), "12");
        assert_eq!(catalog.id_for("caviar"), "caviar");
        assert_eq!(catalog.name_for("13"), Some("jam"));
        assert_eq!(catalog.name_for("99"), None);
    }

    #[test]
    fn test_contains_all() {
        let set = TransactionBuilder::new(0.05).build(&sample_lines());
        let t = &set.transactions[0];
        assert!(t.contains_all(&["jam", "butter"]));
        assert!(!t.contains_all(&["jam", "bread"]));
    }
}
