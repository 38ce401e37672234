use super::transactions::Transaction;
use std::collections::BTreeSet;

/// One-hot basket matrix handed to the itemset primitive.
///
/// Columns are the distinct item names in sorted order, rows follow the
/// transaction order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasketMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<bool>>,
}

impl BasketMatrix {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let columns: Vec<String> = transactions
            .iter()
            .flat_map(|t| t.items.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = transactions
            .iter()
            .map(|t| {
                columns
                    .iter()
                    .map(|column| t.items.iter().any(|item| item == column))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<bool>] {
        &self.rows
    }

    pub fn num_items(&self) -> usize {
        self.columns.len()
    }

    pub fn num_transactions(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    pub fn column_index(&self, item: &str) -> Option<usize> {
        self.columns.binary_search_by(|c| c.as_str().cmp(item)).ok()
    }

    /// Fraction of rows containing every item of `items`; unknown items give 0
    pub fn support_of<S: AsRef<str>>(&self, items: &[S]) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let Some(indices) = items
            .iter()
            .map(|item| self.column_index(item.as_ref()))
            .collect::<Option<Vec<_>>>()
        else {
            return 0.0;
        };

        let hits = self
            .rows
            .iter()
            .filter(|row| indices.iter().all(|&i| row[i]))
            .count();
        hits as f64 / self.rows.len() as f64
    }

    /// Share of cells that are set
    pub fn density(&self) -> f64 {
        let cells = self.num_items() * self.num_transactions();
        if cells == 0 {
            return 0.0;
        }
        let set = self.rows.iter().flatten().filter(|cell| **cell).count();
        set as f64 / cells as f64
    }
}
