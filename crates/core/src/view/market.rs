use std::collections::HashMap;

use crate::models::{AdminSnapshot, ItemCode};

/// Price movement since the previous poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    /// Higher than last seen.
    Up,
    /// Lower than last seen.
    Down,
    /// Unchanged, or seen for the first time.
    Same,
}

/// One line of the market table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRow {
    /// Item code.
    pub code: ItemCode,
    /// Catalog label, or the code when the catalog lacks it.
    pub label: String,
    /// Current clearing price.
    pub price: i64,
    /// Movement against the previous poll.
    pub trend: Trend,
}

/// Market table that remembers the last price of every item.
#[derive(Debug, Clone, Default)]
pub struct PriceBoard {
    last: HashMap<ItemCode, i64>,
    rows: Vec<PriceRow>,
}

impl PriceBoard {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows in item-code order.
    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    /// Diff the snapshot's prices against the previous poll.
    ///
    /// Returns whether the rows changed. Items that drop out of the price map
    /// keep their last price so a later return still shows a trend.
    pub fn refresh(&mut self, snapshot: &AdminSnapshot) -> bool {
        let mut prices: Vec<(&ItemCode, i64)> = snapshot
            .market_prices
            .iter()
            .map(|(code, price)| (code, *price))
            .collect();
        prices.sort_by(|a, b| a.0.cmp(b.0));

        let rows: Vec<PriceRow> = prices
            .into_iter()
            .map(|(code, price)| {
                let previous = self.last.insert(code.clone(), price).unwrap_or(price);
                let trend = match price.cmp(&previous) {
                    std::cmp::Ordering::Greater => Trend::Up,
                    std::cmp::Ordering::Less => Trend::Down,
                    std::cmp::Ordering::Equal => Trend::Same,
                };
                PriceRow {
                    code: code.clone(),
                    label: snapshot.label_of(code).to_string(),
                    price,
                    trend,
                }
            })
            .collect();

        if rows == self.rows {
            return false;
        }
        self.rows = rows;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(prices: &str) -> AdminSnapshot {
        let raw = format!(
            r#"{{"phase": 3, "market_prices": {prices},
                "items_meta": {{"iron_0": {{"label": "Iron Ore", "tier": 0, "base_price": 100}}}}}}"#
        );
        serde_json::from_str(&raw).expect("test snapshot decodes")
    }

    fn trends(board: &PriceBoard) -> Vec<(&str, Trend)> {
        board
            .rows()
            .iter()
            .map(|row| (row.code.as_str(), row.trend))
            .collect()
    }

    #[test]
    fn first_sighting_is_flat() {
        let mut board = PriceBoard::new();
        assert!(board.refresh(&snapshot(r#"{"iron_0": 100, "gold_0": 40}"#)));
        assert_eq!(
            trends(&board),
            [("gold_0", Trend::Same), ("iron_0", Trend::Same)]
        );
        assert_eq!(board.rows()[1].label, "Iron Ore");
        assert_eq!(board.rows()[0].label, "gold_0");
    }

    #[test]
    fn trends_follow_the_previous_poll() {
        let mut board = PriceBoard::new();
        board.refresh(&snapshot(r#"{"iron_0": 100, "gold_0": 40}"#));

        assert!(board.refresh(&snapshot(r#"{"iron_0": 120, "gold_0": 30}"#)));
        assert_eq!(
            trends(&board),
            [("gold_0", Trend::Down), ("iron_0", Trend::Up)]
        );

        // Holding steady flattens the trend again.
        assert!(board.refresh(&snapshot(r#"{"iron_0": 120, "gold_0": 30}"#)));
        assert_eq!(
            trends(&board),
            [("gold_0", Trend::Same), ("iron_0", Trend::Same)]
        );
        assert!(!board.refresh(&snapshot(r#"{"iron_0": 120, "gold_0": 30}"#)));
    }

    #[test]
    fn returning_item_compares_with_its_last_price() {
        let mut board = PriceBoard::new();
        board.refresh(&snapshot(r#"{"iron_0": 100}"#));
        board.refresh(&snapshot(r#"{}"#));
        assert!(board.rows().is_empty());

        board.refresh(&snapshot(r#"{"iron_0": 90}"#));
        assert_eq!(trends(&board), [("iron_0", Trend::Down)]);
    }
}
