//! Currency lots and their partial liquidations.

use chrono::NaiveDate;

/// Dust tolerance for settlement, in currency units.
pub const SETTLE_EPSILON: f64 = 0.01;

/// Exchange rates below this are treated as a corrupt data feed.
pub const MIN_EXCHANGE_RATE: f64 = 0.0001;

/// One partial sale of a lot.
#[derive(Debug, Clone, PartialEq)]
pub struct SellInfo {
    pub t4: NaiveDate,
    pub er_t4: f64,
    pub t4_c2_sold: f64,
    /// C2 still held in the lot after this chunk.
    pub t4_c2_remaining: f64,
    pub t4_c1: f64,
    pub fee: f64,
    /// C1 received, net of fee, minus the cost basis of the C2 sold.
    pub profit: f64,
    pub profitable: bool,
}

/// A single C1 -> C2 purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct Investment {
    pub t3: NaiveDate,
    pub er_t3: f64,
    pub t3_c1: f64,
    pub t3_c2_buy: f64,
    pub fee: f64,
    pub t3_balance_c1: f64,
    pub t3_balance_c2: f64,
    /// Date of the latest sale.
    pub t4: Option<NaiveDate>,
    pub er_t4: f64,
    pub t4_c2_sold: f64,
    pub t4_c1: f64,
    pub t4_balance_c1: f64,
    pub t4_balance_c2: f64,
    pub completed: bool,
    /// A zero-amount entry that only records a flat sell fee.
    pub bookkeeping: bool,
    pub chunks: Vec<SellInfo>,
}

impl Investment {
    pub fn buy(t3: NaiveDate, er_t3: f64, t3_c1: f64, fee: f64) -> Self {
        Investment {
            t3,
            er_t3,
            t3_c1,
            t3_c2_buy: t3_c1 * er_t3,
            fee,
            t3_balance_c1: 0.0,
            t3_balance_c2: 0.0,
            t4: None,
            er_t4: 0.0,
            t4_c2_sold: 0.0,
            t4_c1: 0.0,
            t4_balance_c1: 0.0,
            t4_balance_c2: 0.0,
            completed: false,
            bookkeeping: false,
            chunks: Vec::new(),
        }
    }

    pub fn fee_entry(t4: NaiveDate, er_t4: f64, fee: f64) -> Self {
        Investment {
            t4: Some(t4),
            er_t4,
            completed: true,
            bookkeeping: true,
            ..Investment::buy(t4, er_t4, 0.0, fee)
        }
    }

    pub fn is_open(&self) -> bool {
        !self.completed && !self.bookkeeping
    }

    pub fn remaining_c2(&self) -> f64 {
        (self.t3_c2_buy - self.t4_c2_sold).max(0.0)
    }

    /// How far today's rate has moved against the purchase rate; above 1 is a loss.
    pub fn loss_ratio(&self) -> f64 {
        if self.er_t3 > 0.0 {
            self.er_t4 / self.er_t3
        } else {
            0.0
        }
    }

    /// Sells up to `amount` C2 at `er_t4` and records the chunk.
    /// Returns the chunk; the caller applies it to the balances.
    pub fn sell_chunk(
        &mut self,
        t4: NaiveDate,
        er_t4: f64,
        amount: f64,
        fee_factor: f64,
    ) -> SellInfo {
        let sold = amount.min(self.remaining_c2());
        let c1 = sold / er_t4;
        let fee = c1 * fee_factor;
        let cost_basis = if self.t3_c2_buy > 0.0 {
            self.t3_c1 * sold / self.t3_c2_buy
        } else {
            0.0
        };

        self.er_t4 = er_t4;
        self.t4 = Some(t4);
        self.t4_c2_sold += sold;
        self.t4_c1 += c1;
        self.completed = self.t4_c2_sold + SETTLE_EPSILON >= self.t3_c2_buy;

        let chunk = SellInfo {
            t4,
            er_t4,
            t4_c2_sold: sold,
            t4_c2_remaining: self.remaining_c2(),
            t4_c1: c1,
            fee,
            profit: c1 - fee - cost_basis,
            profitable: er_t4 < self.er_t3,
        };
        self.chunks.push(chunk.clone());
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn buy_converts_at_rate() {
        let lot = Investment::buy(d(1), 150.21, 100.0, 0.0);
        assert_relative_eq!(lot.t3_c2_buy, 15021.0, epsilon = 1e-9);
        assert!(lot.is_open());
    }

    #[test]
    fn partial_then_full_sale() {
        let mut lot = Investment::buy(d(1), 150.21, 100.0, 0.0);
        let chunk = lot.sell_chunk(d(3), 149.30, 7510.5, 0.0);
        assert_relative_eq!(chunk.t4_c2_sold, 7510.5);
        assert_relative_eq!(chunk.t4_c1, 7510.5 / 149.30);
        assert!(chunk.profitable);
        assert!(chunk.profit > 0.0);
        assert!(!lot.completed);

        let chunk = lot.sell_chunk(d(4), 151.0, 1e9, 0.0);
        assert_relative_eq!(chunk.t4_c2_sold, 7510.5, epsilon = 1e-6);
        assert!(!chunk.profitable);
        assert!(lot.completed);
        assert_eq!(lot.chunks.len(), 2);
        assert_relative_eq!(lot.remaining_c2(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn proportional_fee_on_chunk() {
        let mut lot = Investment::buy(d(1), 100.0, 10.0, 0.0);
        let chunk = lot.sell_chunk(d(2), 100.0, 1000.0, 0.01);
        assert_relative_eq!(chunk.t4_c1, 10.0);
        assert_relative_eq!(chunk.fee, 0.1);
        assert_relative_eq!(chunk.profit, -0.1);
    }

    #[test]
    fn dust_completes_lot() {
        let mut lot = Investment::buy(d(1), 100.0, 10.0, 0.0);
        lot.sell_chunk(d(2), 100.0, 999.995, 0.0);
        assert!(lot.completed);
    }

    #[test]
    fn fee_entry_is_closed_bookkeeping() {
        let e = Investment::fee_entry(d(5), 140.0, 2.5);
        assert!(e.bookkeeping);
        assert!(!e.is_open());
        assert_eq!(e.t3_c2_buy, 0.0);
        assert_eq!(e.fee, 2.5);
    }
}
