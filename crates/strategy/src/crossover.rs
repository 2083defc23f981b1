use crate::indicators::sma;

/// Why a crossover evaluation produced no order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer closes than the long window.
    InsufficientData,
    /// Latest close is zero, negative or not finite.
    NoPrice,
    /// Trade amount does not cover a single share.
    InsufficientFunds,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InsufficientData => write!(f, "not enough bars"),
            SkipReason::NoPrice => write!(f, "no usable latest price"),
            SkipReason::InsufficientFunds => write!(f, "trade amount below one share"),
        }
    }
}

/// Outcome of one crossover evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Buy(f64),
    Sell(f64),
    Hold,
    Skip(SkipReason),
}

/// Short/long simple moving average crossover.
///
/// Bullish (short > long) buys with `trade_amount` when flat; bearish
/// (short < long) sells the whole position when long. Equal averages hold.
#[derive(Debug, Clone)]
pub struct MovingAverageCrossover {
    pub short_window: usize,
    pub long_window: usize,
    pub trade_amount: f64,
}

impl MovingAverageCrossover {
    pub fn new(short_window: usize, long_window: usize, trade_amount: f64) -> Self {
        assert!(short_window >= 1, "short window must be >= 1");
        assert!(
            short_window < long_window,
            "short window must be less than long window"
        );
        Self {
            short_window,
            long_window,
            trade_amount,
        }
    }

    /// `(short, long)` averages, or `None` with fewer than `long_window` closes.
    pub fn averages(&self, closes: &[f64]) -> Option<(f64, f64)> {
        Some((sma(closes, self.short_window)?, sma(closes, self.long_window)?))
    }

    /// Decide what to do given closes (oldest first) and the quantity held.
    pub fn decide(&self, closes: &[f64], position_qty: f64) -> Decision {
        let Some((short, long)) = self.averages(closes) else {
            return Decision::Skip(SkipReason::InsufficientData);
        };

        let latest = closes[closes.len() - 1];
        if !latest.is_finite() || latest <= 0.0 {
            return Decision::Skip(SkipReason::NoPrice);
        }

        if short > long {
            if position_qty != 0.0 {
                return Decision::Hold;
            }
            let qty = (self.trade_amount / latest).floor();
            if qty <= 0.0 || !qty.is_finite() {
                return Decision::Skip(SkipReason::InsufficientFunds);
            }
            Decision::Buy(qty)
        } else if short < long && position_qty > 0.0 {
            Decision::Sell(position_qty)
        } else {
            Decision::Hold
        }
    }
}
