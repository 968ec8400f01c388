//! Technical indicators
//!
//! Scalar EMA and ATR over a price window. Each returns the value at the
//! end of the window, or `None` when the window is too short.

/// Exponential moving average of `values`, seeded with the SMA of the first
/// `period` samples.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    Some(
        values[period..]
            .iter()
            .fold(seed, |e, &x| x * k + e * (1.0 - k)),
    )
}

/// True range for each candle after the first.
///
/// `tr[i-1] = max(high[i]-low[i], |high[i]-close[i-1]|, |low[i]-close[i-1]|)`
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    (1..n)
        .map(|i| {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

/// Average true range: plain mean of the last `period` true-range samples.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Option<f64> {
    let tr = true_range(high, low, close);
    if period == 0 || tr.len() < period {
        return None;
    }

    let tail = &tr[tr.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// ATR as a percentage of price
pub fn atr_pct(atr: f64, price: f64) -> Option<f64> {
    if price <= 0.0 {
        return None;
    }
    Some(atr / price * 100.0)
}
