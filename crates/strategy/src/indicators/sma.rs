/// Simple moving average of the last `window` prices (oldest first).
///
/// Returns `None` if `window` is zero or there are fewer than `window` prices.
pub fn sma(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window {
        return None;
    }
    let tail = &prices[prices.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}
