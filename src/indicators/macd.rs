/// Exponential moving average series
///
/// Standard recursive EMA with `alpha = 2 / (span + 1)`, seeded with the
/// first value. Returns one value per input value.
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    if values.is_empty() || span == 0 {
        return Vec::new();
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = values[0];
    out.push(ema);

    for &value in &values[1..] {
        ema = (value - ema) * alpha + ema;
        out.push(ema);
    }

    out
}

/// Latest EMA value over the series
pub fn calculate_ema(values: &[f64], span: usize) -> Option<f64> {
    ema_series(values, span).last().copied()
}

/// Calculate MACD line and its signal line
///
/// MACD line = EMA(fast) - EMA(slow); signal line = EMA of the MACD line.
/// Returns `(macd_line, signal_line)` at the last index.
pub fn calculate_macd(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Option<(f64, f64)> {
    if prices.len() < 2 || fast == 0 || slow == 0 || signal == 0 {
        return None;
    }

    let ema_fast = ema_series(prices, fast);
    let ema_slow = ema_series(prices, slow);

    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = ema_series(&macd_line, signal);

    match (macd_line.last(), signal_line.last()) {
        (Some(&m), Some(&s)) => Some((m, s)),
        _ => None,
    }
}
