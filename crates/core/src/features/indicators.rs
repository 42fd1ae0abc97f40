//! Indicator math over a single, date-ordered series.
//!
//! Every function returns one value per input row. `None` marks rows where the window lacks
//! history or the arithmetic is undefined (division by zero, non-finite input).

/// Per-row values; `None` where undefined.
pub type Series = Vec<Option<f64>>;

pub fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

pub fn defined(values: &[f64]) -> Series {
    values.iter().map(|&v| finite(v)).collect()
}

/// Elementwise combination of two equal-length series.
pub fn zip_with(a: &[Option<f64>], b: &[Option<f64>], f: impl Fn(f64, f64) -> f64) -> Series {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => finite(f(*x, *y)),
            _ => None,
        })
        .collect()
}

/// Value `lag` rows earlier.
pub fn shift(values: &[f64], lag: usize) -> Series {
    (0..values.len())
        .map(|i| i.checked_sub(lag).and_then(|j| finite(values[j])))
        .collect()
}

/// Day-over-day change in percent, computed as `(x[i] / x[i-1] - 1) * 100`.
pub fn pct_change(values: &[f64]) -> Series {
    (0..values.len())
        .map(|i| match i {
            0 => None,
            _ => finite((values[i] / values[i - 1] - 1.0) * 100.0),
        })
        .collect()
}

/// Rate of change over `period` rows, in percent.
pub fn rate_of_change(values: &[f64], period: usize) -> Series {
    (0..values.len())
        .map(|i| {
            let j = i.checked_sub(period)?;
            finite((values[i] - values[j]) / values[j] * 100.0)
        })
        .collect()
}

fn window(series: &[Option<f64>], end: usize, len: usize) -> Option<Vec<f64>> {
    let start = (end + 1).checked_sub(len)?;
    series[start..=end].iter().copied().collect()
}

/// Simple moving average; undefined until `period` defined values are available.
pub fn rolling_mean(series: &[Option<f64>], period: usize) -> Series {
    assert!(period > 0, "rolling window must be positive");
    (0..series.len())
        .map(|i| {
            let w = window(series, i, period)?;
            finite(w.iter().sum::<f64>() / period as f64)
        })
        .collect()
}

/// Rolling sample standard deviation (n - 1 denominator).
pub fn rolling_std(series: &[Option<f64>], period: usize) -> Series {
    assert!(period > 1, "sample std needs a window of at least 2");
    (0..series.len())
        .map(|i| {
            let w = window(series, i, period)?;
            let mean = w.iter().sum::<f64>() / period as f64;
            let var = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
            finite(var.sqrt())
        })
        .collect()
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the first value and
/// without bias adjustment.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// RSI from simple means of gains and losses over `period` deltas.
///
/// The first row has no delta and contributes zero gain and zero loss. A window without losses
/// saturates at 100.
pub fn rsi(closes: &[f64], period: usize) -> Series {
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let delta = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        gains.push(Some(delta.max(0.0)));
        losses.push(Some((-delta).max(0.0)));
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| {
            let (g, l) = ((*g)?, (*l)?);
            if l == 0.0 {
                return Some(100.0);
            }
            finite(100.0 - 100.0 / (1.0 + g / l))
        })
        .collect()
}

pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD line `EMA(fast) - EMA(slow)`, its EMA(`signal`) and the difference of the two.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast = ema(closes, fast);
    let slow = ema(closes, slow);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema(&line, signal);
    let histogram = line.iter().zip(&signal).map(|(m, s)| m - s).collect();
    Macd {
        line,
        signal,
        histogram,
    }
}

/// True range; the first row has no previous close and uses `high - low`.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                return hl;
            }
            let prev_close = close[i - 1];
            hl.max((high[i] - prev_close).abs())
                .max((low[i] - prev_close).abs())
        })
        .collect()
}

/// Average true range as a simple mean of the true range.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Series {
    rolling_mean(&defined(&true_range(high, low, close)), period)
}

pub struct Bollinger {
    pub std: Series,
    pub upper: Series,
    pub lower: Series,
    /// `(close - lower) / (upper - lower)`; undefined when the band has zero width.
    pub position: Series,
}

pub fn bollinger(closes: &[f64], middle: &[Option<f64>], period: usize, k: f64) -> Bollinger {
    let close = defined(closes);
    let std = rolling_std(&close, period);
    let upper = zip_with(middle, &std, |m, s| m + k * s);
    let lower = zip_with(middle, &std, |m, s| m - k * s);
    let position = close
        .iter()
        .zip(upper.iter().zip(&lower))
        .map(|(c, (u, l))| {
            let (c, u, l) = ((*c)?, (*u)?, (*l)?);
            let width = u - l;
            if width == 0.0 {
                return None;
            }
            finite((c - l) / width)
        })
        .collect();
    Bollinger {
        std,
        upper,
        lower,
        position,
    }
}

/// 1 when the close rose versus the previous row, else 0 (including the first row).
pub fn up_direction(closes: &[f64]) -> Vec<f64> {
    (0..closes.len())
        .map(|i| if i > 0 && closes[i] > closes[i - 1] { 1.0 } else { 0.0 })
        .collect()
}

/// Length of the same-direction run each row belongs to.
///
/// Every row of a run carries the full run length, matching the training-time definition.
pub fn consecutive_trend(direction: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; direction.len()];
    let mut start = 0;
    while start < direction.len() {
        let mut end = start;
        while end + 1 < direction.len() && direction[end + 1] == direction[start] {
            end += 1;
        }
        let len = (end - start + 1) as f64;
        out[start..=end].iter_mut().for_each(|v| *v = len);
        start = end + 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn rolling_mean_needs_full_window() {
        let s = defined(&[1.0, 2.0, 3.0, 4.0]);
        let m = rolling_mean(&s, 3);
        assert_eq!(m[0], None);
        assert_eq!(m[1], None);
        assert_eq!(m[2], Some(2.0));
        assert_eq!(m[3], Some(3.0));
    }

    #[test]
    fn rolling_mean_skips_windows_with_gaps() {
        let s = vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)];
        let m = rolling_mean(&s, 2);
        assert_eq!(m, vec![None, None, None, Some(3.5), Some(4.5)]);
    }

    #[test]
    fn rolling_std_is_sample_deviation() {
        let s = defined(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let sd = rolling_std(&s, 8);
        // Sample variance of this set is 32 / 7.
        assert!(approx(sd[7].unwrap(), (32.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn ema_is_seeded_with_first_value() {
        let e = ema(&[10.0, 20.0], 3);
        assert_eq!(e[0], 10.0);
        assert!(approx(e[1], 15.0));
    }

    #[test]
    fn rsi_saturates_without_losses() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let r = rsi(&closes, 14);
        assert_eq!(r[12], None);
        assert_eq!(r[13], Some(100.0));
        assert_eq!(r[29], Some(100.0));
    }

    #[test]
    fn rsi_flat_series_is_saturated_not_nan() {
        let closes = vec![5.0; 20];
        let r = rsi(&closes, 14);
        assert_eq!(r[19], Some(100.0));
    }

    #[test]
    fn rsi_balanced_moves_is_fifty() {
        // Alternate +1 / -1 so the last 14 deltas hold seven gains and seven losses.
        let closes: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let r = rsi(&closes, 14);
        assert!(approx(r[29].unwrap(), 50.0));
    }

    #[test]
    fn true_range_uses_previous_close_gaps() {
        let high = [10.0, 12.0];
        let low = [9.0, 11.5];
        let close = [9.5, 12.0];
        let tr = true_range(&high, &low, &close);
        assert_eq!(tr[0], 1.0);
        // |12 - 9.5| dominates the 0.5 intraday range.
        assert_eq!(tr[1], 2.5);
    }

    #[test]
    fn bollinger_position_undefined_for_flat_band() {
        let closes = vec![7.0; 25];
        let mid = rolling_mean(&defined(&closes), 20);
        let bb = bollinger(&closes, &mid, 20, 2.0);
        assert_eq!(bb.std[24], Some(0.0));
        assert_eq!(bb.position[24], None);
    }

    #[test]
    fn pct_change_and_roc() {
        let v = [100.0, 110.0, 99.0];
        let pc = pct_change(&v);
        assert_eq!(pc[0], None);
        assert!(approx(pc[1].unwrap(), 10.0));
        let roc = rate_of_change(&v, 2);
        assert!(approx(roc[2].unwrap(), -1.0));
    }

    #[test]
    fn pct_change_from_zero_is_undefined() {
        let pc = pct_change(&[0.0, 5.0]);
        assert_eq!(pc[1], None);
    }

    #[test]
    fn consecutive_trend_marks_whole_runs() {
        let dir = [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0];
        assert_eq!(
            consecutive_trend(&dir),
            vec![1.0, 3.0, 3.0, 3.0, 2.0, 2.0, 1.0]
        );
    }

    #[test]
    fn up_direction_first_row_is_down() {
        assert_eq!(up_direction(&[1.0, 2.0, 2.0, 1.0]), vec![0.0, 1.0, 0.0, 0.0]);
    }
}
