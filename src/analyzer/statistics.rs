// Descriptive statistics over sample-ordered series.
//
// Every function returns None (or an empty Vec) instead of dividing by zero.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation with the n-1 denominator. Needs at least two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Standard deviation with the n denominator.
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Differences between consecutive values (`v[i] - v[i-1]`).
pub fn deltas(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Pearson correlation coefficient between two equally long slices.
/// Returns None if the slices differ in length, hold fewer than two points,
/// or either one is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mean_x = mean(x)?;
    let mean_y = mean(y)?;
    let numerator: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(xi, yi)| (xi - mean_x) * (yi - mean_y))
        .sum();
    let denominator_x = x.iter().map(|xi| (xi - mean_x).powi(2)).sum::<f64>().sqrt();
    let denominator_y = y.iter().map(|yi| (yi - mean_y).powi(2)).sum::<f64>().sqrt();
    if denominator_x == 0.0 || denominator_y == 0.0 {
        None
    } else {
        Some(numerator / (denominator_x * denominator_y))
    }
}

/// Least-squares slope of `values` against their 0-based index.
pub fn index_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let x_mean = (n as f64 - 1.0) / 2.0;
    let y_mean = mean(values)?;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, v) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (v - y_mean);
        denominator += dx * dx;
    }
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}
