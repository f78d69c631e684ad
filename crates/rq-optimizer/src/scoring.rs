use chrono::{DateTime, Utc};

use rq_types::{Journal, Timeframe};

/// A metric time-series reduced down to the single `f64` an optimizer
/// compares parameter sets by (C11, C12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Last,
    Mean,
    Min,
    Max,
    /// Treats the series as per-step returns and compounds them to an
    /// annual rate, inferring the step size from the series' own spacing.
    Annualized,
}

/// Picks a named metric off a [`Journal`] and reduces it within a timeframe.
#[derive(Debug, Clone)]
pub struct Score {
    pub metric: String,
    pub reduction: Reduction,
}

impl Score {
    pub fn new(metric: impl Into<String>, reduction: Reduction) -> Self {
        Self { metric: metric.into(), reduction }
    }

    pub fn calculate(&self, journal: &dyn Journal, timeframe: Timeframe) -> f64 {
        let series = windowed(journal, &self.metric, timeframe);
        reduce(&series, self.reduction)
    }
}

fn windowed(journal: &dyn Journal, metric: &str, timeframe: Timeframe) -> Vec<(DateTime<Utc>, f64)> {
    journal.get_metric(metric).into_iter().filter(|(t, _)| timeframe.contains_time(*t)).collect()
}

fn reduce(series: &[(DateTime<Utc>, f64)], reduction: Reduction) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    match reduction {
        Reduction::Last => series.last().unwrap().1,
        Reduction::Mean => series.iter().map(|(_, v)| v).sum::<f64>() / series.len() as f64,
        Reduction::Min => series.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min),
        Reduction::Max => series.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max),
        Reduction::Annualized => annualize(series),
    }
}

/// Compounds the mean per-step return of `series` up to an annual rate,
/// estimating the step count per year from the series' own time span.
fn annualize(series: &[(DateTime<Utc>, f64)]) -> f64 {
    if series.len() < 2 {
        return series.first().map(|(_, v)| *v).unwrap_or(0.0);
    }
    let mean = series.iter().map(|(_, v)| v).sum::<f64>() / series.len() as f64;
    let span = Timeframe::new(series.first().unwrap().0, series.last().unwrap().0, true);
    let years = span.to_years();
    if years <= 0.0 {
        return mean;
    }
    let steps_per_year = (series.len() as f64 - 1.0) / years;
    (1.0 + mean).powf(steps_per_year) - 1.0
}

/// Compound annual growth rate over `timeframe` from an equity-like metric:
/// `(endEquity / startEquity)^(1 / years) - 1` (C11).
pub fn cagr(journal: &dyn Journal, equity_metric: &str, timeframe: Timeframe) -> f64 {
    let series = windowed(journal, equity_metric, timeframe);
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return 0.0;
    };
    if first.1 <= 0.0 {
        return 0.0;
    }
    let years = timeframe.to_years();
    if years <= 0.0 {
        return 0.0;
    }
    (last.1 / first.1).powf(1.0 / years) - 1.0
}
