//! Chart series: historical prices joined to a model forecast.

use serde::{Deserialize, Serialize};

/// One x-axis position on the price chart.
///
/// Historical points carry `price`, forecast points carry `predicted`. The
/// first forecast point after [`compose`] also bridges to the last price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub predicted: Option<f64>,
}

impl SeriesPoint {
    pub fn historical(date: impl Into<String>, price: f64) -> Self {
        Self {
            date: date.into(),
            price: Some(price),
            predicted: None,
        }
    }

    pub fn forecast(date: impl Into<String>, predicted: f64) -> Self {
        Self {
            date: date.into(),
            price: None,
            predicted: Some(predicted),
        }
    }

    /// The value plotted for this point, preferring the real price.
    pub fn value(&self) -> Option<f64> {
        self.price.or(self.predicted)
    }
}

/// Concatenate history and forecast into one chart-ready sequence.
///
/// Historical points lose any `predicted` value and forecast points lose any
/// `price`. When both sides are non-empty the first forecast point's
/// `predicted` is overwritten with the last historical `price`, so the two
/// lines meet. Order is preserved; nothing is sorted or de-duplicated.
pub fn compose(historical: &[SeriesPoint], forecast: &[SeriesPoint]) -> Vec<SeriesPoint> {
    let mut combined = Vec::with_capacity(historical.len() + forecast.len());

    combined.extend(historical.iter().map(|point| SeriesPoint {
        predicted: None,
        ..point.clone()
    }));

    let join_index = combined.len();
    combined.extend(forecast.iter().map(|point| SeriesPoint {
        price: None,
        ..point.clone()
    }));

    if let (Some(last), Some(first)) = (historical.last(), combined.get_mut(join_index)) {
        first.predicted = last.price;
    }

    combined
}

/// Data for the price chart. Without a forecast (overlay hidden or not yet
/// computed) the history is passed through untouched.
pub fn chart_data(
    historical: &[SeriesPoint],
    forecast: Option<&[SeriesPoint]>,
) -> Vec<SeriesPoint> {
    match forecast {
        Some(forecast) => compose(historical, forecast),
        None => historical.to_vec(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBounds {
    pub min: f64,
    pub max: f64,
}

impl PriceBounds {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Min and max over every plotted value; `None` if nothing has a value.
pub fn price_bounds(points: &[SeriesPoint]) -> Option<PriceBounds> {
    points
        .iter()
        .filter_map(SeriesPoint::value)
        .fold(None, |bounds, value| match bounds {
            None => Some(PriceBounds { min: value, max: value }),
            Some(PriceBounds { min, max }) => Some(PriceBounds {
                min: min.min(value),
                max: max.max(value),
            }),
        })
}

/// Date label where the forecast begins.
pub fn forecast_start(forecast: &[SeriesPoint]) -> Option<&str> {
    forecast.first().map(|point| point.date.as_str())
}
