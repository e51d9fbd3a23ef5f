use serde::{Deserialize, Serialize};

use crate::image::ImageBatch;

/// Ordered label -> image-batch mapping for one reporting call.
///
/// Insertion order is a contract: it determines the left-to-right column
/// order of the emitted HTML table rows.
#[derive(Clone, Debug, Default)]
pub struct VisualSet {
    entries: Vec<(String, ImageBatch)>,
}

impl VisualSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a labeled batch. A repeated label is kept as a second column,
    /// matching the append-only use in a training loop.
    pub fn insert(&mut self, label: impl Into<String>, images: ImageBatch) {
        self.entries.push((label.into(), images));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ImageBatch)> {
        self.entries.iter().map(|(label, images)| (label.as_str(), images))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A loss reading: either a plain scalar or a small series whose mean is the
/// reported value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LossValue {
    Scalar(f64),
    Series(Vec<f64>),
}

impl LossValue {
    /// The reported scalar: the value itself, or the arithmetic mean of the
    /// series. An empty series reduces to NaN.
    pub fn mean(&self) -> f64 {
        match self {
            Self::Scalar(value) => *value,
            Self::Series(values) => values.iter().sum::<f64>() / values.len() as f64,
        }
    }
}

impl From<f64> for LossValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for LossValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Series(values)
    }
}

/// Ordered metric-name -> value mapping for one reporting call.
#[derive(Clone, Debug, Default)]
pub struct LossSet {
    entries: Vec<(String, LossValue)>,
}

impl LossSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<LossValue>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&LossValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LossValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulated points for one live-plot window.
///
/// `x` holds epoch-plus-fraction values, `y` one row per point with one
/// entry per legend name. Grows for the lifetime of the reporter; never
/// pruned and never persisted by the reporter itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlotSeries {
    pub legend: Vec<String>,
    pub x: Vec<f64>,
    pub y: Vec<Vec<f64>>,
}

impl PlotSeries {
    pub fn new(legend: Vec<String>) -> Self {
        Self {
            legend,
            x: Vec::new(),
            y: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_set_preserves_insertion_order() {
        let mut losses = LossSet::new();
        losses.insert("G_GAN", 0.5);
        losses.insert("D_real", 0.25);
        losses.insert("D_fake", 0.75);

        let names: Vec<&str> = losses.names().collect();
        assert_eq!(names, ["G_GAN", "D_real", "D_fake"]);
    }

    #[test]
    fn loss_value_mean_reduces_series() {
        assert_eq!(LossValue::Scalar(2.5).mean(), 2.5);
        assert_eq!(LossValue::Series(vec![1.0, 2.0, 3.0]).mean(), 2.0);
    }

    #[test]
    fn loss_set_lookup_by_name() {
        let mut losses = LossSet::new();
        losses.insert("G", vec![4.0, 6.0]);

        assert_eq!(losses.get("G").map(LossValue::mean), Some(5.0));
        assert!(losses.get("D").is_none());
    }

    #[test]
    fn visual_set_iterates_in_insertion_order() {
        let batch = ImageBatch::filled(1, 1, 2, 2, 0.0);
        let mut visuals = VisualSet::new();
        visuals.insert("real_A", batch.clone());
        visuals.insert("fake_B", batch);

        let labels: Vec<&str> = visuals.labels().collect();
        assert_eq!(labels, ["real_A", "fake_B"]);
        assert_eq!(visuals.len(), 2);
    }
}
