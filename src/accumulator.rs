use crate::error::{DebtError, Result};
use crate::model::Metric;
use std::collections::HashMap;

/// Running totals keyed by metric id, carried across the ordered commit sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningValues {
    values: HashMap<i64, i64>,
}

impl RunningValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a persisted snapshot (see `Database::metric_values`).
    pub fn seeded(values: HashMap<i64, i64>) -> Self {
        Self { values }
    }

    /// Add each delta to its metric's total; unseen metrics start at 0.
    pub fn increment(&mut self, metrics: &[Metric], mapping: &HashMap<String, i64>) -> Result<()> {
        for metric in metrics {
            let id = mapping
                .get(&metric.name)
                .ok_or_else(|| DebtError::UnknownMetric(metric.name.clone()))?;
            *self.values.entry(*id).or_insert(0) += metric.value;
        }
        Ok(())
    }

    pub fn get(&self, metric_id: i64) -> i64 {
        self.values.get(&metric_id).copied().unwrap_or(0)
    }

    pub fn as_map(&self) -> &HashMap<i64, i64> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> HashMap<String, i64> {
        HashMap::from([("a".to_string(), 1), ("b".to_string(), 2)])
    }

    #[test]
    fn increments_from_zero() {
        let mut running = RunningValues::new();
        running
            .increment(&[Metric::new("a", 3), Metric::new("b", 0)], &mapping())
            .unwrap();
        running.increment(&[Metric::new("a", -1)], &mapping()).unwrap();

        assert_eq!(running.get(1), 2);
        assert_eq!(running.get(2), 0);
        assert_eq!(running.get(99), 0);
    }

    #[test]
    fn continues_from_seed() {
        let mut running = RunningValues::seeded(HashMap::from([(1, 10)]));
        running.increment(&[Metric::new("a", 5)], &mapping()).unwrap();
        assert_eq!(running.get(1), 15);
    }

    #[test]
    fn unknown_metric_is_an_error() {
        let mut running = RunningValues::new();
        let err = running
            .increment(&[Metric::new("zzz", 1)], &mapping())
            .unwrap_err();
        assert!(matches!(err, DebtError::UnknownMetric(name) if name == "zzz"));
    }
}
