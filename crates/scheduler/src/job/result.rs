use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use super::JobId;

/// Final job result: key → value, in insertion order.
pub type ResultMap = IndexMap<String, Value>;

/// Metric history observed while a job runs: metric → values, one per update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LiveResult {
    metrics: IndexMap<String, Vec<Value>>,
}

impl LiveResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one observation for every metric in `update`.
    pub fn append(&mut self, update: &IndexMap<String, Value>) {
        for (name, value) in update {
            self.metrics
                .entry(name.clone())
                .or_default()
                .push(value.clone());
        }
    }

    pub fn get(&self, metric: &str) -> Option<&[Value]> {
        self.metrics.get(metric).map(Vec::as_slice)
    }

    /// Most recent value of a metric.
    pub fn latest(&self, metric: &str) -> Option<&Value> {
        self.metrics.get(metric).and_then(|values| values.last())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.metrics
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Result form of the history: each metric's values become a JSON array.
    pub fn to_result_map(&self) -> ResultMap {
        self.metrics
            .iter()
            .map(|(name, values)| (name.clone(), Value::Array(values.clone())))
            .collect()
    }
}

/// One progress observation, as delivered to live-update subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveUpdate {
    pub job_id: JobId,
    /// Job progress after the update was applied.
    pub progress: u8,
    pub metrics: IndexMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn update(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn append_keeps_one_entry_per_update() {
        let mut live = LiveResult::new();
        live.append(&update(&[("loss", json!(0.9)), ("acc", json!(0.1))]));
        live.append(&update(&[("loss", json!(0.5))]));

        assert_eq!(live.get("loss"), Some(&[json!(0.9), json!(0.5)][..]));
        assert_eq!(live.get("acc"), Some(&[json!(0.1)][..]));
        assert_eq!(live.latest("loss"), Some(&json!(0.5)));
        assert_eq!(live.iter().map(|(k, _)| k).collect::<Vec<_>>(), ["loss", "acc"]);
    }

    #[test]
    fn result_map_uses_arrays() {
        let mut live = LiveResult::new();
        live.append(&update(&[("step", json!(1))]));
        live.append(&update(&[("step", json!(2))]));

        let map = live.to_result_map();
        assert_eq!(map["step"], json!([1, 2]));
    }
}
