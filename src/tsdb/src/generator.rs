use crate::labels::{Label, Labels, METRIC_NAME};

/// TimeseriesGenerator creates samples for a time series.
///
/// Implementations must be pure functions of the timestamp: the same `t` yields the same value
/// no matter how often or in which order it is asked for.
pub trait TimeseriesGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// labels returns the full label set, including the `__name__` label.
    fn labels(&self) -> &Labels;

    /// value returns the sample value at `t`, in epoch milliseconds.
    fn value(&self, t: i64) -> f64;
}

/// IncreasingTimeseriesGenerator yields the number of whole seconds elapsed since its start time,
/// so every series is a counter going up by one each second.
pub struct IncreasingTimeseriesGenerator {
    name: String,
    labels: Labels,
    start_secs: i64,
}

impl IncreasingTimeseriesGenerator {
    pub fn new(name: impl Into<String>, labels: Labels, start_time: i64) -> Self {
        let name = name.into();
        let mut labels = labels;
        labels.set(Label::new(METRIC_NAME, name.as_str()));

        Self {
            name,
            labels,
            start_secs: start_time.div_euclid(1000),
        }
    }
}

impl TimeseriesGenerator for IncreasingTimeseriesGenerator {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn value(&self, t: i64) -> f64 {
        (t.div_euclid(1000) - self.start_secs) as f64
    }
}

/// decimal_width returns how many digits `n` needs, with a minimum of one.
fn decimal_width(n: usize) -> usize {
    n.checked_ilog10().map(|w| w as usize + 1).unwrap_or(1)
}

/// instance_fleet builds `count` increasing series named `test<i>`, each carrying an
/// `instance=test-metric-<start_index + i>` label.
///
/// Both numbers are zero-padded to a common width so that the fleet's label sets sort in the
/// same order as the series are listed, which the index format requires.
pub fn instance_fleet(
    count: usize,
    start_index: usize,
    start_time: i64,
) -> Vec<Box<dyn TimeseriesGenerator>> {
    let name_width = decimal_width(count.saturating_sub(1));
    let instance_width = decimal_width((start_index + count).saturating_sub(1));

    (0..count)
        .map(|i| {
            let labels = Labels::new(vec![Label::new(
                "instance",
                format!("test-metric-{:0width$}", start_index + i, width = instance_width),
            )]);
            let name = format!("test{:0width$}", i, width = name_width);
            Box::new(IncreasingTimeseriesGenerator::new(name, labels, start_time))
                as Box<dyn TimeseriesGenerator>
        })
        .collect()
}
