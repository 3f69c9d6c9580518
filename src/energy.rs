use crate::normalize::energy_wh;
use crate::telemetry::Energy;
use std::time::{Duration, SystemTime};

/// Samples further apart than this are not integrated.
pub const MAX_SAMPLE_GAP: Duration = Duration::from_secs(300);

/// Integrates pack power into cumulative charged and discharged energy.
///
/// The first sample only records its timestamp. A sample that arrives with a
/// non-positive or too large gap is logged and skipped, but still becomes the
/// reference for the next one.
#[derive(Debug, Clone, Default)]
pub struct EnergyAccumulator {
    totals: Energy,
    last_sample: Option<SystemTime>,
}

impl EnergyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the energy moved at `power_kw` since the previous sample and
    /// returns the new totals in Wh.
    pub fn accumulate(&mut self, power_kw: f64, timestamp: SystemTime) -> Energy {
        let Some(last_sample) = self.last_sample.replace(timestamp) else {
            return self.totals;
        };
        match timestamp.duration_since(last_sample) {
            Ok(elapsed) if !elapsed.is_zero() && elapsed <= MAX_SAMPLE_GAP => {
                let delta = energy_wh(power_kw, elapsed.as_secs_f64());
                if power_kw >= 0.0 {
                    self.totals.charged += delta;
                } else {
                    self.totals.discharged += delta;
                }
            }
            Ok(elapsed) => {
                log::warn!("Skipping energy sample - elapsed={elapsed:?} since previous sample");
            }
            Err(err) => {
                log::warn!(
                    "Skipping energy sample - timestamp is {:?} before previous sample",
                    err.duration()
                );
            }
        }
        self.totals
    }

    pub fn totals(&self) -> Energy {
        self.totals
    }

    pub fn reset(&mut self) {
        self.totals = Energy::default();
        self.last_sample = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn accumulate_test() {
        let mut acc = EnergyAccumulator::new();
        assert_eq!(acc.accumulate(1.0, at(0)), Energy::default());
        assert_eq!(
            acc.accumulate(1.0, at(3600)),
            Energy {
                charged: 1000.0,
                discharged: 0.0
            }
        );
        // sample gap above the limit
        assert_eq!(acc.accumulate(1.0, at(4000)).charged, 1000.0);
        // the skipped sample still became the reference
        assert_eq!(
            acc.accumulate(-3.6, at(4100)),
            Energy {
                charged: 1000.0,
                discharged: 100.0
            }
        );
    }

    #[test]
    fn non_positive_elapsed_test() {
        let mut acc = EnergyAccumulator::new();
        acc.accumulate(1.0, at(100));
        assert_eq!(acc.accumulate(1.0, at(100)), Energy::default());
        assert_eq!(acc.accumulate(1.0, at(50)), Energy::default());
        assert_eq!(acc.accumulate(1.8, at(60)).charged, 5.0);
    }

    #[test]
    fn reset_test() {
        let mut acc = EnergyAccumulator::new();
        acc.accumulate(1.0, at(0));
        acc.accumulate(1.0, at(300));
        assert!(acc.totals().charged > 0.0);
        acc.reset();
        assert_eq!(acc.totals(), Energy::default());
        // first sample after a reset only stores the timestamp
        assert_eq!(acc.accumulate(1.0, at(400)), Energy::default());
    }
}
