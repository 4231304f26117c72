//! Contiguous period-indexed series.

use serde::{Deserialize, Serialize};

use crate::core::ValuationError;
use crate::time::{Granularity, TimePeriod};

/// One value per consecutive period, starting at `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries<V> {
    start: TimePeriod,
    values: Vec<V>,
}

impl<V> TimeSeries<V> {
    pub fn new(start: TimePeriod, values: Vec<V>) -> Self {
        Self { start, values }
    }

    /// Empty series anchored at `start`.
    pub fn empty(start: TimePeriod) -> Self {
        Self {
            start,
            values: Vec::new(),
        }
    }

    /// Builds a series from `(period, value)` pairs which must be consecutive.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ValuationError>
    where
        I: IntoIterator<Item = (TimePeriod, V)>,
    {
        let mut iter = pairs.into_iter();
        let Some((start, first)) = iter.next() else {
            return Err(ValuationError::Validation(
                "time series needs at least one point".to_string(),
            ));
        };
        let mut values = vec![first];
        let mut expected = start.successor();
        for (period, value) in iter {
            if period.granularity() != start.granularity() {
                return Err(ValuationError::Validation(format!(
                    "time series mixes granularity {} and {}",
                    start.granularity(),
                    period.granularity()
                )));
            }
            if period != expected {
                return Err(ValuationError::Validation(format!(
                    "time series is not contiguous: expected {expected}, found {period}"
                )));
            }
            values.push(value);
            expected = expected.successor();
        }
        Ok(Self { start, values })
    }

    pub fn start(&self) -> TimePeriod {
        self.start
    }

    /// Period after the last value.
    pub fn end(&self) -> TimePeriod {
        self.start.offset(self.values.len() as i64)
    }

    /// Last period with a value.
    pub fn last(&self) -> Option<TimePeriod> {
        (!self.values.is_empty()).then(|| self.start.offset(self.values.len() as i64 - 1))
    }

    pub fn granularity(&self) -> Granularity {
        self.start.granularity()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn into_values(self) -> Vec<V> {
        self.values
    }

    pub fn get(&self, period: TimePeriod) -> Option<&V> {
        if period.granularity() != self.start.granularity() {
            return None;
        }
        let offset = self.start.periods_until(&period);
        usize::try_from(offset).ok().and_then(|i| self.values.get(i))
    }

    pub fn contains(&self, period: TimePeriod) -> bool {
        self.get(period).is_some()
    }

    pub fn periods(&self) -> impl Iterator<Item = TimePeriod> + '_ {
        (0..self.values.len()).map(|i| self.start.offset(i as i64))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimePeriod, &V)> + '_ {
        self.periods().zip(self.values.iter())
    }

    pub fn map<U>(&self, f: impl FnMut(&V) -> U) -> TimeSeries<U> {
        TimeSeries {
            start: self.start,
            values: self.values.iter().map(f).collect(),
        }
    }
}

impl<V: Clone> TimeSeries<V> {
    /// Dense series over `[start, end)` where each period carries the latest pillar value at
    /// or before it. Pillars must be sorted and the first must not be after `start`.
    pub fn pad_from_pillars(
        start: TimePeriod,
        end: TimePeriod,
        pillars: &[(TimePeriod, V)],
    ) -> Result<Self, ValuationError> {
        if pillars.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(ValuationError::Validation(
                "pillar periods must be strictly increasing".to_string(),
            ));
        }
        if let Some((p, _)) = pillars.iter().find(|(p, _)| p.granularity() != start.granularity())
        {
            return Err(ValuationError::Validation(format!(
                "pillar {p} does not have granularity {}",
                start.granularity()
            )));
        }
        match pillars.first() {
            Some((first, _)) if *first <= start => {}
            _ => {
                return Err(ValuationError::Validation(format!(
                    "no pillar at or before {start}"
                )));
            }
        }

        let mut values = Vec::with_capacity(start.periods_until(&end).max(0) as usize);
        let mut next = 0;
        for period in crate::time::period_range(start, end) {
            while next + 1 < pillars.len() && pillars[next + 1].0 <= period {
                next += 1;
            }
            values.push(pillars[next].1.clone());
        }
        Ok(Self { start, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> TimePeriod {
        TimePeriod::day(NaiveDate::from_ymd_opt(2020, 3, d).unwrap())
    }

    #[test]
    fn from_pairs_rejects_gaps() {
        let err = TimeSeries::from_pairs([(day(1), 1.0), (day(3), 2.0)]).unwrap_err();
        assert!(matches!(err, ValuationError::Validation(_)));
    }

    #[test]
    fn from_pairs_rejects_mixed_granularity() {
        let month = TimePeriod::month(2020, 4).unwrap();
        assert!(TimeSeries::from_pairs([(day(31), 1.0), (month, 2.0)]).is_err());
    }

    #[test]
    fn lookup_by_period() {
        let ts = TimeSeries::from_pairs([(day(1), 1.0), (day(2), 2.0), (day(3), 3.0)]).unwrap();
        assert_eq!(ts.get(day(2)), Some(&2.0));
        assert_eq!(ts.get(day(4)), None);
        assert_eq!(ts.end(), day(4));
        assert_eq!(ts.last(), Some(day(3)));
        assert_eq!(ts.get(TimePeriod::month(2020, 3).unwrap()), None);
    }

    #[test]
    fn pad_from_pillars_steps_forward() {
        let ts =
            TimeSeries::pad_from_pillars(day(1), day(6), &[(day(1), 10.0), (day(3), 12.0)]).unwrap();
        assert_eq!(ts.values(), &[10.0, 10.0, 12.0, 12.0, 12.0]);
        assert!(TimeSeries::pad_from_pillars(day(1), day(6), &[(day(2), 10.0)]).is_err());
    }
}
