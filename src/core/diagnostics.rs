//! Compact scalar diagnostics attached to valuation results.

/// Compact key set for engine diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagKey {
    BasisFunctions,
    GridPoints,
    NumPaths,
    NumPeriods,
    RegressionFallbacks,
    StdErr,
    TreeWidth,
    Tolerance,
}

impl DiagKey {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BasisFunctions => "basis_functions",
            Self::GridPoints => "grid_points",
            Self::NumPaths => "num_paths",
            Self::NumPeriods => "num_periods",
            Self::RegressionFallbacks => "regression_fallbacks",
            Self::StdErr => "std_err",
            Self::TreeWidth => "tree_width",
            Self::Tolerance => "tolerance",
        }
    }
}

impl std::str::FromStr for DiagKey {
    type Err = ();

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key {
            "basis_functions" => Ok(Self::BasisFunctions),
            "grid_points" => Ok(Self::GridPoints),
            "num_paths" => Ok(Self::NumPaths),
            "num_periods" => Ok(Self::NumPeriods),
            "regression_fallbacks" => Ok(Self::RegressionFallbacks),
            "std_err" => Ok(Self::StdErr),
            "tree_width" => Ok(Self::TreeWidth),
            "tolerance" => Ok(Self::Tolerance),
            _ => Err(()),
        }
    }
}

/// Inline diagnostics storage, one slot per [`DiagKey`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    entries: [Option<(DiagKey, f64)>; 8],
}

impl Diagnostics {
    pub const CAPACITY: usize = 8;

    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or replaces `key`, returning the previous value.
    ///
    /// Capacity equals the number of keys, so an insert always finds a slot.
    #[inline]
    pub fn insert(&mut self, key: DiagKey, value: f64) -> Option<f64> {
        for (entry_key, existing) in self.entries.iter_mut().flatten() {
            if *entry_key == key {
                let prev = *existing;
                *existing = value;
                return Some(prev);
            }
        }
        if let Some(slot) = self.entries.iter_mut().find(|e| e.is_none()) {
            *slot = Some((key, value));
        }
        None
    }

    #[inline]
    fn iter_entries(&self) -> impl Iterator<Item = &(DiagKey, f64)> {
        self.entries.iter().filter_map(Option::as_ref)
    }

    #[inline]
    pub fn get_key(&self, key: DiagKey) -> Option<f64> {
        self.iter_entries()
            .find_map(|(entry_key, value)| (*entry_key == key).then_some(*value))
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.get_key(key.parse().ok()?)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.iter_entries().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_existing_key() {
        let mut d = Diagnostics::new();
        assert_eq!(d.insert(DiagKey::NumPaths, 100.0), None);
        assert_eq!(d.insert(DiagKey::NumPaths, 200.0), Some(100.0));
        assert_eq!(d.len(), 1);
        assert_eq!(d.get("num_paths"), Some(200.0));
        assert_eq!(d.get("unknown"), None);
    }

    #[test]
    fn every_key_fits() {
        let keys = [
            DiagKey::BasisFunctions,
            DiagKey::GridPoints,
            DiagKey::NumPaths,
            DiagKey::NumPeriods,
            DiagKey::RegressionFallbacks,
            DiagKey::StdErr,
            DiagKey::TreeWidth,
            DiagKey::Tolerance,
        ];
        let mut d = Diagnostics::new();
        for (i, k) in keys.iter().enumerate() {
            d.insert(*k, i as f64);
            assert_eq!(k.as_str().parse::<DiagKey>(), Ok(*k));
        }
        assert_eq!(d.len(), Diagnostics::CAPACITY);
        assert_eq!(d.iter().count(), keys.len());
    }
}
