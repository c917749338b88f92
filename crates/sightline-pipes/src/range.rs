use serde::{Deserialize, Serialize};

/// Inclusive `[min, max]` pair, persisted as a two-element array.
///
/// `min <= max` is a configuration invariant checked where settings are
/// written, not here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[T; 2]", into = "[T; 2]")]
pub struct ValueRange<T: Copy> {
    pub min: T,
    pub max: T,
}

impl<T: Copy + PartialOrd> ValueRange<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, v: T) -> bool {
        self.min <= v && v <= self.max
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

impl<T: Copy> From<[T; 2]> for ValueRange<T> {
    fn from(v: [T; 2]) -> Self {
        Self { min: v[0], max: v[1] }
    }
}

impl<T: Copy> From<ValueRange<T>> for [T; 2] {
    fn from(r: ValueRange<T>) -> Self {
        [r.min, r.max]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_as_pair() {
        let r = ValueRange::new(10, 20);
        assert_eq!(serde_json::to_string(&r).expect("json"), "[10,20]");
        let back: ValueRange<f64> = serde_json::from_str("[0.5,1.5]").expect("parse");
        assert!(back.contains(1.0));
        assert!(!back.contains(2.0));
    }
}
