// src/poll/validate.rs
//! Range check applied to every fetched reading before it may be stored.

/// One side of an acceptable range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Bound {
    #[default]
    Unbounded,
    Inclusive(f64),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RangeError {
    #[error("bound must be a finite number, got {0}")]
    NonFinite(f64),
    #[error("lower bound {lower} is greater than upper bound {upper}")]
    Inverted { lower: f64, upper: f64 },
}

/// Inclusive numeric range; the default accepts any finite value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadingRange {
    lower: Bound,
    upper: Bound,
}

impl ReadingRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(lower: Bound, upper: Bound) -> Result<Self, RangeError> {
        for b in [lower, upper] {
            if let Bound::Inclusive(x) = b {
                if !x.is_finite() {
                    return Err(RangeError::NonFinite(x));
                }
            }
        }
        if let (Bound::Inclusive(lo), Bound::Inclusive(hi)) = (lower, upper) {
            if lo > hi {
                return Err(RangeError::Inverted {
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self { lower, upper })
    }

    /// Convenience for the common `[lo, hi]` case.
    pub fn between(lo: f64, hi: f64) -> Result<Self, RangeError> {
        Self::new(Bound::Inclusive(lo), Bound::Inclusive(hi))
    }

    /// `None` on either side means no limit on that side.
    pub fn from_options(lo: Option<f64>, hi: Option<f64>) -> Result<Self, RangeError> {
        let side = |v: Option<f64>| v.map_or(Bound::Unbounded, Bound::Inclusive);
        Self::new(side(lo), side(hi))
    }

    pub fn lower(&self) -> Bound {
        self.lower
    }

    pub fn upper(&self) -> Bound {
        self.upper
    }
}

/// True iff `value` is finite and inside `range` (inclusive on both ends).
pub fn is_acceptable(value: f64, range: &ReadingRange) -> bool {
    if !value.is_finite() {
        return false;
    }
    let above_lower = match range.lower {
        Bound::Unbounded => true,
        Bound::Inclusive(lo) => value >= lo,
    };
    let below_upper = match range.upper {
        Bound::Unbounded => true,
        Bound::Inclusive(hi) => value <= hi,
    };
    above_lower && below_upper
}
