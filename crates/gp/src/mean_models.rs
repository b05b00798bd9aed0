//! A module for mean models giving the deterministic baseline of the GP
//! surrogates; the gaussian process is fitted on the residuals.
//!
//! The following models are implemented:
//! * null (zero baseline),
//! * constant,
//! * observation average.
//!
//! A mean model may read the surrogate state through the read-only
//! [`MeanContext`] handed to it at call time; no back-reference to the
//! owning surrogate is ever stored.

use linfa::Float;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use paste::paste;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read-only view of the owning surrogate state, rebuilt for each call.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeanContext<'a, F: Float> {
    /// Observations seen so far, one row per sample, or `None` before
    /// any fit.
    pub observations: Option<ArrayView2<'a, F>>,
}

impl<'a, F: Float> MeanContext<'a, F> {
    /// A context exposing the given observations.
    pub fn new(observations: ArrayView2<'a, F>) -> Self {
        MeanContext {
            observations: Some(observations),
        }
    }

    /// A context for a surrogate without any observation yet.
    pub fn empty() -> Self {
        MeanContext { observations: None }
    }
}

/// A trait for mean models used by the GP surrogates.
pub trait MeanModel<F: Float>: Clone + fmt::Display + Sync + Send {
    /// Baseline value at `x`, one component per output dimension.
    fn value(&self, x: &ArrayView1<F>, ctx: &MeanContext<F>) -> Array1<F>;

    /// Number of output components.
    fn dim_out(&self) -> usize;

    /// A copy of this model producing `dim_out` output components.
    fn resized(&self, dim_out: usize) -> Self;
}

/// The zero baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct NullMean {
    dim_out: usize,
}

impl Default for NullMean {
    fn default() -> Self {
        NullMean { dim_out: 1 }
    }
}

impl NullMean {
    /// A zero baseline with `dim_out` output components.
    pub fn new(dim_out: usize) -> Self {
        NullMean { dim_out }
    }
}

impl<F: Float> MeanModel<F> for NullMean {
    fn value(&self, _x: &ArrayView1<F>, _ctx: &MeanContext<F>) -> Array1<F> {
        Array1::zeros(self.dim_out)
    }

    fn dim_out(&self) -> usize {
        self.dim_out
    }

    fn resized(&self, dim_out: usize) -> Self {
        NullMean { dim_out }
    }
}

/// A constant baseline, the same value for every output component.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct ConstantMean<F: Float> {
    constant: F,
    dim_out: usize,
}

impl<F: Float> Default for ConstantMean<F> {
    fn default() -> Self {
        ConstantMean {
            constant: F::zero(),
            dim_out: 1,
        }
    }
}

impl<F: Float> ConstantMean<F> {
    /// A constant baseline of value `constant` with `dim_out` components.
    pub fn new(constant: F, dim_out: usize) -> Self {
        ConstantMean { constant, dim_out }
    }
}

impl<F: Float> MeanModel<F> for ConstantMean<F> {
    fn value(&self, _x: &ArrayView1<F>, _ctx: &MeanContext<F>) -> Array1<F> {
        Array1::from_elem(self.dim_out, self.constant)
    }

    fn dim_out(&self) -> usize {
        self.dim_out
    }

    fn resized(&self, dim_out: usize) -> Self {
        ConstantMean {
            constant: self.constant,
            dim_out,
        }
    }
}

/// The running average of the observations, read from the surrogate state
/// at call time. Falls back to zero before the first fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ObservationMean {
    dim_out: usize,
}

impl Default for ObservationMean {
    fn default() -> Self {
        ObservationMean { dim_out: 1 }
    }
}

impl ObservationMean {
    /// An observation-average baseline with `dim_out` components.
    pub fn new(dim_out: usize) -> Self {
        ObservationMean { dim_out }
    }
}

impl<F: Float> MeanModel<F> for ObservationMean {
    fn value(&self, _x: &ArrayView1<F>, ctx: &MeanContext<F>) -> Array1<F> {
        match ctx.observations {
            Some(obs) if obs.nrows() > 0 => obs.mean_axis(Axis(0)).unwrap(),
            _ => Array1::zeros(self.dim_out),
        }
    }

    fn dim_out(&self) -> usize {
        self.dim_out
    }

    fn resized(&self, dim_out: usize) -> Self {
        ObservationMean { dim_out }
    }
}

macro_rules! declare_mean_display {
    ($mean:ident) => {
        paste! {
            impl fmt::Display for $mean {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, stringify!($mean))
                }
            }
        }
    };
}

declare_mean_display!(NullMean);
declare_mean_display!(ObservationMean);

impl<F: Float> fmt::Display for ConstantMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConstantMean")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_null_mean() {
        let mean = NullMean::new(2);
        let v: Array1<f64> = mean.value(&array![0.5].view(), &MeanContext::empty());
        assert_eq!(v, array![0., 0.]);
    }

    #[test]
    fn test_constant_mean_resize() {
        let mean = ConstantMean::new(1.5, 1).resized(3);
        let v: Array1<f64> = mean.value(&array![0.5].view(), &MeanContext::empty());
        assert_eq!(v, array![1.5, 1.5, 1.5]);
    }

    #[test]
    fn test_observation_mean_reads_context() {
        let obs = array![[1., 10.], [3., 20.]];
        let mean = ObservationMean::new(2);
        let ctx = MeanContext::new(obs.view());
        let v: Array1<f64> = mean.value(&array![0.5].view(), &ctx);
        assert_abs_diff_eq!(v, array![2., 15.], epsilon = 1e-15);
        // without state the baseline degrades to zero
        let v: Array1<f64> = mean.value(&array![0.5].view(), &MeanContext::empty());
        assert_eq!(v, array![0., 0.]);
    }
}
