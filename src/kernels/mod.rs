//! Element-local numeric kernels.
//!
//! Every operator reduces to the same primitive: apply one small dense
//! matrix to a slice of every element and scale the result per element.
//! A [`KernelBackend`] supplies that primitive; the operator modules
//! ([`diff`], [`element_local`], [`flux`]) arrange inputs and outputs in
//! device layout around it.
//!
//! - [`ReferenceBackend`]: plain loops, optionally rayon-parallel
//! - `BurnBackend`: batched tensor matmul (feature `burn`)

#[cfg(feature = "burn")]
mod burn_backend;
pub mod diff;
pub mod element_local;
pub mod flux;
mod geometry;
mod reference;

use std::fmt::Debug;

use faer::Mat;

use crate::error::ExecError;

#[cfg(feature = "burn")]
pub use burn_backend::{BurnBackend, TensorBackend};
pub use geometry::ElementGeometry;
pub use reference::ReferenceBackend;

/// Where each element's input and output live, and its scale factor.
#[derive(Clone, Copy, Debug)]
pub struct ElementBatch<'a> {
    pub in_offsets: &'a [usize],
    pub out_offsets: &'a [usize],
    pub scales: &'a [f64],
}

impl<'a> ElementBatch<'a> {
    pub fn new(in_offsets: &'a [usize], out_offsets: &'a [usize], scales: &'a [f64]) -> Self {
        Self {
            in_offsets,
            out_offsets,
            scales,
        }
    }

    pub fn len(&self) -> usize {
        self.in_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_offsets.is_empty()
    }

    /// Check offsets against the matrix shape and buffer lengths.
    pub fn validate(
        &self,
        matrix: &Mat<f64>,
        input_len: usize,
        output_len: usize,
    ) -> Result<(), ExecError> {
        if self.out_offsets.len() != self.len() {
            return Err(ExecError::dimension_mismatch(self.len(), self.out_offsets.len()));
        }
        if self.scales.len() != self.len() {
            return Err(ExecError::dimension_mismatch(self.len(), self.scales.len()));
        }
        if let Some(&end) = self.in_offsets.iter().map(|o| o + matrix.ncols()).max().as_ref() {
            if end > input_len {
                return Err(ExecError::dimension_mismatch(end, input_len));
            }
        }
        if let Some(&end) = self.out_offsets.iter().map(|o| o + matrix.nrows()).max().as_ref() {
            if end > output_len {
                return Err(ExecError::dimension_mismatch(end, output_len));
            }
        }
        Ok(())
    }
}

/// Executes the element-local matrix product.
pub trait KernelBackend: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// For every element e:
    /// `output[out_e + i] = scale_e * sum_j matrix[(i, j)] * input[in_e + j]`.
    ///
    /// Output entries not covered by any element are left untouched.
    fn element_matmul(
        &self,
        matrix: &Mat<f64>,
        input: &[f64],
        batch: &ElementBatch<'_>,
        output: &mut [f64],
    ) -> Result<(), ExecError>;
}

/// Flops of one `element_matmul` call.
pub fn matmul_flops(matrix: &Mat<f64>, elements: usize) -> u64 {
    (2 * matrix.nrows() * matrix.ncols() * elements) as u64
}
