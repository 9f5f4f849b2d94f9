//! Loop-based kernel backend.

use faer::Mat;

use super::{ElementBatch, KernelBackend};
use crate::error::ExecError;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Host loops over elements. With the `parallel` feature and
/// `parallel = true`, elements are computed concurrently.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceBackend {
    parallel: bool,
}

impl ReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request parallel element loops. Ignored without the `parallel` feature.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn is_parallel(&self) -> bool {
        cfg!(feature = "parallel") && self.parallel
    }
}

fn element_product(matrix: &Mat<f64>, input: &[f64], offset: usize, scale: f64) -> Vec<f64> {
    let x = &input[offset..offset + matrix.ncols()];
    (0..matrix.nrows())
        .map(|i| {
            let mut acc = 0.0;
            for (j, xj) in x.iter().enumerate() {
                acc += matrix[(i, j)] * xj;
            }
            scale * acc
        })
        .collect()
}

impl KernelBackend for ReferenceBackend {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn element_matmul(
        &self,
        matrix: &Mat<f64>,
        input: &[f64],
        batch: &ElementBatch<'_>,
        output: &mut [f64],
    ) -> Result<(), ExecError> {
        batch.validate(matrix, input.len(), output.len())?;
        let rows = matrix.nrows();

        #[cfg(feature = "parallel")]
        if self.parallel {
            let results: Vec<Vec<f64>> = (0..batch.len())
                .into_par_iter()
                .map(|e| element_product(matrix, input, batch.in_offsets[e], batch.scales[e]))
                .collect();
            for (values, &out) in results.iter().zip(batch.out_offsets) {
                output[out..out + rows].copy_from_slice(values);
            }
            return Ok(());
        }

        for e in 0..batch.len() {
            let values = element_product(matrix, input, batch.in_offsets[e], batch.scales[e]);
            let out = batch.out_offsets[e];
            output[out..out + rows].copy_from_slice(&values);
        }
        Ok(())
    }
}
