//! Batched differentiation.
//!
//! Reference derivatives along every rst axis are computed once per
//! batch; each requested xyz derivative is then a per-element linear
//! combination through the inverse metric:
//! `d/dx_a = sum_r (dr_r/dx_a) d/dr_r`.

use faer::Mat;

use super::{matmul_flops, ElementBatch, ElementGeometry, KernelBackend};
use crate::error::ExecError;
use crate::local::LocalDiscretization;
use crate::optemplate::DiffKind;
use crate::types::ElementIndex;

/// Strong and weak reference differentiation matrices.
#[derive(Clone, Debug)]
pub struct DiffOperators {
    strong: Vec<Mat<f64>>,
    weak: Vec<Mat<f64>>,
}

impl DiffOperators {
    /// Weak matrices are `M^{-1} D_r^T M`.
    pub fn new(ldis: &LocalDiscretization) -> Self {
        let strong = ldis.differentiation_matrices().to_vec();
        let mass = ldis.mass_matrix();
        let n = ldis.node_count();
        let weak = strong
            .iter()
            .map(|d| {
                // diagonal mass
                Mat::from_fn(n, n, |i, j| d[(j, i)] * mass[(j, j)] / mass[(i, i)])
            })
            .collect();
        Self { strong, weak }
    }

    pub fn matrices(&self, kind: DiffKind) -> &[Mat<f64>] {
        match kind {
            DiffKind::Strong => &self.strong,
            DiffKind::Weak => &self.weak,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.strong.len()
    }
}

/// Estimated flops of one batch.
pub fn diff_flops(ops: &DiffOperators, axes: usize, elements: usize) -> u64 {
    let dims = ops.dimensions();
    let n = ops.strong.first().map_or(0, |m| m.nrows());
    let reference: u64 = ops.strong.iter().map(|m| matmul_flops(m, elements)).sum();
    reference + (2 * dims * n * elements * axes) as u64
}

/// Differentiate `field` along each of `axes`, writing `outputs[i]` for
/// `axes[i]`.
///
/// `el_offsets[e]` is the device index of element e's first dof. Entries
/// of `outputs` outside element storage are left untouched.
#[allow(clippy::too_many_arguments)]
pub fn apply_diff(
    backend: &dyn KernelBackend,
    ops: &DiffOperators,
    kind: DiffKind,
    axes: &[usize],
    geometry: &ElementGeometry,
    el_offsets: &[usize],
    field: &[f64],
    outputs: &mut [&mut [f64]],
) -> Result<(), ExecError> {
    if outputs.len() != axes.len() {
        return Err(ExecError::dimension_mismatch(axes.len(), outputs.len()));
    }
    let dims = ops.dimensions();
    if let Some(&axis) = axes.iter().find(|&&a| a >= dims) {
        return Err(ExecError::Unsupported(format!(
            "derivative along axis {axis} in {dims} dimensions"
        )));
    }

    let ones = vec![1.0; el_offsets.len()];
    let batch = ElementBatch::new(el_offsets, el_offsets, &ones);
    let reference = ops
        .matrices(kind)
        .iter()
        .map(|matrix| {
            let mut rst = vec![0.0; field.len()];
            backend.element_matmul(matrix, field, &batch, &mut rst)?;
            Ok(rst)
        })
        .collect::<Result<Vec<_>, ExecError>>()?;

    let dofs = ops.strong.first().map_or(0, |m| m.nrows());
    for (out, &axis) in outputs.iter_mut().zip(axes) {
        if out.len() < field.len() {
            return Err(ExecError::dimension_mismatch(field.len(), out.len()));
        }
        for (el, &base) in ElementIndex::iter(el_offsets.len()).zip(el_offsets) {
            let metric = &geometry.inverse_metric(el)[axis * dims..(axis + 1) * dims];
            for i in base..base + dofs {
                out[i] = metric.iter().zip(&reference).map(|(g, rst)| g * rst[i]).sum();
            }
        }
    }
    Ok(())
}
