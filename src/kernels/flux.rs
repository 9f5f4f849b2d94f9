//! Flux gather and lift.
//!
//! For every element face the gather reads this side's values through the
//! face's native index list and the other side's values through its
//! external list: the neighbor's volume nodes for interior faces, the
//! face's slot in boundary storage otherwise. Flux terms are summed per
//! face node, scaled by the face jacobian and placed into a face vector
//! of `faces_per_el * face_node_count` entries per element, which is then
//! lifted (`J^{-1} LIFT`) or face-mass multiplied back into the volume.

use faer::Mat;

use super::{matmul_flops, ElementBatch, ElementGeometry, KernelBackend};
use crate::error::{ConsistencyError, ExecError, Result};
use crate::local::LocalDiscretization;
use crate::mesh::ElementFace;
use crate::optemplate::WholeDomainFlux;
use crate::storage::{FaceStorage, FaceStorageInfo};
use crate::types::ElementIndex;

/// A flux operand resolved to device data.
#[derive(Clone, Copy, Debug)]
pub enum Operand<'a> {
    Scalar(f64),
    Vector(&'a [f64]),
}

impl Operand<'_> {
    fn at(&self, i: usize) -> f64 {
        match self {
            Operand::Scalar(s) => *s,
            Operand::Vector(v) => v[i],
        }
    }

    fn check_len(&self, expected: usize) -> std::result::Result<(), ExecError> {
        match self {
            Operand::Vector(v) if v.len() != expected => {
                Err(ExecError::dimension_mismatch(expected, v.len()))
            }
            _ => Ok(()),
        }
    }
}

/// Operands of one flux, in the order of its terms.
#[derive(Clone, Debug, Default)]
pub struct FluxOperands<'a> {
    /// One per interior term.
    pub interiors: Vec<Operand<'a>>,
    /// `(field, bfield)` per boundary term.
    pub boundaries: Vec<(Operand<'a>, Operand<'a>)>,
}

/// Lift and face mass matrices.
#[derive(Clone, Debug)]
pub struct FluxOperators {
    lift: Mat<f64>,
    face_mass: Mat<f64>,
    face_node_count: usize,
}

impl FluxOperators {
    pub fn new(ldis: &LocalDiscretization) -> Self {
        Self {
            lift: ldis.lift_matrix(),
            face_mass: ldis.multi_face_mass_matrix(),
            face_node_count: ldis.face_node_count(),
        }
    }

    pub fn matrix(&self, is_lift: bool) -> &Mat<f64> {
        if is_lift {
            &self.lift
        } else {
            &self.face_mass
        }
    }
}

/// Layout the gather reads through.
#[derive(Clone, Copy, Debug)]
pub struct FluxLayout<'a> {
    pub info: &'a FaceStorageInfo,
    pub geometry: &'a ElementGeometry,
    /// Device index of each element's first dof.
    pub el_offsets: &'a [usize],
    pub volume_len: usize,
    pub boundary_len: usize,
}

pub fn flux_flops(ops: &FluxOperators, flux: &WholeDomainFlux, layout: &FluxLayout<'_>) -> u64 {
    let elements = layout.el_offsets.len();
    let terms = flux.interiors.len() + flux.boundaries.len();
    let face_nodes = elements * layout.geometry.faces_per_el() * ops.face_node_count;
    matmul_flops(ops.matrix(flux.is_lift), elements) + (4 * terms * face_nodes) as u64
}

/// Gather per-face flux values for every element.
fn gather(
    flux: &WholeDomainFlux,
    operands: &FluxOperands<'_>,
    layout: &FluxLayout<'_>,
    nfp: usize,
) -> Result<Vec<f64>> {
    let faces_per_el = layout.geometry.faces_per_el();
    let per_el = faces_per_el * nfp;
    let mut values = vec![0.0; layout.el_offsets.len() * per_el];

    for (el, &base) in ElementIndex::iter(layout.el_offsets.len()).zip(layout.el_offsets) {
        for face in 0..faces_per_el {
            let record = layout
                .info
                .get(ElementFace::new(el, face))
                .ok_or(ConsistencyError::UnknownFace { element: el, face })?;
            let native = layout.info.index_list(record.global_int_flux_index_list_id);
            let ext = layout.info.index_list(record.global_ext_flux_index_list_id);
            let normal = layout.geometry.normal(el, face);
            let scale = layout.geometry.face_jacobian(el, face);
            let out = &mut values[el.get() * per_el + face * nfp..][..nfp];

            match layout.info.opposite(record.id)? {
                FaceStorage::Interior(other) => {
                    let ext_base = layout.el_offsets[other.el_face.element];
                    for (term, operand) in flux.interiors.iter().zip(&operands.interiors) {
                        for k in 0..nfp {
                            out[k] += term.term.apply(
                                operand.at(base + native[k]),
                                operand.at(ext_base + ext[k]),
                                normal,
                            );
                        }
                    }
                }
                FaceStorage::Boundary(bdry) => {
                    let terms = flux.boundaries.iter().zip(&operands.boundaries);
                    for (term, (field, bfield)) in terms.filter(|(t, _)| t.tag.matches(bdry.tag)) {
                        for k in 0..nfp {
                            out[k] += term.term.apply(
                                field.at(base + native[k]),
                                bfield.at(bdry.gpu_bdry_index + ext[k]),
                                normal,
                            );
                        }
                    }
                }
            }
            out.iter_mut().for_each(|v| *v *= scale);
        }
    }
    Ok(values)
}

/// Evaluate `flux` into the volume vector `output`.
pub fn apply_flux(
    backend: &dyn KernelBackend,
    ops: &FluxOperators,
    flux: &WholeDomainFlux,
    operands: &FluxOperands<'_>,
    layout: &FluxLayout<'_>,
    output: &mut [f64],
) -> Result<()> {
    if operands.interiors.len() != flux.interiors.len() {
        return Err(ExecError::dimension_mismatch(flux.interiors.len(), operands.interiors.len()).into());
    }
    if operands.boundaries.len() != flux.boundaries.len() {
        return Err(
            ExecError::dimension_mismatch(flux.boundaries.len(), operands.boundaries.len()).into(),
        );
    }
    for operand in &operands.interiors {
        operand.check_len(layout.volume_len)?;
    }
    for (field, bfield) in &operands.boundaries {
        field.check_len(layout.volume_len)?;
        bfield.check_len(layout.boundary_len)?;
    }

    let nfp = ops.face_node_count;
    let faces = gather(flux, operands, layout, nfp)?;

    let per_el = layout.geometry.faces_per_el() * nfp;
    let in_offsets: Vec<usize> = (0..layout.el_offsets.len()).map(|e| e * per_el).collect();
    let scales: Vec<f64> = if flux.is_lift {
        layout.geometry.jacobians().iter().map(|j| 1.0 / j).collect()
    } else {
        vec![1.0; layout.el_offsets.len()]
    };
    let batch = ElementBatch::new(&in_offsets, layout.el_offsets, &scales);
    backend.element_matmul(ops.matrix(flux.is_lift), &faces, &batch, output)?;
    Ok(())
}
