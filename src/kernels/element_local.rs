//! Mass and inverse mass application.

use faer::Mat;

use super::{matmul_flops, ElementBatch, ElementGeometry, KernelBackend};
use crate::error::ExecError;
use crate::local::LocalDiscretization;
use crate::optemplate::MassKind;

/// Reference mass and inverse mass matrices.
#[derive(Clone, Debug)]
pub struct MassOperators {
    mass: Mat<f64>,
    inverse_mass: Mat<f64>,
}

impl MassOperators {
    pub fn new(ldis: &LocalDiscretization) -> Self {
        Self {
            mass: ldis.mass_matrix(),
            inverse_mass: ldis.inverse_mass_matrix(),
        }
    }

    pub fn matrix(&self, kind: MassKind) -> &Mat<f64> {
        match kind {
            MassKind::Mass => &self.mass,
            MassKind::InverseMass => &self.inverse_mass,
        }
    }
}

pub fn mass_flops(ops: &MassOperators, elements: usize) -> u64 {
    matmul_flops(&ops.mass, elements)
}

/// `J M u` or `J^{-1} M^{-1} u` on every element.
pub fn apply_mass(
    backend: &dyn KernelBackend,
    ops: &MassOperators,
    kind: MassKind,
    geometry: &ElementGeometry,
    el_offsets: &[usize],
    field: &[f64],
    output: &mut [f64],
) -> Result<(), ExecError> {
    let scales: Vec<f64> = match kind {
        MassKind::Mass => geometry.jacobians().to_vec(),
        MassKind::InverseMass => geometry.jacobians().iter().map(|j| 1.0 / j).collect(),
    };
    let batch = ElementBatch::new(el_offsets, el_offsets, &scales);
    backend.element_matmul(ops.matrix(kind), field, &batch, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::ReferenceBackend;
    use crate::mesh::Mesh1D;
    use approx::assert_relative_eq;

    fn setup() -> (LocalDiscretization, ElementGeometry, Vec<usize>) {
        let mesh = Mesh1D::uniform(0.0, 3.0, 3).unwrap();
        let ldis = LocalDiscretization::line(2);
        let offsets = vec![0, 3, 6];
        (ldis, ElementGeometry::from_mesh(&mesh), offsets)
    }

    #[test]
    fn test_mass_integrates_constant() {
        let (ldis, geometry, offsets) = setup();
        let ops = MassOperators::new(&ldis);
        let field = vec![1.0; 9];
        let mut out = vec![0.0; 9];
        apply_mass(
            &ReferenceBackend::new(),
            &ops,
            MassKind::Mass,
            &geometry,
            &offsets,
            &field,
            &mut out,
        )
        .unwrap();
        // each element has length 1
        let total: f64 = out.iter().sum();
        assert_relative_eq!(total, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_undoes_mass() {
        let (ldis, geometry, offsets) = setup();
        let ops = MassOperators::new(&ldis);
        let backend = ReferenceBackend::new();
        let field: Vec<f64> = (0..9).map(|i| (i as f64).sin()).collect();
        let mut mass = vec![0.0; 9];
        let mut back = vec![0.0; 9];
        apply_mass(&backend, &ops, MassKind::Mass, &geometry, &offsets, &field, &mut mass).unwrap();
        apply_mass(
            &backend,
            &ops,
            MassKind::InverseMass,
            &geometry,
            &offsets,
            &mass,
            &mut back,
        )
        .unwrap();
        for (a, b) in field.iter().zip(&back) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }
}
