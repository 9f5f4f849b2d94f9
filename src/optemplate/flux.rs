//! Whole-domain flux expressions.
//!
//! A flux is evaluated at every face node. Each term combines the interior
//! and exterior values of one field linearly and may be weighted by one
//! component of the outward normal:
//!
//! ```text
//! f = sum_terms (int_coeff * u_int + ext_coeff * u_ext) * [n_axis]
//! ```
//!
//! Interior terms apply on faces shared by two elements. Boundary terms
//! apply on boundary faces selected by their tag and read the exterior
//! value from a boundary vector. The per-face result is then multiplied by
//! the face jacobian and either lifted into the volume or left as a
//! face-mass product.

use std::fmt;

use super::expr::{Expr, Scalar};
use crate::mesh::BoundarySelector;

/// Which flux batches a flux may share.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FluxKind {
    /// Has interior terms, possibly boundary terms too.
    WholeDomain,
    /// Boundary terms only.
    Boundary,
}

/// One linear two-sided term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FluxTerm {
    pub int_coeff: Scalar,
    pub ext_coeff: Scalar,
    /// Multiply by this component of the outward normal.
    pub normal_axis: Option<usize>,
}

impl FluxTerm {
    pub fn new(int_coeff: f64, ext_coeff: f64) -> Self {
        Self {
            int_coeff: Scalar(int_coeff),
            ext_coeff: Scalar(ext_coeff),
            normal_axis: None,
        }
    }

    /// Central average `(u_int + u_ext) / 2`.
    pub fn central() -> Self {
        Self::new(0.5, 0.5)
    }

    /// Jump `u_int - u_ext`.
    pub fn jump() -> Self {
        Self::new(1.0, -1.0)
    }

    pub fn with_normal(mut self, axis: usize) -> Self {
        self.normal_axis = Some(axis);
        self
    }

    /// Value of the term at one face node.
    pub fn apply(&self, int: f64, ext: f64, normal: &[f64]) -> f64 {
        let value = self.int_coeff.get() * int + self.ext_coeff.get() * ext;
        match self.normal_axis {
            Some(axis) => value * normal.get(axis).copied().unwrap_or(0.0),
            None => value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InteriorFlux {
    pub term: FluxTerm,
    pub field: Expr,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoundaryFlux {
    pub term: FluxTerm,
    /// Volume field supplying the interior value.
    pub field: Expr,
    /// Boundary vector supplying the exterior value.
    pub bfield: Expr,
    pub tag: BoundarySelector,
}

/// Sum of interior and boundary flux terms over the whole mesh.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct WholeDomainFlux {
    /// Lift the face values into the volume (`M^{-1}` applied).
    pub is_lift: bool,
    pub interiors: Vec<InteriorFlux>,
    pub boundaries: Vec<BoundaryFlux>,
}

impl WholeDomainFlux {
    pub fn lift() -> Self {
        Self {
            is_lift: true,
            ..Self::default()
        }
    }

    pub fn face_mass() -> Self {
        Self::default()
    }

    pub fn with_interior(mut self, term: FluxTerm, field: Expr) -> Self {
        self.interiors.push(InteriorFlux { term, field });
        self
    }

    pub fn with_boundary(
        mut self,
        term: FluxTerm,
        field: Expr,
        bfield: Expr,
        tag: impl Into<BoundarySelector>,
    ) -> Self {
        self.boundaries.push(BoundaryFlux {
            term,
            field,
            bfield,
            tag: tag.into(),
        });
        self
    }

    pub fn kind(&self) -> FluxKind {
        if self.interiors.is_empty() {
            FluxKind::Boundary
        } else {
            FluxKind::WholeDomain
        }
    }

    /// Every operand expression, interior fields first.
    pub fn operands(&self) -> impl Iterator<Item = &Expr> {
        self.interiors.iter().map(|i| &i.field).chain(
            self.boundaries
                .iter()
                .flat_map(|b| [&b.field, &b.bfield]),
        )
    }

    /// Apply `f` to every operand, keeping the flux structure.
    pub fn map_operands<E>(&self, mut f: impl FnMut(&Expr) -> Result<Expr, E>) -> Result<Self, E> {
        let interiors = self
            .interiors
            .iter()
            .map(|i| {
                Ok(InteriorFlux {
                    term: i.term,
                    field: f(&i.field)?,
                })
            })
            .collect::<Result<Vec<_>, E>>()?;
        let boundaries = self
            .boundaries
            .iter()
            .map(|b| {
                Ok(BoundaryFlux {
                    term: b.term,
                    field: f(&b.field)?,
                    bfield: f(&b.bfield)?,
                    tag: b.tag,
                })
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self {
            is_lift: self.is_lift,
            interiors,
            boundaries,
        })
    }
}

impl fmt::Display for FluxTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*int + {}*ext", self.int_coeff, self.ext_coeff)?;
        if let Some(axis) = self.normal_axis {
            write!(f, " (n{axis})")?;
        }
        Ok(())
    }
}

impl fmt::Display for WholeDomainFlux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_lift { "Lift[" } else { "FaceMass[" })?;
        let mut first = true;
        for i in &self.interiors {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", i.field, i.term)?;
        }
        for b in &self.boundaries {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}|{}@{:?}: {}", b.field, b.bfield, b.tag, b.term)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::BoundaryTag;
    use approx::assert_relative_eq;

    #[test]
    fn test_term_apply() {
        let t = FluxTerm::central();
        assert_relative_eq!(t.apply(1.0, 3.0, &[1.0]), 2.0);
        let t = FluxTerm::jump().with_normal(1);
        assert_relative_eq!(t.apply(1.0, 3.0, &[0.0, -1.0]), 2.0);
    }

    #[test]
    fn test_kind() {
        let wd = WholeDomainFlux::lift().with_interior(FluxTerm::central(), Expr::var("u"));
        assert_eq!(wd.kind(), FluxKind::WholeDomain);
        let bd = WholeDomainFlux::lift().with_boundary(
            FluxTerm::jump(),
            Expr::var("u"),
            Expr::var("bc"),
            BoundaryTag::Wall,
        );
        assert_eq!(bd.kind(), FluxKind::Boundary);
    }

    #[test]
    fn test_operands_and_map() {
        let flux = WholeDomainFlux::lift()
            .with_interior(FluxTerm::central(), Expr::var("u"))
            .with_boundary(FluxTerm::jump(), Expr::var("v"), Expr::var("bc"), BoundarySelector::All);
        let names: Vec<_> = flux.operands().filter_map(Expr::as_variable).collect();
        assert_eq!(names, vec!["u", "v", "bc"]);

        let renamed = flux
            .map_operands(|e| Ok::<_, ()>(Expr::var(format!("{e}_1"))))
            .unwrap();
        let names: Vec<_> = renamed.operands().filter_map(Expr::as_variable).collect();
        assert_eq!(names, vec!["u_1", "v_1", "bc_1"]);
        assert_eq!(renamed.interiors[0].term, FluxTerm::central());
    }
}
