//! Operator templates: already-bound, normalized expression trees.
//!
//! The algebra that produces templates lives outside this crate; here a
//! template is only a data structure for the compiler to consume.
//!
//! ```
//! use dg_gpu::optemplate::{Expr, FluxTerm, WholeDomainFlux};
//!
//! // -du/dx + lifted central flux of u
//! let flux = WholeDomainFlux::lift().with_interior(FluxTerm::central(), Expr::var("u"));
//! let rhs = -Expr::diff(0, Expr::var("u")) + Expr::flux(flux);
//! assert_eq!(rhs.children().len(), 2);
//! ```

mod collect;
mod expr;
mod flux;

pub use collect::{bound_operators, contained_fluxes, dependencies, walk};
pub use expr::{DiffKind, Expr, MassKind, Operator, Scalar};
pub use flux::{BoundaryFlux, FluxKind, FluxTerm, InteriorFlux, WholeDomainFlux};
