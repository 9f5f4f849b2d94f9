//! End-to-end runs of compiled templates on a discretization.
//!
//! Fields are sampled at the physical node coordinates, converted to the
//! device layout, run through the scheduler and reference kernels, and
//! compared with exact results on the host.

use approx::assert_relative_eq;

use dg_gpu::config::DiscretizationConfig;
use dg_gpu::device::{DeviceData, DeviceFuture};
use dg_gpu::local::LocalDiscretization;
use dg_gpu::mesh::{BoundarySelector, BoundaryTag, DgMesh, Mesh1D, Mesh2D};
use dg_gpu::optemplate::{Expr, FluxTerm, WholeDomainFlux};
use dg_gpu::exec::TieBreak;
use dg_gpu::{Bindings, Discretization, Executor, OperatorCompiler};

fn sample_1d(mesh: &Mesh1D, ldis: &LocalDiscretization, f: impl Fn(f64) -> f64) -> Vec<f64> {
    let nodes = ldis.reference_nodes();
    let mut out = Vec::with_capacity(mesh.n_elements() * nodes.len());
    for k in 0..mesh.n_elements() {
        for r in &nodes {
            out.push(f(mesh.reference_to_physical(k, r[0])));
        }
    }
    out
}

fn sample_2d(
    mesh: &Mesh2D,
    ldis: &LocalDiscretization,
    n_elements: usize,
    f: impl Fn(f64, f64) -> f64,
) -> Vec<f64> {
    let nodes = ldis.reference_nodes();
    let mut out = Vec::with_capacity(n_elements * nodes.len());
    for k in 0..n_elements {
        for rs in &nodes {
            let (x, y) = mesh.reference_to_physical(k, rs[0], rs[1]);
            out.push(f(x, y));
        }
    }
    out
}

fn discr_2d(config: DiscretizationConfig) -> (Discretization, Mesh2D, LocalDiscretization) {
    let tags = [
        BoundaryTag::Wall,
        BoundaryTag::Open,
        BoundaryTag::Wall,
        BoundaryTag::Open,
    ];
    let mesh = Mesh2D::uniform_rectangle_with_sides(0.0, 2.0, 0.0, 1.0, 4, 3, tags).unwrap();
    let ldis = LocalDiscretization::quadrilateral(3);
    let discr = Discretization::new(mesh.clone(), ldis.clone(), DeviceData::reference(), config).unwrap();
    (discr, mesh, ldis)
}

fn bind(discr: &Discretization, entries: &[(&str, &[f64])]) -> Bindings {
    let mut bindings = Bindings::new();
    for (name, host) in entries {
        bindings.insert(name.to_string(), discr.convert_volume(host).unwrap());
    }
    bindings
}

#[test]
fn test_derivative_of_linear_field_1d() {
    let mesh = Mesh1D::uniform(-1.0, 2.0, 7).unwrap();
    let ldis = LocalDiscretization::line(3);
    let discr = Discretization::new(
        mesh.clone(),
        ldis.clone(),
        DeviceData::reference(),
        DiscretizationConfig::default(),
    )
    .unwrap();
    let u = sample_1d(&mesh, &ldis, |x| 3.0 * x + 1.0);
    let out = discr
        .run(&Expr::diff(0, Expr::var("u")), bind(&discr, &[("u", &u[..])]))
        .unwrap();
    for v in discr.volume_to_host(&out[0]).unwrap() {
        assert_relative_eq!(v, 3.0, epsilon = 1e-10);
    }
}

#[test]
fn test_gradient_of_linear_field_2d() {
    let (discr, mesh, ldis) = discr_2d(DiscretizationConfig::default());
    let u = sample_2d(&mesh, &ldis, 12, |x, y| x - 2.0 * y + 0.25);
    let grad = vec![Expr::diff(0, Expr::var("u")), Expr::diff(1, Expr::var("u"))];
    let code = dg_gpu::OperatorCompiler::default().compile_many(&grad).unwrap();
    let out = discr.execute(&code, bind(&discr, &[("u", &u[..])])).unwrap();
    for v in discr.volume_to_host(&out[0]).unwrap() {
        assert_relative_eq!(v, 1.0, epsilon = 1e-10);
    }
    for v in discr.volume_to_host(&out[1]).unwrap() {
        assert_relative_eq!(v, -2.0, epsilon = 1e-10);
    }
}

#[test]
fn test_jump_flux_of_continuous_field_vanishes() {
    let (discr, mesh, ldis) = discr_2d(DiscretizationConfig::default());
    let u = sample_2d(&mesh, &ldis, 12, |x, y| x * y + y);
    let flux = WholeDomainFlux::lift()
        .with_interior(FluxTerm::jump().with_normal(0), Expr::var("u"))
        .with_interior(FluxTerm::jump().with_normal(1), Expr::var("u"));
    let out = discr
        .run(&Expr::flux(flux), bind(&discr, &[("u", &u[..])]))
        .unwrap();
    for v in discr.volume_to_host(&out[0]).unwrap() {
        assert_relative_eq!(v, 0.0, epsilon = 1e-10);
    }
}

#[test]
fn test_mass_integrates_area() {
    let (discr, _, _) = discr_2d(DiscretizationConfig::default());
    let ones = vec![1.0; discr.host_dof_count()];
    let out = discr
        .run(&Expr::mass(Expr::var("u")), bind(&discr, &[("u", &ones[..])]))
        .unwrap();
    let total: f64 = discr.volume_to_host(&out[0]).unwrap().iter().sum();
    assert_relative_eq!(total, 2.0, epsilon = 1e-12);

    let back = discr
        .run(
            &Expr::inverse_mass(Expr::mass(Expr::var("u"))),
            bind(&discr, &[("u", &ones[..])]),
        )
        .unwrap();
    for v in discr.volume_to_host(&back[0]).unwrap() {
        assert_relative_eq!(v, 1.0, epsilon = 1e-10);
    }
}

#[test]
fn test_vectorized_matches_plain() {
    let template = Expr::constant(2.0) * Expr::var("u") * Expr::var("v") - Expr::var("v")
        + -Expr::var("u");
    let (plain, mesh, ldis) = discr_2d(DiscretizationConfig::default());
    let (vectorized, _, _) = discr_2d(DiscretizationConfig::default().with_vectorize(true));
    let u = sample_2d(&mesh, &ldis, 12, |x, y| x.sin() + y);
    let v = sample_2d(&mesh, &ldis, 12, |x, y| x * x - y);

    let a = plain
        .run(&template, bind(&plain, &[("u", &u[..]), ("v", &v[..])]))
        .unwrap();
    let b = vectorized
        .run(&template, bind(&vectorized, &[("u", &u[..]), ("v", &v[..])]))
        .unwrap();
    let a = plain.volume_to_host(&a[0]).unwrap();
    let b = vectorized.volume_to_host(&b[0]).unwrap();
    for ((x, y), (ui, vi)) in a.iter().zip(&b).zip(u.iter().zip(&v)) {
        assert_relative_eq!(x, y, epsilon = 1e-12);
        assert_relative_eq!(*x, 2.0 * ui * vi - vi - ui, epsilon = 1e-12);
    }
}

#[test]
fn test_boundary_flux_reads_converted_boundary_data() {
    let mesh = Mesh1D::uniform(0.0, 1.0, 4).unwrap();
    let ldis = LocalDiscretization::line(2);
    let discr = Discretization::new(
        mesh,
        ldis,
        DeviceData::reference(),
        DiscretizationConfig::default(),
    )
    .unwrap();
    let bc = discr
        .convert_boundary(&[2.0, 5.0], BoundarySelector::All)
        .unwrap();

    // exterior value only, face mass: lands on the end nodes unchanged
    let flux = WholeDomainFlux::face_mass().with_boundary(
        FluxTerm::new(0.0, 1.0),
        Expr::var("u"),
        Expr::var("bc"),
        BoundarySelector::All,
    );
    let mut bindings = bind(&discr, &[("u", &vec![0.0; discr.host_dof_count()][..])]);
    bindings.insert("bc".into(), bc);
    let out = discr.run(&Expr::flux(flux), bindings).unwrap();

    let host = discr.volume_to_host(&out[0]).unwrap();
    let mut expected = vec![0.0; 12];
    expected[0] = 2.0;
    expected[11] = 5.0;
    for (a, b) in host.iter().zip(&expected) {
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }
}

#[test]
fn test_boundary_tags_select_faces() {
    let (discr, _, _) = discr_2d(DiscretizationConfig::default());
    let open = BoundarySelector::Tag(BoundaryTag::Open);
    let wall = BoundarySelector::Tag(BoundaryTag::Wall);
    // 3 faces on each of east and west, 4 on each of south and north, 4 nodes per face
    assert_eq!(discr.host_boundary_len(open), 6 * 4);
    assert_eq!(discr.host_boundary_len(wall), 8 * 4);
    assert_eq!(discr.host_boundary_len(BoundarySelector::All), 14 * 4);

    let host: Vec<f64> = (0..24).map(|i| i as f64 * 0.5).collect();
    let future = discr.convert_boundary_async(&host, open).unwrap();
    let value = Box::new(future).resolve().unwrap();
    assert_eq!(discr.boundary_to_host(&value, open).unwrap(), host);
    // wall slots of the same vector stay zero
    assert!(discr
        .boundary_to_host(&value, wall)
        .unwrap()
        .iter()
        .all(|&v| v == 0.0));
}

#[test]
fn test_repeated_runs_reuse_compiled_code() {
    let (discr, _, _) = discr_2d(DiscretizationConfig::default());
    let ones = vec![1.0; discr.host_dof_count()];
    let template = Expr::diff(0, Expr::var("u")) + Expr::var("u");
    for _ in 0..3 {
        let out = discr.run(&template, bind(&discr, &[("u", &ones[..])])).unwrap();
        for v in discr.volume_to_host(&out[0]).unwrap() {
            assert_relative_eq!(v, 1.0, epsilon = 1e-10);
        }
    }
    assert_eq!(discr.compiled_count(), 1);
}

#[test]
fn test_compiled_results_independent_of_execution_order() {
    let (discr, mesh, ldis) = discr_2d(DiscretizationConfig::default());
    let u = Expr::var("u");
    let inner = Expr::flux(
        WholeDomainFlux::lift().with_interior(FluxTerm::jump().with_normal(0), u.clone()),
    );
    let outer = Expr::flux(
        WholeDomainFlux::lift().with_interior(FluxTerm::central(), inner + Expr::diff(1, u.clone())),
    );
    let template = outer
        + Expr::mass(Expr::diff(0, u.clone()))
        + Expr::inverse_mass(Expr::mass(u));

    let first = OperatorCompiler::default().compile(&template).unwrap();
    let second = OperatorCompiler::default().compile(&template).unwrap();
    assert_eq!(first.to_string(), second.to_string());

    let host = sample_2d(&mesh, &ldis, 12, |x, y| (x * y).sin() + x);
    let mut outputs = Vec::new();
    let mut orders = Vec::new();
    for (code, tie_break) in [(&first, TieBreak::First), (&second, TieBreak::Last)] {
        let mut mapper = discr.mapper();
        let (values, trace) = Executor::new()
            .with_tie_break(tie_break)
            .run(code, &mut mapper, bind(&discr, &[("u", &host[..])]))
            .unwrap();
        outputs.push(discr.volume_to_host(&values[0]).unwrap());
        orders.push(trace.executed());
    }

    assert_ne!(orders[0], orders[1]);
    for (a, b) in outputs[0].iter().zip(&outputs[1]) {
        assert_relative_eq!(a, b, epsilon = 1e-14);
    }
}
