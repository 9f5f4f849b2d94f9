//! Gauss-Lobatto-Legendre nodes, weights and the 1D nodal differentiation matrix.
//!
//! The N+1 GLL nodes are the roots of (1-x²)P'_N(x), which includes the
//! endpoints x = ±1. Face nodes therefore coincide with volume nodes and the
//! quadrature mass matrix is diagonal.

use std::f64::consts::PI;

use faer::Mat;

/// Evaluate P_n(x) and P_{n-1}(x) with the three-term recurrence.
///
/// (n+1) P_{n+1}(x) = (2n+1) x P_n(x) - n P_{n-1}(x)
fn legendre_pair(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.0;
    let mut p_curr = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 1..n {
        let p_next = ((2 * k + 1) as f64 * x * p_curr - k as f64 * p_prev) / (k + 1) as f64;
        p_prev = p_curr;
        p_curr = p_next;
    }
    (p_curr, p_prev)
}

/// Evaluate the Legendre polynomial P_n(x).
pub fn legendre(n: usize, x: f64) -> f64 {
    legendre_pair(n, x).0
}

/// Compute Gauss-Lobatto-Legendre nodes for polynomial order N.
///
/// Returns N+1 nodes in [-1, 1], including the endpoints.
/// Uses Newton iteration starting from Chebyshev-Lobatto nodes.
pub fn gauss_lobatto_nodes(order: usize) -> Vec<f64> {
    let n = order;
    if n == 0 {
        return vec![0.0];
    }

    // x_j = -cos(π j / N)
    let mut nodes: Vec<f64> = (0..=n).map(|j| -(PI * j as f64 / n as f64).cos()).collect();
    nodes[0] = -1.0;
    nodes[n] = 1.0;

    let nn1 = (n * (n + 1)) as f64;
    for x in nodes.iter_mut().take(n).skip(1) {
        for _ in 0..100 {
            let (p_n, p_nm1) = legendre_pair(n, *x);
            // P'_N = n (x P_N - P_{N-1}) / (x² - 1), and d/dx[(1-x²)P'_N] = -n(n+1) P_N
            let dp_n = n as f64 * (*x * p_n - p_nm1) / (*x * *x - 1.0);
            let update = (1.0 - *x * *x) * dp_n / (nn1 * p_n);
            *x += update;
            if update.abs() < 1e-15 {
                break;
            }
        }
    }

    nodes
}

/// Compute Gauss-Lobatto-Legendre weights.
///
/// w_j = 2 / (N(N+1) [P_N(x_j)]²)
pub fn gauss_lobatto_weights(order: usize, nodes: &[f64]) -> Vec<f64> {
    if order == 0 {
        return vec![2.0];
    }
    let denom = (order * (order + 1)) as f64;
    nodes
        .iter()
        .map(|&x| {
            let p_n = legendre(order, x);
            2.0 / (denom * p_n * p_n)
        })
        .collect()
}

/// Lagrange differentiation matrix at `nodes` in barycentric form.
///
/// D[i, j] = l_j'(x_i). Diagonal entries use the negative row sum, so
/// constants are differentiated to exactly zero.
pub fn differentiation_matrix(nodes: &[f64]) -> Mat<f64> {
    let n = nodes.len();
    let bary: Vec<f64> = (0..n)
        .map(|j| {
            1.0 / (0..n)
                .filter(|&k| k != j)
                .map(|k| nodes[j] - nodes[k])
                .product::<f64>()
        })
        .collect();

    let mut d = Mat::zeros(n, n);
    for i in 0..n {
        let mut row_sum = 0.0;
        for j in 0..n {
            if i != j {
                let v = bary[j] / bary[i] / (nodes[i] - nodes[j]);
                d[(i, j)] = v;
                row_sum += v;
            }
        }
        d[(i, i)] = -row_sum;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nodes_endpoints_and_symmetry() {
        for order in 1..=6 {
            let nodes = gauss_lobatto_nodes(order);
            assert_eq!(nodes.len(), order + 1);
            assert_relative_eq!(nodes[0], -1.0, epsilon = 1e-14);
            assert_relative_eq!(nodes[order], 1.0, epsilon = 1e-14);
            for i in 0..nodes.len() / 2 {
                assert_relative_eq!(nodes[i], -nodes[order - i], epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn test_order_two_nodes() {
        let nodes = gauss_lobatto_nodes(2);
        assert_relative_eq!(nodes[1], 0.0, epsilon = 1e-14);
        let w = gauss_lobatto_weights(2, &nodes);
        assert_relative_eq!(w[0], 1.0 / 3.0, epsilon = 1e-14);
        assert_relative_eq!(w[1], 4.0 / 3.0, epsilon = 1e-14);
    }

    #[test]
    fn test_weights_sum_to_two() {
        for order in 1..=6 {
            let nodes = gauss_lobatto_nodes(order);
            let sum: f64 = gauss_lobatto_weights(order, &nodes).iter().sum();
            assert_relative_eq!(sum, 2.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn test_differentiates_polynomials_exactly() {
        let order = 4;
        let nodes = gauss_lobatto_nodes(order);
        let d = differentiation_matrix(&nodes);
        for i in 0..nodes.len() {
            let du: f64 = (0..nodes.len()).map(|j| d[(i, j)] * nodes[j].powi(3)).sum();
            assert_relative_eq!(du, 3.0 * nodes[i] * nodes[i], epsilon = 1e-11);
        }
    }
}
