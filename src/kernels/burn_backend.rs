//! Tensor kernel backend on Burn.
//!
//! Element inputs are gathered into the columns of one
//! `[ncols, n_elements]` tensor so a whole batch is a single matmul.

use std::fmt;
use std::marker::PhantomData;

use burn::prelude::*;
use faer::Mat;

use super::{ElementBatch, KernelBackend};
use crate::error::ExecError;

/// Burn backends usable for element kernels.
pub trait TensorBackend: Backend {
    fn default_device() -> Self::Device;
}

#[cfg(feature = "burn-ndarray")]
impl TensorBackend for burn_ndarray::NdArray<f64> {
    fn default_device() -> Self::Device {
        burn_ndarray::NdArrayDevice::Cpu
    }
}

#[cfg(feature = "burn-wgpu")]
impl TensorBackend for burn_wgpu::Wgpu {
    fn default_device() -> Self::Device {
        burn_wgpu::WgpuDevice::default()
    }
}

#[cfg(feature = "burn-cuda")]
impl TensorBackend for burn_cuda::Cuda {
    fn default_device() -> Self::Device {
        burn_cuda::CudaDevice::default()
    }
}

fn tensor_from_vec<B: Backend>(data: Vec<f64>, shape: [usize; 2], device: &B::Device) -> Tensor<B, 2>
where
    B::FloatElem: From<f64>,
{
    let converted: Vec<B::FloatElem> = data.into_iter().map(B::FloatElem::from).collect();
    Tensor::from_data(
        burn::tensor::TensorData::new(converted, shape.to_vec()),
        device,
    )
}

fn readback_failed(detail: &impl fmt::Debug) -> ExecError {
    ExecError::kernel_failed("burn", format!("tensor readback: {detail:?}"))
}

fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f64>, ExecError>
where
    f64: From<B::FloatElem>,
{
    let data = tensor
        .into_data()
        .to_vec::<B::FloatElem>()
        .map_err(|e| readback_failed(&e))?;
    Ok(data.into_iter().map(f64::from).collect())
}

/// Runs `element_matmul` as a batched tensor product on `B`.
pub struct BurnBackend<B: Backend> {
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B: TensorBackend> Default for BurnBackend<B> {
    fn default() -> Self {
        Self::new(B::default_device())
    }
}

impl<B: Backend> BurnBackend<B> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> fmt::Debug for BurnBackend<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BurnBackend")
            .field("device", &self.device)
            .finish()
    }
}

impl<B: Backend> KernelBackend for BurnBackend<B>
where
    B::FloatElem: From<f64>,
    f64: From<B::FloatElem>,
{
    fn name(&self) -> &'static str {
        "burn"
    }

    fn element_matmul(
        &self,
        matrix: &Mat<f64>,
        input: &[f64],
        batch: &ElementBatch<'_>,
        output: &mut [f64],
    ) -> Result<(), ExecError> {
        batch.validate(matrix, input.len(), output.len())?;
        if batch.is_empty() {
            return Ok(());
        }
        let (rows, cols, n) = (matrix.nrows(), matrix.ncols(), batch.len());

        let mut m = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                m.push(matrix[(i, j)]);
            }
        }
        // column e holds element e's input
        let mut x = vec![0.0; cols * n];
        for (e, &offset) in batch.in_offsets.iter().enumerate() {
            for j in 0..cols {
                x[j * n + e] = input[offset + j];
            }
        }

        let m = tensor_from_vec::<B>(m, [rows, cols], &self.device);
        let x = tensor_from_vec::<B>(x, [cols, n], &self.device);
        let y = tensor_to_vec(m.matmul(x))?;

        for (e, (&out, &scale)) in batch.out_offsets.iter().zip(batch.scales).enumerate() {
            for i in 0..rows {
                output[out + i] = scale * y[i * n + e];
            }
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "burn-ndarray"))]
mod tests {
    use super::*;
    use crate::kernels::ReferenceBackend;
    use approx::assert_relative_eq;

    #[test]
    fn test_readback_failure_is_kernel_error() {
        let err = readback_failed(&"dtype mismatch");
        assert!(matches!(err, ExecError::KernelFailed { backend: "burn", .. }));
        assert!(err.to_string().contains("dtype mismatch"));
    }

    #[test]
    fn test_matches_reference() {
        let matrix = Mat::from_fn(3, 2, |i, j| (i + 2 * j) as f64);
        let input: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let batch = ElementBatch::new(&[0, 2, 4], &[6, 0, 3], &[1.0, 2.0, 0.5]);
        let mut expected = vec![0.0; 9];
        let mut actual = vec![0.0; 9];
        ReferenceBackend::new()
            .element_matmul(&matrix, &input, &batch, &mut expected)
            .unwrap();
        BurnBackend::<burn_ndarray::NdArray<f64>>::default()
            .element_matmul(&matrix, &input, &batch, &mut actual)
            .unwrap();
        for (a, b) in expected.iter().zip(&actual) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }
}
