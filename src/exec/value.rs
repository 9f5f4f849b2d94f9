//! Runtime values bound to variables during execution.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::device::{MemoryPool, PooledBuffer};
use crate::error::{ExecError, ResourceError};

/// Device-resident vector. Cloning shares the storage.
pub type DeviceVector = Arc<PooledBuffer>;

/// Variable name to value, in binding order.
pub type Bindings = IndexMap<String, Value>;

/// A scalar or a device vector.
#[derive(Clone, Debug)]
pub enum Value {
    Scalar(f64),
    Vector(DeviceVector),
}

impl Value {
    /// Copy `data` into a fresh buffer from `pool`.
    pub fn vector_from_slice(pool: &Arc<MemoryPool>, data: &[f64]) -> Result<Self, ResourceError> {
        let mut buf = pool.allocate(data.len())?;
        buf.copy_from_slice(data);
        Ok(Value::Vector(Arc::new(buf)))
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => Some(*s),
            Value::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&DeviceVector> {
        match self {
            Value::Scalar(_) => None,
            Value::Vector(v) => Some(v),
        }
    }

    /// The vector, or a type error naming `what`.
    pub fn expect_vector(&self, what: &str) -> Result<&DeviceVector, ExecError> {
        self.as_vector()
            .ok_or_else(|| ExecError::TypeMismatch(format!("{what}: expected vector, got scalar")))
    }

    /// Vector length, `None` for scalars.
    pub fn vector_len(&self) -> Option<usize> {
        self.as_vector().map(|v| v.len())
    }

    /// Copy of the contents as a plain `Vec`.
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Value::Scalar(s) => vec![*s],
            Value::Vector(v) => v.to_vec(),
        }
    }
}

impl From<f64> for Value {
    fn from(s: f64) -> Self {
        Value::Scalar(s)
    }
}

impl From<PooledBuffer> for Value {
    fn from(buf: PooledBuffer) -> Self {
        Value::Vector(Arc::new(buf))
    }
}
