//! Moving fields between flat host arrays and device layout.
//!
//! Host volume vectors hold `dofs_per_el` values per element in element
//! order. Host boundary vectors hold `face_node_count` values per boundary
//! face, faces in mesh order restricted to the selected tag. Device
//! vectors follow the block layout; padding reads back as zero.

use std::sync::Arc;

use super::Discretization;
use crate::device::StreamFuture;
use crate::error::{ExecError, Result};
use crate::exec::Value;
use crate::mesh::{BoundaryFace, BoundarySelector};

fn scatter(host: &[f64], embedding: &[usize], device: &mut [f64]) {
    for (&value, &index) in host.iter().zip(embedding) {
        device[index] = value;
    }
}

fn check_len(expected: usize, actual: usize) -> std::result::Result<(), ExecError> {
    if expected != actual {
        return Err(ExecError::dimension_mismatch(expected, actual));
    }
    Ok(())
}

impl Discretization {
    /// Boundary faces matching `tag`, in mesh order.
    pub fn boundary_faces(&self, tag: BoundarySelector) -> Vec<BoundaryFace> {
        self.mesh.boundary_faces(tag)
    }

    /// Length of a host boundary vector for `tag`.
    pub fn host_boundary_len(&self, tag: BoundarySelector) -> usize {
        self.boundary_faces(tag).len() * self.face_storage.face_node_count
    }

    fn boundary_embedding(&self, tag: BoundarySelector) -> Result<Arc<Vec<usize>>> {
        if let Some(embedding) = self.boundary_embeddings.lock().get(&tag) {
            return Ok(Arc::clone(embedding));
        }
        let embedding = Arc::new(self.face_storage.boundary_embedding(&self.boundary_faces(tag))?);
        self.boundary_embeddings
            .lock()
            .insert(tag, Arc::clone(&embedding));
        Ok(embedding)
    }

    fn boundarize_map(&self, tag: BoundarySelector) -> Result<Arc<(Vec<usize>, Vec<usize>)>> {
        if let Some(map) = self.boundarize_maps.lock().get(&tag) {
            return Ok(Arc::clone(map));
        }
        let map = Arc::new(
            self.face_storage
                .boundarize_info(&self.boundary_faces(tag), &self.layout)?,
        );
        self.boundarize_maps.lock().insert(tag, Arc::clone(&map));
        Ok(map)
    }

    /// A zero device volume vector.
    pub fn volume_zeros(&self) -> Result<Value> {
        let buf = self.device_pool.allocate(self.gpu_dof_count())?;
        Ok(Value::Vector(Arc::new(buf)))
    }

    /// A zero device boundary vector.
    pub fn boundary_zeros(&self) -> Result<Value> {
        let buf = self.device_pool.allocate(self.aligned_boundary_dof_count())?;
        Ok(Value::Vector(Arc::new(buf)))
    }

    /// Host volume vector to device layout.
    pub fn convert_volume(&self, host: &[f64]) -> Result<Value> {
        check_len(self.host_dof_count(), host.len())?;
        let mut buf = self.device_pool.allocate(self.gpu_dof_count())?;
        scatter(host, &self.volume_embedding, &mut buf);
        Ok(Value::Vector(Arc::new(buf)))
    }

    /// Device volume vector back to host order. Scalars broadcast.
    pub fn volume_to_host(&self, value: &Value) -> Result<Vec<f64>> {
        match value {
            Value::Scalar(s) => Ok(vec![*s; self.host_dof_count()]),
            Value::Vector(v) => {
                check_len(self.gpu_dof_count(), v.len())?;
                Ok(self.volume_embedding.iter().map(|&i| v[i]).collect())
            }
        }
    }

    /// Host boundary vector for `tag` to device boundary layout.
    pub fn convert_boundary(&self, host: &[f64], tag: BoundarySelector) -> Result<Value> {
        let embedding = self.boundary_embedding(tag)?;
        check_len(embedding.len(), host.len())?;
        let mut buf = self.device_pool.allocate(self.aligned_boundary_dof_count())?;
        scatter(host, &embedding, &mut buf);
        Ok(Value::Vector(Arc::new(buf)))
    }

    /// Device boundary vector back to host order for `tag`.
    pub fn boundary_to_host(&self, value: &Value, tag: BoundarySelector) -> Result<Vec<f64>> {
        let embedding = self.boundary_embedding(tag)?;
        let v = value.expect_vector("boundary field")?;
        check_len(self.aligned_boundary_dof_count(), v.len())?;
        Ok(embedding.iter().map(|&i| v[i]).collect())
    }

    /// Like [`Self::convert_boundary`], but the transfer runs on a stream.
    ///
    /// The host data is staged in page-locked memory before this returns,
    /// so `host` may be reused immediately.
    pub fn convert_boundary_async(&self, host: &[f64], tag: BoundarySelector) -> Result<StreamFuture> {
        let embedding = self.boundary_embedding(tag)?;
        check_len(embedding.len(), host.len())?;
        let mut staged = self.pagelocked_pool.allocate(host.len())?;
        staged.copy_from_slice(host);

        let device_pool = Arc::clone(&self.device_pool);
        let len = self.aligned_boundary_dof_count();
        let future = StreamFuture::spawn(&self.streams, format!("boundary upload {tag:?}"), move || {
            let mut buf = device_pool.allocate(len)?;
            scatter(&staged, &embedding, &mut buf);
            Ok(Value::Vector(Arc::new(buf)))
        })?;
        Ok(future)
    }

    /// Copy the face values of a device volume field into device boundary
    /// storage for the faces matching `tag`. Other slots stay zero.
    pub fn boundarize_volume_field(&self, field: &Value, tag: BoundarySelector) -> Result<Value> {
        let map = self.boundarize_map(tag)?;
        let (from, to) = (&map.0, &map.1);
        let mut buf = self.device_pool.allocate(self.aligned_boundary_dof_count())?;
        match field {
            Value::Scalar(s) => to.iter().for_each(|&j| buf[j] = *s),
            Value::Vector(v) => {
                check_len(self.gpu_dof_count(), v.len())?;
                for (&i, &j) in from.iter().zip(to) {
                    buf[j] = v[i];
                }
            }
        }
        Ok(Value::Vector(Arc::new(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscretizationConfig;
    use crate::device::{DeviceData, DeviceFuture};
    use crate::local::LocalDiscretization;
    use crate::mesh::{BoundaryTag, Mesh1D, Mesh2D};
    use approx::assert_relative_eq;

    fn discr_2d() -> Discretization {
        let tags = [
            BoundaryTag::Wall,
            BoundaryTag::Open,
            BoundaryTag::Wall,
            BoundaryTag::Open,
        ];
        Discretization::new(
            Mesh2D::uniform_rectangle_with_sides(0.0, 1.0, 0.0, 1.0, 3, 2, tags).unwrap(),
            LocalDiscretization::quadrilateral(2),
            DeviceData::reference(),
            DiscretizationConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_volume_round_trip() {
        let discr = discr_2d();
        let host: Vec<f64> = (0..discr.host_dof_count()).map(|i| i as f64 + 0.5).collect();
        let device = discr.convert_volume(&host).unwrap();
        assert_eq!(device.vector_len(), Some(discr.gpu_dof_count()));
        assert_eq!(discr.volume_to_host(&device).unwrap(), host);
    }

    #[test]
    fn test_volume_padding_is_zero() {
        let discr = discr_2d();
        let device = discr.convert_volume(&vec![1.0; discr.host_dof_count()]).unwrap();
        let total: f64 = device.to_vec().iter().sum();
        assert_relative_eq!(total, discr.host_dof_count() as f64);
    }

    #[test]
    fn test_boundary_round_trip_by_tag() {
        let discr = discr_2d();
        let open = BoundarySelector::Tag(BoundaryTag::Open);
        // east and west sides: two faces each, three nodes per face
        assert_eq!(discr.host_boundary_len(open), 12);
        let host: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let device = discr.convert_boundary(&host, open).unwrap();
        assert_eq!(device.vector_len(), Some(discr.aligned_boundary_dof_count()));
        assert_eq!(discr.boundary_to_host(&device, open).unwrap(), host);
    }

    #[test]
    fn test_async_matches_sync() {
        let discr = discr_2d();
        let n = discr.host_boundary_len(BoundarySelector::All);
        let host: Vec<f64> = (0..n).map(|i| (i * i) as f64).collect();
        let sync = discr.convert_boundary(&host, BoundarySelector::All).unwrap();
        let future = discr
            .convert_boundary_async(&host, BoundarySelector::All)
            .unwrap();
        let value = Box::new(future).resolve().unwrap();
        assert_eq!(value.to_vec(), sync.to_vec());
    }

    #[test]
    fn test_boundarize_then_read_back() {
        let mesh = Mesh1D::uniform(0.0, 1.0, 3).unwrap();
        let discr = Discretization::new(
            mesh,
            LocalDiscretization::line(2),
            DeviceData::reference(),
            DiscretizationConfig::default(),
        )
        .unwrap();
        let host: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let field = discr.convert_volume(&host).unwrap();
        let bdry = discr
            .boundarize_volume_field(&field, BoundarySelector::All)
            .unwrap();
        // left end of element 0, right end of element 2
        assert_eq!(
            discr.boundary_to_host(&bdry, BoundarySelector::All).unwrap(),
            vec![0.0, 8.0]
        );
    }

    #[test]
    fn test_length_checked() {
        let discr = discr_2d();
        let err = discr.convert_volume(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Exec(ExecError::DimensionMismatch { actual: 2, .. })
        ));
    }
}
