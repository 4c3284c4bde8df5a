use crate::StorageError;

/// Owned, fixed-length host buffer of `f32`.
///
/// `version` is bumped on every write so that derived values (e.g. the
/// string representation of a view) can tell when they are stale.
#[derive(Debug, PartialEq)]
pub struct CPUBuffer {
    data: Vec<f32>,
    version: u64,
}

impl CPUBuffer {
    /// Allocates `len` elements.
    ///
    /// Callers must not rely on the contents. They happen to be zeroed.
    pub fn uninitialized(len: usize) -> Result<Self, StorageError> {
        if len == 0 {
            return Err(StorageError::ZeroLength);
        }
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| StorageError::AllocationFailed { len })?;
        data.resize(len, 0.0);
        log::trace!("Allocated buffer: {:p} ({} elements)", data.as_ptr(), len);
        Ok(Self { data, version: 0 })
    }

    pub fn from_vec(data: Vec<f32>) -> Result<Self, StorageError> {
        if data.is_empty() {
            return Err(StorageError::ZeroLength);
        }
        log::trace!("Adopted buffer: {:p} ({} elements)", data.as_ptr(), data.len());
        Ok(Self { data, version: 0 })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, index: usize) -> Result<f32, StorageError> {
        self.data
            .get(index)
            .copied()
            .ok_or(StorageError::OutOfRange {
                index,
                len: self.data.len(),
            })
    }

    pub fn set(&mut self, index: usize, value: f32) -> Result<(), StorageError> {
        let len = self.data.len();
        let slot = self
            .data
            .get_mut(index)
            .ok_or(StorageError::OutOfRange { index, len })?;
        *slot = value;
        self.version += 1;
        Ok(())
    }

    /// Writes `f(k)` to every physical slot `k`, in buffer order.
    pub fn fill_with<F: FnMut(usize) -> f32>(&mut self, mut f: F) {
        self.data
            .iter_mut()
            .enumerate()
            .for_each(|(k, slot)| *slot = f(k));
        self.version += 1;
    }
}

impl Drop for CPUBuffer {
    fn drop(&mut self) {
        log::trace!("Releasing buffer: {:p}", self.data.as_ptr());
    }
}
