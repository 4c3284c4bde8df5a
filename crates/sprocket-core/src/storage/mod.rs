mod cpu_buffer;

pub use cpu_buffer::*;

use crate::StorageId;
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to allocate storage of {len} elements")]
    AllocationFailed { len: usize },
    #[error("Storage must hold at least one element")]
    ZeroLength,
    #[error("Physical index {index} is out of range for storage of length {len}")]
    OutOfRange { index: usize, len: usize },
    #[error("Physical index {0} is negative")]
    NegativeIndex(isize),
}

/// Shared handle to a flat buffer.
///
/// Every clone is one more reference to the same buffer; the buffer is
/// released when the last handle is dropped. There is no other way to add
/// or remove a reference.
#[derive(Clone)]
pub struct Storage {
    id: StorageId,
    inner: Arc<RwLock<CPUBuffer>>,
}

impl Storage {
    pub fn allocate(len: usize) -> Result<Self, StorageError> {
        Ok(Self::from(CPUBuffer::uninitialized(len)?))
    }

    pub fn from_vec(data: Vec<f32>) -> Result<Self, StorageError> {
        Ok(Self::from(CPUBuffer::from_vec(data)?))
    }

    pub fn id(&self) -> StorageId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Result<f32, StorageError> {
        self.inner.read().get(index)
    }

    pub fn set(&self, index: usize, value: f32) -> Result<(), StorageError> {
        self.inner.write().set(index, value)
    }

    pub fn fill(&self, value: f32) {
        self.fill_with(|_| value);
    }

    pub fn fill_with<F: FnMut(usize) -> f32>(&self, f: F) {
        self.inner.write().fill_with(f);
    }

    pub fn version(&self) -> u64 {
        self.inner.read().version()
    }

    /// Read access to the whole buffer, held until the guard drops.
    pub fn buffer(&self) -> RwLockReadGuard<CPUBuffer> {
        self.inner.read()
    }

    /// Copies out the buffer in physical order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.buffer().as_slice().to_vec()
    }

    /// Number of live handles to this buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Storage) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakStorage {
        WeakStorage {
            id: self.id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl From<CPUBuffer> for Storage {
    fn from(buffer: CPUBuffer) -> Self {
        let id = StorageId::new();
        log::trace!("{:?} holds {} elements", id, buffer.len());
        Self {
            id,
            inner: Arc::new(RwLock::new(buffer)),
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffer = self.inner.read();
        f.debug_struct("Storage")
            .field("id", &self.id)
            .field("len", &buffer.len())
            .field("refs", &self.ref_count())
            .field("version", &buffer.version())
            .finish()
    }
}

/// Non-owning observer of a [`Storage`], used to watch for its release.
#[derive(Debug, Clone)]
pub struct WeakStorage {
    id: StorageId,
    inner: Weak<RwLock<CPUBuffer>>,
}

impl WeakStorage {
    pub fn id(&self) -> StorageId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<Storage> {
        self.inner.upgrade().map(|inner| Storage { id: self.id, inner })
    }
}
