use crate::repr::ReprCache;
use crate::{
    rvec, Enforcer, InvariantError, RVec, Shape, Storage, StorageError, Strides, TensorId,
};

use derive_new::new;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error(transparent)]
    InvariantError(#[from] InvariantError),
    #[error(transparent)]
    StorageError(#[from] StorageError),
}

/// How a tensor reads its storage: shape, strides and starting offset.
#[derive(new, Debug, Clone, PartialEq)]
pub struct StorageView {
    shape: Shape,
    strides: Strides,
    offset: usize,
}

impl StorageView {
    /// Row-major view of `shape` starting at `offset`.
    pub fn contiguous(shape: Shape, offset: usize) -> Self {
        let strides = Strides::from(&shape);
        Self::new(shape, strides, offset)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_contiguous(&self) -> bool {
        self.strides.is_row_major_for(&self.shape)
    }
}

/// A multi-dimensional view of `f32` data.
///
/// A tensor never owns its buffer outright: it holds one handle to a shared
/// [`Storage`], and any number of tensors may alias the same buffer. Writes
/// through one view are visible through every other view of that storage.
/// The buffer lives as long as the longest-lived tensor referencing it.
pub struct Tensor {
    id: TensorId,
    view: StorageView,
    storage: Storage,
    repr: ReprCache,
}

impl Tensor {
    pub(crate) fn from_parts(storage: Storage, view: StorageView) -> Self {
        Self {
            id: TensorId::new(),
            view,
            storage,
            repr: ReprCache::default(),
        }
    }

    /// Allocates a tensor of `shape` with no guarantee about its contents.
    pub fn empty<S: Into<Shape>>(shape: S) -> Result<Tensor, TensorError> {
        let shape = shape.into();
        shape.validate()?;
        let numel = shape
            .checked_numel()
            .ok_or(StorageError::AllocationFailed { len: usize::MAX })?;
        let storage = Storage::allocate(numel)?;
        let tensor = Self::from_parts(storage, StorageView::contiguous(shape, 0));
        log::debug!(
            "Created {} with shape {:?} on {}",
            tensor.id,
            tensor.shape(),
            tensor.storage.id()
        );
        Ok(tensor)
    }

    pub fn full<S: Into<Shape>>(value: f32, shape: S) -> Result<Tensor, TensorError> {
        let tensor = Self::empty(shape)?;
        tensor.storage.fill(value);
        Ok(tensor)
    }

    pub fn zeros<S: Into<Shape>>(shape: S) -> Result<Tensor, TensorError> {
        Self::full(0.0, shape)
    }

    pub fn ones<S: Into<Shape>>(shape: S) -> Result<Tensor, TensorError> {
        Self::full(1.0, shape)
    }

    /// Fills the buffer in physical order with `start + k * step`.
    ///
    /// Unlike `torch.arange`, the element count comes from `shape` rather
    /// than from an end value.
    pub fn arange<S: Into<Shape>>(
        start: f32,
        step: f32,
        shape: S,
    ) -> Result<Tensor, TensorError> {
        let tensor = Self::empty(shape)?;
        tensor.storage.fill_with(|k| start + k as f32 * step);
        Ok(tensor)
    }

    /// Creates a new tensor from a chunk of row-major data.
    pub fn from_data<U: AsRef<[f32]>, S: Into<Shape>>(
        data: U,
        shape: S,
    ) -> Result<Tensor, TensorError> {
        let (data, shape) = (data.as_ref(), shape.into());
        shape.validate()?;
        Enforcer::check_data_len(&shape, data.len())?;
        let storage = Storage::from_vec(data.to_vec())?;
        Ok(Self::from_parts(storage, StorageView::contiguous(shape, 0)))
    }

    /// A one-element tensor of shape `[1]`.
    pub fn scalar(value: f32) -> Result<Tensor, TensorError> {
        Self::full(value, [1])
    }
}

impl Tensor {
    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn view(&self) -> &StorageView {
        &self.view
    }

    pub fn shape(&self) -> &Shape {
        &self.view.shape
    }

    pub fn strides(&self) -> &Strides {
        &self.view.strides
    }

    pub fn offset(&self) -> usize {
        self.view.offset
    }

    pub fn rank(&self) -> usize {
        self.view.shape.rank()
    }

    pub fn numel(&self) -> usize {
        self.view.shape.numel()
    }

    /// Size of the outermost dimension.
    pub fn len(&self) -> usize {
        self.view.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn shares_storage(&self, other: &Tensor) -> bool {
        self.storage.ptr_eq(&other.storage)
    }

    pub fn is_contiguous(&self) -> bool {
        self.view.is_contiguous()
    }

    pub(crate) fn repr_cache(&self) -> &ReprCache {
        &self.repr
    }
}

impl Tensor {
    /// Translates a logical multi-index into a position in the storage buffer.
    ///
    /// Negative indices count from the end of their dimension.
    pub fn physical_index(&self, indices: &[isize]) -> Result<usize, TensorError> {
        let shape = self.shape();
        Enforcer::check_rank(shape, indices)?;

        let mut physical = self.view.offset as isize;
        for (dim, (&index, &size)) in indices.iter().zip(shape.iter()).enumerate() {
            let index = Enforcer::normalize_index(index, dim, size)?;
            physical += index as isize * self.view.strides[dim];
        }
        usize::try_from(physical).map_err(|_| StorageError::NegativeIndex(physical).into())
    }

    pub fn get(&self, indices: &[isize]) -> Result<f32, TensorError> {
        let idx = self.physical_index(indices)?;
        Ok(self.storage.get(idx)?)
    }

    pub fn set(&self, indices: &[isize], value: f32) -> Result<(), TensorError> {
        let idx = self.physical_index(indices)?;
        Ok(self.storage.set(idx, value)?)
    }

    /// Creates a new view of the same storage with a different shape.
    ///
    /// No data is copied. `shape` must cover exactly the elements of the
    /// underlying storage; `self` is left untouched either way.
    pub fn reshape<S: Into<Shape>>(&self, shape: S) -> Result<Tensor, TensorError> {
        let shape = shape.into();
        shape.validate()?;
        Enforcer::check_numel(&shape, self.storage.len())?;

        let view = StorageView::contiguous(shape, self.view.offset);
        let reshaped = Self::from_parts(self.storage.clone(), view);
        log::trace!(
            "{} -> {}: {:?} as {:?} ({} refs: {})",
            self.id,
            reshaped.id,
            self.shape(),
            reshaped.shape(),
            self.storage.id(),
            self.storage.ref_count()
        );
        Ok(reshaped)
    }

    /// Gathers the elements in logical (row-major) order.
    pub fn to_vec(&self) -> Result<Vec<f32>, TensorError> {
        let shape = self.shape();
        let mut indices: RVec<isize> = rvec![0; shape.rank()];
        let mut out = Vec::with_capacity(self.numel());
        for _ in 0..self.numel() {
            out.push(self.get(&indices)?);
            for dim in (0..shape.rank()).rev() {
                indices[dim] += 1;
                if (indices[dim] as usize) < shape[dim] {
                    break;
                }
                indices[dim] = 0;
            }
        }
        Ok(out)
    }

    #[cfg(feature = "testing")]
    pub fn to_ndarray(&self) -> anyhow::Result<ndarray::ArrayD<f32>> {
        let dims = ndarray::IxDyn(&self.shape().to_vec());
        Ok(ndarray::ArrayD::from_shape_vec(dims, self.to_vec()?)?)
    }
}

/// Another view of the same storage, with the same shape.
impl Clone for Tensor {
    fn clone(&self) -> Self {
        Self::from_parts(self.storage.clone(), self.view.clone())
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.id)
            .field("shape", self.shape())
            .field("strides", self.strides())
            .field("offset", &self.view.offset)
            .field("storage", &self.storage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape;
    use proptest::prelude::*;
    use test_strategy::proptest;

    fn shape_strategy() -> BoxedStrategy<Shape> {
        Shape::arbitrary_with(vec![1..=5, 1..=5, 1..=5])
    }

    #[test]
    fn test_constructors() -> anyhow::Result<()> {
        let z = Tensor::zeros(shape![2, 3])?;
        assert_eq!(z.to_vec()?, vec![0.0; 6]);
        let o = Tensor::ones(shape![3])?;
        assert_eq!(o.to_vec()?, vec![1.0; 3]);
        let a = Tensor::arange(1.0, 0.5, [4])?;
        assert_eq!(a.to_vec()?, vec![1.0, 1.5, 2.0, 2.5]);
        let e = Tensor::empty([2, 2, 2])?;
        assert_eq!(e.storage().len(), 8);
        assert_eq!(e.offset(), 0);
        assert_eq!(e.strides().to_vec(), vec![4, 2, 1]);
        Ok(())
    }

    #[test]
    fn test_invalid_shapes() {
        let empty: [usize; 0] = [];
        assert_eq!(
            Tensor::zeros(empty).unwrap_err(),
            TensorError::InvariantError(InvariantError::EmptyShape)
        );
        assert_eq!(
            Tensor::ones([2, 0]).unwrap_err(),
            TensorError::InvariantError(InvariantError::ZeroDim { dim: 1 })
        );
        assert!(matches!(
            Tensor::empty([usize::MAX, 2]).unwrap_err(),
            TensorError::StorageError(StorageError::AllocationFailed { .. })
        ));
    }

    #[test]
    fn test_from_data() -> anyhow::Result<()> {
        let t = Tensor::from_data([1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3])?;
        assert_eq!(t.get(&[1, 0])?, 4.0);
        let err = Tensor::from_data([1.0, 2.0], [3]).unwrap_err();
        assert_eq!(
            err,
            TensorError::InvariantError(InvariantError::DataLength {
                expected: 3,
                actual: 2
            })
        );
        let s = Tensor::scalar(7.0)?;
        assert_eq!(s.shape(), &shape![1]);
        assert_eq!(s.get(&[0])?, 7.0);
        Ok(())
    }

    #[test]
    fn test_get_2d() -> anyhow::Result<()> {
        let t = Tensor::arange(0.0, 1.0, [3, 4])?;
        assert_eq!(t.get(&[1, 2])?, 6.0);
        assert_eq!(t.get(&[2, 3])?, 11.0);
        assert_eq!(t.get(&[-1, -1])?, 11.0);
        assert_eq!(t.get(&[-3, 0])?, 0.0);
        Ok(())
    }

    #[test]
    fn test_negative_index() -> anyhow::Result<()> {
        let n = 5;
        let t = Tensor::arange(10.0, 1.0, [n])?;
        assert_eq!(t.get(&[-1])?, t.get(&[n as isize - 1])?);
        Ok(())
    }

    #[test]
    fn test_bounds_rejection() -> anyhow::Result<()> {
        let t = Tensor::zeros([4])?;
        assert_eq!(
            t.get(&[4]).unwrap_err(),
            TensorError::InvariantError(InvariantError::IndexOutOfBounds {
                dim: 0,
                index: 4,
                size: 4
            })
        );
        assert!(t.get(&[-5]).is_err());
        assert!(t.set(&[4], 1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_rank_mismatch() -> anyhow::Result<()> {
        let t = Tensor::zeros([2, 2])?;
        assert_eq!(
            t.get(&[0]).unwrap_err(),
            TensorError::InvariantError(InvariantError::RankMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert!(t.set(&[0, 0, 0], 1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_offset_and_strides() -> anyhow::Result<()> {
        // Column-major 2x3 view over the tail of a 10-element buffer.
        let storage = Storage::from_vec((0..10).map(|x| x as f32).collect())?;
        let view = StorageView::new(shape![2, 3], Strides::new(rvec![1, 2]), 4);
        let t = Tensor::from_parts(storage, view);
        assert!(!t.is_contiguous());
        assert_eq!(t.physical_index(&[0, 0])?, 4);
        assert_eq!(t.physical_index(&[1, 0])?, 5);
        assert_eq!(t.physical_index(&[0, 2])?, 8);
        assert_eq!(t.get(&[1, 2])?, 9.0);
        assert_eq!(t.to_vec()?, vec![4.0, 6.0, 8.0, 5.0, 7.0, 9.0]);
        Ok(())
    }

    #[test]
    fn test_negative_physical_index() -> anyhow::Result<()> {
        let storage = Storage::allocate(4)?;
        let view = StorageView::new(shape![4], Strides::new(rvec![-1]), 2);
        let t = Tensor::from_parts(storage, view);
        assert_eq!(t.physical_index(&[2])?, 0);
        assert_eq!(
            t.get(&[3]).unwrap_err(),
            TensorError::StorageError(StorageError::NegativeIndex(-1))
        );
        Ok(())
    }

    #[test]
    fn test_reshape_aliases() -> anyhow::Result<()> {
        let t1 = Tensor::arange(0.0, 1.0, [3, 4])?;
        let t2 = t1.reshape([2, 6])?;
        assert!(t1.shares_storage(&t2));
        assert!(t1.id() < t2.id());
        assert_eq!(t1.storage().id(), t2.storage().id());
        assert_eq!(t2.strides().to_vec(), vec![6, 1]);

        t2.set(&[1, 0], -1.0)?;
        assert_eq!(t1.get(&[1, 2])?, -1.0);
        t1.set(&[2, 3], 99.0)?;
        assert_eq!(t2.get(&[1, 5])?, 99.0);
        Ok(())
    }

    #[test]
    fn test_overflowing_shapes_rejected() -> anyhow::Result<()> {
        let t = Tensor::arange(0.0, 1.0, [3, 4])?;
        for dims in [
            shape![usize::MAX, 2],
            shape![(1usize << (usize::BITS - 1)) + 6, 2],
        ] {
            let err = t.reshape(dims.clone()).unwrap_err();
            assert_eq!(
                err,
                TensorError::InvariantError(InvariantError::ShapeMismatch {
                    requested: dims,
                    numel: 12
                })
            );
        }
        assert_eq!(t.storage().ref_count(), 1);
        t.set(&[2, 3], -1.0)?;
        assert_eq!(t.get(&[-1, -1])?, -1.0);

        let err = Tensor::from_data([1.0, 2.0], [usize::MAX, 2]).unwrap_err();
        assert_eq!(
            err,
            TensorError::InvariantError(InvariantError::NumelOverflow {
                shape: shape![usize::MAX, 2]
            })
        );
        Ok(())
    }

    #[test]
    fn test_reshape_rejection() -> anyhow::Result<()> {
        let t = Tensor::arange(0.0, 1.0, [3, 4])?;
        let err = t.reshape([5, 3]).unwrap_err();
        assert_eq!(
            err,
            TensorError::InvariantError(InvariantError::ShapeMismatch {
                requested: shape![5, 3],
                numel: 12
            })
        );
        assert_eq!(t.shape(), &shape![3, 4]);
        assert_eq!(t.storage().ref_count(), 1);
        assert_eq!(t.get(&[2, 3])?, 11.0);
        Ok(())
    }

    #[test]
    fn test_ref_counting() -> anyhow::Result<()> {
        let base = Tensor::arange(0.0, 1.0, [24])?;
        let watch = base.storage().downgrade();
        let views = [shape![2, 12], shape![4, 6], shape![2, 3, 4]]
            .into_iter()
            .map(|s| base.reshape(s))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(base.storage().ref_count(), 4);

        drop(base);
        let mut views = views;
        let last = views.pop().unwrap();
        drop(views);
        assert!(watch.is_alive());
        assert_eq!(last.storage().ref_count(), 1);
        assert_eq!(last.get(&[1, 2, 3])?, 23.0);

        drop(last);
        assert!(!watch.is_alive());
        Ok(())
    }

    #[test]
    fn test_clone_is_view() -> anyhow::Result<()> {
        let a = Tensor::zeros([2, 2])?;
        let b = a.clone();
        b.set(&[0, 1], 3.0)?;
        assert_eq!(a.get(&[0, 1])?, 3.0);
        assert_eq!(a.storage().ref_count(), 2);
        Ok(())
    }

    #[cfg(feature = "testing")]
    #[test]
    fn test_ndarray_oracle() -> anyhow::Result<()> {
        let t = Tensor::arange(0.0, 1.0, [2, 3, 4])?;
        let nd = ndarray::Array::range(0.0f32, 24.0, 1.0).into_shape((2, 3, 4))?;
        let ours = t.to_ndarray()?;
        for ((i, j, k), &v) in nd.indexed_iter() {
            assert_eq!(ours[&[i, j, k][..]], v);
            assert_eq!(t.get(&[i as isize, j as isize, k as isize])?, v);
        }
        Ok(())
    }

    #[proptest(cases = 64)]
    fn test_numel_invariant(#[strategy(shape_strategy())] shape: Shape) {
        let t = Tensor::arange(0.0, 1.0, shape.clone()).unwrap();
        prop_assert_eq!(t.numel(), t.storage().len());
        let flat = t.reshape([shape.numel()]).unwrap();
        prop_assert_eq!(flat.numel(), flat.storage().len());
    }

    #[proptest(cases = 64)]
    fn test_set_get_roundtrip(
        #[strategy(shape_strategy())] shape: Shape,
        #[strategy(any::<u64>())] seed: u64,
        #[strategy(-1e6f32..1e6f32)] value: f32,
    ) {
        let t = Tensor::zeros(shape.clone()).unwrap();
        let indices = shape
            .iter()
            .enumerate()
            .map(|(i, &d)| ((seed >> (i * 8)) % d as u64) as isize)
            .collect::<Vec<_>>();
        t.set(&indices, value).unwrap();
        prop_assert_eq!(t.get(&indices).unwrap(), value);
    }

    #[proptest(cases = 64)]
    fn test_reshape_aliasing(
        #[strategy(shape_strategy())] shape: Shape,
        #[strategy(any::<usize>())] pos: usize,
    ) {
        let t1 = Tensor::zeros(shape.clone()).unwrap();
        let t2 = t1.reshape([shape.numel()]).unwrap();
        let p = pos % shape.numel();

        t2.set(&[p as isize], 5.0).unwrap();
        let to_vec = t1.to_vec().unwrap();
        prop_assert_eq!(to_vec[p], 5.0);

        // Row-major unravel of `p` over t1's shape.
        let mut rem = p;
        let mut indices = vec![0isize; shape.rank()];
        for dim in (0..shape.rank()).rev() {
            indices[dim] = (rem % shape[dim]) as isize;
            rem /= shape[dim];
        }
        t1.set(&indices, -5.0).unwrap();
        prop_assert_eq!(t2.get(&[p as isize]).unwrap(), -5.0);
    }
}
