use crate::Shape;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("Rank mismatch. Tensor has {expected} dimensions, got {actual} indices.")]
    RankMismatch { expected: usize, actual: usize },
    #[error("Index {index} is out of bounds for dimension {dim} with size {size}.")]
    IndexOutOfBounds { dim: usize, index: isize, size: usize },
    #[error("Shape mismatch. Cannot view {numel} elements as {requested}.")]
    ShapeMismatch { requested: Shape, numel: usize },
    #[error("Shape must have at least one dimension.")]
    EmptyShape,
    #[error("Dimension {dim} has size 0.")]
    ZeroDim { dim: usize },
    #[error("Data length mismatch, shape requires {expected} elements, got {actual}.")]
    DataLength { expected: usize, actual: usize },
    #[error("Element count of {shape} overflows usize.")]
    NumelOverflow { shape: Shape },
}

/// # Enforcer
///
/// Enforcer enforces the invariants tensor access and views rely on.
pub struct Enforcer;

impl Enforcer {
    pub fn check_rank(shape: &Shape, indices: &[isize]) -> Result<(), InvariantError> {
        if indices.len() != shape.rank() {
            return Err(InvariantError::RankMismatch {
                expected: shape.rank(),
                actual: indices.len(),
            });
        }
        Ok(())
    }

    /// Resolves a possibly negative index along `dim`.
    ///
    /// Negative indices count from the end, once: `-size` is the lowest
    /// accepted value. On failure the error carries `index` as passed in,
    /// before any negative adjustment.
    pub fn normalize_index(
        index: isize,
        dim: usize,
        size: usize,
    ) -> Result<usize, InvariantError> {
        let adjusted = if index < 0 { index + size as isize } else { index };
        if adjusted < 0 || adjusted >= size as isize {
            return Err(InvariantError::IndexOutOfBounds { dim, index, size });
        }
        Ok(adjusted as usize)
    }

    pub fn check_numel(requested: &Shape, numel: usize) -> Result<(), InvariantError> {
        if requested.checked_numel() != Some(numel) {
            return Err(InvariantError::ShapeMismatch {
                requested: requested.clone(),
                numel,
            });
        }
        Ok(())
    }

    pub fn check_data_len(shape: &Shape, actual: usize) -> Result<(), InvariantError> {
        let expected = shape
            .checked_numel()
            .ok_or_else(|| InvariantError::NumelOverflow {
                shape: shape.clone(),
            })?;
        if expected != actual {
            return Err(InvariantError::DataLength { expected, actual });
        }
        Ok(())
    }
}
