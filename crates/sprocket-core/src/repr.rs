use crate::{rvec, RVec, Tensor, TensorError};
use parking_lot::Mutex;

/// Memoized string form of a tensor, tagged with the storage version it was
/// rendered from.
#[derive(Debug, Default)]
pub(crate) struct ReprCache(Mutex<Option<(u64, String)>>);

impl Tensor {
    /// Nested-bracket representation, one bracket level per dimension and
    /// elements printed with two decimals:
    ///
    /// ```
    /// # use sprocket::Tensor;
    /// let t = Tensor::arange(0.0, 1.0, [2, 2]).unwrap();
    /// assert_eq!(t.to_repr().unwrap(), "[[0.00, 1.00], [2.00, 3.00]]");
    /// ```
    ///
    /// The result is cached until the storage is written to, through this
    /// tensor or any other view of it.
    pub fn to_repr(&self) -> Result<String, TensorError> {
        let version = self.storage().version();
        let mut cache = self.repr_cache().0.lock();
        if let Some((cached_version, repr)) = cache.as_ref() {
            if *cached_version == version {
                return Ok(repr.clone());
            }
        }

        let mut repr = String::new();
        let mut indices: RVec<isize> = rvec![0; self.rank()];
        self.render(&mut indices, 0, &mut repr)?;
        *cache = Some((version, repr.clone()));
        Ok(repr)
    }

    fn render(
        &self,
        indices: &mut RVec<isize>,
        dim: usize,
        out: &mut String,
    ) -> Result<(), TensorError> {
        if dim == self.rank() {
            let value = self.get(indices)?;
            out.push_str(&format!("{:.2}", value));
            return Ok(());
        }
        out.push('[');
        let size = self.shape()[dim];
        for i in 0..size {
            indices[dim] = i as isize;
            self.render(indices, dim + 1, out)?;
            if i + 1 < size {
                out.push_str(", ");
            }
        }
        out.push(']');
        Ok(())
    }

    /// Writes the representation and a newline to stdout.
    pub fn print(&self) -> Result<(), TensorError> {
        println!("{}", self.to_repr()?);
        Ok(())
    }
}

impl std::fmt::Display for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let repr = self.to_repr().map_err(|_| std::fmt::Error)?;
        f.write_str(&repr)
    }
}
