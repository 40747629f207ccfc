//! Core tensor data structures.
//!
//! # Strided Tensors
//!
//! A [`Tensor`] is a view over shared, immutable storage: a shape, a set of
//! strides and an offset. Cloning a tensor never copies its elements, so the
//! operator can hold on to its forward inputs without duplicating them.
//!
//! Views produced by [`Tensor::transpose`] swap the last two strides and are
//! therefore generally not contiguous. Kernels only accept contiguous
//! storage; [`Tensor::contiguous`] materialises a row-major copy when needed.
//!
//! ## Layout conventions
//! - Dense matrices: `[..batch, rows, cols]`
//! - Block-sparse matrices: `[..batch, blocks, block_size, block_size]`, with
//!   blocks stored in the slot order of their [`BlockLayout`](crate::layout::BlockLayout)
//!
//! ## Example
//!
//! ```rust
//! use briny_sparse::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape(), &[2, 3]);
//! assert!(!t.transpose().is_contiguous());
//! ```

use std::sync::Arc;

/// `f64` tensor, the element type every kernel in this crate works on.
pub type Ten64 = Tensor<f64>;

/// An N-dimensional strided view over shared storage.
#[derive(Debug)]
pub struct Tensor<T> {
    storage: Arc<[T]>,
    shape: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
    requires_grad: bool,
}

// no `T: Clone` bound: cloning only bumps the storage refcount
impl<T> Clone for Tensor<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            offset: self.offset,
            requires_grad: self.requires_grad,
        }
    }
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

impl<T> Tensor<T> {
    /// Creates a new contiguous tensor with the given shape and flat row-major data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        let strides = row_major_strides(&shape);
        Self {
            storage: data.into(),
            shape,
            strides,
            offset: 0,
            requires_grad: false,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether gradients should be computed for this tensor.
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Marks (or unmarks) this tensor as requiring a gradient.
    #[must_use]
    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    /// Whether the view walks its storage in plain row-major order.
    ///
    /// Axes of extent 1 never affect contiguity.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1;
        for (&dim, &stride) in self.shape.iter().zip(&self.strides).rev() {
            if dim == 1 {
                continue;
            }
            if stride != expected {
                return false;
            }
            expected *= dim;
        }
        true
    }

    /// The logical elements as a slice, if the view is contiguous.
    pub fn as_slice(&self) -> Option<&[T]> {
        self.is_contiguous()
            .then(|| &self.storage[self.offset..self.offset + self.numel()])
    }

    /// Whether two tensors are views over the same storage.
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Swaps the last two axes without copying.
    ///
    /// # Panics
    /// Panics if the tensor has fewer than two dimensions.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let rank = self.rank();
        assert!(rank >= 2, "transpose needs at least two dimensions, got {rank}");
        let mut out = self.clone();
        out.shape.swap(rank - 2, rank - 1);
        out.strides.swap(rank - 2, rank - 1);
        out
    }

    fn storage_index(&self, flat: usize) -> usize {
        let mut rem = flat;
        let mut idx = self.offset;
        for (&dim, &stride) in self.shape.iter().zip(&self.strides).rev() {
            idx += (rem % dim) * stride;
            rem /= dim;
        }
        idx
    }
}

impl<T: Copy> Tensor<T> {
    /// Element at a multi-dimensional index.
    ///
    /// # Panics
    /// Panics if the index rank or any coordinate is out of range.
    pub fn get(&self, index: &[usize]) -> T {
        assert_eq!(index.len(), self.rank(), "index rank mismatch");
        let mut idx = self.offset;
        for ((&i, &dim), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            assert!(i < dim, "index {index:?} out of bounds for shape {:?}", self.shape);
            idx += i * stride;
        }
        self.storage[idx]
    }

    /// Logical elements in row-major order.
    pub fn to_vec(&self) -> Vec<T> {
        match self.as_slice() {
            Some(slice) => slice.to_vec(),
            None => (0..self.numel())
                .map(|i| self.storage[self.storage_index(i)])
                .collect(),
        }
    }

    /// Returns a contiguous tensor with the same logical contents.
    ///
    /// Shares storage when the view is already contiguous; copies otherwise.
    #[must_use]
    pub fn contiguous(&self) -> Self {
        if self.is_contiguous() {
            return self.clone();
        }
        Self::new(self.shape.clone(), self.to_vec()).with_requires_grad(self.requires_grad)
    }

    /// Returns a copy of the tensor with a new shape of equal size.
    ///
    /// # Panics
    /// Panics if the element counts differ.
    #[must_use]
    pub fn reshape(&self, shape: impl Into<Vec<usize>>) -> Self {
        Self::new(shape, self.to_vec()).with_requires_grad(self.requires_grad)
    }
}

impl<T: Copy + Default> Tensor<T> {
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let n = shape.iter().product();
        Self::new(shape, vec![T::default(); n])
    }
}

impl<T: Copy + PartialEq> PartialEq for Tensor<T> {
    /// Logical equality: same shape, same elements. Strides and
    /// `requires_grad` are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape
            && (0..self.numel())
                .all(|i| self.storage[self.storage_index(i)] == other.storage[other.storage_index(i)])
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use briny_sparse::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape(), &[2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![$lit])
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!($inner) ),+ ];
        let first_shape = children[0].shape().to_vec();
        assert!(children.iter().all(|c| c.shape() == first_shape.as_slice()),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].numel());
        for c in children { data.extend(c.to_vec()); }
        $crate::tensors::Tensor::new(shape, data)
    }};
}
