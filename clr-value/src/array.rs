//! Element ordering of multi-dimensional arrays
//!
//! The encoder and the decoder must agree on a single element order. We use
//! row-major order: the last dimension increments fastest, carrying into the
//! previous dimensions, just like nested `for` loops over each dimension in
//! declaration order would.

/// Total number of elements of an array with the given dimension lengths
///
/// Returns `None` if the element count does not fit in a `usize`.
pub fn element_count(lengths: &[u32]) -> Option<usize> {
    lengths
        .iter()
        .try_fold(1usize, |acc, &len| acc.checked_mul(len as usize))
}

/// Position of a multi-dimensional index in row-major element storage
///
/// Returns `None` if the index does not have the right number of dimensions
/// or lies out of bounds.
pub fn linear_index(lengths: &[u32], indices: &[u32]) -> Option<usize> {
    if lengths.len() != indices.len() {
        return None;
    }
    lengths
        .iter()
        .zip(indices)
        .try_fold(0usize, |acc, (&len, &idx)| {
            (idx < len).then(|| acc * len as usize + idx as usize)
        })
}

/// Iterator over the multi-dimensional indices of an array, in storage order
#[derive(Clone, Debug)]
pub struct RowMajorIndices {
    /// Length of each dimension
    lengths: Box<[u32]>,

    /// Next index to be emitted, or None once iteration is over
    next: Option<Box<[u32]>>,
}
//
impl RowMajorIndices {
    /// Iterate over the indices of an array with some dimension lengths
    pub fn new(lengths: &[u32]) -> Self {
        let lengths = Box::<[u32]>::from(lengths);
        let empty = lengths.iter().any(|&len| len == 0);
        let next = (!empty).then(|| vec![0; lengths.len()].into_boxed_slice());
        Self { lengths, next }
    }
}
//
impl Iterator for RowMajorIndices {
    type Item = Box<[u32]>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut successor = current.clone();
        for dim in (0..successor.len()).rev() {
            successor[dim] += 1;
            if successor[dim] < self.lengths[dim] {
                self.next = Some(successor);
                break;
            }
            successor[dim] = 0;
        }
        Some(current)
    }
}
