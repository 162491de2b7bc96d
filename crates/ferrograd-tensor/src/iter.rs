//! Row-major walks over strided views.

/// Iterator over the buffer offsets of a strided view in row-major logical order.
///
/// The offsets are absolute positions in the backing buffer, so the view offset is already
/// folded in. Axes with stride 0 (broadcast axes) revisit the same offsets.
#[derive(Debug, Clone)]
pub struct StridedOffsets<'a> {
    shape: &'a [usize],
    strides: &'a [usize],
    index: Vec<usize>,
    next: usize,
    remaining: usize,
}

impl<'a> StridedOffsets<'a> {
    /// Creates an iterator over every element of the view.
    pub fn new(shape: &'a [usize], strides: &'a [usize], offset: usize) -> Self {
        Self::starting_at(shape, strides, offset, 0)
    }

    /// Creates an iterator that skips the first `start` logical elements.
    ///
    /// Used to hand each parallel chunk its own independent walk.
    pub fn starting_at(shape: &'a [usize], strides: &'a [usize], offset: usize, start: usize) -> Self {
        let total: usize = shape.iter().product();
        let mut index = vec![0; shape.len()];
        let mut next = offset;
        let mut rem = start.min(total);
        for dim in (0..shape.len()).rev() {
            index[dim] = rem % shape[dim];
            rem /= shape[dim];
            next += index[dim] * strides[dim];
        }
        Self {
            shape,
            strides,
            index,
            next,
            remaining: total.saturating_sub(start),
        }
    }
}

impl Iterator for StridedOffsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next;
        self.remaining -= 1;
        if self.remaining > 0 {
            for dim in (0..self.shape.len()).rev() {
                self.index[dim] += 1;
                self.next += self.strides[dim];
                if self.index[dim] < self.shape[dim] {
                    break;
                }
                self.next -= self.strides[dim] * self.shape[dim];
                self.index[dim] = 0;
            }
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedOffsets<'_> {}

/// Walks the logical multi-indices of a shape in row-major order.
///
/// Each step yields the running position (how many elements came before) together with the
/// current multi-index. The index is borrowed from the walker, so this is a lending
/// iterator driven with `while let`:
///
/// ```rust
/// use ferrograd_tensor::iter::IndexIter;
///
/// let mut it = IndexIter::new(&[2, 2]);
/// let mut seen = Vec::new();
/// while let Some((pos, idx)) = it.advance() {
///     seen.push((pos, idx.to_vec()));
/// }
/// assert_eq!(seen[3], (3, vec![1, 1]));
/// ```
#[derive(Debug, Clone)]
pub struct IndexIter {
    shape: Vec<usize>,
    index: Vec<usize>,
    position: usize,
    total: usize,
}

impl IndexIter {
    /// Creates a walker over every multi-index of `shape`.
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            index: vec![0; shape.len()],
            position: 0,
            total: shape.iter().product(),
        }
    }

    /// Moves to the next multi-index.
    pub fn advance(&mut self) -> Option<(usize, &[usize])> {
        if self.position >= self.total {
            return None;
        }
        if self.position > 0 {
            for dim in (0..self.shape.len()).rev() {
                self.index[dim] += 1;
                if self.index[dim] < self.shape[dim] {
                    break;
                }
                self.index[dim] = 0;
            }
        }
        let pos = self.position;
        self.position += 1;
        Some((pos, &self.index))
    }

    /// Number of multi-indices not yet visited.
    pub fn remaining(&self) -> usize {
        self.total - self.position
    }
}
