//! Element addressing, partial indexing and the selector expression language.

use crate::{element::Element, error::TensorError, tensor::Tensor};

/// A single per-axis selector of an index expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Keep one position of the axis, removing the axis.
    Fixed(isize),
    /// Keep the whole axis.
    All,
}

/// Parses a comma separated selector list such as `":, 1, :"` or `"-1,0"`.
///
/// Each selector is either an integer (negative values count from the end) or `:`.
///
/// # Errors
///
/// Returns [`TensorError::ParseError`] for empty input, empty selectors or non-integer text.
pub fn parse_selectors(expr: &str) -> Result<Vec<Selector>, TensorError> {
    let parse_error = |reason: String| TensorError::ParseError {
        expr: expr.to_string(),
        reason,
    };
    if expr.trim().is_empty() {
        return Err(parse_error("empty expression".to_string()));
    }
    expr.split(',')
        .enumerate()
        .map(|(pos, token)| match token.trim() {
            ":" => Ok(Selector::All),
            "" => Err(parse_error(format!("empty selector at position {pos}"))),
            text => text
                .parse::<isize>()
                .map(Selector::Fixed)
                .map_err(|e| parse_error(format!("selector {text:?} at position {pos}: {e}"))),
        })
        .collect()
}

/// Resolves a possibly negative index against an axis of `size` elements.
fn resolve_index(axis: usize, index: isize, size: usize) -> Result<usize, TensorError> {
    let resolved = if index < 0 {
        size as isize + index
    } else {
        index
    };
    if resolved < 0 || resolved as usize >= size {
        return Err(TensorError::IndexOutOfBounds { axis, index, size });
    }
    Ok(resolved as usize)
}

impl<T: Element> Tensor<T> {
    /// Resolves leading per-axis indices to a position in the backing buffer.
    ///
    /// Fewer indices than axes address the first element of the remaining block.
    ///
    /// # Errors
    ///
    /// Fails if no index or more indices than axes are given, or an index is out of range
    /// after negative-index resolution.
    pub fn flat_index(&self, indices: &[isize]) -> Result<usize, TensorError> {
        if indices.is_empty() {
            return Err(TensorError::MissingIndices {
                expected: 1,
                got: 0,
            });
        }
        if indices.len() > self.rank() {
            return Err(TensorError::TooManyIndices {
                got: indices.len(),
                rank: self.rank(),
            });
        }
        indices
            .iter()
            .enumerate()
            .try_fold(self.offset, |acc, (axis, &index)| {
                let i = resolve_index(axis, index, self.shape[axis])?;
                Ok(acc + i * self.strides[axis])
            })
    }

    /// Reads the element at a full multi-index. Negative indices count from the end.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ferrograd_tensor::Tensor;
    ///
    /// let t = Tensor::range(0, 6, 1).unwrap().reshape(&[2, 3]).unwrap();
    /// assert_eq!(t.get(&[1, -1]).unwrap(), 5);
    /// assert!(t.get(&[2, 0]).is_err());
    /// ```
    pub fn get(&self, indices: &[isize]) -> Result<T, TensorError> {
        if indices.len() < self.rank() {
            return Err(TensorError::MissingIndices {
                expected: self.rank(),
                got: indices.len(),
            });
        }
        let pos = self.flat_index(indices)?;
        Ok(self.storage.read()[pos])
    }

    /// Reads the element at a full multi-index without validating it.
    ///
    /// Meant for hot loops that already know the index is valid. Indices outside the view
    /// address some other element of the buffer, or panic past its end.
    pub fn get_unchecked(&self, indices: &[usize]) -> T {
        let pos = indices
            .iter()
            .zip(self.strides.iter())
            .fold(self.offset, |acc, (&i, &s)| acc + i * s);
        self.storage.read()[pos]
    }

    /// Selects along the leading axes, returning the block over the remaining axes.
    ///
    /// The result is a view when the selected block is contiguous, otherwise a freshly
    /// materialized tensor. Supplying one index per axis returns a `(1,)` view of that
    /// element.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ferrograd_tensor::Tensor;
    ///
    /// let t = Tensor::range(0, 8, 1).unwrap().reshape(&[2, 2, 2]).unwrap();
    /// let block = t.index(&[1]).unwrap();
    /// assert_eq!(block.shape(), &[2, 2]);
    /// assert_eq!(block.to_vec(), vec![4, 5, 6, 7]);
    /// assert_eq!(block.index(&[1]).unwrap().to_vec(), vec![6, 7]);
    /// ```
    pub fn index(&self, indices: &[isize]) -> Result<Tensor<T>, TensorError> {
        let offset = self.flat_index(indices)?;
        let k = indices.len();
        if k == self.rank() {
            return Ok(Tensor::from_parts(
                self.storage.clone(),
                vec![1],
                vec![1],
                vec![0],
                offset,
            ));
        }
        let block = Tensor::from_parts(
            self.storage.clone(),
            self.shape[k..].to_vec(),
            self.strides[k..].to_vec(),
            self.dim_order[k..].to_vec(),
            offset,
        );
        if block.is_contiguous() {
            return Ok(block);
        }
        block.copy()
    }

    /// Indexes with a selector expression, see [`parse_selectors`].
    ///
    /// Trailing `:` selectors are dropped. If only integers remain this is
    /// [`Tensor::index`]. Otherwise every integer selector, left to right, rotates its axis
    /// to the front and collapses it, so the kept axes stay in their original order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ferrograd_tensor::Tensor;
    ///
    /// let t = Tensor::range(0, 24, 1).unwrap().reshape(&[2, 3, 4]).unwrap();
    /// let col = t.index_adv("1, :, 2").unwrap();
    /// assert_eq!(col.to_vec(), vec![14, 18, 22]);
    /// ```
    pub fn index_adv(&self, expr: &str) -> Result<Tensor<T>, TensorError> {
        let mut selectors = parse_selectors(expr)?;
        while selectors.last() == Some(&Selector::All) {
            selectors.pop();
        }
        if selectors.len() > self.rank() {
            return Err(TensorError::TooManyIndices {
                got: selectors.len(),
                rank: self.rank(),
            });
        }
        if selectors.is_empty() {
            return Ok(self.clone());
        }
        let fixed: Option<Vec<isize>> = selectors
            .iter()
            .map(|s| match s {
                Selector::Fixed(i) => Some(*i),
                Selector::All => None,
            })
            .collect();
        if let Some(indices) = fixed {
            return self.index(&indices);
        }

        let mut current = self.clone();
        let mut collapsed = 0;
        for (pos, selector) in selectors.iter().enumerate() {
            let Selector::Fixed(i) = *selector else {
                continue;
            };
            let axis = pos - collapsed;
            let mut axes = Vec::with_capacity(current.rank());
            axes.push(axis);
            axes.extend((0..current.rank()).filter(|&a| a != axis));
            // report bounds against the caller's axis numbering
            resolve_index(pos, i, current.shape[axis])?;
            current = current.permute(&axes)?.index(&[i])?;
            collapsed += 1;
        }
        Ok(current)
    }

    /// Returns the view at position `index` of `axis`, dropping that axis. O(1).
    ///
    /// Selecting from a rank-1 tensor yields a `(1,)` view.
    pub fn select(&self, axis: usize, index: isize) -> Result<Tensor<T>, TensorError> {
        if axis >= self.rank() {
            return Err(TensorError::InvalidAxis {
                axis,
                rank: self.rank(),
            });
        }
        let i = resolve_index(axis, index, self.shape[axis])?;
        let offset = self.offset + i * self.strides[axis];
        if self.rank() == 1 {
            return Ok(Tensor::from_parts(
                self.storage.clone(),
                vec![1],
                vec![1],
                vec![0],
                offset,
            ));
        }
        let keep = |v: &[usize]| -> Vec<usize> {
            v.iter()
                .enumerate()
                .filter(|&(a, _)| a != axis)
                .map(|(_, &x)| x)
                .collect()
        };
        Ok(Tensor::from_parts(
            self.storage.clone(),
            keep(&self.shape),
            keep(&self.strides),
            keep(&self.dim_order),
            offset,
        ))
    }

    /// Restricts `axis` to `len` positions starting at `start`. O(1), shares storage.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Tensor<T>, TensorError> {
        if axis >= self.rank() {
            return Err(TensorError::InvalidAxis {
                axis,
                rank: self.rank(),
            });
        }
        let size = self.shape[axis];
        if len == 0 || start.checked_add(len).map_or(true, |end| end > size) {
            let last = start.saturating_add(len.saturating_sub(1));
            return Err(TensorError::IndexOutOfBounds {
                axis,
                index: isize::try_from(last).unwrap_or(isize::MAX),
                size,
            });
        }
        let mut shape = self.shape.clone();
        shape[axis] = len;
        Ok(Tensor::from_parts(
            self.storage.clone(),
            shape,
            self.strides.clone(),
            self.dim_order.clone(),
            self.offset + start * self.strides[axis],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_tensor(shape: &[usize]) -> Result<Tensor<i32>, TensorError> {
        let n: usize = shape.iter().product();
        Tensor::range(0, n as i32, 1)?.reshape(shape)
    }

    /// Expected result of a selector list computed by walking the strides directly.
    fn stride_walk(t: &Tensor<i32>, selectors: &[Selector]) -> (Vec<usize>, Vec<i32>) {
        let kept: Vec<usize> = (0..t.rank())
            .filter(|&a| !matches!(selectors.get(a), Some(Selector::Fixed(_))))
            .collect();
        let shape: Vec<usize> = kept.iter().map(|&a| t.shape()[a]).collect();
        let mut values = Vec::new();
        let total: usize = shape.iter().product();
        for linear in 0..total {
            let mut rem = linear;
            let mut idx = vec![0usize; t.rank()];
            for (k, &a) in kept.iter().enumerate().rev() {
                idx[a] = rem % shape[k];
                rem /= shape[k];
            }
            for (a, s) in selectors.iter().enumerate() {
                if let Selector::Fixed(i) = *s {
                    idx[a] = if i < 0 {
                        (t.shape()[a] as isize + i) as usize
                    } else {
                        i as usize
                    };
                }
            }
            values.push(t.get_unchecked(&idx));
        }
        (shape, values)
    }

    #[test]
    fn flat_index_bounds() -> Result<(), TensorError> {
        let t = range_tensor(&[2, 3])?;
        assert_eq!(t.flat_index(&[1, 2])?, 5);
        assert_eq!(t.flat_index(&[-1, -3])?, 3);
        assert_eq!(
            t.flat_index(&[2]).err(),
            Some(TensorError::IndexOutOfBounds {
                axis: 0,
                index: 2,
                size: 2
            })
        );
        assert_eq!(
            t.flat_index(&[0, -4]).err(),
            Some(TensorError::IndexOutOfBounds {
                axis: 1,
                index: -4,
                size: 3
            })
        );
        assert_eq!(
            t.flat_index(&[0, 0, 0]).err(),
            Some(TensorError::TooManyIndices { got: 3, rank: 2 })
        );
        assert!(matches!(
            t.flat_index(&[]),
            Err(TensorError::MissingIndices { .. })
        ));
        Ok(())
    }

    #[test]
    fn get_and_get_unchecked() -> Result<(), TensorError> {
        let t = range_tensor(&[3, 4])?.transpose()?;
        assert_eq!(t.get(&[1, 2])?, 9);
        assert_eq!(t.get_unchecked(&[1, 2]), 9);
        assert!(matches!(
            t.get(&[1]),
            Err(TensorError::MissingIndices { expected: 2, got: 1 })
        ));
        Ok(())
    }

    #[test]
    fn index_negative() -> Result<(), TensorError> {
        let t = range_tensor(&[2, 2])?;
        assert!(t.index(&[-2])?.is_equal(&t.index(&[0])?));
        assert_eq!(t.index(&[-2])?.to_vec(), vec![0, 1]);
        Ok(())
    }

    #[test]
    fn index_contiguous_is_view() -> Result<(), TensorError> {
        let t = range_tensor(&[2, 2, 2])?;
        let block = t.index(&[1])?;
        assert!(block.shares_storage_with(&t));
        let elem = t.index(&[1, 0, 1])?;
        assert_eq!(elem.shape(), &[1]);
        assert_eq!(elem.item()?, 5);
        assert!(elem.shares_storage_with(&t));
        Ok(())
    }

    #[test]
    fn index_transposed_views() -> Result<(), TensorError> {
        let t = range_tensor(&[4, 2])?.transpose()?;
        let r = t.index(&[1])?;
        assert_eq!(r.to_vec(), vec![1, 3, 5, 7]);
        assert!(!r.shares_storage_with(&t));

        let t = range_tensor(&[3, 4, 2])?.transpose()?;
        let r = t.index(&[0])?;
        assert_eq!(r.shape(), &[4, 3]);
        assert_eq!(r.to_vec(), vec![0, 8, 16, 2, 10, 18, 4, 12, 20, 6, 14, 22]);

        let t = range_tensor(&[4, 2, 1])?.transpose()?;
        let r = t.index(&[0])?;
        assert_eq!(r.shape(), &[2, 4]);
        assert_eq!(r.to_vec(), vec![0, 2, 4, 6, 1, 3, 5, 7]);

        let t = range_tensor(&[4, 1, 1, 2])?.transpose()?;
        let r = t.index(&[1])?;
        assert_eq!(r.shape(), &[1, 1, 4]);
        assert_eq!(r.to_vec(), vec![1, 3, 5, 7]);

        let t = Tensor::from_vec(vec![3], &[1, 1, 1, 1])?.transpose()?;
        let r = t.index(&[0])?;
        assert_eq!(r.shape(), &[1, 1, 1]);
        assert_eq!(r.item()?, 3);
        Ok(())
    }

    #[test]
    fn parse_selector_errors() {
        assert_eq!(
            parse_selectors(" 1, :,-2 "),
            Ok(vec![Selector::Fixed(1), Selector::All, Selector::Fixed(-2)])
        );
        for bad in ["", "1,,2", "a", "1.5", ":,x"] {
            assert!(
                matches!(parse_selectors(bad), Err(TensorError::ParseError { .. })),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn index_adv_trivial_forms() -> Result<(), TensorError> {
        let t = range_tensor(&[2, 3])?;
        assert!(t.index_adv(":, :")?.shares_storage_with(&t));
        assert_eq!(t.index_adv("1")?.to_vec(), vec![3, 4, 5]);
        assert_eq!(t.index_adv("1, :")?.to_vec(), vec![3, 4, 5]);
        assert_eq!(t.index_adv("1, 2")?.item()?, 5);
        assert!(matches!(
            t.index_adv("0, 0, 0"),
            Err(TensorError::TooManyIndices { got: 3, rank: 2 })
        ));
        // redundant trailing wildcards past the rank are dropped
        assert_eq!(t.index_adv("1, :, :, :")?.to_vec(), vec![3, 4, 5]);
        assert!(t.index_adv(":, :, :")?.shares_storage_with(&t));
        assert!(matches!(
            t.index_adv("0, 0, 0, :"),
            Err(TensorError::TooManyIndices { got: 3, rank: 2 })
        ));
        assert!(matches!(
            t.index_adv(":, 5"),
            Err(TensorError::IndexOutOfBounds { axis: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn index_adv_matches_stride_walk() -> Result<(), TensorError> {
        let base = range_tensor(&[2, 3, 4, 5])?;
        let permuted = base.permute(&[2, 0, 3, 1])?;
        let cases = [
            ":, 1",
            "1, :, 2",
            ":, 1, :, 2",
            ":, :, -1",
            "0, :, :, 2",
            ":, 1, 3",
            "-1, :, 0, :",
        ];
        for t in [&base, &permuted] {
            for expr in cases {
                let selectors = parse_selectors(expr)?;
                let (shape, values) = stride_walk(t, &selectors);
                let got = t.index_adv(expr)?;
                assert_eq!(got.shape(), shape.as_slice(), "shape of {expr:?}");
                assert_eq!(got.to_vec(), values, "values of {expr:?}");
            }
        }
        Ok(())
    }

    #[test]
    fn select_and_narrow() -> Result<(), TensorError> {
        let t = range_tensor(&[2, 3])?;
        let col = t.select(1, -1)?;
        assert_eq!(col.shape(), &[2]);
        assert_eq!(col.to_vec(), vec![2, 5]);
        assert!(col.shares_storage_with(&t));
        assert_eq!(t.select(0, 0)?.select(0, 1)?.shape(), &[1]);
        assert!(matches!(
            t.select(2, 0),
            Err(TensorError::InvalidAxis { axis: 2, rank: 2 })
        ));

        let n = t.narrow(1, 1, 2)?;
        assert_eq!(n.shape(), &[2, 2]);
        assert_eq!(n.to_vec(), vec![1, 2, 4, 5]);
        assert!(!n.is_contiguous());
        assert!(t.narrow(1, 2, 2).is_err());
        assert!(matches!(
            t.narrow(1, usize::MAX, 2),
            Err(TensorError::IndexOutOfBounds { axis: 1, index: isize::MAX, size: 3 })
        ));
        assert!(matches!(
            t.narrow(0, 1, usize::MAX),
            Err(TensorError::IndexOutOfBounds { axis: 0, size: 2, .. })
        ));
        assert!(matches!(
            t.narrow(1, 0, 0),
            Err(TensorError::IndexOutOfBounds { axis: 1, index: 0, size: 3 })
        ));
        Ok(())
    }
}
