//! Property-based tests for the shape model, views and matmul variants.

use ferrograd_tensor::{matmul, shape, ExecutionContext, Tensor};
use proptest::prelude::*;

/// A shape of rank 1..=4 with dimensions in 1..=4.
fn small_shape() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..=4, 1..=4)
}

/// Two shapes derived from one base so that, axis by axis, each holds the size or 1.
fn compatible_shapes() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    (small_shape(), any::<u64>(), any::<u64>()).prop_map(|(base, ma, mb)| {
        let pick = |mask: u64| -> Vec<usize> {
            base.iter()
                .enumerate()
                .map(|(i, &d)| if (mask >> i) & 1 == 1 { 1 } else { d })
                .collect()
        };
        let a = pick(ma);
        // drop some leading axes of the second shape
        let drop = (mb >> 8) as usize % base.len();
        let b = pick(mb)[drop..].to_vec();
        (a, b)
    })
}

fn permutation(rank: usize, seed: u64) -> Vec<usize> {
    let mut axes: Vec<usize> = (0..rank).collect();
    let mut s = seed;
    for i in (1..rank).rev() {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        axes.swap(i, (s >> 33) as usize % (i + 1));
    }
    axes
}

fn iota(shape: &[usize]) -> Tensor<i64> {
    let n: usize = shape.iter().product();
    Tensor::from_vec((0..n as i64).collect(), shape).unwrap()
}

proptest! {
    /// Broadcast compatibility is symmetric and the result takes the larger extent per axis.
    #[test]
    fn broadcast_is_symmetric((a, b) in compatible_shapes()) {
        prop_assert!(shape::are_broadcastable(&a, &b));
        prop_assert!(shape::are_broadcastable(&b, &a));
        let ab = shape::broadcast_shapes(&a, &b).unwrap();
        let ba = shape::broadcast_shapes(&b, &a).unwrap();
        prop_assert_eq!(&ab, &ba);
        prop_assert_eq!(ab.len(), a.len().max(b.len()));
        let rank = ab.len();
        for i in 0..rank {
            let da = if i + a.len() >= rank { a[i + a.len() - rank] } else { 1 };
            let db = if i + b.len() >= rank { b[i + b.len() - rank] } else { 1 };
            prop_assert_eq!(ab[i], da.max(db));
        }
    }

    /// Permuting and then applying the inverse permutation recovers the original view.
    #[test]
    fn permute_round_trip(dims in small_shape(), seed in any::<u64>()) {
        let t = iota(&dims);
        let axes = permutation(dims.len(), seed);
        let mut inverse = vec![0; axes.len()];
        for (i, &a) in axes.iter().enumerate() {
            inverse[a] = i;
        }
        let back = t.permute(&axes).unwrap().permute(&inverse).unwrap();
        prop_assert_eq!(back.shape(), t.shape());
        prop_assert_eq!(back.strides(), t.strides());
        prop_assert_eq!(back.to_vec(), t.to_vec());
        prop_assert!(back.shares_storage_with(&t));
    }

    /// Making a view contiguous twice yields the same buffer as doing it once.
    #[test]
    fn as_contiguous_is_idempotent(dims in small_shape(), seed in any::<u64>()) {
        let t = iota(&dims).permute(&permutation(dims.len(), seed)).unwrap();
        let once = t.as_contiguous().unwrap();
        let twice = once.as_contiguous().unwrap();
        prop_assert!(once.is_contiguous());
        prop_assert!(twice.shares_storage_with(&once));
        prop_assert_eq!(twice.to_vec(), t.to_vec());
    }

    /// Splitting into quadrants and joining them back is lossless, odd sizes included.
    #[test]
    fn split_unite_round_trip(rows in 2usize..12, cols in 2usize..12) {
        let t = iota(&[rows, cols]);
        let q = t.split_quadrants().unwrap();
        prop_assert!(Tensor::unite_quadrants(&q).unwrap().is_equal(&t));
    }

    /// The recursive product equals the blocked product exactly on integers.
    #[test]
    fn recursive_matmul_matches_blocked(
        m in 1usize..14,
        k in 1usize..14,
        n in 1usize..14,
        threshold in 1usize..6,
    ) {
        let ctx = ExecutionContext::serial().with_recursion_threshold(threshold);
        let a = Tensor::<i64>::from_fn(&[m, k], |i| (i[0] as i64 * 3 - i[1] as i64) % 5).unwrap();
        let b = Tensor::<i64>::from_fn(&[k, n], |i| (i[0] as i64 + 2 * i[1] as i64) % 7 - 3).unwrap();
        let blocked = matmul::matmul(&ctx, &a, &b).unwrap();
        let recursive = matmul::matmul_recursive(&ctx, &a, &b).unwrap();
        prop_assert!(recursive.is_equal(&blocked));
    }

    /// Selecting along the leading axis and then indexing equals a full index.
    #[test]
    fn partial_index_matches_full_index(dims in small_shape(), seed in any::<u64>()) {
        let t = iota(&dims);
        let idx: Vec<isize> = dims
            .iter()
            .enumerate()
            .map(|(i, &d)| ((seed >> (i * 8)) as usize % d) as isize)
            .collect();
        let head = t.index(&idx[..1]).unwrap();
        let expected = t.get(&idx).unwrap();
        let got = if dims.len() == 1 { head.item().unwrap() } else { head.get(&idx[1..]).unwrap() };
        prop_assert_eq!(got, expected);
    }
}
