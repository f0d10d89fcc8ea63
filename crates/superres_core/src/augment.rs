//! Eight-fold rotate/mirror expansion of a stack of 2D slices.
//!
//! Block order of the output, each block holding all `N` input slices:
//! `[rot0(orig), rot0(mirror), rot1(orig), rot1(mirror), ..., rot3(mirror)]`.
//! `rotK` turns the in-plane axes by `K * 90` degrees counter-clockwise and
//! `mirror` reverses the last axis.

use ndarray::{s, Array3, ArrayView3};

use crate::error::{Result, SuperResError};

/// Number of symmetries of the square.
pub const SYMMETRY_COUNT: usize = 8;

/// Rotate every slice of `stack` by `k` quarter turns.
///
/// A quarter turn maps `out[i, j] = in[j, W - 1 - i]`.
pub fn rot90_stack<T>(stack: ArrayView3<'_, T>, k: usize) -> ArrayView3<'_, T> {
    match k % 4 {
        0 => stack,
        1 => stack.slice_move(s![.., .., ..;-1]).permuted_axes([0, 2, 1]),
        2 => stack.slice_move(s![.., ..;-1, ..;-1]),
        _ => stack.permuted_axes([0, 2, 1]).slice_move(s![.., .., ..;-1]),
    }
}

/// Mirror every slice of `stack` horizontally.
pub fn mirror_stack<T>(stack: ArrayView3<'_, T>) -> ArrayView3<'_, T> {
    stack.slice_move(s![.., .., ..;-1])
}

/// Expand an `N x H x W` stack into the `8N x H x W` stack of all its square
/// symmetries.
///
/// Slices must be square, otherwise odd rotations would change their shape.
pub fn rotate_and_mirror<T: Clone + Default>(stack: ArrayView3<'_, T>) -> Result<Array3<T>> {
    let (num_ims, height, width) = stack.dim();
    if height != width {
        return Err(SuperResError::config(format!(
            "rotate and mirror needs square slices, got {}x{}",
            height, width
        )));
    }

    let flipped = mirror_stack(stack.view());
    let mut res = Array3::<T>::default((num_ims * SYMMETRY_COUNT, height, width));
    for k in 0..4 {
        let first_i = 2 * k * num_ims;
        let second_i = (2 * k + 1) * num_ims;
        res.slice_mut(s![first_i..second_i, .., ..])
            .assign(&rot90_stack(stack.view(), k));
        res.slice_mut(s![second_i..second_i + num_ims, .., ..])
            .assign(&rot90_stack(flipped.view(), k));
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Axis};
    use rand::prelude::*;

    fn random_stack(n: usize, side: usize, seed: u64) -> Array3<u32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array3::from_shape_fn((n, side, side), |_| rng.gen_range(0..4))
    }

    /// Index of the block that holds symmetry (`k` quarter turns, `mirrored`).
    fn symmetry_block(k: usize, mirrored: bool) -> usize {
        2 * (k % 4) + usize::from(mirrored)
    }

    /// View of block `block` of an expanded stack with `num_ims` slices per block.
    fn block_of<T>(expanded: &Array3<T>, num_ims: usize, block: usize) -> ArrayView3<'_, T> {
        expanded.slice(s![block * num_ims..(block + 1) * num_ims, .., ..])
    }

    /// Number of original slices in an expanded stack.
    fn original_len<T>(expanded: &Array3<T>) -> usize {
        expanded.len_of(Axis(0)) / SYMMETRY_COUNT
    }

    #[test]
    fn test_expansion_has_eight_blocks() {
        let stack = random_stack(3, 5, 1);
        let expanded = rotate_and_mirror(stack.view()).unwrap();
        assert_eq!(expanded.dim(), (24, 5, 5));
        assert_eq!(original_len(&expanded), 3);
    }

    #[test]
    fn test_constant_slice_gives_identical_slices() {
        let stack = Array3::<u8>::from_elem((1, 4, 4), 9);
        let expanded = rotate_and_mirror(stack.view()).unwrap();
        assert_eq!(expanded.dim(), (8, 4, 4));
        assert!(expanded.iter().all(|&v| v == 9));
    }

    #[test]
    fn test_block_one_is_mirror_of_block_zero() {
        let stack = random_stack(2, 6, 5);
        let expanded = rotate_and_mirror(stack.view()).unwrap();
        let first = block_of(&expanded, 2, symmetry_block(0, false));
        let mirrored = block_of(&expanded, 2, symmetry_block(0, true));
        assert_eq!(first, stack.view());
        assert_eq!(mirrored, mirror_stack(first));
    }

    #[test]
    fn test_quarter_turn_matches_counter_clockwise_rotation() {
        let stack = array![[[1, 2], [3, 4]]];
        let expanded = rotate_and_mirror(stack.view()).unwrap();
        // Counter-clockwise: top-right moves to top-left.
        assert_eq!(expanded.slice(s![2, .., ..]), array![[2, 4], [1, 3]]);
        assert_eq!(expanded.slice(s![4, .., ..]), array![[4, 3], [2, 1]]);
        assert_eq!(expanded.slice(s![6, .., ..]), array![[3, 1], [4, 2]]);
        // Mirrored block of the first quarter turn.
        assert_eq!(expanded.slice(s![3, .., ..]), array![[1, 3], [2, 4]]);
    }

    #[test]
    fn test_all_symmetries_are_distinct_for_generic_slice() {
        let stack = array![[[0, 1, 2], [3, 4, 5], [6, 7, 8]]];
        let expanded = rotate_and_mirror(stack.view()).unwrap();
        for a in 0..SYMMETRY_COUNT {
            for b in (a + 1)..SYMMETRY_COUNT {
                assert_ne!(
                    expanded.index_axis(Axis(0), a),
                    expanded.index_axis(Axis(0), b),
                    "blocks {} and {} coincide",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_four_quarter_turns_are_identity() {
        let stack = random_stack(1, 4, 11);
        let once = rot90_stack(stack.view(), 1).to_owned();
        let twice = rot90_stack(once.view(), 1).to_owned();
        let thrice = rot90_stack(twice.view(), 1).to_owned();
        let full = rot90_stack(thrice.view(), 1).to_owned();
        assert_eq!(full, stack);
        assert_eq!(thrice, rot90_stack(stack.view(), 3));
    }

    #[test]
    fn test_non_square_slices_are_rejected() {
        let stack = Array3::<u8>::zeros((1, 3, 4));
        assert!(matches!(
            rotate_and_mirror(stack.view()),
            Err(SuperResError::Configuration(_))
        ));
    }
}
