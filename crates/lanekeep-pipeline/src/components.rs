//! Noise filter: drop small connected foreground regions from a mask.
//!
//! Wraps [`imageproc::region_labelling::connected_components`] for a
//! single labeling pass, then counts pixels per label and keeps only
//! the components strictly larger than the configured size. The
//! survival decision depends only on component size, never on the
//! label id, so labeling order cannot change the result.

use imageproc::region_labelling::Connectivity as ImageprocConnectivity;
use serde::{Deserialize, Serialize};

use crate::types::Mask;

/// Pixel adjacency used when grouping foreground pixels into components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Edge-adjacent neighbors only.
    Four,
    /// Edge- and corner-adjacent neighbors.
    #[default]
    Eight,
}

impl Connectivity {
    const fn to_imageproc(self) -> ImageprocConnectivity {
        match self {
            Self::Four => ImageprocConnectivity::Four,
            Self::Eight => ImageprocConnectivity::Eight,
        }
    }
}

/// Remove every connected component with `min_size` pixels or fewer.
///
/// An all-background mask yields an all-background mask. An
/// all-foreground mask is a single component and survives whenever its
/// pixel count exceeds `min_size`.
#[must_use = "returns the filtered mask"]
pub fn remove_small_components(mask: &Mask, min_size: u32, connectivity: Connectivity) -> Mask {
    let labels = imageproc::region_labelling::connected_components(
        mask.as_image(),
        connectivity.to_imageproc(),
        image::Luma([0u8]),
    );

    // Label 0 is background; components are numbered densely from 1.
    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0);
    let mut sizes = vec![0u32; max_label as usize + 1];
    for p in labels.pixels() {
        sizes[p.0[0] as usize] += 1;
    }

    Mask::from_fn(mask.width(), mask.height(), |x, y| {
        let label = labels.get_pixel(x, y).0[0];
        label != 0 && sizes[label as usize] > min_size
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// A 10x10 mask with a 3x3 block (9 px) and a single isolated pixel.
    fn block_and_speck() -> Mask {
        Mask::from_fn(10, 10, |x, y| {
            ((2..5).contains(&x) && (2..5).contains(&y)) || (x, y) == (8, 8)
        })
    }

    #[test]
    fn empty_mask_stays_empty() {
        let out = remove_small_components(&Mask::new(8, 8), 0, Connectivity::Eight);
        assert_eq!(out.foreground_count(), 0);
    }

    #[test]
    fn full_mask_survives_when_large_enough() {
        let full = Mask::from_fn(8, 8, |_, _| true);
        let out = remove_small_components(&full, 63, Connectivity::Eight);
        assert_eq!(out, full);
        let out = remove_small_components(&full, 64, Connectivity::Eight);
        assert_eq!(out.foreground_count(), 0);
    }

    #[test]
    fn speck_is_removed_block_kept() {
        let out = remove_small_components(&block_and_speck(), 1, Connectivity::Eight);
        assert_eq!(out.foreground_count(), 9);
        assert!(!out.is_foreground(8, 8));
        assert!(out.is_foreground(3, 3));
    }

    #[test]
    fn component_of_exactly_min_size_is_dropped() {
        let out = remove_small_components(&block_and_speck(), 9, Connectivity::Eight);
        assert_eq!(out.foreground_count(), 0);
    }

    #[test]
    fn diagonal_pixels_depend_on_connectivity() {
        let diagonal = Mask::from_fn(4, 4, |x, y| x == y);
        let eight = remove_small_components(&diagonal, 3, Connectivity::Eight);
        let four = remove_small_components(&diagonal, 3, Connectivity::Four);
        assert_eq!(eight.foreground_count(), 4);
        assert_eq!(four.foreground_count(), 0);
    }

    fn mask_strategy() -> impl Strategy<Value = Mask> {
        (1u32..16, 1u32..16)
            .prop_flat_map(|(w, h)| {
                prop::collection::vec(any::<bool>(), (w * h) as usize)
                    .prop_map(move |bits| (w, h, bits))
            })
            .prop_map(|(w, h, bits)| Mask::from_fn(w, h, |x, y| bits[(y * w + x) as usize]))
    }

    proptest! {
        /// Property: the output is a subset of the input.
        #[test]
        fn prop_output_is_subset(mask in mask_strategy(), min_size in 0u32..20) {
            let out = remove_small_components(&mask, min_size, Connectivity::Eight);
            for y in 0..mask.height() {
                for x in 0..mask.width() {
                    prop_assert!(!out.is_foreground(x, y) || mask.is_foreground(x, y));
                }
            }
        }

        /// Property: lowering `min_size` never removes more pixels.
        #[test]
        fn prop_survivors_monotone_in_min_size(mask in mask_strategy(), a in 0u32..20, b in 0u32..20) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let at_lo = remove_small_components(&mask, lo, Connectivity::Four).foreground_count();
            let at_hi = remove_small_components(&mask, hi, Connectivity::Four).foreground_count();
            prop_assert!(at_lo >= at_hi);
        }

        /// Property: every surviving pixel belongs to a component larger than `min_size`.
        #[test]
        fn prop_survivors_belong_to_large_components(mask in mask_strategy(), min_size in 0u32..20) {
            let out = remove_small_components(&mask, min_size, Connectivity::Eight);
            // Any survivor's component is kept whole, so the filtered mask is
            // idempotent under the same threshold.
            let again = remove_small_components(&out, min_size, Connectivity::Eight);
            prop_assert_eq!(&again, &out);
            prop_assert!(out.foreground_count() == 0 || out.foreground_count() > u64::from(min_size));
        }
    }
}
