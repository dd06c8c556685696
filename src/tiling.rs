//! Tile-shape enumeration (§4.2): the legal ways to split a function's
//! realized extents into an outer loop and a per-tile inner loop, the raw
//! material `compute_in_tiles` iterates over when generating children.

/// Enumerate candidate tile shapes for a region of the given `sizes`
/// (one extent per dimension, outermost first).
///
/// For each dimension, candidates are: untiled (inner size 1, skipped when
/// it would make every dimension untiled at once), the whole extent (no
/// split, skipped once a narrower dimension already covers it), and
/// power-of-`factor` inner sizes strictly between 1 and the full extent.
/// When `allow_splits` is false only the whole-extent tiling is produced —
/// used for dimensions that must stay one compute instance (e.g. the
/// vectorized dimension inside `compute_in_tiles`'s inner loop).
pub fn tilings(sizes: &[i64], factor: i64, allow_splits: bool) -> Vec<Vec<i64>> {
    generate(sizes, sizes.len() as isize - 1, factor, allow_splits)
}

fn generate(sizes: &[i64], d: isize, factor: i64, allow_splits: bool) -> Vec<Vec<i64>> {
    if d < 0 {
        return vec![Vec::new()];
    }

    let prev = generate(sizes, d - 1, factor, allow_splits);
    let last_dim = d as usize == sizes.len() - 1;
    let mut result = Vec::new();

    for t in prev {
        let (is_one, is_full) = if last_dim {
            let mut is_one = true;
            let mut is_full = true;
            for i in 0..d as usize {
                is_one &= t[i] == 1;
                is_full &= t[i] == sizes[i];
            }
            (is_one, is_full)
        } else {
            (false, false)
        };

        let mut untiled = t.clone();
        untiled.push(1);
        if !is_one {
            result.push(untiled);
        }

        if !allow_splits {
            continue;
        }

        if !is_full {
            let mut whole = t.clone();
            whole.push(sizes[d as usize]);
            result.push(whole);
        }

        let extent = sizes[d as usize];
        if extent != 1 && extent != factor {
            let mut inner = factor;
            while inner < extent {
                let mut tiled = t.clone();
                tiled.push(inner);
                result.push(tiled);
                inner *= factor;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dimension_yields_untiled_full_and_powers_of_factor() {
        let ts = tilings(&[100], 2, true);
        assert!(ts.contains(&vec![100]));
        // untiled (inner size 1) is suppressed when it's the only dimension
        // and it would leave every dimension untiled at once.
        assert!(!ts.contains(&vec![1]));
        assert!(ts.contains(&vec![2]));
        assert!(ts.contains(&vec![64]));
    }

    #[test]
    fn disallowing_splits_only_produces_the_whole_extent() {
        let ts = tilings(&[100, 50], 2, false);
        for t in &ts {
            assert_eq!(t[0], 100);
            assert_eq!(t[1], 50);
        }
        assert_eq!(ts.len(), 1);
    }

    #[test]
    fn two_dimensions_never_emit_the_all_untiled_shape() {
        let ts = tilings(&[16, 16], 2, true);
        assert!(!ts.contains(&vec![1, 1]));
    }

    #[test]
    fn unit_extent_skips_power_of_factor_splitting() {
        let ts = tilings(&[1], 2, true);
        // extent == 1: no inner-size loop runs, only untiled/full (which
        // coincide and collapse via the is_full/is_one suppression).
        assert!(ts.iter().all(|t| t == &vec![1]));
    }
}
