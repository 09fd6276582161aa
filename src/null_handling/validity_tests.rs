//==================================================================================
// Unit Tests for the ValidityMask algebra
//==================================================================================

#[cfg(test)]
mod tests {
    use crate::null_handling::validity::*;
    use arrow::buffer::NullBuffer;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Builds a materialized mask of `count` rows with roughly `null_ratio` invalid rows.
    fn random_mask(rng: &mut StdRng, count: usize, null_ratio: f64) -> ValidityMask {
        let mut mask = ValidityMask::with_capacity(count);
        mask.set_all_valid(count);
        for row in 0..count {
            if rng.random_bool(null_ratio) {
                mask.set_invalid(row);
            }
        }
        mask
    }

    #[test]
    fn test_combine_is_bitwise_and() {
        let mut rng = StdRng::seed_from_u64(7);
        for count in [1usize, 63, 64, 65, 300, 2048] {
            let a = random_mask(&mut rng, count, 0.3);
            let b = random_mask(&mut rng, count, 0.3);

            let mut combined = a.clone();
            combined.combine(&b, count);

            for row in 0..count {
                assert_eq!(
                    combined.row_is_valid(row),
                    a.row_is_valid(row) && b.row_is_valid(row),
                    "row {} of {}",
                    row,
                    count
                );
            }
            // The AND lands in a fresh array; neither input was touched.
            assert!(!combined.shares_storage_with(&a));
            assert!(!combined.shares_storage_with(&b));
        }
    }

    #[test]
    fn test_combine_with_all_valid_is_a_no_op() {
        let mut rng = StdRng::seed_from_u64(11);
        let a = random_mask(&mut rng, 128, 0.5);
        let mut target = a.clone();
        target.combine(&ValidityMask::with_capacity(128), 128);
        assert!(target.shares_storage_with(&a));
    }

    #[test]
    fn test_combine_into_all_valid_adopts_by_reference() {
        let mut other = ValidityMask::with_capacity(64);
        other.set_invalid(3);

        let mut target = ValidityMask::with_capacity(64);
        target.combine(&other, 64);
        assert!(target.shares_storage_with(&other));
        assert!(!target.row_is_valid(3));

        // The first mutation detaches the adopted words.
        target.set_invalid(5);
        assert!(!target.shares_storage_with(&other));
        assert!(!target.row_is_valid(5));
        assert!(other.row_is_valid(5));
    }

    #[test]
    fn test_combine_with_self_storage_is_idempotent() {
        let mut a = ValidityMask::with_capacity(100);
        a.set_invalid(10);
        a.set_invalid(99);
        let alias = a.clone();

        a.combine(&alias, 100);
        assert!(a.shares_storage_with(&alias));
        assert_eq!(a.count_valid(100), 98);
    }

    #[test]
    fn test_combine_zero_count_keeps_existing_bits() {
        let mut a = ValidityMask::with_capacity(64);
        a.set_invalid(1);
        let mut b = ValidityMask::with_capacity(64);
        b.set_invalid(2);

        a.combine(&b, 0);
        assert!(!a.row_is_valid(1));
        assert!(a.row_is_valid(2));
    }

    #[test]
    fn test_slice_shifts_across_word_boundaries() {
        let mut rng = StdRng::seed_from_u64(42);
        let count = 200;
        let source = random_mask(&mut rng, count, 0.4);

        for offset in [1usize, 5, 63, 64, 65, 100, 128, 130, 199] {
            let sliced = source.sliced(offset);
            for row in 0..count - offset {
                assert_eq!(
                    sliced.row_is_valid(row),
                    source.row_is_valid(row + offset),
                    "offset {} row {}",
                    offset,
                    row
                );
            }
        }
    }

    #[test]
    fn test_slice_at_zero_shares_and_all_valid_stays_sentinel() {
        let mut source = ValidityMask::with_capacity(64);
        source.set_invalid(0);
        let sliced = source.sliced(0);
        assert!(sliced.shares_storage_with(&source));

        let all_valid = ValidityMask::with_capacity(64).sliced(17);
        assert!(all_valid.is_all_valid());
    }

    #[test]
    fn test_clone_then_mutate_does_not_leak_into_alias() {
        let mut original = ValidityMask::with_capacity(64);
        original.set_invalid(2);
        let mut copy = original.clone();
        assert!(original.is_shared());

        copy.set_invalid(7);
        assert!(original.row_is_valid(7));
        assert!(!copy.row_is_valid(7));
        assert!(!copy.row_is_valid(2));
        assert!(!original.is_shared());
    }

    #[test]
    fn test_resize_preserves_bits_and_validates_new_rows() {
        let mut mask = ValidityMask::with_capacity(64);
        mask.set_invalid(3);
        mask.set_invalid(63);

        mask.resize(64, 200);
        assert_eq!(mask.capacity(), 200);
        assert!(!mask.row_is_valid(3));
        assert!(!mask.row_is_valid(63));
        assert_eq!(mask.count_valid(200), 198);

        mask.set_invalid(150);
        assert!(!mask.row_is_valid(150));
    }

    #[test]
    fn test_resize_on_sentinel_is_a_no_op() {
        let mut mask = ValidityMask::with_capacity(64);
        mask.resize(64, 1024);
        assert!(mask.is_all_valid());
    }

    #[test]
    fn test_set_all_valid_and_all_invalid() {
        let mut mask = ValidityMask::with_capacity(128);
        mask.set_all_invalid(70);
        assert_eq!(mask.count_valid(128), 58);
        mask.set_all_valid(65);
        assert_eq!(mask.count_valid(128), 123);
        assert!(!mask.row_is_valid(65));
        assert!(mask.row_is_valid(64));
    }

    #[test]
    fn test_display_string() {
        let mut mask = ValidityMask::with_capacity(4);
        mask.set_invalid(1);
        assert_eq!(mask.to_display_string(4), "Validity Mask (4) [.X..]");
        assert_eq!(mask.to_display_string(0), "Validity Mask (0) []");
    }

    #[test]
    fn test_null_buffer_conversions() {
        let nulls = NullBuffer::from(vec![true, false, true, true, false]);
        let mask = ValidityMask::from_null_buffer(Some(&nulls), 5);
        assert_eq!(mask.to_display_string(5), "Validity Mask (5) [.X..X]");

        let back = mask.to_null_buffer(5).unwrap();
        assert_eq!(back.null_count(), 2);
        assert!(back.is_null(1));
        assert!(back.is_null(4));

        let no_nulls = ValidityMask::from_null_buffer(None, 5);
        assert!(no_nulls.is_all_valid());
        assert!(no_nulls.to_null_buffer(5).is_none());
    }

    #[test]
    fn test_null_buffer_with_offset_and_short_length() {
        let bits: Vec<bool> = (0..150).map(|row| row % 7 != 0).collect();
        let nulls = NullBuffer::from(bits.clone()).slice(3, 140);
        let mask = ValidityMask::from_null_buffer(Some(&nulls), 140);
        for row in 0..140 {
            assert_eq!(mask.row_is_valid(row), bits[row + 3], "row {}", row);
        }
        assert_eq!(mask.count_valid(140), 140 - nulls.null_count());

        // Rows the buffer does not cover are valid.
        let padded = ValidityMask::from_null_buffer(Some(&nulls), 200);
        assert_eq!(padded.count_valid(200), 200 - nulls.null_count());
        assert!(padded.row_is_valid(199));
    }

    #[test]
    fn test_count_valid_matches_row_checks() {
        let mut rng = StdRng::seed_from_u64(11);
        let mask = random_mask(&mut rng, 300, 0.3);
        for count in [0, 1, 63, 64, 65, 128, 200, 299, 300, 400] {
            let expected = (0..count).filter(|&row| mask.row_is_valid(row)).count();
            assert_eq!(mask.count_valid(count), expected, "count {}", count);
        }
    }

    #[test]
    fn test_from_bitmap_bytes() {
        let mask = ValidityMask::from_bitmap_bytes(&[0b1111_1101, 0xFF], 10);
        assert!(!mask.row_is_valid(1));
        assert_eq!(mask.count_valid(10), 9);

        let all_valid = ValidityMask::from_bitmap_bytes(&[0xFF, 0x03], 10);
        assert!(all_valid.is_all_valid());
    }

    #[test]
    fn test_zero_count_operations() {
        let mut mask = ValidityMask::with_capacity(0);
        mask.set_all_valid(0);
        assert_eq!(mask.count_valid(0), 0);
        assert!(mask.to_null_buffer(0).is_none());
        mask.set_invalid(0);
        assert!(!mask.row_is_valid(0));
    }
}
