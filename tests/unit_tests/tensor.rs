use nalgebra::{DMatrix, DVector};
use romulus::tensor::DenseTensor3;

#[test]
fn indexing_round_trips_through_from_fn() {
    let t = DenseTensor3::from_fn(2, 3, 4, |i, j, k| (100 * i + 10 * j + k) as f64);
    assert_eq!(t.dims(), [2, 3, 4]);
    assert_eq!(t.len(), 24);
    assert_eq!(t[[0, 0, 0]], 0.0);
    assert_eq!(t[[1, 2, 3]], 123.0);
    assert_eq!(t[[0, 1, 2]], 12.0);
}

#[test]
fn storage_is_column_major_first_index_fastest() {
    let t = DenseTensor3::from_fn(2, 2, 2, |i, j, k| (i + 2 * j + 4 * k) as f64);
    // offset(i, j, k) = i + d0 * (j + d1 * k)
    assert_eq!(t.as_slice(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
}

#[test]
fn from_raw_round_trips_as_slice() {
    let data: Vec<f64> = (0..12).map(|v| v as f64 * 0.5).collect();
    let t = DenseTensor3::from_raw([3, 2, 2], data.clone());
    assert_eq!(t.as_slice(), data.as_slice());
}

#[test]
#[should_panic(expected = "buffer length")]
fn from_raw_rejects_mismatched_buffer() {
    DenseTensor3::from_raw([2, 2, 2], vec![0.0; 7]);
}

#[test]
fn slice_fixes_the_first_index() {
    let t = DenseTensor3::from_fn(2, 3, 2, |i, j, k| (100 * i + 10 * j + k) as f64);
    let s = t.slice(1);
    assert_eq!(s, DMatrix::from_fn(3, 2, |j, k| (100 + 10 * j + k) as f64));
}

#[test]
fn bilinear_matches_explicit_contraction() {
    let t = DenseTensor3::from_fn(2, 3, 3, |i, j, k| ((i + 1) * (j + 2) * (k + 3)) as f64);
    let x = DVector::from_column_slice(&[1.0, -2.0, 0.5]);
    let y = DVector::from_column_slice(&[0.0, 3.0, -1.0]);

    for k in 0..2 {
        let expected = (x.transpose() * t.slice(k) * &y)[(0, 0)];
        assert!((t.bilinear(k, &x, &y) - expected).abs() < 1e-12);
    }
}

#[test]
fn bilinear_skips_zero_right_entries() {
    // NaN entries in columns masked by a zero coefficient must not leak in.
    let mut t = DenseTensor3::zeros(1, 2, 2);
    t[[0, 0, 0]] = f64::NAN;
    t[[0, 1, 0]] = f64::NAN;
    t[[0, 0, 1]] = 2.0;
    t[[0, 1, 1]] = 3.0;
    let x = DVector::from_column_slice(&[1.0, 1.0]);
    let y = DVector::from_column_slice(&[0.0, 1.0]);
    assert_eq!(t.bilinear(0, &x, &y), 5.0);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn out_of_bounds_index_panics() {
    let t = DenseTensor3::zeros(2, 2, 2);
    let _ = t[[0, 2, 0]];
}

#[test]
fn max_abs_diff_finds_largest_deviation() {
    let a = DenseTensor3::from_fn(2, 2, 2, |i, j, k| (i + j + k) as f64);
    let mut b = a.clone();
    b[[1, 0, 1]] += 0.25;
    b[[0, 1, 0]] -= 0.75;
    assert_eq!(a.max_abs_diff(&b), 0.75);
    assert_eq!(a.max_abs_diff(&a), 0.0);
}
