use crate::sample_field;
use nalgebra::DVector;
use romulus::field::{distributed_l2_inner, relative_l2_error, CellVolumes, FvField};
use romulus::parallel::SerialCommunicator;

#[test]
fn l2_inner_product_is_volume_weighted() {
    let volumes = CellVolumes::new(DVector::from_column_slice(&[0.5, 0.25, 0.25]));
    let a = sample_field("a", 3, |i| (i + 1) as f64);
    let b = sample_field("b", 3, |i| 2.0 * (i + 1) as f64);

    // sum_c a_c * w_c * b_c = 0.5*1*2 + 0.25*2*4 + 0.25*3*6
    assert_eq!(a.l2_inner(&b, &volumes), 1.0 + 2.0 + 4.5);
    assert_eq!(a.l2_norm(&volumes), (0.5 + 1.0 + 2.25f64).sqrt());
}

#[test]
fn frobenius_inner_ignores_volumes() {
    let a = sample_field("a", 3, |i| (i + 1) as f64);
    let b = sample_field("b", 3, |_| 1.0);
    assert_eq!(a.frobenius_inner(&b), 6.0);
}

#[test]
fn axpy_updates_interior_and_boundary() {
    let mut a = sample_field("a", 3, |i| i as f64);
    let b = sample_field("b", 3, |_| 1.0);
    a.axpy(2.0, &b);

    assert_eq!(a.interior(), &DVector::from_column_slice(&[2.0, 3.0, 4.0]));
    assert_eq!(a.patch(0)[0], 2.0);
    assert_eq!(a.patch(1)[0], 4.0);
}

#[test]
fn scale_touches_every_region() {
    let mut a = sample_field("a", 2, |i| (i + 1) as f64);
    a.scale(-3.0);
    assert_eq!(a.interior()[1], -6.0);
    assert_eq!(a.patch(0)[0], -3.0);
}

#[test]
fn same_shape_rejects_mismatched_patches() {
    let a = sample_field("a", 3, |_| 0.0);
    let b = FvField::new("b", DVector::zeros(3), vec![DVector::zeros(1)]);
    assert!(!a.same_shape(&b));

    let c = FvField::new("c", DVector::zeros(3), vec![DVector::zeros(1), DVector::zeros(2)]);
    assert!(!a.same_shape(&c));
}

#[test]
#[should_panic(expected = "different shapes")]
fn axpy_panics_on_shape_mismatch() {
    let mut a = sample_field("a", 3, |_| 0.0);
    let b = sample_field("b", 4, |_| 0.0);
    a.axpy(1.0, &b);
}

#[test]
fn relative_error_vanishes_for_identical_fields() {
    let volumes = CellVolumes::uniform(4, 0.25);
    let a = sample_field("a", 4, |i| (i as f64).sin() + 2.0);
    assert_eq!(relative_l2_error(&a, &a, &volumes), 0.0);
}

#[test]
fn relative_error_of_scaled_field() {
    let volumes = CellVolumes::uniform(4, 0.25);
    let b = sample_field("b", 4, |_| 2.0);
    let mut a = b.clone();
    a.scale(1.5);
    // |1.5 b - b| / |b| = 0.5
    assert!((relative_l2_error(&a, &b, &volumes) - 0.5).abs() < 1e-14);
}

#[test]
fn serial_distributed_inner_product_matches_local() {
    let volumes = CellVolumes::uniform(5, 0.2);
    let a = sample_field("a", 5, |i| i as f64);
    let b = sample_field("b", 5, |i| (i * i) as f64);
    let comm = SerialCommunicator;
    assert_eq!(distributed_l2_inner(&comm, &a, &b, &volumes), a.l2_inner(&b, &volumes));
}

#[test]
#[should_panic(expected = "strictly positive")]
fn zero_cell_volume_is_rejected() {
    CellVolumes::new(DVector::from_column_slice(&[0.5, 0.0]));
}
