use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use romulus::storage::*;
use romulus::tensor::DenseTensor3;

fn sample_matrix(rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |i, j| (i as f64 + 1.0) * 0.5 - (j as f64) * 0.25)
}

fn sample_sparse() -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(4, 3);
    coo.push(0, 0, 1.5);
    coo.push(0, 2, -2.0);
    coo.push(1, 1, 3.25);
    coo.push(3, 0, 0.125);
    coo.push(3, 2, 7.0);
    CsrMatrix::from(&coo)
}

#[test]
fn dense_matrix_round_trip_is_bit_exact() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = sample_matrix(5, 3);

    save_dense_matrix(&matrix, dir.path(), "A").unwrap();
    let loaded = load_dense_matrix(dir.path(), "A");

    assert_eq!(loaded, matrix);
}

#[test]
fn empty_dense_matrix_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = DMatrix::<f64>::zeros(0, 0);
    save_dense_matrix(&matrix, dir.path(), "empty").unwrap();
    assert_eq!(load_dense_matrix(dir.path(), "empty"), matrix);
}

#[test]
fn sparse_matrix_round_trip_preserves_structure() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = sample_sparse();

    save_sparse_matrix(&matrix, dir.path(), "S").unwrap();
    let loaded = load_sparse_matrix(dir.path(), "S");

    assert_eq!(loaded.nrows(), 4);
    assert_eq!(loaded.ncols(), 3);
    assert_eq!(loaded.nnz(), 5);
    assert_eq!(loaded, matrix);
}

#[test]
fn tensor_round_trip_is_bit_exact() {
    let dir = tempfile::tempdir().unwrap();
    let tensor = DenseTensor3::from_fn(3, 2, 4, |i, j, k| (i * 100 + j * 10 + k) as f64 * 0.1);

    save_tensor(&tensor, dir.path(), "C").unwrap();
    let loaded = load_tensor(dir.path(), "C");

    assert_eq!(loaded, tensor);
}

#[test]
fn matrix_lists_use_indexed_names() {
    let dir = tempfile::tempdir().unwrap();
    let matrices = vec![sample_matrix(2, 2), sample_matrix(2, 2), sample_matrix(3, 1)];

    save_dense_matrix_list(&matrices, dir.path(), "M").unwrap();

    assert!(dir.path().join("M0").exists());
    assert!(dir.path().join("M2").exists());
    assert_eq!(count_indexed_artifacts(dir.path(), "M"), 3);
    assert_eq!(load_dense_matrix_list(dir.path(), "M"), matrices);
}

#[test]
fn sparse_matrix_list_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let matrices = vec![sample_sparse(), sample_sparse()];
    save_sparse_matrix_list(&matrices, dir.path(), "S").unwrap();
    assert_eq!(load_sparse_matrix_list(dir.path(), "S"), matrices);
}

#[test]
fn tensor_list_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let tensors = vec![
        DenseTensor3::from_fn(2, 2, 2, |i, j, k| (i + j + k) as f64),
        DenseTensor3::zeros(1, 3, 3),
    ];
    save_tensor_list(&tensors, dir.path(), "T").unwrap();
    assert_eq!(load_tensor_list(dir.path(), "T"), tensors);
}

#[test]
fn indexed_count_stops_at_first_gap() {
    let dir = tempfile::tempdir().unwrap();
    save_dense_matrix(&sample_matrix(1, 1), dir.path(), "G0").unwrap();
    save_dense_matrix(&sample_matrix(1, 1), dir.path(), "G2").unwrap();
    assert_eq!(count_indexed_artifacts(dir.path(), "G"), 1);
}

#[test]
#[should_panic(expected = "rerun the offline stage")]
fn missing_artifact_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    load_dense_matrix(dir.path(), "missing");
}

#[test]
#[should_panic(expected = "rerun the offline stage")]
fn truncated_artifact_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("short"), [0u8; 4]).unwrap();
    load_dense_matrix(dir.path(), "short");
}

#[test]
#[should_panic(expected = "no cached artifacts")]
fn empty_list_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    load_dense_matrix_list(dir.path(), "absent");
}

#[test]
fn interchange_export_parses_back_row_major() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = sample_matrix(2, 3);

    export_matrix(&matrix, dir.path(), "A", ExportFormat::Interchange).unwrap();

    let text = std::fs::read_to_string(dir.path().join("A.json")).unwrap();
    let rows: Vec<Vec<f64>> = serde_json::from_str(&text).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 3);
    for i in 0..2 {
        for j in 0..3 {
            assert_eq!(rows[i][j], matrix[(i, j)]);
        }
    }
}

#[test]
fn matlab_export_is_an_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);

    export_matrix(&matrix, dir.path(), "B", ExportFormat::Matlab).unwrap();

    let text = std::fs::read_to_string(dir.path().join("B.m")).unwrap();
    assert!(text.starts_with("B = ["));
    assert!(text.trim_end().ends_with("];"));
    assert_eq!(text.matches(';').count(), 2);
}

#[test]
fn plain_export_has_one_line_per_row() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = sample_matrix(4, 2);

    export_matrix(&matrix, dir.path(), "C", ExportFormat::Plain).unwrap();

    let text = std::fs::read_to_string(dir.path().join("C.txt")).unwrap();
    assert_eq!(text.lines().count(), 4);
    assert_eq!(text.lines().next().unwrap().split_whitespace().count(), 2);
}

#[test]
fn tensor_export_writes_one_slice_per_file() {
    let dir = tempfile::tempdir().unwrap();
    let tensor = DenseTensor3::from_fn(3, 2, 2, |i, j, k| (i + j + k) as f64);

    export_tensor(&tensor, dir.path(), "T", ExportFormat::Plain).unwrap();

    for k in 0..3 {
        let text = std::fs::read_to_string(dir.path().join(format!("T_{}.txt", k))).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}

#[test]
fn matrix_list_export_names_are_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let matrices = vec![sample_matrix(1, 1), sample_matrix(1, 1)];
    export_matrix_list(&matrices, dir.path(), "L", ExportFormat::Interchange).unwrap();
    assert!(dir.path().join("L_0.json").exists());
    assert!(dir.path().join("L_1.json").exists());
}
