//! Binary persistence of reduced operators and interchange exports.
//!
//! Reduced operators are expensive to assemble (the trilinear terms scale
//! with the cube of the mode count times the mesh size) and are therefore
//! cached to disk during the offline stage and loaded read-only online.
//! Artifacts live at `<directory>/<name>` (lists append a running index to
//! the name); the format carries no magic number or version tag, so cache
//! files from incompatible mode counts or discretizations must not be mixed.
//!
//! Failure semantics are deliberately asymmetric:
//!
//! - *writes* return [`eyre::Result`] so callers can react to a failed
//!   cache update;
//! - *reads* of a missing or corrupt artifact panic with an actionable
//!   message, because a missing cached operator means the offline stage was
//!   not run and any online result would be meaningless.
//!
//! All binary values are native-endian: `u64` header fields followed by
//! `f64` payload buffers.

use crate::tensor::DenseTensor3;
use eyre::WrapErr;
use log::info;
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

fn write_u64(w: &mut impl Write, value: u64) -> io::Result<()> {
    w.write_all(&value.to_ne_bytes())
}

fn write_u64_slice(w: &mut impl Write, values: &[usize]) -> io::Result<()> {
    for &v in values {
        write_u64(w, v as u64)?;
    }
    Ok(())
}

fn write_f64_slice(w: &mut impl Write, values: &[f64]) -> io::Result<()> {
    for &v in values {
        w.write_all(&v.to_ne_bytes())?;
    }
    Ok(())
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_ne_bytes(buf))
}

fn read_u64_vec(r: &mut impl Read, len: usize) -> io::Result<Vec<usize>> {
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        values.push(read_u64(r)? as usize);
    }
    Ok(values)
}

fn read_f64_vec(r: &mut impl Read, len: usize) -> io::Result<Vec<f64>> {
    let mut buf = [0u8; 8];
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        r.read_exact(&mut buf)?;
        values.push(f64::from_ne_bytes(buf));
    }
    Ok(values)
}

fn create_writer(directory: &Path, name: &str) -> eyre::Result<BufWriter<File>> {
    std::fs::create_dir_all(directory)
        .wrap_err_with(|| format!("failed to create output directory {}", directory.display()))?;
    let path = directory.join(name);
    let file = File::create(&path).wrap_err_with(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Opens a cache artifact for reading. Missing artifacts are fatal.
fn open_reader(directory: &Path, name: &str) -> (PathBuf, BufReader<File>) {
    let path = directory.join(name);
    if !path.exists() {
        panic!(
            "{} does not exist, rerun the offline stage to regenerate cached operators",
            path.display()
        );
    }
    let file = File::open(&path)
        .unwrap_or_else(|err| panic!("failed to open cache artifact {}: {}", path.display(), err));
    (path, BufReader::new(file))
}

fn corrupt(path: &Path, err: impl std::fmt::Display) -> ! {
    panic!(
        "cache artifact {} is corrupt or truncated ({}), rerun the offline stage",
        path.display(),
        err
    )
}

/// Saves a dense matrix as `[rows][cols]` followed by the column-major
/// value buffer. The round trip through [`load_dense_matrix`] is bit-exact.
pub fn save_dense_matrix(matrix: &DMatrix<f64>, directory: impl AsRef<Path>, name: &str) -> eyre::Result<()> {
    let mut w = create_writer(directory.as_ref(), name)?;
    write_u64(&mut w, matrix.nrows() as u64)?;
    write_u64(&mut w, matrix.ncols() as u64)?;
    write_f64_slice(&mut w, matrix.as_slice())?;
    w.flush()?;
    Ok(())
}

/// Loads a dense matrix saved by [`save_dense_matrix`].
///
/// # Panics
///
/// Panics if the artifact is missing or unreadable; a missing cached
/// operator signals an un-run offline stage.
pub fn load_dense_matrix(directory: impl AsRef<Path>, name: &str) -> DMatrix<f64> {
    let (path, mut r) = open_reader(directory.as_ref(), name);
    let result: io::Result<DMatrix<f64>> = (|| {
        let rows = read_u64(&mut r)? as usize;
        let cols = read_u64(&mut r)? as usize;
        let data = read_f64_vec(&mut r, rows * cols)?;
        Ok(DMatrix::from_column_slice(rows, cols, &data))
    })();
    result.unwrap_or_else(|err| corrupt(&path, err))
}

/// Saves a CSR matrix as `[rows][cols][nnz][outer_len][inner_dim]` followed
/// by the value, row-offset and column-index arrays.
///
/// `outer_len` is the length of the row-offset array (`rows + 1`) and
/// `inner_dim` the column count of the compressed axis.
pub fn save_sparse_matrix(matrix: &CsrMatrix<f64>, directory: impl AsRef<Path>, name: &str) -> eyre::Result<()> {
    let mut w = create_writer(directory.as_ref(), name)?;
    let (row_offsets, col_indices, values) = matrix.csr_data();
    write_u64(&mut w, matrix.nrows() as u64)?;
    write_u64(&mut w, matrix.ncols() as u64)?;
    write_u64(&mut w, matrix.nnz() as u64)?;
    write_u64(&mut w, row_offsets.len() as u64)?;
    write_u64(&mut w, matrix.ncols() as u64)?;
    write_f64_slice(&mut w, values)?;
    write_u64_slice(&mut w, row_offsets)?;
    write_u64_slice(&mut w, col_indices)?;
    w.flush()?;
    Ok(())
}

/// Loads a CSR matrix saved by [`save_sparse_matrix`], re-validating the
/// compressed structure so the result is immediately queryable.
///
/// # Panics
///
/// Panics if the artifact is missing, unreadable, or structurally invalid.
pub fn load_sparse_matrix(directory: impl AsRef<Path>, name: &str) -> CsrMatrix<f64> {
    let (path, mut r) = open_reader(directory.as_ref(), name);
    let parts: io::Result<_> = (|| {
        let rows = read_u64(&mut r)? as usize;
        let cols = read_u64(&mut r)? as usize;
        let nnz = read_u64(&mut r)? as usize;
        let outer_len = read_u64(&mut r)? as usize;
        let _inner_dim = read_u64(&mut r)? as usize;
        let values = read_f64_vec(&mut r, nnz)?;
        let row_offsets = read_u64_vec(&mut r, outer_len)?;
        let col_indices = read_u64_vec(&mut r, nnz)?;
        Ok((rows, cols, row_offsets, col_indices, values))
    })();
    let (rows, cols, row_offsets, col_indices, values) = parts.unwrap_or_else(|err| corrupt(&path, err));
    CsrMatrix::try_from_csr_data(rows, cols, row_offsets, col_indices, values)
        .unwrap_or_else(|err| corrupt(&path, err))
}

/// Saves a rank-3 tensor as `[d0][d1][d2]` followed by the flattened buffer
/// in the tensor's native column-major order.
pub fn save_tensor(tensor: &DenseTensor3, directory: impl AsRef<Path>, name: &str) -> eyre::Result<()> {
    let mut w = create_writer(directory.as_ref(), name)?;
    let [d0, d1, d2] = tensor.dims();
    write_u64(&mut w, d0 as u64)?;
    write_u64(&mut w, d1 as u64)?;
    write_u64(&mut w, d2 as u64)?;
    write_f64_slice(&mut w, tensor.as_slice())?;
    w.flush()?;
    Ok(())
}

/// Loads a rank-3 tensor saved by [`save_tensor`].
///
/// # Panics
///
/// Panics if the artifact is missing or unreadable.
pub fn load_tensor(directory: impl AsRef<Path>, name: &str) -> DenseTensor3 {
    let (path, mut r) = open_reader(directory.as_ref(), name);
    let result: io::Result<DenseTensor3> = (|| {
        let d0 = read_u64(&mut r)? as usize;
        let d1 = read_u64(&mut r)? as usize;
        let d2 = read_u64(&mut r)? as usize;
        let data = read_f64_vec(&mut r, d0 * d1 * d2)?;
        Ok(DenseTensor3::from_raw([d0, d1, d2], data))
    })();
    result.unwrap_or_else(|err| corrupt(&path, err))
}

/// Number of artifacts named `<name>0`, `<name>1`, ... present in
/// `directory`, counted until the first gap.
pub fn count_indexed_artifacts(directory: impl AsRef<Path>, name: &str) -> usize {
    let directory = directory.as_ref();
    let mut count = 0;
    while directory.join(format!("{}{}", name, count)).exists() {
        count += 1;
    }
    count
}

/// Saves a list of dense matrices as `<name>0..<name>{len-1}`.
pub fn save_dense_matrix_list(
    matrices: &[DMatrix<f64>],
    directory: impl AsRef<Path>,
    name: &str,
) -> eyre::Result<()> {
    for (i, matrix) in matrices.iter().enumerate() {
        save_dense_matrix(matrix, directory.as_ref(), &format!("{}{}", name, i))?;
    }
    Ok(())
}

/// Loads the list of dense matrices `<name>0..`.
///
/// # Panics
///
/// Panics if no matching artifact exists at all: an empty result would
/// silently mask an un-run offline stage.
pub fn load_dense_matrix_list(directory: impl AsRef<Path>, name: &str) -> Vec<DMatrix<f64>> {
    let directory = directory.as_ref();
    let count = count_indexed_artifacts(directory, name);
    if count == 0 {
        panic!(
            "no cached artifacts named {}* found in {}, rerun the offline stage",
            name,
            directory.display()
        );
    }
    info!("reading {} cached matrices {} from {}", count, name, directory.display());
    (0..count)
        .map(|i| load_dense_matrix(directory, &format!("{}{}", name, i)))
        .collect()
}

/// Saves a list of sparse matrices as `<name>0..<name>{len-1}`.
pub fn save_sparse_matrix_list(
    matrices: &[CsrMatrix<f64>],
    directory: impl AsRef<Path>,
    name: &str,
) -> eyre::Result<()> {
    for (i, matrix) in matrices.iter().enumerate() {
        save_sparse_matrix(matrix, directory.as_ref(), &format!("{}{}", name, i))?;
    }
    Ok(())
}

/// Loads the list of sparse matrices `<name>0..`.
///
/// # Panics
///
/// Panics if no matching artifact exists, as for [`load_dense_matrix_list`].
pub fn load_sparse_matrix_list(directory: impl AsRef<Path>, name: &str) -> Vec<CsrMatrix<f64>> {
    let directory = directory.as_ref();
    let count = count_indexed_artifacts(directory, name);
    if count == 0 {
        panic!(
            "no cached artifacts named {}* found in {}, rerun the offline stage",
            name,
            directory.display()
        );
    }
    info!("reading {} cached sparse matrices {} from {}", count, name, directory.display());
    (0..count)
        .map(|i| load_sparse_matrix(directory, &format!("{}{}", name, i)))
        .collect()
}

/// Saves a list of rank-3 tensors as `<name>0..<name>{len-1}`.
pub fn save_tensor_list(tensors: &[DenseTensor3], directory: impl AsRef<Path>, name: &str) -> eyre::Result<()> {
    for (i, tensor) in tensors.iter().enumerate() {
        save_tensor(tensor, directory.as_ref(), &format!("{}{}", name, i))?;
    }
    Ok(())
}

/// Loads the list of rank-3 tensors `<name>0..`.
///
/// # Panics
///
/// Panics if no matching artifact exists, as for [`load_dense_matrix_list`].
pub fn load_tensor_list(directory: impl AsRef<Path>, name: &str) -> Vec<DenseTensor3> {
    let directory = directory.as_ref();
    let count = count_indexed_artifacts(directory, name);
    if count == 0 {
        panic!(
            "no cached artifacts named {}* found in {}, rerun the offline stage",
            name,
            directory.display()
        );
    }
    info!("reading {} cached tensors {} from {}", count, name, directory.display());
    (0..count)
        .map(|i| load_tensor(directory, &format!("{}{}", name, i)))
        .collect()
}

/// Human-readable export formats for reduced operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Row-major nested JSON arrays, for interchange with array-based tools.
    Interchange,
    /// A MATLAB-style assignment `name = [ ... ; ... ];`.
    Matlab,
    /// A plain whitespace-separated table, one matrix row per line.
    Plain,
}

impl ExportFormat {
    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Interchange => "json",
            ExportFormat::Matlab => "m",
            ExportFormat::Plain => "txt",
        }
    }
}

/// Exports a matrix in the requested human-readable format to
/// `<directory>/<name>.<ext>`.
pub fn export_matrix(
    matrix: &DMatrix<f64>,
    directory: impl AsRef<Path>,
    name: &str,
    format: ExportFormat,
) -> eyre::Result<()> {
    let file_name = format!("{}.{}", name, format.extension());
    let mut w = create_writer(directory.as_ref(), &file_name)?;
    match format {
        ExportFormat::Interchange => {
            let rows: Vec<Vec<f64>> = (0..matrix.nrows())
                .map(|i| matrix.row(i).iter().copied().collect())
                .collect();
            serde_json::to_writer(&mut w, &rows).wrap_err_with(|| format!("failed to export {}", file_name))?;
        }
        ExportFormat::Matlab => {
            write!(w, "{} = [", name)?;
            for i in 0..matrix.nrows() {
                for j in 0..matrix.ncols() {
                    write!(w, " {:e}", matrix[(i, j)])?;
                }
                if i + 1 < matrix.nrows() {
                    write!(w, ";")?;
                }
            }
            writeln!(w, "];")?;
        }
        ExportFormat::Plain => {
            for i in 0..matrix.nrows() {
                let row = (0..matrix.ncols())
                    .map(|j| format!("{:e}", matrix[(i, j)]))
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(w, "{}", row)?;
            }
        }
    }
    w.flush()?;
    Ok(())
}

/// Exports a list of matrices (a second-order tensor sequence), one file
/// `<name>_<i>.<ext>` per entry.
pub fn export_matrix_list(
    matrices: &[DMatrix<f64>],
    directory: impl AsRef<Path>,
    name: &str,
    format: ExportFormat,
) -> eyre::Result<()> {
    for (i, matrix) in matrices.iter().enumerate() {
        export_matrix(matrix, directory.as_ref(), &format!("{}_{}", name, i), format)?;
    }
    Ok(())
}

/// Exports a rank-3 tensor as flattened per-slice files `<name>_<k>.<ext>`,
/// slicing along the first index.
pub fn export_tensor(
    tensor: &DenseTensor3,
    directory: impl AsRef<Path>,
    name: &str,
    format: ExportFormat,
) -> eyre::Result<()> {
    let [d0, _, _] = tensor.dims();
    for k in 0..d0 {
        export_matrix(&tensor.slice(k), directory.as_ref(), &format!("{}_{}", name, k), format)?;
    }
    Ok(())
}
