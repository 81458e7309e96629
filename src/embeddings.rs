//! Dense embedding matrices and the `.npy` artifact they are persisted as.
//!
//! # Binary Format
//!
//! ```text
//! magic:      [u8; 6] = b"\x93NUMPY"
//! version:    [u8; 2] = [1, 0]
//! header_len: u16 (little endian)
//! header:     ASCII dict, space padded, '\n' terminated, so that
//!             10 + header_len is a multiple of 64:
//!             {'descr': '<f4', 'fortran_order': False, 'shape': (N, D), }
//! body:       N * D little-endian f32, row major
//! ```

use crate::error::{BenchError, Result};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ALIGN: usize = 64;
/// magic + version + header_len
const PREAMBLE: usize = 6 + 2 + 2;

/// Row-major `rows x cols` f32 matrix, one row per document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from row vectors. All rows must share one width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(BenchError::Encoding {
                    phase: "assembly",
                    message: format!("row {i} has width {}, expected {cols}", row.len()),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Append `other` below `self`. An empty matrix adopts the other's width.
    pub fn vstack(&mut self, other: &Matrix) -> Result<()> {
        if other.rows == 0 {
            return Ok(());
        }
        if self.rows == 0 {
            self.cols = other.cols;
        } else if self.cols != other.cols {
            return Err(BenchError::Encoding {
                phase: "assembly",
                message: format!("cannot stack width {} onto width {}", other.cols, self.cols),
            });
        }
        self.data.extend_from_slice(&other.data);
        self.rows += other.rows;
        Ok(())
    }
}

fn npy_header(rows: usize, cols: usize) -> Vec<u8> {
    let dict = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({rows}, {cols}), }}");
    // +1 for the trailing newline.
    let unpadded = PREAMBLE + dict.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    let mut header = dict.into_bytes();
    header.extend(std::iter::repeat(b' ').take(padding));
    header.push(b'\n');
    header
}

/// Serialize `matrix` as a `.npy` v1.0 stream.
pub fn write_npy<W: Write>(writer: &mut W, matrix: &Matrix) -> io::Result<()> {
    let header = npy_header(matrix.rows, matrix.cols);
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(&header)?;
    for v in &matrix.data {
        writer.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Encode to an in-memory buffer; used to hash without touching disk.
pub fn to_npy_bytes(matrix: &Matrix) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PREAMBLE + ALIGN + matrix.data.len() * 4);
    // Writing into a Vec cannot fail.
    let _ = write_npy(&mut buf, matrix);
    buf
}

fn parse_shape(header: &str) -> Option<(usize, usize)> {
    let start = header.find("'shape': (")? + "'shape': (".len();
    let end = start + header[start..].find(')')?;
    let mut dims = header[start..end]
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| d.parse::<usize>());
    let rows = dims.next()?.ok()?;
    let cols = dims.next()?.ok()?;
    Some((rows, cols))
}

/// Read back a matrix written by [`write_npy`].
pub fn read_npy<R: Read>(reader: &mut R) -> io::Result<Matrix> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid magic bytes: expected {:?}, got {:?}", MAGIC, magic),
        ));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    if version != [1, 0] {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unsupported npy version: {}.{}", version[0], version[1]),
        ));
    }

    let mut buf2 = [0u8; 2];
    reader.read_exact(&mut buf2)?;
    let mut header = vec![0u8; u16::from_le_bytes(buf2) as usize];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);
    if !header.contains("'descr': '<f4'") || header.contains("'fortran_order': True") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unsupported npy layout: {}", header.trim_end()),
        ));
    }
    let (rows, cols) = parse_shape(&header).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "npy header has no 2-d shape")
    })?;

    let mut data = Vec::with_capacity(rows * cols);
    let mut buf4 = [0u8; 4];
    for _ in 0..rows * cols {
        reader.read_exact(&mut buf4)?;
        data.push(f32::from_le_bytes(buf4));
    }
    Ok(Matrix { rows, cols, data })
}

pub fn load_npy<P: AsRef<Path>>(path: P) -> io::Result<Matrix> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    read_npy(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn m(rows: &[&[f32]]) -> Matrix {
        Matrix::from_rows(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_header_is_aligned() {
        for (r, c) in [(0, 0), (3, 384), (100_000, 1024)] {
            let bytes = to_npy_bytes(&Matrix {
                rows: r,
                cols: c,
                data: Vec::new(),
            });
            let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
            assert_eq!((PREAMBLE + header_len) % ALIGN, 0);
            assert_eq!(bytes[PREAMBLE + header_len - 1], b'\n');
        }
    }

    #[test]
    fn test_write_and_read() {
        let matrix = m(&[&[1.0, -2.5, 0.0], &[4.0, 5.0, 6.25]]);
        let dir = tempdir().unwrap();
        let path = dir.path().join("e.npy");
        std::fs::write(&path, to_npy_bytes(&matrix)).unwrap();

        let loaded = load_npy(&path).unwrap();
        assert_eq!(loaded, matrix);
    }

    #[test]
    fn test_empty_matrix_has_zero_shape() {
        let bytes = to_npy_bytes(&Matrix::empty());
        let header = String::from_utf8_lossy(&bytes[PREAMBLE..]);
        assert!(header.contains("'shape': (0, 0)"));
        assert_eq!(read_npy(&mut bytes.as_slice()).unwrap(), Matrix::empty());
    }

    #[test]
    fn test_vstack_preserves_order() {
        let mut a = Matrix::empty();
        a.vstack(&m(&[&[1.0, 1.0]])).unwrap();
        a.vstack(&m(&[&[2.0, 2.0], &[3.0, 3.0]])).unwrap();
        a.vstack(&Matrix::empty()).unwrap();
        assert_eq!(a.rows(), 3);
        assert_eq!(a.row(2), &[3.0, 3.0]);

        assert!(a.vstack(&m(&[&[1.0]])).is_err());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn test_bad_magic() {
        let err = read_npy(&mut &b"NOTNPY...."[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
