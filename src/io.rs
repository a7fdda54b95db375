//! Readers for the `.fvecs` / `.ivecs` files used by ANN benchmark datasets.
//!
//! Each record is a little-endian `i32` length followed by that many 4-byte
//! little-endian values.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

use crate::matrix::FloatMatrix;

/// Read one record into `buffer`. Returns `false` at a clean end of input.
fn read_record<R: Read>(reader: &mut R, buffer: &mut Vec<[u8; 4]>) -> io::Result<bool> {
    let mut dim_buf = [0u8; 4];
    match reader.read_exact(&mut dim_buf) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(false),
        Err(err) => return Err(err),
    }
    let dim = i32::from_le_bytes(dim_buf);
    if dim < 0 {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("negative dimension {dim} encountered"),
        ));
    }

    buffer.clear();
    buffer.resize(dim as usize, [0u8; 4]);
    for value in buffer.iter_mut() {
        reader.read_exact(value)?;
    }
    Ok(true)
}

/// Read `.fvecs` records into a matrix. Every record must have the same length.
pub fn read_fvecs_from_reader<R: Read>(
    mut reader: R,
    limit: Option<usize>,
) -> io::Result<FloatMatrix> {
    let mut matrix: Option<FloatMatrix> = None;
    let mut record = Vec::new();

    while limit.map_or(true, |max| matrix.as_ref().map_or(0, FloatMatrix::rows) < max) {
        if !read_record(&mut reader, &mut record)? {
            break;
        }
        let row: Vec<f32> = record.iter().map(|bytes| f32::from_le_bytes(*bytes)).collect();
        matrix
            .get_or_insert_with(|| FloatMatrix::new(row.len()))
            .push_row(&row)
            .map_err(|err| io::Error::new(ErrorKind::InvalidData, err.to_string()))?;
    }

    Ok(matrix.unwrap_or_default())
}

/// Read `.ivecs` ground-truth rows as dataset ids. Rows may differ in length.
pub fn read_groundtruth_from_reader<R: Read>(
    mut reader: R,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<usize>>> {
    let mut rows = Vec::new();
    let mut record = Vec::new();

    while limit.map_or(true, |max| rows.len() < max) {
        if !read_record(&mut reader, &mut record)? {
            break;
        }
        let row_idx = rows.len();
        let row = record
            .iter()
            .map(|bytes| {
                let value = i32::from_le_bytes(*bytes);
                usize::try_from(value).map_err(|_| {
                    io::Error::new(
                        ErrorKind::InvalidData,
                        format!("ground truth entry {value} in row {row_idx} is negative"),
                    )
                })
            })
            .collect::<io::Result<Vec<usize>>>()?;
        rows.push(row);
    }

    Ok(rows)
}

pub fn read_fvecs<P: AsRef<Path>>(path: P, limit: Option<usize>) -> io::Result<FloatMatrix> {
    let file = File::open(path)?;
    read_fvecs_from_reader(BufReader::new(file), limit)
}

pub fn read_groundtruth<P: AsRef<Path>>(
    path: P,
    limit: Option<usize>,
) -> io::Result<Vec<Vec<usize>>> {
    let file = File::open(path)?;
    read_groundtruth_from_reader(BufReader::new(file), limit)
}
