//! Binary container shared by the interchange and projection files.
//!
//! ```text
//! magic     8 bytes   "VPROJ\0\0\x01"
//! kind      u32 LE    1 = interchange, 2 = projection
//! hdr_len   u64 LE
//! header    hdr_len bytes of MessagePack
//! numeric   u8        0 = real, 1 = complex (re, im interleaved)
//! rank      u8        always 3
//! dims      3 × u64 LE
//! payload   row-major f64 LE
//! ```
//!
//! Writers stream rows into a temporary file next to the target and rename it
//! into place on [`ContainerWriter::finish`]; a writer that is dropped early
//! leaves nothing behind.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rustfft::num_complex::Complex64;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{Result, VprojError};
use crate::mmap_utils::{f64_le_values, mmap_file};
use crate::types::NumericKind;

pub const MAGIC: &[u8; 8] = b"VPROJ\0\0\x01";
const RANK: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Interchange,
    Projection,
}

impl ContainerKind {
    fn tag(&self) -> u32 {
        match self {
            ContainerKind::Interchange => 1,
            ContainerKind::Projection => 2,
        }
    }

    fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(ContainerKind::Interchange),
            2 => Ok(ContainerKind::Projection),
            other => Err(VprojError::Format(format!("Unknown container kind {}", other))),
        }
    }
}

/// Decoded payload values, row-major over `dims`
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadData {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub dims: [usize; 3],
    pub data: PayloadData,
}

impl Payload {
    pub fn kind(&self) -> NumericKind {
        match self.data {
            PayloadData::Real(_) => NumericKind::Real,
            PayloadData::Complex(_) => NumericKind::Complex,
        }
    }

    /// Number of elements in one outer row
    pub fn row_len(&self) -> usize {
        self.dims[1] * self.dims[2]
    }

    pub fn real_row(&self, row: usize) -> Option<&[f64]> {
        match &self.data {
            PayloadData::Real(values) => values.get(row * self.row_len()..(row + 1) * self.row_len()),
            PayloadData::Complex(_) => None,
        }
    }

    pub fn complex_row(&self, row: usize) -> Option<&[Complex64]> {
        match &self.data {
            PayloadData::Complex(values) => {
                values.get(row * self.row_len()..(row + 1) * self.row_len())
            }
            PayloadData::Real(_) => None,
        }
    }
}

/// Streams the rows of one container to disk
pub struct ContainerWriter {
    out: BufWriter<NamedTempFile>,
    target: PathBuf,
    kind: NumericKind,
    dims: [usize; 3],
    rows_written: usize,
}

impl ContainerWriter {
    pub fn create<H: Serialize>(
        path: &Path,
        container: ContainerKind,
        header: &H,
        kind: NumericKind,
        dims: [usize; 3],
    ) -> Result<Self> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)?;
        let mut out = BufWriter::new(tmp);

        let header_bytes = rmp_serde::to_vec_named(header)?;
        out.write_all(MAGIC)?;
        out.write_all(&container.tag().to_le_bytes())?;
        out.write_all(&(header_bytes.len() as u64).to_le_bytes())?;
        out.write_all(&header_bytes)?;
        out.write_all(&[kind.tag(), RANK])?;
        for dim in dims {
            out.write_all(&(dim as u64).to_le_bytes())?;
        }

        Ok(Self {
            out,
            target: path.to_path_buf(),
            kind,
            dims,
            rows_written: 0,
        })
    }

    fn start_row(&mut self, kind: NumericKind, len: usize) -> Result<()> {
        if kind != self.kind {
            return Err(VprojError::InvalidParameter(format!(
                "Container holds {:?} values, got a {:?} row",
                self.kind, kind
            )));
        }
        if self.rows_written >= self.dims[0] {
            return Err(VprojError::InvalidParameter(format!(
                "Container declares {} rows",
                self.dims[0]
            )));
        }
        if len != self.dims[1] * self.dims[2] {
            return Err(VprojError::InvalidParameter(format!(
                "Row has {} values, expected {} × {}",
                len, self.dims[1], self.dims[2]
            )));
        }
        Ok(())
    }

    /// Append the next outer row of a real container.
    pub fn write_real_row(&mut self, row: &[f64]) -> Result<()> {
        self.start_row(NumericKind::Real, row.len())?;
        for value in row {
            self.out.write_all(&value.to_le_bytes())?;
        }
        self.rows_written += 1;
        Ok(())
    }

    /// Append the next outer row of a complex container.
    pub fn write_complex_row(&mut self, row: &[Complex64]) -> Result<()> {
        self.start_row(NumericKind::Complex, row.len())?;
        for value in row {
            self.out.write_all(&value.re.to_le_bytes())?;
            self.out.write_all(&value.im.to_le_bytes())?;
        }
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flush and move the file to its target path.
    pub fn finish(self) -> Result<PathBuf> {
        if self.rows_written != self.dims[0] {
            return Err(VprojError::InvalidParameter(format!(
                "Wrote {} of {} rows",
                self.rows_written, self.dims[0]
            )));
        }
        let tmp = self.out.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.target).map_err(|e| VprojError::Io(e.error))?;
        Ok(self.target)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| VprojError::Format("Container is truncated".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

/// Read a whole container, checking it is of the expected kind.
pub fn read_container<H: DeserializeOwned>(
    path: &Path,
    expected: ContainerKind,
) -> Result<(H, Payload)> {
    let map = mmap_file(path)?;
    let mut cursor = Cursor {
        bytes: &map,
        pos: 0,
    };

    if cursor.take(MAGIC.len())? != MAGIC {
        return Err(VprojError::Format(format!(
            "{} is not a vproj container",
            path.display()
        )));
    }
    let container = ContainerKind::from_tag(cursor.u32()?)?;
    if container != expected {
        return Err(VprojError::Format(format!(
            "{} is a {:?} file, expected {:?}",
            path.display(),
            container,
            expected
        )));
    }

    let header_len = usize::try_from(cursor.u64()?)
        .map_err(|_| VprojError::Format("Header length overflows".to_string()))?;
    let header: H = rmp_serde::from_slice(cursor.take(header_len)?)?;

    let kind = NumericKind::from_tag(cursor.u8()?)?;
    let rank = cursor.u8()?;
    if rank != RANK {
        return Err(VprojError::Format(format!("Expected rank {}, found {}", RANK, rank)));
    }
    let mut dims = [0usize; 3];
    for dim in dims.iter_mut() {
        *dim = usize::try_from(cursor.u64()?)
            .map_err(|_| VprojError::Format("Dimension overflows".to_string()))?;
    }

    let expected_bytes = dims
        .iter()
        .try_fold(kind.width() * 8, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| VprojError::Format("Payload size overflows".to_string()))?;
    let remaining = map.len() - cursor.pos;
    if remaining != expected_bytes {
        return Err(VprojError::Format(format!(
            "Payload holds {} bytes, dims {:?} need {}",
            remaining, dims, expected_bytes
        )));
    }

    let mut values = f64_le_values(&map[cursor.pos..]);
    let data = match kind {
        NumericKind::Real => PayloadData::Real(values.collect()),
        NumericKind::Complex => {
            let mut out = Vec::with_capacity(expected_bytes / 16);
            while let (Some(re), Some(im)) = (values.next(), values.next()) {
                out.push(Complex64::new(re, im));
            }
            PayloadData::Complex(out)
        }
    };

    Ok((header, Payload { dims, data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Meta {
        name: String,
        rate: f64,
    }

    fn meta() -> Meta {
        Meta {
            name: "run".to_string(),
            rate: 1.0 / 3.0,
        }
    }

    #[test]
    fn test_real_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut writer =
            ContainerWriter::create(&path, ContainerKind::Projection, &meta(), NumericKind::Real, [2, 1, 3])
                .unwrap();
        writer.write_real_row(&[1.0, 2.0, 3.0]).unwrap();
        writer.write_real_row(&[4.0, 5.0, 6.0]).unwrap();
        writer.finish().unwrap();

        let (header, payload): (Meta, Payload) =
            read_container(&path, ContainerKind::Projection).unwrap();
        assert_eq!(header, meta());
        assert_eq!(payload.dims, [2, 1, 3]);
        assert_eq!(payload.real_row(1).unwrap(), &[4.0, 5.0, 6.0]);
        assert!(payload.complex_row(0).is_none());
    }

    #[test]
    fn test_complex_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.bin");
        let row = [Complex64::new(1.0, -1.0), Complex64::new(0.5, 2.0)];

        let mut writer =
            ContainerWriter::create(&path, ContainerKind::Interchange, &meta(), NumericKind::Complex, [1, 2, 1])
                .unwrap();
        assert!(writer.write_real_row(&[0.0, 0.0]).is_err());
        writer.write_complex_row(&row).unwrap();
        writer.finish().unwrap();

        let (_, payload): (Meta, Payload) =
            read_container(&path, ContainerKind::Interchange).unwrap();
        assert_eq!(payload.kind(), NumericKind::Complex);
        assert_eq!(payload.complex_row(0).unwrap(), &row);
    }

    #[test]
    fn test_unfinished_writer_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.bin");
        {
            let mut writer = ContainerWriter::create(
                &path,
                ContainerKind::Interchange,
                &meta(),
                NumericKind::Real,
                [2, 1, 1],
            )
            .unwrap();
            writer.write_real_row(&[1.0]).unwrap();
            assert!(writer.finish().is_err());
        }
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_row_count_and_shape_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        let mut writer =
            ContainerWriter::create(&path, ContainerKind::Interchange, &meta(), NumericKind::Real, [1, 2, 2])
                .unwrap();
        assert!(writer.write_real_row(&[1.0, 2.0, 3.0]).is_err());
        writer.write_real_row(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(writer.write_real_row(&[1.0, 2.0, 3.0, 4.0]).is_err());
        assert_eq!(writer.rows_written(), 1);
    }

    #[test]
    fn test_truncated_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bin");
        let mut writer =
            ContainerWriter::create(&path, ContainerKind::Interchange, &meta(), NumericKind::Real, [1, 1, 4])
                .unwrap();
        writer.write_real_row(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();
        let result = read_container::<Meta>(&path, ContainerKind::Interchange);
        assert!(matches!(result, Err(VprojError::Format(_))));

        std::fs::write(&path, &bytes[..10]).unwrap();
        let result = read_container::<Meta>(&path, ContainerKind::Interchange);
        assert!(matches!(result, Err(VprojError::Format(_))));
    }

    #[test]
    fn test_wrong_kind_and_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.bin");
        let writer =
            ContainerWriter::create(&path, ContainerKind::Interchange, &meta(), NumericKind::Real, [0, 3, 5])
                .unwrap();
        writer.finish().unwrap();

        assert!(read_container::<Meta>(&path, ContainerKind::Interchange).is_ok());
        assert!(matches!(
            read_container::<Meta>(&path, ContainerKind::Projection),
            Err(VprojError::Format(_))
        ));

        std::fs::write(&path, b"NOTVPROJ and some trailing bytes").unwrap();
        assert!(matches!(
            read_container::<Meta>(&path, ContainerKind::Interchange),
            Err(VprojError::Format(_))
        ));
    }
}
