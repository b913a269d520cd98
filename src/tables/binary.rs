//! Binary table format for position tables
//!
//! A full canonical year is more than half a million samples, so position
//! tables are stored in a compact little-endian format rather than JSON:
//!
//! ```text
//! magic "SKYPOS" | version u8 | sample count u64
//! body (u16 length + utf8) | latitude f64 | longitude f64 | elevation f64
//! timezone (u16 length + utf8) | canonical year i32
//! samples: month u8 | day u8 | hour u8 | minute u8 | altitude f64 | azimuth f64
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::{MinuteKey, PositionSample, PositionTable};
use crate::planetlib::{Body, Observer};
use crate::{AlmanacError, Result};

/// Magic bytes for identification of position table files
pub const MAGIC_BYTES: &[u8; 6] = b"SKYPOS";

/// Current version of the binary format
pub const FORMAT_VERSION: u8 = 1;

/// Size of a single sample entry in bytes
pub const fn sample_size_bytes() -> usize {
    // 4 x u8 + 2 x f64
    4 + 8 + 8
}

/// A fully written temporary file waiting to be renamed over its target
///
/// Dropping an uncommitted file removes it, leaving the target untouched.
#[derive(Debug)]
pub struct StagedFile {
    temp_path: PathBuf,
    path: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Path the file will occupy once committed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temporary file into place
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.temp_path, &self.path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Write `contents` to a temporary sibling of `path` without touching `path`
pub fn stage<P, F>(path: P, contents: F) -> Result<StagedFile>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let staged = StagedFile {
        temp_path: path.with_extension("tmp"),
        path: path.to_path_buf(),
        committed: false,
    };
    let mut writer = BufWriter::new(File::create(&staged.temp_path)?);
    contents(&mut writer)?;
    writer.flush()?;
    Ok(staged)
}

/// Write `contents` to a temporary sibling of `path`, then rename it into place
///
/// A failure part way through never leaves a truncated table at `path`.
pub fn write_atomically<P, F>(path: P, contents: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    stage(path, contents)?.commit()
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    let len = u16::try_from(bytes.len())
        .map_err(|_| AlmanacError::DataError(format!("String too long for table header: {}", value)))?;
    writer.write_u16::<LittleEndian>(len)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u16::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| AlmanacError::DataError(format!("Invalid utf8 in table header: {}", e)))
}

/// Write a position table to any writer
pub fn write_position_table<W: Write>(table: &PositionTable, writer: &mut W) -> Result<()> {
    writer.write_all(MAGIC_BYTES)?;
    writer.write_u8(FORMAT_VERSION)?;
    writer.write_u64::<LittleEndian>(table.len() as u64)?;

    let observer = table.observer();
    write_string(writer, table.body().name())?;
    writer.write_f64::<LittleEndian>(observer.latitude_deg)?;
    writer.write_f64::<LittleEndian>(observer.longitude_deg)?;
    writer.write_f64::<LittleEndian>(observer.elevation_m)?;
    write_string(writer, &observer.timezone)?;
    writer.write_i32::<LittleEndian>(table.canonical_year())?;

    for sample in table.samples() {
        writer.write_u8(sample.month)?;
        writer.write_u8(sample.day)?;
        writer.write_u8(sample.hour)?;
        writer.write_u8(sample.minute)?;
        writer.write_f64::<LittleEndian>(sample.altitude_deg)?;
        writer.write_f64::<LittleEndian>(sample.azimuth_deg)?;
    }
    Ok(())
}

fn read_sample<R: Read>(reader: &mut R) -> io::Result<PositionSample> {
    let month = reader.read_u8()?;
    let day = reader.read_u8()?;
    let hour = reader.read_u8()?;
    let minute = reader.read_u8()?;
    let altitude_deg = reader.read_f64::<LittleEndian>()?;
    let azimuth_deg = reader.read_f64::<LittleEndian>()?;
    Ok(PositionSample::new(
        MinuteKey::new(month, day, hour, minute),
        altitude_deg,
        azimuth_deg,
    ))
}

fn truncated(e: io::Error) -> AlmanacError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        AlmanacError::DataError("Truncated position table file".to_string())
    } else {
        AlmanacError::IoError(e)
    }
}

fn read_header<R: Read>(reader: &mut R) -> Result<(Body, Observer, i32)> {
    let body: Body = read_string(reader)?.parse()?;
    let latitude = reader.read_f64::<LittleEndian>()?;
    let longitude = reader.read_f64::<LittleEndian>()?;
    let elevation = reader.read_f64::<LittleEndian>()?;
    let timezone = read_string(reader)?;
    let year = reader.read_i32::<LittleEndian>()?;
    Ok((body, Observer::new(latitude, longitude, elevation, &timezone)?, year))
}

/// Read a position table from any reader
pub fn read_position_table<R: Read>(reader: &mut R) -> Result<PositionTable> {
    // Read and verify magic bytes
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic).map_err(truncated)?;
    if &magic != MAGIC_BYTES {
        return Err(AlmanacError::DataError(
            "Invalid position table format: incorrect magic bytes".to_string(),
        ));
    }

    let version = reader.read_u8().map_err(truncated)?;
    if version != FORMAT_VERSION {
        return Err(AlmanacError::DataError(format!(
            "Unsupported position table version: {}. Expected version {}",
            version, FORMAT_VERSION
        )));
    }

    let count = reader.read_u64::<LittleEndian>().map_err(truncated)?;

    let (body, observer, canonical_year) = read_header(reader).map_err(|e| match e {
        AlmanacError::IoError(io) => truncated(io),
        other => other,
    })?;

    // Cap the pre-allocation so a corrupt count cannot exhaust memory
    let mut samples = Vec::with_capacity((count as usize).min(1 << 20));
    for _ in 0..count {
        samples.push(read_sample(reader).map_err(truncated)?);
    }

    PositionTable::new(body, observer, canonical_year, samples)
}

/// Read a position table file
pub fn read_position_table_file<P: AsRef<Path>>(path: P) -> Result<PositionTable> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_position_table(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn small_table() -> PositionTable {
        let samples = vec![
            PositionSample::new(MinuteKey::new(3, 20, 6, 59), -0.4, 89.1),
            PositionSample::new(MinuteKey::new(3, 20, 7, 0), 0.1, 89.3),
            PositionSample::new(MinuteKey::new(3, 20, 7, 1), 0.3, 89.4),
        ];
        let observer = Observer::new(39.96, -83.0, 275.0, "America/New_York").unwrap();
        PositionTable::new(Body::Moon, observer, 2024, samples).unwrap()
    }

    fn encode(table: &PositionTable) -> Vec<u8> {
        let mut buffer = Vec::new();
        write_position_table(table, &mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_memory_roundtrip() {
        let table = small_table();
        let buffer = encode(&table);
        let header = MAGIC_BYTES.len() + 1 + 8 + (2 + 4) + 24 + (2 + 16) + 4;
        assert_eq!(buffer.len(), header + 3 * sample_size_bytes());

        let loaded = read_position_table(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.body(), Body::Moon);
    }

    #[test]
    fn test_invalid_magic_bytes() {
        let mut buffer = encode(&small_table());
        buffer[..6].copy_from_slice(b"BADPOS");
        let result = read_position_table(&mut Cursor::new(buffer));
        if let Err(AlmanacError::DataError(msg)) = result {
            assert!(msg.contains("incorrect magic bytes"));
        } else {
            panic!("Expected DataError with 'incorrect magic bytes' message");
        }
    }

    #[test]
    fn test_invalid_version() {
        let mut buffer = encode(&small_table());
        buffer[6] = FORMAT_VERSION + 1;
        let result = read_position_table(&mut Cursor::new(buffer));
        if let Err(AlmanacError::DataError(msg)) = result {
            assert!(msg.contains("Unsupported position table version"));
        } else {
            panic!("Expected DataError with version message");
        }
    }

    #[test]
    fn test_truncated_file() {
        let buffer = encode(&small_table());
        let cut = buffer[..buffer.len() - 5].to_vec();
        let result = read_position_table(&mut Cursor::new(cut));
        if let Err(AlmanacError::DataError(msg)) = result {
            assert!(msg.contains("Truncated"));
        } else {
            panic!("Expected DataError with truncated file message");
        }
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("positions.bin");
        let result = write_atomically(&path, |_| {
            Err(AlmanacError::DataError("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_staged_file_appears_only_on_commit() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("positions.bin");
        let table = small_table();

        let staged = stage(&path, |writer| write_position_table(&table, writer)).unwrap();
        assert_eq!(staged.path(), path.as_path());
        assert!(!path.exists());
        staged.commit().unwrap();
        assert_eq!(read_position_table_file(&path).unwrap(), table);
        assert!(!path.with_extension("tmp").exists());

        drop(stage(&path, |writer| write_position_table(&table, writer)).unwrap());
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(read_position_table_file(&path).unwrap(), table);
    }
}
