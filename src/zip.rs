//! Minimal STORE-only ZIP writer (§4.8): streaming, append-only, no
//! compression. An owned writer handle replaces the C ABI's handle table —
//! `Drop` aborts (discards, does not finalise) a writer that was never
//! explicitly closed.

use crate::crc32::crc32;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4B50;
const CENTRAL_DIR_SIG: u32 = 0x0201_4B50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4B50;
const VERSION: u16 = 20;
const MAX_ENTRIES: usize = 0xFFFF;

struct EntryRecord {
    name: String,
    crc32: u32,
    size: u32,
    local_header_offset: u32,
}

/// A STORE-only ZIP archive being written to `W`.
pub struct ZipWriter<W: Write + Seek> {
    sink: Option<W>,
    entries: Vec<EntryRecord>,
}

impl ZipWriter<BufWriter<File>> {
    /// Create (or truncate) a ZIP file on disk.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(ZipWriter::new(BufWriter::new(file)))
    }
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(sink: W) -> Self {
        ZipWriter {
            sink: Some(sink),
            entries: Vec::new(),
        }
    }

    /// Append one stored (uncompressed) entry.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if name.len() > u16::MAX as usize {
            return Err(Error::capacity("zip entry name exceeds 65535 bytes"));
        }
        if data.len() > u32::MAX as usize {
            return Err(Error::capacity("zip entry data exceeds 2^32-1 bytes"));
        }
        if self.entries.len() >= MAX_ENTRIES {
            return Err(Error::capacity("zip archive exceeds 65535 entries"));
        }

        let sink = self.sink.as_mut().expect("writer used after close/abort");
        let offset = sink.stream_position()? as u32;
        let crc = crc32(data);
        let size = data.len() as u32;

        write_local_file_header(sink, name, crc, size)?;
        sink.write_all(data)?;

        self.entries.push(EntryRecord {
            name: name.to_string(),
            crc32: crc,
            size,
            local_header_offset: offset,
        });
        Ok(())
    }

    /// Finalise the archive: write the central directory and EOCD record.
    pub fn close(mut self) -> Result<W> {
        let mut sink = self.sink.take().expect("writer used after close/abort");
        let cd_start = sink.stream_position()? as u32;

        for entry in &self.entries {
            write_central_dir_entry(&mut sink, entry)?;
        }

        let cd_end = sink.stream_position()? as u32;
        write_end_of_central_dir(&mut sink, self.entries.len() as u16, cd_end - cd_start, cd_start)?;
        sink.flush()?;
        Ok(sink)
    }

    /// Discard the writer without finalising the archive.
    pub fn abort(mut self) {
        self.sink.take();
    }
}

impl<W: Write + Seek> Drop for ZipWriter<W> {
    fn drop(&mut self) {
        if self.sink.is_some() {
            log::debug!("ZipWriter dropped without close()/abort(); archive left unfinalised");
        }
    }
}

fn write_local_file_header(sink: &mut impl Write, name: &str, crc: u32, size: u32) -> Result<()> {
    sink.write_all(&LOCAL_FILE_HEADER_SIG.to_le_bytes())?;
    sink.write_all(&VERSION.to_le_bytes())?;
    sink.write_all(&0u16.to_le_bytes())?; // flags
    sink.write_all(&0u16.to_le_bytes())?; // method: store
    sink.write_all(&0u16.to_le_bytes())?; // mod time
    sink.write_all(&0u16.to_le_bytes())?; // mod date
    sink.write_all(&crc.to_le_bytes())?;
    sink.write_all(&size.to_le_bytes())?; // compressed size
    sink.write_all(&size.to_le_bytes())?; // uncompressed size
    sink.write_all(&(name.len() as u16).to_le_bytes())?;
    sink.write_all(&0u16.to_le_bytes())?; // extra length
    sink.write_all(name.as_bytes())?;
    Ok(())
}

fn write_central_dir_entry(sink: &mut impl Write, entry: &EntryRecord) -> Result<()> {
    sink.write_all(&CENTRAL_DIR_SIG.to_le_bytes())?;
    sink.write_all(&VERSION.to_le_bytes())?; // version made by
    sink.write_all(&VERSION.to_le_bytes())?; // version needed
    sink.write_all(&0u16.to_le_bytes())?; // flags
    sink.write_all(&0u16.to_le_bytes())?; // method: store
    sink.write_all(&0u16.to_le_bytes())?; // mod time
    sink.write_all(&0u16.to_le_bytes())?; // mod date
    sink.write_all(&entry.crc32.to_le_bytes())?;
    sink.write_all(&entry.size.to_le_bytes())?; // compressed size
    sink.write_all(&entry.size.to_le_bytes())?; // uncompressed size
    sink.write_all(&(entry.name.len() as u16).to_le_bytes())?;
    sink.write_all(&0u16.to_le_bytes())?; // extra length
    sink.write_all(&0u16.to_le_bytes())?; // comment length
    sink.write_all(&0u16.to_le_bytes())?; // disk number start
    sink.write_all(&0u16.to_le_bytes())?; // internal attrs
    sink.write_all(&0u32.to_le_bytes())?; // external attrs
    sink.write_all(&entry.local_header_offset.to_le_bytes())?;
    sink.write_all(entry.name.as_bytes())?;
    Ok(())
}

fn write_end_of_central_dir(sink: &mut impl Write, entry_count: u16, cd_size: u32, cd_offset: u32) -> Result<()> {
    sink.write_all(&END_OF_CENTRAL_DIR_SIG.to_le_bytes())?;
    sink.write_all(&0u16.to_le_bytes())?; // disk number
    sink.write_all(&0u16.to_le_bytes())?; // start disk number
    sink.write_all(&entry_count.to_le_bytes())?;
    sink.write_all(&entry_count.to_le_bytes())?;
    sink.write_all(&cd_size.to_le_bytes())?;
    sink.write_all(&cd_offset.to_le_bytes())?;
    sink.write_all(&0u16.to_le_bytes())?; // comment length
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_through_the_zip_crate() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.add_file("a.txt", b"hello world").unwrap();
        writer.add_file("dir/b.bin", &[1, 2, 3, 4, 5]).unwrap();
        let cursor = writer.close().unwrap();

        let mut archive = zip::ZipArchive::new(cursor).unwrap();
        assert_eq!(archive.len(), 2);

        let mut a = archive.by_name("a.txt").unwrap();
        let mut contents = Vec::new();
        std::io::Read::read_to_end(&mut a, &mut contents).unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[test]
    fn empty_archive_closes_cleanly() {
        let writer: ZipWriter<Cursor<Vec<u8>>> = ZipWriter::new(Cursor::new(Vec::new()));
        let cursor = writer.close().unwrap();
        let archive = zip::ZipArchive::new(cursor).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn abort_leaves_the_sink_untouched_by_the_central_directory() {
        let writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.abort();
    }

    #[test]
    fn rejects_name_over_u16_max() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let long_name = "x".repeat(70_000);
        assert!(writer.add_file(&long_name, b"data").is_err());
    }
}
