//! File I/O for the pipeline's tables and JSON documents.
//!
//! Every write is a full-file replace through a temp file in the destination
//! directory, so readers see either the old or the new file and never a
//! partial one.

use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use csv::{Reader, Writer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::models::{EnrichedEvent, WatchEvent};

/// Read the raw row table (`video_name,video_link,channel_name,channel_link,watch_time`).
pub fn read_watch_events(path: &Path) -> Result<Vec<WatchEvent>> {
    read_csv(path)
}

/// Read the enriched row table.
pub fn read_enriched_events(path: &Path) -> Result<Vec<EnrichedEvent>> {
    read_csv(path)
}

/// Read the enriched row table, treating a missing file as empty.
pub fn read_enriched_events_if_exists(path: &Path) -> Result<Vec<EnrichedEvent>> {
    if path.exists() {
        read_enriched_events(path)
    } else {
        Ok(Vec::new())
    }
}

/// Replace the enriched row table with `rows`, in the given order.
pub fn write_enriched_events(path: &Path, rows: &[EnrichedEvent]) -> Result<()> {
    write_csv(path, rows)
}

/// Replace the raw row table with `rows`.
pub fn write_watch_events(path: &Path, rows: &[WatchEvent]) -> Result<()> {
    write_csv(path, rows)
}

/// Count data rows of a CSV table without deserializing them; 0 if absent.
pub fn count_rows(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let mut reader = Reader::from_path(path)?;
    let mut count = 0;
    for record in reader.byte_records() {
        record?;
        count += 1;
    }
    Ok(count)
}

/// Read a JSON document, or `None` if the file does not exist.
pub fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    Ok(Some(serde_json::from_reader(BufReader::new(file))?))
}

/// Replace a JSON document with the pretty-printed `value`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    persist_atomic(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, value)?;
        writer.write_all(b"\n")?;
        Ok(())
    })
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    persist_atomic(path, |writer| {
        let mut csv_writer = Writer::from_writer(writer);
        for row in rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    })
}

fn persist_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}
