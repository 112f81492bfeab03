//! Record sinks: full-sequence overwrite exports to CSV or JSON.
//!
//! Every write replaces the previous file atomically (temp file + rename),
//! so persisting the same sequence twice leaves identical output.

use std::path::{Path, PathBuf};

use crate::config::{ExportFormat, OutputSettings};
use crate::types::{HarvestError, HarvestResult, Record, COLUMNS};

/// Destination for the accumulated record sequence.
pub trait RecordSink: Send + Sync {
    /// Overwrite the destination with `records`.
    fn persist(&self, records: &[Record]) -> HarvestResult<()>;

    /// Human-readable destination, for logs and progress events.
    fn describe(&self) -> String;
}

/// CSV sink with the fixed column order of [`COLUMNS`].
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `records` as CSV to any writer.
    pub fn write_to<W: std::io::Write>(records: &[Record], writer: W) -> HarvestResult<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv_writer.write_record(COLUMNS)?;
        for record in records {
            csv_writer.serialize(record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl RecordSink for CsvSink {
    fn persist(&self, records: &[Record]) -> HarvestResult<()> {
        write_atomically(&self.path, |file| Self::write_to(records, file))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// JSON sink writing a pretty-printed array.
#[derive(Debug, Clone)]
pub struct JsonSink {
    path: PathBuf,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSink for JsonSink {
    fn persist(&self, records: &[Record]) -> HarvestResult<()> {
        write_atomically(&self.path, |mut file| {
            serde_json::to_writer_pretty(&mut file, records)?;
            std::io::Write::flush(&mut file)?;
            Ok(())
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Build the sink for `output`, writing `<dir>/<stem>.<ext>`.
pub fn sink_for(output: &OutputSettings, stem: &str) -> Box<dyn RecordSink> {
    let path = output
        .dir
        .join(format!("{stem}.{}", output.format.extension()));
    match output.format {
        ExportFormat::Csv => Box::new(CsvSink::new(path)),
        ExportFormat::Json => Box::new(JsonSink::new(path)),
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn persist(&self, records: &[Record]) -> HarvestResult<()> {
        (**self).persist(records)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

fn write_atomically<F>(path: &Path, write: F) -> HarvestResult<()>
where
    F: FnOnce(std::fs::File) -> HarvestResult<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = std::fs::File::create(&tmp)?;
    if let Err(e) = write(file) {
        let _ = std::fs::remove_file(&tmp);
        return Err(HarvestError::Persist(format!(
            "writing {} failed: {e}",
            path.display()
        )));
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SENTINEL;
    use chrono::{TimeZone, Utc};

    fn record(name: &str, rating: Option<f32>) -> Record {
        Record {
            name: name.to_string(),
            category: "Cafe".to_string(),
            address: "1 Main St, Springfield".to_string(),
            phone: SENTINEL.to_string(),
            url: format!("https://maps/place/{name}"),
            rating,
            review_count: Some(1234),
            derived_location: "Springfield".to_string(),
            captured_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_csv_header_and_column_order() {
        let mut buf = Vec::new();
        CsvSink::write_to(&[record("joes", Some(4.5)), record("moes", None)], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "name,category,address,phone,url,rating,review_count,derived_location,captured_at"
        );
        assert_eq!(
            lines[1],
            "joes,Cafe,\"1 Main St, Springfield\",N/A,https://maps/place/joes,4.5,1234,Springfield,2026-01-02T03:04:05Z"
        );
        assert!(lines[2].starts_with("moes,Cafe,"));
        assert!(lines[2].contains("https://maps/place/moes,,1234"));
    }

    #[test]
    fn test_empty_sequence_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"));
        sink.persist(&[]).unwrap();
        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_persist_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("nested").join("out.csv"));
        sink.persist(&[record("a", None), record("b", None)]).unwrap();
        sink.persist(&[record("c", None)]).unwrap();
        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\nc,"));
        assert!(!dir.path().join("nested").join("out.csv.tmp").exists());
    }

    #[test]
    fn test_json_sink() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputSettings {
            dir: dir.path().to_path_buf(),
            format: ExportFormat::Json,
        };
        let sink = sink_for(&output, "coffee");
        sink.persist(&[record("joes", Some(4.5))]).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("coffee.json")).unwrap();
        let parsed: Vec<Record> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "joes");
        assert!(sink.describe().ends_with("coffee.json"));
    }
}
