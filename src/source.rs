use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::RowError;
use crate::models::RawRow;

/// Delimiter for `path`: explicit choice first, then `.tsv` means tab,
/// anything else comma.
pub fn delimiter_for(path: &Path, explicit: Option<char>) -> Result<u8> {
    match explicit {
        Some(c) if c.is_ascii() => Ok(c as u8),
        Some(c) => bail!("Delimiter must be a single ASCII character, got {:?}", c),
        None => {
            let is_tsv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"));
            Ok(if is_tsv { b'\t' } else { b',' })
        }
    }
}

/// Opens a delimited file. Failing to open it or to read its header row is
/// fatal for the batch; bad records later on are yielded as row errors.
pub fn read_rows(path: &Path, delimiter: u8) -> Result<RowSource<File>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    RowSource::from_reader(file, delimiter)
        .with_context(|| format!("Failed to read header of {}", path.display()))
}

pub struct RowSource<R: Read> {
    reader: csv::Reader<R>,
    headers: StringRecord,
    done: bool,
}

impl<R: Read> RowSource<R> {
    pub fn from_reader(rdr: R, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(rdr);
        let headers = reader.headers()?.clone();
        if headers.iter().all(|h| h.trim().is_empty()) {
            bail!("Input has no header row");
        }
        Ok(Self {
            reader,
            headers,
            done: false,
        })
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter()
    }
}

impl<R: Read> Iterator for RowSource<R> {
    type Item = Result<RawRow, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => {
                let line = record.position().map_or(0, |p| p.line());
                Some(Ok(RawRow::new(line, self.headers.iter().zip(record.iter()))))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(source) => {
                // The reader cannot resume after an I/O failure.
                if source.is_io_error() {
                    self.done = true;
                }
                let line = source.position().map_or(0, |p| p.line());
                Some(Err(RowError::Record { line, source }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn aliases(name: &str) -> Vec<String> {
        vec![name.to_string()]
    }

    #[test]
    fn test_delimiter_for() {
        assert_eq!(delimiter_for(Path::new("jobs.csv"), None).unwrap(), b',');
        assert_eq!(delimiter_for(Path::new("jobs.TSV"), None).unwrap(), b'\t');
        assert_eq!(delimiter_for(Path::new("jobs.csv"), Some(';')).unwrap(), b';');
        assert!(delimiter_for(Path::new("jobs.csv"), Some('·')).is_err());
    }

    #[test]
    fn test_reads_rows_with_line_numbers() {
        let data = "company_name,title,tech_stack\nAcme,Dev,\"Go, Rust\"\nBeta,Ops,NA\n";
        let rows: Vec<_> = RowSource::from_reader(data.as_bytes(), b',')
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].get(&aliases("tech_stack")), Some("Go, Rust"));
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].get(&aliases("tech_stack")), None);
    }

    #[test]
    fn test_short_records_leave_fields_absent() {
        let data = "company_name\ttitle\tsalary\nAcme\tDev\n";
        let rows: Vec<RawRow> = RowSource::from_reader(data.as_bytes(), b'\t')
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows[0].get(&aliases("title")), Some("Dev"));
        assert_eq!(rows[0].get(&aliases("salary")), None);
    }

    #[test]
    fn test_undecodable_record_is_a_row_error() {
        let data: &[u8] = b"company_name,title\nAcme,Dev\n\xff\xfe,Bad\nBeta,Ops\n";
        let rows: Vec<_> = RowSource::from_reader(data, b',').unwrap().collect();

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert!(matches!(rows[1], Err(RowError::Record { .. })));
        assert!(rows[2].is_ok());
    }

    #[test]
    fn test_read_rows_from_file() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "company_name,title").unwrap();
        writeln!(file, "Acme,Dev").unwrap();

        let source = read_rows(file.path(), b',').unwrap();
        assert_eq!(source.headers().collect::<Vec<_>>(), vec!["company_name", "title"]);
        assert_eq!(source.count(), 1);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        assert!(read_rows(Path::new("/nonexistent/jobs.csv"), b',').is_err());
    }

    #[test]
    fn test_empty_input_has_no_header() {
        assert!(RowSource::from_reader(&b""[..], b',').is_err());
    }
}
