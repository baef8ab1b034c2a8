//! Batch file extraction
//!
//! Batch files are line oriented:
//!
//! ```text
//! H|Customer_Name|Customer_Id|Open_Date|...|Is_Active
//! D|Alex|123457|20101012|...|A
//! D|John|123458|20101012|...|A
//! ```
//!
//! `H|` introduces the header, `D|` a data row. Every other line is
//! ignored. The fields after the prefix are pipe separated.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info};

use crate::models::{RawBatch, RawRow};

const HEADER_PREFIX: &str = "H|";
const DATA_PREFIX: &str = "D|";

/// Errors raised while reading a batch file
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid UTF-8
    #[error("Failed to decode {path} at line {line}: {source}")]
    InvalidUtf8 {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::str::Utf8Error,
    },

    /// No `H|` line in the file
    #[error("No header found in file")]
    MissingHeader,

    /// More than one `H|` line in the file
    #[error("Line {line}: duplicate header (first header on line {first})")]
    DuplicateHeader { line: usize, first: usize },

    /// A data row does not have the header's field count
    #[error("Line {line}: row has {found} fields, header has {expected}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// Result type for extraction
pub type ExtractResult<T> = Result<T, ExtractError>;

/// A parsed batch file together with its content fingerprint.
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub path: PathBuf,
    /// SHA256 of the file content, hex encoded
    pub sha256: String,
    pub batch: RawBatch,
}

/// Read and tokenize a batch file.
pub fn extract_file(path: &Path) -> ExtractResult<ExtractedFile> {
    info!("Extracting data from {}", path.display());

    let content = fs::read(path).map_err(|source| {
        error!("Failed to load data from {}: {}", path.display(), source);
        ExtractError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let text = decode(path, &content).inspect_err(|e| {
        error!("Failed to load data from {}: {}", path.display(), e);
    })?;
    let batch = parse_str(text).inspect_err(|e| {
        error!("Failed to load data from {}: {}", path.display(), e);
    })?;

    info!("Number of records extracted: {}", batch.len());

    Ok(ExtractedFile {
        path: path.to_path_buf(),
        sha256: compute_hash(&content),
        batch,
    })
}

/// Tokenize batch file content.
///
/// The header may appear anywhere in the file; data rows are checked
/// against it once the whole file has been read.
pub fn parse_str(content: &str) -> ExtractResult<RawBatch> {
    let mut header: Option<(usize, Vec<String>)> = None;
    let mut rows = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim_end_matches('\r');

        if let Some(rest) = line.strip_prefix(HEADER_PREFIX) {
            if let Some((first, _)) = header {
                return Err(ExtractError::DuplicateHeader {
                    line: line_no,
                    first,
                });
            }
            header = Some((line_no, split_fields(rest)));
        } else if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            rows.push(RawRow {
                line: line_no,
                fields: split_fields(rest),
            });
        }
    }

    let (_, header) = header.ok_or(ExtractError::MissingHeader)?;

    if let Some(row) = rows.iter().find(|r| r.fields.len() != header.len()) {
        return Err(ExtractError::FieldCount {
            line: row.line,
            expected: header.len(),
            found: row.fields.len(),
        });
    }

    Ok(RawBatch { header, rows })
}

fn decode<'a>(path: &Path, content: &'a [u8]) -> ExtractResult<&'a str> {
    std::str::from_utf8(content).map_err(|source| {
        let valid = &content[..source.valid_up_to()];
        ExtractError::InvalidUtf8 {
            path: path.to_path_buf(),
            line: valid.iter().filter(|&&b| b == b'\n').count() + 1,
            source,
        }
    })
}

fn split_fields(rest: &str) -> Vec<String> {
    rest.split('|').map(|f| f.to_string()).collect()
}

/// Compute SHA256 hash of content
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
H|Customer_Name|Customer_Id|Open_Date|Last_Consulted_Date|Vaccination_Id|Dr_Name|State|Country|DOB|Is_Active
D|Alex|123457|20101012|20121013|MVD|Paul|SA|USA|06031987|A
D|John|123458|20101012|20121013|MVD|Paul|TN|IND|06031987|A
T|2
";

    #[test]
    fn test_parse_counts_rows_and_keeps_header_order() {
        let batch = parse_str(SAMPLE).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.header[0], "Customer_Name");
        assert_eq!(batch.header[7], "Country");
        assert_eq!(batch.header.len(), 10);
        assert_eq!(batch.rows[0].line, 2);
        assert_eq!(batch.rows[1].fields[1], "123458");
    }

    #[test]
    fn test_missing_header() {
        let err = parse_str("D|a|b\nD|c|d\n").unwrap_err();
        assert!(matches!(err, ExtractError::MissingHeader));

        let err = parse_str("").unwrap_err();
        assert!(matches!(err, ExtractError::MissingHeader));
    }

    #[test]
    fn test_header_only_is_empty_batch() {
        let batch = parse_str("H|a|b\n").unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.header, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_header() {
        let err = parse_str("H|a|b\nD|1|2\nH|a|b\n").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::DuplicateHeader { line: 3, first: 1 }
        ));
    }

    #[test]
    fn test_field_count_mismatch() {
        let err = parse_str("H|a|b\nD|1|2\nD|1\n").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::FieldCount {
                line: 3,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_crlf_and_other_prefixes() {
        let batch = parse_str("# comment\r\nH|a|b\r\nX|ignored\r\nD|1|2\r\n").unwrap();
        assert_eq!(batch.header, vec!["a", "b"]);
        assert_eq!(batch.rows[0].fields, vec!["1", "2"]);
    }

    #[test]
    fn test_data_before_header() {
        let batch = parse_str("D|1|2\nH|a|b\n").unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.rows[0].line, 1);
    }

    #[test]
    fn test_extract_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let extracted = extract_file(file.path()).unwrap();
        assert_eq!(extracted.batch.len(), 2);
        assert_eq!(extracted.sha256, compute_hash(SAMPLE.as_bytes()));
        assert_eq!(extracted.sha256.len(), 64);
    }

    #[test]
    fn test_extract_missing_file() {
        let err = extract_file(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }

    #[test]
    fn test_extract_rejects_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"H|Name|Country\nD|Alex|USA\nD|John|US\xFFA\n")
            .unwrap();

        let err = extract_file(file.path()).unwrap_err();
        match err {
            ExtractError::InvalidUtf8 { path, line, .. } => {
                assert_eq!(path, file.path());
                assert_eq!(line, 3);
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
