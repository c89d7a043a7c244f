//! Encoding-aware log file reading
//!
//! Service logs arrive in whatever encoding the producing process used.
//! Reading sniffs the encoding from a leading sample and decodes the whole
//! file, normalizing undecodable bytes, so the parser always sees valid
//! UTF-8. Aggregation re-reads selected files on every regeneration; there
//! is no incremental offset state to carry.

use anyhow::{Context, Result};
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes sampled from the head of a file for encoding detection
const DETECTION_SAMPLE_SIZE: usize = 8192;

/// Read a log file to a string, auto-detecting its encoding.
pub fn read_log_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read log file {}", path.display()))?;

    let encoding = detect_encoding(&bytes);
    let (decoded, _, had_errors) = encoding.decode(&bytes);
    let mut content = decoded.into_owned();

    if had_errors {
        content = content.replace('\u{FFFD}', "?");
    }

    Ok(content)
}

/// Detect the encoding of a file without reading all of it.
#[allow(dead_code)]
pub fn detect_file_encoding(path: &Path) -> Result<&'static Encoding> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open {} for encoding detection", path.display()))?;
    let mut buffer = [0u8; DETECTION_SAMPLE_SIZE];
    let bytes_read = file.read(&mut buffer)?;

    if bytes_read == 0 {
        return Ok(encoding_rs::UTF_8);
    }

    Ok(detect_encoding(&buffer[..bytes_read]))
}

fn detect_encoding(sample: &[u8]) -> &'static Encoding {
    if sample.is_empty() {
        return encoding_rs::UTF_8;
    }
    let head = &sample[..sample.len().min(DETECTION_SAMPLE_SIZE)];
    let mut detector = EncodingDetector::new();
    detector.feed(head, true);
    detector.guess(None, true)
}
