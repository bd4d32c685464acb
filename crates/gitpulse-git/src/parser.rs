use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use crate::ParseError;

const RECORD_SEPARATOR: char = '\x1e';
const FIELD_SEPARATOR: char = '\x1f';

/// `git log` pretty format understood by [`CommitStream`]: one header line
/// per commit (hash, author name, author email, committer unix time).
pub const LOG_FORMAT: &str = "--format=%x1e%H%x1f%aN%x1f%aE%x1f%ct";

/// One commit as seen in a log query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub hash: String,
    pub author_name: String,
    /// Aggregation key, compared exactly as git printed it
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub additions: u64,
    pub deletions: u64,
}

/// Pulls [`CommitRecord`]s out of `git log` output one at a time.
///
/// Records come out in the order git printed them. A record is only complete
/// once the next header (or the end of the stream) is seen, so at most one
/// commit is held in memory. The stream cannot be rewound.
pub struct CommitStream<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
    pending: Option<CommitRecord>,
}

impl<R: AsyncBufRead + Unpin> CommitStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
            pending: None,
        }
    }

    pub async fn next_record(&mut self) -> Result<Option<CommitRecord>, ParseError> {
        loop {
            let Some(line) = self.next_line().await? else {
                return Ok(self.pending.take());
            };

            if let Some(header) = line.strip_prefix(RECORD_SEPARATOR) {
                let record = parse_header(header, self.line_no)?;
                if let Some(done) = self.pending.replace(record) {
                    return Ok(Some(done));
                }
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            match self.pending.as_mut() {
                Some(record) => apply_numstat(record, &line, self.line_no),
                None => {
                    return Err(ParseError::UnexpectedLine {
                        line: self.line_no,
                        content: line,
                    })
                }
            }
        }
    }

    async fn next_line(&mut self) -> Result<Option<String>, ParseError> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        self.line_no += 1;

        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

fn parse_header(header: &str, line: usize) -> Result<CommitRecord, ParseError> {
    let mut fields = header.splitn(4, FIELD_SEPARATOR);
    let (Some(hash), Some(name), Some(email), Some(time)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(ParseError::MalformedHeader {
            line,
            header: header.to_string(),
        });
    };

    if hash.is_empty() {
        return Err(ParseError::MalformedHeader {
            line,
            header: header.to_string(),
        });
    }

    let timestamp = time
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| ParseError::InvalidTimestamp {
            line,
            value: time.to_string(),
        })?;

    Ok(CommitRecord {
        hash: hash.to_string(),
        author_name: name.to_string(),
        author_email: email.to_string(),
        timestamp,
        additions: 0,
        deletions: 0,
    })
}

/// `added<TAB>deleted<TAB>path`; binary files print `-` for both counts
fn apply_numstat(record: &mut CommitRecord, line: &str, line_no: usize) {
    let mut fields = line.splitn(3, '\t');
    let counts = match (fields.next(), fields.next(), fields.next()) {
        (Some(added), Some(deleted), Some(_path)) => {
            parse_count(added).zip(parse_count(deleted))
        }
        _ => None,
    };

    match counts {
        Some((added, deleted)) => {
            record.additions += added;
            record.deletions += deleted;
        }
        None => warn!(
            line = line_no,
            commit = %record.hash,
            content = %line,
            "Skipping malformed numstat line"
        ),
    }
}

fn parse_count(field: &str) -> Option<u64> {
    match field {
        "-" => Some(0),
        n => n.parse().ok(),
    }
}
