use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{FactoryConfig, TokenizerConfig, PARSE_ERROR_TRUNCATE};
use crate::error::PipelineResult;
use crate::events::{EventFactory, EventRef};
use crate::tokenizer::{LineTokenizer, TokenizerStats};

const READ_BUFFER_BYTES: usize = 1024 * 1024;

/// A line the tokenizer could not make sense of.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ParseError {
    pub line_number: u64,
    /// Start of the offending line
    pub line: String,
    pub reason: String,
}

impl ParseError {
    fn new(line_number: u64, line: &str, reason: &str) -> Self {
        ParseError {
            line_number,
            line: line.chars().take(PARSE_ERROR_TRUNCATE).collect(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq)]
pub struct ParserStats {
    pub lines_read: u64,
    pub bytes_read: u64,
    pub events_created: u64,
    pub parse_errors: u64,
}

/// Reads a combat log line by line into shared events.
///
/// Invalid UTF-8 is replaced rather than rejected, and bad lines are
/// recorded in [`CombatLogParser::errors`] without stopping the pass.
pub struct CombatLogParser {
    tokenizer: LineTokenizer,
    factory: EventFactory,
    errors: Vec<ParseError>,
    stats: ParserStats,
}

impl CombatLogParser {
    pub fn new(tokenizer: TokenizerConfig, factory: FactoryConfig) -> Self {
        Self::starting_at(tokenizer, factory, 0)
    }

    /// Parser for a slice of a file whose first line is `line_offset + 1`.
    pub fn starting_at(tokenizer: TokenizerConfig, factory: FactoryConfig, line_offset: u64) -> Self {
        CombatLogParser {
            tokenizer: LineTokenizer::starting_at(tokenizer, line_offset),
            factory: EventFactory::new(factory),
            errors: Vec::new(),
            stats: ParserStats::default(),
        }
    }

    pub fn parse_line(&mut self, raw_line: &str) -> Option<EventRef> {
        self.stats.lines_read += 1;
        let parsed = self.tokenizer.parse(raw_line);
        let Some(line) = parsed else {
            if !raw_line.trim().is_empty() {
                let line_number = self.tokenizer.line_count();
                debug!("Skipping unparseable line {}", line_number);
                self.errors.push(ParseError::new(
                    line_number,
                    raw_line.trim(),
                    "missing timestamp or event type",
                ));
                self.stats.parse_errors += 1;
            }
            return None;
        };

        self.stats.events_created += 1;
        Some(Arc::new(self.factory.create(&line)))
    }

    /// Stream every event of `reader` into `sink`. Only I/O failures abort.
    pub fn for_each_event<R, F>(&mut self, mut reader: R, mut sink: F) -> PipelineResult<()>
    where
        R: BufRead,
        F: FnMut(EventRef),
    {
        let mut buf = Vec::with_capacity(4096);
        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf)?;
            if read == 0 {
                break;
            }
            self.stats.bytes_read += read as u64;
            let line = String::from_utf8_lossy(&buf);
            if let Some(event) = self.parse_line(&line) {
                sink(event);
            }
        }
        Ok(())
    }

    pub fn parse_reader<R: BufRead>(&mut self, reader: R) -> PipelineResult<Vec<EventRef>> {
        let mut events = Vec::new();
        self.for_each_event(reader, |event| events.push(event))?;
        Ok(events)
    }

    pub fn parse_file(&mut self, path: &Path) -> PipelineResult<Vec<EventRef>> {
        info!("Parsing combat log {}", path.display());
        let file = File::open(path)?;
        let events = self.parse_reader(BufReader::with_capacity(READ_BUFFER_BYTES, file))?;
        info!(
            "Parsed {}: {} events, {} errors",
            path.display(),
            events.len(),
            self.errors.len()
        );
        Ok(events)
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<ParseError> {
        std::mem::take(&mut self.errors)
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    pub fn tokenizer_stats(&self) -> TokenizerStats {
        self.tokenizer.stats()
    }
}

impl Default for CombatLogParser {
    fn default() -> Self {
        Self::new(TokenizerConfig::default(), FactoryConfig::default())
    }
}

/// Open `path` with the buffer size used for whole-file passes.
pub fn open_log(path: &Path) -> PipelineResult<BufReader<File>> {
    Ok(BufReader::with_capacity(READ_BUFFER_BYTES, File::open(path)?))
}
