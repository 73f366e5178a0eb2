//! Static analysis of a complete event stream.

use crate::analyzer::Analyzer;
use crate::snapshot::{BuildSnapshot, SnapshotError};
use buildlens_core::AnalyzerConfig;
use buildlens_log::binary::MAX_FRAME_BYTES;
use buildlens_log::{DecodeError, DecodedEvent, EventDecoder, WireFormat};
use std::io::BufRead;
use std::path::Path;

/// Analysis errors; stream and completeness failures keep what was built
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyzeError {
    /// Input could not be opened
    #[error("Cannot open {path}: {message}")]
    Open {
        /// Input path
        path: String,
        /// I/O error text
        message: String,
    },

    /// Decoding stopped before the stream ended
    #[error("Event stream unreadable: {source}")]
    Stream {
        /// Decoder failure
        source: DecodeError,
        /// State accumulated before the failure
        partial: Box<BuildSnapshot>,
    },

    /// Stream ended without its boundary records
    #[error("{source}")]
    Incomplete {
        /// Which records are missing
        source: SnapshotError,
        /// State accumulated from the stream
        partial: Box<BuildSnapshot>,
    },
}

impl AnalyzeError {
    /// Partial snapshot, when one was built
    #[must_use]
    pub fn partial(&self) -> Option<&BuildSnapshot> {
        match self {
            Self::Open { .. } => None,
            Self::Stream { partial, .. } | Self::Incomplete { partial, .. } => Some(partial),
        }
    }
}

/// Result type for analysis
pub type AnalyzeResult<T> = Result<T, AnalyzeError>;

/// Drives an [`Analyzer`] over a decoded stream
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    config: AnalyzerConfig,
    format: Option<WireFormat>,
    max_frame_bytes: u64,
}

impl AnalysisEngine {
    /// Create a new engine
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            format: None,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }

    /// Force a wire format instead of detecting it
    #[must_use]
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the binary frame size limit
    #[must_use]
    pub fn with_max_frame_bytes(mut self, limit: u64) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    /// Analyze a file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened, decoding fails, or the
    /// stream is incomplete
    pub fn analyze_path(&self, path: &Path) -> AnalyzeResult<BuildSnapshot> {
        let decoder = EventDecoder::open(path, self.format).map_err(|e| AnalyzeError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), format = %decoder.format(), "Analyzing event stream");
        self.run(decoder.with_max_frame_bytes(self.max_frame_bytes))
    }

    /// Analyze any buffered reader, sniffing the format unless one was set
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails or the stream is incomplete
    pub fn analyze_reader<R: BufRead>(&self, mut reader: R) -> AnalyzeResult<BuildSnapshot> {
        let format = match self.format {
            Some(format) => format,
            None => WireFormat::sniff(&mut reader).map_err(|e| AnalyzeError::Open {
                path: "<reader>".to_string(),
                message: e.to_string(),
            })?,
        };
        let decoder =
            EventDecoder::new(reader, format).with_max_frame_bytes(self.max_frame_bytes);
        self.run(decoder)
    }

    /// Analyze an already-decoded sequence
    ///
    /// # Errors
    ///
    /// Returns error on the first fatal decode error or if the sequence is
    /// incomplete
    pub fn analyze_events<I>(&self, events: I) -> AnalyzeResult<BuildSnapshot>
    where
        I: IntoIterator<Item = Result<DecodedEvent, DecodeError>>,
    {
        let mut analyzer = Analyzer::new(self.config.clone());
        self.accumulate(&mut analyzer, events)?;
        finish(analyzer)
    }

    fn run<R: BufRead>(&self, mut decoder: EventDecoder<R>) -> AnalyzeResult<BuildSnapshot> {
        let mut analyzer = Analyzer::new(self.config.clone());
        self.accumulate(&mut analyzer, decoder.by_ref())?;

        if decoder.skipped() > 0 {
            analyzer.warn(format!("Skipped {} malformed records", decoder.skipped()));
        }
        tracing::debug!(
            records = decoder.records(),
            skipped = decoder.skipped(),
            bytes = decoder.offset(),
            "Event stream consumed"
        );
        finish(analyzer)
    }

    fn accumulate<I>(&self, analyzer: &mut Analyzer, events: I) -> AnalyzeResult<()>
    where
        I: IntoIterator<Item = Result<DecodedEvent, DecodeError>>,
    {
        for item in events {
            match item {
                Ok(decoded) => {
                    analyzer.apply(&decoded.event);
                    if decoded.event.last_message {
                        tracing::debug!(offset = decoded.offset, "Reached last message");
                        break;
                    }
                    if decoded.event.is_terminus() {
                        tracing::debug!(offset = decoded.offset, "Build finished, reading trailing records");
                    }
                }
                Err(source) if source.is_fatal() => {
                    return Err(AnalyzeError::Stream {
                        source,
                        partial: Box::new(analyzer.snapshot()),
                    });
                }
                Err(e) => analyzer.warn(e.to_string()),
            }
        }
        Ok(())
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

fn finish(analyzer: Analyzer) -> AnalyzeResult<BuildSnapshot> {
    let snapshot = analyzer.snapshot();
    if snapshot.events_applied == 0 {
        tracing::warn!("Event stream contained no events");
    }
    match snapshot.ensure_complete() {
        Ok(()) => Ok(snapshot),
        Err(source) => Err(AnalyzeError::Incomplete {
            source,
            partial: Box::new(snapshot),
        }),
    }
}
