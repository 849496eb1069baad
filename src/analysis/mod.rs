//! Reader for packet-capture analysis results
//!
//! The capture analysis service answers with a stream of newline-delimited
//! JSON. Each line is either a per-packet result or `{"error": "..."}`.
//! Chunks may split lines anywhere, so the decoder keeps the trailing
//! partial line until the next chunk or the end of the stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Errors that can occur while reading an analysis stream
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination port of an analysed packet; `-` for portless protocols
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PacketPort {
    Number(u16),
    Text(String),
}

impl fmt::Display for PacketPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketPort::Number(n) => write!(f, "{}", n),
            PacketPort::Text(s) => f.write_str(s),
        }
    }
}

/// One analysed packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub id: u64,
    pub timestamp: String,
    pub source: String,
    pub destination: String,
    pub protocol: String,
    pub port: PacketPort,
    #[serde(default)]
    pub payload: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
}

impl PacketRecord {
    pub fn is_malicious(&self) -> bool {
        self.status == "Malicious"
    }
}

/// A decoded line of the stream
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AnalysisLine {
    Error { error: String },
    Packet(PacketRecord),
}

/// Incremental NDJSON line decoder
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every complete line it finished
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<AnalysisLine> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(Self::decode_line)
            .collect()
    }

    /// Decode whatever remains once the stream has ended
    pub fn finish(&mut self) -> Option<AnalysisLine> {
        let remaining = std::mem::take(&mut self.buffer);
        Self::decode_line(&remaining)
    }

    fn decode_line(line: &[u8]) -> Option<AnalysisLine> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match serde_json::from_str(text) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                log::warn!("Skipping malformed analysis line: {}", e);
                None
            }
        }
    }
}

/// Everything read from one analysis stream
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub packets: Vec<PacketRecord>,
    pub errors: Vec<String>,
}

impl AnalysisReport {
    fn push(&mut self, line: AnalysisLine) {
        match line {
            AnalysisLine::Packet(packet) => self.packets.push(packet),
            AnalysisLine::Error { error } => {
                log::error!("Analysis backend error: {}", error);
                self.errors.push(error);
            }
        }
    }

    pub fn malicious_count(&self) -> usize {
        self.packets.iter().filter(|p| p.is_malicious()).count()
    }
}

/// Read an analysis stream to its end
pub async fn read_analysis_stream<R>(mut reader: R) -> Result<AnalysisReport, AnalysisError>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = NdjsonDecoder::new();
    let mut report = AnalysisReport::default();
    let mut chunk = vec![0u8; 8 * 1024];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        log::debug!("Received analysis chunk of {} bytes", read);
        for line in decoder.feed(&chunk[..read]) {
            report.push(line);
        }
    }

    if let Some(line) = decoder.finish() {
        report.push(line);
    }

    log::info!(
        "Analysis stream complete: {} packet(s), {} error(s)",
        report.packets.len(),
        report.errors.len()
    );
    Ok(report)
}
