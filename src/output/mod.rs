use crate::models::TrafficEvent;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Output handler for simulated traffic events
pub struct OutputHandler {
    format: OutputFormat,
    writer: Option<Box<dyn Write + Send>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonl" => OutputFormat::Jsonl,
            "console" => OutputFormat::Console,
            _ => OutputFormat::Console, // Default
        }
    }
}

impl OutputHandler {
    /// Create a new output handler. Without a file path events go to stdout.
    pub fn new(format: OutputFormat, file_path: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let writer: Option<Box<dyn Write + Send>> = match file_path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Some(Box::new(BufWriter::new(file)))
            }
            None => None,
        };

        Ok(OutputHandler { format, writer })
    }

    /// Create a handler writing into an arbitrary sink
    pub fn with_writer(format: OutputFormat, writer: Box<dyn Write + Send>) -> Self {
        OutputHandler {
            format,
            writer: Some(writer),
        }
    }

    /// Write a traffic event
    pub fn write_event(&mut self, event: &TrafficEvent) -> Result<(), Box<dyn std::error::Error>> {
        let output = Self::render(&self.format, event)?;
        self.write_output(&output)
    }

    fn render(format: &OutputFormat, event: &TrafficEvent) -> Result<String, serde_json::Error> {
        Ok(match format {
            OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(event)?),
            OutputFormat::Jsonl => format!("{}\n", serde_json::to_string(event)?),
            OutputFormat::Console => format!(
                "{}[{}] {} -> {} {}/{} {}\n",
                if event.alert { "ALERT " } else { "" },
                event.timestamp,
                event.source_ip,
                event.destination_ip,
                event.protocol,
                event.port,
                event.status
            ),
        })
    }

    fn write_output(&mut self, data: &str) -> Result<(), Box<dyn std::error::Error>> {
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(data.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", data);
                io::stdout().flush()?;
            }
        }
        Ok(())
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}
