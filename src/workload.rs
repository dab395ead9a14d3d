//! Workload scripts
//!
//! A workload is a line-oriented list of file operations replayed against a
//! powered-on store. Blank lines and lines starting with `#` are ignored.
//!
//! ```text
//! open notes
//! write notes hello, cartridge
//! fill notes 0x2a 4096
//! seek notes 0
//! read notes 16
//! close notes
//! ```

use crate::error::{CartError, Result};
use crate::file_table::FileHandle;
use crate::frame_cache::CacheStats;
use crate::io::DeviceTransport;
use crate::store::FrameStore;
use serde::Serialize;
use tracing::{debug, error};

/// One workload operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(String),
    Close(String),
    Write(String, Vec<u8>),
    Fill { name: String, byte: u8, count: usize },
    Read { name: String, len: usize },
    Seek { name: String, offset: u64 },
}

/// Parsed workload, keeping source line numbers
#[derive(Debug, Clone, Default)]
pub struct Workload {
    commands: Vec<(usize, Command)>,
}

/// Outcome of one `read` command
#[derive(Debug, Clone, Serialize)]
pub struct ReadRecord {
    pub line: usize,
    pub name: String,
    pub requested: usize,
    pub bytes: usize,
    pub text: String,
}

/// Outcome of a replay
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub operations: usize,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub reads: Vec<ReadRecord>,
    pub cache: CacheStats,
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(index) => (&text[..index], text[index..].trim_start()),
        None => (text, ""),
    }
}

fn parse_number<N: std::str::FromStr>(line: usize, field: &str, text: &str) -> Result<N> {
    text.parse().map_err(|_| CartError::Workload {
        line,
        message: format!("invalid {}: {:?}", field, text),
    })
}

fn parse_byte(line: usize, text: &str) -> Result<u8> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).map_err(|_| CartError::Workload {
            line,
            message: format!("invalid byte: {:?}", text),
        }),
        None => parse_number(line, "byte", text),
    }
}

impl Command {
    fn parse(line: usize, text: &str) -> Result<Self> {
        let (verb, rest) = split_word(text);
        let (name, args) = split_word(rest);
        if name.is_empty() {
            return Err(CartError::Workload {
                line,
                message: format!("{} needs a file name", verb),
            });
        }
        let name = name.to_string();

        let command = match verb.to_ascii_lowercase().as_str() {
            "open" => Command::Open(name),
            "close" => Command::Close(name),
            "write" => Command::Write(name, args.as_bytes().to_vec()),
            "fill" => {
                let (byte, count) = split_word(args);
                Command::Fill {
                    name,
                    byte: parse_byte(line, byte)?,
                    count: parse_number(line, "count", count.trim())?,
                }
            }
            "read" => Command::Read {
                name,
                len: parse_number(line, "length", args.trim())?,
            },
            "seek" => Command::Seek {
                name,
                offset: parse_number(line, "offset", args.trim())?,
            },
            other => {
                return Err(CartError::Workload {
                    line,
                    message: format!("unknown command {:?}", other),
                })
            }
        };
        Ok(command)
    }
}

fn open_handle<T>(store: &FrameStore<T>, line: usize, name: &str) -> Result<FileHandle>
where
    T: DeviceTransport,
{
    store.lookup(name).ok_or_else(|| CartError::Workload {
        line,
        message: format!("file {:?} is not open", name),
    })
}

impl Workload {
    pub fn parse(source: &str) -> Result<Self> {
        let mut commands = Vec::new();
        for (index, raw) in source.lines().enumerate() {
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let line = index + 1;
            commands.push((line, Command::parse(line, text)?));
        }
        Ok(Workload { commands })
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().map(|(_, command)| command)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Replay every command against a powered-on store
    pub fn run<T: DeviceTransport>(&self, store: &mut FrameStore<T>) -> Result<Report> {
        let mut report = Report {
            operations: 0,
            bytes_written: 0,
            bytes_read: 0,
            reads: Vec::new(),
            cache: store.cache_stats(),
        };

        for (line, command) in &self.commands {
            debug!(line, ?command, "replaying");
            if let Err(err) = Self::apply(*line, command, store, &mut report) {
                error!(line, "workload command failed: {}", err);
                return Err(err);
            }
            report.operations += 1;
        }

        report.cache = store.cache_stats();
        Ok(report)
    }

    fn apply<T: DeviceTransport>(
        line: usize,
        command: &Command,
        store: &mut FrameStore<T>,
        report: &mut Report,
    ) -> Result<()> {
        match command {
            Command::Open(name) => {
                store.open(name)?;
            }
            Command::Close(name) => {
                let fh = open_handle(store, line, name)?;
                store.close(fh)?;
            }
            Command::Write(name, data) => {
                let fh = open_handle(store, line, name)?;
                report.bytes_written += store.write(fh, data)? as u64;
            }
            Command::Fill { name, byte, count } => {
                let fh = open_handle(store, line, name)?;
                report.bytes_written += store.write(fh, &vec![*byte; *count])? as u64;
            }
            Command::Read { name, len } => {
                let fh = open_handle(store, line, name)?;
                let data = store.read_to_vec(fh, *len)?;
                report.bytes_read += data.len() as u64;
                report.reads.push(ReadRecord {
                    line,
                    name: name.clone(),
                    requested: *len,
                    bytes: data.len(),
                    text: String::from_utf8_lossy(&data).into_owned(),
                });
            }
            Command::Seek { name, offset } => {
                let fh = open_handle(store, line, name)?;
                store.seek(fh, *offset)?;
            }
        }
        Ok(())
    }
}
