use std::io::{self, Write};

use serde::Serialize;

use crate::app::{BuildList, BuildResult, MapResult, MergeRunResult, ProgressEvent, ProgressSink, StatusResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_build(result: &BuildResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_builds(result: &BuildList) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_merge(result: &MergeRunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_map(result: &MapResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(result: &StatusResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr for human output.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("[{:>6.1}s] {}", elapsed.as_secs_f64(), event.message),
            None => eprintln!("{}", event.message),
        }
    }
}
