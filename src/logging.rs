//! Logger setup: every record goes to stderr and, when a run has a log file,
//! to that file as well.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use log::LevelFilter;

/// Maps the `-v` count to a level filter.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Installs the global logger. A second call is a no-op.
pub fn init_logging(verbose: u8, log_file: Option<&Path>) -> io::Result<()> {
    let file = match log_file {
        Some(path) => Some(OpenOptions::new().create(true).append(true).open(path)?),
        None => None,
    };

    let _ = env_logger::Builder::new()
        .filter_level(level_for_verbosity(verbose))
        .format_timestamp_secs()
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .try_init();
    Ok(())
}
