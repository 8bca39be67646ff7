use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::debug;

use super::{ExternalTool, path_arg};
use crate::{db_types::SketchParams, errors::EtdError};

/// Produces, combines and compares genome sketches.
pub trait Sketcher: Send + Sync {
    fn params(&self) -> SketchParams;

    /// Sketches `genome` into the file `output`.
    fn sketch(&self, genome: &Path, output: &Path) -> Result<(), EtdError>;

    /// Pastes `sketches`, in order, into the single file `output`.
    fn paste(&self, sketches: &[PathBuf], output: &Path) -> Result<(), EtdError>;

    /// Distance table between `query` (a sketch or genome file) and every
    /// sketch in `reference`, in `mash dist -t` layout.
    fn distance(&self, reference: &Path, query: &Path) -> Result<String, EtdError>;

    /// The binaries this backend needs installed.
    fn dependencies(&self) -> Vec<&dyn ExternalTool> {
        Vec::new()
    }
}

pub struct Mash {
    tool: Box<dyn ExternalTool>,
    params: SketchParams,
    threads: usize,
}

impl Mash {
    pub fn new(tool: Box<dyn ExternalTool>, params: SketchParams, threads: usize) -> Self {
        Mash {
            tool,
            params,
            threads,
        }
    }

    fn sketch_args(&self, genome: &Path, output: &Path) -> Vec<String> {
        vec![
            "sketch".to_string(),
            "-k".to_string(),
            self.params.kmer_size.to_string(),
            "-s".to_string(),
            self.params.sketch_size.to_string(),
            "-o".to_string(),
            path_arg(output),
            path_arg(genome),
        ]
    }
}

impl Sketcher for Mash {
    fn params(&self) -> SketchParams {
        self.params
    }

    fn sketch(&self, genome: &Path, output: &Path) -> Result<(), EtdError> {
        self.tool.invoke(&self.sketch_args(genome, output))?;
        Ok(())
    }

    fn paste(&self, sketches: &[PathBuf], output: &Path) -> Result<(), EtdError> {
        let list_dir = output.parent().unwrap_or_else(|| Path::new("."));
        let list_file = list_dir.join("mash_list.txt");
        {
            let mut fh = fs::File::create(&list_file)?;
            for sketch in sketches {
                writeln!(fh, "{}", sketch.display())?;
            }
        }
        debug!("Wrote paste manifest {:?} ({} sketches)", list_file, sketches.len());

        let result = self.tool.invoke(&[
            "paste".to_string(),
            path_arg(output),
            "-l".to_string(),
            path_arg(&list_file),
        ]);
        fs::remove_file(&list_file)?;
        result.map(|_| ())
    }

    fn distance(&self, reference: &Path, query: &Path) -> Result<String, EtdError> {
        let output = self.tool.invoke(&[
            "dist".to_string(),
            "-t".to_string(),
            "-p".to_string(),
            self.threads.to_string(),
            path_arg(reference),
            path_arg(query),
        ])?;
        Ok(output.stdout)
    }

    fn dependencies(&self) -> Vec<&dyn ExternalTool> {
        vec![self.tool.as_ref()]
    }
}
