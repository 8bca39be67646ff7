use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use super::{ExternalTool, path_arg};
use crate::errors::EtdError;

/// Builds a genome tree from a set of genome or sketch files.
pub trait TreeBuilder: Send + Sync {
    fn build_tree(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EtdError>;

    fn dependencies(&self) -> Vec<&dyn ExternalTool> {
        Vec::new()
    }
}

pub struct Mashtree {
    tool: Box<dyn ExternalTool>,
    threads: usize,
}

impl Mashtree {
    pub fn new(tool: Box<dyn ExternalTool>, threads: usize) -> Self {
        Mashtree { tool, threads }
    }

    fn args(&self, manifest: &Path, output: &Path) -> Vec<String> {
        vec![
            "--numcpus".to_string(),
            self.threads.to_string(),
            "--file-of-files".to_string(),
            path_arg(manifest),
            "--outtree".to_string(),
            path_arg(output),
        ]
    }
}

impl TreeBuilder for Mashtree {
    fn build_tree(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EtdError> {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tree".to_string());
        let manifest = output
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{}_genome_list.txt", stem));
        {
            let mut fh = fs::File::create(&manifest)?;
            for input in inputs {
                writeln!(fh, "{}", input.display())?;
            }
        }

        let result = self.tool.invoke(&self.args(&manifest, output));
        fs::remove_file(&manifest)?;
        result.map(|_| ())
    }

    fn dependencies(&self) -> Vec<&dyn ExternalTool> {
        vec![self.tool.as_ref()]
    }
}
