use std::path::{Path, PathBuf};

use log::info;

use super::{ExternalTool, path_arg};
use crate::errors::EtdError;

/// Calls AMR genes on an assembled genome.
pub trait GeneDetector: Send + Sync {
    /// Runs detection and returns the path of the tab-delimited gene-call
    /// table. Fails with `DetectorOutputMissing` if the tool produced none.
    fn detect(&self, genome: &Path, output_prefix: &Path) -> Result<PathBuf, EtdError>;

    fn dependencies(&self) -> Vec<&dyn ExternalTool> {
        Vec::new()
    }
}

/// The table a detector run with `output_prefix` is expected to write.
pub fn detector_table_path(output_prefix: &Path) -> PathBuf {
    let mut name = output_prefix.as_os_str().to_owned();
    name.push(".txt");
    PathBuf::from(name)
}

pub struct Rgi {
    tool: Box<dyn ExternalTool>,
    threads: usize,
}

impl Rgi {
    pub fn new(tool: Box<dyn ExternalTool>, threads: usize) -> Self {
        Rgi { tool, threads }
    }

    fn card_version(&self) -> Result<String, EtdError> {
        let output = self
            .tool
            .invoke(&["database".to_string(), "--version".to_string()])?;
        Ok(output.stdout.trim().to_string())
    }
}

impl GeneDetector for Rgi {
    fn detect(&self, genome: &Path, output_prefix: &Path) -> Result<PathBuf, EtdError> {
        let rgi_version = self
            .tool
            .invoke(&["main".to_string(), "--version".to_string()])?
            .stdout
            .trim()
            .to_string();
        info!(
            "Running RGI (v{}) with CARD (v{}) using {} threads",
            rgi_version,
            self.card_version()?,
            self.threads
        );

        self.tool.invoke(&[
            "main".to_string(),
            "--input_sequence".to_string(),
            path_arg(genome),
            "--output_file".to_string(),
            path_arg(output_prefix),
            "--alignment_tool".to_string(),
            "DIAMOND".to_string(),
            "--num_threads".to_string(),
            self.threads.to_string(),
            "--clean".to_string(),
        ])?;

        let table = detector_table_path(output_prefix);
        if !table.exists() {
            return Err(EtdError::DetectorOutputMissing(table));
        }
        Ok(table)
    }

    fn dependencies(&self) -> Vec<&dyn ExternalTool> {
        vec![self.tool.as_ref()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;

    struct Silent;

    impl ExternalTool for Silent {
        fn name(&self) -> &str {
            "rgi"
        }

        fn invoke(&self, _args: &[String]) -> Result<ToolOutput, EtdError> {
            Ok(ToolOutput::default())
        }
    }

    #[test]
    fn table_path_appends_txt() {
        assert_eq!(
            detector_table_path(Path::new("out/rgi/run1")),
            PathBuf::from("out/rgi/run1.txt")
        );
    }

    #[test]
    fn missing_table_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let rgi = Rgi::new(Box::new(Silent), 1);
        let err = rgi
            .detect(Path::new("g.fa"), &dir.path().join("run"))
            .unwrap_err();
        assert!(matches!(err, EtdError::DetectorOutputMissing(_)));
    }
}
