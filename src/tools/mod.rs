//! Narrow wrappers around the external programs the pipeline drives.
//!
//! `ExternalTool` is the only place a subprocess is spawned. The collaborator
//! traits (`Sketcher`, `TreeBuilder`, `GeneDetector`, `Placer`) describe what
//! the pipeline needs from each program in terms of file paths, so tests can
//! swap in deterministic fakes.

pub mod mash;
pub mod mashtree;
pub mod native;
pub mod placement;
pub mod rgi;

use std::{
    path::PathBuf,
    process::{Command, Stdio},
};

use log::{debug, error, info, trace};

use crate::errors::EtdError;

pub use mash::{Mash, Sketcher};
pub use mashtree::{Mashtree, TreeBuilder};
pub use native::NativeSketcher;
pub use placement::{PlacementOutputs, Placer, Pplacer};
pub use rgi::{GeneDetector, Rgi};

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait ExternalTool: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the tool to completion. A spawn failure is `MissingDependency`,
    /// a non-zero exit is `ExternalTool`.
    fn invoke(&self, args: &[String]) -> Result<ToolOutput, EtdError>;

    fn version(&self) -> Result<String, EtdError> {
        let output = self.invoke(&["--version".to_string()])?;
        let text = if output.stdout.trim().is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(text.trim().to_string())
    }
}

/// A binary on `PATH` (or at an explicit path).
#[derive(Debug, Clone)]
pub struct CommandTool {
    name: String,
    program: PathBuf,
}

impl CommandTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string_lossy().into_owned());
        CommandTool { name, program }
    }
}

impl ExternalTool for CommandTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, args: &[String]) -> Result<ToolOutput, EtdError> {
        trace!("Running {:?} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                debug!("Failed to start {:?}: {}", self.program, e);
                EtdError::MissingDependency(self.name.clone())
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(EtdError::ExternalTool {
                tool: self.name.clone(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(ToolOutput { stdout, stderr })
    }
}

/// Asks each tool for its version; every missing tool is logged before failing.
pub fn check_dependencies(tools: &[&dyn ExternalTool]) -> Result<(), EtdError> {
    let mut missing = Vec::new();
    for tool in tools {
        match tool.version() {
            Ok(version) => info!("Tool {} is installed: {}", tool.name(), version),
            // started but rejected --version (hmmalign does this)
            Err(EtdError::ExternalTool { .. }) => {
                info!("Tool {} is installed (version unknown)", tool.name())
            }
            Err(e) => {
                error!("Tool {} is not installed: {}", tool.name(), e);
                missing.push(tool.name().to_string());
            }
        }
    }
    if missing.is_empty() {
        debug!("All dependencies found");
        Ok(())
    } else {
        Err(EtdError::MissingDependency(missing.join(", ")))
    }
}

pub(crate) fn path_arg(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}
