use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use super::{ExternalTool, path_arg};
use crate::errors::EtdError;

pub const REF_ALIGNMENT: &str = "ref_alignment.sto";
pub const REF_HMM: &str = "ref_alignment.hmm";

/// Files written by one placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementOutputs {
    pub alignment: PathBuf,
    pub placement: PathBuf,
    pub tree: PathBuf,
}

impl PlacementOutputs {
    pub fn in_dir(dir: &Path) -> Self {
        PlacementOutputs {
            alignment: dir.join("combined_aln.sto"),
            placement: dir.join("placement.jplace"),
            tree: dir.join("placed.tree"),
        }
    }
}

/// Places a candidate sequence on a reference phylogeny package.
pub trait Placer: Send + Sync {
    fn place(
        &self,
        package: &Path,
        candidate: &Path,
        output_dir: &Path,
    ) -> Result<PlacementOutputs, EtdError>;

    fn dependencies(&self) -> Vec<&dyn ExternalTool> {
        Vec::new()
    }
}

/// hmmalign, then pplacer, then `guppy tog`.
pub struct Pplacer {
    hmmalign: Box<dyn ExternalTool>,
    pplacer: Box<dyn ExternalTool>,
    guppy: Box<dyn ExternalTool>,
    threads: usize,
}

impl Pplacer {
    pub fn new(
        hmmalign: Box<dyn ExternalTool>,
        pplacer: Box<dyn ExternalTool>,
        guppy: Box<dyn ExternalTool>,
        threads: usize,
    ) -> Self {
        Pplacer {
            hmmalign,
            pplacer,
            guppy,
            threads,
        }
    }
}

impl Placer for Pplacer {
    fn place(
        &self,
        package: &Path,
        candidate: &Path,
        output_dir: &Path,
    ) -> Result<PlacementOutputs, EtdError> {
        let ref_alignment = package.join(REF_ALIGNMENT);
        let ref_hmm = package.join(REF_HMM);
        for required in [&ref_alignment, &ref_hmm] {
            if !required.exists() {
                return Err(EtdError::MissingInput(required.clone()));
            }
        }
        let outputs = PlacementOutputs::in_dir(output_dir);

        info!("Aligning candidate to reference hmm {:?}", ref_hmm);
        self.hmmalign.invoke(&[
            "-o".to_string(),
            path_arg(&outputs.alignment),
            "--mapali".to_string(),
            path_arg(&ref_alignment),
            path_arg(&ref_hmm),
            path_arg(candidate),
        ])?;

        info!("Running pplacer with {} threads", self.threads);
        self.pplacer.invoke(&[
            "-j".to_string(),
            self.threads.to_string(),
            "-c".to_string(),
            path_arg(package),
            "-o".to_string(),
            path_arg(&outputs.placement),
            path_arg(&outputs.alignment),
        ])?;

        self.guppy.invoke(&[
            "tog".to_string(),
            "-o".to_string(),
            path_arg(&outputs.tree),
            path_arg(&outputs.placement),
        ])?;
        Ok(outputs)
    }

    fn dependencies(&self) -> Vec<&dyn ExternalTool> {
        vec![self.hmmalign.as_ref(), self.pplacer.as_ref(), self.guppy.as_ref()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;
    use std::{
        fs,
        sync::{Arc, Mutex},
    };
    use tempfile::TempDir;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ExternalTool for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn invoke(&self, args: &[String]) -> Result<ToolOutput, EtdError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{} {}", self.name, args.join(" ")));
            Ok(ToolOutput::default())
        }
    }

    fn placer(log: &Arc<Mutex<Vec<String>>>) -> Pplacer {
        let tool = |name: &'static str| -> Box<dyn ExternalTool> {
            Box::new(Recorder {
                name,
                log: Arc::clone(log),
            })
        };
        Pplacer::new(tool("hmmalign"), tool("pplacer"), tool("guppy"), 2)
    }

    #[test]
    fn package_without_reference_alignment_is_missing_input() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = placer(&log)
            .place(dir.path(), &dir.path().join("c.fasta"), dir.path())
            .unwrap_err();
        assert!(matches!(err, EtdError::MissingInput(ref p) if p.ends_with(REF_ALIGNMENT)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn runs_align_place_render_in_order() {
        let dir = TempDir::new().unwrap();
        let package = dir.path().join("mcr.refpkg");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join(REF_ALIGNMENT), "# STOCKHOLM 1.0\n//\n").unwrap();
        fs::write(package.join(REF_HMM), "HMMER3/f\n").unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let outputs = placer(&log)
            .place(&package, &dir.path().join("c.fasta"), dir.path())
            .unwrap();

        let calls = log.lock().unwrap().clone();
        let tools: Vec<&str> = calls.iter().map(|c| c.split(' ').next().unwrap()).collect();
        assert_eq!(tools, ["hmmalign", "pplacer", "guppy"]);
        assert!(calls[1].contains("-j 2"));
        assert!(calls[2].starts_with("guppy tog"));
        assert_eq!(outputs.tree, dir.path().join("placed.tree"));
    }
}
