// src/config.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{FunTreeError, Result};
use crate::hasher::encode_name;

/// Verbosity at which every stage runs sequentially for debugging.
pub const SEQUENTIAL_VERBOSITY: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Identification,
    /// Reference "sp. N" numbers are kept as found in the input
    Validation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub runname: String,
    /// Worker pool size
    pub thread: usize,
    pub verbose: u8,
    pub mode: RunMode,
    /// Resolve flat branches before collapsing
    pub solveflat: bool,
    /// Only interpret trees that contain query sequences
    pub queryonly: bool,
    /// Whether validation runs still synchronize sp. numbers across trees
    pub synchronize_validation: bool,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub out_tree: PathBuf,
    pub out_alignment: PathBuf,
    pub out_report: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            runname: "funtree".to_string(),
            thread: 1,
            verbose: 2,
            mode: RunMode::Identification,
            solveflat: true,
            queryonly: true,
            synchronize_validation: true,
            paths: PathConfig::default(),
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            out_tree: PathBuf::from("Tree"),
            out_alignment: PathBuf::from("Alignment"),
            out_report: PathBuf::from("Report"),
        }
    }
}

impl RunConfig {
    /// All paths rooted under `dir`.
    pub fn with_output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let dir = dir.as_ref();
        self.paths = PathConfig {
            out_tree: dir.join("Tree"),
            out_alignment: dir.join("Alignment"),
            out_report: dir.join("Report"),
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.runname.trim().is_empty() {
            return Err(FunTreeError::invalid_config("runname must not be empty"));
        }
        if self.thread == 0 {
            return Err(FunTreeError::invalid_config("thread must be at least 1"));
        }
        Ok(())
    }

    pub fn is_sequential(&self) -> bool {
        self.verbose >= SEQUENTIAL_VERBOSITY
    }

    pub fn should_synchronize(&self) -> bool {
        self.mode == RunMode::Identification || self.synchronize_validation
    }

    fn stem(&self, group: &str, gene: &str) -> String {
        format!(
            "{}_{}_{}",
            encode_name(&self.runname),
            encode_name(group),
            encode_name(gene)
        )
    }

    pub fn tree_path(&self, group: &str, gene: &str) -> PathBuf {
        self.paths
            .out_tree
            .join("hash")
            .join(format!("hash_{}.nwk", self.stem(group, gene)))
    }

    pub fn alignment_path(&self, group: &str, gene: &str) -> PathBuf {
        self.paths.out_alignment.join(format!(
            "{}_hash_trimmed_{}_{}.fasta",
            encode_name(&self.runname),
            encode_name(group),
            encode_name(gene)
        ))
    }

    pub fn original_image_hashed(&self, group: &str, gene: &str) -> PathBuf {
        self.paths
            .out_tree
            .join(format!("hash_{}_original.svg", self.stem(group, gene)))
    }

    pub fn original_image(&self, group: &str, gene: &str) -> PathBuf {
        self.paths
            .out_tree
            .join(format!("{}_original.svg", self.stem(group, gene)))
    }

    pub fn final_image_hashed(&self, group: &str, gene: &str) -> PathBuf {
        self.paths
            .out_tree
            .join(format!("hash_{}.svg", self.stem(group, gene)))
    }

    pub fn final_image(&self, group: &str, gene: &str) -> PathBuf {
        self.paths
            .out_tree
            .join(format!("{}.svg", self.stem(group, gene)))
    }

    pub fn report_path(&self) -> PathBuf {
        self.paths
            .out_report
            .join(format!("{}.tree_report.tsv", encode_name(&self.runname)))
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: RunConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &RunConfig) -> Result<()> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| FunTreeError::serialization(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            runname = "xyl"
            thread = 4
            mode = "validation"

            [paths]
            out_tree = "/data/Tree"
            "#,
        )
        .unwrap();
        assert_eq!(config.thread, 4);
        assert_eq!(config.mode, RunMode::Validation);
        assert!(config.solveflat);
        assert!(config.should_synchronize());
        assert_eq!(config.paths.out_alignment, PathBuf::from("Alignment"));
        assert_eq!(
            config.tree_path("A", "ITS"),
            PathBuf::from("/data/Tree/hash/hash_xyl_A_ITS.nwk")
        );
    }

    #[test]
    fn test_artifact_names_are_encoded() {
        let config = RunConfig {
            runname: "run".to_string(),
            ..Default::default()
        };
        let path = config.final_image("Group A/B", "ITS");
        assert_eq!(path.file_name().unwrap(), "run_Group%20A%2FB_ITS.svg");
        assert_eq!(
            config.alignment_path("A", "tef1").file_name().unwrap(),
            "run_hash_trimmed_A_tef1.fasta"
        );
    }

    #[test]
    fn test_validate_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funtree.toml");
        let mut config = RunConfig::default().with_output_dir(dir.path());
        config.thread = 0;
        assert!(config.validate().is_err());

        config.thread = 2;
        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.thread, 2);
        assert_eq!(loaded.paths.out_tree, dir.path().join("Tree"));
    }
}
