// src/interpret/interpret_tree.rs

use ahash::AHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::collapse::{resolve_flat_branches, tree_search, LeafTaxa};
use crate::config::{RunConfig, RunMode};
use crate::errors::{FunTreeError, Result};
use crate::fasta::ZeroDistance;
use crate::hasher::decode_file;
use crate::newick::read_newick_file;
use crate::render::render_svg;
use crate::types::{DatasetPartition, LeafCatalog, TreeResult};

/// Run-wide, read-only inputs shared by every interpretation unit.
pub struct InterpretOptions<'a> {
    pub config: &'a RunConfig,
    /// Slim projection of the sample registry
    pub catalog: &'a LeafCatalog,
    /// hash -> display name, for decoding rendered images
    pub display_names: &'a AHashMap<String, String>,
}

/// One (group, gene) unit of work.
#[derive(Debug, Clone)]
pub struct InterpretTask {
    pub group: String,
    pub gene: String,
    pub tree_path: PathBuf,
    pub partition: DatasetPartition,
}

/// Trimmed alignment for the unit, plain or gzipped.
fn alignment_for(config: &RunConfig, group: &str, gene: &str) -> PathBuf {
    let plain = config.alignment_path(group, gene);
    if plain.is_file() {
        return plain;
    }
    let mut gz = plain.clone().into_os_string();
    gz.push(".gz");
    let gz = PathBuf::from(gz);
    if gz.is_file() {
        gz
    } else {
        plain
    }
}

/// Turns one built tree into a `TreeResult`:
///  1) load the tree and the zero distance of its alignment
///  2) reroot on the outgroup and draw the uncollapsed tree
///  3) optionally resolve flat branches
///  4) ladderize and collapse clades into taxa
pub fn interpret(
    tree_path: &Path,
    group: &str,
    gene: &str,
    partition: &DatasetPartition,
    options: &InterpretOptions,
) -> Result<TreeResult> {
    let config = options.config;
    log::debug!("{}", tree_path.display());

    if !tree_path.is_file() {
        log::warn!("Cannot find {}", tree_path.display());
        return Err(FunTreeError::missing_artifact(
            group,
            gene,
            tree_path.display().to_string(),
        ));
    }
    let mut tree = read_newick_file(tree_path)?;

    let zero = ZeroDistance::from_alignment(alignment_for(config, group, gene));

    if partition.outgroup.is_empty() {
        log::warn!("No outgroup for {} {}, keeping the tree's own root", group, gene);
    } else if !tree.reroot_on_outgroup(&partition.outgroup) {
        log::warn!(
            "Outgroup of {} {} is missing from the tree or not monophyletic, rooted on its first leaf",
            group,
            gene
        );
    }

    // Rerooted, uncollapsed tree, drawn on hashes then decoded
    let hashed = config.original_image_hashed(group, gene);
    if let Some(dir) = hashed.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&hashed, render_svg(&tree, &BTreeMap::new(), &partition.query))?;
    decode_file(
        options.display_names,
        &hashed,
        config.original_image(group, gene),
    )?;

    let leaf_taxa = LeafTaxa::new(options.catalog, partition, config.mode);
    if config.mode == RunMode::Validation {
        log::debug!(
            "Validation mode, reserved sp. numbers for {} {}: {:?}",
            group,
            gene,
            leaf_taxa.reserved_numbers()
        );
    }

    if config.solveflat {
        resolve_flat_branches(&mut tree, &leaf_taxa, zero.zero);
    }

    tree.ladderize(true);

    let collapse = tree_search(&tree, &leaf_taxa, &zero, options.catalog);

    let missing: BTreeSet<String> = tree
        .leaf_names()
        .into_iter()
        .filter(|name| !options.catalog.contains_key(name))
        .collect();
    if !missing.is_empty() {
        log::warn!(
            "{} {}: {} leaves are not registered samples: {:?}",
            group,
            gene,
            missing.len(),
            missing
        );
    }

    log::info!(
        "Interpreted {} {}: {} taxa collapsed from {} leaves",
        group,
        gene,
        collapse.len(),
        tree.leaves().len()
    );

    Ok(TreeResult {
        group: group.to_string(),
        gene: gene.to_string(),
        tree,
        collapse,
    })
}

/// `interpret` for a prepared task.
pub fn interpret_task(task: &InterpretTask, options: &InterpretOptions) -> Result<TreeResult> {
    interpret(
        &task.tree_path,
        &task.group,
        &task.gene,
        &task.partition,
        options,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::display_names;
    use crate::types::{DataType, Dataset, FunInfo, GenePartition, TaxonKey};

    fn setup(dir: &Path) -> (Dataset, RunConfig) {
        let mut ds = Dataset::default();
        ds.insert(FunInfo::new("HS1", "CBS 1<2>", DataType::Db, "Xylaria", "hypoxylon"));
        ds.insert(FunInfo::new("HS2", "CBS 2", DataType::Db, "Xylaria", "polymorpha"));
        ds.insert(FunInfo::new("HS3", "query one", DataType::Query, "", ""));
        ds.insert(FunInfo::new("HS4", "OG", DataType::Db, "Daldinia", "concentrica"));
        ds.partitions.entry("A".to_string()).or_default().insert(
            "ITS".to_string(),
            GenePartition {
                query: vec!["HS3".into()],
                outgroup: vec!["HS4".into()],
            },
        );
        let config = RunConfig {
            runname: "t".to_string(),
            ..Default::default()
        }
        .with_output_dir(dir);
        (ds, config)
    }

    #[test]
    fn test_missing_tree_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (ds, config) = setup(dir.path());
        let catalog = ds.leaf_catalog();
        let names = display_names(&catalog);
        let options = InterpretOptions {
            config: &config,
            catalog: &catalog,
            display_names: &names,
        };
        let partition = DatasetPartition::from_dataset(&ds, "A", "ITS");
        let err = interpret(&config.tree_path("A", "ITS"), "A", "ITS", &partition, &options)
            .unwrap_err();
        assert!(matches!(err, FunTreeError::MissingArtifact { .. }));
    }

    #[test]
    fn test_interpret_writes_decoded_original_image() {
        let dir = tempfile::tempdir().unwrap();
        let (ds, config) = setup(dir.path());
        let tree_path = config.tree_path("A", "ITS");
        fs::create_dir_all(tree_path.parent().unwrap()).unwrap();
        fs::write(&tree_path, "((HS1:0.1,HS3:0.1):0.2,(HS2:0.2,HS4:0.9):0.1);").unwrap();

        let catalog = ds.leaf_catalog();
        let names = display_names(&catalog);
        let options = InterpretOptions {
            config: &config,
            catalog: &catalog,
            display_names: &names,
        };
        let partition = DatasetPartition::from_dataset(&ds, "A", "ITS");
        let result = interpret(&tree_path, "A", "ITS", &partition, &options).unwrap();

        assert_eq!(result.group, "A");
        let hyp = &result.collapse[&TaxonKey::named("Xylaria", "hypoxylon")];
        assert_eq!(hyp[0].leaf_hashes().collect::<Vec<_>>(), vec!["HS1", "HS3"]);
        assert!(result.collapse.contains_key(&TaxonKey::named("Daldinia", "concentrica")));

        let decoded = fs::read_to_string(config.original_image("A", "ITS")).unwrap();
        assert!(decoded.contains("CBS 1&lt;2&gt;"));
        assert!(decoded.contains("query one"));
        assert!(!decoded.contains("HS1"));
        assert!(config.original_image_hashed("A", "ITS").is_file());
    }
}
