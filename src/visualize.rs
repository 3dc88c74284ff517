// src/visualize.rs

use ahash::AHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::Arc;

use crate::config::RunConfig;
use crate::errors::{FunTreeError, Result};
use crate::hasher::{decode_file, display_names};
use crate::interpret::run_stage;
use crate::render::{render_svg, Block};
use crate::taxdb::get_genus_species;
use crate::tree::{NodeId, Tree};
use crate::types::{
    CollapseGroup, CollapseMap, DataType, Dataset, LeafCatalog, SingleReport, TaxonKey,
    TreeResult,
};

/// Read-only view of the sample registry shared by every visualization unit.
#[derive(Clone)]
pub struct ReferenceData {
    pub catalog: Arc<LeafCatalog>,
    /// Known genera for `get_genus_species`
    pub genera: Arc<Vec<String>>,
    /// hash -> escaped original identifier
    pub display_names: Arc<AHashMap<String, String>>,
}

impl ReferenceData {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let catalog = dataset.leaf_catalog();
        let names = display_names(&catalog);
        Self {
            catalog: Arc::new(catalog),
            genera: Arc::new(dataset.genera.clone()),
            display_names: Arc::new(names),
        }
    }

    fn is_query(&self, hash: &str) -> bool {
        self.catalog
            .get(hash)
            .is_some_and(|info| info.datatype == DataType::Query)
    }
}

/// Named taxa first, then placeholders, each alphabetical by label.
pub fn ordered_taxa(collapse: &CollapseMap) -> Vec<&TaxonKey> {
    let (mut placeholders, mut named): (Vec<&TaxonKey>, Vec<&TaxonKey>) = collapse
        .keys()
        .partition(|key| key.species.is_placeholder());
    named.sort_by_cached_key(|key| key.label());
    placeholders.sort_by_cached_key(|key| key.label());
    named.extend(placeholders);
    named
}

/// Displayed name of every clade, in display order.
///
/// A key with one clade shows as "genus species"; repeated clades get a
/// 1-based occurrence number appended.
fn labelled_groups(collapse: &CollapseMap) -> Vec<(String, &CollapseGroup)> {
    let mut labelled = Vec::new();
    for key in ordered_taxa(collapse) {
        let groups = &collapse[key];
        if groups.len() == 1 {
            labelled.push((key.to_string(), &groups[0]));
        } else {
            for (n, group) in groups.iter().enumerate() {
                labelled.push((format!("{} {}", key, n + 1), group));
            }
        }
    }
    labelled
}

/// One report row per leaf per clade.
pub fn build_reports(result: &TreeResult, reference: &ReferenceData) -> Result<Vec<SingleReport>> {
    let mut reports = Vec::new();
    for (assigned, group) in labelled_groups(&result.collapse) {
        for leaf in &group.leaves {
            let info = reference
                .catalog
                .get(&leaf.hash)
                .ok_or_else(|| FunTreeError::unknown_sample(leaf.hash.clone()))?;
            reports.push(SingleReport {
                id: info.original_id.clone(),
                hash: leaf.hash.clone(),
                group: result.group.clone(),
                gene: result.gene.clone(),
                species_original: get_genus_species(&leaf.species_original, &reference.genera),
                species_assigned: assigned.clone(),
                ambiguous: group.ambiguous,
                flat: group.flat,
            });
        }
    }
    Ok(reports)
}

/// Drawable blocks for every clade that is a whole subtree of `tree`.
fn collapse_blocks(tree: &Tree, result: &TreeResult, reference: &ReferenceData) -> BTreeMap<NodeId, Block> {
    let leaf_ids: AHashMap<&str, NodeId> = tree
        .leaves()
        .into_iter()
        .filter_map(|id| tree.name(id).map(|name| (name, id)))
        .collect();
    let counts = tree.leaf_counts();

    let mut blocks = BTreeMap::new();
    for (label, group) in labelled_groups(&result.collapse) {
        let ids: Vec<NodeId> = group
            .leaf_hashes()
            .filter_map(|hash| leaf_ids.get(hash).copied())
            .collect();
        if ids.len() < 2 {
            continue;
        }
        let Some(node) = tree.mrca(&ids) else {
            continue;
        };
        if counts[node.0] != group.leaves.len() {
            log::debug!(
                "{} {}: {} is not a clade of the drawn tree, left expanded",
                result.group,
                result.gene,
                label
            );
            continue;
        }
        blocks.insert(
            node,
            Block {
                placeholder: group.taxon.species.is_placeholder(),
                flat: group.flat,
                members: group
                    .leaf_hashes()
                    .filter(|hash| reference.is_query(hash))
                    .map(str::to_string)
                    .collect(),
                size: group.leaves.len(),
                label,
            },
        );
    }
    blocks
}

/// Final report rows of one synchronized tree, plus its annotated image.
pub fn visualize(
    result: &TreeResult,
    reference: &ReferenceData,
    config: &RunConfig,
) -> Result<Vec<SingleReport>> {
    let (group, gene) = (result.group.as_str(), result.gene.as_str());
    let reports = build_reports(result, reference)?;

    let blocks = collapse_blocks(&result.tree, result, reference);
    let highlight: BTreeSet<String> = result
        .tree
        .leaf_names()
        .into_iter()
        .filter(|name| reference.is_query(name))
        .collect();

    let hashed = config.final_image_hashed(group, gene);
    if let Some(dir) = hashed.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&hashed, render_svg(&result.tree, &blocks, &highlight))?;
    decode_file(&reference.display_names, &hashed, config.final_image(group, gene))?;

    log::info!(
        "Visualized {} {}: {} report rows, {} blocks drawn",
        group,
        gene,
        reports.len(),
        blocks.len()
    );
    Ok(reports)
}

/// Parallel visualization of every synchronized tree.
pub fn visualize_trees_parallel(
    results: &[TreeResult],
    reference: &ReferenceData,
    config: &RunConfig,
) -> Result<Vec<Vec<SingleReport>>> {
    run_stage(results, config, |result| visualize(result, reference, config))
}
