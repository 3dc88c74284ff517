// src/interpret/collapse.rs

use ahash::AHashMap;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::RunMode;
use crate::fasta::ZeroDistance;
use crate::tree::{NodeId, Tree};
use crate::types::{
    CollapseGroup, CollapseMap, DataType, DatasetPartition, Leaf, LeafCatalog, SpeciesLabel,
    TaxonKey,
};

/// Genus given to placeholder clades with no named relative anywhere above them.
pub const UNKNOWN_GENUS: &str = "Unknown";

/// (genus, species) of a labelled leaf
pub type Taxon = (String, SpeciesLabel);

/// Taxon carried by every reference/outgroup leaf of one tree.
///
/// Queries carry none. Reference names like "sp." or "sp. 4" also carry none,
/// except in validation mode where "sp. N" keeps its number.
#[derive(Debug, Clone, Default)]
pub struct LeafTaxa {
    taxa: AHashMap<String, Taxon>,
}

impl LeafTaxa {
    pub fn new(catalog: &LeafCatalog, partition: &DatasetPartition, mode: RunMode) -> Self {
        let mut taxa = AHashMap::new();
        for (hash, info) in catalog {
            if partition.query.contains(hash) || info.datatype == DataType::Query {
                continue;
            }
            let genus = info.genus.trim();
            let species = info.species.trim();
            if genus.is_empty() || species.is_empty() {
                continue;
            }
            let label = if species.starts_with("sp.") || species == "sp" {
                match (mode, SpeciesLabel::parse(species)) {
                    (RunMode::Validation, SpeciesLabel::Ambiguous(n)) => SpeciesLabel::Ambiguous(n),
                    _ => continue,
                }
            } else {
                SpeciesLabel::Named(species.to_string())
            };
            taxa.insert(hash.clone(), (genus.to_string(), label));
        }
        Self { taxa }
    }

    pub fn get(&self, hash: &str) -> Option<&Taxon> {
        self.taxa.get(hash)
    }

    /// Largest "sp. N" kept per genus (validation mode only ever has any).
    pub fn reserved_numbers(&self) -> BTreeMap<String, u32> {
        let mut reserved: BTreeMap<String, u32> = BTreeMap::new();
        for (genus, label) in self.taxa.values() {
            if let SpeciesLabel::Ambiguous(n) = label {
                let slot = reserved.entry(genus.clone()).or_insert(0);
                *slot = (*slot).max(*n);
            }
        }
        reserved
    }

    fn under(&self, tree: &Tree, node: NodeId) -> BTreeSet<Taxon> {
        tree.leaves_under(node)
            .into_iter()
            .filter_map(|leaf| tree.name(leaf).and_then(|name| self.get(name)))
            .cloned()
            .collect()
    }
}

/// Most represented genus, alphabetical on ties.
fn majority_genus(taxa: &BTreeSet<Taxon>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (genus, _) in taxa {
        *counts.entry(genus.as_str()).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (genus, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((genus, count));
        }
    }
    best.map(|(genus, _)| genus.to_string())
}

/// Reconstructs flat branches into a best-guess resolved topology.
///
/// Internal branches no longer than `zero` are dissolved, then inside every
/// resulting polytomy the children that carry one and the same taxon are
/// gathered under a new node.
pub fn resolve_flat_branches(tree: &mut Tree, leaf_taxa: &LeafTaxa, zero: f64) -> usize {
    let contracted = tree.contract_short_edges(zero);
    let mut regrouped = 0;

    for node in tree.preorder() {
        let children = tree.children(node).to_vec();
        if children.len() <= 2 {
            continue;
        }
        let mut by_taxon: BTreeMap<Taxon, Vec<NodeId>> = BTreeMap::new();
        for &child in &children {
            let taxa = leaf_taxa.under(tree, child);
            if taxa.len() == 1 {
                if let Some(taxon) = taxa.into_iter().next() {
                    by_taxon.entry(taxon).or_default().push(child);
                }
            }
        }
        for members in by_taxon.into_values() {
            if members.len() >= 2 && members.len() < children.len() {
                tree.group_children(node, &members);
                regrouped += 1;
            }
        }
    }

    log::debug!(
        "Flat branch resolution: {} branches contracted, {} clades regrouped",
        contracted,
        regrouped
    );
    regrouped
}

/// Walks the tree from the root and collapses every clade that holds at most
/// one named taxon. Clades holding several taxa are collapsed together only
/// when they are flat; otherwise the walk descends into their children.
pub fn tree_search(
    tree: &Tree,
    leaf_taxa: &LeafTaxa,
    zero: &ZeroDistance,
    catalog: &LeafCatalog,
) -> CollapseMap {
    let mut collapse = CollapseMap::new();
    let mut next_number = leaf_taxa.reserved_numbers();

    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        let taxa = leaf_taxa.under(tree, node);

        let (key, flat, ambiguous) = match taxa.len() {
            0 => {
                let genus = infer_genus(tree, leaf_taxa, node);
                let number = next_number.entry(genus.clone()).or_insert(0);
                *number += 1;
                (TaxonKey::ambiguous(genus, *number), false, 1)
            }
            1 => {
                let Some((genus, species)) = taxa.into_iter().next() else {
                    continue;
                };
                (TaxonKey::new(genus, species), false, 1)
            }
            n if is_flat(tree, node, zero) => (flat_key(&taxa), true, n as u32),
            _ => {
                for &child in tree.children(node).iter().rev() {
                    stack.push(child);
                }
                continue;
            }
        };

        let group = CollapseGroup {
            leaves: collect_leaves(tree, node, catalog),
            taxon: key.clone(),
            flat,
            ambiguous,
        };
        collapse.entry(key).or_default().push(group);
    }

    collapse
}

fn is_flat(tree: &Tree, node: NodeId, zero: &ZeroDistance) -> bool {
    if tree.height(node) <= zero.zero {
        return true;
    }
    let leaves = tree.leaves_under(node);
    zero.all_identical(leaves.iter().filter_map(|&leaf| tree.name(leaf)))
}

/// Composite key for several indistinguishable taxa.
fn flat_key(taxa: &BTreeSet<Taxon>) -> TaxonKey {
    let genus = majority_genus(taxa).unwrap_or_else(|| UNKNOWN_GENUS.to_string());
    let mut named = Vec::new();
    let mut numbers = Vec::new();
    for (taxon_genus, label) in taxa {
        if *taxon_genus == genus {
            named.extend(label.named_fragments());
            numbers.extend(label.placeholder_numbers());
        } else {
            named.push(format!("{} {}", taxon_genus, label));
        }
    }
    TaxonKey::new(genus, SpeciesLabel::from_fragments(named, numbers))
}

/// Genus for an unnamed clade, taken from the closest ancestor with named leaves.
fn infer_genus(tree: &Tree, leaf_taxa: &LeafTaxa, node: NodeId) -> String {
    tree.ancestors(node)
        .into_iter()
        .skip(1)
        .find_map(|ancestor| majority_genus(&leaf_taxa.under(tree, ancestor)))
        .unwrap_or_else(|| UNKNOWN_GENUS.to_string())
}

fn collect_leaves(tree: &Tree, node: NodeId, catalog: &LeafCatalog) -> Vec<Leaf> {
    tree.leaves_under(node)
        .into_iter()
        .filter_map(|leaf| tree.name(leaf))
        .map(|hash| match catalog.get(hash) {
            Some(info) => Leaf {
                hash: hash.to_string(),
                label: info.original_id.clone(),
                species_original: info.ori_name.clone(),
            },
            None => Leaf {
                hash: hash.to_string(),
                label: hash.to_string(),
                species_original: String::new(),
            },
        })
        .collect()
}
