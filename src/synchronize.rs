//! Genus-wide synchronization of "sp. N" placeholders.
//!
//! Within a genus, groups are visited in sorted order. The concatenated tree
//! of each group is the numbering authority: its placeholders are shifted by
//! a running adder so numbers never repeat across groups, and every leaf of
//! those clades records its canonical label. Single-gene trees of the same
//! group are then renamed from the canonical labels of their leaves.
//!
//! This step needs every interpretation result at once and mutates numbering
//! shared across groups, so it always runs on a single thread.

use ahash::AHashMap;
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{FunTreeError, Result};
use crate::types::{CollapseGroup, SpeciesLabel, TaxonKey, TreeResult, CONCATENATED};

/// genus -> group -> gene -> index into the result list
type GenusIndex = BTreeMap<String, BTreeMap<String, BTreeMap<String, usize>>>;

/// leaf hash -> canonical placeholder label
type CanonicalLabels = AHashMap<String, SpeciesLabel>;

/// Synchronizes placeholder numbering over the whole batch and hands it back.
pub fn synchronize(mut results: Vec<TreeResult>) -> Result<Vec<TreeResult>> {
    synchronize_in_place(&mut results)?;
    Ok(results)
}

pub fn synchronize_in_place(results: &mut [TreeResult]) -> Result<()> {
    // Built before anything is touched, so a duplicate leaves the batch as it was
    let index = index_by_genus(results)?;

    for (genus, groups) in &index {
        let mut cnt_sp_adder: u32 = 0;

        for (group, genes) in groups {
            let Some(&concatenated) = genes.get(CONCATENATED) else {
                log::info!(
                    "No concatenated dataset for {} {}. Passing synchronizing",
                    genus,
                    group
                );
                continue;
            };

            let (canonical, advance) =
                renumber_canonical(&mut results[concatenated], genus, cnt_sp_adder);
            log::debug!(
                "{} {}: {} leaves in canonical sp. clades, adder {} -> {}",
                genus,
                group,
                canonical.len(),
                cnt_sp_adder,
                cnt_sp_adder + advance
            );

            for (gene, &idx) in genes {
                if gene != CONCATENATED {
                    propagate(&mut results[idx], genus, &canonical);
                }
            }

            cnt_sp_adder += advance;
        }
    }

    Ok(())
}

fn index_by_genus(results: &[TreeResult]) -> Result<GenusIndex> {
    let mut index = GenusIndex::new();
    for (idx, result) in results.iter().enumerate() {
        for genus in result.genera() {
            let genes = index
                .entry(genus.clone())
                .or_default()
                .entry(result.group.clone())
                .or_default();
            if genes.contains_key(&result.gene) {
                log::error!(
                    "DEVELOPMENTAL ERROR, DUPLICATED TREE RESULT: {} {} {}",
                    genus,
                    result.group,
                    result.gene
                );
                return Err(FunTreeError::duplicate_work(
                    genus,
                    result.group.clone(),
                    result.gene.clone(),
                ));
            }
            genes.insert(result.gene.clone(), idx);
        }
    }
    Ok(index)
}

/// Moves `groups` under `key`, keeping their back-references in step.
fn place(result: &mut TreeResult, key: TaxonKey, mut groups: Vec<CollapseGroup>) {
    for group in groups.iter_mut() {
        group.taxon = key.clone();
    }
    result.collapse.entry(key).or_default().extend(groups);
}

/// Shifts every placeholder of `genus` in the concatenated tree by `adder`.
///
/// Returns the canonical label of every leaf in those clades and how far the
/// adder must move for the next group.
fn renumber_canonical(
    result: &mut TreeResult,
    genus: &str,
    adder: u32,
) -> (CanonicalLabels, u32) {
    let keys: Vec<TaxonKey> = result
        .collapse
        .keys()
        .filter(|key| key.genus == genus && key.species.has_placeholder())
        .cloned()
        .collect();

    let mut canonical = CanonicalLabels::new();
    let mut largest = 0u32;

    // Phase one: lift every placeholder clade out of the map
    let mut pending: Vec<(TaxonKey, Vec<CollapseGroup>)> = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(groups) = result.collapse.remove(&key) else {
            continue;
        };
        largest = largest.max(key.species.placeholder_numbers().into_iter().max().unwrap_or(0));

        let renumbered = TaxonKey {
            genus: key.genus.clone(),
            species: key.species.shifted(adder),
            disambiguator: key.disambiguator,
        };
        let label = SpeciesLabel::from_fragments(
            Vec::<String>::new(),
            renumbered.species.placeholder_numbers(),
        );
        for hash in groups.iter().flat_map(CollapseGroup::leaf_hashes) {
            canonical.insert(hash.to_string(), label.clone());
        }
        pending.push((renumbered, groups));
    }

    // Phase two: put them back under their final keys
    let count = pending.len() as u32;
    for (key, groups) in pending {
        place(result, key, groups);
    }

    (canonical, count.max(largest))
}

/// Renames every `genus` clade of a single-gene tree after the canonical
/// labels of its leaves.
fn propagate(result: &mut TreeResult, genus: &str, canonical: &CanonicalLabels) {
    let keys: Vec<TaxonKey> = result
        .collapse
        .keys()
        .filter(|key| key.genus == genus)
        .cloned()
        .collect();

    // Phase one: decide every target label with the clades lifted out
    let mut pending: Vec<(TaxonKey, SpeciesLabel, Vec<CollapseGroup>)> = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(groups) = result.collapse.remove(&key) else {
            continue;
        };

        let mut named: BTreeSet<String> = key.species.named_fragments().into_iter().collect();
        let mut numbers: BTreeSet<u32> = BTreeSet::new();
        let mut unmapped = false;
        for hash in groups.iter().flat_map(CollapseGroup::leaf_hashes) {
            match canonical.get(hash) {
                Some(label) => {
                    named.extend(label.named_fragments());
                    numbers.extend(label.placeholder_numbers());
                }
                None => unmapped = true,
            }
        }
        if unmapped {
            // Leaves without a canonical label still speak for this tree's own placeholder
            numbers.extend(key.species.placeholder_numbers());
        }

        let target = SpeciesLabel::from_fragments(named, numbers);
        pending.push((key, target, groups));
    }

    // Phase two: final keys, suffixed when already taken
    for (old, target, groups) in pending {
        let base = TaxonKey::new(genus, target);
        let mut key = base.clone();
        let mut n = 1;
        while result.collapse.contains_key(&key) {
            key = base.clone().with_disambiguator(n);
            n += 1;
        }
        if key != old {
            log::debug!("{} {}: {} -> {}", result.group, result.gene, old, key);
        }
        place(result, key, groups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;
    use crate::types::Leaf;

    fn group(key: &TaxonKey, hashes: &[&str]) -> CollapseGroup {
        CollapseGroup {
            leaves: hashes
                .iter()
                .map(|h| Leaf {
                    hash: h.to_string(),
                    label: h.to_string(),
                    species_original: String::new(),
                })
                .collect(),
            taxon: key.clone(),
            flat: false,
            ambiguous: 1,
        }
    }

    fn result(group_name: &str, gene: &str, clades: &[(TaxonKey, &[&str])]) -> TreeResult {
        let mut collapse = crate::types::CollapseMap::new();
        for (key, hashes) in clades {
            collapse
                .entry(key.clone())
                .or_default()
                .push(group(key, hashes));
        }
        TreeResult {
            group: group_name.to_string(),
            gene: gene.to_string(),
            tree: Tree::new(),
            collapse,
        }
    }

    fn sp(n: u32) -> TaxonKey {
        TaxonKey::ambiguous("Xylaria", n)
    }

    fn keys(result: &TreeResult) -> Vec<String> {
        result.collapse.keys().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_groups_numbered_after_each_other() {
        let results = vec![
            result("B", CONCATENATED, &[(sp(1), &["b1", "b2"])]),
            result("A", CONCATENATED, &[(sp(1), &["a1"]), (sp(2), &["a2", "a3"])]),
            result("B", "ITS", &[(sp(1), &["b1"]), (sp(2), &["b2"])]),
        ];
        let results = synchronize(results).unwrap();

        assert_eq!(keys(&results[1]), vec!["Xylaria sp. 1", "Xylaria sp. 2"]);
        assert_eq!(keys(&results[0]), vec!["Xylaria sp. 3"]);
        // Both ITS clades inherit sp. 3, the second one is suffixed
        assert_eq!(keys(&results[2]), vec!["Xylaria sp. 3", "Xylaria sp. 3 1"]);
        for groups in results[0].collapse.values() {
            assert_eq!(groups[0].taxon, sp(3));
        }
    }

    #[test]
    fn test_named_clade_absorbs_canonical_placeholder() {
        let hyp = TaxonKey::named("Xylaria", "hypoxylon");
        let results = vec![
            result("A", CONCATENATED, &[(hyp.clone(), &["h1"]), (sp(1), &["q1", "q2"])]),
            result("A", "tub2", &[(hyp.clone(), &["h1", "q1"]), (sp(1), &["q2"])]),
        ];
        let results = synchronize(results).unwrap();
        assert_eq!(
            keys(&results[1]),
            vec!["Xylaria sp. 1", "Xylaria hypoxylon/sp. 1"]
        );
        let composed = results[1]
            .collapse
            .keys()
            .find(|k| !k.species.is_placeholder())
            .unwrap();
        assert_eq!(results[1].collapse[composed][0].taxon, *composed);
    }

    #[test]
    fn test_missing_concatenated_leaves_group_alone() {
        let results = vec![
            result("A", "ITS", &[(sp(2), &["x1"]), (sp(5), &["x2"])]),
            result("A", "tub2", &[(sp(1), &["x1", "x2"])]),
        ];
        let before: Vec<Vec<String>> = results.iter().map(keys).collect();
        let results = synchronize(results).unwrap();
        let after: Vec<Vec<String>> = results.iter().map(keys).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_duplicate_work_is_rejected() {
        let results = vec![
            result("A", CONCATENATED, &[(sp(1), &["a1"])]),
            result("A", CONCATENATED, &[(sp(1), &["a2"])]),
        ];
        let err = synchronize(results).unwrap_err();
        assert!(matches!(err, FunTreeError::DuplicateWork { .. }));
    }

    #[test]
    fn test_genera_numbered_independently() {
        let dal = TaxonKey::ambiguous("Daldinia", 1);
        let results = vec![
            result("A", CONCATENATED, &[(sp(1), &["a1"]), (dal.clone(), &["d1"])]),
            result("B", CONCATENATED, &[(sp(1), &["b1"]), (dal.clone(), &["d2"])]),
            result("C", CONCATENATED, &[(dal, &["d3"])]),
        ];
        let results = synchronize(results).unwrap();
        assert_eq!(keys(&results[1]), vec!["Daldinia sp. 2", "Xylaria sp. 2"]);
        assert_eq!(keys(&results[2]), vec!["Daldinia sp. 3"]);
    }

    #[test]
    fn test_unmapped_gene_placeholder_keeps_its_number() {
        let results = vec![
            result("A", CONCATENATED, &[(sp(1), &["a1"])]),
            result("A", "ITS", &[(sp(1), &["a1"]), (sp(4), &["z9"])]),
        ];
        let results = synchronize(results).unwrap();
        assert_eq!(keys(&results[1]), vec!["Xylaria sp. 1", "Xylaria sp. 4"]);
    }

    #[test]
    fn test_partly_mapped_clade_keeps_own_placeholder() {
        let results = vec![
            result("A", CONCATENATED, &[(sp(1), &["a1"])]),
            result("A", "ITS", &[(sp(4), &["a1", "z9"])]),
        ];
        let results = synchronize(results).unwrap();
        assert_eq!(keys(&results[1]), vec!["Xylaria sp. 1/sp. 4"]);

        // Fully mapped clades take the canonical number only
        let results = vec![
            result("A", CONCATENATED, &[(sp(1), &["a1", "a2"])]),
            result("A", "ITS", &[(sp(4), &["a1", "a2"])]),
        ];
        let results = synchronize(results).unwrap();
        assert_eq!(keys(&results[1]), vec!["Xylaria sp. 1"]);
    }
}
