// src/lib.rs
pub mod types;
pub mod errors;
pub mod config;
pub mod newick;
pub mod tree;
pub mod fasta;
pub mod hasher;
pub mod taxdb;
pub mod render;
pub mod interpret;
pub mod synchronize;
pub mod visualize;

use std::fmt::Write as FmtWrite;
use std::fs;

use crate::config::RunConfig;
use crate::errors::{FunTreeError, Result};
use crate::interpret::{build_interpret_tasks, interpret_trees_parallel, InterpretOptions};
use crate::synchronize::synchronize;
use crate::types::{Dataset, SingleReport, TreeResult, CONCATENATED};
use crate::visualize::{visualize_trees_parallel, ReferenceData};

/// Output of one tree interpretation run.
/// Report text is generated on demand from the structured rows.
#[derive(Debug)]
pub struct IdentificationResults {
    /// One row per (sample, gene), in tree then display order
    pub reports: Vec<SingleReport>,

    /// Synchronized interpretation of every tree
    pub tree_results: Vec<TreeResult>,
}

impl IdentificationResults {
    /// Tab-separated report with a header line
    pub fn get_report_text(&self) -> String {
        let mut output = String::new();
        output.push_str("id\thash\tgroup\tgene\tspecies_original\tspecies_assigned\tambiguous\tflat\n");
        for row in &self.reports {
            let _ = writeln!(
                output,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                row.id,
                row.hash,
                row.group,
                row.gene,
                row.species_original,
                row.species_assigned,
                row.ambiguous,
                row.flat
            );
        }
        output
    }
}

/// Writes every report row back onto its sample.
///
/// The concatenated tree decides the final species; single genes fill the
/// per-gene assignment. Flat placements record the gene they were flat in.
pub fn fold_reports(dataset: &mut Dataset, reports: &[SingleReport]) -> Result<()> {
    for report in reports {
        let fi = dataset
            .funinfo
            .get_mut(&report.hash)
            .ok_or_else(|| FunTreeError::unknown_sample(report.hash.clone()))?;

        if report.gene == CONCATENATED {
            fi.final_species = report.species_assigned.clone();
            fi.species_identifier = report.ambiguous;
        } else {
            fi.bygene_species
                .insert(report.gene.clone(), report.species_assigned.clone());
        }
        if report.flat && !fi.flat.contains(&report.gene) {
            fi.flat.push(report.gene.clone());
        }
    }
    Ok(())
}

/// Interprets every built tree of the dataset, synchronizes placeholder
/// numbering across them, renders the results and folds the assignments
/// back into `dataset`.
pub fn run_tree_interpretation(
    dataset: &mut Dataset,
    config: &RunConfig,
) -> Result<IdentificationResults> {
    config.validate()?;

    // 1. Slim read-only projection for the workers
    let reference = ReferenceData::from_dataset(dataset);
    fs::create_dir_all(&config.paths.out_tree)?;

    // 2. Interpretation, one task per (group, gene)
    let tasks = build_interpret_tasks(dataset, config);
    log::info!("Interpreting {} trees with {} workers", tasks.len(), config.thread);
    let options = InterpretOptions {
        config,
        catalog: reference.catalog.as_ref(),
        display_names: reference.display_names.as_ref(),
    };
    let tree_results = interpret_trees_parallel(&tasks, &options)?;

    // 3. Synchronization, single-threaded over the whole batch
    let tree_results = if config.should_synchronize() {
        synchronize(tree_results)?
    } else {
        log::info!("Validation mode without synchronization, keeping per-tree sp. numbers");
        tree_results
    };

    // 4. Visualization
    let reports: Vec<SingleReport> = visualize_trees_parallel(&tree_results, &reference, config)?
        .into_iter()
        .flatten()
        .collect();

    // 5. Fold-in
    fold_reports(dataset, &reports)?;
    log::info!(
        "Tree interpretation finished: {} trees, {} report rows",
        tree_results.len(),
        reports.len()
    );

    Ok(IdentificationResults {
        reports,
        tree_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, FunInfo};

    fn report(hash: &str, gene: &str, assigned: &str, flat: bool) -> SingleReport {
        SingleReport {
            id: hash.to_uppercase(),
            hash: hash.to_string(),
            group: "A".to_string(),
            gene: gene.to_string(),
            species_original: String::new(),
            species_assigned: assigned.to_string(),
            ambiguous: 2,
            flat,
        }
    }

    #[test]
    fn test_fold_reports() {
        let mut ds = Dataset::default();
        ds.insert(FunInfo::new("q1", "Q1", DataType::Query, "", ""));
        let reports = vec![
            report("q1", CONCATENATED, "Xylaria sp. 3", true),
            report("q1", "ITS", "Xylaria hypoxylon/sp. 3", true),
            report("q1", "tub2", "Xylaria sp. 3", false),
        ];
        fold_reports(&mut ds, &reports).unwrap();

        let fi = &ds.funinfo["q1"];
        assert_eq!(fi.final_species, "Xylaria sp. 3");
        assert_eq!(fi.species_identifier, 2);
        assert_eq!(fi.bygene_species["ITS"], "Xylaria hypoxylon/sp. 3");
        assert_eq!(fi.bygene_species["tub2"], "Xylaria sp. 3");
        assert_eq!(fi.flat, vec![CONCATENATED.to_string(), "ITS".to_string()]);
    }

    #[test]
    fn test_fold_unknown_sample() {
        let mut ds = Dataset::default();
        let err = fold_reports(&mut ds, &[report("zz", "ITS", "Xylaria sp. 1", false)]).unwrap_err();
        assert!(matches!(err, FunTreeError::UnknownSample { .. }));
    }

    #[test]
    fn test_report_text() {
        let results = IdentificationResults {
            reports: vec![report("q1", "ITS", "Xylaria sp. 1", false)],
            tree_results: Vec::new(),
        };
        let text = results.get_report_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("id\thash"));
        assert_eq!(lines[1], "Q1\tq1\tA\tITS\t\tXylaria sp. 1\t2\tfalse");
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut ds = Dataset::default();
        let config = RunConfig {
            thread: 0,
            ..Default::default()
        };
        let err = run_tree_interpretation(&mut ds, &config).unwrap_err();
        assert!(matches!(err, FunTreeError::InvalidConfig { .. }));
    }
}
