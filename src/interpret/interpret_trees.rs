// src/interpret/interpret_trees.rs
use rayon::prelude::*;

use super::interpret_tree::{interpret_task, InterpretOptions, InterpretTask};
use crate::config::RunConfig;
use crate::errors::Result;
use crate::types::{Dataset, DatasetPartition, TreeResult};

/// One task per (group, gene) that has query sequences, or every pair when
/// `queryonly` is off.
pub fn build_interpret_tasks(dataset: &Dataset, config: &RunConfig) -> Vec<InterpretTask> {
    let mut tasks = Vec::new();
    for (group, genes) in &dataset.partitions {
        for (gene, partition) in genes {
            if partition.query.is_empty() && config.queryonly {
                log::debug!("No query sequence in {} {}, skipping tree", group, gene);
                continue;
            }
            tasks.push(InterpretTask {
                group: group.clone(),
                gene: gene.clone(),
                tree_path: config.tree_path(group, gene),
                partition: DatasetPartition::from_dataset(dataset, group, gene),
            });
        }
    }
    tasks
}

/// Applies `f` to every item, on a pool of `config.thread` workers or one by
/// one when the run is in sequential (debug) verbosity.
///
/// Results keep the order of `items` either way; the first error aborts the stage.
pub fn run_stage<T, R, F>(items: &[T], config: &RunConfig, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync + Send,
{
    if config.is_sequential() {
        return items.iter().map(f).collect();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.thread)
        .build()?;
    pool.install(|| items.par_iter().map(|item| f(item)).collect())
}

/// Parallel interpretation of every task.
pub fn interpret_trees_parallel(
    tasks: &[InterpretTask],
    options: &InterpretOptions,
) -> Result<Vec<TreeResult>> {
    run_stage(tasks, options.config, |task| interpret_task(task, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FunTreeError;
    use crate::types::{DataType, FunInfo, GenePartition};

    fn dataset() -> Dataset {
        let mut ds = Dataset::default();
        ds.insert(FunInfo::new("h1", "A1", DataType::Db, "Xylaria", "hypoxylon"));
        ds.insert(FunInfo::new("q1", "Q1", DataType::Query, "", ""));
        let groups = ds.partitions.entry("A".to_string()).or_default();
        groups.insert(
            "ITS".to_string(),
            GenePartition {
                query: vec!["q1".into()],
                outgroup: vec![],
            },
        );
        groups.insert("tub2".to_string(), GenePartition::default());
        ds
    }

    #[test]
    fn test_build_tasks_respects_queryonly() {
        let ds = dataset();
        let mut config = RunConfig::default();
        let tasks = build_interpret_tasks(&ds, &config);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].gene, "ITS");
        assert!(tasks[0].partition.db.contains("h1"));

        config.queryonly = false;
        let tasks = build_interpret_tasks(&ds, &config);
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_run_stage_same_order_parallel_and_sequential() {
        let items: Vec<u32> = (0..50).collect();
        let mut config = RunConfig {
            thread: 4,
            ..Default::default()
        };
        let parallel = run_stage(&items, &config, |x| Ok(x * 2)).unwrap();
        config.verbose = 3;
        let sequential = run_stage(&items, &config, |x| Ok(x * 2)).unwrap();
        assert_eq!(parallel, sequential);
        assert_eq!(parallel[49], 98);
    }

    #[test]
    fn test_run_stage_fails_fast() {
        let items: Vec<u32> = (0..10).collect();
        let config = RunConfig {
            thread: 2,
            ..Default::default()
        };
        let result = run_stage(&items, &config, |&x| {
            if x == 7 {
                Err(FunTreeError::missing_artifact("A", "ITS", "x.nwk"))
            } else {
                Ok(x)
            }
        });
        assert!(matches!(result, Err(FunTreeError::MissingArtifact { .. })));
    }
}
