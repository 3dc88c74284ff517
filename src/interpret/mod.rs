pub mod collapse;
pub mod interpret_tree;
pub mod interpret_trees;

pub use collapse::{resolve_flat_branches, tree_search, LeafTaxa};
pub use interpret_tree::{interpret, interpret_task, InterpretOptions, InterpretTask};
pub use interpret_trees::{build_interpret_tasks, interpret_trees_parallel, run_stage};
