//src/types.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ahash::AHashMap;

use crate::errors::Result;
use crate::tree::Tree;

/// Gene name of the tree built from all genes joined together.
pub const CONCATENATED: &str = "concatenated";

/// Where a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Db,
    Query,
    Outgroup,
}

/// One input biological sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunInfo {
    pub hash: String,
    pub original_id: String,
    pub datatype: DataType,
    #[serde(default)]
    pub genus: String,
    #[serde(default)]
    pub species: String,
    /// Raw description the sample was loaded with, e.g. "KX123 Xylaria hypoxylon CBS 122"
    #[serde(default)]
    pub ori_name: String,

    // Filled in by the fold-in step
    #[serde(default)]
    pub bygene_species: BTreeMap<String, String>,
    #[serde(default)]
    pub final_species: String,
    #[serde(default)]
    pub species_identifier: u32,
    #[serde(default)]
    pub flat: Vec<String>,
}

impl FunInfo {
    pub fn new(
        hash: impl Into<String>,
        original_id: impl Into<String>,
        datatype: DataType,
        genus: impl Into<String>,
        species: impl Into<String>,
    ) -> Self {
        let genus = genus.into();
        let species = species.into();
        let original_id = original_id.into();
        let ori_name = if genus.is_empty() {
            original_id.clone()
        } else {
            format!("{} {} {}", original_id, genus, species)
        };
        Self {
            hash: hash.into(),
            original_id,
            datatype,
            genus,
            species,
            ori_name,
            bygene_species: BTreeMap::new(),
            final_species: String::new(),
            species_identifier: 0,
            flat: Vec::new(),
        }
    }
}

/// Query and outgroup membership of one (group, gene) dataset, by sample hash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenePartition {
    #[serde(default)]
    pub query: Vec<String>,
    #[serde(default)]
    pub outgroup: Vec<String>,
}

/// Process-wide sample registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// hash -> sample
    pub funinfo: BTreeMap<String, FunInfo>,
    /// group -> gene -> partition
    pub partitions: BTreeMap<String, BTreeMap<String, GenePartition>>,
    /// Known genera, used to pull "Genus species" out of raw descriptions
    #[serde(default)]
    pub genera: Vec<String>,
}

impl Dataset {
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut dataset: Dataset = serde_json::from_reader(reader)?;
        // Registry keys are authoritative
        for (hash, fi) in dataset.funinfo.iter_mut() {
            if fi.hash.is_empty() {
                fi.hash = hash.clone();
            }
        }
        Ok(dataset)
    }

    pub fn insert(&mut self, fi: FunInfo) {
        self.funinfo.insert(fi.hash.clone(), fi);
    }

    /// Slim read-only projection handed to workers instead of the full registry.
    pub fn leaf_catalog(&self) -> LeafCatalog {
        self.funinfo
            .values()
            .map(|fi| {
                (
                    fi.hash.clone(),
                    LeafInfo {
                        original_id: fi.original_id.clone(),
                        genus: fi.genus.clone(),
                        species: fi.species.clone(),
                        ori_name: fi.ori_name.clone(),
                        datatype: fi.datatype,
                    },
                )
            })
            .collect()
    }
}

/// What a worker needs to know about one sample.
#[derive(Debug, Clone)]
pub struct LeafInfo {
    pub original_id: String,
    pub genus: String,
    pub species: String,
    pub ori_name: String,
    pub datatype: DataType,
}

pub type LeafCatalog = AHashMap<String, LeafInfo>;

/// The three disjoint sample sets of one (group, gene) tree.
#[derive(Debug, Clone, Default)]
pub struct DatasetPartition {
    pub query: BTreeSet<String>,
    pub outgroup: BTreeSet<String>,
    pub db: BTreeSet<String>,
}

impl DatasetPartition {
    /// `db` is recomputed as every db sample minus outgroup minus query, since
    /// upstream clustering can leave sequences in both lists.
    pub fn from_dataset(dataset: &Dataset, group: &str, gene: &str) -> Self {
        let partition = dataset
            .partitions
            .get(group)
            .and_then(|genes| genes.get(gene));

        let query: BTreeSet<String> = partition
            .map(|p| p.query.iter().cloned().collect())
            .unwrap_or_default();
        let outgroup: BTreeSet<String> = partition
            .map(|p| p.outgroup.iter().cloned().collect())
            .unwrap_or_default();

        let db = dataset
            .funinfo
            .values()
            .filter(|fi| fi.datatype == DataType::Db)
            .map(|fi| fi.hash.clone())
            .filter(|hash| !outgroup.contains(hash) && !query.contains(hash))
            .collect();

        Self { query, outgroup, db }
    }
}

/// One tree leaf as carried inside a collapsed clade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub hash: String,
    /// Display label (original id)
    pub label: String,
    /// Raw genus-species description of the sample
    pub species_original: String,
}

/// Species part of a taxon key. Decided once when the label is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpeciesLabel {
    /// A literal epithet, e.g. "hypoxylon"
    Named(String),
    /// "sp. N"
    Ambiguous(u32),
    /// Several fragments joined by "/", e.g. "hypoxylon/sp. 3"
    Composite { named: Vec<String>, ambiguous: Vec<u32> },
}

fn parse_placeholder(fragment: &str) -> Option<u32> {
    fragment.strip_prefix("sp.")?.trim().parse().ok()
}

impl SpeciesLabel {
    pub fn parse(label: &str) -> Self {
        let mut named = Vec::new();
        let mut ambiguous = Vec::new();
        for fragment in label.split('/').map(str::trim).filter(|f| !f.is_empty()) {
            match parse_placeholder(fragment) {
                Some(n) => ambiguous.push(n),
                None => named.push(fragment.to_string()),
            }
        }
        Self::from_fragments(named, ambiguous)
    }

    pub fn from_fragments(
        named: impl IntoIterator<Item = String>,
        ambiguous: impl IntoIterator<Item = u32>,
    ) -> Self {
        let named: Vec<String> = named
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let ambiguous: Vec<u32> = ambiguous
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        match (named.len(), ambiguous.len()) {
            (0, 0) => Self::Named(String::new()),
            (1, 0) => Self::Named(named.into_iter().next().unwrap_or_default()),
            (0, 1) => Self::Ambiguous(ambiguous[0]),
            _ => Self::Composite { named, ambiguous },
        }
    }

    /// True when the rendered label starts with "sp.", i.e. no literal name in it.
    pub fn is_placeholder(&self) -> bool {
        match self {
            Self::Named(_) => false,
            Self::Ambiguous(_) => true,
            Self::Composite { named, .. } => named.is_empty(),
        }
    }

    /// True when any fragment is a "sp. N" placeholder.
    pub fn has_placeholder(&self) -> bool {
        match self {
            Self::Named(_) => false,
            Self::Ambiguous(_) => true,
            Self::Composite { ambiguous, .. } => !ambiguous.is_empty(),
        }
    }

    pub fn placeholder_numbers(&self) -> Vec<u32> {
        match self {
            Self::Named(_) => Vec::new(),
            Self::Ambiguous(n) => vec![*n],
            Self::Composite { ambiguous, .. } => ambiguous.clone(),
        }
    }

    pub fn named_fragments(&self) -> Vec<String> {
        match self {
            Self::Named(name) if !name.is_empty() => vec![name.clone()],
            Self::Named(_) | Self::Ambiguous(_) => Vec::new(),
            Self::Composite { named, .. } => named.clone(),
        }
    }

    /// Every placeholder number moved up by `adder`.
    pub fn shifted(&self, adder: u32) -> Self {
        match self {
            Self::Named(_) => self.clone(),
            Self::Ambiguous(n) => Self::Ambiguous(n + adder),
            Self::Composite { named, ambiguous } => Self::Composite {
                named: named.clone(),
                ambiguous: ambiguous.iter().map(|n| n + adder).collect(),
            },
        }
    }
}

impl fmt::Display for SpeciesLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{}", name),
            Self::Ambiguous(n) => write!(f, "sp. {}", n),
            Self::Composite { named, ambiguous } => {
                let mut sp: Vec<String> = ambiguous.iter().map(|n| format!("sp. {}", n)).collect();
                sp.sort();
                let parts: Vec<&str> = named
                    .iter()
                    .map(String::as_str)
                    .chain(sp.iter().map(String::as_str))
                    .collect();
                write!(f, "{}", parts.join("/"))
            }
        }
    }
}

/// (genus, species-label) key of a collapse map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaxonKey {
    pub genus: String,
    pub species: SpeciesLabel,
    /// Appended as " N" when two clades would otherwise share a key
    pub disambiguator: Option<u32>,
}

impl TaxonKey {
    pub fn new(genus: impl Into<String>, species: SpeciesLabel) -> Self {
        Self {
            genus: genus.into(),
            species,
            disambiguator: None,
        }
    }

    pub fn named(genus: impl Into<String>, species: impl Into<String>) -> Self {
        Self::new(genus, SpeciesLabel::Named(species.into()))
    }

    pub fn ambiguous(genus: impl Into<String>, number: u32) -> Self {
        Self::new(genus, SpeciesLabel::Ambiguous(number))
    }

    pub fn with_disambiguator(mut self, n: u32) -> Self {
        self.disambiguator = Some(n);
        self
    }

    /// Species part as rendered, including any disambiguator.
    pub fn label(&self) -> String {
        match self.disambiguator {
            Some(n) => format!("{} {}", self.species, n),
            None => self.species.to_string(),
        }
    }
}

impl fmt::Display for TaxonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.genus, self.label())
    }
}

/// One collapsed clade.
#[derive(Debug, Clone)]
pub struct CollapseGroup {
    pub leaves: Vec<Leaf>,
    /// Back-reference to the owning key
    pub taxon: TaxonKey,
    /// Topologically ambiguous clade
    pub flat: bool,
    /// Number of taxa merged into this clade
    pub ambiguous: u32,
}

impl CollapseGroup {
    pub fn leaf_hashes(&self) -> impl Iterator<Item = &str> {
        self.leaves.iter().map(|leaf| leaf.hash.as_str())
    }
}

/// taxon key -> every clade collapsed under it.
pub type CollapseMap = BTreeMap<TaxonKey, Vec<CollapseGroup>>;

/// Output of one interpretation unit.
#[derive(Debug, Clone)]
pub struct TreeResult {
    pub group: String,
    pub gene: String,
    pub tree: Tree,
    pub collapse: CollapseMap,
}

impl TreeResult {
    pub fn is_concatenated(&self) -> bool {
        self.gene == CONCATENATED
    }

    pub fn genera(&self) -> BTreeSet<String> {
        self.collapse.keys().map(|key| key.genus.clone()).collect()
    }

    /// Sorted multiset of leaf hashes over all clades.
    pub fn leaf_hashes(&self) -> Vec<String> {
        let mut hashes: Vec<String> = self
            .collapse
            .values()
            .flatten()
            .flat_map(|group| group.leaf_hashes().map(str::to_string))
            .collect();
        hashes.sort();
        hashes
    }
}

/// One row of identification output per (sample, gene).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleReport {
    pub id: String,
    pub hash: String,
    pub group: String,
    pub gene: String,
    pub species_original: String,
    pub species_assigned: String,
    pub ambiguous: u32,
    pub flat: bool,
}
