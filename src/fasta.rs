// src/fasta.rs
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use flate2::read::MultiGzDecoder;

/// Fallback used when no alignment is available.
pub const DEFAULT_ZERO: f64 = 1e-6;

/// Minimal FASTA read function that also supports .gz
/// Returns `id -> sequence` (id = first word of the header), in file order.
pub fn read_fasta_records<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<(String, String)>> {
    let path = path.as_ref();
    let f = File::open(path)?;

    // If the file ends with ".gz", wrap it in a MultiGzDecoder
    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };

    let mut records: Vec<(String, String)> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end();
        if let Some(header) = line.strip_prefix('>') {
            let id = header.split_whitespace().next().unwrap_or_default();
            records.push((id.to_string(), String::new()));
        } else if let Some((_, seq)) = records.last_mut() {
            seq.push_str(line.trim());
        }
        // Sequence lines before the first header are skipped
    }

    Ok(records)
}

/// Distances below which two leaves cannot be told apart.
#[derive(Debug, Clone)]
pub struct ZeroDistance {
    /// Branch-length threshold, half of one substitution per site
    pub zero: f64,
    /// Sequence hash -> index of its identical-sequence class
    identity_class: AHashMap<String, usize>,
}

impl Default for ZeroDistance {
    fn default() -> Self {
        Self {
            zero: DEFAULT_ZERO,
            identity_class: AHashMap::new(),
        }
    }
}

impl ZeroDistance {
    pub fn from_records(records: &[(String, String)]) -> Self {
        let length = records.iter().map(|(_, seq)| seq.len()).max().unwrap_or(0);
        if length == 0 {
            return Self::default();
        }

        let mut classes: BTreeMap<String, usize> = BTreeMap::new();
        let mut identity_class = AHashMap::with_capacity(records.len());
        for (id, seq) in records {
            let normalized = seq.to_ascii_uppercase();
            let next = classes.len();
            let class = *classes.entry(normalized).or_insert(next);
            identity_class.insert(id.clone(), class);
        }

        Self {
            zero: 0.5 / length as f64,
            identity_class,
        }
    }

    /// Loads the trimmed alignment; a missing or unreadable file falls back to
    /// `DEFAULT_ZERO` with no identity information.
    pub fn from_alignment<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match read_fasta_records(path) {
            Ok(records) if !records.is_empty() => Self::from_records(&records),
            Ok(_) => {
                log::warn!("Empty alignment {}, using default zero distance", path.display());
                Self::default()
            }
            Err(err) => {
                log::warn!(
                    "Cannot read alignment {} ({}), using default zero distance",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    /// True when every hash has the same aligned sequence. Unknown hashes never match.
    pub fn all_identical<'a, I>(&self, hashes: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut class = None;
        for hash in hashes {
            let Some(&c) = self.identity_class.get(hash) else {
                return false;
            };
            match class {
                None => class = Some(c),
                Some(prev) if prev != c => return false,
                Some(_) => {}
            }
        }
        class.is_some()
    }
}
