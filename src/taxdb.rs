//src/taxdb.rs

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Parses a genus list file, one genus per line. Only the first
/// tab-separated field is used, so a taxDB-style dump works as well:
/// ```text
/// <genus>[\t<anything>]
/// ```
/// Blank lines and `#` comments are skipped.
pub fn parse_genus_list<P: AsRef<Path>>(filepath: P) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    let reader = BufReader::new(file);

    let mut genera = Vec::new();
    for line_result in reader.lines() {
        let line = line_result?;
        let genus = line.split('\t').next().unwrap_or_default().trim();
        if genus.is_empty() || genus.starts_with('#') {
            continue;
        }
        genera.push(genus.to_string());
    }
    genera.sort();
    genera.dedup();
    Ok(genera)
}

/// Pulls "Genus species" out of a free-form sample description.
///
/// The first word that matches a known genus wins, together with the word
/// after it ("sp." keeps a following number, e.g. "Xylaria sp. 3"). Without a
/// known genus the first capitalized word is taken as the genus. Returns an
/// empty string when nothing looks like a name.
pub fn get_genus_species(description: &str, genus_list: &[String]) -> String {
    let words: Vec<&str> = description
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|w| !w.is_empty())
        .collect();

    let position = words
        .iter()
        .position(|w| genus_list.iter().any(|g| g == w))
        .or_else(|| {
            words.iter().position(|w| {
                let mut chars = w.chars();
                chars.next().is_some_and(char::is_uppercase)
                    && chars.all(|c| c.is_lowercase())
            })
        });

    let Some(pos) = position else {
        return String::new();
    };

    let genus = words[pos];
    match words.get(pos + 1) {
        Some(&"sp.") | Some(&"sp") => match words.get(pos + 2) {
            Some(n) if n.chars().all(|c| c.is_ascii_digit()) => format!("{} sp. {}", genus, n),
            _ => format!("{} sp.", genus),
        },
        Some(species) => format!("{} {}", genus, species),
        None => genus.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genera() -> Vec<String> {
        vec!["Daldinia".to_string(), "Xylaria".to_string()]
    }

    #[test]
    fn test_get_genus_species_known_genus() {
        assert_eq!(
            get_genus_species("KX123 Xylaria hypoxylon CBS 122", &genera()),
            "Xylaria hypoxylon"
        );
        assert_eq!(
            get_genus_species("AB001_Xylaria_sp._4_strain", &genera()),
            "Xylaria sp. 4"
        );
        assert_eq!(get_genus_species("Q12 Daldinia sp.", &genera()), "Daldinia sp.");
    }

    #[test]
    fn test_get_genus_species_fallback() {
        assert_eq!(
            get_genus_species("MN22 Hypoxylon fragiforme", &genera()),
            "Hypoxylon fragiforme"
        );
        assert_eq!(get_genus_species("QUERY_0001", &genera()), "");
    }

    #[test]
    fn test_parse_genus_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genus.txt");
        std::fs::write(&path, "Xylaria\t5\n# comment\n\nDaldinia\nXylaria\n").unwrap();
        assert_eq!(parse_genus_list(&path).unwrap(), genera());
    }
}
