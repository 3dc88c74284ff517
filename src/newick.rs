//src/newick.rs

use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::Path;

use crate::errors::{FunTreeError, Result};
use crate::tree::{NodeId, Tree};

/// Characters that end an unquoted label.
const DELIMITERS: &[u8] = b"(),:;[";

/// Reads a Newick file from disk.
pub fn read_newick_file<P: AsRef<Path>>(path: P) -> Result<Tree> {
    let text = fs::read_to_string(path)?;
    parse_newick(&text)
}

/// Parses a Newick string into an arena tree.
///
/// Accepts branch lengths, internal labels (numeric ones are read as branch
/// support, anything else as a node name), single-quoted labels with `''`
/// escapes and `[...]` comments. Missing lengths read as 0.
pub fn parse_newick(text: &str) -> Result<Tree> {
    let bytes = text.as_bytes();
    let mut tree = Tree::new();
    let mut current = tree.root();
    let mut depth = 0usize;
    let mut i = 0usize;
    let mut finished = false;

    while i < bytes.len() {
        match bytes[i] {
            b'(' => {
                current = tree.add_child(current, None, 0.0);
                depth += 1;
                i += 1;
            }
            b',' => {
                let parent = tree
                    .parent(current)
                    .ok_or_else(|| FunTreeError::newick(i, "sibling outside any clade"))?;
                current = tree.add_child(parent, None, 0.0);
                i += 1;
            }
            b')' => {
                if depth == 0 {
                    return Err(FunTreeError::newick(i, "unbalanced ')'"));
                }
                current = tree
                    .parent(current)
                    .ok_or_else(|| FunTreeError::newick(i, "unbalanced ')'"))?;
                depth -= 1;
                i += 1;
            }
            b':' => {
                i += 1;
                let start = i;
                while i < bytes.len() && !DELIMITERS.contains(&bytes[i]) && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                let raw = &text[start..i];
                let length: f64 = raw
                    .parse()
                    .map_err(|_| FunTreeError::newick(start, format!("invalid branch length '{raw}'")))?;
                tree.node_mut(current).length = length;
            }
            b';' => {
                finished = true;
                break;
            }
            b'[' => {
                let start = i;
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                if i == bytes.len() {
                    return Err(FunTreeError::newick(start, "unterminated comment"));
                }
                i += 1;
            }
            b'\'' => {
                let start = i;
                i += 1;
                let mut label = String::new();
                loop {
                    if i >= bytes.len() {
                        return Err(FunTreeError::newick(start, "unterminated quoted label"));
                    }
                    if bytes[i] == b'\'' {
                        if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                            label.push('\'');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    let ch_len = utf8_len(bytes[i]);
                    label.push_str(&text[i..i + ch_len]);
                    i += ch_len;
                }
                set_label(&mut tree, current, label);
            }
            c if c.is_ascii_whitespace() => {
                i += 1;
            }
            _ => {
                let start = i;
                while i < bytes.len() && !DELIMITERS.contains(&bytes[i]) && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                set_label(&mut tree, current, text[start..i].to_string());
            }
        }
    }

    if depth != 0 {
        return Err(FunTreeError::newick(bytes.len(), "unbalanced '('"));
    }
    if !finished {
        log::debug!("Newick input without terminating ';'");
    }
    Ok(tree)
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b >> 5 == 0b110 => 2,
        b if b >> 4 == 0b1110 => 3,
        _ => 4,
    }
}

fn set_label(tree: &mut Tree, node: NodeId, label: String) {
    if tree.is_leaf(node) {
        tree.node_mut(node).name = Some(label);
    } else if let Ok(support) = label.parse::<f64>() {
        tree.node_mut(node).support = Some(support);
    } else {
        tree.node_mut(node).name = Some(label);
    }
}

fn quote_if_needed(name: &str) -> String {
    let needs_quotes = name
        .bytes()
        .any(|b| DELIMITERS.contains(&b) || b == b']' || b == b'\'' || b.is_ascii_whitespace());
    if needs_quotes {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

/// Serializes the tree back to Newick, lengths on every non-root node.
pub fn write_newick(tree: &Tree) -> String {
    fn write_node(tree: &Tree, id: NodeId, out: &mut String) {
        let children = tree.children(id);
        if !children.is_empty() {
            out.push('(');
            for (n, &child) in children.iter().enumerate() {
                if n > 0 {
                    out.push(',');
                }
                write_node(tree, child, out);
            }
            out.push(')');
        }
        let node = tree.node(id);
        if let Some(name) = &node.name {
            out.push_str(&quote_if_needed(name));
        } else if let Some(support) = node.support {
            let _ = write!(out, "{}", support);
        }
        if node.parent.is_some() {
            let _ = write!(out, ":{}", node.length);
        }
    }

    let mut out = String::new();
    write_node(tree, tree.root(), &mut out);
    out.push(';');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lengths_and_support() {
        let tree = parse_newick("((a:0.1,b:0.2)95:0.3,c:0.4);").unwrap();
        assert_eq!(tree.leaf_names(), vec!["a", "b", "c"]);
        let a = tree.find_leaf("a").unwrap();
        let ab = tree.parent(a).unwrap();
        assert_eq!(tree.node(ab).support, Some(95.0));
        assert!(tree.node(ab).name.is_none());
        assert!((tree.node(ab).length - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_parse_quoted_and_comments() {
        let tree = parse_newick("('sample one':1,'it''s'[&&NHX:x=1]:2)root;").unwrap();
        assert_eq!(tree.leaf_names(), vec!["sample one", "it's"]);
        assert_eq!(tree.name(tree.root()), Some("root"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_newick("((a,b);"),
            Err(FunTreeError::NewickParse { .. })
        ));
        assert!(parse_newick("(a,b));").is_err());
        assert!(parse_newick("(a:x,b);").is_err());
        assert!(parse_newick("('a,b);").is_err());
    }

    #[test]
    fn test_write_keeps_topology() {
        let source = "((a:0.1,b:0.2)95:0.3,'c d':0.4);";
        let tree = parse_newick(source).unwrap();
        let written = write_newick(&tree);
        assert_eq!(written, source);
        let again = parse_newick(&written).unwrap();
        assert_eq!(again.leaf_names(), tree.leaf_names());
    }
}
