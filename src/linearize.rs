use std::collections::HashMap;

use crate::archive::Entry;
use crate::natsort;

enum Node {
    Dir(Dir),
    Leaf(Entry),
}

/// Directory node: children in insertion order; only subdirectories are keyed.
#[derive(Default)]
struct Dir {
    children: Vec<(String, Node)>,
    subdirs: HashMap<String, usize>,
}

impl Dir {
    fn subdir(&mut self, segment: &str) -> &mut Dir {
        let slot = match self.subdirs.get(segment) {
            Some(&slot) => slot,
            None => {
                self.children
                    .push((segment.to_string(), Node::Dir(Dir::default())));
                let slot = self.children.len() - 1;
                self.subdirs.insert(segment.to_string(), slot);
                slot
            }
        };
        match &mut self.children[slot].1 {
            Node::Dir(dir) => dir,
            Node::Leaf(_) => unreachable!("subdirectory index points at a leaf"),
        }
    }

    fn insert(&mut self, entry: Entry) {
        let (parents, name) = match entry.path.rsplit_once('/') {
            Some((parents, name)) => (Some(parents), name.to_string()),
            None => (None, entry.path.clone()),
        };
        let mut dir = self;
        for segment in parents.into_iter().flat_map(|p| p.split('/')) {
            dir = dir.subdir(segment);
        }
        dir.children.push((name, Node::Leaf(entry)));
    }

    fn walk(self, out: &mut Vec<Entry>) {
        let mut leaves = Vec::new();
        let mut subdirs = Vec::new();
        for (name, node) in self.children {
            match node {
                Node::Leaf(entry) => leaves.push((name, entry)),
                Node::Dir(dir) => subdirs.push(dir),
            }
        }

        // stable: ties keep the path-sorted insertion order
        leaves.sort_by(|(a, _), (b, _)| natsort::compare(stem(a), stem(b), true));
        out.extend(leaves.into_iter().map(|(_, entry)| entry));

        for dir in subdirs {
            dir.walk(out);
        }
    }
}

/// File name without its final extension; names without a `.` are kept whole.
fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}

/// Order entries for streaming. The result depends only on the set of paths,
/// never on the order the archive stores them in.
///
/// Entries are sorted by path structure, inserted into a directory tree, and
/// the tree is walked depth-first pre-order: the files of a directory,
/// naturally sorted by name with the extension ignored, come before anything
/// in its subdirectories. So a top-level "main" file stays ahead of tracks
/// nested in a subdirectory, and `track1.bin, track2.BIN, track10.bin` stay
/// together even when a dump mixes extensions.
pub fn linearize(entries: &[Entry]) -> Vec<Entry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| natsort::compare_paths(&a.path, &b.path));

    let mut root = Dir::default();
    for entry in sorted {
        root.insert(entry);
    }

    let mut order = Vec::with_capacity(entries.len());
    root.walk(&mut order);
    order
}

/// Sizes of a linearized sequence, in order.
pub fn sizes(order: &[Entry]) -> Vec<u64> {
    order.iter().map(|e| e.size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(paths: &[&str]) -> Vec<Entry> {
        paths
            .iter()
            .enumerate()
            .map(|(i, p)| Entry {
                path: p.to_string(),
                size: i as u64,
            })
            .collect()
    }

    fn paths(order: &[Entry]) -> Vec<&str> {
        order.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_natural_order_ignores_extension() {
        let order = linearize(&entries(&["track10.bin", "track2.BIN", "track1.bin"]));
        assert_eq!(paths(&order), vec!["track1.bin", "track2.BIN", "track10.bin"]);
    }

    #[test]
    fn test_extension_does_not_split_groups() {
        // with the extension kept, "game (" would sort before "game."
        let order = linearize(&entries(&["game (Track 2).bin", "game.cue", "game (Track 1).bin"]));
        assert_eq!(
            paths(&order),
            vec!["game.cue", "game (Track 1).bin", "game (Track 2).bin"]
        );
    }

    #[test]
    fn test_top_level_file_precedes_subdirectories() {
        let order = linearize(&entries(&["audio/a.bin", "main.bin"]));
        assert_eq!(paths(&order), vec!["main.bin", "audio/a.bin"]);

        let order = linearize(&entries(&["a/z.bin", "zzz.bin", "b/c/d.bin", "b/x.bin"]));
        assert_eq!(paths(&order), vec!["zzz.bin", "a/z.bin", "b/x.bin", "b/c/d.bin"]);
    }

    #[test]
    fn test_pre_order_within_nested_dirs() {
        let order = linearize(&entries(&[
            "disc/tracks/t2.raw",
            "disc/tracks/t1.raw",
            "disc/main.iso",
            "disc/extra/readme",
        ]));
        assert_eq!(
            paths(&order),
            vec![
                "disc/main.iso",
                "disc/extra/readme",
                "disc/tracks/t1.raw",
                "disc/tracks/t2.raw",
            ]
        );
    }

    #[test]
    fn test_sibling_dirs_in_natural_order() {
        let order = linearize(&entries(&["cd10/a", "cd2/a", "cd1/a"]));
        assert_eq!(paths(&order), vec!["cd1/a", "cd2/a", "cd10/a"]);
    }

    #[test]
    fn test_independent_of_member_order() {
        let forward = entries(&["b/2.bin", "a.bin", "b/10.bin", "B.bin", "c/d/e.bin", "b/1.bin"]);
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut rotated = forward.clone();
        rotated.rotate_left(2);

        let expected = linearize(&forward);
        assert_eq!(linearize(&reversed), expected);
        assert_eq!(linearize(&rotated), expected);
        assert_eq!(expected.len(), forward.len());
    }

    #[test]
    fn test_names_without_extension_compare_whole() {
        let order = linearize(&entries(&["b", "a.txt", "c"]));
        assert_eq!(paths(&order), vec!["a.txt", "b", "c"]);
    }

    #[test]
    fn test_file_and_dir_with_same_name() {
        let order = linearize(&entries(&["x/inner.bin", "x"]));
        assert_eq!(paths(&order), vec!["x", "x/inner.bin"]);
    }

    #[test]
    fn test_sizes_follow_order() {
        let order = linearize(&entries(&["b.bin", "a.bin"]));
        assert_eq!(sizes(&order), vec![1, 0]);
    }

    #[test]
    fn test_empty() {
        assert!(linearize(&[]).is_empty());
    }
}
