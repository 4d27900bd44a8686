use crate::patch::Patch;

/// Drop patches whose effect is fully overwritten later in the batch.
///
/// - consecutive `set` patches at the same path keep only the later one
/// - the last whole-document `unset` absorbs every patch before it
pub fn compact(patches: &[Patch]) -> Vec<Patch> {
    let start = patches
        .iter()
        .rposition(Patch::is_document_unset)
        .unwrap_or(0);

    let mut out: Vec<Patch> = Vec::with_capacity(patches.len() - start);
    for patch in &patches[start..] {
        if let (Some(Patch::Set { path: prev, .. }), Patch::Set { path, .. }) = (out.last(), patch) {
            if prev == path {
                out.pop();
            }
        }
        out.push(patch.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{insert, set, unset, InsertPosition};
    use crate::path::Path;
    use serde_json::json;

    fn text_path() -> Path {
        Path::child("a", "s1").with("text")
    }

    #[test]
    fn test_consecutive_sets_collapse() {
        let patches = vec![set("H", text_path()), set("He", text_path()), set("Hel", text_path())];
        assert_eq!(compact(&patches), vec![set("Hel", text_path())]);
    }

    #[test]
    fn test_non_adjacent_sets_are_kept() {
        let patches = vec![
            set("H", text_path()),
            insert(vec![json!({"_key": "b"})], InsertPosition::After, Path::block("a")),
            set("He", text_path()),
        ];
        assert_eq!(compact(&patches).len(), 3);
    }

    #[test]
    fn test_trailing_document_unset_absorbs() {
        let patches = vec![set("H", text_path()), unset(Path::block("a")), unset(Path::root())];
        assert_eq!(compact(&patches), vec![unset(Path::root())]);
    }

    #[test]
    fn test_idempotent() {
        let patches = vec![
            set("a", text_path()),
            unset(Path::root()),
            set("b", text_path()),
            set("c", text_path()),
            unset(Path::block("a")),
        ];
        let once = compact(&patches);
        assert_eq!(compact(&once), once);
        assert_eq!(once.len(), 3);
    }
}
