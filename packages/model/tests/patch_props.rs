//! Property tests over patch batches

use folio_model::patch::{insert, set, set_if_missing, unset};
use folio_model::{apply_all_json, compact, InsertPosition, Patch, Path};
use proptest::prelude::*;
use serde_json::{json, Value as Json};

fn document() -> Json {
    json!([{
        "_key": "a", "_type": "block", "style": "normal", "markDefs": [],
        "children": [{"_key": "s1", "_type": "span", "text": "Hello", "marks": []}]
    }])
}

fn patch() -> impl Strategy<Value = Patch> {
    let text_path = || Path::child("a", "s1").with("text");
    prop_oneof![
        4 => "[a-z]{0,6}".prop_map(move |text| set(text, text_path())),
        1 => Just(unset(Path::root())),
        1 => Just(set_if_missing(document(), Path::root())),
        1 => "[a-z]{3}".prop_map(|key| insert(
            vec![json!({"_key": key, "_type": "block", "children": []})],
            InsertPosition::After,
            Path::block("a"),
        )),
        1 => Just(unset(Path::child("a", "s1"))),
    ]
}

proptest! {
    #[test]
    fn prop_compact_is_idempotent(patches in prop::collection::vec(patch(), 0..24)) {
        let once = compact(&patches);
        prop_assert_eq!(compact(&once), once.clone());
        prop_assert!(once.len() <= patches.len());
    }

    #[test]
    fn prop_compact_keeps_the_final_value(patches in prop::collection::vec(patch(), 0..24)) {
        let full = apply_all_json(Some(document()), &patches);
        let compacted = apply_all_json(Some(document()), &compact(&patches));
        prop_assert_eq!(full.value, compacted.value);
    }

    #[test]
    fn prop_wire_format_round_trips(patches in prop::collection::vec(patch(), 1..8)) {
        let wire = serde_json::to_string(&patches).unwrap();
        let parsed: Vec<Patch> = serde_json::from_str(&wire).unwrap();
        prop_assert_eq!(parsed, patches);
    }
}
