//! Property tests
//!
//! - Converting any valid value to the editor tree and back is lossless
//! - Emitted patches always reproduce the session value
//! - Undoing everything restores the loaded value

use folio_editor::model::{apply_all_json, document_from_json, document_to_json, Patch, Schema};
use folio_editor::{
    from_internal, to_internal, EditorChange, EditorConfig, EditorSession, IdentityCache, ManualClock, Point, Range,
};
use proptest::prelude::*;
use serde_json::{json, Value as Json};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum ChildSpec {
    Span {
        text: String,
        marks: Vec<&'static str>,
        linked: bool,
    },
    Mention(String),
}

#[derive(Debug, Clone)]
enum BlockSpec {
    Text {
        style: Option<&'static str>,
        list: Option<(&'static str, u32)>,
        link: Option<String>,
        extra: Option<String>,
        children: Vec<ChildSpec>,
    },
    Image(String),
}

fn child_spec() -> impl Strategy<Value = ChildSpec> {
    prop_oneof![
        3 => (
            "[a-zA-Z ]{0,8}",
            prop::sample::subsequence(vec!["strong", "em", "code"], 0..=3),
            any::<bool>(),
        )
            .prop_map(|(text, marks, linked)| ChildSpec::Span { text, marks, linked }),
        1 => "[a-z]{1,6}".prop_map(ChildSpec::Mention),
    ]
}

fn block_spec() -> impl Strategy<Value = BlockSpec> {
    prop_oneof![
        4 => (
            prop::option::of(prop_oneof![Just("normal"), Just("h1"), Just("blockquote")]),
            prop::option::of((prop_oneof![Just("bullet"), Just("number")], 1..4u32)),
            prop::option::of("https://[a-z]{1,8}\\.com"),
            prop::option::of("[a-z]{1,6}"),
            prop::collection::vec(child_spec(), 1..5),
        )
            .prop_map(|(style, list, link, extra, children)| BlockSpec::Text {
                style,
                list,
                link,
                extra,
                children,
            }),
        1 => "image-[0-9]{1,3}".prop_map(BlockSpec::Image),
    ]
}

/// Canonical JSON for generated blocks; keys are derived from positions
fn document(blocks: &[BlockSpec]) -> Json {
    let blocks = blocks.iter().enumerate().map(|(b, spec)| match spec {
        BlockSpec::Image(asset) => json!({"_key": format!("b{b}"), "_type": "image", "asset": {"_ref": asset}}),
        BlockSpec::Text {
            style,
            list,
            link,
            extra,
            children,
        } => {
            let link_key = format!("b{b}l");
            let children: Vec<Json> = children
                .iter()
                .enumerate()
                .map(|(c, child)| match child {
                    ChildSpec::Span { text, marks, linked } => {
                        let mut marks: Vec<String> = marks.iter().map(|m| m.to_string()).collect();
                        if *linked && link.is_some() {
                            marks.push(link_key.clone());
                        }
                        json!({"_key": format!("b{b}c{c}"), "_type": "span", "text": text, "marks": marks})
                    }
                    ChildSpec::Mention(user) => json!({"_key": format!("b{b}c{c}"), "_type": "mention", "user": user}),
                })
                .collect();
            let mark_defs: Vec<Json> = link
                .iter()
                .map(|href| json!({"_key": link_key, "_type": "link", "href": href}))
                .collect();

            let mut block = json!({
                "_key": format!("b{b}"), "_type": "block", "markDefs": mark_defs, "children": children
            });
            if let Some(style) = style {
                block["style"] = json!(style);
            }
            if let Some((list_item, level)) = list {
                block["listItem"] = json!(list_item);
                block["level"] = json!(level);
            }
            if let Some(extra) = extra {
                block["note"] = json!(extra);
            }
            block
        }
    });
    Json::Array(blocks.collect())
}

#[derive(Debug, Clone)]
enum Action {
    Select(usize, usize, usize, usize),
    Type(String),
    Backspace,
    Break,
    Mark(&'static str),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..3usize, 0..12usize, 0..3usize, 0..12usize).prop_map(|(b1, o1, b2, o2)| Action::Select(b1, o1, b2, o2)),
        "[a-z ]{1,4}".prop_map(Action::Type),
        Just(Action::Backspace),
        Just(Action::Break),
        prop_oneof![Just("strong"), Just("em")].prop_map(Action::Mark),
    ]
}

fn initial() -> Json {
    json!([
        {"_key": "a", "_type": "block", "style": "normal", "markDefs": [],
         "children": [{"_key": "a1", "_type": "span", "text": "Hello world", "marks": []}]},
        {"_key": "b", "_type": "block", "style": "normal", "markDefs": [],
         "children": [{"_key": "b1", "_type": "span", "text": "Second", "marks": ["em"]}]}
    ])
}

fn run(actions: &[Action]) -> (EditorSession, Vec<Patch>) {
    let clock = Arc::new(ManualClock::new(0));
    let mut session = EditorSession::with_clock(EditorConfig::default(), "prop", clock);
    session.set_value(Some(initial())).unwrap();
    session.select(Some(Range::collapsed(Point::new(0, 0, 0)))).unwrap();

    let patches = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&patches);
    session.subscribe(move |change| {
        if let EditorChange::Mutation { patches } = change {
            sink.lock().unwrap().extend(patches.iter().cloned());
        }
    });

    for action in actions {
        let result = match action {
            Action::Select(b1, o1, b2, o2) => session.select(Some(Range::new(
                Point::new(*b1, 0, *o1),
                Point::new(*b2, 0, *o2),
            ))),
            Action::Type(text) => session.insert_text(text),
            Action::Backspace => session.delete_backward(),
            Action::Break => session.insert_break(),
            Action::Mark(mark) => session.toggle_mark(mark),
        };
        result.unwrap();
    }
    let patches = patches.lock().unwrap().clone();
    (session, patches)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_conversion_round_trips(blocks in prop::collection::vec(block_spec(), 0..6)) {
        let schema = Schema::default();
        let json = document(&blocks);
        let value = document_from_json(json.clone(), &schema).unwrap();

        let mut cache = IdentityCache::new();
        let tree = to_internal(Some(value.as_slice()), &mut cache);
        let back = from_internal(&tree, &schema, &mut cache).unwrap();

        prop_assert_eq!(&back, &value);
        prop_assert_eq!(document_to_json(&back), json);
    }

    #[test]
    fn prop_patches_reproduce_the_value(actions in prop::collection::vec(action(), 1..20)) {
        let (session, patches) = run(&actions);
        let outcome = apply_all_json(Some(initial()), &patches);
        prop_assert!(outcome.failures.is_empty(), "failures: {:?}", outcome.failures);
        prop_assert_eq!(outcome.value, session.value_json());
    }

    #[test]
    fn prop_undo_everything_restores_the_initial_value(actions in prop::collection::vec(action(), 1..12)) {
        let (mut session, _) = run(&actions);
        while session.undo().unwrap() {}
        prop_assert_eq!(session.value_json(), Some(initial()));
    }
}
