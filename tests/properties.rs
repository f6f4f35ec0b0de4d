use std::collections::HashSet;
use std::io::Write;

use annalist_store::finder::{IdentityComparator, SelectorContext};
use annalist_store::model::migrate_values;
use annalist_store::util::{continuation_chain_url, continuation_url_chain, make_type_entity_id, uri_with_params};
use annalist_store::{
    open_site, Collection, EntityValues, Kind, Scope, Selector, StoreConfig,
};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

fn values(v: Value) -> EntityValues {
    match v {
        Value::Object(m) => m,
        other => panic!("expected object, got {other}"),
    }
}

fn setup() -> (TempDir, Collection) {
    let dir = tempdir().unwrap();
    let site = open_site(Some(StoreConfig::new(dir.path()))).unwrap();
    site.initialize("Property site").unwrap();
    let coll = site.create_collection("testcoll", EntityValues::new()).unwrap();
    (dir, coll)
}

#[test]
fn load_after_create_returns_migrated_values() {
    let (_dir, coll) = setup();
    let cases = [
        ("t1", "e1", json!({"rdfs:label": "plain", "test:list": [1, 2, 3]})),
        (
            "_field",
            "f1",
            json!({"annal:field_render_type": "Slug", "annal:property_uri": "test:p", "rdfs:comment": "help"}),
        ),
        ("_list", "l1", json!({"annal:list_fields": [{"annal:field_id": "Entity_id"}]})),
    ];
    for (type_id, id, v) in cases {
        let parent = coll.parent_for(type_id).unwrap();
        let kind = Kind::for_type_id(type_id);
        parent.create_child(kind.clone(), id, values(v.clone())).unwrap();
        let loaded = parent.load_child(kind.clone(), id, Scope::Coll).unwrap().unwrap();
        let loaded = loaded.values().unwrap();

        let mut expected = values(v);
        expected.insert("annal:id".into(), json!(id));
        expected.insert("annal:type_id".into(), json!(kind.type_id()));
        expected.insert("@id".into(), json!(kind.def().self_ref));
        expected.insert("@type".into(), json!([kind.type_uri()]));
        let expected = migrate_values(&kind, expected);
        for (key, value) in &expected {
            assert_eq!(loaded.get(key), Some(value), "{type_id}/{id}: {key}");
        }
    }
}

#[test]
fn exists_iff_load_returns_value() {
    let (_dir, coll) = setup();
    coll.add_entity("t1", "present", EntityValues::new()).unwrap();
    let parent = coll.parent_for("t1").unwrap();
    let kind = Kind::for_type_id("t1");
    for id in ["present", "absent", "_initial_values"] {
        let exists = parent.child_exists(kind.clone(), id, Scope::All);
        let loaded = parent.load_child(kind.clone(), id, Scope::All).unwrap();
        assert_eq!(exists, loaded.is_some(), "{id}");
    }
}

#[test]
fn type_entity_ids_are_unique_within_collection() {
    let (_dir, coll) = setup();
    coll.add_entity("t1", "x", EntityValues::new()).unwrap();
    coll.add_entity("t2", "x", EntityValues::new()).unwrap();
    coll.add_entity("t1", "y", EntityValues::new()).unwrap();
    coll.add_view("x", EntityValues::new()).unwrap();

    let mut seen = HashSet::new();
    for type_id in ["t1", "t2", "_view"] {
        for e in coll.entities(type_id, Scope::Coll).unwrap() {
            assert!(seen.insert(make_type_entity_id(e.type_id(), e.id())));
        }
    }
    assert_eq!(seen.len(), 4);
}

#[test]
fn migration_is_idempotent() {
    let inputs = [
        (Kind::Field, json!({"annal:field_render": "Slug", "annal:field_target_type": "test:x"})),
        (Kind::Field, json!({"annal:field_render_type": "RepeatGroup", "annal:group_ref": "g1"})),
        (Kind::Field, json!({"annal:field_render_type": "Text", "rdfs:comment": "c"})),
        (Kind::List, json!({"annal:list_fields": [{"annal:field_id": "Field_render"}]})),
        (Kind::Type, json!({"rdfs:label": "unchanged"})),
    ];
    for (kind, v) in inputs {
        let once = migrate_values(&kind, values(v));
        let twice = migrate_values(&kind, once.clone());
        assert_eq!(once, twice, "{kind}");
    }
}

#[test]
fn compiled_selectors_are_total() {
    let selectors = [
        "ALL",
        "",
        "'a' == [rdfs:label]",
        "[annal:type_id] == view[annal:record_type]",
        "'test:t' in [@type]",
        "[@type] subtype test:t",
        "nope[x] == [missing]",
    ];
    let entities = [
        json!({}),
        json!({"@type": "not-a-list", "rdfs:label": 3}),
        json!({"@type": [null, {"x": 1}], "annal:type_id": ["t"]}),
        json!({"rdfs:label": "a", "annal:type_id": "t1"}),
    ];
    let contexts = [
        SelectorContext::new(),
        values(json!({"view": {"annal:record_type": "t1"}})),
        values(json!({"view": "not an object"})),
    ];
    for source in selectors {
        let selector = Selector::parse(source).unwrap();
        for entity in &entities {
            let entity = values(entity.clone());
            for context in &contexts {
                let _ = selector.select(&entity, context, &IdentityComparator);
            }
        }
    }
}

#[test]
fn continuation_chain_round_trips() {
    let inner = uri_with_params("/annalist/c/coll/l/", &[("search", Some("x y")), ("scope", Some("all"))]);
    let outer = uri_with_params("/annalist/c/coll/v/Default_view/t1/e1/", &[("continuation_url", Some(&inner))]);
    for url in ["/annalist/c/coll/d/", inner.as_str(), outer.as_str()] {
        assert_eq!(continuation_chain_url(&continuation_url_chain(url)), url);
    }
}

#[test]
fn collection_scope_is_subset_of_all() {
    let (_dir, coll) = setup();
    let sitedata = coll.site().site_data().unwrap();
    sitedata.add_field("Site_field", EntityValues::new()).unwrap();
    sitedata.add_field("Shared_field", values(json!({"rdfs:label": "site"}))).unwrap();
    coll.add_field("Shared_field", values(json!({"rdfs:label": "local"}))).unwrap();
    coll.add_field("Local_field", EntityValues::new()).unwrap();

    let local: HashSet<String> = coll.entity_ids("_field", Scope::Coll).unwrap().into_iter().collect();
    let all: HashSet<String> = coll.entity_ids("_field", Scope::All).unwrap().into_iter().collect();
    let site: HashSet<String> = coll.entity_ids("_field", Scope::Site).unwrap().into_iter().collect();
    assert!(local.is_subset(&all));
    let overlay_only: HashSet<String> = site.difference(&local).cloned().collect();
    let extra: HashSet<String> = all.difference(&local).cloned().collect();
    assert_eq!(extra, overlay_only);
    assert_eq!(extra, HashSet::from(["Site_field".to_string()]));

    let shared = coll.get_field("Shared_field").unwrap().unwrap();
    assert_eq!(shared.label(), "local");
}

#[test]
fn rename_preserves_values_and_attachments() {
    let (_dir, coll) = setup();
    let original = coll
        .add_entity("t1", "e1", values(json!({"rdfs:label": "Keep", "test:n": 7, "test:l": ["a", "b"]})))
        .unwrap();
    original.create_resource("notes.txt").unwrap().write_all(b"attached").unwrap();
    let before = original.values().unwrap().clone();
    let url_before = original.url().to_string();

    let renamed = coll.rename_entity("t1", "e1", "e2").unwrap();
    let after = renamed.values().unwrap();
    for (key, value) in &before {
        if key == "annal:id" || key == "annal:url" {
            continue;
        }
        assert_eq!(after.get(key), Some(value), "{key}");
    }
    assert_eq!(after["annal:id"], "e2");
    assert_eq!(renamed.attachments().unwrap(), vec!["notes.txt".to_string()]);
    assert_ne!(renamed.url(), url_before);
}
