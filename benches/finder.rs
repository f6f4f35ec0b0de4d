use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use tempfile::TempDir;

use annalist_store::finder::{IdentityComparator, SelectorContext};
use annalist_store::{open_site, Collection, EntityFinder, EntityValues, FinderQuery, Selector, StoreConfig};

fn values(v: Value) -> EntityValues {
    match v {
        Value::Object(m) => m,
        _ => EntityValues::new(),
    }
}

fn populated_collection(per_type: usize) -> (TempDir, Collection) {
    let dir = tempfile::tempdir().unwrap();
    let site = open_site(Some(StoreConfig::new(dir.path()))).unwrap();
    site.initialize("bench").unwrap();
    let coll = site.create_collection("bench", EntityValues::new()).unwrap();

    coll.add_type("base", values(json!({"annal:uri": "test:base"}))).unwrap();
    for t in ["a", "b", "c"] {
        coll.add_type(
            t,
            values(json!({
                "annal:uri": format!("test:{t}"),
                "annal:supertype_uris": [{"annal:supertype_uri": "test:base"}]
            })),
        )
        .unwrap();
        let info = coll.type_info(t).unwrap();
        for i in 0..per_type {
            info.create_entity(
                &format!("{t}{i:04}"),
                values(json!({
                    "rdfs:label": format!("Entity {i} of {t}"),
                    "test:even": i % 2 == 0
                })),
            )
            .unwrap();
        }
    }
    (dir, coll)
}

fn bench_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("finder_listing");
    for per_type in [16usize, 128] {
        let (_dir, coll) = populated_collection(per_type);
        let total = per_type * 3;
        group.throughput(Throughput::Elements(total as u64));

        group.bench_with_input(BenchmarkId::new("supertype_sorted", total), &coll, |b, coll| {
            let finder = EntityFinder::new(coll, None).unwrap();
            let query = FinderQuery::new().with_type("base");
            b.iter(|| finder.get_entities_sorted(&query).unwrap().len());
        });

        group.bench_with_input(BenchmarkId::new("selector_and_search", total), &coll, |b, coll| {
            let finder = EntityFinder::new(coll, Some("[@type] subtype test:base")).unwrap();
            let query = FinderQuery::new().with_type("base").with_search("of b");
            b.iter(|| finder.get_entities(&query).unwrap().len());
        });
    }
    group.finish();
}

fn bench_selector(c: &mut Criterion) {
    let selector = Selector::parse("'test:b' in [@type]").unwrap();
    let entity = values(json!({"@type": ["test:a", "test:b", "annal:EntityData"], "rdfs:label": "x"}));
    let context = SelectorContext::new();
    c.bench_function("selector_in_type_list", |b| {
        b.iter(|| selector.select(&entity, &context, &IdentityComparator));
    });
    c.bench_function("selector_compile", |b| {
        b.iter(|| Selector::parse("[annal:type_id] == view[annal:record_type]").unwrap());
    });
}

criterion_group!(benches, bench_listing, bench_selector);
criterion_main!(benches);
