//! EVTR files read back the same trees the builder produced.

use evtree::prelude::*;
use evtree::store::TreeData;
use tempfile::NamedTempFile;

fn kinematics() -> TreeData {
    let reg = TypeRegistry::new();
    let mut b = TreeBuilder::new("Kin");
    b.add_leaf("trig", "trig/O").unwrap();
    b.add_leaf("nJet", "nJet/b").unwrap();
    b.add_leaf("jetPt", "jetPt[nJet]/f").unwrap();
    b.add_leaf("evt", "evt/L").unwrap();
    b.add_leaf("weight", "weight/d").unwrap();
    b.add_object("tags", "std::vector<std::string>", &reg).unwrap();
    for i in 0..20u32 {
        b.fill(|e| {
            let n = i % 3;
            e.set("trig", i % 2 == 0)
                .set("nJet", n)
                .set("jetPt", (0..n).map(|j| 20.0 + j as f32).collect::<Vec<_>>())
                .set("evt", 1_000_000_000_000u64 + i as u64)
                .set("weight", 0.5f64)
                .set("tags", (0..n).map(|j| format!("tag{j}")).collect::<Vec<_>>());
            Ok(())
        })
        .unwrap();
    }
    b.add_alias("pt", "jetPtobj");
    b.build()
}

fn collect(storage: Box<dyn StorageFile>) -> Vec<Vec<Value>> {
    let mut session = FileSession::from_storage(storage, SessionOptions::default()).unwrap();
    let labels = ["trig", "nJet", "pt", "evt", "weight", "tags"];
    let views: Vec<_> = labels
        .iter()
        .map(|label| session.product(label, None).unwrap())
        .collect();
    let cursor = session.cursor_mut("Kin").unwrap();
    let mut rows = Vec::new();
    while cursor.advance().unwrap().is_some() {
        rows.push(views.iter().map(|v| v.value().unwrap()).collect());
    }
    rows
}

#[test]
fn test_file_matches_memory() {
    let mut memory = MemoryFile::new("memory");
    memory.add_tree(kinematics());
    let expected = collect(Box::new(memory));
    assert_eq!(expected.len(), 20);
    assert_eq!(expected[5][0], Value::Bool(false));
    assert_eq!(expected[5][2], Value::List(vec![Value::Float(20.0), Value::Float(21.0)]));
    assert_eq!(expected[5][3], Value::Int(1_000_000_000_005));
    assert_eq!(expected[5][5], Value::List(vec![Value::from("tag0"), Value::from("tag1")]));

    for (level, use_mmap) in [(0, true), (9, true), (9, false)] {
        let file = NamedTempFile::new().unwrap();
        let mut writer = StoreWriter::create(file.path()).unwrap().compression(level);
        writer.add_tree(&kinematics()).unwrap();
        writer.finish().unwrap();

        let store = StoreFile::open_opts(file.path(), use_mmap).unwrap();
        assert_eq!(store.is_mmap(), use_mmap && cfg!(feature = "mmap"));
        assert_eq!(collect(Box::new(store)), expected, "level {level}, mmap {use_mmap}");
    }
}
