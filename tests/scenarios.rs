//! End-to-end scenarios exercising the full stack: repository state
//! machine, interval overwrite semantics, branch/merge (clean and
//! conflicting), corruption detection, and config boundary projection.

use std::collections::BTreeMap;

use igit_core::byte_map::{ByteMap, MemoryByteMap};
use igit_core::error::IgitError;
use igit_core::object::{Object, User};
use igit_core::odb::ObjectDb;
use igit_core::repo::Repository;
use igit_core::tokenize::Value;
use igit_core::transform::{Compression, Encryption, Serializer, TransformPipeline};
use igit_core::tree::{ConfigTree, IntervalTree, Tree, TreeKey, TreeVariant};

fn pipeline() -> TransformPipeline {
    TransformPipeline::new(Serializer::Json, Compression::None, Encryption::None)
}

fn user() -> User {
    User { username: "alice".into(), email: "alice@example.com".into() }
}

/// S1 (linear commits): init repo; LabelTree `{x: 1}`; add; commit "c1";
/// mutate to `{x: 1, y: 2}`; add; commit "c2"; checkout c1; working tree
/// equals `{x: 1}`.
#[test]
fn s1_linear_commits_checkout_restores_prior_snapshot() {
    let objects = MemoryByteMap::new();
    let refs = MemoryByteMap::new();
    let mut repo = Repository::init(&objects, &refs, pipeline(), user(), "main", TreeVariant::Label);

    repo.working_tree_mut().put(TreeKey::Label("x".into()), Value::Int(1)).unwrap();
    repo.add(None).unwrap();
    let c1 = repo.commit("c1", None, None).unwrap();

    repo.working_tree_mut().put(TreeKey::Label("y".into()), Value::Int(2)).unwrap();
    repo.add(None).unwrap();
    repo.commit("c2", None, None).unwrap();

    repo.checkout(&c1.key, false).unwrap();
    assert_eq!(repo.working_tree().get(&TreeKey::Label("x".into())), Some(Value::Int(1)));
    assert_eq!(repo.working_tree().get(&TreeKey::Label("y".into())), None);
}

/// S2 (interval overwrite): `put([1,10), 9)`; `put([5,20), 11)`;
/// `get(2)==9`, `get(7)==11`, `get(15)==11`.
#[test]
fn s2_interval_overwrite_chops_the_older_write() {
    let mut tree = IntervalTree::new();
    tree.put(1, 10, Value::Int(9));
    tree.put(5, 20, Value::Int(11));

    assert_eq!(tree.get_point(2), Some(&Value::Int(9)));
    assert_eq!(tree.get_point(7), Some(&Value::Int(11)));
    assert_eq!(tree.get_point(15), Some(&Value::Int(11)));
}

/// S3 (branch & merge, no conflict): commit base `{a:1, b:2}`; branch B
/// modifies to `{a:1, b:3}`; branch C modifies to `{a:9, b:2}`; merge C
/// into B yields `{a:9, b:3}` and a 2-parent commit.
#[test]
fn s3_non_overlapping_branch_edits_merge_cleanly() {
    let objects = MemoryByteMap::new();
    let refs = MemoryByteMap::new();
    let mut repo = Repository::init(&objects, &refs, pipeline(), user(), "main", TreeVariant::Label);

    repo.working_tree_mut().put(TreeKey::Label("a".into()), Value::Int(1)).unwrap();
    repo.working_tree_mut().put(TreeKey::Label("b".into()), Value::Int(2)).unwrap();
    repo.add(None).unwrap();
    repo.commit("base", None, None).unwrap();

    repo.branch("B").unwrap();
    repo.branch("C").unwrap();

    repo.checkout("B", false).unwrap();
    repo.working_tree_mut().put(TreeKey::Label("b".into()), Value::Int(3)).unwrap();
    repo.add(None).unwrap();
    repo.commit("B edits b", None, None).unwrap();

    repo.checkout("C", false).unwrap();
    repo.working_tree_mut().put(TreeKey::Label("a".into()), Value::Int(9)).unwrap();
    repo.add(None).unwrap();
    repo.commit("C edits a", None, None).unwrap();

    repo.checkout("B", false).unwrap();
    let merge_commit = repo.merge("C", "merge C into B").unwrap().unwrap();

    assert_eq!(repo.working_tree().get(&TreeKey::Label("a".into())), Some(Value::Int(9)));
    assert_eq!(repo.working_tree().get(&TreeKey::Label("b".into())), Some(Value::Int(3)));

    let stored = repo.odb().get_ref(&merge_commit).unwrap();
    assert_eq!(stored.as_commit().unwrap().parents.len(), 2);
}

/// S4 (merge conflict): from base `{a:1}`; B sets `a=2`; C sets `a=3`;
/// merging fails `MergeConflict` with path `[a]`.
#[test]
fn s4_overlapping_branch_edits_fail_merge_conflict() {
    let objects = MemoryByteMap::new();
    let refs = MemoryByteMap::new();
    let mut repo = Repository::init(&objects, &refs, pipeline(), user(), "main", TreeVariant::Label);

    repo.working_tree_mut().put(TreeKey::Label("a".into()), Value::Int(1)).unwrap();
    repo.add(None).unwrap();
    repo.commit("base", None, None).unwrap();

    repo.branch("B").unwrap();
    repo.branch("C").unwrap();

    repo.checkout("B", false).unwrap();
    repo.working_tree_mut().put(TreeKey::Label("a".into()), Value::Int(2)).unwrap();
    repo.add(None).unwrap();
    repo.commit("B sets a=2", None, None).unwrap();

    repo.checkout("C", false).unwrap();
    repo.working_tree_mut().put(TreeKey::Label("a".into()), Value::Int(3)).unwrap();
    repo.add(None).unwrap();
    repo.commit("C sets a=3", None, None).unwrap();

    repo.checkout("B", false).unwrap();
    match repo.merge("C", "merge C into B") {
        Err(IgitError::MergeConflict { paths }) => assert_eq!(paths, vec!["a".to_string()]),
        other => panic!("expected MergeConflict, got {other:?}"),
    }
}

/// S5 (corruption detection): write an object; externally flip one byte
/// of its stored payload; `get(key)` raises `DataCorruption`.
#[test]
fn s5_flipped_byte_on_disk_is_detected_as_corruption() {
    let backing = MemoryByteMap::new();
    let odb = ObjectDb::new(&backing, pipeline());
    let reference = odb.put(&Object::Blob(Value::Str("hello world".into()))).unwrap();

    let sharded_key = format!("objects/{}/{}", &reference.key[..2], &reference.key[2..]);
    let mut bytes = backing.get(&sharded_key).unwrap();
    let pos = bytes.iter().position(|&b| b == b'h').expect("payload byte present");
    bytes[pos] ^= 0x20; // toggles ASCII case, stays valid JSON text
    backing.put(&sharded_key, &bytes).unwrap();

    match odb.get(&reference.key) {
        Err(IgitError::DataCorruption { .. }) => {}
        other => panic!("expected DataCorruption, got {other:?}"),
    }
}

/// S6 (config boundaries): `gain: {[1,10)=A, [10,100)=B}`, `rate:
/// {[1,5)=X, [5,100)=Y}`; `split_on_boundaries(1,20)` yields
/// `[1,5){gain:A,rate:X}, [5,10){gain:A,rate:Y}, [10,20){gain:B,rate:Y}`.
#[test]
fn s6_config_boundaries_project_joint_refinement() {
    let mut gain = IntervalTree::new();
    gain.put(1, 10, Value::Str("A".into()));
    gain.put(10, 100, Value::Str("B".into()));

    let mut rate = IntervalTree::new();
    rate.put(1, 5, Value::Str("X".into()));
    rate.put(5, 100, Value::Str("Y".into()));

    let mut config = ConfigTree::new();
    config.put("gain", Value::Tree(Box::new(Tree::IntInterval(gain)))).unwrap();
    config.put("rate", Value::Tree(Box::new(Tree::IntInterval(rate)))).unwrap();

    let partitions = config.split_on_boundaries(1, 20, &["gain", "rate"]);
    let expected = vec![
        (1, 5, BTreeMap::from([("gain".to_string(), Value::Str("A".into())), ("rate".to_string(), Value::Str("X".into()))])),
        (5, 10, BTreeMap::from([("gain".to_string(), Value::Str("A".into())), ("rate".to_string(), Value::Str("Y".into()))])),
        (10, 20, BTreeMap::from([("gain".to_string(), Value::Str("B".into())), ("rate".to_string(), Value::Str("Y".into()))])),
    ];
    assert_eq!(partitions, expected);
}
