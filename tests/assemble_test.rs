// ABOUTME: Diff assembly runs against the in-memory object tables
// ABOUTME: Checks the produced change files, integrity failures and repeatability

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use osm_changefeed::assemble::{assemble, AssembleOptions};
use osm_changefeed::osm::ObjectType;
use osm_changefeed::store::{MemoryStore, ObjectRow};
use osm_changefeed::Error;
use tempfile::{tempdir, TempDir};

const TIMESTAMP: &str = "2026-10-17T09:00:00Z";

fn write_log(dir: &TempDir, lines: &[&str]) -> PathBuf {
    let path = dir.path().join("20261017T120000-0-16b2d50.log");
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(&path, text).unwrap();
    path
}

fn options(log_file: &Path, output_dir: &Path) -> AssembleOptions {
    let mut options = AssembleOptions::new(log_file);
    options.output_dir = Some(output_dir.to_path_buf());
    options.generator = "test-generator".to_string();
    options
}

fn read_gz(path: &Path) -> String {
    let mut xml = String::new();
    GzDecoder::new(File::open(path).unwrap())
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

fn row(changeset: i64, visible: bool) -> ObjectRow {
    ObjectRow {
        changeset,
        visible,
        timestamp: TIMESTAMP.to_string(),
        location: None,
    }
}

fn cafe_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store
        .add_changeset(5, 9, "alice")
        .add_node(42, 1, 5, true, TIMESTAMP, 131_000_000, 525_200_000)
        .add_tag(ObjectType::Node, 42, 1, "amenity", "cafe");
    store
}

#[tokio::test]
async fn test_single_node_diff() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let log = write_log(&dir, &["0/16b2d48 1234 N n42 v1 c5", "0/16b2d50 1234 C 1234"]);
    let store = cafe_store();

    let summary = assemble(&store, &options(&log, out.path())).await.unwrap();

    assert_eq!(summary.output, out.path().join("20261017T120000-0-16b2d50.osc.gz"));
    assert_eq!(summary.objects, 1);
    assert_eq!(summary.changesets, 1);
    assert!(store.activity().committed);

    let xml = read_gz(&summary.output);
    assert_eq!(
        xml,
        "<?xml version='1.0' encoding='UTF-8'?>\n\
         <osmChange version=\"0.6\" generator=\"test-generator\">\n\
         <create>\n  \
         <node id=\"42\" version=\"1\" timestamp=\"2026-10-17T09:00:00Z\" \
         uid=\"9\" user=\"alice\" changeset=\"5\" lat=\"52.52\" lon=\"13.1\">\n    \
         <tag k=\"amenity\" v=\"cafe\"/>\n  \
         </node>\n\
         </create>\n\
         </osmChange>\n"
    );
}

#[tokio::test]
async fn test_diff_next_to_log_by_default() {
    let dir = tempdir().unwrap();
    let log = write_log(&dir, &["0/16b2d48 1234 N n42 v1 c5"]);
    let store = cafe_store();

    let mut opts = AssembleOptions::new(&log);
    opts.output_dir = None;
    let summary = assemble(&store, &opts).await.unwrap();

    assert_eq!(summary.output, dir.path().join("20261017T120000-0-16b2d50.osc.gz"));
    assert!(read_gz(&summary.output).contains("generator=\"osm-changefeed/"));
}

#[tokio::test]
async fn test_mixed_objects_keep_log_order_and_children_order() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let log = write_log(
        &dir,
        &[
            "0/10 7 N w10 v2 c5",
            "0/11 7 N r3 v1 c6",
            "0/12 7 C 7",
            "0/13 8 N n42 v4 c6",
            "0/14 8 C 8",
        ],
    );
    let mut store = MemoryStore::new();
    store
        .add_changeset(5, 9, "alice")
        .add_changeset(6, 10, "bob")
        .add_object(ObjectType::Way, 10, 2, row(5, true))
        .add_way_node(10, 2, 3, 300)
        .add_way_node(10, 2, 1, 100)
        .add_way_node(10, 2, 2, 200)
        .add_tag(ObjectType::Way, 10, 2, "highway", "service")
        .add_object(ObjectType::Relation, 3, 1, row(6, true))
        .add_member(3, 1, 1, ObjectType::Way, 10, "outer")
        .add_member(3, 1, 2, ObjectType::Node, 42, "")
        .add_node(42, 4, 6, false, TIMESTAMP, 0, 0);

    let summary = assemble(&store, &options(&log, out.path())).await.unwrap();
    assert_eq!(summary.objects, 3);
    assert_eq!(summary.changesets, 2);

    let xml = read_gz(&summary.output);
    let modify = xml.find("<modify>").unwrap();
    let create = xml.find("<create>").unwrap();
    let delete = xml.find("<delete>").unwrap();
    assert!(modify < create && create < delete);

    let nd100 = xml.find("<nd ref=\"100\"/>").unwrap();
    let nd200 = xml.find("<nd ref=\"200\"/>").unwrap();
    let nd300 = xml.find("<nd ref=\"300\"/>").unwrap();
    assert!(nd100 < nd200 && nd200 < nd300);

    assert!(xml.contains("<member type=\"way\" ref=\"10\" role=\"outer\"/>"));
    assert!(xml.contains("<member type=\"node\" ref=\"42\" role=\"\"/>"));
    assert!(xml.contains(
        "<node id=\"42\" version=\"4\" timestamp=\"2026-10-17T09:00:00Z\" \
         uid=\"10\" user=\"bob\" changeset=\"6\"/>"
    ));
}

#[tokio::test]
async fn test_unknown_changeset_fails_without_output() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let log = write_log(&dir, &["0/10 7 N n42 v1 c77"]);
    let store = cafe_store();

    let err = assemble(&store, &options(&log, out.path())).await.unwrap_err();

    assert!(matches!(err, Error::DataIntegrity(_)));
    assert!(fs::read_dir(out.path()).unwrap().next().is_none());
    assert!(!store.activity().committed);
}

#[tokio::test]
async fn test_missing_object_removes_partial_output() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let log = write_log(&dir, &["0/10 7 N n42 v1 c5", "0/11 7 N n43 v1 c5"]);
    let store = cafe_store();

    let err = assemble(&store, &options(&log, out.path())).await.unwrap_err();

    assert!(matches!(err, Error::DataIntegrity(_)));
    assert!(err.to_string().contains("returned 0 rows"));
    assert!(fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_changeset_out_of_sync_fails_without_output() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let log = write_log(&dir, &["0/10 7 N n42 v1 c6"]);
    let mut store = cafe_store();
    store.add_changeset(6, 10, "bob");

    let err = assemble(&store, &options(&log, out.path())).await.unwrap_err();

    assert!(matches!(err, Error::DataIntegrity(_)));
    assert!(err.to_string().contains("out of sync"));
    assert!(fs::read_dir(out.path()).unwrap().next().is_none());
    assert!(!store.activity().committed);
}

#[tokio::test]
async fn test_malformed_log_is_format_error() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let log = write_log(&dir, &["0/10 7 N n42 v1 c5", "garbage"]);
    let store = cafe_store();

    let err = assemble(&store, &options(&log, out.path())).await.unwrap_err();

    assert!(matches!(err, Error::Format(_)));
    assert_eq!(store.activity().changeset_lookups, Vec::<i64>::new());
}

#[tokio::test]
async fn test_existing_output_is_kept() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let log = write_log(&dir, &["0/10 7 N n42 v1 c5"]);
    let existing = out.path().join("20261017T120000-0-16b2d50.osc.gz");
    fs::write(&existing, b"earlier run").unwrap();
    let store = cafe_store();

    let err = assemble(&store, &options(&log, out.path())).await.unwrap_err();

    assert!(matches!(err, Error::Io { .. }));
    assert_eq!(fs::read(&existing).unwrap(), b"earlier run");
}

#[tokio::test]
async fn test_rerun_is_byte_identical() {
    let dir = tempdir().unwrap();
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    let log = write_log(
        &dir,
        &["0/10 7 N n42 v1 c5", "0/11 7 N n43 v1 c6", "0/12 7 N n44 v1 c5"],
    );
    let mut store = cafe_store();
    store
        .add_changeset(6, 10, "bob")
        .add_node(43, 1, 6, true, TIMESTAMP, 1, 2)
        .add_node(44, 1, 5, true, TIMESTAMP, 3, 4);

    let a = assemble(&store, &options(&log, first.path())).await.unwrap();
    let b = assemble(&store, &options(&log, second.path())).await.unwrap();

    assert_eq!(fs::read(&a.output).unwrap(), fs::read(&b.output).unwrap());
}

#[tokio::test]
async fn test_small_buffer_flushes_often_with_same_content() {
    let dir = tempdir().unwrap();
    let big = tempdir().unwrap();
    let small = tempdir().unwrap();
    let lines: Vec<String> = (1..=20).map(|id| format!("0/{:x} 7 N n{} v2 c5", id, id)).collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    let log = write_log(&dir, &lines);
    let mut store = MemoryStore::new();
    store.add_changeset(5, 9, "alice");
    for id in 1..=20 {
        store.add_node(id, 2, 5, true, TIMESTAMP, id * 10, id * 20);
    }

    let whole = assemble(&store, &options(&log, big.path())).await.unwrap();
    let mut opts = options(&log, small.path());
    opts.buffer_size = 1;
    let chunked = assemble(&store, &opts).await.unwrap();

    assert_eq!(whole.flushes, 1);
    assert_eq!(chunked.flushes, 20);
    let xml = read_gz(&chunked.output);
    assert_eq!(xml, read_gz(&whole.output));
    assert_eq!(xml.matches("<modify>").count(), 1);
    assert_eq!(xml.matches("<node ").count(), 20);
}
