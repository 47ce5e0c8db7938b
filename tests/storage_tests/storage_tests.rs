//! Tests for Storage
//!
//! These tests verify:
//! - add / get / delete / delete_childs through the path index
//! - Validation failures leave nothing behind
//! - New containers are created when the existing ones are full
//! - Restart restores every committed blob
//! - Integrity checks detect corrupted content
//! - Config files and JSON stats

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use atlasblob::{AtlasError, Config, Container, FileStub, Storage, Strategy};
use tempfile::TempDir;

const KIB: u64 = 1024;

// =============================================================================
// Helper Functions
// =============================================================================

fn config(path: &Path, container_size: u64) -> Config {
    Config::builder()
        .data_dir(path)
        .container_size(container_size)
        .dump_interval(Duration::ZERO)
        .build()
}

fn setup_storage(container_size: u64) -> (TempDir, Storage) {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::open(config(temp_dir.path(), container_size)).unwrap();
    (temp_dir, storage)
}

fn payload(size: usize, seed: u8) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn put(storage: &Storage, name: &str, data: &[u8]) {
    storage
        .add(name, Cursor::new(data.to_vec()), data.len() as u64)
        .unwrap();
}

fn read(storage: &Storage, name: &str) -> Option<Vec<u8>> {
    storage
        .get(name)
        .unwrap()
        .map(|mut reader| reader.read_all().unwrap())
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_directory_and_container() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("blobs");
    assert!(!path.exists());

    let storage = Storage::open(config(&path, 64 * KIB)).unwrap();

    assert!(path.is_dir());
    assert_eq!(storage.container_count(), 1);
    assert!(Container::data_path_for(&path, 1).exists());
    assert!(storage.index().is_empty());
}

#[test]
fn test_open_rejects_zero_container_size() {
    let temp_dir = TempDir::new().unwrap();
    let result = Storage::open(config(temp_dir.path(), 0));
    assert!(matches!(result, Err(AtlasError::Config(_))));
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.container_size, 1024 * 1024 * 1024);
    assert_eq!(config.dump_interval, Duration::from_secs(60));
}

#[test]
fn test_load_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("atlasblob.json");
    fs::write(&path, r#"{ "data_dir": "/srv/blobs", "dump_interval": 5 }"#).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.data_dir, Path::new("/srv/blobs"));
    assert_eq!(config.dump_interval, Duration::from_secs(5));
    assert_eq!(config.container_size, Config::default().container_size);
}

#[test]
fn test_load_config_rejects_bad_files() {
    let temp_dir = TempDir::new().unwrap();

    let missing = Config::load(&temp_dir.path().join("missing.json"));
    assert!(matches!(missing, Err(AtlasError::Config(_))));

    let malformed = temp_dir.path().join("malformed.json");
    fs::write(&malformed, "{ container_size: ").unwrap();
    assert!(matches!(Config::load(&malformed), Err(AtlasError::Config(_))));

    let zero = temp_dir.path().join("zero.json");
    fs::write(&zero, r#"{ "container_size": 0 }"#).unwrap();
    assert!(matches!(Config::load(&zero), Err(AtlasError::Config(_))));
}

// =============================================================================
// Add / Get Tests
// =============================================================================

#[test]
fn test_add_and_get() {
    let (_temp, storage) = setup_storage(1024 * KIB);
    let data = payload(10_000, 3);

    let file = storage
        .add("docs/readme", Cursor::new(data.clone()), data.len() as u64)
        .unwrap();

    assert_eq!(file.name(), "docs/readme");
    assert_eq!(file.size(), 10_000);
    assert_eq!(file.md5(), md5::compute(&data).0);
    assert_eq!(read(&storage, "docs/readme").unwrap(), data);
    assert_eq!(read(&storage, "/docs//readme").unwrap(), data);
}

#[test]
fn test_get_reader_reports_metadata() {
    let (_temp, storage) = setup_storage(1024 * KIB);
    let data = payload(777, 1);
    put(&storage, "a", &data);

    let reader = storage.get("a").unwrap().unwrap();
    assert_eq!(reader.size(), 777);
    assert_eq!(reader.md5(), md5::compute(&data).0);
    assert_eq!(reader.file().name(), "a");
}

#[test]
fn test_get_missing() {
    let (_temp, storage) = setup_storage(64 * KIB);
    assert!(storage.get("nothing").unwrap().is_none());
    assert!(storage.file("nothing").is_none());
}

#[test]
fn test_add_name_is_canonical() {
    let (_temp, storage) = setup_storage(64 * KIB);

    let file = storage.add("/x//y/", Cursor::new(vec![1u8; 4]), 4).unwrap();
    assert_eq!(file.name(), "x/y");
    assert_eq!(storage.list("", 0), vec!["x/y"]);
}

#[test]
fn test_add_zero_size() {
    let (_temp, storage) = setup_storage(64 * KIB);
    let result = storage.add("empty", Cursor::new(Vec::new()), 0);
    assert!(matches!(result, Err(AtlasError::InvalidSize(0))));
}

#[test]
fn test_add_invalid_name() {
    let (_temp, storage) = setup_storage(64 * KIB);
    let result = storage.add("//", Cursor::new(vec![1u8]), 1);
    assert!(matches!(result, Err(AtlasError::InvalidName(_))));
}

#[test]
fn test_add_duplicate() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "a", b"first");

    let result = storage.add("a", Cursor::new(b"second".to_vec()), 6);
    assert!(matches!(result, Err(AtlasError::FileExists(_))));
    assert_eq!(read(&storage, "a").unwrap(), b"first");
    assert_eq!(storage.stats().file_count, 1);
}

#[test]
fn test_add_larger_than_container() {
    let (_temp, storage) = setup_storage(64 * KIB);
    let result = storage.add("big", std::io::repeat(0).take(64 * KIB + 1), 64 * KIB + 1);
    assert!(matches!(result, Err(AtlasError::NoSpace { .. })));
    assert_eq!(storage.container_count(), 1);
}

#[test]
fn test_add_short_stream_released() {
    let (_temp, storage) = setup_storage(64 * KIB);

    let result = storage.add("short", Cursor::new(vec![1u8; 50]), 100);
    assert!(matches!(
        result,
        Err(AtlasError::SizeMismatch { expected: 100, actual: 50 })
    ));

    assert!(storage.get("short").unwrap().is_none());
    let stats = storage.stats();
    assert_eq!(stats.file_count, 0);
    assert_eq!(stats.containers[0].used, 0);
}

#[test]
fn test_add_long_stream_released() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "first", b"keep");

    let result = storage.add("long", Cursor::new(vec![1u8; 101]), 100);
    assert!(matches!(result, Err(AtlasError::SizeMismatch { expected: 100, .. })));

    assert!(storage.get("long").unwrap().is_none());
    let stats = storage.stats();
    assert_eq!(stats.file_count, 1);
    assert_eq!(stats.containers[0].used, 4);
}

#[test]
fn test_new_container_when_full() {
    let (_temp, storage) = setup_storage(16 * KIB);

    put(&storage, "a", &payload(10 * KIB as usize, 1));
    put(&storage, "b", &payload(10 * KIB as usize, 2));
    put(&storage, "c", &payload(5 * KIB as usize, 3));

    assert_eq!(storage.container_count(), 2);
    let a = storage.file("a").unwrap();
    let b = storage.file("b").unwrap();
    let c = storage.file("c").unwrap();
    assert_eq!(a.container_id(), 1);
    assert_eq!(b.container_id(), 2);
    // The remaining 6 KiB of container 1 still fits c
    assert_eq!(c.container_id(), 1);

    assert_eq!(read(&storage, "b").unwrap(), payload(10 * KIB as usize, 2));
}

#[test]
fn test_hole_reused_before_append() {
    let (_temp, storage) = setup_storage(1024 * KIB);

    put(&storage, "a", &payload(1000, 1));
    put(&storage, "b", &payload(1000, 2));
    put(&storage, "c", &payload(1000, 3));
    let offset = storage.file("b").unwrap().offset();
    storage.delete("b").unwrap();

    put(&storage, "d", &payload(900, 4));
    assert_eq!(storage.file("d").unwrap().offset(), offset);
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "a", b"hello");

    storage.delete("a").unwrap();

    assert!(storage.get("a").unwrap().is_none());
    assert_eq!(storage.stats().file_count, 0);
    assert!(matches!(storage.delete("a"), Err(AtlasError::FileNotFound(_))));
}

#[test]
fn test_delete_with_open_reader() {
    let (_temp, storage) = setup_storage(64 * KIB);
    let data = payload(3000, 9);
    put(&storage, "a", &data);
    put(&storage, "b", b"tail");

    let mut reader = storage.get("a").unwrap().unwrap();
    storage.delete("a").unwrap();

    // Gone from the namespace but not yet reclaimed
    assert!(storage.get("a").unwrap().is_none());
    assert_eq!(storage.stats().file_count, 2);

    assert_eq!(reader.read_all().unwrap(), data);
    drop(reader);

    let stats = storage.stats();
    assert_eq!(stats.file_count, 1);
    assert_eq!(stats.hole_count, 1);
}

#[test]
fn test_name_reusable_after_delete() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "a", b"one");
    storage.delete("a").unwrap();
    put(&storage, "a", b"two");

    assert_eq!(read(&storage, "a").unwrap(), b"two");
}

#[test]
fn test_delete_childs() {
    let (_temp, storage) = setup_storage(64 * KIB);
    for name in ["d/a", "d/b", "d/e/f", "dd", "other"] {
        put(&storage, name, name.as_bytes());
    }

    assert_eq!(storage.delete_childs("d").unwrap(), 3);

    assert_eq!(storage.list("", 0), vec!["dd", "other"]);
    assert_eq!(storage.stats().file_count, 2);
    assert_eq!(storage.delete_childs("d").unwrap(), 0);
}

#[test]
fn test_delete_childs_root() {
    let (_temp, storage) = setup_storage(64 * KIB);
    for name in ["a", "b/c"] {
        put(&storage, name, name.as_bytes());
    }

    assert_eq!(storage.delete_childs("").unwrap(), 2);
    assert!(storage.index().is_empty());
    assert_eq!(storage.stats().containers[0].used, 0);
}

// =============================================================================
// Rename / List Tests
// =============================================================================

#[test]
fn test_rename_keeps_content() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "a/old", b"content");

    storage.rename("a/old", "b/new").unwrap();

    assert!(storage.get("a/old").unwrap().is_none());
    assert_eq!(read(&storage, "b/new").unwrap(), b"content");
}

#[test]
fn test_list_depth() {
    let (_temp, storage) = setup_storage(64 * KIB);
    for name in ["p/x", "p/y/z", "q"] {
        put(&storage, name, b"1");
    }

    assert_eq!(storage.list("p", 1), vec!["p/x"]);
    assert_eq!(storage.list("", 0), vec!["p/x", "p/y/z", "q"]);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_restores_files() {
    let temp_dir = TempDir::new().unwrap();
    let cfg = config(temp_dir.path(), 16 * KIB);

    {
        let storage = Storage::open(cfg.clone()).unwrap();
        put(&storage, "a", &payload(10 * KIB as usize, 1));
        put(&storage, "b", &payload(10 * KIB as usize, 2));
        put(&storage, "dir/c", &payload(300, 3));
        put(&storage, "gone", &payload(300, 4));
        storage.delete("gone").unwrap();
        storage.rename("dir/c", "dir/renamed").unwrap();
        storage.close().unwrap();
    }

    let storage = Storage::open(cfg).unwrap();

    assert_eq!(storage.container_count(), 2);
    assert_eq!(storage.list("", 0), vec!["a", "b", "dir/renamed"]);
    assert_eq!(read(&storage, "a").unwrap(), payload(10 * KIB as usize, 1));
    assert_eq!(read(&storage, "b").unwrap(), payload(10 * KIB as usize, 2));
    assert_eq!(read(&storage, "dir/renamed").unwrap(), payload(300, 3));
    assert!(storage.get("gone").unwrap().is_none());
    storage.check().unwrap();

    // Space freed before the restart is still reusable
    put(&storage, "again", &payload(300, 5));
    storage.check().unwrap();
}

#[test]
fn test_dump_writes_dirty_containers() {
    let (temp, storage) = setup_storage(64 * KIB);

    assert_eq!(storage.dump().unwrap(), 1);
    assert_eq!(storage.dump().unwrap(), 0);

    put(&storage, "a", b"x");
    assert_eq!(storage.dump().unwrap(), 1);
    assert!(Container::index_path_for(temp.path(), 1).exists());
}

#[test]
fn test_background_dump() {
    let temp_dir = TempDir::new().unwrap();
    let cfg = Config::builder()
        .data_dir(temp_dir.path())
        .container_size(64 * KIB)
        .dump_interval(Duration::from_millis(20))
        .build();
    let storage = Storage::open(cfg).unwrap();
    put(&storage, "a", b"x");

    let index_path = Container::index_path_for(temp_dir.path(), 1);
    let mut waited = Duration::ZERO;
    while (!index_path.exists() || storage.containers()[0].is_dirty())
        && waited < Duration::from_secs(5)
    {
        std::thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }

    assert!(index_path.exists());
    assert!(!storage.containers()[0].is_dirty());
    storage.close().unwrap();
}

#[test]
fn test_open_fails_on_corrupt_index() {
    let temp_dir = TempDir::new().unwrap();
    let cfg = config(temp_dir.path(), 64 * KIB);
    {
        let storage = Storage::open(cfg.clone()).unwrap();
        put(&storage, "a", b"x");
        storage.close().unwrap();
    }

    fs::write(Container::index_path_for(temp_dir.path(), 1), [3u8, 1]).unwrap();

    assert!(matches!(Storage::open(cfg), Err(AtlasError::Corruption(_))));
}

#[test]
fn test_duplicate_names_keep_newest() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    for (id, time, byte) in [(1u64, 100u64, b'o'), (2, 200, b'n')] {
        let container = Container::create(dir, id, 64 * KIB).unwrap();
        let stub = FileStub {
            name: "dup".to_string(),
            size: 3,
            time,
        };
        let file = container.allocate(&stub, Strategy::Append).unwrap();
        container.fill(&file, Cursor::new(vec![byte; 3])).unwrap();
        container.dump().unwrap();
    }

    let storage = Storage::open(config(dir, 64 * KIB)).unwrap();

    let file = storage.file("dup").unwrap();
    assert_eq!(file.container_id(), 2);
    assert_eq!(read(&storage, "dup").unwrap(), b"nnn");

    // The loser's space was reclaimed
    let stats = storage.stats();
    assert_eq!(stats.file_count, 1);
    assert_eq!(stats.index_count, 1);
}

#[test]
fn test_deleted_file_with_open_reader_not_restored() {
    let temp_dir = TempDir::new().unwrap();
    let cfg = config(temp_dir.path(), 64 * KIB);

    let reader = {
        let storage = Storage::open(cfg.clone()).unwrap();
        put(&storage, "keep", b"kept");
        put(&storage, "gone", &payload(2000, 7));

        let reader = storage.get("gone").unwrap().unwrap();
        storage.delete("gone").unwrap();
        storage.close().unwrap();
        reader
    };
    drop(reader);

    let storage = Storage::open(cfg).unwrap();
    assert_eq!(storage.list("", 0), vec!["keep"]);
    assert!(storage.get("gone").unwrap().is_none());
    assert_eq!(storage.stats().file_count, 1);
    storage.check().unwrap();
}

#[test]
fn test_delete_with_open_reader_marks_dirty() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "a", b"abc");
    put(&storage, "b", b"def");
    storage.dump().unwrap();

    let _reader = storage.get("a").unwrap().unwrap();
    storage.delete("a").unwrap();

    assert!(storage.containers()[0].is_dirty());
    assert_eq!(storage.dump().unwrap(), 1);
}

/// Dumps the store on its first read, as a background dump landing
/// mid-upload would
struct DumpingReader<'a> {
    storage: &'a Storage,
    inner: Cursor<Vec<u8>>,
    dumped: bool,
}

impl Read for DumpingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.dumped {
            self.dumped = true;
            self.storage.dump().unwrap();
        }
        self.inner.read(buf)
    }
}

#[test]
fn test_dump_during_upload_keeps_blob() {
    let temp_dir = TempDir::new().unwrap();
    let cfg = config(temp_dir.path(), 64 * KIB);
    let data = payload(100, 5);

    {
        let storage = Storage::open(cfg.clone()).unwrap();
        put(&storage, "first", b"one");

        let reader = DumpingReader {
            storage: &storage,
            inner: Cursor::new(data.clone()),
            dumped: false,
        };
        storage.add("blob", reader, data.len() as u64).unwrap();

        assert!(storage.containers()[0].is_dirty());
        storage.close().unwrap();
    }

    let storage = Storage::open(cfg).unwrap();
    assert_eq!(storage.list("", 0), vec!["blob", "first"]);
    assert_eq!(read(&storage, "blob").unwrap(), data);
    storage.check().unwrap();
}

#[test]
fn test_stats_serialize_to_json() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "a", &payload(1000, 1));
    put(&storage, "b", &payload(10, 2));
    storage.delete("a").unwrap();

    let json = serde_json::to_value(storage.stats()).unwrap();
    assert_eq!(json["file_count"], 1);
    assert_eq!(json["file_size"], 10);
    assert_eq!(json["hole_count"], 1);
    assert_eq!(json["index_count"], 1);

    let container = &json["containers"][0];
    assert_eq!(container["id"], 1);
    assert_eq!(container["size"], 64 * KIB);
    assert_eq!(container["used"], 1024 + 16);
    assert_eq!(container["dirty"], true);
}

// =============================================================================
// Integrity Tests
// =============================================================================

#[test]
fn test_check_passes() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "a", &payload(5000, 1));
    put(&storage, "b", &payload(100, 2));
    storage.delete("a").unwrap();

    storage.check().unwrap();
}

#[test]
fn test_check_detects_corrupted_content() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "a", &payload(5000, 1));

    let file = storage.file("a").unwrap();
    let container = storage.containers()[0].clone();
    container.write_at(b"garbage", file.offset() + 10).unwrap();

    assert!(matches!(storage.check(), Err(AtlasError::Integrity(_))));
}

// =============================================================================
// Stats Tests
// =============================================================================

#[test]
fn test_stats_totals() {
    let (_temp, storage) = setup_storage(64 * KIB);
    put(&storage, "a", &payload(10, 1));
    put(&storage, "b", &payload(20, 2));
    put(&storage, "c", &payload(4096, 3));
    storage.delete("b").unwrap();

    let stats = storage.stats();
    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.file_size, 10 + 4096);
    assert_eq!(stats.file_real_size, 16 + 4096);
    assert_eq!(stats.hole_count, 1);
    assert_eq!(stats.hole_size, 32);
    assert_eq!(stats.index_count, 2);
    assert_eq!(stats.index_version, 4);
}
