// Storage File Reader Tests for cellfile
// These tests cover streaming and prefetching readers sharing one block cache

use cellfile::cache::{BlockCache, CacheKey, DeserializerRegistry};
use cellfile::config::{AccessMode, ReaderOptions, WriterOptions};
use cellfile::sfile::{BlockDeserializers, CacheConfig, Cell, StorageFileReader, StorageFileWriter};
use cellfile::types::{Order, OrderedFloat64, RawBytes};
use cellfile::{Error, Result};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, n: usize) -> PathBuf {
    let path = dir.join(name);
    let options = WriterOptions::default().block_size(256).expected_keys(n);
    let mut writer = StorageFileWriter::create(&path, options).unwrap();
    for i in 0..n {
        writer.add(key(i).as_bytes(), value(i).as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    path
}

fn key(i: usize) -> String {
    format!("row{:06}", i)
}

fn value(i: usize) -> String {
    format!("value-{}", i)
}

fn shared_cache() -> (Arc<BlockCache>, Arc<BlockDeserializers>) {
    let registry = Arc::new(DeserializerRegistry::new());
    let kinds = BlockDeserializers::register(registry);
    (Arc::new(BlockCache::new(64 * 1024 * 1024)), kinds)
}

fn wait_for_prefetch(reader: &StorageFileReader) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !reader.is_prefetch_complete() {
        assert!(Instant::now() < deadline, "prefetch did not finish");
        thread::sleep(Duration::from_millis(5));
    }
}

fn cached_offsets(cache: &BlockCache, file: &str) -> Vec<u64> {
    cache.entries().into_iter().filter(|(k, _)| k.file.as_ref() == file).map(|(k, _)| k.offset).collect()
}

/// Test that closing a streaming reader leaves the prefetching reader's blocks cached
#[test]
fn test_stream_close_keeps_shared_blocks() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.sf", 400);
    let (cache, kinds) = shared_cache();
    let config = CacheConfig::new(Arc::clone(&cache), kinds);

    let prefetch = StorageFileReader::open(
        &path,
        config.clone(),
        ReaderOptions::prefetch().prefetch_on_open(true),
    )
    .unwrap();
    assert_eq!(prefetch.mode(), AccessMode::Prefetch);
    wait_for_prefetch(&prefetch);

    // Every data block plus the index and bloom blocks
    let resident = cached_offsets(&cache, prefetch.file_name()).len();
    assert_eq!(resident, prefetch.num_blocks() + 2);

    let stream = StorageFileReader::open(&path, config.clone(), ReaderOptions::default()).unwrap();
    assert_eq!(stream.get(key(10).as_bytes()).unwrap().as_deref(), Some(value(10).as_bytes()));
    stream.close(true).unwrap();
    assert_eq!(cached_offsets(&cache, prefetch.file_name()).len(), resident);

    cache.reset_stats();
    for i in (0..400).step_by(37) {
        assert_eq!(prefetch.get(key(i).as_bytes()).unwrap().as_deref(), Some(value(i).as_bytes()));
    }
    let stats = cache.stats();
    assert!(stats.hits > 0);
    assert_eq!(stats.misses, 0);

    prefetch.close(false).unwrap();
}

/// Test that closing a prefetching reader with evict only evicts its own file
#[test]
fn test_prefetch_close_evicts_only_its_file() {
    env_logger::try_init().ok();
    let dir = TempDir::new().unwrap();
    let path_a = write_file(dir.path(), "a.sf", 300);
    let path_b = write_file(dir.path(), "b.sf", 300);
    let (cache, kinds) = shared_cache();
    let config = CacheConfig::new(Arc::clone(&cache), kinds);

    let reader_a =
        StorageFileReader::open(&path_a, config.clone(), ReaderOptions::prefetch().prefetch_on_open(true))
            .unwrap();
    let reader_b = StorageFileReader::open(&path_b, config.clone(), ReaderOptions::default()).unwrap();
    assert_eq!(reader_b.scanner().count(), 300);
    wait_for_prefetch(&reader_a);

    let file_a = reader_a.file_name().to_string();
    let file_b = reader_b.file_name().to_string();
    let b_before = cached_offsets(&cache, &file_b);
    assert!(!cached_offsets(&cache, &file_a).is_empty());
    assert!(!b_before.is_empty());

    reader_a.close(true).unwrap();
    assert!(cached_offsets(&cache, &file_a).is_empty());
    assert_eq!(cached_offsets(&cache, &file_b), b_before);

    // The other reader keeps working from the cache
    assert_eq!(reader_b.get(key(5).as_bytes()).unwrap().as_deref(), Some(value(5).as_bytes()));
    reader_b.close(false).unwrap();
}

/// Test that the cache config's evict flag applies to prefetching readers
#[test]
fn test_evict_on_close_from_config() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.sf", 100);
    let (cache, kinds) = shared_cache();
    let config = CacheConfig::new(Arc::clone(&cache), kinds).evict_on_close(true);

    let reader = StorageFileReader::open(&path, config.clone(), ReaderOptions::prefetch()).unwrap();
    assert_eq!(reader.scanner().count(), 100);
    reader.close(false).unwrap();
    assert!(cache.is_empty());

    // Streaming readers never evict
    let reader = StorageFileReader::open(&path, config, ReaderOptions::default()).unwrap();
    assert_eq!(reader.scanner().count(), 100);
    reader.close(false).unwrap();
    assert!(!cache.is_empty());
}

/// Test the closed state for both access modes
#[test]
fn test_closed_reader_rejects_everything() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.sf", 50);
    let (cache, kinds) = shared_cache();

    for options in [ReaderOptions::default(), ReaderOptions::prefetch()] {
        let config = CacheConfig::new(Arc::clone(&cache), Arc::clone(&kinds));
        let reader = StorageFileReader::open(&path, config, options).unwrap();
        reader.close(false).unwrap();

        assert!(matches!(reader.get(b"row000001"), Err(Error::InvalidState(_))));
        assert!(matches!(reader.may_contain(b"row000001"), Err(Error::InvalidState(_))));
        assert!(matches!(reader.smallest_key(), Err(Error::InvalidState(_))));
        assert!(matches!(reader.close(true), Err(Error::InvalidState(_))));
        assert!(reader.is_prefetch_complete());
    }
}

/// Test an unbounded prefetch depth reads ahead to the end of the file
#[test]
fn test_prefetch_depth_at_usize_max() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.sf", 600);
    let (cache, kinds) = shared_cache();
    let config = CacheConfig::new(Arc::clone(&cache), kinds);

    let options = ReaderOptions::prefetch().prefetch_depth(usize::MAX);
    assert!(options.validate().is_ok());
    let reader = StorageFileReader::open(&path, config, options).unwrap();
    assert!(reader.num_blocks() > 2);

    assert_eq!(reader.scanner().count(), 600);
    assert_eq!(reader.get(key(599).as_bytes()).unwrap().as_deref(), Some(value(599).as_bytes()));
    wait_for_prefetch(&reader);
    assert_eq!(cached_offsets(&cache, reader.file_name()).len(), reader.num_blocks() + 2);
    reader.close(false).unwrap();
}

/// Test dropping an unclosed prefetching reader stops its worker
#[test]
fn test_drop_without_close() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.sf", 500);
    let (cache, kinds) = shared_cache();
    let config = CacheConfig::new(Arc::clone(&cache), kinds);

    let reader =
        StorageFileReader::open(&path, config.clone(), ReaderOptions::prefetch().prefetch_on_open(true))
            .unwrap();
    drop(reader);

    // The file is still readable by a new reader
    let reader = StorageFileReader::open(&path, config, ReaderOptions::default()).unwrap();
    assert_eq!(reader.scanner().count(), 500);
}

/// Test concurrent point reads through one prefetching reader
#[test]
fn test_concurrent_readers() {
    let dir = TempDir::new().unwrap();
    let n = 1000;
    let path = write_file(dir.path(), "a.sf", n);
    let (cache, kinds) = shared_cache();
    let config = CacheConfig::new(Arc::clone(&cache), kinds);

    let prefetch = Arc::new(StorageFileReader::open(&path, config.clone(), ReaderOptions::prefetch()).unwrap());
    let stream = Arc::new(StorageFileReader::open(&path, config, ReaderOptions::default()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let reader = if t % 2 == 0 { Arc::clone(&prefetch) } else { Arc::clone(&stream) };
            thread::spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..200 {
                    let i = rng.random_range(0..n);
                    let found = reader.get(key(i).as_bytes()).unwrap();
                    assert_eq!(found.as_deref(), Some(value(i).as_bytes()));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    prefetch.close(false).unwrap();
    stream.close(false).unwrap();
}

/// Test typed cells written through codecs come back in value order
#[test]
fn test_typed_cells_scan_in_value_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("typed.sf");
    let keys = OrderedFloat64::new(Order::Descending);
    let values = RawBytes::new(Order::Ascending);

    // Descending keys must be added largest value first
    let prices = [1000.0, 255.0, 1.5, 0.0, -0.5, -255.0];
    let mut writer = StorageFileWriter::create(&path, WriterOptions::default()).unwrap();
    for price in prices {
        writer.add_cell(&keys, &price, &values, format!("p{}", price).as_bytes()).unwrap();
    }
    writer.finish().unwrap();

    let (cache, kinds) = shared_cache();
    let reader = StorageFileReader::open(&path, CacheConfig::new(cache, kinds), ReaderOptions::default()).unwrap();
    let cells: Vec<Cell> = reader.scanner().collect::<Result<_>>().unwrap();
    let decoded: Vec<f64> = cells.iter().map(|c| c.decode_key(&keys).unwrap()).collect();
    assert_eq!(decoded, prices.to_vec());
    assert_eq!(cells[1].decode_value(&values).unwrap(), b"p255".to_vec());
}

/// Test that a truncated file is rejected at open
#[test]
fn test_truncated_file() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.sf", 100);
    let data = std::fs::read(&path).unwrap();
    std::fs::write(&path, &data[..data.len() - 10]).unwrap();

    let (cache, kinds) = shared_cache();
    let err = StorageFileReader::open(&path, CacheConfig::new(cache, kinds), ReaderOptions::default()).unwrap_err();
    assert!(err.is_corruption());
}

/// Test a repeated read is served from the cache under the file's key
#[test]
fn test_cache_hit_avoids_file_read() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.sf", 100);
    let (cache, kinds) = shared_cache();
    let reader = StorageFileReader::open(&path, CacheConfig::new(Arc::clone(&cache), kinds), ReaderOptions::default())
        .unwrap();

    assert!(reader.get(key(3).as_bytes()).unwrap().is_some());
    let first_block = cache
        .entries()
        .into_iter()
        .map(|(k, _)| k)
        .find(|k| k.offset == 0)
        .unwrap();
    assert_eq!(first_block, CacheKey::new(reader.file_name(), 0));

    cache.reset_stats();
    assert!(reader.get(key(3).as_bytes()).unwrap().is_some());
    assert_eq!(cache.stats().hits, 1);
}
