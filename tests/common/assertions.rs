//! Object store inspection helpers

use batch_export::Record;
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::path::Path;

/// All keys in the store, sorted
pub async fn list_keys(store: &dyn ObjectStore) -> Vec<String> {
    let mut keys: Vec<String> = store
        .list(None)
        .map_ok(|meta| meta.location.to_string())
        .try_collect()
        .await
        .unwrap();
    keys.sort();
    keys
}

/// Raw object body
pub async fn read_object(store: &dyn ObjectStore, key: &str) -> Vec<u8> {
    store
        .get(&Path::from(key))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap()
        .to_vec()
}

/// Records of a batched (JSON array) object
pub async fn read_batch(store: &dyn ObjectStore, key: &str) -> Vec<Record> {
    serde_json::from_slice(&read_object(store, key).await).unwrap()
}

/// Records of a streamed (NDJSON) object, one per line
pub async fn read_ndjson(store: &dyn ObjectStore, key: &str) -> Vec<Record> {
    let body = String::from_utf8(read_object(store, key).await).unwrap();
    body.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// `id` column of each record, in order
pub fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap())
        .collect()
}
