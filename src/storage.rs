//! Storage (C8): hybrid store (in-memory LRU -> KV -> JSON fallback) for
//! built probability trees, with an in-house binary serialisation format
//! and mandatory gzip+base64 encoding for the KV tier.

use std::io::{Cursor, Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lru::LruCache;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::config::{StorageConfig, StorageMode};
use crate::error::{Error, Result};
use crate::model::TokenId;
use crate::tree::{NodeMeta, ProbEntry, ProbabilityNode, WordProbabilityTree};

const TABLE: TableDefinition<'static, &'static str, Vec<u8>> = TableDefinition::new("tree_store");

fn kv_key(anchor: &str) -> String {
    format!("tree:{anchor}")
}

// ---------------------------------------------------------------------
// In-house binary serialisation
// ---------------------------------------------------------------------

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn write_node(buf: &mut Vec<u8>, node: &ProbabilityNode) {
    buf.push(if node.is_empty { 1 } else { 0 });
    if node.is_empty {
        return;
    }
    buf.extend_from_slice(&node.meta.org_max.to_le_bytes());
    buf.extend_from_slice(&node.meta.val_prb_sum.to_le_bytes());
    buf.extend_from_slice(&node.meta.max_dep.to_le_bytes());
    buf.extend_from_slice(&(node.prb.len() as u32).to_le_bytes());
    for (token, entry) in &node.prb {
        buf.extend_from_slice(&token.to_le_bytes());
        match entry {
            ProbEntry::Terminal(p) => {
                buf.push(0);
                buf.extend_from_slice(&p.to_le_bytes());
            }
            ProbEntry::Branch { p, child } => {
                buf.push(1);
                buf.extend_from_slice(&p.to_le_bytes());
                write_node(buf, child);
            }
        }
    }
}

/// Serialise a tree into the crate's in-house little-endian binary shape.
pub fn serialize_tree(tree: &WordProbabilityTree) -> Vec<u8> {
    let mut buf = Vec::new();
    write_string(&mut buf, &tree.anchor);
    buf.extend_from_slice(&tree.frq.to_le_bytes());
    for node in [
        &tree.ana, &tree.ola, &tree.olr, &tree.olx, &tree.prf, &tree.rch, &tree.sln,
    ] {
        write_node(&mut buf, node);
    }
    buf
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::StorageFault("truncated tree payload".to_string()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::StorageFault(format!("invalid utf8 in payload: {e}")))
    }
}

fn read_node(reader: &mut Reader) -> Result<ProbabilityNode> {
    let is_empty = reader.u8()? != 0;
    if is_empty {
        return Ok(ProbabilityNode::empty());
    }
    let org_max = reader.f32()?;
    let val_prb_sum = reader.f32()?;
    let max_dep = reader.u32()?;
    let count = reader.u32()?;
    let mut prb = AHashMap::default();
    for _ in 0..count {
        let token: TokenId = reader.u32()?;
        let kind = reader.u8()?;
        let p = reader.f32()?;
        let entry = match kind {
            0 => ProbEntry::Terminal(p),
            1 => ProbEntry::Branch {
                p,
                child: Box::new(read_node(reader)?),
            },
            _ => return Err(Error::StorageFault(format!("unknown entry kind {kind}"))),
        };
        prb.insert(token, entry);
    }
    Ok(ProbabilityNode::new(
        prb,
        NodeMeta {
            org_max,
            val_prb_sum,
            max_dep,
        },
    ))
}

/// Parse the crate's in-house binary shape back into a tree.
pub fn deserialize_tree(bytes: &[u8]) -> Result<WordProbabilityTree> {
    let mut reader = Reader::new(bytes);
    let anchor = reader.string()?;
    let frq = reader.f64()?;
    let ana = read_node(&mut reader)?;
    let ola = read_node(&mut reader)?;
    let olr = read_node(&mut reader)?;
    let olx = read_node(&mut reader)?;
    let prf = read_node(&mut reader)?;
    let rch = read_node(&mut reader)?;
    let sln = read_node(&mut reader)?;
    Ok(WordProbabilityTree {
        anchor,
        frq,
        ana,
        ola,
        olr,
        olx,
        prf,
        rch,
        sln,
    })
}

fn gzip_compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| Error::StorageFault(e.to_string()))?;
    encoder.finish().map_err(|e| Error::StorageFault(e.to_string()))
}

fn gzip_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(Cursor::new(bytes));
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::StorageFault(e.to_string()))?;
    Ok(out)
}

fn encode_kv_value(tree: &WordProbabilityTree) -> Vec<u8> {
    let raw = serialize_tree(tree);
    let compressed = gzip_compress(&raw).expect("gzip compression of an in-memory buffer cannot fail");
    base64::engine::general_purpose::STANDARD
        .encode(compressed)
        .into_bytes()
}

/// Legacy JSON shape used both by the KV tier's older values and the JSON
/// fallback file: `{serialized: hex, metadata: {size_bytes, compressed,
/// stored_at}}`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredMetadata {
    size_bytes: usize,
    compressed: bool,
    stored_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    serialized: String,
    metadata: StoredMetadata,
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn from_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(Error::StorageFault("odd-length hex string".to_string()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|e| Error::StorageFault(format!("invalid hex: {e}")))
        })
        .collect()
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn legacy_entry_for(tree: &WordProbabilityTree, compress: bool) -> StoredEntry {
    let raw = serialize_tree(tree);
    let (payload, compressed) = if compress {
        (gzip_compress(&raw).unwrap_or(raw.clone()), true)
    } else {
        (raw, false)
    };
    StoredEntry {
        serialized: to_hex(&payload),
        metadata: StoredMetadata {
            size_bytes: payload.len(),
            compressed,
            stored_at: now_unix(),
        },
    }
}

fn decode_kv_value(bytes: &[u8]) -> Result<WordProbabilityTree> {
    // Current format: base64(gzip(binary)).
    if let Ok(text) = std::str::from_utf8(bytes) {
        if let Ok(compressed) = base64::engine::general_purpose::STANDARD.decode(text.trim()) {
            if let Ok(raw) = gzip_decompress(&compressed) {
                if let Ok(tree) = deserialize_tree(&raw) {
                    return Ok(tree);
                }
            }
        }
        // Legacy format: raw JSON { serialized: hex, metadata }.
        if let Ok(entry) = serde_json::from_str::<StoredEntry>(text) {
            let payload = from_hex(&entry.serialized)?;
            let raw = if entry.metadata.compressed {
                gzip_decompress(&payload)?
            } else {
                payload
            };
            return deserialize_tree(&raw);
        }
    }
    Err(Error::StorageFault(
        "KV value is neither current nor legacy tree encoding".to_string(),
    ))
}

// ---------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------

struct JsonFallback {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFallback {
    fn load_all(&self) -> Result<AHashMap<String, StoredEntry>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| Error::StorageFault(format!("json fallback corrupt: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AHashMap::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn get(&self, anchor: &str) -> Result<Option<WordProbabilityTree>> {
        let _guard = self.lock.lock().unwrap();
        let all = self.load_all()?;
        match all.get(anchor) {
            None => Ok(None),
            Some(entry) => {
                let payload = from_hex(&entry.serialized)?;
                let raw = if entry.metadata.compressed {
                    gzip_decompress(&payload)?
                } else {
                    payload
                };
                Ok(Some(deserialize_tree(&raw)?))
            }
        }
    }

    fn put(&self, anchor: &str, tree: &WordProbabilityTree, compress: bool) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut all = self.load_all()?;
        all.insert(anchor.to_string(), legacy_entry_for(tree, compress));
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(&all)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

/// Hybrid cache/store fronting the builder: in-memory LRU, then an
/// embedded KV store, then a JSON fallback file, per spec §4.8.
pub struct Storage {
    mode: StorageMode,
    compression: bool,
    lru: Mutex<LruCache<String, Arc<WordProbabilityTree>>>,
    db: Option<Database>,
    json: Option<JsonFallback>,
}

impl Storage {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.lru_capacity.max(1)).unwrap();
        let db = match config.mode {
            StorageMode::Kv | StorageMode::Hybrid => match &config.kv_path {
                Some(path) => {
                    if let Some(dir) = path.parent() {
                        std::fs::create_dir_all(dir)?;
                    }
                    Some(
                        Database::create(path)
                            .map_err(|e| Error::StorageFault(format!("redb open: {e}")))?,
                    )
                }
                None => None,
            },
            _ => None,
        };
        let json = match config.mode {
            StorageMode::Json | StorageMode::Hybrid => {
                config.json_fallback_path.as_ref().map(|path| JsonFallback {
                    path: path.clone(),
                    lock: Mutex::new(()),
                })
            }
            _ => None,
        };

        Ok(Storage {
            mode: config.mode,
            compression: config.compression,
            lru: Mutex::new(LruCache::new(capacity)),
            db,
            json,
        })
    }

    pub fn memory_only(capacity: usize) -> Self {
        Storage {
            mode: StorageMode::MemoryOnly,
            compression: true,
            lru: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
            db: None,
            json: None,
        }
    }

    pub fn has(&self, anchor: &str) -> bool {
        if self.lru.lock().unwrap().contains(anchor) {
            return true;
        }
        self.get(anchor).map(|o| o.is_some()).unwrap_or(false)
    }

    pub fn get(&self, anchor: &str) -> Result<Option<Arc<WordProbabilityTree>>> {
        if let Some(tree) = self.lru.lock().unwrap().get(anchor) {
            tracing::debug!(anchor, "lru hit");
            return Ok(Some(tree.clone()));
        }

        if let Some(db) = &self.db {
            match self.kv_get(db, anchor) {
                Ok(Some(tree)) => {
                    let arc = Arc::new(tree);
                    self.lru.lock().unwrap().put(anchor.to_string(), arc.clone());
                    return Ok(Some(arc));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(anchor, error = %e, "kv tier read failed, falling back");
                }
            }
        }

        if let Some(json) = &self.json {
            if let Some(tree) = json.get(anchor)? {
                let arc = Arc::new(tree);
                self.lru.lock().unwrap().put(anchor.to_string(), arc.clone());
                return Ok(Some(arc));
            }
        }

        Ok(None)
    }

    fn kv_get(&self, db: &Database, anchor: &str) -> Result<Option<WordProbabilityTree>> {
        let read_txn = db
            .begin_read()
            .map_err(|e| Error::StorageFault(format!("redb begin_read: {e}")))?;
        let table = match read_txn.open_table(TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(Error::StorageFault(format!("redb open_table: {e}"))),
        };
        let key = kv_key(anchor);
        match table
            .get(key.as_str())
            .map_err(|e| Error::StorageFault(format!("redb get: {e}")))?
        {
            Some(value) => Ok(Some(decode_kv_value(&value.value())?)),
            None => Ok(None),
        }
    }

    /// Insert into every enabled stratum. Never called with a tree that
    /// failed validation; the builder discards those before reaching here.
    pub fn put(&self, anchor: &str, tree: Arc<WordProbabilityTree>) -> Result<()> {
        self.lru.lock().unwrap().put(anchor.to_string(), tree.clone());

        if let Some(db) = &self.db {
            let value = if self.compression {
                encode_kv_value(&tree)
            } else {
                serialize_tree(&tree)
            };
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::StorageFault(format!("redb begin_write: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(TABLE)
                    .map_err(|e| Error::StorageFault(format!("redb open_table: {e}")))?;
                table
                    .insert(kv_key(anchor).as_str(), value)
                    .map_err(|e| Error::StorageFault(format!("redb insert: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::StorageFault(format!("redb commit: {e}")))?;
        }

        if let Some(json) = &self.json {
            json.put(anchor, &tree, self.compression)?;
        }

        Ok(())
    }

    /// Bulk-load trees from a JSON fallback-shaped file into the KV tier,
    /// skipping anchors that already exist. Returns `(added, total)`.
    pub fn populate_from_file(&self, path: impl AsRef<Path>) -> Result<(usize, usize)> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|_| Error::ResourceMissing(path.to_path_buf()))?;
        let all: AHashMap<String, StoredEntry> = serde_json::from_str(&text)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let mut added = 0;
        let total = all.len();
        for (anchor, entry) in all {
            if self.has(&anchor) {
                continue;
            }
            let payload = from_hex(&entry.serialized)?;
            let raw = if entry.metadata.compressed {
                gzip_decompress(&payload)?
            } else {
                payload
            };
            let tree = deserialize_tree(&raw)?;
            self.put(&anchor, Arc::new(tree))?;
            added += 1;
        }
        Ok((added, total))
    }
}
