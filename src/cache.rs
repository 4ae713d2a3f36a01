//! Checksum-verified LRU cache for resolved messages.
//!
//! Keys bind `(message id, attribute, locale, isolation flag, arguments)`;
//! arguments are reduced to a canonical BLAKE2b-128 hash with explicit
//! type tags so that values which merely compare equal (`1` vs `true` vs
//! `1.0`) can never collide. Entries carry a checksum over their payload
//! and metadata; corruption is detected on read.
//!
//! Policy knobs: strict mode turns silent anomalies (overwrites with
//! different content, corrupted entries) into errors; non-strict mode
//! counts them in [`CacheStats`] and keeps serving.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use lru::LruCache;
use thiserror::Error;

use crate::error::FluentError;
use crate::value::{ArgValue, FluentArgs};
use crate::{CACHE_HASH_NODE_BUDGET, DEFAULT_CACHE_SIZE, DEFAULT_MAX_ENTRY_WEIGHT, MAX_DEPTH};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Bound on the summed weight of all entries.
    pub max_total_weight: usize,
    /// Bound on one entry's weight; heavier results skip caching.
    pub max_entry_weight: usize,
    /// Fail fast on write conflicts and corruption.
    pub strict: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_SIZE,
            max_total_weight: DEFAULT_CACHE_SIZE * DEFAULT_MAX_ENTRY_WEIGHT,
            max_entry_weight: DEFAULT_MAX_ENTRY_WEIGHT,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub unhashable_skips: u64,
    pub oversize_skips: u64,
    pub corruption_detected: u64,
    pub write_once_conflicts: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache entry overwrite with different content (key {key_hash})")]
    WriteConflict { key_hash: String },
    #[error("cache entry failed checksum verification (key {key_hash})")]
    Corruption { key_hash: String },
}

/// Why a set of arguments could not be hashed. The cache skips such calls
/// and counts them; resolution proceeds uncached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArgsHashError {
    #[error("argument nesting exceeds depth limit")]
    DepthExceeded,
    #[error("argument graph exceeds node budget")]
    NodeBudgetExceeded,
}

/// One cached resolution. Immutable once constructed; the checksum covers
/// the formatted value, each error's content hash, and both metadata
/// fields, so tampering with any of them is detectable.
#[derive(Debug, Clone)]
struct CacheEntry {
    formatted: String,
    errors: Vec<FluentError>,
    checksum: [u8; 16],
    key_hash: [u8; 16],
    created_at: u64,
    sequence: u64,
}

impl CacheEntry {
    fn weight(&self) -> usize {
        entry_weight(&self.formatted, &self.errors)
    }
}

fn entry_weight(formatted: &str, errors: &[FluentError]) -> usize {
    formatted.chars().count() + errors.iter().map(|e| e.message.chars().count()).sum::<usize>()
}

fn checksum(formatted: &str, errors: &[FluentError], created_at: u64, sequence: u64) -> [u8; 16] {
    let mut hasher = Blake2b::<U16>::new();
    hasher.update((formatted.len() as u64).to_le_bytes());
    hasher.update(formatted.as_bytes());
    hasher.update((errors.len() as u64).to_le_bytes());
    for error in errors {
        hasher.update(error.content_hash());
    }
    hasher.update(created_at.to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.finalize().into()
}

fn hex(bytes: &[u8; 16]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

struct CacheInner {
    map: LruCache<[u8; 16], CacheEntry>,
    total_weight: usize,
    stats: CacheStats,
}

/// Bounded, checksum-verified, write-once LRU.
pub struct IntegrityCache {
    inner: Mutex<CacheInner>,
    config: CacheConfig,
    sequence: AtomicU64,
}

impl IntegrityCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: LruCache::unbounded(),
                total_weight: 0,
                stats: CacheStats::default(),
            }),
            config,
            sequence: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Compose the cache key for one formatting call.
    pub fn make_key(
        message_id: &str,
        attribute: Option<&str>,
        locale: &str,
        use_isolating: bool,
        args: Option<&FluentArgs>,
    ) -> Result<[u8; 16], ArgsHashError> {
        let args_hash = hash_args(args)?;
        let mut hasher = Blake2b::<U16>::new();
        hasher.update((message_id.len() as u64).to_le_bytes());
        hasher.update(message_id.as_bytes());
        match attribute {
            Some(attr) => {
                hasher.update([1u8]);
                hasher.update((attr.len() as u64).to_le_bytes());
                hasher.update(attr.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update((locale.len() as u64).to_le_bytes());
        hasher.update(locale.as_bytes());
        hasher.update([use_isolating as u8]);
        hasher.update(args_hash);
        Ok(hasher.finalize().into())
    }

    /// Look up a cached resolution, verifying its checksum.
    pub fn get(&self, key: &[u8; 16]) -> Result<Option<(String, Vec<FluentError>)>, CacheError> {
        let mut inner = self.lock();

        enum Verdict {
            Miss,
            Hit(String, Vec<FluentError>),
            Corrupt(usize),
        }
        let verdict = match inner.map.get(key) {
            None => Verdict::Miss,
            Some(entry) => {
                let expected = checksum(
                    &entry.formatted,
                    &entry.errors,
                    entry.created_at,
                    entry.sequence,
                );
                if expected == entry.checksum && entry.key_hash == *key {
                    Verdict::Hit(entry.formatted.clone(), entry.errors.clone())
                } else {
                    Verdict::Corrupt(entry.weight())
                }
            }
        };

        match verdict {
            Verdict::Miss => {
                inner.stats.misses += 1;
                Ok(None)
            }
            Verdict::Hit(formatted, errors) => {
                inner.stats.hits += 1;
                Ok(Some((formatted, errors)))
            }
            Verdict::Corrupt(weight) => {
                inner.map.pop(key);
                inner.total_weight = inner.total_weight.saturating_sub(weight);
                inner.stats.corruption_detected += 1;
                inner.stats.size = inner.map.len();
                if self.config.strict {
                    return Err(CacheError::Corruption { key_hash: hex(key) });
                }
                log::warn!("evicted corrupted cache entry {}", hex(key));
                inner.stats.misses += 1;
                Ok(None)
            }
        }
    }

    /// Store a resolution. Write-once: overwriting a key with different
    /// content is a conflict.
    pub fn put(
        &self,
        key: [u8; 16],
        formatted: &str,
        errors: &[FluentError],
    ) -> Result<(), CacheError> {
        let weight = entry_weight(formatted, errors);
        let mut inner = self.lock();

        if weight > self.config.max_entry_weight {
            inner.stats.oversize_skips += 1;
            return Ok(());
        }

        let existing = inner
            .map
            .get(&key)
            .map(|e| (e.formatted == formatted && e.errors == errors, e.weight()));
        match existing {
            Some((true, _)) => return Ok(()),
            Some((false, _)) if self.config.strict => {
                return Err(CacheError::WriteConflict {
                    key_hash: hex(&key),
                });
            }
            Some((false, old_weight)) => {
                inner.stats.write_once_conflicts += 1;
                inner.map.pop(&key);
                inner.total_weight = inner.total_weight.saturating_sub(old_weight);
            }
            None => {}
        }

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let entry = CacheEntry {
            formatted: formatted.to_string(),
            errors: errors.to_vec(),
            checksum: checksum(formatted, errors, created_at, sequence),
            key_hash: key,
            created_at,
            sequence,
        };

        inner.total_weight += weight;
        inner.map.put(key, entry);

        while inner.map.len() > self.config.max_entries
            || inner.total_weight > self.config.max_total_weight
        {
            match inner.map.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_weight = inner.total_weight.saturating_sub(evicted.weight());
                }
                None => break,
            }
        }
        inner.stats.size = inner.map.len();
        Ok(())
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.total_weight = 0;
        inner.stats.size = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let mut inner = self.lock();
        inner.stats.size = inner.map.len();
        inner.stats
    }

    /// Record a call whose arguments could not be hashed.
    pub fn note_unhashable(&self) {
        self.lock().stats.unhashable_skips += 1;
    }
}

// ============================================================================
// Canonical argument hashing
// ============================================================================

struct ArgsHasher {
    hasher: Blake2b<U16>,
    nodes: usize,
}

impl ArgsHasher {
    fn visit(&mut self, value: &ArgValue, depth: usize) -> Result<(), ArgsHashError> {
        if depth >= MAX_DEPTH {
            return Err(ArgsHashError::DepthExceeded);
        }
        self.nodes += 1;
        if self.nodes > CACHE_HASH_NODE_BUDGET {
            return Err(ArgsHashError::NodeBudgetExceeded);
        }

        // Type tags keep numerically equal values of different kinds
        // (bool/int/decimal/float) from colliding.
        match value {
            ArgValue::Str(s) => {
                self.hasher.update([0x01]);
                self.update_str(s);
            }
            ArgValue::Integer(i) => {
                self.hasher.update([0x02]);
                self.hasher.update(i.to_le_bytes());
            }
            ArgValue::Decimal(d) => {
                self.hasher.update([0x03]);
                self.update_str(&d.normalize().to_string());
            }
            ArgValue::Float(f) => {
                self.hasher.update([0x04]);
                // All NaN payloads are one value to the cache, or every
                // NaN-keyed lookup would miss forever and grow the map.
                let bits = if f.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    f.to_bits()
                };
                self.hasher.update(bits.to_le_bytes());
            }
            ArgValue::Bool(b) => {
                self.hasher.update([0x05, *b as u8]);
            }
            ArgValue::DateTime(dt) => {
                self.hasher.update([0x06]);
                self.hasher.update(dt.timestamp_millis().to_le_bytes());
                self.hasher
                    .update(dt.offset().local_minus_utc().to_le_bytes());
            }
            ArgValue::List(items) => {
                self.hasher.update([0x07]);
                self.hasher.update((items.len() as u64).to_le_bytes());
                for item in items {
                    self.visit(item, depth + 1)?;
                }
            }
            ArgValue::Map(map) => {
                self.hasher.update([0x08]);
                self.hasher.update((map.len() as u64).to_le_bytes());
                for (k, v) in map {
                    self.update_str(k);
                    self.visit(v, depth + 1)?;
                }
            }
            ArgValue::Null => self.hasher.update([0x09]),
        }
        Ok(())
    }

    fn update_str(&mut self, s: &str) {
        self.hasher.update((s.len() as u64).to_le_bytes());
        self.hasher.update(s.as_bytes());
    }
}

/// Hash a full argument map canonically. `None` and the empty map hash
/// differently on purpose: they are different calls.
pub fn hash_args(args: Option<&FluentArgs>) -> Result<[u8; 16], ArgsHashError> {
    let mut walker = ArgsHasher {
        hasher: Blake2b::<U16>::new(),
        nodes: 0,
    };
    match args {
        None => walker.hasher.update([0x00]),
        Some(map) => {
            walker.hasher.update([0x08]);
            walker.hasher.update((map.len() as u64).to_le_bytes());
            for (k, v) in map {
                walker.update_str(k);
                walker.visit(v, 0)?;
            }
        }
    }
    Ok(walker.hasher.finalize().into())
}
