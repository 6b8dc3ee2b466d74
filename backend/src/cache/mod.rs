//! Response cache - memoize generation output
//!
//! Keeps the raw runtime output for the most recent distinct requests so that
//! re-running the same instruction on the same data with the same model does
//! not launch the runtime again. Bounded, least-recently-used eviction.

use std::collections::{HashMap, VecDeque};

/// Number of distinct requests kept by default
pub const DEFAULT_CAPACITY: usize = 10;

/// Identity of a generation request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Free-text instruction
    pub instruction: String,
    /// Table serialized as CSV
    pub data: String,
    /// Model identifier
    pub model: String,
}

impl CacheKey {
    pub fn new(instruction: &str, data: &str, model: &str) -> Self {
        Self {
            instruction: instruction.to_string(),
            data: data.to_string(),
            model: model.to_string(),
        }
    }
}

/// Fixed-capacity LRU map from request to raw output
#[derive(Debug)]
pub struct ResponseCache {
    capacity: usize,
    entries: HashMap<CacheKey, String>,
    /// Keys from least to most recently used
    order: VecDeque<CacheKey>,
}

impl ResponseCache {
    /// Create a cache with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a cache holding at most `capacity` entries (0 disables caching)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Look up a response, marking it most recently used
    pub fn get(&mut self, key: &CacheKey) -> Option<String> {
        let value = self.entries.get(key)?.clone();
        self.touch(key);
        Some(value)
    }

    /// Store a response, evicting the least recently used entry when full
    pub fn insert(&mut self, key: CacheKey, value: String) {
        if self.capacity == 0 {
            return;
        }

        if self.entries.contains_key(&key) {
            self.touch(&key);
            self.entries.insert(key, value);
            return;
        }

        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
