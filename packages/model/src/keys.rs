use crc32fast::Hasher;
use serde_json::Value as Json;
use uuid::Uuid;

/// Derive a short hex seed from an arbitrary session identifier
pub fn session_seed(session_id: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(session_id.as_bytes());
    format!("{:08x}", hasher.finalize())
}

/// Sequential key generator for blocks, spans and mark definitions.
///
/// Keys are `<seed><counter>` and the counter only moves forward, so a key
/// handed out once is never produced again by the same generator. Keys that
/// arrive from elsewhere with this generator's seed are [reserved](Self::reserve)
/// so the counter skips past them.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    seed: String,
    count: u64,
}

impl KeyGenerator {
    /// Generator for one editing session. Every call gets a fresh seed, so
    /// two sessions sharing an id never hand out the same keys.
    pub fn new(session_id: &str) -> Self {
        Self::from_seed(session_seed(&format!("{session_id}:{}", Uuid::new_v4())))
    }

    /// Deterministic generator
    pub fn from_seed(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            count: 0,
        }
    }

    /// Generate the next key
    pub fn new_key(&mut self) -> String {
        self.count += 1;
        format!("{}{:x}", self.seed, self.count)
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Never produce `key`, or any key before it in this generator's sequence
    pub fn reserve(&mut self, key: &str) {
        let Some(counter) = key.strip_prefix(self.seed.as_str()) else {
            return;
        };
        if let Ok(n) = u64::from_str_radix(counter, 16) {
            self.count = self.count.max(n);
        }
    }

    /// Reserve every `_key` found anywhere in `value`
    pub fn reserve_in(&mut self, value: &Json) {
        match value {
            Json::Object(map) => {
                if let Some(Json::String(key)) = map.get("_key") {
                    self.reserve(key);
                }
                map.values().for_each(|v| self.reserve_in(v));
            }
            Json::Array(items) => items.iter().for_each(|v| self.reserve_in(v)),
            _ => {}
        }
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new("folio")
    }
}
