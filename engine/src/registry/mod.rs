//! Id Registry - reproducible canonical ids without a database
//!
//! Ids take the form `PREFIX-HASH8-slug`, e.g. `Z-3f9a0c12-living_room`:
//! the hash fragment is SHA-256 over `prefix:source_id:context`, the slug is a
//! readable form of the source name. The registry caches every generated id
//! by its lookup key, and the whole cache can be exported, persisted as JSON
//! and imported into a fresh registry for a later run.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::{RegistryError, RegistryResult};

/// Maximum slug length in characters.
const SLUG_MAX_LEN: usize = 20;

/// Hex characters of the content hash kept in the id.
const HASH_LEN: usize = 8;

const KEY_SEPARATOR: char = '|';

const LEGACY_SEPARATOR: char = ':';

const ESCAPE: char = '\\';

/// Where an id came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReverseEntry {
    pub source_format: String,
    pub source_id: String,
    pub context: String,
}

/// Serializable registry state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RegistryExport {
    /// lookup key -> id
    #[serde(default)]
    pub forward_map: BTreeMap<String, String>,
    /// id -> origin
    #[serde(default)]
    pub reverse_map: BTreeMap<String, ReverseEntry>,
}

/// Deterministic id generator.
#[derive(Debug, Clone, Default)]
pub struct IdRegistry {
    forward: BTreeMap<String, String>,
    reverse: BTreeMap<String, ReverseEntry>,
    /// Per-prefix counter for unnamed source objects.
    counters: HashMap<String, u32>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup key for a generation request. Separators and backslashes
    /// inside components are backslash-escaped.
    pub fn lookup_key(prefix: &str, source_id: &str, context: &str, source_format: &str) -> String {
        join_key(&[source_format, prefix, context, source_id], KEY_SEPARATOR)
    }

    /// Key shape of older exports (`format:source_id:context`).
    fn legacy_key(source_id: &str, context: &str, source_format: &str) -> String {
        join_key(&[source_format, source_id, context], LEGACY_SEPARATOR)
    }

    /// Return the id for this source object, generating it on first sight.
    pub fn generate_id(
        &mut self,
        prefix: &str,
        source_id: &str,
        context: &str,
        source_format: &str,
    ) -> String {
        let key = Self::lookup_key(prefix, source_id, context, source_format);
        if let Some(id) = self.forward.get(&key) {
            return id.clone();
        }

        // Reuse ids from older exports when the prefix still matches.
        let legacy = Self::legacy_key(source_id, context, source_format);
        if let Some(id) = self.forward.get(&legacy).cloned() {
            let same_origin = self
                .reverse
                .get(&id)
                .map_or(true, |e| e.source_id == source_id && e.context == context);
            let same_prefix =
                id.starts_with(&format!("{}-", prefix)) || id.starts_with(&format!("{}_", prefix));
            if same_origin && same_prefix {
                self.forward.insert(key, id.clone());
                return id;
            }
        }

        let tail = if source_id.trim().is_empty() {
            let counter = self.counters.entry(prefix.to_string()).or_insert(0);
            *counter += 1;
            format!("{:03}", counter)
        } else {
            slugify(source_id, SLUG_MAX_LEN)
        };

        let base = format!("{}-{}-{}", prefix, stable_hash(prefix, source_id, context), tail);
        let mut id = base.clone();
        let mut suffix = 2;
        while self.reverse.contains_key(&id) {
            id = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        self.forward.insert(key, id.clone());
        self.reverse.insert(
            id.clone(),
            ReverseEntry {
                source_format: source_format.to_string(),
                source_id: source_id.to_string(),
                context: context.to_string(),
            },
        );
        id
    }

    /// Register an id that already exists in a source document.
    ///
    /// Returns `false` when the id is taken by another source object.
    pub fn claim(&mut self, id: &str, source_id: &str, context: &str, source_format: &str) -> bool {
        if let Some(existing) = self.reverse.get(id) {
            return existing.source_id == source_id && existing.context == context;
        }
        self.reverse.insert(
            id.to_string(),
            ReverseEntry {
                source_format: source_format.to_string(),
                source_id: source_id.to_string(),
                context: context.to_string(),
            },
        );
        true
    }

    /// Origin of an id.
    pub fn resolve(&self, id: &str) -> Option<&ReverseEntry> {
        self.reverse.get(id)
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Number of ids per prefix, for summaries.
    pub fn prefix_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for id in self.reverse.keys() {
            let prefix = id.split(['-', '_']).next().unwrap_or(id).to_string();
            *counts.entry(prefix).or_insert(0) += 1;
        }
        counts
    }

    pub fn export(&self) -> RegistryExport {
        RegistryExport {
            forward_map: self.forward.clone(),
            reverse_map: self.reverse.clone(),
        }
    }

    /// Build a registry from exported state.
    pub fn from_export(export: RegistryExport) -> RegistryResult<Self> {
        let mut registry = Self::new();
        registry.import(export)?;
        Ok(registry)
    }

    /// Merge exported state into this registry. Existing keys win.
    ///
    /// Exports without a reverse map (older tools) are accepted when the
    /// origin can be recovered from the lookup key. Returns the number of
    /// keys added.
    pub fn import(&mut self, export: RegistryExport) -> RegistryResult<usize> {
        let RegistryExport {
            forward_map,
            reverse_map,
        } = export;

        let mut added = 0;
        for (key, id) in forward_map {
            if self.forward.contains_key(&key) {
                continue;
            }
            let entry = match reverse_map.get(&id) {
                Some(entry) => entry.clone(),
                None => entry_from_key(&key).ok_or_else(|| {
                    RegistryError::InvalidExport(format!(
                        "id '{}' has no reverse entry and key '{}' cannot be decoded",
                        id, key
                    ))
                })?,
            };

            if entry.source_id.trim().is_empty() {
                if let Some(prefix) = split_key(&key, KEY_SEPARATOR).get(1) {
                    *self.counters.entry(prefix.clone()).or_insert(0) += 1;
                }
            }

            self.reverse.entry(id.clone()).or_insert(entry);
            self.forward.insert(key, id);
            added += 1;
        }

        // Ids claimed from documents have no forward key.
        for (id, entry) in reverse_map {
            self.reverse.entry(id).or_insert(entry);
        }

        Ok(added)
    }

    pub fn to_json(&self) -> RegistryResult<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    pub fn from_json(content: &str) -> RegistryResult<Self> {
        let export: RegistryExport = serde_json::from_str(content)?;
        Self::from_export(export)
    }

    /// Persist the registry as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> RegistryResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        tracing::debug!(path = %path.display(), ids = self.len(), "registry saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let registry = Self::from_json(&content)?;
        tracing::debug!(path = %path.as_ref().display(), ids = registry.len(), "registry loaded");
        Ok(registry)
    }

    /// Load when the file exists, start empty otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> RegistryResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }
}

/// Recover an origin from either key shape.
fn entry_from_key(key: &str) -> Option<ReverseEntry> {
    if let [format, _prefix, context, source_id] = split_key(key, KEY_SEPARATOR).as_slice() {
        return Some(ReverseEntry {
            source_format: format.clone(),
            source_id: source_id.clone(),
            context: context.clone(),
        });
    }
    if let [format, source_id, context] = split_key(key, LEGACY_SEPARATOR).as_slice() {
        return Some(ReverseEntry {
            source_format: format.clone(),
            source_id: source_id.clone(),
            context: context.clone(),
        });
    }
    None
}

fn escape_component(part: &str, out: &mut String) {
    for c in part.chars() {
        if c == ESCAPE || c == KEY_SEPARATOR || c == LEGACY_SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

fn join_key(parts: &[&str], sep: char) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(sep);
        }
        escape_component(part, &mut key);
    }
    key
}

/// Split on unescaped `sep` and unescape each component.
fn split_key(key: &str, sep: char) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            if let (Some(next), Some(last)) = (chars.next(), parts.last_mut()) {
                last.push(next);
            }
        } else if c == sep {
            parts.push(String::new());
        } else if let Some(last) = parts.last_mut() {
            last.push(c);
        }
    }
    parts
}

/// Lowercase slug: runs of non `[a-z0-9]` become one `_`, trimmed, capped.
pub fn slugify(name: &str, max_len: usize) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let capped: String = slug.chars().take(max_len).collect();
    let capped = capped.trim_end_matches('_').to_string();
    if capped.is_empty() {
        "item".to_string()
    } else {
        capped
    }
}

fn stable_hash(prefix: &str, source_id: &str, context: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(join_key(&[prefix, source_id, context], LEGACY_SEPARATOR).as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..HASH_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_id_shape() {
        let mut registry = IdRegistry::new();
        let id = registry.generate_id("Z", "Living Room", "", "CIBD22X");

        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "Z");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(parts[2], "living_room");
    }

    #[test]
    fn test_generate_is_idempotent() {
        let mut registry = IdRegistry::new();
        let a = registry.generate_id("S", "North Wall", "Living", "CIBD22X");
        let b = registry.generate_id("S", "North Wall", "Living", "CIBD22X");
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_context_distinct_ids() {
        let mut registry = IdRegistry::new();
        let a = registry.generate_id("S", "North Wall", "Living", "CIBD22X");
        let b = registry.generate_id("S", "North Wall", "Bedroom", "CIBD22X");
        let c = registry.generate_id("S", "South Wall", "Living", "CIBD22X");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_fresh_registries_agree() {
        let mut one = IdRegistry::new();
        let mut two = IdRegistry::new();
        assert_eq!(
            one.generate_id("WT", "Dbl Low-E", "", "CIBD22X"),
            two.generate_id("WT", "Dbl Low-E", "", "CIBD22X")
        );
    }

    #[test]
    fn test_collision_gets_numeric_suffix() {
        let mut registry = IdRegistry::new();
        // Same hash input and slug, different format: a second object.
        let a = registry.generate_id("Z", "Core", "", "CIBD22X");
        let b = registry.generate_id("Z", "Core", "", "CIBD22");
        assert_eq!(b, format!("{}-2", a));
        let c = registry.generate_id("Z", "Core", "", "EMJSON");
        assert_eq!(c, format!("{}-3", a));
    }

    #[test]
    fn test_empty_source_id_uses_counter() {
        let mut registry = IdRegistry::new();
        let a = registry.generate_id("O", "", "ResWin#0", "CIBD22X");
        let b = registry.generate_id("O", "", "ResWin#1", "CIBD22X");
        assert!(a.ends_with("-001"));
        assert!(b.ends_with("-002"));
        // Cached like any other key.
        assert_eq!(registry.generate_id("O", "", "ResWin#0", "CIBD22X"), a);
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut registry = IdRegistry::new();
        let zone = registry.generate_id("Z", "Living", "", "CIBD22X");
        let wall = registry.generate_id("S", "North", "Living", "CIBD22X");
        registry.generate_id("O", "", "ResWin#0", "CIBD22X");

        let json = registry.to_json().unwrap();
        let mut restored = IdRegistry::from_json(&json).unwrap();

        assert_eq!(restored.to_json().unwrap(), json);
        assert_eq!(restored.generate_id("Z", "Living", "", "CIBD22X"), zone);
        assert_eq!(restored.generate_id("S", "North", "Living", "CIBD22X"), wall);

        // Counter resumes after the imported unnamed object.
        let next = restored.generate_id("O", "", "ResWin#1", "CIBD22X");
        assert!(next.ends_with("-002"));
    }

    #[test]
    fn test_export_wire_shape() {
        let mut registry = IdRegistry::new();
        let id = registry.generate_id("Z", "Living", "", "CIBD22X");
        let value = serde_json::to_value(registry.export()).unwrap();

        assert_eq!(value["forward_map"]["CIBD22X|Z||Living"], id.as_str());
        assert_eq!(value["reverse_map"][id.as_str()]["source_id"], "Living");
        assert_eq!(value["reverse_map"][id.as_str()]["source_format"], "CIBD22X");
    }

    #[test]
    fn test_legacy_export_is_honoured() {
        let mut export = RegistryExport::default();
        export
            .forward_map
            .insert("CIBD22X:Living:".to_string(), "Z-1a2b3c4d-living".to_string());

        let mut registry = IdRegistry::from_export(export).unwrap();
        assert_eq!(registry.generate_id("Z", "Living", "", "CIBD22X"), "Z-1a2b3c4d-living");
        // A different prefix does not steal the legacy id.
        assert_ne!(registry.generate_id("DU", "Living", "", "CIBD22X"), "Z-1a2b3c4d-living");
    }

    #[test]
    fn test_undecodable_export_is_rejected() {
        let mut export = RegistryExport::default();
        export.forward_map.insert("garbage".to_string(), "X-1".to_string());
        assert!(matches!(
            IdRegistry::from_export(export),
            Err(RegistryError::InvalidExport(_))
        ));
    }

    #[test]
    fn test_separators_in_names_do_not_collide() {
        let mut registry = IdRegistry::new();
        let a = registry.generate_id("S", "a|b", "c", "CIBD22");
        let b = registry.generate_id("S", "b", "c|a", "CIBD22");
        let c = registry.generate_id("S", "a:", "b", "CIBD22");
        let d = registry.generate_id("S", "a", ":b", "CIBD22");
        assert_eq!(
            IdRegistry::lookup_key("S", "a|b", "c", "CIBD22"),
            "CIBD22|S|c|a\\|b"
        );
        assert_ne!(c, d);
        assert_ne!(a, b);

        let mut reloaded = IdRegistry::from_export(registry.export()).unwrap();
        assert_eq!(reloaded.generate_id("S", "a:", "b", "CIBD22"), c);
        assert_eq!(reloaded.generate_id("S", "a", ":b", "CIBD22"), d);
        assert_eq!(reloaded.resolve(&a).unwrap().source_id, "a|b");
    }

    #[test]
    fn test_escaped_keys_decode_without_reverse_map() {
        let mut export = RegistryExport::default();
        export
            .forward_map
            .insert("CIBD22|S|zone\\|1|Wall\\:A".to_string(), "S-1a2b3c4d-wall_a".to_string());
        let registry = IdRegistry::from_export(export).unwrap();
        let entry = registry.resolve("S-1a2b3c4d-wall_a").unwrap();
        assert_eq!(entry.context, "zone|1");
        assert_eq!(entry.source_id, "Wall:A");
    }

    #[test]
    fn test_claim() {
        let mut registry = IdRegistry::new();
        assert!(registry.claim("Z-custom", "Living", "", "EMJSON"));
        assert!(registry.claim("Z-custom", "Living", "", "EMJSON"));
        assert!(!registry.claim("Z-custom", "Kitchen", "", "EMJSON"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Living Room", 20), "living_room");
        assert_eq!(slugify("  --Wall #1 (N)--", 20), "wall_1_n");
        assert_eq!(slugify("A very long construction name", 20), "a_very_long_construc");
        assert_eq!(slugify("!!!", 20), "item");
        assert_eq!(slugify("ab cd", 3), "ab");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("registry.json");

        let mut registry = IdRegistry::new();
        let id = registry.generate_id("Z", "Living", "", "CIBD22X");
        registry.save(&path).unwrap();

        let mut loaded = IdRegistry::load(&path).unwrap();
        assert_eq!(loaded.generate_id("Z", "Living", "", "CIBD22X"), id);

        let empty = IdRegistry::load_or_default(dir.path().join("missing.json")).unwrap();
        assert!(empty.is_empty());
    }
}
