use std::collections::HashMap;
use std::path::PathBuf;

/// A read-only supplier of class blobs: the container-archive side of
/// the world, reduced to its contract. A source yields bytes by
/// canonical slash-form name, can enumerate what it holds, and may
/// nominate an entry-point class.
pub trait ClassSource: Send + Sync {
    fn class_bytes(&self, name: &str) -> Option<Vec<u8>>;
    fn class_names(&self) -> Vec<String>;
    fn entry_point(&self) -> Option<String> {
        None
    }
}

/// Class blobs handed over by the host directly.
pub struct MemoryClassSource {
    classes: HashMap<String, Vec<u8>>,
    entry_point: Option<String>,
}

impl MemoryClassSource {
    pub fn new() -> MemoryClassSource {
        MemoryClassSource {
            classes: HashMap::new(),
            entry_point: None,
        }
    }

    pub fn add_class(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.insert(name.into(), bytes);
    }

    pub fn set_entry_point(&mut self, name: impl Into<String>) {
        self.entry_point = Some(name.into());
    }
}

impl Default for MemoryClassSource {
    fn default() -> MemoryClassSource {
        MemoryClassSource::new()
    }
}

impl ClassSource for MemoryClassSource {
    fn class_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.classes.get(name).cloned()
    }

    fn class_names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    fn entry_point(&self) -> Option<String> {
        self.entry_point.clone()
    }
}

/// An exploded archive on disk: `pkg/Name` maps to
/// `<root>/pkg/Name.class`.
pub struct DirectoryClassSource {
    root: PathBuf,
}

impl DirectoryClassSource {
    pub fn new(root: impl Into<PathBuf>) -> DirectoryClassSource {
        DirectoryClassSource { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        // Canonical names never escape the root.
        if name.contains("..") || name.starts_with('/') {
            return None;
        }
        Some(self.root.join(format!("{name}.class")))
    }
}

impl ClassSource for DirectoryClassSource {
    fn class_bytes(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path_for(name)?).ok()
    }

    fn class_names(&self) -> Vec<String> {
        fn walk(dir: &std::path::Path, prefix: &str, out: &mut Vec<String>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let qualified = if prefix.is_empty() {
                    stem.to_string()
                } else {
                    format!("{prefix}/{stem}")
                };
                if path.is_dir() {
                    walk(&path, &qualified, out);
                } else if path.extension().and_then(|e| e.to_str()) == Some("class") {
                    out.push(qualified);
                }
            }
        }
        let mut names = Vec::new();
        walk(&self.root, "", &mut names);
        names
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn memory_source_round_trips_blobs() {
        let mut source = MemoryClassSource::new();
        source.add_class("demo/Main", vec![0xCA, 0xFE]);
        source.set_entry_point("demo/Main");
        assert_eq!(source.class_bytes("demo/Main"), Some(vec![0xCA, 0xFE]));
        assert_eq!(source.class_bytes("demo/Other"), None);
        assert_eq!(source.class_names(), vec!["demo/Main".to_string()]);
        assert_eq!(source.entry_point(), Some("demo/Main".to_string()));
    }

    #[test]
    fn directory_source_rejects_escaping_names() {
        let source = DirectoryClassSource::new("/tmp/classes");
        assert!(source.class_bytes("../etc/passwd").is_none());
        assert!(source.class_bytes("/etc/passwd").is_none());
    }
}
