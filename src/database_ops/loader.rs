use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{error, info, warn};

/// Load JSON documents from every `*.json` file directly under `dir`.
///
/// Files are read in name order; `limit` caps the number of files. A missing
/// directory or one without JSON files yields an empty set. Files that fail to
/// parse, or whose root is not an object, are logged and skipped.
pub fn load_documents(dir: &Path, limit: Option<usize>) -> Vec<Value> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!(dir = %dir.display(), error = %err, "folder not readable");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    if files.is_empty() {
        warn!(dir = %dir.display(), "no JSON files found");
        return Vec::new();
    }
    files.sort();
    if let Some(limit) = limit.filter(|l| *l > 0) {
        files.truncate(limit);
        info!(limit, "processing limited number of files");
    }
    info!(files = files.len(), dir = %dir.display(), "loading JSON files");

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                error!(file = %path.display(), error = %err, "error reading file");
                continue;
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(doc @ Value::Object(_)) => documents.push(doc),
            Ok(_) => warn!(file = %path.display(), "document root is not an object"),
            Err(err) => error!(file = %path.display(), error = %err, "invalid JSON"),
        }
    }
    info!(loaded = documents.len(), "loaded valid documents");
    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_folder_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_documents(&dir.path().join("nope"), None).is_empty());
        assert!(load_documents(dir.path(), None).is_empty());
    }

    #[test]
    fn loads_sorted_valid_objects_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), r#"{"migrosId": "2"}"#).unwrap();
        fs::write(dir.path().join("a.json"), r#"{"migrosId": "1"}"#).unwrap();
        fs::write(dir.path().join("c.json"), "[1, 2]").unwrap();
        fs::write(dir.path().join("d.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "{}").unwrap();

        let docs = load_documents(dir.path(), None);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["migrosId"], "1");

        let docs = load_documents(dir.path(), Some(1));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["migrosId"], "1");
    }
}
