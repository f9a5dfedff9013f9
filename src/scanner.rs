//! Filesystem scanner: enumerate candidate files under an index root.
//!
//! The walk applies a fixed skip-list of directories that are opaque to
//! search, an include filter over extensions and exact basenames, a size
//! ceiling, and a binary sniff on the first kilobyte. Hidden files inside
//! non-skipped directories are included; hidden directories are not
//! descended into.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;

/// Files larger than this are never indexed.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// How many leading bytes the binary sniff inspects.
const SNIFF_LEN: usize = 1024;

/// Reject a file when more than this fraction of sniffed bytes is
/// non-printable. Tunable constant, not a contract.
const MAX_NON_PRINTABLE_RATIO: f64 = 0.30;

/// Directories never descended into, regardless of configuration.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "venv",
    "__pycache__",
    "node_modules",
    "dist",
    "build",
    "target",
    ".idea",
    ".vscode",
];

/// The default include set: common source, script, and documentation
/// extensions plus a few exact basenames.
pub fn default_extensions() -> HashSet<String> {
    [
        ".c", ".h", ".cpp", ".cc", ".hpp", ".py", ".go", ".rs", ".java",
        ".js", ".ts", ".tsx", ".jsx", ".sh", ".zsh", ".bash", ".md", ".txt",
        ".rst", ".toml", ".yaml", ".yml", ".json", ".ini", ".cfg", ".conf",
        ".mk", ".make", "makefile", "readme", "dockerfile",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// What the scanner considers a candidate file.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Lowercased extensions (with leading dot) and exact basenames.
    /// An empty set means "all files", still subject to the binary sniff.
    pub extensions: HashSet<String>,
    pub max_file_size: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Walks an index root and yields deduplicated absolute candidate paths.
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Enumerate candidate files under `root` (which must be absolute).
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .hidden(false)
            .follow_links(false)
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    let name = entry.file_name().to_string_lossy();
                    return !SKIP_DIRS.contains(&name.as_ref()) && !name.starts_with('.');
                }
                true
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("scan error: {}", e);
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            if !self.name_matches(path) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.len() > self.config.max_file_size => {
                    log::debug!("skipping {} (too large: {} bytes)", path.display(), meta.len());
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("cannot stat {}: {}", path.display(), e);
                    continue;
                }
            }
            if !is_probably_text(path) {
                log::debug!("skipping {} (binary sniff)", path.display());
                continue;
            }
            files.push(path.to_path_buf());
        }

        Ok(files)
    }

    /// Check the include filter against the basename and the extension.
    fn name_matches(&self, path: &Path) -> bool {
        if self.config.extensions.is_empty() {
            return true;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if self.config.extensions.contains(&name) {
            return true;
        }
        match path.extension() {
            Some(ext) => {
                let dotted = format!(".{}", ext.to_string_lossy().to_lowercase());
                self.config.extensions.contains(&dotted)
            }
            None => false,
        }
    }
}

/// Sniff the first kilobyte: NUL bytes or a high non-printable ratio mean
/// binary. Empty files count as text.
fn is_probably_text(path: &Path) -> bool {
    let mut buf = [0u8; SNIFF_LEN];
    let n = match File::open(path).and_then(|mut f| f.read(&mut buf)) {
        Ok(n) => n,
        Err(e) => {
            log::debug!("cannot sniff {}: {}", path.display(), e);
            return false;
        }
    };
    if n == 0 {
        return true;
    }
    let chunk = &buf[..n];
    if chunk.contains(&0) {
        return false;
    }
    let non_printable = chunk
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t' || b == 0x7f)
        .count();
    (non_printable as f64 / n as f64) <= MAX_NON_PRINTABLE_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scan_names(root: &Path, config: ScanConfig) -> Vec<String> {
        let mut names: Vec<String> = Scanner::new(config)
            .scan(root)
            .unwrap()
            .iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_extension_filter() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.rs"), "fn main() {}").unwrap();
        fs::write(temp.path().join("b.bin"), "data").unwrap();
        fs::write(temp.path().join("Makefile"), "all:").unwrap();

        let names = scan_names(temp.path(), ScanConfig::default());
        assert_eq!(names, vec!["Makefile", "a.rs"]);
    }

    #[test]
    fn test_empty_filter_takes_everything_textual() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes.weird"), "plain text").unwrap();

        let config = ScanConfig {
            extensions: HashSet::new(),
            ..Default::default()
        };
        assert_eq!(scan_names(temp.path(), config), vec!["notes.weird"]);
    }

    #[test]
    fn test_skip_dirs() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        fs::create_dir(temp.path().join("node_modules")).unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join(".git").join("x.txt"), "no").unwrap();
        fs::write(temp.path().join("node_modules").join("y.js"), "no").unwrap();
        fs::write(temp.path().join("src").join("main.c"), "int main;").unwrap();

        let names = scan_names(temp.path(), ScanConfig::default());
        assert_eq!(names, vec!["src/main.c"]);
    }

    #[test]
    fn test_hidden_files_included_hidden_dirs_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(".env.md"), "secretish").unwrap();
        fs::create_dir(temp.path().join(".cache")).unwrap();
        fs::write(temp.path().join(".cache").join("z.md"), "no").unwrap();

        let names = scan_names(temp.path(), ScanConfig::default());
        assert_eq!(names, vec![".env.md"]);
    }

    #[test]
    fn test_binary_sniff_rejects_nul() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("blob.txt"), b"abc\x00def").unwrap();
        fs::write(temp.path().join("ok.txt"), "plain").unwrap();

        let names = scan_names(temp.path(), ScanConfig::default());
        assert_eq!(names, vec!["ok.txt"]);
    }

    #[test]
    fn test_size_ceiling() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("big.txt"), "x".repeat(4096)).unwrap();
        fs::write(temp.path().join("small.txt"), "x").unwrap();

        let config = ScanConfig {
            max_file_size: 1024,
            ..Default::default()
        };
        assert_eq!(scan_names(temp.path(), config), vec!["small.txt"]);
    }

    #[test]
    fn test_empty_file_is_text() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("empty.md"), "").unwrap();
        assert_eq!(scan_names(temp.path(), ScanConfig::default()), vec!["empty.md"]);
    }
}
