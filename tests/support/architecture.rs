use std::fs;
use std::path::{Path, PathBuf};

/// `(file, line number, line)` of an offending source line.
pub type Hit = (String, usize, String);

fn root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Rust sources at `path`, which may be a single file or a directory tree.
fn sources(path: &Path, found: &mut Vec<PathBuf>) {
    if path.is_file() {
        if path.extension().is_some_and(|ext| ext == "rs") {
            found.push(path.to_path_buf());
        }
        return;
    }
    let entries = fs::read_dir(path).unwrap_or_else(|e| panic!("cannot list {}: {e}", path.display()));
    for entry in entries.flatten() {
        sources(&entry.path(), found);
    }
}

fn scan(relative: &str, only_mod_rs: bool, offending: impl Fn(&str) -> bool) -> Vec<Hit> {
    let mut files = Vec::new();
    sources(&root().join(relative), &mut files);
    files.sort();

    let mut hits = Vec::new();
    for file in files {
        if only_mod_rs && !file.ends_with("mod.rs") {
            continue;
        }
        let text = fs::read_to_string(&file).unwrap_or_else(|e| panic!("cannot read {}: {e}", file.display()));
        let shown = file.strip_prefix(root()).unwrap_or(&file).display().to_string();
        for (number, line) in text.lines().enumerate() {
            if offending(line) {
                hits.push((shown.clone(), number + 1, line.to_string()));
            }
        }
    }
    hits
}

pub fn find_lines_containing(relative: &str, needles: &[&str]) -> Vec<Hit> {
    scan(relative, false, |line| needles.iter().any(|needle| line.contains(needle)))
}

/// `mod.rs` lines other than blanks, comments, `mod`/`pub use` and `#[cfg]`.
pub fn find_non_export_lines_in_mod_files(relative: &str) -> Vec<Hit> {
    const ALLOWED: [&str; 5] = ["//", "pub mod ", "mod ", "pub use ", "#[cfg"];
    scan(relative, true, |line| {
        let line = line.trim();
        !line.is_empty() && !ALLOWED.iter().any(|prefix| line.starts_with(prefix))
    })
}

pub fn path_exists(relative: &str) -> bool {
    root().join(relative).exists()
}
