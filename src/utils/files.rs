use crate::error::FetchError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Number of `/`-separated pieces dropped from a locator before its name is built:
/// scheme, the empty piece after it, host, and the collection prefix (e.g. `lccn`).
const LOCATOR_PREFIX_PIECES: usize = 4;

/// How the last character of a derived local name is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingRule {
    /// Keep the joined name as is.
    #[default]
    Verbatim,
    /// Replace the final character, e.g. `g` turns `seq-1.jp2` into `seq-1.jpg`.
    ReplaceLast(char),
}

/// Derive the on-disk file name for a locator
///
/// `https://chroniclingamerica.loc.gov/lccn/sn83045298/1963-12-20/ed-1/seq-1.jp2`
/// becomes `sn83045298_1963-12-20_ed-1_seq-1.jp2`.
pub fn local_name(locator: &str, rule: NamingRule) -> Result<String, FetchError> {
    let invalid = |reason: &str| FetchError::InvalidLocator {
        locator: locator.to_string(),
        reason: reason.to_string(),
    };

    let pieces: Vec<&str> = locator
        .trim()
        .split('/')
        .skip(LOCATOR_PREFIX_PIECES)
        .collect();

    if pieces.is_empty() {
        return Err(invalid("too few path segments"));
    }
    if pieces
        .iter()
        .any(|p| p.is_empty() || *p == "." || *p == "..")
    {
        return Err(invalid("empty or relative path segment"));
    }

    let mut name = pieces.join("_");
    if let NamingRule::ReplaceLast(c) = rule {
        name.pop();
        name.push(c);
    }
    Ok(name)
}

/// Snapshot the regular files in `dir` whose extension matches `ext` (case-insensitive),
/// sorted by path so every stage walks them in a stable order.
pub fn list_with_extension(dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map_or(false, |t| t.is_file()))
        .map(|entry| entry.path())
        .filter(|path| has_extension(path, ext))
        .collect();

    files.sort();
    Ok(files)
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case(ext))
}

/// Display name used in logs and reports.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Remove every path, returning the ones that could not be removed.
pub fn remove_files<'a, I>(paths: I) -> Vec<(PathBuf, io::Error)>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    paths
        .into_iter()
        .filter_map(|path| fs::remove_file(path).err().map(|e| (path.clone(), e)))
        .collect()
}
