use std::cmp::Ordering;
use std::path::PathBuf;

/// Organizational grouping of files inside a project. Carries no build
/// semantics; the anonymous (`""`) filter holds everything not assigned
/// elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    pub name: String,
    /// Grouping path relative to the project location.
    pub path: PathBuf,
    /// Absolute file paths.
    pub files: Vec<PathBuf>,
}

impl FileFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| {
            let name_a = a.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let name_b = b.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            alphabetic_cmp(&name_a, &name_b).then_with(|| a.cmp(b))
        });
    }
}

/// Case-insensitive ordering in which, for letters equal ignoring case,
/// the lowercase letter sorts first. Shorter strings sort before longer
/// strings they prefix.
pub fn alphabetic_cmp(a: &str, b: &str) -> Ordering {
    for (ca, cb) in a.chars().zip(b.chars()) {
        let ordering = if ca.is_alphabetic() && cb.is_alphabetic() {
            let lower_a = ca.to_lowercase().next().unwrap_or(ca);
            let lower_b = cb.to_lowercase().next().unwrap_or(cb);
            // Reversed on purpose: 'a' > 'A' in code points, but sorts first
            lower_a.cmp(&lower_b).then_with(|| cb.cmp(&ca))
        } else {
            ca.cmp(&cb)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.chars().count().cmp(&b.chars().count())
}

/// Filter order: the anonymous filter first, then [`alphabetic_cmp`].
pub fn filter_cmp(a: &FileFilter, b: &FileFilter) -> Ordering {
    match (a.is_anonymous(), b.is_anonymous()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => alphabetic_cmp(&a.name, &b.name),
    }
}
