//! Lexical path normalization.
//!
//! Registry keys must be stable for files that may not currently exist on
//! disk (missing files are still tracked), so resolution is purely lexical:
//! no `canonicalize`, no symlink traversal.

use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically: drop `.` components and fold `..` into the
/// preceding normal component where possible.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Only pop a normal component; keep `..` at the root or after
                // another unresolved `..`.
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve a raw path against a base directory and normalize the result.
///
/// Absolute inputs ignore the base; relative inputs are joined onto it.
#[must_use]
pub fn resolve_against(base_dir: &Path, raw: &Path) -> PathBuf {
    if raw.is_absolute() {
        normalize_path(raw)
    } else {
        normalize_path(&base_dir.join(raw))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{normalize_path, resolve_against};

    #[test]
    fn normalize_folds_dot_and_dotdot() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d.md")),
            Path::new("/a/c/d.md")
        );
        assert_eq!(normalize_path(Path::new("a/./b")), Path::new("a/b"));
    }

    #[test]
    fn normalize_keeps_leading_parent_components() {
        assert_eq!(normalize_path(Path::new("../x")), Path::new("../x"));
        assert_eq!(normalize_path(Path::new("a/../../x")), Path::new("../x"));
    }

    #[test]
    fn resolve_joins_relative_and_passes_absolute_through() {
        let base = Path::new("/doc");
        assert_eq!(
            resolve_against(base, Path::new("frags/notes.md")),
            Path::new("/doc/frags/notes.md")
        );
        assert_eq!(
            resolve_against(base, Path::new("/other/board.md")),
            Path::new("/other/board.md")
        );
        assert_eq!(
            resolve_against(base, Path::new("./frags/../notes.md")),
            Path::new("/doc/notes.md")
        );
    }
}
