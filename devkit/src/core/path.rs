//! Safe resolution of configured state paths.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{DevkitError, Result};

/// Resolve `candidate` against `base` and require the result to stay inside `base`.
///
/// Both sides are made absolute and normalized before comparison: symlinks
/// in the existing part of each path are resolved and `.`/`..` segments are
/// applied. Components that do not exist yet are normalized lexically, so the
/// target file (and even `base`) need not exist. Nothing is created.
pub fn resolve_within(base: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let candidate = candidate.as_ref();
    let base_abs = std::path::absolute(base)
        .map_err(|err| DevkitError::io("resolve base directory", base, err))?;
    let base_resolved = normalize(&base_abs)
        .map_err(|err| DevkitError::io("resolve base directory", base, err))?;

    let resolved = normalize(&base_abs.join(candidate))
        .map_err(|err| DevkitError::io("resolve path", candidate, err))?;

    if !resolved.starts_with(&base_resolved) {
        return Err(DevkitError::PathTraversal {
            path: candidate.to_path_buf(),
        });
    }
    Ok(resolved)
}

enum Segment {
    Parent,
    Name(OsString),
}

/// Canonicalize the longest existing prefix of `path`, then apply the rest lexically.
fn normalize(path: &Path) -> io::Result<PathBuf> {
    let mut head = path.to_path_buf();
    let mut tail = Vec::new();
    loop {
        match head.canonicalize() {
            Ok(mut resolved) => {
                for segment in tail.iter().rev() {
                    match segment {
                        Segment::Parent => {
                            resolved.pop();
                        }
                        Segment::Name(name) => resolved.push(name),
                    }
                }
                return Ok(resolved);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                match head.components().next_back() {
                    Some(Component::ParentDir) => tail.push(Segment::Parent),
                    Some(Component::Normal(name)) => tail.push(Segment::Name(name.to_owned())),
                    Some(Component::CurDir) => {}
                    _ => return Err(err),
                }
                if !head.pop() {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_file_name_resolves_inside_base() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolved = resolve_within(temp.path(), "modules.json").expect("resolve");
        let base = temp.path().canonicalize().expect("canonicalize");
        assert_eq!(resolved, base.join("modules.json"));
        assert!(!resolved.exists());
    }

    #[test]
    fn nested_missing_directories_are_allowed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolved = resolve_within(temp.path(), "state/./nested/../runs.json").expect("resolve");
        let base = temp.path().canonicalize().expect("canonicalize");
        assert_eq!(resolved, base.join("state").join("runs.json"));
    }

    #[test]
    fn parent_escape_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = resolve_within(temp.path(), "../evil.json").unwrap_err();
        assert!(matches!(err, DevkitError::PathTraversal { .. }));
        assert!(!temp.path().parent().expect("parent").join("evil.json").exists());
    }

    #[test]
    fn escape_through_missing_directory_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = resolve_within(temp.path(), "missing/../../evil.json").unwrap_err();
        assert!(matches!(err, DevkitError::PathTraversal { .. }));
    }

    #[test]
    fn absolute_candidate_outside_base_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let other = tempfile::tempdir().expect("tempdir");
        let err = resolve_within(temp.path(), other.path().join("x.json")).unwrap_err();
        assert!(matches!(err, DevkitError::PathTraversal { .. }));
    }

    #[test]
    fn absolute_candidate_inside_base_is_allowed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolved = resolve_within(temp.path(), temp.path().join("x.json")).expect("resolve");
        assert!(resolved.ends_with("x.json"));
    }

    #[test]
    fn prefix_sibling_is_not_inside_base() {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().join("state");
        std::fs::create_dir(&base).expect("mkdir");
        std::fs::create_dir(temp.path().join("state-other")).expect("mkdir");
        let err = resolve_within(&base, "../state-other/x.json").unwrap_err();
        assert!(matches!(err, DevkitError::PathTraversal { .. }));
    }

    #[test]
    fn missing_base_directory_still_resolves() {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().join("not-yet");
        let resolved = resolve_within(&base, "modules.json").expect("resolve");
        assert!(resolved.ends_with("not-yet/modules.json"));
        assert!(!base.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).expect("symlink");
        let err = resolve_within(temp.path(), "link/modules.json").unwrap_err();
        assert!(matches!(err, DevkitError::PathTraversal { .. }));
    }
}
