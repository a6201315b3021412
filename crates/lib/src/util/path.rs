//! Lexical path helpers.
//!
//! Hash keys must not depend on where a checkout lives, so paths folded into
//! a key are normalized without touching the filesystem (the files may not
//! exist yet) and expressed relative to a base directory.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without consulting the filesystem.
///
/// A `..` that would climb above the root of an absolute path is dropped; a
/// leading `..` of a relative path is kept.
pub fn normalize(path: &Path) -> PathBuf {
  let mut normalized = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => match normalized.components().next_back() {
        Some(Component::Normal(_)) => {
          normalized.pop();
        }
        Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
        _ => normalized.push(".."),
      },
      other => normalized.push(other.as_os_str()),
    }
  }
  normalized
}

/// Make `path` absolute by joining it onto `base` when it is relative.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
  if path.is_absolute() {
    normalize(path)
  } else {
    normalize(&base.join(path))
  }
}

/// Express `path` relative to `base`, inserting `..` where `path` lies
/// outside of `base`.
///
/// Both paths are normalized first. If they share no common root (different
/// drive prefixes), the normalized `path` is returned unchanged.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
  let path = normalize(path);
  let base = normalize(base);

  let path_parts: Vec<Component<'_>> = path.components().collect();
  let base_parts: Vec<Component<'_>> = base.components().collect();

  let common = path_parts
    .iter()
    .zip(base_parts.iter())
    .take_while(|(a, b)| a == b)
    .count();

  let shares_root = matches!(
    (path_parts.first(), base_parts.first()),
    (Some(a), Some(b)) if a == b
  ) || (!path.has_root() && !base.has_root());

  if !shares_root {
    return path;
  }

  let mut relative = PathBuf::new();
  for _ in common..base_parts.len() {
    relative.push("..");
  }
  for part in &path_parts[common..] {
    relative.push(part.as_os_str());
  }
  if relative.as_os_str().is_empty() {
    relative.push(".");
  }
  relative
}

/// Render a path with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
  let mut out = String::new();
  for component in path.components() {
    match component {
      Component::Prefix(prefix) => out.push_str(&prefix.as_os_str().to_string_lossy()),
      Component::RootDir => out.push('/'),
      other => {
        if !out.is_empty() && !out.ends_with('/') {
          out.push('/');
        }
        out.push_str(&other.as_os_str().to_string_lossy());
      }
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_resolves_dots() {
    assert_eq!(normalize(Path::new("a/./b/../c")), PathBuf::from("a/c"));
    assert_eq!(normalize(Path::new("../a/b/..")), PathBuf::from("../a"));
  }

  #[cfg(unix)]
  #[test]
  fn normalize_does_not_climb_above_root() {
    assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
  }

  #[cfg(unix)]
  #[test]
  fn relative_to_inside_and_outside() {
    assert_eq!(
      relative_to(Path::new("/work/proj/src/main.c"), Path::new("/work/proj")),
      PathBuf::from("src/main.c")
    );
    assert_eq!(
      relative_to(Path::new("/work/other/x.h"), Path::new("/work/proj")),
      PathBuf::from("../other/x.h")
    );
    assert_eq!(relative_to(Path::new("/work/proj"), Path::new("/work/proj")), PathBuf::from("."));
  }

  #[cfg(unix)]
  #[test]
  fn absolutize_joins_relative_paths() {
    assert_eq!(
      absolutize(Path::new("../out/a.o"), Path::new("/work/proj")),
      PathBuf::from("/work/out/a.o")
    );
    assert_eq!(absolutize(Path::new("/abs/./x"), Path::new("/ignored")), PathBuf::from("/abs/x"));
  }

  #[test]
  fn to_slash_uses_forward_slashes() {
    let path: PathBuf = ["a", "b", "c.txt"].iter().collect();
    assert_eq!(to_slash(&path), "a/b/c.txt");
  }
}
