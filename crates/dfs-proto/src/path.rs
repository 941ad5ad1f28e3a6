/// Distributed file system paths.
///
/// A path is an immutable sequence of components. The canonical string form
/// is `/` for the root and `/c1/c2/.../cn` otherwise. Components may not be
/// empty and may not contain the separator (`/`) or the reserved delimiter
/// (`:`).
///
/// Paths are ordered so that an ancestor always precedes its descendants.
/// Anything that must lock several paths at once locks them in increasing
/// order; because locking a path also locks every ancestor, this is the
/// order that rules out lock cycles.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{PATH_DELIMITER, PATH_SEPARATOR};
use crate::error::{FsError, FsResult};

#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    /// The root directory.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path string. Empty components (`//`) are dropped.
    pub fn parse(s: &str) -> FsResult<Self> {
        if !s.starts_with(PATH_SEPARATOR) {
            return Err(FsError::invalid(format!("path {s:?} is not absolute")));
        }
        if s.contains(PATH_DELIMITER) {
            return Err(FsError::invalid(format!(
                "path {s:?} contains reserved character {PATH_DELIMITER:?}"
            )));
        }
        let components = s
            .split(PATH_SEPARATOR)
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(Self { components })
    }

    /// Append one component to this path.
    pub fn child(&self, component: &str) -> FsResult<Self> {
        if component.is_empty() {
            return Err(FsError::invalid("empty path component"));
        }
        if component.contains(PATH_SEPARATOR) || component.contains(PATH_DELIMITER) {
            return Err(FsError::invalid(format!(
                "path component {component:?} contains a separator or delimiter"
            )));
        }
        let mut components = self.components.clone();
        components.push(component.to_owned());
        Ok(Self { components })
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of components; zero for the root.
    #[inline]
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Path of the parent directory.
    pub fn parent(&self) -> FsResult<Self> {
        match self.components.split_last() {
            Some((_, init)) => Ok(Self {
                components: init.to_vec(),
            }),
            None => Err(FsError::invalid("the root directory has no parent")),
        }
    }

    /// Last component of the path.
    pub fn last(&self) -> FsResult<&str> {
        self.components
            .last()
            .map(String::as_str)
            .ok_or_else(|| FsError::invalid("the root directory has no last component"))
    }

    /// Whether `other` is a prefix of this path. Every path is a subpath of
    /// itself and of the root. Prefixes are whole components: `/ab` is not
    /// below `/a`.
    pub fn is_subpath(&self, other: &Path) -> bool {
        self.components.starts_with(&other.components)
    }

    /// Every prefix of this path, from the root down to the path itself.
    ///
    /// This is the order in which the chain is locked.
    pub fn sub_paths(&self) -> Vec<Path> {
        (0..=self.components.len())
            .map(|n| Self {
                components: self.components[..n].to_vec(),
            })
            .collect()
    }

    /// Location of this path below a directory of the local file system.
    ///
    /// `.` and `..` are valid component names but would leave `root`, so
    /// they are refused with `InvalidArgument`.
    pub fn to_local(&self, root: &std::path::Path) -> FsResult<std::path::PathBuf> {
        if let Some(bad) = self.components().find(|c| is_relative_step(c)) {
            return Err(FsError::invalid(format!("{self}: {bad:?} cannot be mapped locally")));
        }
        let mut local = root.to_path_buf();
        local.extend(self.components.iter());
        Ok(local)
    }
}

impl Ord for Path {
    /// Ancestors sort before descendants; unrelated paths compare at the
    /// first differing component.
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.components.iter().zip(other.components.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.components.len().cmp(&other.components.len())
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl FromStr for Path {
    type Err = FsError;

    fn from_str(s: &str) -> FsResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = FsError;

    fn try_from(s: String) -> FsResult<Self> {
        Self::parse(&s)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

/// `.` and `..` name the current and parent directory on the local file
/// system.
fn is_relative_step(component: &str) -> bool {
    component == "." || component == ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn test_root() {
        let root = Path::root();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");
        assert_eq!(p("/"), root);
        assert_eq!(p("///"), root);
        assert!(root.parent().is_err());
        assert!(root.last().is_err());
    }

    #[test]
    fn test_parse_canonicalizes() {
        for (input, canonical) in [
            ("/a", "/a"),
            ("/a/b/c", "/a/b/c"),
            ("//a//b/", "/a/b"),
            ("/dir/file.txt", "/dir/file.txt"),
        ] {
            let path = p(input);
            assert_eq!(path.to_string(), canonical);
            assert_eq!(p(&path.to_string()), path);
        }
    }

    #[test]
    fn test_parse_rejects_bad_strings() {
        assert!(matches!(Path::parse("a/b"), Err(FsError::InvalidArgument(_))));
        assert!(matches!(Path::parse(""), Err(FsError::InvalidArgument(_))));
        assert!(matches!(Path::parse("/a:b"), Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn test_child() {
        let path = Path::root().child("etc").unwrap().child("hosts").unwrap();
        assert_eq!(path, p("/etc/hosts"));
        assert!(Path::root().child("").is_err());
        assert!(Path::root().child("a/b").is_err());
        assert!(Path::root().child("a:b").is_err());
    }

    #[test]
    fn test_parent_and_last() {
        let path = p("/var/log/syslog");
        assert_eq!(path.parent().unwrap(), p("/var/log"));
        assert_eq!(path.last().unwrap(), "syslog");
        assert_eq!(p("/var").parent().unwrap(), Path::root());
        assert_eq!(path.depth(), 3);
    }

    #[test]
    fn test_is_subpath() {
        let path = p("/a/b/c");
        assert!(path.is_subpath(&path));
        assert!(path.is_subpath(&p("/a/b")));
        assert!(path.is_subpath(&Path::root()));
        assert!(!p("/a/b").is_subpath(&path));
        // Component-wise, not character-wise.
        assert!(!p("/ab").is_subpath(&p("/a")));
    }

    #[test]
    fn test_sub_paths_are_root_first() {
        let chain = p("/a/b/c").sub_paths();
        assert_eq!(chain, vec![Path::root(), p("/a"), p("/a/b"), p("/a/b/c")]);
        assert_eq!(Path::root().sub_paths(), vec![Path::root()]);
        assert!(chain.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_ordering_puts_ancestors_first() {
        assert!(Path::root() < p("/a"));
        assert!(p("/a") < p("/a/b"));
        assert!(p("/a/z") < p("/b"));
        // Not a raw string comparison: "/a-b" < "/a/b" as strings.
        assert!(p("/a") < p("/a-b"));
        assert!(p("/a/b") < p("/a-b"));

        let mut paths = vec![p("/b"), p("/a/b/c"), Path::root(), p("/a"), p("/a/b")];
        paths.sort();
        assert_eq!(paths, vec![Path::root(), p("/a"), p("/a/b"), p("/a/b/c"), p("/b")]);
    }

    #[test]
    fn test_to_local() {
        let root = std::path::Path::new("/srv/data");
        let local = p("/x/y").to_local(root).unwrap();
        assert_eq!(local, std::path::PathBuf::from("/srv/data/x/y"));
        assert_eq!(
            Path::root().to_local(root).unwrap(),
            std::path::PathBuf::from("/srv/data")
        );
        // Dots are fine as names but never resolved against the root.
        assert_eq!(
            p("/x/.hidden/y..z").to_local(root).unwrap(),
            std::path::PathBuf::from("/srv/data/x/.hidden/y..z")
        );
        for escaping in ["/..", "/../etc", "/x/./y", "/x/.."] {
            assert!(matches!(
                p(escaping).to_local(root),
                Err(FsError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_serde_validates() {
        let bytes = bincode::serialize(&p("/a/b")).unwrap();
        let back: Path = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, p("/a/b"));

        let bogus = bincode::serialize(&"no-slash".to_string()).unwrap();
        assert!(bincode::deserialize::<Path>(&bogus).is_err());
    }
}
