// Volume paths as owned segment lists

use std::fmt;

/// A path inside a FAT volume, e.g. `\title\00030017\content`.
///
/// Both `\` and `/` separate segments; empty segments are ignored, so the
/// root can be written as `\`, `/` or an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FatPath {
    segments: Vec<String>,
}

impl FatPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(path: &str) -> Self {
        let segments = path
            .split(['\\', '/'])
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Containing directory, `None` for the root
    pub fn parent(&self) -> Option<FatPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn join(&self, name: &str) -> FatPath {
        let mut joined = self.clone();
        joined.segments.extend(Self::parse(name).segments);
        joined
    }
}

impl fmt::Display for FatPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "\\");
        }
        for segment in &self.segments {
            write!(f, "\\{}", segment)?;
        }
        Ok(())
    }
}

impl From<&str> for FatPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_separators() {
        let path = FatPath::parse("\\title/00030017\\\\content");
        assert_eq!(path.segments(), &["title", "00030017", "content"]);
        assert_eq!(path.to_string(), "\\title\\00030017\\content");
        assert_eq!(path.file_name(), Some("content"));
        assert_eq!(path.parent().unwrap().to_string(), "\\title\\00030017");
    }

    #[test]
    fn test_root_forms() {
        for root in ["", "\\", "/", "\\\\"] {
            let path = FatPath::parse(root);
            assert!(path.is_root());
            assert_eq!(path.parent(), None);
            assert_eq!(path.to_string(), "\\");
        }
        assert_eq!(FatPath::root().join("sys").to_string(), "\\sys");
    }
}
