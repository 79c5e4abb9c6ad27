use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    borrow::Cow,
    fmt::{Display, Formatter},
    path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR},
};

/// Utility function to replace separators and convert to unicode (via to_string_lossy) on os path.
pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    let res = os_path_ref
        .as_ref()
        .components()
        .map(|c| match c {
            Component::RootDir => Cow::from("".to_string()),
            _ => c.as_os_str().to_string_lossy(),
        })
        .collect::<Vec<_>>()
        .join("/");
    tracing::debug!(
        "os_path_to_string: turned {:?} into {}",
        os_path_ref.as_ref().components(),
        res
    );
    res
}

pub fn string_to_os_path(path_string: &str) -> PathBuf {
    let res = PathBuf::from(path_string.replace("/", MAIN_SEPARATOR_STR));
    tracing::debug!("string_to_os_path: turned '{}' into {:?}", path_string, res);
    res
}

/// A vault relative document path (`folder/sub/Note.md`) split into its pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocPath<'a> {
    pub path: &'a str,
    /// Index of '/' separating the folder from the file name
    dir_sep: Option<usize>,
    /// Index of '.' separating the file stem from the extension
    ext_sep: Option<usize>,
}

impl<'a> DocPath<'a> {
    pub fn new(path: &'a str) -> DocPath<'a> {
        let dir_sep = path.rfind('/');
        let name_start = dir_sep.map(|idx| idx + 1).unwrap_or(0);
        // Hidden files have no extension
        let ext_sep = path[name_start..]
            .rfind('.')
            .filter(|idx| *idx > 0)
            .map(|idx| idx + name_start);
        DocPath {
            path,
            dir_sep,
            ext_sep,
        }
    }

    pub fn dir(&self) -> &'a str {
        &self.path[0..self.dir_sep.unwrap_or(0)]
    }

    pub fn filename(&self) -> &'a str {
        &self.path[self.dir_sep.map(|idx| idx + 1).unwrap_or(0)..]
    }

    pub fn filestem(&self) -> &'a str {
        let start = self.dir_sep.map(|idx| idx + 1).unwrap_or(0);
        &self.path[start..self.ext_sep.unwrap_or(self.path.len())]
    }

    pub fn ext(&self) -> &'a str {
        self.ext_sep
            .map(|idx| &self.path[idx + 1..])
            .unwrap_or("")
    }

    /// The path without its `.md` extension, as used for link targets.
    pub fn link_target(&self) -> &'a str {
        if self.ext() == "md" {
            &self.path[0..self.ext_sep.unwrap_or(self.path.len())]
        } else {
            self.path
        }
    }

    /// Render a link to this document.
    ///
    /// Wiki links use the bare file stem for root level documents and `folder/stem|stem` for
    /// nested ones. Markdown links always carry the full path.
    pub fn to_link(&self, markdown: bool) -> String {
        if markdown {
            format!("[{}](<{}>)", self.filestem(), self.path)
        } else if self.dir().is_empty() {
            format!("[[{}]]", self.link_target())
        } else {
            format!("[[{}|{}]]", self.link_target(), self.filestem())
        }
    }
}

impl<'a, T: AsRef<str> + ?Sized> From<&'a T> for DocPath<'a> {
    fn from(s: &'a T) -> DocPath<'a> {
        DocPath::new(s.as_ref())
    }
}

impl<'a> Display for DocPath<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

static WIKI_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\[(?P<target>[^\]|#]*)(#[^\]|]*)?(\|[^\]]*)?\]\]$").unwrap());
static MD_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[^\]]*\]\(<?(?P<target>[^)>]*)>?\)$").unwrap());

/// Whether an item is link or tag syntax that must be passed through untouched.
pub fn is_link_or_tag(item: &str) -> bool {
    let item = item.trim();
    item.starts_with("[[") || item.starts_with('#') || MD_LINK_RE.is_match(item)
}

/// Extract the target of a wiki or markdown link, if `text` is one.
pub fn link_target(text: &str) -> Option<&str> {
    let text = text.trim();
    WIKI_LINK_RE
        .captures(text)
        .or_else(|| MD_LINK_RE.captures(text))
        .and_then(|caps| caps.name("target"))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_path_parsing() {
        let dp = DocPath::from("dir/sub/file.md");
        assert_eq!(dp.dir(), "dir/sub");
        assert_eq!(dp.filename(), "file.md");
        assert_eq!(dp.filestem(), "file");
        assert_eq!(dp.ext(), "md");
        assert_eq!(dp.link_target(), "dir/sub/file");

        let dp = DocPath::from("file.md");
        assert_eq!(dp.dir(), "");
        assert_eq!(dp.filestem(), "file");

        let dp = DocPath::from("dir/.hidden");
        assert_eq!(dp.filestem(), ".hidden");
        assert_eq!(dp.ext(), "");
    }

    #[test]
    fn test_links() {
        assert_eq!(DocPath::from("A.md").to_link(false), "[[A]]");
        assert_eq!(DocPath::from("f/A.md").to_link(false), "[[f/A|A]]");
        assert_eq!(DocPath::from("f/A.md").to_link(true), "[A](<f/A.md>)");

        assert_eq!(link_target("[[f/A|A]]"), Some("f/A"));
        assert_eq!(link_target("[[A#Heading]]"), Some("A"));
        assert_eq!(link_target("[A](<f/A.md>)"), Some("f/A.md"));
        assert_eq!(link_target("plain"), None);

        assert!(is_link_or_tag("[[A]]"));
        assert!(is_link_or_tag("#tag"));
        assert!(!is_link_or_tag("\"[[A]]\""));
    }
}
