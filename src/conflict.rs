/// Destination-name conflict resolution.
///
/// When a file named like the incoming one already sits in the destination
/// folder, the configured [`DuplicatePolicy`] decides whether to replace it,
/// leave the incoming file where it is, or pick a new name from a
/// [`RenameTemplate`].
///
/// Resolution only inspects the filesystem. Callers that act on a
/// [`Resolution::Renamed`] path must hold the destination folder's lock until
/// the move completes, otherwise two files can claim the same free name.
use crate::category_rules::split_extension;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default template: `photo.jpg` becomes `photo(1).jpg`, `photo(2).jpg`, ...
pub const DEFAULT_RENAME_TEMPLATE: &str = "{stem}({n}){ext}";
/// Default bound on rename attempts.
pub const DEFAULT_MAX_RENAME_ATTEMPTS: u32 = 10_000;

/// What to do when the destination name is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Pick a new name using the rename template.
    #[default]
    Rename,
    /// Leave the incoming file in the source folder.
    Skip,
    /// Replace the existing file.
    Overwrite,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DuplicatePolicy::Rename => "rename",
            DuplicatePolicy::Skip => "skip",
            DuplicatePolicy::Overwrite => "overwrite",
        })
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rename" => Ok(DuplicatePolicy::Rename),
            "skip" => Ok(DuplicatePolicy::Skip),
            "overwrite" => Ok(DuplicatePolicy::Overwrite),
            other => Err(format!(
                "unknown duplicate policy '{}': expected rename, skip or overwrite",
                other
            )),
        }
    }
}

/// Errors produced while resolving a destination name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("no free name for '{filename}' in {} after {attempts} attempts", .folder.display())]
    NamespaceExhausted {
        folder: PathBuf,
        filename: String,
        attempts: u32,
    },
    #[error("invalid rename template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Stem,
    Counter,
    Ext,
}

/// Grammar for disambiguated names.
///
/// Placeholders: `{stem}` (name without extension), `{n}` (counter starting
/// at 1) and `{ext}` (extension including its dot, or empty). `{n}` must
/// appear exactly once so every counter value yields a distinct name.
///
/// ```
/// use autotidy::conflict::RenameTemplate;
///
/// let template = RenameTemplate::parse("{stem}_{n}{ext}").unwrap();
/// assert_eq!(template.render("report.pdf", 3), "report_3.pdf");
/// assert!(RenameTemplate::parse("{stem}-copy{ext}").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl RenameTemplate {
    pub fn parse(template: &str) -> Result<Self, ConflictError> {
        let invalid = |reason: &str| ConflictError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut counters = 0;
        let mut rest = template;

        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(invalid("unmatched '}'"));
            }
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            let segment = match &after[..close] {
                "stem" => Segment::Stem,
                "ext" => Segment::Ext,
                "n" => {
                    counters += 1;
                    Segment::Counter
                }
                _ => return Err(invalid("unknown placeholder")),
            };
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if counters == 0 {
            return Err(invalid("missing {n}"));
        }
        if counters > 1 {
            return Err(invalid("{n} may appear only once"));
        }

        if segments
            .iter()
            .any(|s| matches!(s, Segment::Literal(text) if text.contains(['/', '\\'])))
        {
            return Err(invalid("path separators are not allowed"));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Renders the disambiguated name for `filename` with counter `n`.
    pub fn render(&self, filename: &str, n: u32) -> String {
        let (stem, ext) = split_extension(filename);
        let mut name = String::with_capacity(filename.len() + 8);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Stem => name.push_str(stem),
                Segment::Counter => name.push_str(&n.to_string()),
                Segment::Ext => name.push_str(ext),
            }
        }
        name
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for RenameTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_RENAME_TEMPLATE.to_string(),
            segments: vec![
                Segment::Stem,
                Segment::Literal("(".to_string()),
                Segment::Counter,
                Segment::Literal(")".to_string()),
                Segment::Ext,
            ],
        }
    }
}

/// The destination chosen for an incoming file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing exists at the natural destination.
    Free(PathBuf),
    /// The natural destination exists and will be replaced.
    Replace(PathBuf),
    /// The natural destination exists; this disambiguated path is free.
    Renamed(PathBuf),
    /// The natural destination exists and the file must stay where it is.
    Skip,
}

/// Applies a duplicate policy to candidate destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResolver {
    policy: DuplicatePolicy,
    template: RenameTemplate,
    max_attempts: u32,
}

impl ConflictResolver {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            template: RenameTemplate::default(),
            max_attempts: DEFAULT_MAX_RENAME_ATTEMPTS,
        }
    }

    pub fn with_template(mut self, template: RenameTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Computes where `filename` should land inside `folder`.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError::NamespaceExhausted`] when the rename policy
    /// finds no free name within the attempt bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use autotidy::conflict::{ConflictResolver, DuplicatePolicy, Resolution};
    ///
    /// let dir = std::env::temp_dir().join("autotidy-doc-empty-folder");
    /// let resolver = ConflictResolver::new(DuplicatePolicy::Skip);
    /// assert_eq!(
    ///     resolver.resolve(&dir, "a.jpg").unwrap(),
    ///     Resolution::Free(dir.join("a.jpg"))
    /// );
    /// ```
    pub fn resolve(&self, folder: &Path, filename: &str) -> Result<Resolution, ConflictError> {
        let natural = folder.join(filename);
        if !occupied(&natural) {
            return Ok(Resolution::Free(natural));
        }

        match self.policy {
            DuplicatePolicy::Skip => Ok(Resolution::Skip),
            DuplicatePolicy::Overwrite => Ok(Resolution::Replace(natural)),
            DuplicatePolicy::Rename => {
                for n in 1..=self.max_attempts {
                    let candidate = folder.join(self.template.render(filename, n));
                    if !occupied(&candidate) {
                        return Ok(Resolution::Renamed(candidate));
                    }
                }
                Err(ConflictError::NamespaceExhausted {
                    folder: folder.to_path_buf(),
                    filename: filename.to_string(),
                    attempts: self.max_attempts,
                })
            }
        }
    }
}

/// True if anything, including a dangling symlink, sits at `path`.
pub(crate) fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
