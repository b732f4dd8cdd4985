/// Extension-based categorization rules.
///
/// This module maps a filename's extension to a named category and the folder
/// that category's files are moved into. Rules are evaluated in declared order
/// and the first enabled rule listing the extension wins.
///
/// # Examples
///
/// ```
/// use autotidy::category_rules::{CategoryRule, CategoryRules, Classification};
/// use std::path::Path;
///
/// let rules = CategoryRules::new(vec![CategoryRule::new("Images", "/dl/img", ["jpg", ".PNG"])]);
/// assert_eq!(
///     rules.classify("holiday.JPG"),
///     Classification::Matched { category: "Images", destination: Path::new("/dl/img") }
/// );
/// assert_eq!(rules.classify("README"), Classification::Unmatched);
/// ```
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Built-in category table: name, folder name under the user's home, extensions.
///
/// Extensions appear in exactly one category so the standard table never
/// produces ambiguity warnings.
pub const STANDARD_CATEGORIES: &[(&str, &str, &[&str])] = &[
    (
        "Images",
        "Images",
        &[
            "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "svg", "ico", "raw", "cr2",
            "nef", "arw", "dng", "psd", "ai", "eps", "heic", "heif", "jfif", "jp2", "jpx", "j2k",
            "j2c",
        ],
    ),
    (
        "Videos",
        "Videos",
        &[
            "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "3gp", "mpg", "mpeg", "mts",
            "m2ts", "vob", "ogv", "dv", "f4v", "asf", "rm", "rmvb", "ts", "mxf", "roq", "nsv",
        ],
    ),
    (
        "Audio",
        "Music",
        &[
            "mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "opus", "aiff", "au", "ra", "dts",
            "ac3", "amr", "ape", "cda", "mid", "midi", "mka", "mp2", "mpa", "mpc", "oga", "spx",
            "tta", "voc", "vqf", "w64",
        ],
    ),
    (
        "Documents",
        "Documents",
        &[
            "pdf", "doc", "docx", "txt", "rtf", "odt", "pages", "tex", "wpd", "wps", "xps", "oxps",
            "mobi", "azw", "azw3", "epub", "fb2", "lit", "pdb", "tcr", "prc", "djvu", "djv", "cbr",
            "cbz", "cb7", "cbt",
        ],
    ),
    (
        "Code",
        "Code",
        &[
            "py", "js", "html", "css", "java", "cpp", "c", "php", "rb", "go", "rs", "swift", "kt",
            "jsx", "tsx", "vue", "scss", "sass", "less", "sql", "sh", "bat", "ps1", "vbs", "pl",
            "r", "scala", "clj", "hs", "elm", "dart", "lua", "groovy", "coffee", "cs", "vb", "fs",
            "ml", "pas", "dpr", "asm", "s", "forth", "lisp", "scm", "rkt", "jl", "nim", "cr", "d",
            "zig",
        ],
    ),
    (
        "Archives",
        "Archives",
        &[
            "zip", "rar", "7z", "tar", "gz", "bz2", "xz", "lz", "lzma", "z", "cab", "iso", "dmg",
            "pkg", "deb", "rpm", "msi", "exe", "app", "apk", "ipa", "jar", "war", "ear", "ace",
            "arj", "lha", "lzh", "sit", "sitx", "sea", "zoo", "cpio", "shar", "lbr", "mar", "sbx",
            "tgz", "tbz", "tbz2", "txz",
        ],
    ),
    (
        "Spreadsheets",
        "Spreadsheets",
        &[
            "xlsx", "xls", "csv", "ods", "numbers", "xlsm", "xlsb", "xlt", "xltx", "xltm", "ots",
            "fods", "uos", "dif", "sylk", "slk", "pxl", "wb1", "wb2", "wb3", "qpw", "123", "wk1",
            "wk3", "wk4", "wks",
        ],
    ),
    (
        "Presentations",
        "Presentations",
        &[
            "pptx", "ppt", "odp", "key", "pps", "ppsx", "pptm", "ppsm", "pot", "potx", "potm",
            "otp", "fodp", "uop", "shf", "show", "prez", "sti", "kth",
        ],
    ),
    (
        "Fonts",
        "Fonts",
        &[
            "ttf", "otf", "woff", "woff2", "eot", "pfb", "pfm", "afm", "bdf", "pcf", "snf", "pfa",
            "gsf", "fon", "fnt", "ttc", "otc", "dfont", "suit", "lwfn", "ffil", "vfb", "sfd", "ufd",
        ],
    ),
    (
        "Executables",
        "Programs",
        &[
            "run", "bin", "appimage", "flatpak", "snap", "com", "scr", "gadget", "msp", "msu",
        ],
    ),
];

/// A named bucket of extensions sharing one destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    /// Unique category name, e.g. "Images".
    pub name: String,
    /// Folder that matching files are moved into.
    pub destination: PathBuf,
    /// Disabled rules are kept in the table but never match.
    pub enabled: bool,
    extensions: Vec<String>,
}

impl CategoryRule {
    /// Creates an enabled rule. Extensions are lowercased and any leading dot
    /// is stripped; duplicates and empty entries are dropped.
    pub fn new<I, S>(name: impl Into<String>, destination: impl Into<PathBuf>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rule = Self {
            name: name.into(),
            destination: destination.into(),
            enabled: true,
            extensions: Vec::new(),
        };
        for ext in extensions {
            rule.add_extension(ext.as_ref());
        }
        rule
    }

    /// Returns this rule with `enabled` set to the given value.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Adds an extension, normalizing case and leading dot.
    pub fn add_extension(&mut self, ext: &str) {
        let ext = normalize_extension(ext);
        if !ext.is_empty() && !self.extensions.contains(&ext) {
            self.extensions.push(ext);
        }
    }

    /// The normalized extensions, in declared order.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// Result of classifying a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    /// The first enabled rule listing the file's extension.
    Matched {
        /// Name of the winning category.
        category: &'a str,
        /// Destination folder of the winning category.
        destination: &'a Path,
    },
    /// No extension, or no enabled rule lists it.
    Unmatched,
}

/// An extension claimed by more than one enabled category.
///
/// The earlier category wins; this is reported as a configuration warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionConflict {
    pub extension: String,
    pub winner: String,
    pub shadowed: String,
}

impl fmt::Display for ExtensionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "extension '{}' is listed by both '{}' and '{}'; '{}' wins",
            self.extension, self.winner, self.shadowed, self.winner
        )
    }
}

/// Ordered table of category rules with a precomputed extension index.
#[derive(Debug, Clone, Default)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
    index: HashMap<String, usize>,
    conflicts: Vec<ExtensionConflict>,
}

impl CategoryRules {
    /// Builds the table, resolving each extension to its first enabled rule.
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut conflicts = Vec::new();

        for (position, rule) in rules.iter().enumerate() {
            if !rule.enabled {
                continue;
            }
            for ext in &rule.extensions {
                match index.get(ext) {
                    Some(&winner) => conflicts.push(ExtensionConflict {
                        extension: ext.clone(),
                        winner: rules[winner].name.clone(),
                        shadowed: rule.name.clone(),
                    }),
                    None => {
                        index.insert(ext.clone(), position);
                    }
                }
            }
        }

        Self {
            rules,
            index,
            conflicts,
        }
    }

    /// The built-in table with every category folder placed under `root`.
    pub fn standard(root: &Path) -> Self {
        let rules = STANDARD_CATEGORIES
            .iter()
            .map(|(name, folder, extensions)| {
                CategoryRule::new(*name, root.join(folder), extensions.iter())
            })
            .collect();
        Self::new(rules)
    }

    /// Classifies a filename by the text after its last '.'.
    ///
    /// Matching is case-insensitive. Files without a '.' (or with nothing
    /// after the last one) are [`Classification::Unmatched`].
    pub fn classify(&self, filename: &str) -> Classification<'_> {
        let Some(ext) = extension_of(filename) else {
            return Classification::Unmatched;
        };

        match self.index.get(&ext) {
            Some(&position) => {
                let rule = &self.rules[position];
                Classification::Matched {
                    category: &rule.name,
                    destination: &rule.destination,
                }
            }
            None => Classification::Unmatched,
        }
    }

    /// Extensions claimed by more than one enabled rule.
    pub fn conflicts(&self) -> &[ExtensionConflict] {
        &self.conflicts
    }

    /// All rules, enabled or not, in declared order.
    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }
}

/// Lowercases an extension and strips surrounding whitespace and leading dots.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Splits a filename into its stem and its extension including the dot.
///
/// A dot at position zero starts a dotfile name, not an extension.
pub(crate) fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(dot) if dot > 0 => filename.split_at(dot),
        _ => (filename, ""),
    }
}

/// Extracts the lowercased text after the last '.' of a filename.
///
/// ```
/// use autotidy::category_rules::extension_of;
///
/// assert_eq!(extension_of("archive.tar.GZ"), Some("gz".to_string()));
/// assert_eq!(extension_of("Makefile"), None);
/// assert_eq!(extension_of("trailing."), None);
/// assert_eq!(extension_of(".jpg"), None);
/// ```
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = split_extension(filename);
    let ext = ext.strip_prefix('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
