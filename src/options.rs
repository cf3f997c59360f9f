use http::{Method, StatusCode};
use mime::Mime;
use regex::Regex;

use crate::encoding::EncodingMapping;

/// Three-state knob for a header that can be derived, forced, or suppressed.
///
/// Mirrors the `string | false` shape of the configuration surface: `Auto`
/// derives the value from resource metadata, `Value` forces it verbatim, and
/// `Off` suppresses the header entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Setting<T> {
    #[default]
    Auto,
    Off,
    Value(T),
}

impl<T> Setting<T> {
    pub fn is_auto(&self) -> bool {
        matches!(self, Setting::Auto)
    }

    pub fn is_off(&self) -> bool {
        matches!(self, Setting::Off)
    }
}

/// What to do when a reference names a directory (trailing slash).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnDirectory {
    /// Reject the reference with a `TrailingSlash` error.
    #[default]
    Reject,
    /// Serve a generated HTML listing of the directory.
    ListFiles,
    /// Append `index.html` and serve that file instead.
    ServeIndex,
}

/// Pairs a MIME matcher with the charset to advertise for it.
#[derive(Debug, Clone)]
pub struct CharsetRule {
    pub matcher: Regex,
    pub charset: String,
}

impl CharsetRule {
    pub fn new(matcher: Regex, charset: impl Into<String>) -> Self {
        CharsetRule {
            matcher,
            charset: charset.into(),
        }
    }
}

/// Pluggable filename → MIME resolution.
pub trait MimeResolver: Send + Sync {
    fn resolve(&self, file_name: &str) -> Option<Mime>;
}

/// Default resolver backed by the extension database in `mime_guess`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuessResolver;

impl MimeResolver for GuessResolver {
    fn resolve(&self, file_name: &str) -> Option<Mime> {
        mime_guess::from_path(file_name).first()
    }
}

impl<F> MimeResolver for F
where
    F: Fn(&str) -> Option<Mime> + Send + Sync,
{
    fn resolve(&self, file_name: &str) -> Option<Mime> {
        (self)(file_name)
    }
}

/// Response-planning configuration, fixed at [`Streamer`](crate::Streamer)
/// construction.
pub struct ServeOptions {
    /// `Cache-Control` to emit; `Auto` means `public, max-age=0`.
    pub cache_control: Setting<String>,
    /// Emit `Last-Modified` derived from the resource mtime.
    pub last_modified: bool,
    /// Emit `ETag` derived from size, mtime, and content encoding.
    pub etag: bool,
    /// Mark derived entity tags weak (`W/"…"`).
    pub weak_etags: bool,
    /// Fallback media type when no resolver produces one.
    pub default_content_type: Option<Mime>,
    /// Charset rules applied to resolved media types; `None` disables the
    /// `; charset=` suffix entirely.
    pub default_charsets: Option<Vec<CharsetRule>>,
    /// Upper bound on ranges honored per request. `0` disables range
    /// support, `1` disables multipart responses.
    pub max_ranges: usize,
    /// Methods answered with anything other than 405.
    pub allowed_methods: Vec<Method>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        ServeOptions {
            cache_control: Setting::Auto,
            last_modified: true,
            etag: true,
            weak_etags: false,
            default_content_type: None,
            default_charsets: Some(default_charset_rules()),
            max_ranges: DEFAULT_MAX_RANGES,
            allowed_methods: vec![Method::GET, Method::HEAD],
        }
    }
}

pub const DEFAULT_MAX_RANGES: usize = 200;

/// `text/*` and the two script-ish application types are served as UTF-8
/// unless the storage says otherwise.
pub fn default_charset_rules() -> Vec<CharsetRule> {
    vec![CharsetRule::new(
        Regex::new(r"^(?:text/.+|application/(?:javascript|json))$").expect("charset matcher"),
        "UTF-8",
    )]
}

/// File-system storage configuration, fixed at
/// [`FsStorage`](crate::FsStorage) construction.
pub struct FsOptions {
    /// Segments matching this pattern are rejected with `IgnoredFile`.
    /// `None` disables ignore filtering.
    pub ignore_pattern: Option<Regex>,
    /// Trailing-slash handling.
    pub on_directory: OnDirectory,
    /// Precompressed-variant mappings, tried in order; the first whose
    /// matcher hits the resolved path drives negotiation.
    pub encoding_mappings: Vec<EncodingMapping>,
    /// Filename → MIME resolution for this storage.
    pub mime_resolver: Box<dyn MimeResolver>,
}

impl Default for FsOptions {
    fn default() -> Self {
        FsOptions {
            ignore_pattern: Some(default_ignore_pattern()),
            on_directory: OnDirectory::Reject,
            encoding_mappings: Vec::new(),
            mime_resolver: Box::new(GuessResolver),
        }
    }
}

/// Dotfiles are invisible by default.
pub fn default_ignore_pattern() -> Regex {
    Regex::new(r"^\.").expect("ignore matcher")
}

/// Disposition type for the `Content-Disposition` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispositionType {
    #[default]
    Inline,
    Attachment,
}

impl DispositionType {
    pub fn as_str(self) -> &'static str {
        match self {
            DispositionType::Inline => "inline",
            DispositionType::Attachment => "attachment",
        }
    }
}

/// Per-request overrides applied on top of [`ServeOptions`].
#[derive(Default)]
pub struct ResponseOptions {
    pub cache_control: Setting<String>,
    pub last_modified: Setting<String>,
    pub etag: Setting<String>,
    pub content_type: Setting<String>,
    pub content_disposition_type: Setting<DispositionType>,
    pub content_disposition_filename: Setting<String>,
    /// Forcing a status code skips conditional-GET and range processing and
    /// serves the full body with that status.
    pub status_code: Option<StatusCode>,
}
