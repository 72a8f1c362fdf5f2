//! Removal of development-only markup from HTML documents.
//!
//! Dev servers inject hot-reload bootstraps and client scripts into every
//! page. [`sanitize`] strips them, together with HTML comments and runs of
//! blank lines, before the document leaves the server.
//!
//! # Rules
//!
//! Applied in this order on every pass:
//! 1. `<script type="module">` blocks that bootstrap the hot-reload hook
//! 2. `<script src="…">` tags loading a dev client module
//! 3. `<!-- … -->` comments
//! 4. blank-line runs collapsed to a single newline
//!
//! Passes repeat until the text stops changing. A removal can expose a new
//! match (`<!<!-- x -->-- y -->`), and the fixpoint keeps `sanitize`
//! idempotent. Each changing pass strictly shortens the text.
//!
//! This is pattern matching, not parsing. Malformed markup is left alone.
//! A `<script` opening followed by another opening before its closing tag
//! (for example inside a comment or a string) is never treated as an
//! element, so no span of unrelated markup is removed with it.

use std::sync::LazyLock;

use regex::Regex;

/// Script paths served only by a development server.
pub const DEV_CLIENT_PATHS: &[&str] = &["/@vite/client", "/@react-refresh"];

static SCRIPT_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<script\b([^>]*)>").expect("script open pattern is valid")
});

static SCRIPT_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</script\s*>").expect("script close pattern is valid"));

/// The hot-reload bootstrap starts by importing the hook from the refresh runtime.
static HMR_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s*\{[^}]*\binjectIntoGlobalHook\b[^}]*\}\s*from\s*["']/@react-refresh["']"#)
        .expect("hook import pattern is valid")
});

static MODULE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)type\s*=\s*["']?module(?:["'\s/]|$)"#)
        .expect("module type pattern is valid")
});

static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)src\s*=\s*["']?([^"'\s>]+)"#).expect("src pattern is valid")
});

static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern is valid"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("blank line pattern is valid"));

/// Sanitize a complete HTML document.
///
/// Never fails. Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
#[must_use]
pub fn sanitize(html: &str) -> String {
    let mut text = html.to_owned();
    loop {
        let next = sanitize_pass(&text);
        if next == text {
            return text;
        }
        text = next;
    }
}

/// Sanitize a body given as raw bytes.
///
/// Returns `None` if the bytes are not UTF-8; such bodies should be sent
/// unchanged rather than lossily re-encoded.
#[must_use]
pub fn sanitize_bytes(body: &[u8]) -> Option<String> {
    std::str::from_utf8(body).ok().map(sanitize)
}

fn sanitize_pass(html: &str) -> String {
    let without_scripts = strip_dev_scripts(html);
    let without_comments = HTML_COMMENT.replace_all(&without_scripts, "");
    BLANK_LINES.replace_all(&without_comments, "\n").into_owned()
}

/// Rules 1 and 2: drop dev-only `<script>` elements, copy everything else.
fn strip_dev_scripts(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut copied = 0;
    let mut at = 0;

    while let Some(open) = SCRIPT_OPEN.captures_at(html, at) {
        let (Some(tag), Some(attrs)) = (open.get(0), open.get(1)) else {
            break;
        };
        let Some(close) = SCRIPT_CLOSE.find_at(html, tag.end()) else {
            break;
        };

        // Another opening before the close: this one is not a real element.
        if let Some(next) = SCRIPT_OPEN
            .find_at(html, tag.end())
            .filter(|next| next.start() < close.start())
        {
            at = next.start();
            continue;
        }

        let body = html.get(tag.end()..close.start()).unwrap_or_default();
        if is_hmr_bootstrap(attrs.as_str(), body) || loads_dev_client(attrs.as_str()) {
            out.push_str(html.get(copied..tag.start()).unwrap_or_default());
            copied = close.end();
        }
        at = close.end();
    }

    out.push_str(html.get(copied..).unwrap_or_default());
    out
}

fn is_hmr_bootstrap(attrs: &str, body: &str) -> bool {
    MODULE_TYPE.is_match(attrs) && HMR_IMPORT.is_match(body)
}

fn loads_dev_client(attrs: &str) -> bool {
    SRC_ATTR
        .captures(attrs)
        .and_then(|caps| caps.get(1))
        .is_some_and(|src| DEV_CLIENT_PATHS.contains(&src.as_str()))
}
