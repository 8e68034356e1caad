//! Best-effort repair of malformed feed XML.
//!
//! Runs only after a normal parse has already failed, and exactly once per
//! fetch. The repairs are regex heuristics, not an XML parser: they quote
//! bare attribute values, escape stray ampersands, and fold the
//! typographic HTML entities that real-world feeds embed without
//! declaring. The pass is lossy on pathological input; a document that
//! still fails to parse afterwards is dropped by the caller.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

/// `x/>`: a self-closing tag whose slash would otherwise be swallowed
/// into an unquoted attribute value by the quoting pass.
fn self_closing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\S)/>").expect("static pattern compiles"))
}

/// ` name=value` with an unquoted value.
fn bare_attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\s[A-Za-z_:][A-Za-z0-9_:.-]*)\s*=\s*([^\s"'>][^\s>]*)"#)
            .expect("static pattern compiles")
    })
}

/// Any `&`, with the reference body captured when it is one XML itself
/// understands (the five predefined entities and numeric references).
fn ampersand_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]+;|#[xX][0-9a-fA-F]+;|amp;|lt;|gt;|quot;|apos;)?")
            .expect("static pattern compiles")
    })
}

/// Typographic HTML entities folded to ASCII so the XML parser never
/// sees an undeclared named reference.
const NAMED_FOLDS: &[(&str, &str)] = &[
    ("&ldquo;", "\""),
    ("&rdquo;", "\""),
    ("&lsquo;", "'"),
    ("&rsquo;", "'"),
    ("&ndash;", "-"),
    ("&mdash;", "-"),
    ("&nbsp;", " "),
    ("&hellip;", "..."),
];

/// Apply the full repair sequence to a failed document.
pub fn sanitize(input: &str) -> String {
    let folded = fold_named_entities(input);
    let quoted = quote_bare_attributes(&folded);
    escape_stray_ampersands(&quoted).into_owned()
}

fn fold_named_entities(input: &str) -> Cow<'_, str> {
    if !NAMED_FOLDS.iter().any(|(entity, _)| input.contains(entity)) {
        return Cow::Borrowed(input);
    }
    let mut out = input.to_string();
    for (entity, ascii) in NAMED_FOLDS {
        out = out.replace(entity, ascii);
    }
    Cow::Owned(out)
}

fn quote_bare_attributes(input: &str) -> String {
    // Detach self-closing slashes first so `href=http://x/>` quotes as
    // `href="http://x" />`, not `href="http://x/">`.
    let detached = self_closing_re().replace_all(input, "$1 />");
    bare_attribute_re()
        .replace_all(&detached, "$1=\"$2\"")
        .into_owned()
}

fn escape_stray_ampersands(input: &str) -> Cow<'_, str> {
    ampersand_re().replace_all(input, |caps: &Captures| match caps.get(1) {
        Some(_) => caps[0].to_string(),
        None => "&amp;".to_string(),
    })
}
