//! Checklist
//!
//! The fixed, ordered set of static checks run against generated code, plus
//! the fixers for the checks that have one. Each check yields at most one
//! finding.

use std::sync::OnceLock;

use regex::Regex;
use tracing::error;

use crate::models::{Finding, Severity};

/// Checklist entries, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckId {
    DocumentStructure,
    Doctype,
    Charset,
    Viewport,
    RtlDirection,
    LangAttribute,
    DisallowedConstructs,
    InsecureResources,
    PlaceholderContent,
}

impl CheckId {
    pub const ALL: [CheckId; 9] = [
        CheckId::DocumentStructure,
        CheckId::Doctype,
        CheckId::Charset,
        CheckId::Viewport,
        CheckId::RtlDirection,
        CheckId::LangAttribute,
        CheckId::DisallowedConstructs,
        CheckId::InsecureResources,
        CheckId::PlaceholderContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckId::DocumentStructure => "document-structure",
            CheckId::Doctype => "doctype",
            CheckId::Charset => "charset",
            CheckId::Viewport => "viewport",
            CheckId::RtlDirection => "rtl-direction",
            CheckId::LangAttribute => "lang-attribute",
            CheckId::DisallowedConstructs => "disallowed-constructs",
            CheckId::InsecureResources => "insecure-resources",
            CheckId::PlaceholderContent => "placeholder-content",
        }
    }

    /// Whether `fix` can correct this check's finding
    pub fn is_fixable(&self) -> bool {
        matches!(
            self,
            CheckId::Doctype
                | CheckId::Charset
                | CheckId::Viewport
                | CheckId::RtlDirection
                | CheckId::LangAttribute
        )
    }

    pub fn parse(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == id)
    }

    /// Run this check. `None` means the code is clean (or the check does not
    /// apply in this context).
    pub fn run(&self, code: &str, ctx: &CheckContext) -> Option<Finding> {
        let p = patterns()?;
        let finding = |severity: Severity, message: String| {
            Some(Finding::checklist(
                self.as_str(),
                severity,
                message,
                self.is_fixable(),
            ))
        };

        match self {
            CheckId::DocumentStructure => {
                let problems = structure_problems(code, p);
                if problems.is_empty() {
                    None
                } else {
                    finding(Severity::Error, problems.join("; "))
                }
            }
            CheckId::Doctype => {
                if p.doctype_first.is_match(code) {
                    None
                } else {
                    finding(
                        Severity::Warning,
                        "Document does not start with <!DOCTYPE html>".to_string(),
                    )
                }
            }
            CheckId::Charset => {
                if p.charset_utf8.is_match(code) {
                    None
                } else {
                    finding(
                        Severity::Error,
                        "Missing <meta charset=\"utf-8\">; Arabic text will not render reliably"
                            .to_string(),
                    )
                }
            }
            CheckId::Viewport => {
                if p.viewport.is_match(code) {
                    None
                } else {
                    finding(
                        Severity::Warning,
                        "Missing responsive viewport meta tag".to_string(),
                    )
                }
            }
            CheckId::RtlDirection => {
                if !ctx.arabic {
                    return None;
                }
                let html_tag = p.html_open.find(code).map(|m| m.as_str()).unwrap_or("");
                if p.dir_rtl.is_match(html_tag) {
                    None
                } else {
                    finding(
                        Severity::Error,
                        "Arabic content requires dir=\"rtl\" on <html>".to_string(),
                    )
                }
            }
            CheckId::LangAttribute => {
                let html_tag = p.html_open.find(code).map(|m| m.as_str()).unwrap_or("");
                if p.lang_attr.is_match(html_tag) {
                    None
                } else {
                    finding(
                        Severity::Warning,
                        "Missing lang attribute on <html>".to_string(),
                    )
                }
            }
            CheckId::DisallowedConstructs => {
                let hits: Vec<&str> = p
                    .disallowed
                    .iter()
                    .filter(|(_, rx)| rx.is_match(code))
                    .map(|(name, _)| *name)
                    .collect();
                if hits.is_empty() {
                    None
                } else {
                    finding(
                        Severity::Error,
                        format!("Disallowed constructs: {}", hits.join(", ")),
                    )
                }
            }
            CheckId::InsecureResources => {
                let count = p.insecure_resource.find_iter(code).count();
                if count == 0 {
                    None
                } else {
                    finding(
                        Severity::Warning,
                        format!("{} resource(s) loaded over plain http://", count),
                    )
                }
            }
            CheckId::PlaceholderContent => {
                if p.lorem.is_match(code) {
                    finding(
                        Severity::Info,
                        "Placeholder lorem ipsum text left in output".to_string(),
                    )
                } else {
                    None
                }
            }
        }
    }

    /// Apply this check's fixer. `None` when the check has no fixer or the
    /// code lacks the anchor the fixer needs (e.g. no `<head>`).
    pub fn fix(&self, code: &str, ctx: &CheckContext) -> Option<String> {
        let p = patterns()?;
        match self {
            CheckId::Doctype => {
                let stripped = p.doctype_any.replace_all(code, "");
                Some(format!("<!DOCTYPE html>\n{}", stripped.trim_start()))
            }
            CheckId::Charset => {
                let cleaned = p.charset_any.replace_all(code, "").into_owned();
                let at = p.head_open.find(&cleaned)?.end();
                Some(insert_at(&cleaned, at, "\n<meta charset=\"utf-8\">"))
            }
            CheckId::Viewport => {
                let at = p
                    .charset_any
                    .find(code)
                    .or_else(|| p.head_open.find(code))?
                    .end();
                Some(insert_at(
                    code,
                    at,
                    "\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
                ))
            }
            CheckId::RtlDirection => {
                let tag = p.html_open.find(code)?;
                let fixed_tag = if p.dir_attr.is_match(tag.as_str()) {
                    p.dir_attr.replace(tag.as_str(), "dir=\"rtl\"").into_owned()
                } else {
                    with_attribute(tag.as_str(), "dir=\"rtl\"")
                };
                Some(replace_range(code, tag.start(), tag.end(), &fixed_tag))
            }
            CheckId::LangAttribute => {
                let tag = p.html_open.find(code)?;
                let attr = if ctx.arabic { "lang=\"ar\"" } else { "lang=\"en\"" };
                let fixed_tag = with_attribute(tag.as_str(), attr);
                Some(replace_range(code, tag.start(), tag.end(), &fixed_tag))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inputs beyond the code itself that checks depend on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckContext {
    /// The originating request was written in Arabic
    pub arabic: bool,
}

impl CheckContext {
    pub fn for_prompt(prompt: &str) -> Self {
        Self {
            arabic: is_arabic_text(prompt),
        }
    }
}

/// Arabic-script letters are present and at least as common as Latin ones
pub fn is_arabic_text(text: &str) -> bool {
    let mut arabic = 0usize;
    let mut latin = 0usize;
    for c in text.chars() {
        if is_arabic_char(c) {
            arabic += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    arabic > 0 && arabic >= latin
}

fn is_arabic_char(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06FF}'
        | '\u{0750}'..='\u{077F}'
        | '\u{08A0}'..='\u{08FF}'
        | '\u{FB50}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFF}')
}

// ============================================================================
// Helpers
// ============================================================================

fn structure_problems(code: &str, p: &Patterns) -> Vec<String> {
    let mut problems = Vec::new();
    let tags = [
        ("html", &p.html_open, &p.html_close),
        ("head", &p.head_open, &p.head_close),
        ("body", &p.body_open, &p.body_close),
    ];
    for (name, open, close) in tags {
        let opens = open.find_iter(code).count();
        let closes = close.find_iter(code).count();
        if opens == 0 {
            problems.push(format!("missing <{}>", name));
        } else if opens != 1 || closes != opens {
            problems.push(format!(
                "<{}> unbalanced ({} open, {} close)",
                name, opens, closes
            ));
        }
    }
    if !problems.is_empty() {
        return problems;
    }

    // All six tags exist exactly once; check nesting order.
    let positions = [
        p.html_open.find(code).map(|m| m.start()),
        p.head_open.find(code).map(|m| m.start()),
        p.head_close.find(code).map(|m| m.start()),
        p.body_open.find(code).map(|m| m.start()),
        p.body_close.find(code).map(|m| m.start()),
        p.html_close.find(code).map(|m| m.start()),
    ];
    let ordered = positions
        .windows(2)
        .all(|w| matches!((w[0], w[1]), (Some(a), Some(b)) if a < b));
    if !ordered {
        problems.push("html/head/body are not nested in order".to_string());
    }
    problems
}

fn insert_at(code: &str, at: usize, text: &str) -> String {
    let mut out = String::with_capacity(code.len() + text.len());
    out.push_str(&code[..at]);
    out.push_str(text);
    out.push_str(&code[at..]);
    out
}

fn replace_range(code: &str, start: usize, end: usize, with: &str) -> String {
    let mut out = String::with_capacity(code.len() + with.len());
    out.push_str(&code[..start]);
    out.push_str(with);
    out.push_str(&code[end..]);
    out
}

/// `<html ...>` with `attr` added right after the tag name
fn with_attribute(tag: &str, attr: &str) -> String {
    // Regex matched `<html` case-insensitively, so the first five bytes are ASCII.
    format!("{} {}{}", &tag[..5], attr, &tag[5..])
}

struct Patterns {
    html_open: Regex,
    html_close: Regex,
    head_open: Regex,
    head_close: Regex,
    body_open: Regex,
    body_close: Regex,
    doctype_first: Regex,
    doctype_any: Regex,
    charset_utf8: Regex,
    charset_any: Regex,
    viewport: Regex,
    dir_rtl: Regex,
    dir_attr: Regex,
    lang_attr: Regex,
    disallowed: Vec<(&'static str, Regex)>,
    insecure_resource: Regex,
    lorem: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            html_open: Regex::new(r"(?i)<html\b[^>]*>")?,
            html_close: Regex::new(r"(?i)</html\s*>")?,
            head_open: Regex::new(r"(?i)<head\b[^>]*>")?,
            head_close: Regex::new(r"(?i)</head\s*>")?,
            body_open: Regex::new(r"(?i)<body\b[^>]*>")?,
            body_close: Regex::new(r"(?i)</body\s*>")?,
            doctype_first: Regex::new(r"(?i)\A\s*<!doctype\s+html\s*>")?,
            doctype_any: Regex::new(r"(?i)<!doctype[^>]*>")?,
            charset_utf8: Regex::new(r#"(?i)<meta\b[^>]*\bcharset\s*=\s*["']?\s*utf-8"#)?,
            charset_any: Regex::new(r"(?i)<meta\b[^>]*\bcharset\s*=[^>]*>")?,
            viewport: Regex::new(r#"(?i)<meta\b[^>]*\bname\s*=\s*["']?viewport"#)?,
            dir_rtl: Regex::new(r#"(?i)\bdir\s*=\s*["']?rtl\b"#)?,
            dir_attr: Regex::new(r#"(?i)\bdir\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#)?,
            lang_attr: Regex::new(r"(?i)\blang\s*=")?,
            disallowed: vec![
                ("eval()", Regex::new(r"\beval\s*\(")?),
                ("document.write()", Regex::new(r"\bdocument\s*\.\s*write(?:ln)?\s*\(")?),
                ("new Function()", Regex::new(r"\bnew\s+Function\s*\(")?),
                (
                    "javascript: URL",
                    Regex::new(r#"(?i)\b(?:href|src|action)\s*=\s*["']?\s*javascript:"#)?,
                ),
            ],
            insecure_resource: Regex::new(r#"(?i)\b(?:src|href)\s*=\s*["']?http://"#)?,
            lorem: Regex::new(r"(?i)\blorem\s+ipsum\b")?,
        })
    }
}

/// Compiled checklist patterns (initialized once).
fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match Patterns::compile() {
            Ok(p) => Some(p),
            Err(e) => {
                error!(error = %e, "failed to compile validation patterns");
                None
            }
        })
        .as_ref()
}
