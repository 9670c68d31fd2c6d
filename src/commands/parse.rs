//! Directive grammar.
//!
//! A directive is a `!name` marker embedded in free text, optionally followed
//! by a parenthesized argument list, e.g. `!goTo("tower", 3)`. Parsing is
//! pure string work: whether a name is actually registered is the registry's
//! concern, and an unrecognized name is still a valid parse result.

use regex_lite::Regex;
use std::sync::OnceLock;

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Quoted alternatives come first so a quoted string may contain
    // parentheses without ending the argument list.
    RE.get_or_init(|| {
        Regex::new(r#"!(\w+)(?:\(((?:'[^']*'|"[^"]*"|[^)(])*)\))?"#).expect("directive regex")
    })
}

/// The first directive name in `text`, marker included (e.g. `"!goTo"`),
/// or `None` if the text is purely conversational.
pub fn contains_directive(text: &str) -> Option<&str> {
    let caps = directive_regex().captures(text)?;
    let name = caps.get(1)?;
    Some(&text[name.start() - 1..name.end()])
}

/// The raw argument text of the first directive in `text` (the content of
/// its parentheses), or `None` when the directive has no argument list.
pub fn directive_args(text: &str) -> Option<&str> {
    let caps = directive_regex().captures(text)?;
    caps.get(2).map(|args| args.as_str())
}

/// Everything up to and including the first directive's complete span;
/// trailing content is dropped. Idempotent: already-truncated text is
/// returned unchanged, as is text without a directive.
pub fn truncate_after_directive(text: &str) -> &str {
    match directive_regex().find(text) {
        Some(found) => &text[..found.end()],
        None => text,
    }
}

/// Directive name without its marker, for display.
pub fn directive_body(name: &str) -> &str {
    name.trim_start_matches('!')
}
