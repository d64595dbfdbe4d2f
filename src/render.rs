//! Page snippet rendering
//!
//! Ad payloads are administrator-supplied markup and are emitted verbatim.
//! The surrounding comments make the injected block easy to find in page
//! source.

/// Comment opening an injected ad block
pub const START_MARKER: &str = "<!-- adrotate:start -->";

/// Comment closing an injected ad block
pub const END_MARKER: &str = "<!-- adrotate:end -->";

/// Wrap `payload` in the identification comments
///
/// # Example
/// ```
/// use adrotate::render::render_snippet;
///
/// let html = render_snippet("<script src=\"/a.js\"></script>");
/// assert_eq!(
///     html,
///     "\n<!-- adrotate:start -->\n<script src=\"/a.js\"></script>\n<!-- adrotate:end -->\n"
/// );
/// ```
pub fn render_snippet(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + START_MARKER.len() + END_MARKER.len() + 4);
    out.push('\n');
    out.push_str(START_MARKER);
    out.push('\n');
    out.push_str(payload);
    out.push('\n');
    out.push_str(END_MARKER);
    out.push('\n');
    out
}
