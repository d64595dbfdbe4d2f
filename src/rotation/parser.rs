//! Ad list parsing
//!
//! Turns the raw multi-line ad blob from configuration into the ordered
//! list the engine rotates through.

/// Parse a raw ad blob into an ordered list of payloads
///
/// Splits on line breaks, trims each line and drops lines that are empty
/// after trimming. Order is preserved and duplicates are kept, so an ad
/// listed twice gets two rotation cycles.
///
/// # Examples
///
/// ```
/// use adrotate::rotation::parse_ad_list;
///
/// let ads = parse_ad_list("<script>a</script>\n\n  <script>b</script>  \n");
/// assert_eq!(ads, vec!["<script>a</script>", "<script>b</script>"]);
/// ```
pub fn parse_ad_list(raw: &str) -> Vec<String> {
    raw.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
