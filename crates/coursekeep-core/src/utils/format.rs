/// Format a progress percentage for display, dropping trailing zeros
pub fn format_progress(progress: f64) -> String {
    if progress.fract() == 0.0 {
        format!("{:.0}%", progress)
    } else {
        format!("{:.2}%", progress).replace("0%", "%")
    }
}

/// Format a whole number of hours, e.g. "1 hour", "16 hours"
pub fn format_hours(hours: u32) -> String {
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{} hours", hours)
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Encode the characters that are significant in HTML
pub fn encode_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse `encode_html`. `&amp;` is decoded last so `&amp;lt;` yields `&lt;`.
pub fn decode_html(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_progress() {
        assert_eq!(format_progress(42.0), "42%");
        assert_eq!(format_progress(42.5), "42.5%");
        assert_eq!(format_progress(12.34), "12.34%");
        assert_eq!(format_progress(100.0), "100%");
    }

    #[test]
    fn test_format_hours() {
        assert_eq!(format_hours(1), "1 hour");
        assert_eq!(format_hours(16), "16 hours");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Rust", 10), "Rust");
        assert_eq!(truncate_string("Introduction to Rust", 10), "Introdu...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
    }

    #[test]
    fn test_html_entities() {
        assert_eq!(encode_html("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
        assert_eq!(decode_html("a &lt; b &amp; &quot;c&quot;"), "a < b & \"c\"");
        assert_eq!(decode_html("&amp;lt;"), "&lt;");
        assert_eq!(decode_html(&encode_html("it's <x>")), "it's <x>");
    }
}
