//! Markdown to HTML for persona answers
//!
//! Model output is untrusted: raw HTML in it is escaped rather than passed
//! through, and links or images with script-capable schemes are neutralised.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

const BLOCKED_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];

fn is_blocked_url(url: &str) -> bool {
    let lowered = url.trim().to_ascii_lowercase();
    BLOCKED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme))
}

fn sanitize(event: Event<'_>) -> Event<'_> {
    match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link { link_type, dest_url, title, id }) if is_blocked_url(&dest_url) => {
            Event::Start(Tag::Link {
                link_type,
                dest_url: CowStr::Borrowed("#"),
                title,
                id,
            })
        }
        Event::Start(Tag::Image { link_type, dest_url, title, id }) if is_blocked_url(&dest_url) => {
            Event::Start(Tag::Image {
                link_type,
                dest_url: CowStr::Borrowed(""),
                title,
                id,
            })
        }
        other => other,
    }
}

/// Render `markdown` to an HTML fragment safe to insert into the page
pub fn render(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options).map(sanitize);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings_lists_and_emphasis() {
        let html = render("## Day 1\n\n- **Walk**\n- Journal\n");
        assert!(html.contains("<h2>Day 1</h2>"));
        assert!(html.contains("<li><strong>Walk</strong></li>"));
        assert!(!html.contains("##"));
        assert!(!html.contains("**"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = render("Hi <script>alert(1)</script>\n\n<div onclick=\"x()\">box</div>\n");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<div"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_script_links_are_neutralised() {
        let html = render("[click](javascript:alert(1)) and [ok](https://example.com)");
        assert!(!html.contains("javascript:"));
        assert!(html.contains(r##"<a href="#">click</a>"##));
        assert!(html.contains(r#"<a href="https://example.com">ok</a>"#));
    }

    #[test]
    fn test_tables() {
        let html = render("| Day | Task |\n|---|---|\n| 1 | Rest |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>Rest</td>"));
    }
}
