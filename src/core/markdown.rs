//! Markdown to sanitized HTML
//!
//! Model output is untrusted: raw HTML is escaped, link targets are limited
//! to safe schemes and code blocks get the class names the browser-side
//! highlighter looks for.

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};

const SAFE_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

/// Render model output as HTML that is safe to insert into the page.
pub fn render(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let events = Parser::new_ext(markdown, options).map(rewrite_event);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn rewrite_event(event: Event<'_>) -> Event<'_> {
    match event {
        // Raw HTML is shown, never interpreted
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),

        Event::Start(Tag::Link {
            dest_url, title, ..
        }) => {
            let mut open = format!(
                "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\"",
                escape_attr(&safe_url(&dest_url))
            );
            if !title.is_empty() {
                open.push_str(&format!(" title=\"{}\"", escape_attr(&title)));
            }
            open.push('>');
            Event::InlineHtml(CowStr::from(open))
        }
        Event::End(TagEnd::Link) => Event::InlineHtml(CowStr::Borrowed("</a>")),

        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: CowStr::from(safe_url(&dest_url)),
            title,
            id,
        }),

        Event::Start(Tag::CodeBlock(kind)) => {
            let language = match &kind {
                CodeBlockKind::Fenced(info) => code_language(info),
                CodeBlockKind::Indented => None,
            };
            let open = match language {
                Some(lang) => format!("<pre><code class=\"language-{} hljs\">", lang),
                None => "<pre><code class=\"hljs\">".to_string(),
            };
            Event::Html(CowStr::from(open))
        }
        Event::End(TagEnd::CodeBlock) => Event::Html(CowStr::Borrowed("</code></pre>\n")),

        other => other,
    }
}

/// First word of a fence info string, restricted to characters valid in a class name.
fn code_language(info: &str) -> Option<String> {
    let word = info.split_whitespace().next()?;
    let lang: String = word
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#'))
        .collect::<String>()
        .to_lowercase();
    (!lang.is_empty()).then_some(lang)
}

/// Keep relative URLs and the schemes in `SAFE_SCHEMES`, replace everything else with `#`.
fn safe_url(url: &str) -> String {
    let compact: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();

    let scheme_end = compact.find(':');
    let path_start = compact.find(['/', '?', '#']);

    let has_scheme = match (scheme_end, path_start) {
        (Some(colon), Some(path)) => colon < path,
        (Some(_), None) => true,
        _ => false,
    };

    if !has_scheme {
        return url.to_string();
    }

    let scheme = compact[..scheme_end.unwrap_or(0)].to_ascii_lowercase();
    if SAFE_SCHEMES.contains(&scheme.as_str()) {
        url.to_string()
    } else {
        "#".to_string()
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_markdown() {
        let html = render("# Title\n\nSome **bold** and ~~gone~~ text.");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = render("Hello <script>alert('x')</script>\n\n<div onclick=\"evil()\">block</div>");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<div"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&lt;div"));
    }

    #[test]
    fn test_unsafe_links_are_neutralised() {
        let html = render("[click](javascript:alert(1)) and [docs](https://doc.rust-lang.org)");
        assert!(!html.contains("javascript:"));
        assert!(html.contains("href=\"#\""));
        assert!(html.contains(
            "<a href=\"https://doc.rust-lang.org\" target=\"_blank\" rel=\"noopener noreferrer\">docs</a>"
        ));
    }

    #[test]
    fn test_relative_links_are_kept() {
        assert_eq!(safe_url("/api/chat?x=1:2"), "/api/chat?x=1:2");
        assert_eq!(safe_url("notes.html"), "notes.html");
        assert_eq!(safe_url("MAILTO:me@example.com"), "MAILTO:me@example.com");
        assert_eq!(safe_url("java\tscript:alert(1)"), "#");
        assert_eq!(safe_url("data:text/html;base64,AAAA"), "#");
    }

    #[test]
    fn test_code_blocks_get_language_class() {
        let html = render("```rust\nfn main() { println!(\"<hi>\"); }\n```\n\n    indented\n");
        assert!(html.contains("<pre><code class=\"language-rust hljs\">"));
        assert!(html.contains("&lt;hi&gt;"));
        assert!(html.contains("<pre><code class=\"hljs\">indented"));
    }

    #[test]
    fn test_tables_and_task_lists() {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |\n\n- [x] done\n- [ ] todo\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("type=\"checkbox\""));
    }
}
