use crate::index::Website;

/// The landing page with nothing but the search form.
pub const HOME_PAGE: &str = r#"<!doctype html>
<html>
  <head>
    <title>tinysearch</title>
    <meta charset="utf-8" />
  </head>
  <body>
    <h1>tinysearch</h1>
    <form action="/" method="get">
      <input type="text" name="q" autofocus />
      <button type="submit">Search</button>
    </form>
  </body>
</html>
"#;

pub const NOT_FOUND_PAGE: &str = r#"<!doctype html>
<html>
  <head>
    <title>tinysearch - not found</title>
    <meta charset="utf-8" />
  </head>
  <body>
    <h1>404</h1>
    <p>There is nothing here, but the <a href="/">search</a> might find it.</p>
  </body>
</html>
"#;

/// Escapes text for interpolation into html.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }

    escaped
}

/// Renders the results page for a query.
pub fn results_page(query: &str, websites: &[Website], duration: &str) -> String {
    let mut items = String::new();

    for website in websites {
        items.push_str(&format!(
            r#"      <li>
        <img src="{icon}" alt="" width="16" height="16" />
        <a href="{url}">{name}</a>
        <p>{description}</p>
      </li>
"#,
            icon = escape(&website.icon),
            url = escape(&website.url),
            name = escape(&website.name),
            description = escape(&website.description),
        ));
    }

    format!(
        r#"<!doctype html>
<html>
  <head>
    <title>{query} - tinysearch</title>
    <meta charset="utf-8" />
  </head>
  <body>
    <form action="/" method="get">
      <input type="text" name="q" value="{query}" />
      <button type="submit">Search</button>
    </form>
    <p>{count} results in {duration}</p>
    <ul>
{items}    </ul>
  </body>
</html>
"#,
        query = escape(query),
        count = websites.len(),
        duration = escape(duration),
        items = items,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_characters() {
        assert_eq!(
            escape(r#"<b>"fish" & 'chips'</b>"#),
            "&lt;b&gt;&quot;fish&quot; &amp; &#39;chips&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn results_page_escapes_the_query() {
        let page = results_page("<script>alert(1)</script>", &[], "1.00ms");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("0 results in 1.00ms"));
    }

    #[test]
    fn results_page_lists_every_website() {
        let websites = vec![
            Website {
                url: "https://a.example/".to_string(),
                name: "A".to_string(),
                description: "First".to_string(),
                icon: "https://a.example/favicon.ico".to_string(),
                word_count: 10,
            },
            Website {
                url: "https://b.example/".to_string(),
                name: "B".to_string(),
                description: "Second".to_string(),
                icon: "https://b.example/favicon.ico".to_string(),
                word_count: 20,
            },
        ];

        let page = results_page("anything", &websites, "3.14s");
        assert!(page.contains("https://a.example/"));
        assert!(page.contains("https://b.example/"));
        assert!(page.contains("2 results in 3.14s"));
    }
}
