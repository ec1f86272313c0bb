use scraper::{Html, Selector};
use trawler_core::error::CrawlError;
use trawler_core::extract::Extractor;
use trawler_core::models::RawRecord;
use trawler_core::normalize::collapse_whitespace;

/// Heuristic extractor for arbitrary pages.
///
/// Title from `<title>` falling back to the first `h1`; text from
/// paragraphs and headings; links from every `a[href]`. Pages where the
/// heuristics match nothing produce an empty record, which is legitimate —
/// `parse` does not fail on that.
#[derive(Clone)]
pub struct GenericExtractor {
    title: Selector,
    h1: Selector,
    text: Selector,
    links: Selector,
}

impl GenericExtractor {
    pub fn new() -> Self {
        Self {
            title: Selector::parse("title").expect("static selector"),
            h1: Selector::parse("h1").expect("static selector"),
            text: Selector::parse("p, h1, h2, h3").expect("static selector"),
            links: Selector::parse("a[href]").expect("static selector"),
        }
    }
}

impl Default for GenericExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for GenericExtractor {
    fn name(&self) -> &str {
        "generic"
    }

    fn parse(&self, page_url: &str, body: &str) -> Result<RawRecord, CrawlError> {
        let doc = Html::parse_document(body);

        let title = doc
            .select(&self.title)
            .next()
            .or_else(|| doc.select(&self.h1).next())
            .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty());

        let text = collapse_whitespace(
            &doc.select(&self.text)
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join(" "),
        );

        let links = doc
            .select(&self.links)
            .filter_map(|el| el.value().attr("href"))
            .map(str::to_string)
            .collect();

        Ok(RawRecord {
            url: Some(page_url.to_string()),
            title,
            text,
            links,
        })
    }
}

/// Site-specific extractor: CSS selector overrides for known targets.
///
/// Selectors are validated at construction; an invalid selector is an
/// [`CrawlError::Extraction`] then, not at parse time.
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    name: String,
    title: Selector,
    text: Selector,
    links: Selector,
}

impl SelectorExtractor {
    pub fn new(
        name: impl Into<String>,
        title_selector: &str,
        text_selector: &str,
        link_selector: &str,
    ) -> Result<Self, CrawlError> {
        Ok(Self {
            name: name.into(),
            title: parse_selector(title_selector)?,
            text: parse_selector(text_selector)?,
            links: parse_selector(link_selector)?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, CrawlError> {
    Selector::parse(selector)
        .map_err(|e| CrawlError::Extraction(format!("invalid selector '{selector}': {e:?}")))
}

impl Extractor for SelectorExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, page_url: &str, body: &str) -> Result<RawRecord, CrawlError> {
        let doc = Html::parse_document(body);

        let title = doc
            .select(&self.title)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty());

        let text = collapse_whitespace(
            &doc.select(&self.text)
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join(" "),
        );

        let links = doc
            .select(&self.links)
            .filter_map(|el| el.value().attr("href"))
            .map(str::to_string)
            .collect();

        Ok(RawRecord {
            url: Some(page_url.to_string()),
            title,
            text,
            links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head><title>  Widget   Catalog </title></head>
          <body>
            <h1>Widgets</h1>
            <p>All the widgets you could want.</p>
            <p>Updated weekly.</p>
            <a href="/w/1">One</a>
            <a href="https://other.test/w/2">Two</a>
            <script>var ignored = "script text";</script>
          </body>
        </html>"#;

    #[test]
    fn generic_extracts_title_text_and_links() {
        let record = GenericExtractor::new()
            .parse("https://example.com/catalog", PAGE)
            .unwrap();

        assert_eq!(record.url.as_deref(), Some("https://example.com/catalog"));
        assert_eq!(record.title.as_deref(), Some("Widget Catalog"));
        assert_eq!(
            record.text,
            "Widgets All the widgets you could want. Updated weekly."
        );
        assert_eq!(record.links, vec!["/w/1", "https://other.test/w/2"]);
        assert!(!record.text.contains("script text"));
    }

    #[test]
    fn generic_falls_back_to_h1_title() {
        let html = "<body><h1>Only Heading</h1><p>text</p></body>";
        let record = GenericExtractor::new().parse("https://e.com/", html).unwrap();
        assert_eq!(record.title.as_deref(), Some("Only Heading"));
    }

    #[test]
    fn empty_page_is_a_legitimate_empty_record() {
        let record = GenericExtractor::new()
            .parse("https://e.com/", "<html><body></body></html>")
            .unwrap();
        assert!(record.title.is_none());
        assert!(record.text.is_empty());
        assert!(record.links.is_empty());
        assert_eq!(record.url.as_deref(), Some("https://e.com/"));
    }

    #[test]
    fn selector_extractor_uses_overrides() {
        let html = r#"
            <div class="listing">
              <span class="job-title">Rust Engineer</span>
              <div class="description">Build crawlers all day.</div>
              <a class="apply" href="/apply/42">Apply</a>
              <a href="/unrelated">Nav</a>
            </div>"#;

        let extractor = SelectorExtractor::new(
            "acme-jobs",
            ".job-title",
            ".description",
            "a.apply[href]",
        )
        .unwrap();

        let record = extractor.parse("https://acme.test/jobs", html).unwrap();
        assert_eq!(record.title.as_deref(), Some("Rust Engineer"));
        assert_eq!(record.text, "Build crawlers all day.");
        assert_eq!(record.links, vec!["/apply/42"]);
    }

    #[test]
    fn invalid_selector_is_an_extraction_error() {
        let err = SelectorExtractor::new("bad", "[[[", "p", "a").unwrap_err();
        assert!(matches!(err, CrawlError::Extraction(_)));
    }

    #[test]
    fn parse_then_normalize_is_deterministic() {
        let extractor = GenericExtractor::new();
        let run = || {
            let raw = extractor.parse("https://example.com/catalog", PAGE).unwrap();
            trawler_core::normalize::normalize(raw).unwrap()
        };
        let a = run();
        let b = run();

        assert_eq!(a.url, b.url);
        assert_eq!(a.title, b.title);
        assert_eq!(a.text, b.text);
        assert_eq!(a.links, b.links);
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
