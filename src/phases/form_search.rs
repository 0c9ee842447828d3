//! Form, search and pagination probing
//!
//! Crawled pages are fetched again and their forms parsed. Search forms are
//! filled with generated queries, filter forms with typical values, and the
//! resulting GET URLs are probed; links on any result page that exists are
//! harvested. Pagination variants of crawled pages are probed as well.

use crate::frontier::DiscoverySource;
use crate::phases::{PhaseContext, PhaseDriver, PhaseReport};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use tracing::{debug, info};
use url::Url;

const SEARCH_PARAMS: &[&str] = &["q", "query", "search", "keyword", "term", "s", "find"];

const PAGINATION_PARAMS: &[&str] = &["page", "p", "pagenum", "offset", "start"];

const GENERIC_QUERIES: &[&str] = &[
    "news", "information", "service", "about", "contact", "help", "search", "index", "home",
    "main", "list", "archive",
];

const JAPANESE_QUERIES: &[&str] = &[
    "お知らせ", "ニュース", "情報", "サービス", "について", "お問い合わせ", "ヘルプ", "検索",
    "トップ", "メイン", "一覧", "アーカイブ",
];

const FILLER_QUERIES: &[&str] = &[
    "a", "e", "i", "o", "u", "1", "2", "3", "4", "5", "test", "demo", "sample",
];

/// Typical values tried per field name fragment
const FIELD_VALUES: &[(&str, &[&str])] = &[
    ("search", &["test", "info", "news"]),
    ("query", &["test", "info", "news"]),
    ("keyword", &["test", "info", "news"]),
    ("category", &["1", "2", "all"]),
    ("page", &["1", "2", "3"]),
    ("sort", &["date", "name", "title"]),
    ("year", &["2024", "2023"]),
    ("month", &["01", "02", "12"]),
    ("type", &["all", "list", "detail"]),
];

const MAX_FORM_VARIANTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Search,
    Login,
    Contact,
    Newsletter,
    Filter,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub input_type: String,
    pub value: String,
    pub required: bool,
}

/// A form found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredForm {
    /// Absolute action URL; the page itself when the form has no action
    pub action: String,
    pub method: String,
    /// Named fields a user fills in
    pub fields: Vec<FormField>,
    /// Hidden fields submitted unchanged
    pub hidden: Vec<(String, String)>,
    pub kind: FormKind,
}

impl DiscoveredForm {
    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("get")
    }

    pub fn search_parameter(&self) -> Option<&str> {
        find_search_parameter(self.fields.iter().map(|f| f.name.as_str()))
    }
}

/// A GET endpoint that takes a search term
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchEndpoint {
    pub url: String,
    pub param: String,
    pub extra: Vec<(String, String)>,
}

/// Parses every form on a page
pub fn parse_forms(html: &str, page_url: &Url) -> Vec<DiscoveredForm> {
    let document = Html::parse_document(html);
    let Ok(form_selector) = Selector::parse("form") else {
        return Vec::new();
    };
    let Ok(field_selector) = Selector::parse("input, select, textarea") else {
        return Vec::new();
    };

    document
        .select(&form_selector)
        .filter_map(|form| parse_form(form, &field_selector, page_url))
        .collect()
}

fn parse_form(form: ElementRef<'_>, field_selector: &Selector, page_url: &Url) -> Option<DiscoveredForm> {
    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => page_url.join(action).ok()?,
        _ => page_url.clone(),
    };
    let method = form
        .value()
        .attr("method")
        .unwrap_or("get")
        .trim()
        .to_ascii_lowercase();

    let mut fields = Vec::new();
    let mut hidden = Vec::new();
    for element in form.select(field_selector) {
        let Some(name) = element.value().attr("name").filter(|n| !n.is_empty()) else {
            continue;
        };
        let input_type = element
            .value()
            .attr("type")
            .unwrap_or("text")
            .to_ascii_lowercase();
        let value = element.value().attr("value").unwrap_or("").to_string();
        match input_type.as_str() {
            "submit" | "button" | "image" | "reset" => {}
            "hidden" => hidden.push((name.to_string(), value)),
            _ => fields.push(FormField {
                name: name.to_string(),
                input_type,
                value,
                required: element.value().attr("required").is_some(),
            }),
        }
    }

    let names: Vec<String> = fields.iter().map(|f| f.name.to_ascii_lowercase()).collect();
    let kind = classify_form(&form.html().to_lowercase(), &names);

    Some(DiscoveredForm {
        action: action.to_string(),
        method,
        fields,
        hidden,
        kind,
    })
}

/// Classifies a form from its markup (lowercase) and field names (lowercase)
pub fn classify_form(markup: &str, field_names: &[String]) -> FormKind {
    let has_field = |keys: &[&str]| field_names.iter().any(|n| keys.contains(&n.as_str()));

    if ["search", "query", "find", "keyword"]
        .iter()
        .any(|k| markup.contains(k))
    {
        return FormKind::Search;
    }
    let joined = field_names.join(" ");
    if ["search", "query", "keyword", "find"]
        .iter()
        .any(|k| joined.contains(k))
        || has_field(&["q"])
    {
        return FormKind::Search;
    }
    if has_field(&["username", "password", "login"]) {
        return FormKind::Login;
    }
    if has_field(&["name", "message", "subject"]) {
        return FormKind::Contact;
    }
    if has_field(&["newsletter", "subscribe", "email"]) {
        return FormKind::Newsletter;
    }
    if ["filter", "sort", "category", "page"]
        .iter()
        .any(|k| markup.contains(k))
    {
        return FormKind::Filter;
    }
    FormKind::Other
}

/// The field carrying the search term, by priority
pub fn find_search_parameter<'a>(names: impl Iterator<Item = &'a str> + Clone) -> Option<&'a str> {
    for param in SEARCH_PARAMS {
        if let Some(name) = names.clone().find(|n| n == param) {
            return Some(name);
        }
    }
    names.into_iter().find(|n| {
        let lower = n.to_ascii_lowercase();
        lower.contains("search") || lower.contains("query") || lower.contains("find")
    })
}

/// Search endpoints advertised by links such as `/search?q=...`
pub fn search_links(html: &str, page_url: &Url) -> Vec<SearchEndpoint> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut endpoints = BTreeSet::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(url) = page_url.join(href) else {
            continue;
        };
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let Some(param) = find_search_parameter(pairs.iter().map(|(k, _)| k.as_str())) else {
            continue;
        };
        let param = param.to_string();
        let mut bare = url.clone();
        bare.set_query(None);
        bare.set_fragment(None);
        endpoints.insert(SearchEndpoint {
            url: bare.to_string(),
            extra: pairs.into_iter().filter(|(k, _)| *k != param).collect(),
            param,
        });
    }
    endpoints.into_iter().collect()
}

/// Queries to try, most specific first
pub fn search_queries(domain: &str, max: usize) -> Vec<String> {
    let label = domain
        .trim_start_matches("www.")
        .split('.')
        .next()
        .unwrap_or("")
        .to_string();

    let mut queries: Vec<String> = Vec::new();
    let mut push = |q: &str| {
        if !q.is_empty() && !queries.iter().any(|e| e == q) {
            queries.push(q.to_string());
        }
    };
    push(&label);
    GENERIC_QUERIES.iter().for_each(|q| push(q));
    if domain.ends_with(".jp") {
        JAPANESE_QUERIES.iter().for_each(|q| push(q));
    }
    FILLER_QUERIES.iter().for_each(|q| push(q));

    queries.truncate(max);
    queries
}

/// `action?params` with the parameters form-encoded
pub fn build_get_url(action: &str, params: &[(String, String)]) -> Option<String> {
    let mut url = Url::parse(action).ok()?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Some(url.to_string())
}

/// GET URLs for a search form or link, one per query
pub fn search_urls(endpoint: &SearchEndpoint, queries: &[String]) -> Vec<String> {
    queries
        .iter()
        .filter_map(|query| {
            let mut params = endpoint.extra.clone();
            params.push((endpoint.param.clone(), query.clone()));
            build_get_url(&endpoint.url, &params)
        })
        .collect()
}

/// Filled-in GET URLs for a non-search form
pub fn form_variants(form: &DiscoveredForm) -> Vec<String> {
    let mut variants = Vec::new();
    for field in &form.fields {
        let lower = field.name.to_ascii_lowercase();
        let values: &[&str] = FIELD_VALUES
            .iter()
            .find(|(key, _)| lower.contains(key))
            .map(|(_, values)| *values)
            .unwrap_or(match field.input_type.as_str() {
                "number" => &["1", "2", "10"],
                _ => &["test", "a", "1"],
            });

        for value in values.iter().take(3) {
            let mut params = form.hidden.clone();
            params.push((field.name.clone(), value.to_string()));
            for other in &form.fields {
                if other.name != field.name && other.required {
                    let fill = if other.value.is_empty() { "test" } else { &other.value };
                    params.push((other.name.clone(), fill.to_string()));
                }
            }
            variants.extend(build_get_url(&form.action, &params));
            if variants.len() >= MAX_FORM_VARIANTS {
                return variants;
            }
        }
    }
    variants
}

/// Query and path pagination variants of `url` for pages 2 to 5
pub fn pagination_variants(url: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    let separator = if parsed.query().is_some() { '&' } else { '?' };
    let mut variants = Vec::new();

    for page in 2..=5 {
        for param in PAGINATION_PARAMS {
            variants.push(format!("{}{}{}={}", url, separator, param, page));
        }
    }

    let base_path = parsed.path().trim_end_matches('/');
    let origin = parsed.origin().ascii_serialization();
    for page in 2..=5 {
        variants.push(format!("{}{}/page/{}/", origin, base_path, page));
        variants.push(format!("{}{}/{}/", origin, base_path, page));
    }
    variants
}

/// Probes search, filter and pagination URLs derived from crawled pages
#[derive(Debug, Clone, Copy, Default)]
pub struct FormSearchPhase;

#[async_trait]
impl PhaseDriver for FormSearchPhase {
    fn name(&self) -> &'static str {
        "form-search"
    }

    fn source(&self) -> DiscoverySource {
        DiscoverySource::FormSearch
    }

    async fn run(&self, ctx: &PhaseContext) -> PhaseReport {
        let mut report = PhaseReport::new(self.name());
        let settings = &ctx.config.phases.form_search;

        let mut pages = ctx.successful_urls().await;
        if pages.is_empty() {
            pages.push(ctx.base.to_string());
        }
        pages.truncate(settings.max_pages_scanned);

        let fetched = ctx.fetch_documents(&pages).await;
        let mut forms = Vec::new();
        let mut endpoints: BTreeSet<SearchEndpoint> = BTreeSet::new();
        for (url, result) in &fetched {
            let (Some(content), Ok(page_url)) = (result.outcome.content(), Url::parse(url)) else {
                continue;
            };
            forms.extend(parse_forms(&content.html, &page_url));
            endpoints.extend(search_links(&content.html, &page_url));
        }

        let queries = search_queries(ctx.domain(), settings.max_queries);
        let mut candidates: BTreeSet<String> = BTreeSet::new();
        for form in &forms {
            candidates.insert(form.action.clone());
            if !form.is_get() {
                continue;
            }
            match (form.kind, form.search_parameter()) {
                (FormKind::Search, Some(param)) => {
                    endpoints.insert(SearchEndpoint {
                        url: form.action.clone(),
                        param: param.to_string(),
                        extra: form
                            .hidden
                            .iter()
                            .cloned()
                            .chain(
                                form.fields
                                    .iter()
                                    .filter(|f| f.name != param && !f.value.is_empty())
                                    .map(|f| (f.name.clone(), f.value.clone())),
                            )
                            .collect(),
                    });
                }
                (FormKind::Filter | FormKind::Other, _) => {
                    candidates.extend(form_variants(form));
                }
                _ => {}
            }
        }
        for endpoint in &endpoints {
            candidates.extend(search_urls(endpoint, &queries));
        }
        for page in pages.iter().take(settings.max_pagination_bases) {
            candidates.extend(pagination_variants(page));
        }

        debug!(
            "{} forms, {} search endpoints, {} candidates",
            forms.len(),
            endpoints.len(),
            candidates.len()
        );
        let probe = ctx.probe_candidates(&candidates, self.source()).await;
        report.absorb(&probe);
        info!(
            "Forms/search: {} forms, {} endpoints, {}/{} candidates found",
            forms.len(),
            endpoints.len(),
            probe.found,
            probe.tested
        );
        report.with_note(format!(
            "{} forms, {} search endpoints",
            forms.len(),
            endpoints.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::*;
    use std::sync::Arc;

    fn page_url() -> Url {
        Url::parse("https://example.test/info/").unwrap()
    }

    const FORMS: &str = r#"
        <form action="/search/" method="get">
          <input type="text" name="keyword">
          <input type="hidden" name="lang" value="ja">
          <input type="submit" value="Go">
        </form>
        <form action="login.php" method="POST">
          <input name="username"><input type="password" name="password">
        </form>
        <form>
          <select name="category"></select>
          <input type="number" name="count" required>
        </form>
    "#;

    #[test]
    fn test_parse_and_classify() {
        let forms = parse_forms(FORMS, &page_url());
        assert_eq!(forms.len(), 3);

        assert_eq!(forms[0].kind, FormKind::Search);
        assert_eq!(forms[0].action, "https://example.test/search/");
        assert_eq!(forms[0].search_parameter(), Some("keyword"));
        assert_eq!(forms[0].hidden, vec![("lang".to_string(), "ja".to_string())]);

        assert_eq!(forms[1].kind, FormKind::Login);
        assert_eq!(forms[1].action, "https://example.test/info/login.php");
        assert!(!forms[1].is_get());

        assert_eq!(forms[2].kind, FormKind::Filter);
        assert_eq!(forms[2].action, "https://example.test/info/");
        assert!(forms[2].fields[1].required);
    }

    #[test]
    fn test_search_parameter_priority() {
        let names = ["site_search", "s", "q"];
        assert_eq!(find_search_parameter(names.iter().copied()), Some("q"));
        let names = ["site_search", "lang"];
        assert_eq!(find_search_parameter(names.iter().copied()), Some("site_search"));
        let names = ["name"];
        assert_eq!(find_search_parameter(names.iter().copied()), None);
    }

    #[test]
    fn test_search_queries() {
        let queries = search_queries("www.city.example.jp", 100);
        assert_eq!(queries[0], "city");
        assert!(queries.contains(&"お知らせ".to_string()));
        assert!(queries.contains(&"sample".to_string()));

        let queries = search_queries("example.com", 5);
        assert_eq!(queries, vec!["example", "news", "information", "service", "about"]);
        assert!(!search_queries("example.com", 100).contains(&"検索".to_string()));
    }

    #[test]
    fn test_search_urls_and_links() {
        let endpoint = SearchEndpoint {
            url: "https://example.test/search/".to_string(),
            param: "q".to_string(),
            extra: vec![("lang".to_string(), "ja".to_string())],
        };
        let urls = search_urls(&endpoint, &["a b".to_string()]);
        assert_eq!(urls, vec!["https://example.test/search/?lang=ja&q=a+b"]);

        let html = r#"<a href="/find?query=x&amp;cat=2">search</a><a href="/plain">p</a>"#;
        let links = search_links(html, &page_url());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.test/find");
        assert_eq!(links[0].param, "query");
        assert_eq!(links[0].extra, vec![("cat".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_form_variants() {
        let forms = parse_forms(FORMS, &page_url());
        let variants = form_variants(&forms[2]);
        assert!(variants.len() <= MAX_FORM_VARIANTS);
        assert!(variants.contains(&"https://example.test/info/?category=all&count=test".to_string()));
        assert!(variants.contains(&"https://example.test/info/?count=10".to_string()));
    }

    #[test]
    fn test_pagination_variants() {
        let variants = pagination_variants("https://example.test/news/");
        assert_eq!(variants.len(), 28);
        assert!(variants.contains(&"https://example.test/news/?page=2".to_string()));
        assert!(variants.contains(&"https://example.test/news/page/5/".to_string()));
        assert!(variants.contains(&"https://example.test/news/3/".to_string()));

        let variants = pagination_variants("https://example.test/list?cat=1");
        assert!(variants.contains(&"https://example.test/list?cat=1&offset=4".to_string()));
    }

    #[tokio::test]
    async fn test_phase_finds_search_results() {
        let home = page(
            r#"<form action="/search/" method="get"><input name="q"></form>"#,
        );
        let results = page(r#"<a href="/hidden/report.html">result</a>"#);
        let engine = Arc::new(SiteEngine::with_pages(&[
            ("https://example.test/", &home),
            ("https://example.test/search/", &page("")),
            ("https://example.test/search/?q=example", &results),
        ]));
        let ctx = context(engine);
        {
            let mut frontier = ctx.crawl.frontier.lock().await;
            frontier.add_discovered(["https://example.test/"], DiscoverySource::Seed);
            frontier.mark_crawled("https://example.test/", true);
        }

        let report = FormSearchPhase.run(&ctx).await;
        assert_eq!(report.candidates_found, 2);
        let discovered = ctx.discovered_urls().await;
        assert!(discovered.contains(&"https://example.test/search/?q=example".to_string()));
        assert!(discovered.contains(&"https://example.test/hidden/report.html".to_string()));
    }
}
