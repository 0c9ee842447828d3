//! End-to-end harvest tests
//!
//! A small site is served by wiremock and harvested with every phase
//! enabled; the report and URL list are written to a temp directory.

use std::collections::BTreeSet;
use tempfile::TempDir;
use url_harvest::config::{parse_config, Config};
use url_harvest::crawler::{harvest, Coordinator, Strategy};
use url_harvest::frontier::DiscoverySource;
use url_harvest::output::{load_report, RunStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn html_page(body: &str) -> String {
    format!(
        "<html><head><title>Test</title></head><body>{}<p>{}</p></body></html>",
        body,
        "Regular page content for the harvest test. ".repeat(5)
    )
}

/// Serves `body` at `route`; requests carrying a query string get a 404
async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(|req: &Request| req.url.query().is_none())
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn small_site() -> MockServer {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/robots.txt",
        "User-agent: *\nDisallow: /private/\n".to_string(),
    )
    .await;
    mount_page(
        &server,
        "/sitemap.xml",
        format!(
            "<urlset><url><loc>{}/listed.html</loc></url></urlset>",
            server.uri()
        ),
    )
    .await;
    mount_page(
        &server,
        "/",
        html_page(r#"<a href="/about.html">about</a><a href="https://elsewhere.test/">x</a>"#),
    )
    .await;
    mount_page(&server, "/about.html", html_page(r#"<a href="/team.html">team</a>"#)).await;
    mount_page(&server, "/team.html", html_page("")).await;
    mount_page(&server, "/listed.html", html_page("")).await;
    mount_page(&server, "/private/", html_page("")).await;
    mount_page(&server, "/private/index.html", html_page("")).await;
    mount_page(&server, "/private/index.php", html_page("")).await;
    mount_page(&server, "/news/", html_page(r#"<a href="/news/1.html">one</a>"#)).await;
    mount_page(&server, "/news/1.html", html_page("")).await;
    server
}

fn config_for(server: &MockServer, output: &TempDir) -> Config {
    let mut config = Config::for_target(format!("{}/", server.uri()));
    config.ladder.strategies = vec![Strategy::PlainHttp];
    config.retry.enabled = false;
    config.llm.api_key_env = "URL_HARVEST_TEST_KEY_NEVER_SET".to_string();
    config.output.report_path = output
        .path()
        .join("out/report.json")
        .to_string_lossy()
        .into_owned();
    config.output.urls_path = output
        .path()
        .join("out/urls.txt")
        .to_string_lossy()
        .into_owned();
    config
}

#[tokio::test]
async fn test_harvest_writes_report_and_url_list() {
    let server = small_site().await;
    let output = TempDir::new().unwrap();
    let config = config_for(&server, &output);
    let report_path = config.output.report_path.clone();
    let urls_path = config.output.urls_path.clone();

    let report = harvest(config, Some("hash".to_string())).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);

    let expected: BTreeSet<String> = [
        "/",
        "/about.html",
        "/team.html",
        "/listed.html",
        "/private/",
        "/private/index.html",
        "/private/index.php",
        "/news/",
        "/news/1.html",
    ]
    .iter()
    .map(|p| format!("{}{}", server.uri(), p))
    .collect();

    let written = std::fs::read_to_string(&urls_path).unwrap();
    let listed: Vec<&str> = written.lines().collect();
    let mut sorted = listed.clone();
    sorted.sort();
    assert_eq!(listed, sorted);
    let listed: BTreeSet<String> = listed.iter().map(|s| s.to_string()).collect();
    assert_eq!(listed, expected);

    let saved = load_report(std::path::Path::new(&report_path)).unwrap();
    assert_eq!(saved, report);
    assert_eq!(saved.config_hash.as_deref(), Some("hash"));
    assert_eq!(saved.totals.discovered, expected.len());
    assert_eq!(saved.totals.failed, 0);
    assert_eq!(saved.totals.pending, 0);
    assert_eq!(saved.urls_by_source.get(&DiscoverySource::Sitemap), Some(&1));
    assert_eq!(saved.urls_by_source.get(&DiscoverySource::Robots), Some(&3));
    assert_eq!(saved.urls_by_source.get(&DiscoverySource::Directory), Some(&2));
    assert!(saved.stage_stats.contains_key(&Strategy::PlainHttp));
}

#[tokio::test]
async fn test_harvest_from_toml_config() {
    let server = small_site().await;
    let output = TempDir::new().unwrap();
    let toml = format!(
        r#"
[target]
base-url = "{}/"

[ladder]
strategies = ["plain-http"]

[retry]
enabled = false

[phases.directory]
enabled = false

[phases.parent]
enabled = false

[phases.pattern]
enabled = false

[phases.form-search]
enabled = false

[phases.llm]
enabled = false

[output]
report-path = "{}"
urls-path = "{}"
"#,
        server.uri(),
        output.path().join("report.json").display(),
        output.path().join("urls.txt").display(),
    );
    let config = parse_config(&toml).unwrap();

    let mut coordinator = Coordinator::new(config).unwrap();
    let report = coordinator.run().await.unwrap();

    let phases: Vec<&str> = report.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(phases, vec!["robots", "sitemap", "crawl", "final-crawl"]);
    assert!(!coordinator
        .frontier()
        .lock()
        .await
        .contains(&format!("{}/news/", server.uri())));
    assert!(output.path().join("urls.txt").exists());
}
