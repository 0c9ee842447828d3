//! Fetch engines
//!
//! A [`FetchEngine`] executes a single stage of the ladder for a single URL.
//! [`HttpEngine`] is the built-in engine: it runs every stage over reqwest,
//! so browser stages differ from plain HTTP only in their profile: timeout,
//! user agent, the navigation headers a real browser sends, and proxy.
//! Rendering back-ends plug in through the same trait.

use crate::crawler::strategy::{StageProfile, Strategy};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS,
};
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Raw response handed back by an engine, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResponse {
    pub status_code: u16,
    pub content: String,
    pub markdown: Option<String>,
    pub links: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The stage cannot run at all (missing proxy, client build failure)
    #[error("Stage unavailable: {0}")]
    StageUnavailable(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),
}

#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Readies the engine for a stage; an error fails the whole stage
    async fn prepare(&self, profile: &StageProfile) -> Result<(), EngineError>;

    async fn fetch(&self, url: &str, profile: &StageProfile)
        -> Result<EngineResponse, EngineError>;
}

const FALLBACK_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
];

const FALLBACK_LANGUAGES: &[&str] = &[
    "ja,en-US;q=0.9,en;q=0.8",
    "en-US,en;q=0.9",
    "ja-JP,ja;q=0.9",
    "en-GB,en;q=0.8,ja;q=0.6",
];

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const DEFAULT_LANGUAGE: &str = "ja,en-US;q=0.9,en;q=0.8";

const NAVIGATION_HEADERS: &[(&str, &str)] = &[
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
];

/// Headers a browser at this stage's disguise level sends with a page load
fn identity_headers(profile: &StageProfile) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if profile.headless || profile.undetected {
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    }
    if profile.stealth || profile.undetected {
        for &(name, value) in NAVIGATION_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        headers.insert(
            HeaderName::from_static("sec-ch-ua-mobile"),
            HeaderValue::from_static("?0"),
        );
    }
    if profile.stealth {
        headers.insert(
            HeaderName::from_static("sec-ch-ua-platform"),
            HeaderValue::from_static("\"Windows\""),
        );
    }
    if profile.undetected {
        headers.insert(
            HeaderName::from_static("sec-ch-ua-platform"),
            HeaderValue::from_static("\"macOS\""),
        );
    }
    headers
}

/// Builds the reqwest client used for one stage
///
/// Redirects are followed (up to 10 hops) and both http and https targets
/// are allowed, since municipal sites still serve plain http.
pub fn build_http_client(profile: &StageProfile) -> Result<Client, EngineError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(DEFAULT_LANGUAGE));
    headers.extend(identity_headers(profile));

    let mut builder = Client::builder()
        .user_agent(profile.user_agent.clone())
        .default_headers(headers)
        .timeout(profile.timeout)
        .connect_timeout(Duration::from_secs(10).min(profile.timeout))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if profile.requires_proxy() {
        let proxy_url = profile.proxy.as_deref().ok_or_else(|| {
            EngineError::StageUnavailable("no proxy configured for undetected-proxy".to_string())
        })?;
        let proxy = Proxy::all(proxy_url)
            .map_err(|e| EngineError::StageUnavailable(format!("invalid proxy URL: {}", e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| EngineError::StageUnavailable(format!("failed to build client: {}", e)))
}

/// reqwest-backed engine with one client per strategy
#[derive(Default)]
pub struct HttpEngine {
    clients: Mutex<HashMap<Strategy, Client>>,
}

impl HttpEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&self, profile: &StageProfile) -> Result<Client, EngineError> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&profile.strategy) {
            return Ok(client.clone());
        }
        let client = build_http_client(profile)?;
        clients.insert(profile.strategy, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl FetchEngine for HttpEngine {
    async fn prepare(&self, profile: &StageProfile) -> Result<(), EngineError> {
        self.client_for(profile).map(|_| ())
    }

    async fn fetch(
        &self,
        url: &str,
        profile: &StageProfile,
    ) -> Result<EngineResponse, EngineError> {
        let client = self.client_for(profile)?;
        let mut request = client.get(url).timeout(profile.timeout);

        if profile.randomize_headers {
            let (agent, language) = {
                let mut rng = rand::rng();
                (
                    FALLBACK_USER_AGENTS.choose(&mut rng).copied(),
                    FALLBACK_LANGUAGES.choose(&mut rng).copied(),
                )
            };
            if let Some(agent) = agent {
                request = request.header(reqwest::header::USER_AGENT, agent);
            }
            if let Some(language) = language {
                request = request.header(ACCEPT_LANGUAGE, language);
            }
        }

        let response = request.send().await.map_err(classify_error)?;
        let status_code = response.status().as_u16();
        let content = response.text().await.map_err(classify_error)?;

        Ok(EngineResponse {
            status_code,
            content,
            markdown: None,
            links: Vec::new(),
        })
    }
}

fn classify_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout
    } else if e.is_connect() {
        EngineError::Network("Connection refused".to_string())
    } else {
        EngineError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LadderConfig;

    #[test]
    fn test_build_http_client() {
        let profile = StageProfile::new(Strategy::PlainHttp, &LadderConfig::default());
        assert!(build_http_client(&profile).is_ok());
    }

    #[test]
    fn test_proxy_stage_without_proxy_is_unavailable() {
        let profile = StageProfile::new(Strategy::UndetectedProxy, &LadderConfig::default());
        assert!(matches!(
            build_http_client(&profile),
            Err(EngineError::StageUnavailable(_))
        ));
    }

    #[test]
    fn test_proxy_stage_with_proxy() {
        let mut config = LadderConfig::default();
        config.proxy_url = Some("http://127.0.0.1:3128".to_string());
        let profile = StageProfile::new(Strategy::UndetectedProxy, &config);
        assert!(build_http_client(&profile).is_ok());
    }

    #[tokio::test]
    async fn test_prepare_caches_client() {
        let engine = HttpEngine::new();
        let profile = StageProfile::new(Strategy::HttpFallback, &LadderConfig::default());
        engine.prepare(&profile).await.unwrap();
        engine.prepare(&profile).await.unwrap();
        assert_eq!(engine.clients.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_identity_headers_per_stage() {
        let config = LadderConfig::default();
        let plain = identity_headers(&StageProfile::new(Strategy::PlainHttp, &config));
        assert!(plain.is_empty());

        let headless = identity_headers(&StageProfile::new(Strategy::HeadlessDefault, &config));
        assert_eq!(headless.len(), 1);
        assert!(headless.contains_key(UPGRADE_INSECURE_REQUESTS));

        let stealth = identity_headers(&StageProfile::new(Strategy::Stealth, &config));
        let undetected = identity_headers(&StageProfile::new(Strategy::Undetected, &config));
        assert_eq!(stealth["sec-fetch-mode"], "navigate");
        assert_eq!(stealth["sec-ch-ua-platform"], "\"Windows\"");
        assert_eq!(undetected["sec-ch-ua-platform"], "\"macOS\"");
    }

    #[tokio::test]
    async fn test_each_stage_sends_distinct_headers() {
        use wiremock::matchers::{header, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        for (name, value, body) in [
            ("sec-ch-ua-platform", "\"macOS\"", "undetected"),
            ("sec-ch-ua-platform", "\"Windows\"", "stealth"),
            ("upgrade-insecure-requests", "1", "headless"),
        ] {
            Mock::given(method("GET"))
                .and(header(name, value))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain"))
            .mount(&server)
            .await;

        let engine = HttpEngine::new();
        let config = LadderConfig::default();
        let url = format!("{}/page.html", server.uri());
        for (strategy, expected) in [
            (Strategy::PlainHttp, "plain"),
            (Strategy::HeadlessDefault, "headless"),
            (Strategy::Stealth, "stealth"),
            (Strategy::Undetected, "undetected"),
        ] {
            let profile = StageProfile::new(strategy, &config);
            let response = engine.fetch(&url, &profile).await.unwrap();
            assert_eq!(response.content, expected, "{}", strategy);
        }
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host() {
        let engine = HttpEngine::new();
        let mut profile = StageProfile::new(Strategy::PlainHttp, &LadderConfig::default());
        profile.timeout = Duration::from_secs(2);
        let result = engine.fetch("http://127.0.0.1:9/", &profile).await;
        assert!(matches!(
            result,
            Err(EngineError::Network(_)) | Err(EngineError::Timeout)
        ));
    }
}
