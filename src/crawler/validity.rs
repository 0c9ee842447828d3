//! Fetch outcomes and the checks that decide whether a page is usable
//!
//! A response is only a success when it has a 2xx status, enough content,
//! and no error-page or interstitial markers. Everything else becomes a
//! [`FetchOutcome::Rejected`] so the ladder can escalate.

use crate::config::LadderConfig;
use crate::crawler::engine::EngineResponse;
use crate::crawler::strategy::{StageProfile, Strategy};
use std::collections::BTreeSet;
use std::fmt;

/// A usable page returned by a stage
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub status_code: u16,
    pub html: String,
    /// Markdown rendering, when the engine provides one
    pub markdown: Option<String>,
    /// Links the engine extracted itself
    pub links: Vec<String>,
}

impl PageContent {
    /// Content from raw HTML alone
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            html: html.into(),
            markdown: None,
            links: Vec::new(),
        }
    }
}

/// Why a response was not accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    HttpStatus(u16),
    TooShort { length: usize, minimum: usize },
    /// Matched this error indicator
    ErrorPage(String),
    /// Matched this interstitial marker
    Interstitial(String),
    /// The stage could not run at all
    StageUnavailable(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpStatus(code) => write!(f, "HTTP {}", code),
            Self::TooShort { length, minimum } => {
                write!(f, "content too short ({} < {})", length, minimum)
            }
            Self::ErrorPage(marker) => write!(f, "error page ({})", marker),
            Self::Interstitial(marker) => write!(f, "interstitial ({})", marker),
            Self::StageUnavailable(reason) => write!(f, "stage unavailable: {}", reason),
        }
    }
}

/// Outcome of one fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Ok(PageContent),
    Timeout,
    NetworkError(String),
    Rejected(RejectReason),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn content(&self) -> Option<&PageContent> {
        match self {
            Self::Ok(content) => Some(content),
            _ => None,
        }
    }

    /// Short label for logs
    pub fn label(&self) -> String {
        match self {
            Self::Ok(content) => format!("ok ({} bytes)", content.html.len()),
            Self::Timeout => "timeout".to_string(),
            Self::NetworkError(e) => format!("network error: {}", e),
            Self::Rejected(reason) => format!("rejected: {}", reason),
        }
    }
}

/// Result of fetching one URL with one strategy
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub url: String,
    pub strategy: Strategy,
    pub outcome: FetchOutcome,
    /// Absolute links found on the page; empty unless the fetch succeeded
    pub extracted_links: BTreeSet<String>,
}

impl FetchResult {
    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn failure(url: impl Into<String>, strategy: Strategy, outcome: FetchOutcome) -> Self {
        Self {
            url: url.into(),
            strategy,
            outcome,
            extracted_links: BTreeSet::new(),
        }
    }
}

/// Applies the status, length and marker checks to engine responses
#[derive(Debug, Clone)]
pub struct ContentValidator {
    error_indicators: Vec<String>,
    interstitial_markers: Vec<String>,
}

impl ContentValidator {
    pub fn new(config: &LadderConfig) -> Self {
        Self {
            error_indicators: lowercase_all(&config.error_indicators),
            interstitial_markers: lowercase_all(&config.interstitial_markers),
        }
    }

    pub fn validate(&self, response: EngineResponse, profile: &StageProfile) -> FetchOutcome {
        if !(200..300).contains(&response.status_code) {
            return FetchOutcome::Rejected(RejectReason::HttpStatus(response.status_code));
        }

        let length = response.content.chars().count();
        if length < profile.min_content_length {
            return FetchOutcome::Rejected(RejectReason::TooShort {
                length,
                minimum: profile.min_content_length,
            });
        }

        let lower = response.content.to_lowercase();
        if let Some(marker) = self.interstitial_markers.iter().find(|m| lower.contains(*m)) {
            return FetchOutcome::Rejected(RejectReason::Interstitial(marker.clone()));
        }
        if let Some(marker) = self.error_indicators.iter().find(|m| lower.contains(*m)) {
            return FetchOutcome::Rejected(RejectReason::ErrorPage(marker.clone()));
        }

        FetchOutcome::Ok(PageContent {
            status_code: response.status_code,
            html: response.content,
            markdown: response.markdown,
            links: response.links,
        })
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| v.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, content: &str) -> EngineResponse {
        EngineResponse {
            status_code: status,
            content: content.to_string(),
            markdown: None,
            links: Vec::new(),
        }
    }

    fn validate(status: u16, content: &str, strategy: Strategy) -> FetchOutcome {
        let config = LadderConfig::default();
        let profile = StageProfile::new(strategy, &config);
        ContentValidator::new(&config).validate(response(status, content), &profile)
    }

    fn long_page(body: &str) -> String {
        format!("<html><body>{}{}</body></html>", body, "x".repeat(200))
    }

    #[test]
    fn test_accepts_normal_page() {
        let outcome = validate(200, &long_page("welcome"), Strategy::HeadlessDefault);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_rejects_non_2xx() {
        let outcome = validate(500, &long_page(""), Strategy::PlainHttp);
        assert_eq!(outcome, FetchOutcome::Rejected(RejectReason::HttpStatus(500)));

        let outcome = validate(301, &long_page(""), Strategy::PlainHttp);
        assert_eq!(outcome, FetchOutcome::Rejected(RejectReason::HttpStatus(301)));
    }

    #[test]
    fn test_minimum_length_depends_on_stage() {
        let body = "<p>short page body</p>";
        assert!(validate(200, body, Strategy::PlainHttp).is_success());
        assert!(matches!(
            validate(200, body, Strategy::Stealth),
            FetchOutcome::Rejected(RejectReason::TooShort { minimum: 100, .. })
        ));
    }

    #[test]
    fn test_error_indicators_case_insensitive() {
        let outcome = validate(200, &long_page("<h1>Page Not Found</h1>"), Strategy::PlainHttp);
        assert_eq!(
            outcome,
            FetchOutcome::Rejected(RejectReason::ErrorPage("page not found".to_string()))
        );

        let outcome = validate(200, &long_page("ページが見つかりませんでした"), Strategy::PlainHttp);
        assert!(matches!(
            outcome,
            FetchOutcome::Rejected(RejectReason::ErrorPage(_))
        ));
    }

    #[test]
    fn test_interstitial_markers() {
        let outcome = validate(
            200,
            &long_page("This page was translated by J-SERVER PROFESSIONAL"),
            Strategy::HeadlessDefault,
        );
        assert!(matches!(
            outcome,
            FetchOutcome::Rejected(RejectReason::Interstitial(_))
        ));
    }

    #[test]
    fn test_custom_lists() {
        let mut config = LadderConfig::default();
        config.error_indicators = vec!["Gone Fishing".to_string()];
        config.interstitial_markers.clear();
        let profile = StageProfile::new(Strategy::PlainHttp, &config);
        let validator = ContentValidator::new(&config);

        let outcome = validator.validate(response(200, &long_page("gone fishing")), &profile);
        assert!(!outcome.is_success());

        let outcome = validator.validate(response(200, &long_page("MESS0001")), &profile);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_success_keeps_engine_extras() {
        let config = LadderConfig::default();
        let profile = StageProfile::new(Strategy::PlainHttp, &config);
        let mut resp = response(200, &long_page(""));
        resp.markdown = Some("[a](/a.html)".to_string());
        resp.links = vec!["https://example.test/b.html".to_string()];

        let outcome = ContentValidator::new(&config).validate(resp, &profile);
        let content = outcome.content().unwrap();
        assert_eq!(content.markdown.as_deref(), Some("[a](/a.html)"));
        assert_eq!(content.links.len(), 1);
    }
}
