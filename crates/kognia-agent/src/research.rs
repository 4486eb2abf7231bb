//! Web research tools for the Research specialist.
//!
//! Two tools, both plain HTTP over `reqwest`:
//! - `search`: a SearxNG-compatible JSON search endpoint
//!   (`GET {search_url}?q=...&format=json`), used only when configured;
//! - `fetch`: page retrieval for URLs named in the prompt or returned by the
//!   search, reduced to plain text.
//!
//! Failures are classified into [`SpecialistError`] the same way model calls
//! are, so the orchestrator retries tool timeouts and 5xx responses.

use crate::backends::openai::classify_status;
use kognia_core::SpecialistError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_RESPONSE_SIZE: usize = 2 * 1024 * 1024;

/// Research tool settings, read from `[research]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchToolsConfig {
    /// Search endpoint. Without it only URLs named in the prompt are read.
    #[serde(default)]
    pub search_url: Option<String>,
    /// Search hits kept per query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Pages fetched per invocation.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Characters kept per fetched page.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
    /// Timeout for a single search or fetch request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Allow loopback and private-network hosts. Off outside tests.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_max_results() -> usize {
    5
}

fn default_max_pages() -> usize {
    3
}

fn default_max_page_chars() -> usize {
    8_000
}

fn default_request_timeout_ms() -> u64 {
    20_000
}

impl Default for ResearchToolsConfig {
    fn default() -> Self {
        Self {
            search_url: None,
            max_results: default_max_results(),
            max_pages: default_max_pages(),
            max_page_chars: default_max_page_chars(),
            request_timeout_ms: default_request_timeout_ms(),
            allow_private_hosts: false,
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Page address.
    pub url: String,
    /// Result snippet.
    #[serde(default, alias = "snippet")]
    pub content: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// Plain-text content of one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// Requested address.
    pub url: String,
    /// Extracted text, capped at `max_page_chars`.
    pub text: String,
}

/// Everything the tools gathered for one research request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchEvidence {
    /// Search results, in ranking order.
    pub hits: Vec<SearchHit>,
    /// Pages read.
    pub pages: Vec<FetchedPage>,
    /// Pages that could not be used, with the reason.
    pub skipped: Vec<String>,
}

impl ResearchEvidence {
    /// Whether anything was gathered.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty() && self.pages.is_empty()
    }

    /// Source URLs, search hits first.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.hits.iter().map(|h| h.url.clone()).collect();
        for page in &self.pages {
            if !sources.contains(&page.url) {
                sources.push(page.url.clone());
            }
        }
        sources
    }

    /// Labelled text block appended to the research prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.hits.is_empty() {
            out.push_str("SEARCH_RESULTS:\n");
            for (i, hit) in self.hits.iter().enumerate() {
                let _ = writeln!(out, "{}. {} <{}>\n   {}", i + 1, hit.title, hit.url, hit.content);
            }
        }
        for page in &self.pages {
            let _ = write!(out, "\nPAGE_CONTENT <{}>:\n{}\n", page.url, page.text);
        }
        out
    }
}

/// HTTP-backed search and fetch tools.
#[derive(Clone)]
pub struct WebResearchTools {
    config: ResearchToolsConfig,
    http: reqwest::Client,
}

impl WebResearchTools {
    /// Build the tools with an HTTP client honouring the request timeout.
    pub fn new(config: ResearchToolsConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { config, http }
    }

    /// Tool settings.
    pub fn config(&self) -> &ResearchToolsConfig {
        &self.config
    }

    /// Run a search query. Empty when no search endpoint is configured.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SpecialistError> {
        let Some(search_url) = &self.config.search_url else {
            return Ok(Vec::new());
        };
        info!(query = %query, "Web search");
        let resp = self
            .http
            .get(search_url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_tool_status(status, &body));
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| SpecialistError::ToolError(format!("Malformed search response: {e}")))?;
        Ok(parsed
            .results
            .into_iter()
            .filter(|hit| !hit.url.is_empty())
            .take(self.config.max_results)
            .collect())
    }

    /// Fetch a page and reduce it to plain text.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, SpecialistError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| SpecialistError::InvalidOutput(format!("Invalid URL '{url}': {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(SpecialistError::InvalidOutput(format!(
                    "Unsupported scheme '{scheme}'"
                )));
            }
        }
        if !self.config.allow_private_hosts {
            if let Some(host) = parsed.host_str().filter(|h| is_private_host(h)) {
                return Err(SpecialistError::InvalidOutput(format!(
                    "Access denied: '{host}' is a private or internal address"
                )));
            }
        }

        debug!(url = %url, "Fetching page");
        let resp = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(classify_transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(classify_tool_status(status, ""));
        }
        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));
        let bytes = resp.bytes().await.map_err(classify_transport_error)?;
        if bytes.len() > MAX_RESPONSE_SIZE {
            return Err(SpecialistError::InvalidOutput(format!(
                "Response too large: {} bytes",
                bytes.len()
            )));
        }
        let body = String::from_utf8_lossy(&bytes);
        let text = if is_html {
            html_to_text(&body)
        } else {
            body.trim().to_string()
        };
        Ok(FetchedPage {
            url: url.to_string(),
            text: text.chars().take(self.config.max_page_chars).collect(),
        })
    }

    /// Search for the prompt and read the URLs it names plus the top hits.
    ///
    /// Transient failures abort the whole gathering so that the caller can
    /// retry. Pages that are refused or gone are skipped.
    pub async fn gather(&self, prompt: &str) -> Result<ResearchEvidence, SpecialistError> {
        let mut evidence = ResearchEvidence {
            hits: self.search(prompt).await?,
            ..ResearchEvidence::default()
        };

        let mut urls = extract_urls(prompt);
        for hit in &evidence.hits {
            if !urls.contains(&hit.url) {
                urls.push(hit.url.clone());
            }
        }
        urls.truncate(self.config.max_pages);

        for url in urls {
            match self.fetch(&url).await {
                Ok(page) => evidence.pages.push(page),
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping page");
                    evidence.skipped.push(format!("{url}: {e}"));
                }
            }
        }
        info!(
            hits = evidence.hits.len(),
            pages = evidence.pages.len(),
            skipped = evidence.skipped.len(),
            "Research evidence gathered"
        );
        Ok(evidence)
    }
}

fn classify_transport_error(e: reqwest::Error) -> SpecialistError {
    if e.is_timeout() {
        SpecialistError::ToolTimeout(e.to_string())
    } else {
        SpecialistError::ToolError(e.to_string())
    }
}

fn classify_tool_status(status: reqwest::StatusCode, body: &str) -> SpecialistError {
    match classify_status(status, body) {
        SpecialistError::InvalidOutput(_) => {
            SpecialistError::InvalidOutput(format!("Tool request rejected: {status}"))
        }
        other => other,
    }
}

fn url_regex() -> Option<&'static Regex> {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).ok())
        .as_ref()
}

/// http(s) URLs mentioned in free text, in order, without duplicates.
pub fn extract_urls(text: &str) -> Vec<String> {
    let Some(re) = url_regex() else {
        return Vec::new();
    };
    let mut urls: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

fn markup_regexes() -> Option<&'static (Regex, Regex, Regex)> {
    static MARKUP: OnceLock<Option<(Regex, Regex, Regex)>> = OnceLock::new();
    MARKUP
        .get_or_init(|| {
            let blocks = Regex::new(r"(?is)<(script|style|noscript|svg)\b.*?</(script|style|noscript|svg)>").ok()?;
            let tags = Regex::new(r"(?s)<[^>]*>").ok()?;
            let spaces = Regex::new(r"[ \t\r\f]+").ok()?;
            Some((blocks, tags, spaces))
        })
        .as_ref()
}

/// Strip markup and collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let Some((blocks, tags, spaces)) = markup_regexes() else {
        return html.to_string();
    };
    let text = blocks.replace_all(html, " ");
    let text = tags.replace_all(&text, "\n");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    text.lines()
        .map(|line| spaces.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Loopback, private-network and cloud metadata hosts.
fn is_private_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']').to_lowercase();
    if host == "localhost" || host.ends_with(".localhost") || host.starts_with("metadata.") {
        return true;
    }
    match host.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V4(ip)) => {
            ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
        }
        Ok(std::net::IpAddr::V6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_urls() {
        let urls = extract_urls(
            "Compare https://brandx.com/about, and http://rival.io/pricing. Also https://brandx.com/about",
        );
        assert_eq!(urls, vec!["https://brandx.com/about", "http://rival.io/pricing"]);
        assert!(extract_urls("no links here").is_empty());
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><style>body{}</style><script>var x = 1;</script></head>\
                    <body><h1>Brand X</h1><p>Premium &amp; loyal</p></body></html>";
        assert_eq!(html_to_text(html), "Brand X\nPremium & loyal");
    }

    #[test]
    fn test_private_host_detection() {
        assert!(is_private_host("localhost"));
        assert!(is_private_host("127.0.0.1"));
        assert!(is_private_host("10.1.2.3"));
        assert!(is_private_host("192.168.0.10"));
        assert!(is_private_host("169.254.169.254"));
        assert!(is_private_host("[::1]"));
        assert!(is_private_host("metadata.google.internal"));
        assert!(!is_private_host("brandx.com"));
        assert!(!is_private_host("8.8.8.8"));
    }

    #[tokio::test]
    async fn test_fetch_refuses_private_hosts_and_bad_schemes() {
        let tools = WebResearchTools::new(ResearchToolsConfig::default());
        let err = tools.fetch("http://127.0.0.1:8080/admin").await.unwrap_err();
        assert!(matches!(err, SpecialistError::InvalidOutput(_)));
        assert!(err.to_string().contains("private"));

        let err = tools.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_search_without_endpoint_is_empty() {
        let tools = WebResearchTools::new(ResearchToolsConfig::default());
        assert!(tools.search("Brand X").await.unwrap().is_empty());
    }

    #[test]
    fn test_evidence_render_and_sources() {
        let evidence = ResearchEvidence {
            hits: vec![SearchHit {
                title: "Brand X".to_string(),
                url: "https://brandx.com".to_string(),
                content: "Premium sneakers".to_string(),
            }],
            pages: vec![
                FetchedPage {
                    url: "https://brandx.com".to_string(),
                    text: "About us".to_string(),
                },
                FetchedPage {
                    url: "https://rival.io".to_string(),
                    text: "Pricing".to_string(),
                },
            ],
            skipped: Vec::new(),
        };
        assert_eq!(evidence.sources(), vec!["https://brandx.com", "https://rival.io"]);
        let rendered = evidence.render();
        assert!(rendered.starts_with("SEARCH_RESULTS:\n1. Brand X <https://brandx.com>"));
        assert!(rendered.contains("PAGE_CONTENT <https://rival.io>:\nPricing"));
    }
}
