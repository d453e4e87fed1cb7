
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use fancy_regex::Regex;
use itertools::Itertools;
use serde::Deserialize;
use tracing::debug;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";
pub const NO_RESULTS: &str = "No relevant English results found";
const DEFAULT_TIMEOUT_SECONDS: u64 = 15;
const BLOCKED_HOSTS: &[&str] = &["zhihu", "baidu"];

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static DOT_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").expect("valid regex"));
static SITE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\|.*").expect("valid regex"));
static WORDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

/// One raw search result
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

/// Live web search provider
pub trait WebSearch: Send + Sync {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// DuckDuckGo instant answer API client
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    endpoint: Url,
    agent: ureq::Agent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RelatedTopic {
    text: String,
    #[serde(rename = "FirstURL")]
    first_url: String,
    /// Present on topic groups instead of `text`
    topics: Vec<RelatedTopic>,
}

impl DuckDuckGoSearch {
    #[inline]
    pub fn new() -> Result<Self> {
        let endpoint = Url::parse(DEFAULT_ENDPOINT).context("Invalid search endpoint")?;
        Ok(Self::with_endpoint(endpoint))
    }

    #[inline]
    pub fn with_endpoint(endpoint: Url) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();
        Self { endpoint, agent }
    }

    fn request_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("no_html", "1")
            .append_pair("skip_disambig", "1");
        url
    }
}

impl WebSearch for DuckDuckGoSearch {
    #[inline]
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let url = self.request_url(query);
        debug!(source = "WebSearch", "Querying {}", url);

        let body = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Web search request failed")?;

        let answer: InstantAnswer =
            serde_json::from_str(&body).context("Failed to parse web search response")?;

        Ok(hits_from_answer(answer).into_iter().take(max_results).collect())
    }
}

fn hits_from_answer(answer: InstantAnswer) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    if !answer.abstract_text.is_empty() {
        hits.push(SearchHit {
            title: answer.heading,
            snippet: answer.abstract_text,
            link: answer.abstract_url,
        });
    }

    let topics = answer.related_topics.into_iter().flat_map(|topic| {
        if topic.topics.is_empty() {
            vec![topic]
        } else {
            topic.topics
        }
    });

    hits.extend(topics.filter(|topic| !topic.text.is_empty()).map(|topic| {
        SearchHit {
            title: title_from_link(&topic.first_url),
            snippet: topic.text,
            link: topic.first_url,
        }
    }));

    hits
}

/// Topic links end in the article name with underscores, e.g. `/Chronic_kidney_disease`
fn title_from_link(link: &str) -> String {
    Url::parse(link)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .map_or_else(String::new, |segment| segment.replace('_', " "))
}

/// Normalize a result snippet for use as model context
#[inline]
pub fn clean_snippet(snippet: &str) -> String {
    let text = SPACE_RUNS.replace_all(snippet.trim(), " ");
    let text = DOT_RUNS.replace_all(&text, ".");
    let text = SITE_SUFFIX.replace_all(&text, "");
    text.replace("Read more", "")
        .replace("Learn more", "")
        .trim()
        .to_string()
}

fn query_keywords(query: &str) -> Vec<String> {
    WORDS
        .find_iter(query)
        .filter_map(|word| word.ok())
        .map(|word| word.as_str().to_lowercase())
        .filter(|word| word.chars().count() > 3)
        .collect()
}

/// Filter and render search hits as a context block.
///
/// Hits without a title or link, from blocked hosts, or that mention none of
/// the query's words longer than three characters are dropped.
#[inline]
pub fn format_results(query: &str, hits: &[SearchHit]) -> String {
    let keywords = query_keywords(query);

    let kept: Vec<(String, String, &str)> = hits
        .iter()
        .filter(|hit| !hit.title.trim().is_empty() && !hit.link.is_empty())
        .filter(|hit| !BLOCKED_HOSTS.iter().any(|host| hit.link.contains(host)))
        .filter_map(|hit| {
            let title = hit.title.trim().to_string();
            let snippet = clean_snippet(&hit.snippet);
            let haystack = format!("{} {}", snippet.to_lowercase(), title.to_lowercase());
            keywords
                .iter()
                .any(|keyword| haystack.contains(keyword.as_str()))
                .then_some((title, snippet, hit.link.as_str()))
        })
        .collect();

    if kept.is_empty() {
        return NO_RESULTS.to_string();
    }

    kept.iter()
        .map(|(title, snippet, link)| format!("**{title}**\n{snippet}\nSource: {link}"))
        .join("\n\n")
}
