//! Web search tool backed by the DuckDuckGo Instant Answer API.
//!
//! The API returns an abstract, a direct answer, and related topics (some
//! nested one level under a category). They are flattened into a short
//! ranked list.

use async_trait::async_trait;
use serde::Deserialize;
use slothtop_core::error::ToolError;
use slothtop_core::tool::{ParamType, Tool, ToolParam, ToolResult};
use tracing::debug;

const MAX_RESULTS: usize = 5;

pub struct WebSearchTool {
    client: reqwest::Client,
    base_url: String,
}

impl WebSearchTool {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns a list of relevant results with titles, URLs, and snippets."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("query", ParamType::String, "The search query"),
            ToolParam::optional("num_results", ParamType::Integer, "Number of results to return (default 3)"),
        ]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"].as_str().unwrap_or_default().trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".into()));
        }
        let num_results = arguments["num_results"].as_u64().unwrap_or(3).clamp(1, MAX_RESULTS as u64) as usize;

        debug!(query = %query, "Searching the web");
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
            .send()
            .await
            .map_err(|e| ToolError::failed("web_search", e))?;

        if !response.status().is_success() {
            return Err(ToolError::failed(
                "web_search",
                format!("search provider returned {}", response.status()),
            ));
        }

        let body: InstantAnswer = response
            .json()
            .await
            .map_err(|e| ToolError::failed("web_search", format!("unreadable response: {e}")))?;

        let results = collect_results(body, num_results);
        if results.is_empty() {
            return Ok(ToolResult::ok(format!("No results found for '{query}'.")));
        }

        let output = serde_json::to_string_pretty(&results).unwrap_or_default();
        let data = serde_json::to_value(&results).ok();
        Ok(ToolResult {
            success: true,
            output,
            data,
        })
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    answer: serde_json::Value,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
    #[serde(default)]
    topics: Vec<RelatedTopic>,
}

/// Direct answer first, then the abstract, then related topics.
fn collect_results(body: InstantAnswer, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(answer) = body.answer.as_str().filter(|a| !a.is_empty()) {
        results.push(SearchResult {
            title: "Answer".into(),
            url: String::new(),
            snippet: answer.to_string(),
        });
    }

    if !body.abstract_text.is_empty() {
        results.push(SearchResult {
            title: body.heading.clone(),
            url: body.abstract_url.clone(),
            snippet: body.abstract_text.clone(),
        });
    }

    let flat = body
        .related_topics
        .into_iter()
        .flat_map(|t| if t.topics.is_empty() { vec![t] } else { t.topics });
    for topic in flat {
        if topic.text.is_empty() {
            continue;
        }
        let title = topic.text.split(" - ").next().unwrap_or(&topic.text).to_string();
        results.push(SearchResult {
            title,
            url: topic.first_url,
            snippet: topic.text,
        });
    }

    results.truncate(limit);
    results
}
