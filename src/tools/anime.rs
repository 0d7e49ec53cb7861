//! Anime metadata search tools backed by the Jikan (MyAnimeList) API.
//!
//! Both tools issue a GET against `/v4/anime` ordered by popularity and hand
//! the raw JSON body back as text for the model to summarize.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{ChatError, Result};
use crate::tool::{Tool, ToolRegistry};

const JIKAN_BASE_URL: &str = "https://api.jikan.moe/v4";

/// Registry with both Jikan search tools.
pub fn anime_toolkit() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(AnimeSearchTool)?;
    registry.register(AnimeGenreSearchTool)?;
    Ok(registry)
}

struct AnimeSearchTool;

#[async_trait]
impl Tool for AnimeSearchTool {
    fn name(&self) -> &str {
        "anime_search"
    }

    fn description(&self) -> &str {
        "Search anime by title, most popular first. Expects {\"query\": string}."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Free-text anime title to search for"}
            },
            "required": ["query"]
        }))
    }

    async fn call(&self, arguments: Value) -> Result<String> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ChatError::Protocol("missing `query` for anime_search".into()))?;

        fetch_anime(self.name(), &[("q", query.to_string())]).await
    }
}

struct AnimeGenreSearchTool;

#[async_trait]
impl Tool for AnimeGenreSearchTool {
    fn name(&self) -> &str {
        "anime_search_by_genre_id"
    }

    fn description(&self) -> &str {
        "Search anime by MyAnimeList genre id (e.g. 18 for mecha), most popular first. \
         Expects {\"genre_id\": integer}."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "genre_id": {"type": "integer", "description": "Numeric MyAnimeList genre id"}
            },
            "required": ["genre_id"]
        }))
    }

    async fn call(&self, arguments: Value) -> Result<String> {
        let genre_id = parse_genre_id(&arguments).ok_or_else(|| {
            ChatError::Protocol("missing or non-numeric `genre_id` for anime_search_by_genre_id".into())
        })?;

        fetch_anime(self.name(), &[("genres", genre_id.to_string())]).await
    }
}

/// The marker encoding delivers every argument as a string, so accept both
/// JSON numbers and numeric strings.
fn parse_genre_id(arguments: &Value) -> Option<u64> {
    let raw = arguments.get("genre_id")?;
    raw.as_u64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
}

async fn fetch_anime(tool_name: &str, params: &[(&str, String)]) -> Result<String> {
    let query: String = params
        .iter()
        .map(|(key, value)| format!("{key}={}&", urlencoding::encode(value)))
        .collect();
    let url = format!("{JIKAN_BASE_URL}/anime?{query}order_by=popularity");

    // One connection per invocation; nothing is pooled across calls.
    let client = reqwest::Client::new();
    let response = client
        .get(&url)
        .header("User-Agent", "anichat/0.1")
        .send()
        .await
        .map_err(|err| ChatError::ToolInvocation {
            name: tool_name.to_string(),
            source: Box::new(err),
        })?;

    if !response.status().is_success() {
        return Err(ChatError::ToolInvocation {
            name: tool_name.to_string(),
            source: format!("jikan returned {}", response.status()).into(),
        });
    }

    response.text().await.map_err(|err| ChatError::ToolInvocation {
        name: tool_name.to_string(),
        source: Box::new(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolkit_registers_both_tools() {
        let registry = anime_toolkit().unwrap();
        assert!(registry.get("anime_search").is_some());
        assert!(registry.get("anime_search_by_genre_id").is_some());
        assert_eq!(registry.describe().len(), 2);
    }

    #[test]
    fn genre_id_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_genre_id(&json!({"genre_id": 18})), Some(18));
        assert_eq!(parse_genre_id(&json!({"genre_id": "18"})), Some(18));
        assert_eq!(parse_genre_id(&json!({"genre_id": "mecha"})), None);
        assert_eq!(parse_genre_id(&json!({})), None);
    }

    #[tokio::test]
    async fn missing_arguments_are_protocol_errors() {
        let err = AnimeSearchTool.call(json!({})).await.unwrap_err();
        assert!(matches!(err, ChatError::Protocol(_)));

        let err = AnimeGenreSearchTool
            .call(json!({"genre_id": "not a number"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Protocol(_)));
    }
}
