//! Strict parser for the marker-text tool-call encoding.
//!
//! Some deployments cannot rely on structured function calling and instead
//! instruct the model to emit a pseudo-call as plain text:
//!
//! ```text
//! FUNCTION: anime_search
//! PARAMS:
//!     query: Cowboy Bebop
//! ```
//!
//! The grammar is rigid on purpose. Anything that does not match it exactly
//! is classified as plain text, never as a partial call, so arbitrary
//! assistant prose can never be misread as a tool request.

use serde_json::{Map, Value};

/// Result of classifying one raw model reply under the marker grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerReply {
    /// The reply was exactly one well-formed pseudo-call.
    Call { name: String, arguments: Value },
    /// Everything else.
    Text,
}

/// Classify `raw` against the marker grammar.
///
/// Accepted shape: a `FUNCTION: <name>` line, then a bare `PARAMS:` line,
/// then zero or more `<key>: <value>` lines. Blank lines are ignored. Any
/// other line, a missing header, or an empty tool name fails closed to
/// [`MarkerReply::Text`].
pub fn parse(raw: &str) -> MarkerReply {
    let mut lines = raw.lines().map(str::trim).filter(|line| !line.is_empty());

    let name = match lines.next().and_then(|line| line.strip_prefix("FUNCTION:")) {
        Some(rest) => rest.trim(),
        None => return MarkerReply::Text,
    };
    if name.is_empty() || name.contains(char::is_whitespace) {
        return MarkerReply::Text;
    }

    match lines.next() {
        Some("PARAMS:") => {}
        _ => return MarkerReply::Text,
    }

    let mut arguments = Map::new();
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            return MarkerReply::Text;
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return MarkerReply::Text;
        }
        arguments.insert(key.to_string(), Value::String(value.trim().to_string()));
    }

    MarkerReply::Call {
        name: name.to_string(),
        arguments: Value::Object(arguments),
    }
}

/// Render the tool catalog as prompt text for marker-encoding deployments.
pub fn catalog_prompt(tools: &[crate::tool::ToolDescription]) -> String {
    let mut out = String::from(
        "You have access to the following functions, which you should use as much as possible:\n",
    );
    for tool in tools {
        out.push_str(&format!("- {}\n  {}\n", tool.name, tool.description));
        if let Some(params) = &tool.parameters {
            out.push_str(&format!("  parameters: {params}\n"));
        }
    }
    out.push_str(
        "\nTo call a function, respond with this format and nothing else:\n\
         FUNCTION: <function name>\n\
         PARAMS:\n\
             <param name>: <value>\n\
         \nOtherwise, reply as normal.",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_well_formed_call() {
        let raw = "FUNCTION: anime_search\nPARAMS:\n    query: Cowboy Bebop";
        assert_eq!(
            parse(raw),
            MarkerReply::Call {
                name: "anime_search".into(),
                arguments: json!({"query": "Cowboy Bebop"}),
            }
        );
    }

    #[test]
    fn parses_call_without_params() {
        let raw = "FUNCTION: list_genres\nPARAMS:";
        assert_eq!(
            parse(raw),
            MarkerReply::Call {
                name: "list_genres".into(),
                arguments: json!({}),
            }
        );
    }

    #[test]
    fn plain_text_is_text() {
        assert_eq!(parse("Cowboy Bebop is a 1998 series."), MarkerReply::Text);
        assert_eq!(parse(""), MarkerReply::Text);
    }

    #[test]
    fn mentioning_the_marker_mid_text_is_text() {
        let raw = "Sure! The FUNCTION: syntax lets me call tools.";
        assert_eq!(parse(raw), MarkerReply::Text);
    }

    #[test]
    fn partial_call_fails_closed() {
        // Missing PARAMS header.
        assert_eq!(parse("FUNCTION: anime_search"), MarkerReply::Text);
        // Empty function name.
        assert_eq!(parse("FUNCTION:\nPARAMS:"), MarkerReply::Text);
        // Name with embedded whitespace.
        assert_eq!(parse("FUNCTION: do a search\nPARAMS:"), MarkerReply::Text);
        // Trailing prose after the params block.
        assert_eq!(
            parse("FUNCTION: anime_search\nPARAMS:\n    query: x\nHope that helps!"),
            MarkerReply::Text
        );
    }
}
