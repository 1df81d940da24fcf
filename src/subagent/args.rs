// ABOUTME: Heuristic argument construction for subagent tool calls.
// ABOUTME: Builds tool arguments from the task text and context, per tool shape.

use std::collections::HashSet;

/// Build arguments for a tool call from the agent's task and context.
///
/// Search-like tools get extracted keywords, file-like tools get the first
/// path-looking token, everything else gets the task and context verbatim.
pub fn build_args(tool: &str, task: &str, context: &str) -> serde_json::Value {
    let lower = tool.to_lowercase();

    if lower.contains("search") || lower.contains("grep") || lower.contains("find") {
        let query = extract_keywords(task, 6).join(" ");
        return serde_json::json!({ "query": query });
    }

    if lower.contains("read") || lower.contains("file") || lower.contains("list") {
        if let Some(path) = extract_path(task).or_else(|| extract_path(context)) {
            return serde_json::json!({ "path": path });
        }
    }

    serde_json::json!({ "task": task, "context": context })
}

/// Pull the most useful identifier-like words out of free text.
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "and", "for", "with", "that", "this", "from", "what", "which", "where", "when",
        "how", "are", "was", "were", "will", "can", "could", "should", "into", "about", "then",
        "them", "their", "find", "look", "search",
    ];

    let re = regex::Regex::new(r"[A-Za-z_][A-Za-z0-9_]{3,}").unwrap();
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for m in re.find_iter(text) {
        let word = m.as_str();
        let key = word.to_lowercase();
        if STOPWORDS.contains(&key.as_str()) || !seen.insert(key) {
            continue;
        }
        keywords.push(word.to_string());
        if keywords.len() >= limit {
            break;
        }
    }

    keywords
}

/// Find the first file-path-looking token in free text.
pub fn extract_path(text: &str) -> Option<String> {
    let re = regex::Regex::new(r"(?:[\w.-]+/)*[\w.-]+\.\w+|/[\w./-]+").unwrap();
    re.find_iter(text)
        .map(|m| m.as_str().to_string())
        .find(|t| t.contains('/') || t.contains('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_tool_gets_keywords() {
        let args = build_args("code_search", "find the RequestHandler registration logic", "");
        let query = args["query"].as_str().unwrap();
        assert!(query.contains("RequestHandler"));
        assert!(query.contains("registration"));
        assert!(!query.contains("find"));
    }

    #[test]
    fn test_file_tool_gets_path() {
        let args = build_args("read_file", "summarize src/mcp/client.rs for me", "");
        assert_eq!(args["path"], "src/mcp/client.rs");
    }

    #[test]
    fn test_file_tool_falls_back_to_context_path() {
        let args = build_args("read_file", "summarize the config", "config lives at /etc/aios/servers.json");
        assert_eq!(args["path"], "/etc/aios/servers.json");
    }

    #[test]
    fn test_generic_tool_gets_task_and_context() {
        let args = build_args("weather_query", "what is the weather", "city: Hangzhou");
        assert_eq!(args["task"], "what is the weather");
        assert_eq!(args["context"], "city: Hangzhou");
    }

    #[test]
    fn test_keywords_skip_stopwords_and_dupes() {
        let words = extract_keywords("find the parser that parses Parser parser", 10);
        assert_eq!(words, vec!["parser", "parses"]);
    }

    #[test]
    fn test_extract_path_none() {
        assert!(extract_path("no paths here at all").is_none());
    }
}
