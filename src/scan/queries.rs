use crate::models::ResolvedScanParams;

/// README searches for AI-assisted development workflows.
pub const DEFAULT_REPO_QUERIES: &[&str] = &[
    r#"("vibe coding" OR vibecoding OR "prompt-driven" OR "AI-assisted" OR "built with Cursor" OR "Cursor AI") in:readme"#,
    r#"("GitHub Copilot" OR Copilot OR Windsurf OR "Claude Code" OR aider OR "Continue.dev") in:readme"#,
    r#"("LangGraph" OR AutoGen OR CrewAI) in:readme"#,
];

/// Code searches for prompt files and editor rule directories.
pub const DEFAULT_CODE_QUERIES: &[&str] = &[
    "filename:prompts.md OR filename:agent.md OR filename:SYSTEM_PROMPT.md",
    r#"path:.cursor OR "Cursor rules""#,
];

/// Repository queries for a scan: custom ones when given, otherwise the
/// defaults, each with the language/pushed/stars modifiers appended.
pub fn repo_queries(params: &ResolvedScanParams) -> Vec<String> {
    let base: Vec<&str> = if params.custom_repo_queries.is_empty() {
        DEFAULT_REPO_QUERIES.to_vec()
    } else {
        params.custom_repo_queries.iter().map(String::as_str).collect()
    };

    base.into_iter()
        .map(|q| with_filters(q, params))
        .collect()
}

/// Code queries are used as given; filters only apply to repository search.
pub fn code_queries(params: &ResolvedScanParams) -> Vec<String> {
    if params.custom_code_queries.is_empty() {
        DEFAULT_CODE_QUERIES.iter().map(|q| q.to_string()).collect()
    } else {
        params.custom_code_queries.clone()
    }
}

fn with_filters(base: &str, params: &ResolvedScanParams) -> String {
    let mut query = base.to_string();
    if let Some(language) = &params.language {
        query.push_str(&format!(" language:{language}"));
    }
    if let Some(pushed_after) = &params.pushed_after {
        query.push_str(&format!(" pushed:>{pushed_after}"));
    }
    if let Some(stars_min) = params.stars_min {
        query.push_str(&format!(" stars:>={stars_min}"));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_filters() {
        let params = ResolvedScanParams::default();
        let queries = repo_queries(&params);
        assert_eq!(queries.len(), DEFAULT_REPO_QUERIES.len());
        assert_eq!(queries[0], DEFAULT_REPO_QUERIES[0]);
        assert_eq!(code_queries(&params).len(), 2);
    }

    #[test]
    fn test_filters_appended_in_order() {
        let params = ResolvedScanParams {
            language: Some("Rust".to_string()),
            pushed_after: Some("2024-01-01".to_string()),
            stars_min: Some(10),
            custom_repo_queries: vec!["cursor in:readme".to_string()],
            ..ResolvedScanParams::default()
        };
        assert_eq!(
            repo_queries(&params),
            vec!["cursor in:readme language:Rust pushed:>2024-01-01 stars:>=10"]
        );
    }

    #[test]
    fn test_custom_code_queries_untouched() {
        let params = ResolvedScanParams {
            language: Some("Go".to_string()),
            custom_code_queries: vec!["filename:CLAUDE.md".to_string()],
            ..ResolvedScanParams::default()
        };
        assert_eq!(code_queries(&params), vec!["filename:CLAUDE.md"]);
    }
}
