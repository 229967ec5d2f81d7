//! Evidence scoring: maps search hits to weighted tags and merges them into
//! candidates without double counting.
//!
//! A candidate's score is always the sum of the weights of the distinct tags
//! in its evidence summary. The only way to change either is
//! [`CandidateRepo::add_evidence`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::github::{CodeItem, RepoItem};
use crate::models::{RepoCandidate, RepoMetadata};

pub const SCORE_TOOL_MENTION: u32 = 2;
pub const SCORE_PROMPT_ARTIFACT: u32 = 3;
pub const SCORE_CURSOR_FINGERPRINT: u32 = 3;

const TOOL_MENTION: &str = "tool_mention";
const PROMPT_ARTIFACT: &str = "prompt_artifact";
const CURSOR_FINGERPRINT: &str = "cursor_fingerprint";

/// Keyword groups checked in order against the query text; first match wins.
const TOOL_GROUPS: &[(&[&str], &str)] = &[
    (&["vibe coding", "Cursor"], "Cursor/vibe coding"),
    (&["Copilot"], "GitHub Copilot"),
    (&["Windsurf"], "Windsurf"),
    (&["LangGraph", "AutoGen", "CrewAI"], "AI Framework"),
];
const DEFAULT_TOOL: &str = "AI tool";

/// One piece of supporting signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// Repository search hit; carries the tool name derived from the query.
    ToolMention(String),
    /// Code hit on a prompt/agent file; carries the file path.
    PromptArtifact(String),
    /// Code hit inside a tool-specific directory; carries the file path.
    CursorFingerprint(String),
}

impl Evidence {
    pub fn weight(&self) -> u32 {
        match self {
            Evidence::ToolMention(_) => SCORE_TOOL_MENTION,
            Evidence::PromptArtifact(_) => SCORE_PROMPT_ARTIFACT,
            Evidence::CursorFingerprint(_) => SCORE_CURSOR_FINGERPRINT,
        }
    }

    pub fn tag(&self) -> String {
        match self {
            Evidence::ToolMention(tool) => format!("{TOOL_MENTION}:{tool}"),
            Evidence::PromptArtifact(path) => format!("{PROMPT_ARTIFACT}:{path}"),
            Evidence::CursorFingerprint(path) => format!("{CURSOR_FINGERPRINT}:{path}"),
        }
    }
}

/// Weight of a rendered tag; unknown kinds weigh nothing.
pub fn tag_weight(tag: &str) -> u32 {
    match tag.split_once(':').map(|(kind, _)| kind) {
        Some(TOOL_MENTION) => SCORE_TOOL_MENTION,
        Some(PROMPT_ARTIFACT) => SCORE_PROMPT_ARTIFACT,
        Some(CURSOR_FINGERPRINT) => SCORE_CURSOR_FINGERPRINT,
        _ => 0,
    }
}

/// Readable tool name for a repository-search query.
pub fn tool_name_for_query(query: &str) -> &'static str {
    TOOL_GROUPS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| query.contains(k)))
        .map(|(_, name)| *name)
        .unwrap_or(DEFAULT_TOOL)
}

pub fn tool_mention(query: &str) -> Evidence {
    Evidence::ToolMention(tool_name_for_query(query).to_string())
}

/// Evidence carried by a code-search hit, if any.
pub fn code_evidence(item: &CodeItem, query: &str) -> Option<Evidence> {
    let file_name = item.name.to_lowercase();
    let path = item.path.to_lowercase();

    if ["prompt", "agent", "system_prompt"]
        .iter()
        .any(|needle| file_name.contains(needle))
    {
        return Some(Evidence::PromptArtifact(item.path.clone()));
    }

    if path.contains(".cursor") || query.contains("Cursor rules") {
        return Some(Evidence::CursorFingerprint(item.path.clone()));
    }

    None
}

/// A repository under evaluation during one scan.
#[derive(Debug, Clone)]
pub struct CandidateRepo {
    pub repo_url: String,
    pub full_name: String,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
    pub description: Option<String>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub metadata: RepoMetadata,
    score: u32,
    evidence_summary: Vec<String>,
}

impl CandidateRepo {
    /// Candidate with no evidence yet.
    pub fn from_repo_item(item: &RepoItem) -> Self {
        Self {
            repo_url: item.html_url.clone(),
            full_name: item.full_name.clone(),
            stars: item.stargazers_count,
            forks: item.forks_count,
            language: item.language.clone().filter(|l| !l.is_empty()),
            description: item.description.clone().filter(|d| !d.is_empty()),
            pushed_at: item.pushed_at,
            metadata: RepoMetadata::default(),
            score: 0,
            evidence_summary: Vec::new(),
        }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn evidence_summary(&self) -> &[String] {
        &self.evidence_summary
    }

    /// Append the tag unless already present. Returns whether it was new.
    pub fn add_evidence(&mut self, evidence: &Evidence) -> bool {
        let tag = evidence.tag();
        if self.evidence_summary.contains(&tag) {
            return false;
        }
        self.evidence_summary.push(tag);
        self.score += evidence.weight();
        true
    }

    /// Durable projection, stamped with `now`. Store-assigned fields (id,
    /// creation time, clone info) are reconciled by the store on upsert.
    pub fn to_persisted(&self, now: DateTime<Utc>) -> RepoCandidate {
        RepoCandidate {
            id: Uuid::new_v4(),
            repo_url: self.repo_url.clone(),
            full_name: self.full_name.clone(),
            score: self.score,
            stars: self.stars,
            forks: Some(self.forks),
            language: self.language.clone(),
            description: self.description.clone(),
            pushed_at: self.pushed_at,
            evidence_summary: self.evidence_summary.clone(),
            metadata: self.metadata.clone(),
            cloned_at: None,
            clone_path: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Descending by score, ties broken by descending stars.
pub fn rank(candidates: &mut [CandidateRepo]) {
    candidates.sort_by(|a, b| b.score.cmp(&a.score).then(b.stars.cmp(&a.stars)));
}
