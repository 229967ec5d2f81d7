//! CSV rendering of persisted candidates.

use chrono::{NaiveDate, SecondsFormat};

use crate::models::RepoCandidate;

pub const CSV_HEADERS: [&str; 7] = [
    "Repository URL",
    "Full Name",
    "Score",
    "Stars",
    "Pushed At",
    "Evidence Count",
    "Evidence Summary",
];

/// Header row, then one row per candidate in the order given. Every data
/// cell is quoted; rows are joined by `\n` with no trailing newline.
pub fn candidates_to_csv(candidates: &[RepoCandidate]) -> String {
    let mut lines = Vec::with_capacity(candidates.len() + 1);
    lines.push(CSV_HEADERS.join(","));

    for repo in candidates {
        let cells = [
            repo.repo_url.clone(),
            repo.full_name.clone(),
            repo.score.to_string(),
            repo.stars.to_string(),
            repo.pushed_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default(),
            repo.evidence_summary.len().to_string(),
            repo.evidence_summary.join("; "),
        ];
        let row: Vec<String> = cells.iter().map(|c| quote(c)).collect();
        lines.push(row.join(","));
    }

    lines.join("\n")
}

/// `vibe-repos-YYYY-MM-DD.csv`
pub fn export_filename(date: NaiveDate) -> String {
    format!("vibe-repos-{}.csv", date.format("%Y-%m-%d"))
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
