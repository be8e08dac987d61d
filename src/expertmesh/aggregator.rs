//! Result aggregation.
//!
//! Turns the subtask results of one run into the final response text. The merge is a pure
//! function of its inputs: same results, breakdown and summary in, same text out.

use crate::expertmesh::assignment::TaskBreakdown;
use crate::expertmesh::config::AssignmentConfig;
use crate::expertmesh::coordinator::FinalSummary;
use crate::expertmesh::orchestrator::SubtaskResult;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

/// Priority given to results whose subtask id is not in the breakdown.
const UNKNOWN_PRIORITY: u32 = 999;

const ANALYSIS_MARKERS: &[&str] = &[
    "analysis", "analyze", "analyse", "concept", "principle", "theory", "mechanism", "research",
    "data",
];
const ADVICE_MARKERS: &[&str] = &[
    "recommend", "suggest", "advice", "should", "step", "tip", "method", "technique",
];

/// Which section a result belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaning {
    Analysis,
    Advice,
    Neutral,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    display_names: HashMap<String, String>,
    technical_worker: String,
    practical_worker: String,
}

impl Aggregator {
    pub fn new(config: &AssignmentConfig) -> Self {
        Self {
            display_names: HashMap::new(),
            technical_worker: config.technical_worker.clone(),
            practical_worker: config.practical_worker.clone(),
        }
    }

    pub fn with_display_name(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.set_display_name(id, name);
        self
    }

    pub fn set_display_name(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.display_names.insert(id.into(), name.into());
    }

    /// Display name for `id`, or the id itself.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.display_names.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Classify by marker words; when both or neither marker sets match, the producing worker
    /// decides.
    pub fn leaning(&self, result: &SubtaskResult) -> Leaning {
        let text = result.result.to_lowercase();
        let analysis = ANALYSIS_MARKERS.iter().any(|m| text.contains(m));
        let advice = ADVICE_MARKERS.iter().any(|m| text.contains(m));
        match (analysis, advice) {
            (true, false) => Leaning::Analysis,
            (false, true) => Leaning::Advice,
            _ if result.worker_id == self.technical_worker => Leaning::Analysis,
            _ if result.worker_id == self.practical_worker => Leaning::Advice,
            _ => Leaning::Neutral,
        }
    }

    /// Merge `results` into the final response.
    ///
    /// One result is returned verbatim. With several, a coordinator `summary` (when present)
    /// leads and the raw results follow as background; otherwise the analysis-leaning and
    /// advice-leaning results head their own sections.
    pub fn aggregate(
        &self,
        request: &str,
        results: &[SubtaskResult],
        breakdown: &TaskBreakdown,
        summary: Option<&FinalSummary>,
    ) -> String {
        match results {
            [] => return "No worker produced a result for this request.".to_string(),
            [only] => return only.result.clone(),
            _ => {}
        }

        let sorted = sort_by_priority(results, breakdown);
        let mut out = match summary {
            Some(summary) => self.render_with_summary(request, &sorted, summary),
            None => self.render_merged(request, &sorted),
        };
        out.push_str(&self.footer(results));
        out
    }

    fn render_merged(&self, request: &str, sorted: &[&SubtaskResult]) -> String {
        let mut out = format!("The team's answer to \"{}\":\n\n", request);

        let analysis = sorted
            .iter()
            .position(|r| self.leaning(r) == Leaning::Analysis);
        let advice = sorted
            .iter()
            .enumerate()
            .position(|(i, r)| Some(i) != analysis && self.leaning(r) == Leaning::Advice);

        if let Some(i) = analysis {
            self.section(&mut out, "Analysis", sorted[i]);
        }
        if let Some(i) = advice {
            self.section(&mut out, "Practical advice", sorted[i]);
        }
        for (i, result) in sorted.iter().enumerate() {
            if Some(i) != analysis && Some(i) != advice {
                self.section(&mut out, "Additional perspective", result);
            }
        }
        out
    }

    fn render_with_summary(
        &self,
        request: &str,
        sorted: &[&SubtaskResult],
        summary: &FinalSummary,
    ) -> String {
        let mut out = format!("The team's answer to \"{}\":\n\n", request);

        bullets(&mut out, "Key insights", &summary.key_insights);
        bullets(&mut out, "Actionable advice", &summary.actionable_advice);
        let _ = writeln!(out, "## Conclusion\n\n{}\n", summary.conclusion);
        if let Some(steps) = &summary.next_steps {
            bullets(&mut out, "Next steps", steps);
        }

        out.push_str("## Background reference\n\n");
        for result in sorted {
            let _ = writeln!(
                out,
                "### {}\n\n{}\n",
                self.display_name(&result.worker_id),
                result.result
            );
        }
        out
    }

    fn section(&self, out: &mut String, title: &str, result: &SubtaskResult) {
        let _ = writeln!(
            out,
            "## {} - {}\n\n{}\n",
            title,
            self.display_name(&result.worker_id),
            result.result
        );
    }

    fn footer(&self, results: &[SubtaskResult]) -> String {
        let total_time: Duration = results.iter().map(|r| r.processing_time).sum();
        let total_tokens: usize = results.iter().map(|r| r.tokens).sum();
        format!(
            "---\nContributors: {}\nProcessing time: {} ms\nTokens used: {}\n",
            self.participant_names(results).join(", "),
            total_time.as_millis(),
            total_tokens
        )
    }

    /// Unique display names in first-appearance order.
    fn participant_names<'a>(&'a self, results: &'a [SubtaskResult]) -> Vec<&'a str> {
        let mut names: Vec<&str> = Vec::new();
        for result in results {
            let name = self.display_name(&result.worker_id);
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// One-line description of who did the work.
    pub fn collaboration_summary(&self, results: &[SubtaskResult]) -> String {
        let names = self.participant_names(results);
        match names.as_slice() {
            [] => "No collaboration recorded".to_string(),
            [single] if results.len() == 1 => format!("Completed independently by {}", single),
            _ => format!("Completed collaboratively by {}", names.join(", ")),
        }
    }
}

fn bullets(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "## {}\n", title);
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
    out.push('\n');
}

/// Stable sort by the priority of each result's subtask; unknown subtasks go last.
pub fn sort_by_priority<'a>(
    results: &'a [SubtaskResult],
    breakdown: &TaskBreakdown,
) -> Vec<&'a SubtaskResult> {
    let mut sorted: Vec<&SubtaskResult> = results.iter().collect();
    sorted.sort_by_key(|r| {
        breakdown
            .subtask(&r.subtask_id)
            .map(|s| s.priority)
            .unwrap_or(UNKNOWN_PRIORITY)
    });
    sorted
}
