//! AI-assisted coordinator.
//!
//! The [`Coordinator`] asks a completion client two things: how to split a request across the
//! roster ([`Coordinator::analyze`]) and how to fold the workers' answers into one summary
//! ([`Coordinator::summarize`]). Both replies are free text from a model, so parsing is
//! best-effort and explicit:
//!
//! - [`parse_analysis`] returns `Result<CoordinationAnalysis, AnalysisParseError>`; callers map
//!   `Err` to the local assignment fallback.
//! - [`parse_summary`] never fails; missing sections are filled from the raw results.

use crate::expertmesh::assignment::{
    Complexity, CoordinationAnalysis, Specialization, TaskAssignment,
};
use crate::expertmesh::client_wrapper::{with_system_prompt, ClientWrapper, Message};
use crate::expertmesh::error::{AnalysisError, AnalysisParseError, CompletionError};
use crate::expertmesh::message::preview;
use crate::expertmesh::orchestrator::SubtaskResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Structured summary of a collaboration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub request: String,
    pub key_insights: Vec<String>,
    pub actionable_advice: Vec<String>,
    pub conclusion: String,
    pub next_steps: Option<Vec<String>>,
}

/// A roster line shown to the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: String,
    pub description: String,
}

pub struct Coordinator {
    pub name: String,
    client: Arc<dyn ClientWrapper>,
}

impl Coordinator {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            name: "Coordinator".to_string(),
            client,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn persona(&self) -> String {
        format!(
            "You are {}, the coordinator of a team of expert assistants. You judge how complex a \
             question is, decide who on the team should handle which part, and merge the team's \
             answers into one final response.",
            self.name
        )
    }

    fn analysis_prompt(&self, request: &str, roster: &[RosterEntry]) -> String {
        let team: Vec<String> = roster
            .iter()
            .map(|entry| format!("- {}: {}", entry.id, entry.description))
            .collect();
        let ids: Vec<&str> = roster.iter().map(|entry| entry.id.as_str()).collect();

        format!(
            r#"{persona}

Team members:
{team}

Analyze the user question: "{request}"

Answer strictly with the following JSON and nothing else:
{{
  "complexity": "simple|moderate|complex",
  "requiredSpecializations": ["technical analysis", "practical advice"],
  "suggestedApproach": "how the team should collaborate",
  "taskAssignments": [
    {{
      "description": "concrete subtask",
      "assignedAgent": "{ids}",
      "reasoning": "why this member"
    }}
  ],
  "coordinatorReasoning": "overall analysis and decision rationale"
}}

Guidelines:
1. simple: a single concept or basic question one expert can answer; moderate: needs some depth
   or touches several aspects; complex: needs several experts working together.
2. Give simple questions to the single best-suited member. Split complex questions into
   subtasks for different members.
3. Every subtask needs exactly one responsible member and a concrete reason."#,
            persona = self.persona(),
            team = team.join("\n"),
            request = request,
            ids = ids.join("|"),
        )
    }

    /// Ask the model for a [`CoordinationAnalysis`] of `request`.
    ///
    /// Assignments naming a worker outside `roster` are discarded (an empty roster accepts any
    /// worker id).
    pub async fn analyze(
        &self,
        request: &str,
        history: &[Message],
        roster: &[RosterEntry],
    ) -> Result<CoordinationAnalysis, AnalysisError> {
        let mut transcript = history.to_vec();
        transcript.push(Message::user(request));
        let messages = with_system_prompt(&self.analysis_prompt(request, roster), transcript);

        let completion = self.client.send_message(&messages).await?;
        let known: Vec<String> = roster.iter().map(|entry| entry.id.clone()).collect();
        let analysis = parse_analysis(&completion.content, &known).map_err(|err| {
            log::warn!(
                "{} returned an unusable analysis ({}): {}",
                self.name,
                err,
                preview(&completion.content, 200)
            );
            err
        })?;

        log::info!(
            "{} analysis complete: complexity {}, {} assignment(s)",
            self.name,
            analysis.complexity,
            analysis.task_assignments.len()
        );
        Ok(analysis)
    }

    fn summary_prompt(&self, request: &str, results: &[SubtaskResult]) -> String {
        let answers: Vec<String> = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. Answer from {}:\n{}", i + 1, r.worker_id, r.result))
            .collect();

        format!(
            "{persona}\n\n\
             Merge the experts' answers into one high-quality final summary.\n\n\
             Original question: {request}\n\n\
             Expert answers:\n{answers}\n\n\
             Write the summary with these sections, each under its own heading line:\n\
             Key insights: the core points drawn from the answers\n\
             Actionable advice: the merged practical recommendations\n\
             Conclusion: a complete answer to the original question\n\
             Next steps: further suggestions, if any\n\n\
             Blend the perspectives without repeating them, keep the structure clear and put \
             the most valuable information first.",
            persona = self.persona(),
            request = request,
            answers = answers.join("\n\n"),
        )
    }

    /// Ask the model to merge `results` into a [`FinalSummary`].
    ///
    /// Only a completion failure is an error; a reply without recognizable sections still yields
    /// a summary via [`parse_summary`].
    pub async fn summarize(
        &self,
        request: &str,
        results: &[SubtaskResult],
        history: &[Message],
    ) -> Result<FinalSummary, CompletionError> {
        let mut transcript = history.to_vec();
        transcript.push(Message::user(format!(
            "Summarize the experts' answers to \"{}\"",
            request
        )));
        let messages = with_system_prompt(&self.summary_prompt(request, results), transcript);

        let completion = self.client.send_message(&messages).await?;
        Ok(parse_summary(request, &completion.content, results))
    }
}

/// Slice from the first `{` to the last `}`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn default_approach(complexity: Complexity) -> &'static str {
    match complexity {
        Complexity::Simple => "Single expert: route to the best-matching member",
        Complexity::Complex => {
            "Multi-expert collaboration: cover both theoretical analysis and practical advice"
        }
        Complexity::Moderate => "Flexible collaboration based on the question's characteristics",
    }
}

/// Parse an analyzer reply.
///
/// The reply must contain a JSON object with `complexity` and a `taskAssignments` array.
/// Assignments without a description or worker, or naming a worker outside `known_workers`
/// when that list is non-empty, are dropped; the survivors also become `task_breakdown`.
pub fn parse_analysis(
    text: &str,
    known_workers: &[String],
) -> Result<CoordinationAnalysis, AnalysisParseError> {
    let json = extract_json_object(text).ok_or(AnalysisParseError::NoJsonObject)?;
    let parsed: Value = serde_json::from_str(json)
        .map_err(|err| AnalysisParseError::InvalidJson(err.to_string()))?;

    let complexity = parsed
        .get("complexity")
        .and_then(Value::as_str)
        .map(Complexity::from_label)
        .ok_or(AnalysisParseError::MissingField("complexity"))?;

    let raw_assignments = parsed
        .get("taskAssignments")
        .and_then(Value::as_array)
        .ok_or(AnalysisParseError::MissingField("taskAssignments"))?;

    let task_assignments: Vec<TaskAssignment> = raw_assignments
        .iter()
        .filter_map(|raw| {
            let description = string_field(raw, &["description"])?;
            let worker = string_field(raw, &["assignedAgent", "assignedWorker", "worker"])?;
            if !known_workers.is_empty() && !known_workers.contains(&worker) {
                log::warn!("dropping assignment for unknown worker {}", worker);
                return None;
            }
            Some(TaskAssignment {
                description,
                worker,
                reasoning: string_field(raw, &["reasoning"]).unwrap_or_default(),
            })
        })
        .collect();

    let required_specializations = match parsed.get("requiredSpecializations").and_then(Value::as_array) {
        Some(specs) => specs
            .iter()
            .filter_map(Value::as_str)
            .map(Specialization::from)
            .collect(),
        None => vec![Specialization::TechnicalAnalysis],
    };

    Ok(CoordinationAnalysis {
        complexity,
        required_specializations,
        suggested_approach: string_field(&parsed, &["suggestedApproach"])
            .unwrap_or_else(|| default_approach(complexity).to_string()),
        task_breakdown: task_assignments
            .iter()
            .map(|a| a.description.clone())
            .collect(),
        task_assignments,
        reasoning: string_field(&parsed, &["coordinatorReasoning", "reasoning"])
            .unwrap_or_else(|| "Collaboration strategy from AI analysis".to_string()),
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Insights,
    Advice,
    Conclusion,
    Next,
}

/// Recognize a heading line. Headings are short and may carry markdown, numbering or a colon.
fn heading(line: &str) -> Option<Section> {
    let stripped = line
        .trim()
        .trim_start_matches(|c: char| c == '#' || c == '*' || c.is_ascii_digit() || c == '.')
        .trim()
        .trim_end_matches(|c: char| c == ':' || c == '*' || c == '：')
        .to_lowercase();
    if stripped.chars().count() > 40 {
        return None;
    }
    if stripped.contains("key insight") || stripped.contains("core point") {
        Some(Section::Insights)
    } else if stripped.contains("actionable advice")
        || stripped.contains("practical advice")
        || stripped.contains("recommendation")
    {
        Some(Section::Advice)
    } else if stripped.contains("conclusion") {
        Some(Section::Conclusion)
    } else if stripped.contains("next step") {
        Some(Section::Next)
    } else {
        None
    }
}

fn strip_bullet(line: &str) -> String {
    let trimmed = line.trim();
    let without = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "))
        .unwrap_or(trimmed);
    without.trim().to_string()
}

/// Per-worker previews used when the summary names no insights.
pub fn extract_key_insights(results: &[SubtaskResult]) -> Vec<String> {
    results
        .iter()
        .map(|r| format!("Core view from {}: {}", r.worker_id, preview(&r.result, 100)))
        .collect()
}

/// Split a summary reply into sections by heading lines.
pub fn parse_summary(request: &str, text: &str, results: &[SubtaskResult]) -> FinalSummary {
    let mut insights = Vec::new();
    let mut advice = Vec::new();
    let mut conclusion: Vec<String> = Vec::new();
    let mut next_steps = Vec::new();
    let mut section = Section::None;

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if let Some(found) = heading(line) {
            section = found;
            continue;
        }
        let item = strip_bullet(line);
        match section {
            Section::Insights => insights.push(item),
            Section::Advice => advice.push(item),
            Section::Conclusion => conclusion.push(item),
            Section::Next => next_steps.push(item),
            Section::None => {}
        }
    }

    if insights.is_empty() {
        insights = extract_key_insights(results);
    }
    let conclusion = if conclusion.is_empty() {
        preview(text.trim(), 200)
    } else {
        conclusion.join(" ")
    };

    FinalSummary {
        request: request.to_string(),
        key_insights: insights,
        actionable_advice: advice,
        conclusion,
        next_steps: if next_steps.is_empty() {
            None
        } else {
            Some(next_steps)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expertmesh::clients::mock::MockClient;
    use std::time::Duration;

    fn result(worker: &str, text: &str) -> SubtaskResult {
        SubtaskResult {
            subtask_id: format!("{}-1", worker),
            worker_id: worker.to_string(),
            result: text.to_string(),
            tokens: 10,
            processing_time: Duration::from_millis(5),
        }
    }

    const ANALYSIS: &str = r#"Sure! Here is my plan:
{
  "complexity": "complex",
  "requiredSpecializations": ["technical analysis", "practical advice"],
  "suggestedApproach": "split it",
  "taskAssignments": [
    {"description": "explain fermentation", "assignedAgent": "analyst", "reasoning": "theory"},
    {"description": "", "assignedAgent": "advisor"},
    {"description": "feeding schedule", "assignedAgent": "advisor", "reasoning": "practice"},
    {"description": "poetry", "assignedAgent": "poet"}
  ],
  "coordinatorReasoning": "two angles"
}
Hope that helps."#;

    #[test]
    fn test_parse_analysis_extracts_embedded_json() {
        let known = vec!["analyst".to_string(), "advisor".to_string()];
        let analysis = parse_analysis(ANALYSIS, &known).unwrap();
        assert_eq!(analysis.complexity, Complexity::Complex);
        assert_eq!(analysis.task_assignments.len(), 2);
        assert_eq!(analysis.task_assignments[1].worker, "advisor");
        assert_eq!(
            analysis.task_breakdown,
            vec!["explain fermentation", "feeding schedule"]
        );
        assert_eq!(analysis.reasoning, "two angles");
        assert_eq!(
            analysis.required_specializations,
            vec![
                Specialization::TechnicalAnalysis,
                Specialization::PracticalAdvice
            ]
        );
    }

    #[test]
    fn test_parse_analysis_errors() {
        assert_eq!(
            parse_analysis("no json here", &[]),
            Err(AnalysisParseError::NoJsonObject)
        );
        assert!(matches!(
            parse_analysis("{ not json }", &[]),
            Err(AnalysisParseError::InvalidJson(_))
        ));
        assert_eq!(
            parse_analysis(r#"{"complexity": "simple"}"#, &[]),
            Err(AnalysisParseError::MissingField("taskAssignments"))
        );
        assert_eq!(
            parse_analysis(r#"{"taskAssignments": []}"#, &[]),
            Err(AnalysisParseError::MissingField("complexity"))
        );
    }

    #[test]
    fn test_unknown_complexity_normalizes_to_moderate() {
        let analysis =
            parse_analysis(r#"{"complexity": "huge", "taskAssignments": []}"#, &[]).unwrap();
        assert_eq!(analysis.complexity, Complexity::Moderate);
        assert_eq!(
            analysis.required_specializations,
            vec![Specialization::TechnicalAnalysis]
        );
    }

    #[test]
    fn test_parse_summary_sections() {
        let text = "## Key Insights\n- Yeast makes gas\n- Time matters\n\n\
                    ## Actionable Advice\n1) Feed daily\n\n\
                    ## Conclusion\nBread rises because of CO2.\nPatience helps.\n\n\
                    ## Next Steps\n- Try a loaf";
        let summary = parse_summary("why bread rises", text, &[]);
        assert_eq!(summary.key_insights, vec!["Yeast makes gas", "Time matters"]);
        assert_eq!(summary.actionable_advice, vec!["1) Feed daily"]);
        assert_eq!(summary.conclusion, "Bread rises because of CO2. Patience helps.");
        assert_eq!(summary.next_steps, Some(vec!["Try a loaf".to_string()]));
    }

    #[test]
    fn test_parse_summary_fallbacks() {
        let results = vec![result("analyst", "Fermentation produces carbon dioxide.")];
        let summary = parse_summary("q", "Just a paragraph with no headings.", &results);
        assert_eq!(summary.key_insights.len(), 1);
        assert!(summary.key_insights[0].starts_with("Core view from analyst"));
        assert_eq!(summary.conclusion, "Just a paragraph with no headings.");
        assert!(summary.next_steps.is_none());
    }

    #[tokio::test]
    async fn test_analyze_with_scripted_client() {
        let client = Arc::new(MockClient::new().with_responses(vec![ANALYSIS]));
        let coordinator = Coordinator::new(client.clone());
        let roster = vec![
            RosterEntry {
                id: "analyst".into(),
                description: "theory".into(),
            },
            RosterEntry {
                id: "advisor".into(),
                description: "practice".into(),
            },
        ];
        let analysis = coordinator
            .analyze("how does sourdough work?", &[], &roster)
            .await
            .unwrap();
        assert_eq!(analysis.task_assignments.len(), 2);

        let prompt = &client.requests()[0][0].content;
        assert!(prompt.contains("- analyst: theory"));
        assert!(prompt.contains("\"assignedAgent\": \"analyst|advisor\""));
    }

    #[tokio::test]
    async fn test_analyze_surfaces_parse_failure() {
        let client = Arc::new(MockClient::new().with_responses(vec!["I am not sure."]));
        let coordinator = Coordinator::new(client);
        let err = coordinator.analyze("q", &[], &[]).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Parse(AnalysisParseError::NoJsonObject)
        ));
    }
}
