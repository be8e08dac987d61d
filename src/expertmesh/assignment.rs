//! Task assignment: turning a request into an ordered, validated [`TaskBreakdown`].
//!
//! Three strategies sit behind [`TaskAssigner::assign`], chosen by what the analyzer supplied:
//!
//! | Analyzer output | Strategy | Result |
//! |---|---|---|
//! | structured `task_assignments` | [`AssignmentStrategy::AiProvided`] | used verbatim, priorities by order |
//! | textual `task_breakdown` only | [`AssignmentStrategy::KeywordScored`] | each fragment scored against keyword buckets |
//! | nothing usable / no analyzer | [`AssignmentStrategy::LocalFallback`] | local complexity classifier |
//!
//! The keyword weight, win margin and length threshold come from [`AssignmentConfig`]; they
//! are tunable heuristics, nothing downstream depends on their exact values.
//!
//! ```rust
//! use expertmesh::assignment::{AssignmentStrategy, TaskAssigner};
//! use expertmesh::config::AssignmentConfig;
//!
//! let assigner = TaskAssigner::new(AssignmentConfig::default());
//! let breakdown = assigner.assign("What is X?", None).unwrap();
//! assert_eq!(breakdown.strategy, AssignmentStrategy::LocalFallback);
//! assert_eq!(breakdown.subtasks.len(), 1);
//! assert_eq!(breakdown.subtasks[0].assigned_worker, "analyst");
//! ```

use crate::expertmesh::config::AssignmentConfig;
use crate::expertmesh::error::AssignmentError;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Analyzer's verdict on how much collaboration a request needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl Complexity {
    /// `simple` and `complex` map to themselves; anything else is moderate.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "simple" => Complexity::Simple,
            "complex" => Complexity::Complex,
            _ => Complexity::Moderate,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        };
        f.write_str(label)
    }
}

/// Expertise an analyzer says a request needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Specialization {
    TechnicalAnalysis,
    PracticalAdvice,
    Other(String),
}

impl From<&str> for Specialization {
    fn from(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("technical") || lower.contains("analysis") || lower.contains("theor") {
            Specialization::TechnicalAnalysis
        } else if lower.contains("practical")
            || lower.contains("advice")
            || lower.contains("solution")
        {
            Specialization::PracticalAdvice
        } else {
            Specialization::Other(label.to_string())
        }
    }
}

impl From<String> for Specialization {
    fn from(label: String) -> Self {
        Specialization::from(label.as_str())
    }
}

impl From<Specialization> for String {
    fn from(spec: Specialization) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for Specialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Specialization::TechnicalAnalysis => f.write_str("technical analysis"),
            Specialization::PracticalAdvice => f.write_str("practical advice"),
            Specialization::Other(label) => f.write_str(label),
        }
    }
}

/// One analyzer-proposed assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub description: String,
    pub worker: String,
    #[serde(default)]
    pub reasoning: String,
}

/// Structured analysis of a request, usually produced by the
/// [`Coordinator`](crate::coordinator::Coordinator).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationAnalysis {
    pub complexity: Complexity,
    pub required_specializations: Vec<Specialization>,
    pub suggested_approach: String,
    /// Textual fragments, one per intended subtask.
    pub task_breakdown: Vec<String>,
    pub task_assignments: Vec<TaskAssignment>,
    pub reasoning: String,
}

impl CoordinationAnalysis {
    fn requires(&self, spec: &Specialization) -> bool {
        self.required_specializations.contains(spec)
    }

    /// Narrative attached to the breakdown.
    pub fn narrative(&self) -> String {
        let specs: Vec<String> = self
            .required_specializations
            .iter()
            .map(ToString::to_string)
            .collect();
        format!(
            "Coordinator analysis:\n\
             • Complexity: {}\n\
             • Required specializations: {}\n\
             • Suggested approach: {}\n\
             • Reasoning: {}",
            self.complexity,
            specs.join(", "),
            self.suggested_approach,
            self.reasoning
        )
    }
}

/// Which path produced a breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStrategy {
    AiProvided,
    KeywordScored,
    LocalFallback,
}

impl fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssignmentStrategy::AiProvided => "AiProvided",
            AssignmentStrategy::KeywordScored => "KeywordScored",
            AssignmentStrategy::LocalFallback => "LocalFallback",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    pub assigned_worker: String,
    /// Positive; lower runs earlier.
    pub priority: u32,
    pub completed: bool,
    pub result: Option<String>,
    pub reasoning: String,
}

impl Subtask {
    pub fn new(
        description: impl Into<String>,
        assigned_worker: impl Into<String>,
        priority: u32,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            assigned_worker: assigned_worker.into(),
            priority,
            completed: false,
            result: None,
            reasoning: reasoning.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBreakdown {
    pub task_id: String,
    pub request: String,
    pub subtasks: Vec<Subtask>,
    pub created_at: DateTime<Utc>,
    pub analysis: Option<String>,
    pub strategy: AssignmentStrategy,
}

impl TaskBreakdown {
    /// At least one subtask, each with a non-empty id, description and worker and a positive
    /// priority.
    pub fn validate(&self) -> Result<(), AssignmentError> {
        if self.request.trim().is_empty() {
            return Err(AssignmentError::EmptyRequest);
        }
        if self.subtasks.is_empty() {
            return Err(AssignmentError::NoSubtasks);
        }
        for (index, subtask) in self.subtasks.iter().enumerate() {
            let reason = if subtask.id.trim().is_empty() {
                Some("empty id")
            } else if subtask.description.trim().is_empty() {
                Some("empty description")
            } else if subtask.assigned_worker.trim().is_empty() {
                Some("no assigned worker")
            } else if subtask.priority == 0 {
                Some("priority must be positive")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(AssignmentError::InvalidSubtask {
                    index,
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn subtask(&self, id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    /// Subtasks ordered by priority; ties keep breakdown order.
    pub fn by_priority(&self) -> Vec<&Subtask> {
        let mut ordered: Vec<&Subtask> = self.subtasks.iter().collect();
        ordered.sort_by_key(|s| s.priority);
        ordered
    }

    /// Distinct workers in priority order.
    pub fn workers(&self) -> Vec<String> {
        let mut workers: Vec<String> = Vec::new();
        for subtask in self.by_priority() {
            if !workers.contains(&subtask.assigned_worker) {
                workers.push(subtask.assigned_worker.clone());
            }
        }
        workers
    }
}

// Strong keywords for scoring analyzer fragments.
const STRONG_TECHNICAL: &[&str] = &[
    "principle", "mechanism", "theory", "theoret", "science", "scientific", "analy", "concept",
    "technical", "technolog", "algorithm", "system",
];
const STRONG_PRACTICAL: &[&str] = &[
    "how to", "advice", "advise", "suggest", "method", "step", "practical", "specific",
    "concrete", "hands-on", "guid", "solution",
];

// Any of these marks a request as complex for the local classifier.
const COMPLEX_INDICATORS: &[&str] = &[
    "compare", "comparison", "difference", "versus", "pros and cons", "advantage", "disadvantage",
    "analy", "evaluat", "what should", "how to", "how can", "how do", "why", "cause", "reason",
    "impact", "effect", "meaning", "method", "step", "process", "solve", "problem", "suggest",
    "recommend", "choose", "choice",
];

// Symmetric vote for simple requests.
const SIMPLE_TECHNICAL: &[&str] = &[
    "technical", "technolog", "principle", "concept", "definition", "define", "theory", "science",
    "engineering", "algorithm", "data", "programming", "code", "system", "architecture",
    "design", "analysis",
];
const SIMPLE_PRACTICAL: &[&str] = &[
    "advice", "recommend", "choose", "usage", "operat", "life", "health", "emotion",
    "relationship", "work", "study", "learn", "habit", "tip", "trick", "method", "practice",
];

const CLAUSE_SEPARATORS: &[char] = &[
    '.', ',', ';', '?', '!', '，', '。', '；', '？', '！',
];

/// Lowercased text plus its word tokens, for keyword lookups.
struct Normalized {
    lower: String,
    tokens: Vec<String>,
}

impl Normalized {
    fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let tokens = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self { lower, tokens }
    }

    /// Multi-word keywords match as substrings; single words match as a token prefix so a
    /// stem like `analy` covers `analysis` and `analyze`.
    fn has(&self, keyword: &str) -> bool {
        if keyword.contains(' ') || keyword.contains('-') {
            self.lower.contains(keyword)
        } else {
            self.tokens.iter().any(|t| t.starts_with(keyword))
        }
    }

    fn hits(&self, keywords: &[&str]) -> u32 {
        keywords.iter().filter(|k| self.has(k)).count() as u32
    }
}

/// Builds validated breakdowns from a request and an optional analysis.
#[derive(Debug, Clone, Default)]
pub struct TaskAssigner {
    config: AssignmentConfig,
}

impl TaskAssigner {
    pub fn new(config: AssignmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    /// Produce a validated breakdown for `request`.
    ///
    /// With no analysis (analyzer unavailable, failed, or returned something unparseable) the
    /// local classifier decides everything.
    pub fn assign(
        &self,
        request: &str,
        analysis: Option<&CoordinationAnalysis>,
    ) -> Result<TaskBreakdown, AssignmentError> {
        if request.trim().is_empty() {
            return Err(AssignmentError::EmptyRequest);
        }

        let (strategy, subtasks, narrative) = match analysis {
            Some(analysis) if !analysis.task_assignments.is_empty() => (
                AssignmentStrategy::AiProvided,
                self.from_assignments(analysis),
                Some(analysis.narrative()),
            ),
            Some(analysis) if !analysis.task_breakdown.is_empty() => (
                AssignmentStrategy::KeywordScored,
                self.from_breakdown(analysis),
                Some(analysis.narrative()),
            ),
            Some(analysis) => (
                AssignmentStrategy::LocalFallback,
                self.local_fallback(request, Some(analysis)),
                Some(analysis.narrative()),
            ),
            None => (
                AssignmentStrategy::LocalFallback,
                self.local_fallback(request, None),
                Some("Fallback analysis: keyword heuristics".to_string()),
            ),
        };

        let breakdown = TaskBreakdown {
            task_id: Uuid::new_v4().to_string(),
            request: request.to_string(),
            subtasks,
            created_at: Utc::now(),
            analysis: narrative,
            strategy,
        };
        breakdown.validate()?;

        log::info!(
            "task {} planned via {}: {} subtask(s) for {:?}",
            breakdown.task_id,
            breakdown.strategy,
            breakdown.subtasks.len(),
            breakdown.workers()
        );
        Ok(breakdown)
    }

    fn from_assignments(&self, analysis: &CoordinationAnalysis) -> Vec<Subtask> {
        analysis
            .task_assignments
            .iter()
            .enumerate()
            .map(|(index, assignment)| {
                Subtask::new(
                    assignment.description.clone(),
                    assignment.worker.clone(),
                    index as u32 + 1,
                    format!("Coordinator decision: {}", assignment.reasoning),
                )
            })
            .collect()
    }

    fn from_breakdown(&self, analysis: &CoordinationAnalysis) -> Vec<Subtask> {
        analysis
            .task_breakdown
            .iter()
            .enumerate()
            .map(|(index, fragment)| {
                let worker = self.score_fragment(fragment, analysis);
                let reasoning = format!("Keyword scoring matched this fragment to {}", worker);
                Subtask::new(fragment.clone(), worker, index as u32 + 1, reasoning)
            })
            .collect()
    }

    /// Pick a worker for one analyzer fragment.
    ///
    /// A bucket wins outright only when it beats the other by more than the configured margin;
    /// otherwise the analyzer's declared specializations decide, then the default worker.
    pub fn score_fragment(&self, fragment: &str, analysis: &CoordinationAnalysis) -> String {
        let text = Normalized::new(fragment);
        let weight = self.config.keyword_weight;
        let technical = text.hits(STRONG_TECHNICAL) * weight;
        let practical = text.hits(STRONG_PRACTICAL) * weight;
        let margin = self.config.keyword_margin;

        if technical > practical + margin {
            return self.config.technical_worker.clone();
        }
        if practical > technical + margin {
            return self.config.practical_worker.clone();
        }
        self.by_specializations(analysis)
            .unwrap_or_else(|| self.config.default_worker.clone())
    }

    fn by_specializations(&self, analysis: &CoordinationAnalysis) -> Option<String> {
        let technical = analysis.requires(&Specialization::TechnicalAnalysis);
        let practical = analysis.requires(&Specialization::PracticalAdvice);
        match (technical, practical) {
            (true, false) => Some(self.config.technical_worker.clone()),
            (false, true) => Some(self.config.practical_worker.clone()),
            _ => None,
        }
    }

    /// Local classifier: complex if an indicator word appears, the text has more than one
    /// non-empty clause, or it is longer than the configured threshold.
    pub fn is_complex(&self, request: &str) -> bool {
        let text = Normalized::new(request);
        let has_indicator = COMPLEX_INDICATORS.iter().any(|k| text.has(k));
        let clauses = request
            .split(CLAUSE_SEPARATORS)
            .filter(|segment| !segment.trim().is_empty())
            .count();
        let is_long = request.trim().chars().count() > self.config.complexity_length_threshold;
        has_indicator || clauses > 1 || is_long
    }

    /// Symmetric keyword vote for a simple request. No hits at all goes to the default worker;
    /// a tie with hits is a coin flip.
    pub fn select_worker_for_simple(&self, request: &str) -> String {
        let text = Normalized::new(request);
        let technical = text.hits(SIMPLE_TECHNICAL);
        let practical = text.hits(SIMPLE_PRACTICAL);

        if technical == practical {
            if technical == 0 {
                return self.config.default_worker.clone();
            }
            return if rand::rng().random_bool(0.5) {
                self.config.technical_worker.clone()
            } else {
                self.config.practical_worker.clone()
            };
        }
        if technical > practical {
            self.config.technical_worker.clone()
        } else {
            self.config.practical_worker.clone()
        }
    }

    fn local_fallback(&self, request: &str, hint: Option<&CoordinationAnalysis>) -> Vec<Subtask> {
        let complex = match hint.map(|a| a.complexity) {
            Some(Complexity::Simple) => false,
            Some(Complexity::Complex) => true,
            _ => self.is_complex(request),
        };

        if complex {
            return vec![
                Subtask::new(
                    format!(
                        "Analyze the core points and key concepts of the question: {}",
                        request
                    ),
                    self.config.technical_worker.clone(),
                    1,
                    "Complex request: technical analysis and theory",
                ),
                Subtask::new(
                    format!(
                        "Provide a detailed answer with practical advice: {}",
                        request
                    ),
                    self.config.practical_worker.clone(),
                    2,
                    "Complex request: practical advice and concrete solutions",
                ),
            ];
        }

        let worker = hint
            .and_then(|analysis| self.by_specializations(analysis))
            .unwrap_or_else(|| self.select_worker_for_simple(request));
        let reasoning = format!("Simple request handled by {}", worker);
        vec![Subtask::new(request, worker, 1, reasoning)]
    }
}
