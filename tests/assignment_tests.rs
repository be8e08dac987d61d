use expertmesh::assignment::{
    AssignmentStrategy, Complexity, CoordinationAnalysis, TaskAssigner, TaskAssignment,
};
use expertmesh::config::AssignmentConfig;
use expertmesh::coordinator::parse_analysis;
use expertmesh::error::AssignmentError;

fn assigner() -> TaskAssigner {
    TaskAssigner::new(AssignmentConfig::default())
}

#[test]
fn test_short_question_without_analyzer_goes_to_default_worker() {
    let breakdown = assigner().assign("What is X?", None).unwrap();

    assert_eq!(breakdown.strategy, AssignmentStrategy::LocalFallback);
    assert_eq!(breakdown.subtasks.len(), 1);
    assert_eq!(breakdown.subtasks[0].assigned_worker, "analyst");
    assert_eq!(breakdown.subtasks[0].priority, 1);
    assert_eq!(breakdown.request, "What is X?");
}

#[test]
fn test_analyzer_assignments_are_used_in_order() {
    let analysis = CoordinationAnalysis {
        complexity: Complexity::Complex,
        task_assignments: vec![
            TaskAssignment {
                description: "explain the chemistry".into(),
                worker: "A".into(),
                reasoning: "theory".into(),
            },
            TaskAssignment {
                description: "give a feeding schedule".into(),
                worker: "B".into(),
                reasoning: "practice".into(),
            },
        ],
        ..Default::default()
    };

    let breakdown = assigner().assign("sourdough", Some(&analysis)).unwrap();

    assert_eq!(breakdown.strategy, AssignmentStrategy::AiProvided);
    let plan: Vec<(&str, u32)> = breakdown
        .subtasks
        .iter()
        .map(|s| (s.assigned_worker.as_str(), s.priority))
        .collect();
    assert_eq!(plan, vec![("A", 1), ("B", 2)]);
    assert!(breakdown.validate().is_ok());
}

#[test]
fn test_malformed_analyzer_output_falls_back_locally() {
    let parsed = parse_analysis("Sorry, I cannot help with that.", &[]);
    assert!(parsed.is_err());

    let breakdown = assigner().assign("Hi", parsed.ok().as_ref()).unwrap();
    assert_eq!(breakdown.strategy, AssignmentStrategy::LocalFallback);
    assert_eq!(breakdown.subtasks.len(), 1);
}

#[test]
fn test_parsed_analysis_feeds_assignment() {
    let text = r#"{"complexity":"complex","taskAssignments":[
        {"description":"why it rises","assignedAgent":"analyst","reasoning":"science"},
        {"description":"daily routine","assignedAgent":"advisor","reasoning":"habits"}]}"#;
    let known = vec!["analyst".to_string(), "advisor".to_string()];
    let analysis = parse_analysis(text, &known).unwrap();

    let breakdown = assigner().assign("sourdough", Some(&analysis)).unwrap();
    assert_eq!(breakdown.workers(), vec!["analyst", "advisor"]);
    assert!(breakdown.analysis.unwrap().contains("complex"));
}

#[test]
fn test_long_request_splits_between_roster_workers() {
    let breakdown = assigner()
        .assign("Why does my bread collapse in the oven?", None)
        .unwrap();
    assert_eq!(breakdown.subtasks.len(), 2);
    assert_eq!(breakdown.by_priority()[0].assigned_worker, "analyst");
    assert_eq!(breakdown.by_priority()[1].assigned_worker, "advisor");
}

#[test]
fn test_custom_roster_ids() {
    let config = AssignmentConfig {
        technical_worker: "scientist".into(),
        practical_worker: "coach".into(),
        default_worker: "coach".into(),
        ..Default::default()
    };
    let assigner = TaskAssigner::new(config);

    assert_eq!(
        assigner.assign("Hello", None).unwrap().subtasks[0].assigned_worker,
        "coach"
    );
    assert_eq!(
        assigner.assign("Bread. Why?", None).unwrap().workers(),
        vec!["scientist", "coach"]
    );
}

#[test]
fn test_blank_request_is_rejected() {
    assert_eq!(
        assigner().assign("", None).unwrap_err(),
        AssignmentError::EmptyRequest
    );
}
