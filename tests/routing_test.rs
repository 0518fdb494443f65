//! Boundary and scenario tests against the pure routing function,
//! exercised from outside the crate the way a consumer embedding this crate
//! into an HTTP layer would.

use std::collections::BTreeSet;

use interview_core::config::InterviewConfig;
use interview_core::interview::routing::route;
use interview_core::interview::{Action, InterviewDifficulty, InterviewState, Scores, Stage};

fn base_state() -> InterviewState {
    InterviewState {
        thread_id: "t1".into(),
        difficulty: InterviewDifficulty::Normal,
        remaining_time_s: 500,
        stage: Stage::Main,
        conversation_history: vec![],
        current_context: vec![],
        current_sub_topic: "리더십".into(),
        asked_sub_topics: BTreeSet::new(),
        answer_metadata: vec![],
        scores: Scores::default(),
        next_action: None,
        follow_up_count: 0,
    }
}

#[test]
fn low_score_triggers_follow_up_before_follow_up_cap() {
    let config = InterviewConfig::default();
    let state = base_state();
    assert_eq!(route(&state, 40, &config), Action::FollowUp);
}

#[test]
fn follow_up_cap_forces_new_topic_even_on_low_score() {
    let config = InterviewConfig::default();
    let mut state = base_state();
    state.follow_up_count = config.interview_max_follow_ups;
    assert_eq!(route(&state, 40, &config), Action::NewTopic);
}

#[test]
fn high_score_moves_to_new_topic() {
    let config = InterviewConfig::default();
    let state = base_state();
    assert_eq!(route(&state, 90, &config), Action::NewTopic);
}

#[test]
fn low_remaining_time_wraps_up_regardless_of_score() {
    let config = InterviewConfig::default();
    let mut state = base_state();
    state.remaining_time_s = config.interview_wrap_up_threshold_s - 1;
    assert_eq!(route(&state, 95, &config), Action::WrapUp);
}

#[test]
fn topic_cap_wraps_up_even_with_time_remaining() {
    let config = InterviewConfig::default();
    let mut state = base_state();
    state.asked_sub_topics = (0..config.interview_max_topics).map(|i| format!("주제{}", i)).collect();
    assert_eq!(route(&state, 90, &config), Action::WrapUp);
}

#[test]
fn wrap_up_takes_priority_over_follow_up_cap() {
    let config = InterviewConfig::default();
    let mut state = base_state();
    state.follow_up_count = config.interview_max_follow_ups;
    state.remaining_time_s = config.interview_wrap_up_threshold_s - 1;
    assert_eq!(route(&state, 40, &config), Action::WrapUp);
}

#[test]
fn score_exactly_at_follow_up_boundary_does_not_follow_up() {
    let config = InterviewConfig::default();
    let state = base_state();
    assert_eq!(route(&state, 60, &config), Action::NewTopic);
}
