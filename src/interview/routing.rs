/// Analyzer routing table. Evaluated in order; first match wins. Pure
/// function of `(state, latest_score, config)` — deterministic for fixed
/// inputs, so replaying a turn from a restored checkpoint always routes
/// the same way.

use crate::config::InterviewConfig;
use crate::interview::{Action, InterviewState};

pub fn route(state: &InterviewState, latest_score: u8, config: &InterviewConfig) -> Action {
    if state.remaining_time_s < config.interview_wrap_up_threshold_s {
        return Action::WrapUp;
    }
    if (latest_score as u32) < 60 && state.follow_up_count < config.interview_max_follow_ups {
        return Action::FollowUp;
    }
    if state.asked_sub_topics.len() >= config.interview_max_topics {
        return Action::WrapUp;
    }
    Action::NewTopic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::{Scores, Stage};
    use std::collections::BTreeSet;

    fn base_state() -> InterviewState {
        InterviewState {
            thread_id: "t1".into(),
            difficulty: crate::interview::InterviewDifficulty::Normal,
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
    fn low_time_forces_wrap_up_regardless_of_score() {
        let mut state = base_state();
        state.remaining_time_s = 29;
        let config = InterviewConfig::default();
        assert_eq!(route(&state, 95, &config), Action::WrapUp);
    }

    #[test]
    fn low_score_with_budget_follows_up() {
        let state = base_state();
        let config = InterviewConfig::default();
        assert_eq!(route(&state, 55, &config), Action::FollowUp);
    }

    #[test]
    fn exhausted_follow_up_budget_moves_to_new_topic_not_another_follow_up() {
        let mut state = base_state();
        state.follow_up_count = 3;
        let config = InterviewConfig::default();
        assert_eq!(route(&state, 55, &config), Action::NewTopic);
    }

    #[test]
    fn eight_topics_forces_wrap_up() {
        let mut state = base_state();
        state.asked_sub_topics = (0..8).map(|i| format!("topic-{}", i)).collect::<BTreeSet<_>>();
        let config = InterviewConfig::default();
        assert_eq!(route(&state, 90, &config), Action::WrapUp);
    }

    #[test]
    fn good_score_with_room_moves_to_new_topic() {
        let mut state = base_state();
        state.asked_sub_topics = (0..7).map(|i| format!("topic-{}", i)).collect::<BTreeSet<_>>();
        let config = InterviewConfig::default();
        assert_eq!(route(&state, 90, &config), Action::NewTopic);
    }
}
