/// Interview Orchestrator: per-thread state machine.
///
/// Each node is a pure `State -> State` transition rather than a dispatch
/// over string names: `InterviewState` is treated as an immutable record,
/// and every node takes `&InterviewState` and returns an owned,
/// independent `InterviewState` rather than mutating shared state in
/// place. Closed enums (`Action`, `Stage`, `Role`) stand in for what would
/// otherwise be stringly-typed routing.

pub mod checkpoint;
pub mod nodes;
pub mod orchestrator;
pub mod routing;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterviewDifficulty {
    Easy,
    Normal,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Intro,
    Main,
    #[serde(rename = "WRAP_UP")]
    WrapUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Interviewer,
    Candidate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// Closed tagged variant over the analyzer's routing decision: a total
/// match over this enum replaces dispatch by string node name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    FollowUp,
    NewTopic,
    WrapUp,
}

/// The four fixed evaluation axes. Unit-variant enums serialize to their
/// Korean label under serde_json, so `Scores` below round-trips through
/// the same field names an external client expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    #[serde(rename = "전공적합성")]
    MajorFit,
    #[serde(rename = "인성")]
    Character,
    #[serde(rename = "발전가능성")]
    GrowthPotential,
    #[serde(rename = "의사소통")]
    Communication,
}

/// Maps a sub-topic name to the evaluation axis it feeds. Sub-topics
/// outside this mapping are ignored when scoring.
pub fn topic_score_mapping(sub_topic: &str) -> Option<Axis> {
    match sub_topic {
        "성적" | "동아리" => Some(Axis::MajorFit),
        "리더십" | "인성/태도" | "봉사" => Some(Axis::Character),
        "진로/자율" | "독서" => Some(Axis::GrowthPotential),
        "출결" => Some(Axis::Communication),
        _ => None,
    }
}

/// Cumulative per-axis scores. Never decreases within a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scores {
    #[serde(rename = "전공적합성")]
    pub major_fit: i64,
    #[serde(rename = "인성")]
    pub character: i64,
    #[serde(rename = "발전가능성")]
    pub growth_potential: i64,
    #[serde(rename = "의사소통")]
    pub communication: i64,
}

impl Scores {
    pub fn add(&mut self, axis: Axis, amount: i64) {
        let field = match axis {
            Axis::MajorFit => &mut self.major_fit,
            Axis::Character => &mut self.character,
            Axis::GrowthPotential => &mut self.growth_potential,
            Axis::Communication => &mut self.communication,
        };
        *field += amount;
    }

    pub fn get(&self, axis: Axis) -> i64 {
        match axis {
            Axis::MajorFit => self.major_fit,
            Axis::Character => self.character,
            Axis::GrowthPotential => self.growth_potential,
            Axis::Communication => self.communication,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    #[serde(rename = "좋음")]
    Good,
    #[serde(rename = "보통")]
    Fair,
    #[serde(rename = "개선")]
    NeedsImprovement,
}

impl Grade {
    /// 좋음 ≥80, 보통 60..79, 개선 <60.
    pub fn for_score(score: u8) -> Grade {
        if score >= 80 {
            Grade::Good
        } else if score >= 60 {
            Grade::Fair
        } else {
            Grade::NeedsImprovement
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: u8,
    pub grade: Grade,
    pub feedback: String,
    pub strength_tags: Vec<String>,
    pub weakness_tags: Vec<String>,
}

impl Evaluation {
    pub fn new(score: u8, feedback: String, strength_tags: Vec<String>, weakness_tags: Vec<String>) -> Self {
        let score = score.min(100);
        Evaluation {
            score,
            grade: Grade::for_score(score),
            feedback,
            strength_tags,
            weakness_tags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    pub response_time_s: i64,
    pub sub_topic: String,
    pub evaluation: Evaluation,
    pub context_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewState {
    pub thread_id: String,
    pub difficulty: InterviewDifficulty,
    pub remaining_time_s: i64,
    pub stage: Stage,
    pub conversation_history: Vec<ConversationTurn>,
    pub current_context: Vec<String>,
    pub current_sub_topic: String,
    pub asked_sub_topics: BTreeSet<String>,
    pub answer_metadata: Vec<AnswerRecord>,
    pub scores: Scores,
    pub next_action: Option<Action>,
    pub follow_up_count: u32,
}

impl InterviewState {
    /// The most recent interviewer turn, i.e. the question currently
    /// awaiting a candidate answer.
    pub fn last_question(&self) -> Option<&str> {
        self.conversation_history
            .iter()
            .rev()
            .find(|t| t.role == Role::Interviewer)
            .map(|t| t.text.as_str())
    }

    /// The most recent candidate turn, i.e. the answer just submitted.
    pub fn last_answer(&self) -> Option<&str> {
        self.conversation_history
            .iter()
            .rev()
            .find(|t| t.role == Role::Candidate)
            .map(|t| t.text.as_str())
    }
}

/// Produced by the `wrap_up` node and persisted onto the session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub closing_remark: String,
    pub summary: String,
    pub scores: Scores,
    pub total_questions: usize,
}

/// `analyzer`'s output, returned to the caller of `chat_turn` alongside the
/// next question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnAnalysis {
    pub evaluation: Evaluation,
    pub next_action: Action,
}

pub fn validate_state(state: &InterviewState) -> Result<(), CoreError> {
    if state.remaining_time_s < 0 {
        return Err(CoreError::StorageError("remaining_time_s went negative".into()));
    }
    Ok(())
}
