use la_core::core::{SessionId, Timestamp, Transcript, UserId, UserMode, Variant};
use serde::{Deserialize, Serialize};

/// Free-text reaction attached to a response id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub response_id: usize,
    pub feedback: String,
    pub time: Timestamp,
}

/// Numeric score attached to a response id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingEntry {
    pub response_id: usize,
    pub rating: i64,
    pub time: Timestamp,
}

/// Answers collected before the conversation starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreSurvey {
    pub description: String,
    pub keywords: Vec<String>,
}

/// Scale answers collected when the participant finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSurvey {
    pub calm_excited: i64,
    pub unpleasant_pleasant: i64,
    pub supportiveness: i64,
    pub engagement: i64,
}

/// The whole persisted record of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub username: UserId,
    pub user_mode: UserMode,
    pub start_time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presurvey: Option<PreSurvey>,
    #[serde(default)]
    pub dialogue: Transcript,
    #[serde(default)]
    pub feedback: Vec<FeedbackEntry>,
    #[serde(default)]
    pub ratings: Vec<RatingEntry>,
    #[serde(
        default,
        rename = "post-survey",
        skip_serializing_if = "Option::is_none"
    )]
    pub post_survey: Option<PostSurvey>,
}

impl SessionDocument {
    pub fn new(id: &SessionId, user_mode: UserMode) -> Self {
        Self {
            username: id.user().clone(),
            user_mode,
            start_time: id.start_time().clone(),
            presurvey: None,
            dialogue: Transcript::new(),
            feedback: Vec::new(),
            ratings: Vec::new(),
            post_survey: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        SessionId::new(self.username.clone(), self.start_time.clone())
    }
}

/// A preference pair exported from a resolved assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencePair {
    pub prompt: String,
    pub chosen: String,
    pub rejected: String,
    pub metadata: PreferenceMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceMetadata {
    pub session: String,
    pub username: UserId,
    pub turn_index: usize,
    pub chosen_variant: Variant,
    pub time: Timestamp,
}
