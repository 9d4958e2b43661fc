use serde::{Deserialize, Serialize};

use crate::core::{Timestamp, TranscriptError, Variant};

// ---------------------------------------------------------------------------
// Turn variants
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserTurn {
    pub content: String,
    pub time: Timestamp,
    /// Canonical-language rendering, present iff `content` was foreign.
    pub translated_content: Option<String>,
}

impl UserTurn {
    pub fn new(content: impl Into<String>, time: Timestamp) -> Self {
        Self {
            content: content.into(),
            time,
            translated_content: None,
        }
    }

    pub fn canonical_text(&self) -> &str {
        self.translated_content.as_deref().unwrap_or(&self.content)
    }
}

/// The untranslated canonical-language generations behind a foreign turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalCandidates {
    pub sft: String,
    pub dpo: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssistantTurn {
    pub time: Timestamp,
    /// User-facing sft reply (back-translated when the user turn was foreign).
    pub sft: String,
    /// User-facing dpo reply (back-translated when the user turn was foreign).
    pub dpo: String,
    pub canonical: Option<CanonicalCandidates>,
}

impl AssistantTurn {
    pub fn display(&self, variant: Variant) -> &str {
        match variant {
            Variant::Sft => &self.sft,
            Variant::Dpo => &self.dpo,
        }
    }

    pub fn canonical(&self, variant: Variant) -> &str {
        match (&self.canonical, variant) {
            (Some(c), Variant::Sft) => &c.sft,
            (Some(c), Variant::Dpo) => &c.dpo,
            (None, v) => self.display(v),
        }
    }

    /// Which variant produced `text`, matching user-facing text first.
    pub fn variant_of(&self, text: &str) -> Option<Variant> {
        Variant::ALL
            .into_iter()
            .find(|v| self.display(*v) == text)
            .or_else(|| {
                Variant::ALL
                    .into_iter()
                    .find(|v| self.canonical.is_some() && self.canonical(*v) == text)
            })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TurnRecord", into = "TurnRecord")]
pub enum Turn {
    User(UserTurn),
    PendingAssistant(AssistantTurn),
    ResolvedAssistant {
        reply: AssistantTurn,
        content: String,
    },
}

impl Turn {
    pub fn time(&self) -> &Timestamp {
        match self {
            Turn::User(u) => &u.time,
            Turn::PendingAssistant(a) => &a.time,
            Turn::ResolvedAssistant { reply, .. } => &reply.time,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Turn::User(_))
    }

    pub fn assistant(&self) -> Option<&AssistantTurn> {
        match self {
            Turn::User(_) => None,
            Turn::PendingAssistant(a) => Some(a),
            Turn::ResolvedAssistant { reply, .. } => Some(reply),
        }
    }

    /// Text this turn contributes to a prompt history line.
    ///
    /// A pending assistant turn was never shown as chosen, so it contributes
    /// its sft reply.
    pub fn prompt_text(&self) -> &str {
        match self {
            Turn::User(u) => &u.content,
            Turn::PendingAssistant(a) => &a.sft,
            Turn::ResolvedAssistant { content, .. } => content,
        }
    }

    pub fn role(&self) -> Role {
        if self.is_user() {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

// ---------------------------------------------------------------------------
// Role / PromptTurn — the read view handed to prompt building
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTurn {
    pub role: Role,
    pub content: String,
}

impl PromptTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transcript — append-only ordered turns
// ---------------------------------------------------------------------------

/// Result of applying a participant's selection to the transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    /// A pending turn was resolved.
    Resolved(Variant),
    /// The turn was already resolved to the same text; nothing changed.
    Unchanged(Variant),
}

impl Selection {
    pub fn variant(&self) -> Variant {
        match self {
            Selection::Resolved(v) | Selection::Unchanged(v) => *v,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript(Vec<Turn>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.0.last()
    }

    /// Append `turn`, returning the new transcript length.
    pub fn append(&mut self, turn: Turn) -> usize {
        self.0.push(turn);
        self.0.len()
    }

    /// Whether `response_id` names an existing turn (ids are 1-based lengths).
    pub fn has_response(&self, response_id: usize) -> bool {
        (1..=self.0.len()).contains(&response_id)
    }

    /// Record the participant's chosen reply on the most recent assistant turn.
    ///
    /// Only the last turn may be resolved, and only to one of its own
    /// candidates. Re-selecting the already chosen text is a no-op.
    pub fn select(&mut self, text: &str) -> Result<Selection, TranscriptError> {
        let Some(last) = self.0.last_mut() else {
            return Err(TranscriptError::StaleSelection(
                "transcript is empty".to_owned(),
            ));
        };

        match last {
            Turn::User(_) => Err(TranscriptError::StaleSelection(
                "last turn is a user turn".to_owned(),
            )),
            Turn::ResolvedAssistant { reply, content } => {
                if content.as_str() == text {
                    let variant = reply
                        .variant_of(text)
                        .ok_or(TranscriptError::UnknownCandidate)?;
                    Ok(Selection::Unchanged(variant))
                } else {
                    Err(TranscriptError::StaleSelection(
                        "last assistant turn is already resolved".to_owned(),
                    ))
                }
            }
            Turn::PendingAssistant(reply) => {
                let variant = reply
                    .variant_of(text)
                    .ok_or(TranscriptError::UnknownCandidate)?;
                let reply = reply.clone();
                *last = Turn::ResolvedAssistant {
                    reply,
                    content: text.to_owned(),
                };
                Ok(Selection::Resolved(variant))
            }
        }
    }

    /// Role-tagged history as stored, oldest first.
    pub fn prompt_history(&self) -> Vec<PromptTurn> {
        self.0
            .iter()
            .map(|t| PromptTurn::new(t.role(), t.prompt_text()))
            .collect()
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self(turns)
    }
}

// ---------------------------------------------------------------------------
// Wire record (flat JSON object per turn)
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct TurnRecord {
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    translated_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sft: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dpo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chinese_sft: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chinese_dpo: Option<String>,
}

impl TryFrom<TurnRecord> for Turn {
    type Error = TranscriptError;

    fn try_from(record: TurnRecord) -> Result<Self, Self::Error> {
        match record.role {
            Role::User => {
                if record.sft.is_some() || record.dpo.is_some() {
                    return Err(TranscriptError::InvalidRecord(
                        "user turn carries candidate fields".to_owned(),
                    ));
                }
                let content = record.content.ok_or_else(|| {
                    TranscriptError::InvalidRecord("user turn without content".to_owned())
                })?;
                Ok(Turn::User(UserTurn {
                    content,
                    time: record.time,
                    translated_content: record.translated_content,
                }))
            }
            Role::Assistant => {
                let (Some(sft), Some(dpo)) = (record.sft, record.dpo) else {
                    return Err(TranscriptError::InvalidRecord(
                        "assistant turn without both sft and dpo".to_owned(),
                    ));
                };
                let canonical = match (record.chinese_sft, record.chinese_dpo) {
                    (Some(sft), Some(dpo)) => Some(CanonicalCandidates { sft, dpo }),
                    (None, None) => None,
                    _ => {
                        return Err(TranscriptError::InvalidRecord(
                            "assistant turn with only one canonical candidate".to_owned(),
                        ))
                    }
                };
                let reply = AssistantTurn {
                    time: record.time,
                    sft,
                    dpo,
                    canonical,
                };
                Ok(match record.content {
                    Some(content) => Turn::ResolvedAssistant { reply, content },
                    None => Turn::PendingAssistant(reply),
                })
            }
        }
    }
}

impl From<Turn> for TurnRecord {
    fn from(turn: Turn) -> Self {
        match turn {
            Turn::User(u) => TurnRecord {
                role: Role::User,
                content: Some(u.content),
                time: u.time,
                translated_content: u.translated_content,
                sft: None,
                dpo: None,
                chinese_sft: None,
                chinese_dpo: None,
            },
            Turn::PendingAssistant(reply) => assistant_record(reply, None),
            Turn::ResolvedAssistant { reply, content } => assistant_record(reply, Some(content)),
        }
    }
}

fn assistant_record(reply: AssistantTurn, content: Option<String>) -> TurnRecord {
    let (chinese_sft, chinese_dpo) = match reply.canonical {
        Some(c) => (Some(c.sft), Some(c.dpo)),
        None => (None, None),
    };
    TurnRecord {
        role: Role::Assistant,
        content,
        time: reply.time,
        translated_content: None,
        sft: Some(reply.sft),
        dpo: Some(reply.dpo),
        chinese_sft,
        chinese_dpo,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(value: &str) -> Timestamp {
        Timestamp::new(value)
    }

    fn reply(sft: &str, dpo: &str) -> AssistantTurn {
        AssistantTurn {
            time: ts("26-01-01-00-00-01"),
            sft: sft.to_owned(),
            dpo: dpo.to_owned(),
            canonical: None,
        }
    }

    fn three_turn_transcript() -> Transcript {
        let mut t = Transcript::new();
        t.append(Turn::User(UserTurn::new("我今天很难过", ts("26-01-01-00-00-00"))));
        t.append(Turn::ResolvedAssistant {
            reply: reply("听起来你很难受", "我在这里陪着你"),
            content: "我在这里陪着你".to_owned(),
        });
        t.append(Turn::User(UserTurn::new("工作压力很大", ts("26-01-01-00-01-00"))));
        t
    }

    #[test]
    fn test_user_turn_serializes_without_candidate_fields() {
        let turn = Turn::User(UserTurn::new("你好", ts("26-01-01-00-00-00")));
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(
            value,
            json!({"role": "user", "content": "你好", "time": "26-01-01-00-00-00"})
        );
    }

    #[test]
    fn test_pending_assistant_has_no_content_key() {
        let value = serde_json::to_value(Turn::PendingAssistant(reply("a", "b"))).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["sft"], "a");
        assert_eq!(value["dpo"], "b");
        assert!(value.get("content").is_none());
        assert!(value.get("chinese_sft").is_none());
    }

    #[test]
    fn test_foreign_assistant_record_round_trips() {
        let raw = json!({
            "role": "assistant",
            "time": "26-01-01-00-00-01",
            "sft": "That sounds hard.",
            "dpo": "I'm here for you.",
            "chinese_sft": "听起来很难。",
            "chinese_dpo": "我在这里陪你。",
            "content": "I'm here for you."
        });
        let turn: Turn = serde_json::from_value(raw.clone()).unwrap();
        match &turn {
            Turn::ResolvedAssistant { reply, content } => {
                assert_eq!(content, "I'm here for you.");
                assert_eq!(reply.canonical(Variant::Dpo), "我在这里陪你。");
            }
            other => panic!("expected resolved assistant, got {other:?}"),
        }
        assert_eq!(serde_json::to_value(&turn).unwrap(), raw);
    }

    #[test]
    fn test_rejects_half_canonical_record() {
        let raw = json!({
            "role": "assistant",
            "time": "t",
            "sft": "a",
            "dpo": "b",
            "chinese_sft": "甲"
        });
        assert!(serde_json::from_value::<Turn>(raw).is_err());
    }

    #[test]
    fn test_rejects_assistant_without_candidates() {
        let raw = json!({"role": "assistant", "time": "t", "content": "x"});
        assert!(serde_json::from_value::<Turn>(raw).is_err());
    }

    #[test]
    fn test_select_resolves_pending_turn_only() {
        let mut t = three_turn_transcript();
        let before: Vec<Turn> = t.turns().to_vec();
        t.append(Turn::PendingAssistant(reply("sft text", "dpo text")));

        let selection = t.select("dpo text").unwrap();
        assert_eq!(selection, Selection::Resolved(Variant::Dpo));
        assert_eq!(t.len(), 4);
        assert_eq!(&t.turns()[..3], before.as_slice());
        match t.last() {
            Some(Turn::ResolvedAssistant { content, .. }) => assert_eq!(content, "dpo text"),
            other => panic!("expected resolved turn, got {other:?}"),
        }
    }

    #[test]
    fn test_select_same_text_twice_is_unchanged() {
        let mut t = Transcript::new();
        t.append(Turn::User(UserTurn::new("hi", ts("a"))));
        t.append(Turn::PendingAssistant(reply("x", "y")));

        t.select("x").unwrap();
        let snapshot = serde_json::to_string(&t).unwrap();
        assert_eq!(t.select("x").unwrap(), Selection::Unchanged(Variant::Sft));
        assert_eq!(serde_json::to_string(&t).unwrap(), snapshot);
    }

    #[test]
    fn test_select_different_text_on_resolved_turn_is_stale() {
        let mut t = Transcript::new();
        t.append(Turn::User(UserTurn::new("hi", ts("a"))));
        t.append(Turn::PendingAssistant(reply("x", "y")));
        t.select("x").unwrap();

        assert!(matches!(
            t.select("y"),
            Err(TranscriptError::StaleSelection(_))
        ));
    }

    #[test]
    fn test_select_on_user_turn_is_stale_and_leaves_turn_intact() {
        let mut t = three_turn_transcript();
        let before = t.clone();
        assert!(matches!(
            t.select("anything"),
            Err(TranscriptError::StaleSelection(_))
        ));
        assert_eq!(t, before);
    }

    #[test]
    fn test_select_on_empty_transcript_is_stale() {
        let mut t = Transcript::new();
        assert!(matches!(
            t.select("x"),
            Err(TranscriptError::StaleSelection(_))
        ));
    }

    #[test]
    fn test_select_unknown_text_is_rejected() {
        let mut t = Transcript::new();
        t.append(Turn::User(UserTurn::new("hi", ts("a"))));
        t.append(Turn::PendingAssistant(reply("x", "y")));

        assert_eq!(t.select("z"), Err(TranscriptError::UnknownCandidate));
        assert!(matches!(t.last(), Some(Turn::PendingAssistant(_))));
    }

    #[test]
    fn test_variant_of_matches_canonical_text() {
        let turn = AssistantTurn {
            time: ts("a"),
            sft: "Hello".to_owned(),
            dpo: "Hi".to_owned(),
            canonical: Some(CanonicalCandidates {
                sft: "你好".to_owned(),
                dpo: "嗨".to_owned(),
            }),
        };
        assert_eq!(turn.variant_of("Hi"), Some(Variant::Dpo));
        assert_eq!(turn.variant_of("你好"), Some(Variant::Sft));
        assert_eq!(turn.variant_of("nope"), None);
    }

    #[test]
    fn test_has_response_is_one_based() {
        let t = three_turn_transcript();
        assert!(!t.has_response(0));
        assert!(t.has_response(1));
        assert!(t.has_response(3));
        assert!(!t.has_response(4));
    }

    #[test]
    fn test_prompt_history_uses_stored_content() {
        let mut t = three_turn_transcript();
        t.append(Turn::PendingAssistant(reply("pending sft", "pending dpo")));
        let history = t.prompt_history();

        assert_eq!(history.len(), 4);
        assert_eq!(history[0], PromptTurn::new(Role::User, "我今天很难过"));
        assert_eq!(history[1], PromptTurn::new(Role::Assistant, "我在这里陪着你"));
        assert_eq!(history[3], PromptTurn::new(Role::Assistant, "pending sft"));
    }
}
