use serde::Serialize;

use crate::core::{AssistantTurn, Variant};

// ---------------------------------------------------------------------------
// CandidatePair — the two user-facing replies for one turn
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidatePair {
    pub sft: String,
    pub dpo: String,
}

impl CandidatePair {
    pub fn get(&self, variant: Variant) -> &str {
        match variant {
            Variant::Sft => &self.sft,
            Variant::Dpo => &self.dpo,
        }
    }

    /// Order the pair for presentation. `dpo_first` must come from an unbiased
    /// coin so position never reveals the variant.
    pub fn present(&self, dpo_first: bool) -> [String; 2] {
        if dpo_first {
            [self.dpo.clone(), self.sft.clone()]
        } else {
            [self.sft.clone(), self.dpo.clone()]
        }
    }
}

impl From<&AssistantTurn> for CandidatePair {
    fn from(turn: &AssistantTurn) -> Self {
        Self {
            sft: turn.sft.clone(),
            dpo: turn.dpo.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReplyOptions — payload returned for a submitted turn
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplyOptions {
    /// Transcript length after the append; names the assistant turn.
    pub response_id: usize,
    pub reply_options: [String; 2],
}
