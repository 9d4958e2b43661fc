use crate::core::{PromptTurn, Role};

// ---------------------------------------------------------------------------
// PromptBuilder — history → model-ready prompt text
// ---------------------------------------------------------------------------

pub trait PromptBuilder: Send + Sync {
    fn build(&self, history: &[PromptTurn]) -> String;
}

// ---------------------------------------------------------------------------
// ListenerPromptBuilder — empathetic listener template
// ---------------------------------------------------------------------------

const LISTENER_SYSTEM: &str =
    "【任务】：请根据倾听者和来访者的历史对话，生成倾听者的思维链和相应的倾听者回复。\n\n";
const LISTENER_CONTEXT_HEAD: &str = "【历史对话】：\n\t";
const LISTENER_CONTEXT_TAIL: &str = "\n\n请判断倾听者思维链，并做出对来访者的回复。\n";

#[derive(Clone, Debug, Default)]
pub struct ListenerPromptBuilder;

impl ListenerPromptBuilder {
    fn role_label(role: Role) -> &'static str {
        match role {
            Role::User => "来访者",
            Role::Assistant => "倾听者",
        }
    }
}

impl PromptBuilder for ListenerPromptBuilder {
    fn build(&self, history: &[PromptTurn]) -> String {
        let conversation = history
            .iter()
            .map(|turn| format!("{}: {}", Self::role_label(turn.role), turn.content))
            .collect::<Vec<_>>()
            .join("\n\t");
        format!("{LISTENER_SYSTEM}{LISTENER_CONTEXT_HEAD}{conversation}{LISTENER_CONTEXT_TAIL}")
    }
}
