use la_core::core::{Turn, Variant};
use serde::Serialize;

use crate::models::{PreferenceMetadata, PreferencePair};
use crate::store::{SessionStore, StoreError};

#[derive(Debug, Clone, Default)]
pub struct PreferenceExportFilter {
    pub username: Option<String>,
    pub chosen_variant: Option<Variant>,
}

/// Export preference pairs from every resolved assistant turn.
///
/// The chosen side is the canonical-language text of the selected variant and
/// the rejected side is the other variant's. Pending turns, and turns with no
/// preceding user turn, are skipped.
pub fn export_preference_pairs(
    store: &SessionStore,
    filter: &PreferenceExportFilter,
) -> Result<Vec<PreferencePair>, StoreError> {
    let documents = store.list_documents()?;
    let mut pairs = Vec::new();

    for doc in documents {
        if let Some(expected_user) = filter.username.as_deref() {
            if doc.username.as_str() != expected_user {
                continue;
            }
        }

        let session = doc.session_id().key();
        let turns = doc.dialogue.turns();
        for (index, turn) in turns.iter().enumerate() {
            let Turn::ResolvedAssistant { reply, content } = turn else {
                continue;
            };
            let Some(chosen_variant) = reply.variant_of(content) else {
                tracing::warn!(
                    session = %session,
                    turn = index + 1,
                    "resolved turn content matches neither candidate"
                );
                continue;
            };
            if let Some(expected) = filter.chosen_variant {
                if chosen_variant != expected {
                    continue;
                }
            }

            let Some(prompt) = turns[..index].iter().rev().find_map(|t| match t {
                Turn::User(user) => Some(user.canonical_text()),
                _ => None,
            }) else {
                continue;
            };

            pairs.push(PreferencePair {
                prompt: prompt.to_owned(),
                chosen: reply.canonical(chosen_variant).to_owned(),
                rejected: reply.canonical(chosen_variant.other()).to_owned(),
                metadata: PreferenceMetadata {
                    session: session.clone(),
                    username: doc.username.clone(),
                    turn_index: index + 1,
                    chosen_variant,
                    time: reply.time.clone(),
                },
            });
        }
    }

    Ok(pairs)
}

#[derive(Serialize)]
struct ExportJsonPair<'a> {
    prompt: &'a str,
    chosen: &'a str,
    rejected: &'a str,
    metadata: &'a PreferenceMetadata,
}

pub fn export_to_json(pairs: &[PreferencePair]) -> Result<String, StoreError> {
    let export_pairs: Vec<ExportJsonPair<'_>> = pairs
        .iter()
        .map(|pair| ExportJsonPair {
            prompt: pair.prompt.as_str(),
            chosen: pair.chosen.as_str(),
            rejected: pair.rejected.as_str(),
            metadata: &pair.metadata,
        })
        .collect();

    let json = serde_json::to_string(&export_pairs)?;
    Ok(json)
}
