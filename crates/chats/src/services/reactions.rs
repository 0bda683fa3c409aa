//! Emoji reactions on messages.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::entities::{NewReaction, Reaction, ReactionSummary, REACTION_PALETTE};
use crate::repositories::ReactionRepository;
use crate::types::{ChatResult, MessageId, UserId};
use crate::utils::Validator;

/// Reactions of the local user.
#[derive(Clone)]
pub struct ReactionService {
    repository: Arc<dyn ReactionRepository>,
    user_id: UserId,
}

impl ReactionService {
    pub fn new(repository: Arc<dyn ReactionRepository>, user_id: impl Into<UserId>) -> Self {
        Self {
            repository,
            user_id: user_id.into(),
        }
    }

    /// Reactions grouped by message id.
    pub async fn fetch(
        &self,
        message_ids: &[MessageId],
    ) -> ChatResult<HashMap<MessageId, Vec<Reaction>>> {
        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut grouped: HashMap<MessageId, Vec<Reaction>> = HashMap::new();
        for reaction in self.repository.for_messages(message_ids).await? {
            grouped
                .entry(reaction.message_id.clone())
                .or_default()
                .push(reaction);
        }
        Ok(grouped)
    }

    /// Add a reaction, replacing an identical one by the same user.
    pub async fn react(&self, message_id: &str, emoji: &str) -> ChatResult<Reaction> {
        Validator::reaction_emoji(emoji)?;

        self.repository.delete(message_id, &self.user_id, emoji).await?;
        let reaction = self
            .repository
            .insert(NewReaction::new(message_id, self.user_id.clone(), emoji))
            .await?;
        debug!(message_id, emoji, "reaction added");
        Ok(reaction)
    }

    pub async fn remove(&self, message_id: &str, emoji: &str) -> ChatResult<()> {
        self.repository.delete(message_id, &self.user_id, emoji).await?;
        debug!(message_id, emoji, "reaction removed");
        Ok(())
    }

    /// Remove the user's reaction when present among `current`, add it
    /// otherwise. Returns whether the reaction is now present.
    pub async fn toggle(
        &self,
        message_id: &str,
        emoji: &str,
        current: &[Reaction],
    ) -> ChatResult<bool> {
        let present = current
            .iter()
            .any(|r| r.message_id == message_id && r.user_id == self.user_id && r.emoji == emoji);

        if present {
            self.remove(message_id, emoji).await?;
            Ok(false)
        } else {
            self.react(message_id, emoji).await?;
            Ok(true)
        }
    }
}

/// Count reactions per emoji, palette emoji first in palette order.
pub fn summarize(reactions: &[Reaction], local_user: &str) -> Vec<ReactionSummary> {
    let mut order: Vec<&str> = REACTION_PALETTE.to_vec();
    for reaction in reactions {
        if !order.contains(&reaction.emoji.as_str()) {
            order.push(&reaction.emoji);
        }
    }

    order
        .into_iter()
        .filter_map(|emoji| {
            let matching: Vec<&Reaction> = reactions.iter().filter(|r| r.emoji == emoji).collect();
            if matching.is_empty() {
                return None;
            }
            Some(ReactionSummary {
                emoji: emoji.to_string(),
                count: matching.len(),
                mine: matching.iter().any(|r| r.user_id == local_user),
            })
        })
        .collect()
}
