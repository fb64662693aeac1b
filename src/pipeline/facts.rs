// Shortsmith Fact Writing - generation, cold scoring, and metadata
//
// One component wears three hats: writing a fact for a verified asset,
// scoring a fact it is handed with no other context, and suggesting a
// related topic when the controller wants a fresh angle. The scoring path
// is kept deliberately narrow. It receives the written words and nothing
// else, so a generous generator cannot talk the gate into agreeing with it.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::llm::LlmClient;
use crate::pipeline::uploader::VideoMetadata;
use crate::pipeline::{FactWriter, GeneratedFact};

const TITLE_LIMIT: usize = 100;
const DESCRIPTION_LIMIT: usize = 5000;
const TAG_LIMIT: usize = 30;

pub struct FactGenerator {
    llm: Arc<LlmClient>,
}

impl FactGenerator {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Title, description, and tags for publishing the finished video.
    pub async fn metadata(&self, fact: &GeneratedFact) -> Result<VideoMetadata> {
        let system = "You write YouTube Shorts metadata. Reply with JSON: \
                      {\"title\": \"...\", \"description\": \"...\", \"tags\": [\"...\"]}.";
        let user = format!(
            "Hook: {}\nFact: {}\nCategory: {}\n\n\
             Write a click-worthy title under {TITLE_LIMIT} characters, \
             a short description, and up to 10 tags.",
            fact.hook, fact.fact_text, fact.category
        );

        let reply = self.llm.chat_json(system, &user, 0.7, 400).await?;

        let mut title = clean_text(reply["title"].as_str().unwrap_or(&fact.hook));
        if !title.to_lowercase().contains("#shorts") {
            title = format!("{title} #Shorts");
        }
        truncate_chars(&mut title, TITLE_LIMIT);

        let mut description = clean_text(reply["description"].as_str().unwrap_or(&fact.fact_text));
        description.push_str("\n\nSubscribe for a new incredible fact every day!");
        truncate_chars(&mut description, DESCRIPTION_LIMIT);

        let mut tags: Vec<String> = reply["tags"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|t| t.as_str())
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        for required in ["shorts", "facts"] {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(required)) {
                tags.push(required.to_string());
            }
        }
        tags.truncate(TAG_LIMIT);

        Ok(VideoMetadata { title, description, tags })
    }
}

#[async_trait]
impl FactWriter for FactGenerator {
    async fn generate_for_asset(&self, asset_description: &str) -> Result<GeneratedFact> {
        let system = "You write facts for short vertical videos. Reply with JSON: \
                      {\"hook\": \"...\", \"fact\": \"...\", \"highlight_words\": [\"...\"], \
                      \"category\": \"...\", \"score\": <1-10>}.";
        let user = format!(
            "The footage shows: \"{asset_description}\". \
             Write one surprising, true, verifiable fact about that subject. \
             The hook is a short attention-grabbing line, at most 8 words. \
             The fact is one or two sentences. \
             highlight_words are the 2-4 most important words from the fact. \
             category is a one-word subject label. \
             score is your own 1-10 rating of how interesting the fact is."
        );

        let reply = self.llm.chat_json(system, &user, 0.9, 400).await?;

        let hook = clean_text(
            reply["hook"]
                .as_str()
                .ok_or_else(|| anyhow!("fact reply had no hook"))?,
        );
        let fact_text = clean_text(
            reply["fact"]
                .as_str()
                .ok_or_else(|| anyhow!("fact reply had no fact"))?,
        );
        if hook.is_empty() || fact_text.is_empty() {
            bail!("fact generation produced empty content");
        }

        let highlight_words: Vec<String> = reply["highlight_words"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|w| w.as_str())
                    .map(|w| w.trim().to_string())
                    .filter(|w| w.len() > 2)
                    .collect()
            })
            .unwrap_or_default();

        let category = reply["category"]
            .as_str()
            .unwrap_or("general")
            .trim()
            .to_lowercase();
        let self_score = reply["score"].as_u64().unwrap_or(5).clamp(1, 10) as u8;

        info!("[FACTS] generated '{}' (self score {})", hook, self_score);
        Ok(GeneratedFact {
            hook,
            fact_text,
            highlight_words,
            category,
            self_score,
            independent_score: None,
        })
    }

    async fn score(&self, hook: &str, fact_text: &str) -> Result<u8> {
        let system = "You rate facts for short videos. Reply with JSON: \
                      {\"score\": <1-10>, \"reason\": \"...\"}. \
                      10 means genuinely astonishing and shareable, \
                      1 means common knowledge or dull.";
        let user = format!("Hook: {hook}\nFact: {fact_text}\n\nRate this fact.");

        let reply = self.llm.chat_json(system, &user, 0.0, 100).await?;
        let score = reply["score"]
            .as_u64()
            .ok_or_else(|| anyhow!("score reply had no score field"))?;
        if !(1..=10).contains(&score) {
            bail!("score {} out of range", score);
        }
        debug!(
            "[FACTS] cold score {}: {}",
            score,
            reply["reason"].as_str().unwrap_or("no reason given")
        );
        Ok(score as u8)
    }

    async fn related_topic(&self, topic: &str) -> Result<String> {
        let system = "You suggest video topics. Reply with JSON: {\"topic\": \"...\"}.";
        let user = format!(
            "Suggest one topic adjacent to \"{topic}\" that would make good \
             stock-footage-backed fact videos. Concrete and filmable, \
             not an abstract concept. Two or three words."
        );

        let reply = self.llm.chat_json(system, &user, 1.0, 60).await?;
        let suggestion = reply["topic"]
            .as_str()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("related-topic reply had no topic"))?;
        Ok(suggestion)
    }
}

/// Cut to a character budget without splitting a multi-byte character.
fn truncate_chars(text: &mut String, max_chars: usize) {
    if let Some((byte_index, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_index);
    }
}

/// Normalize model output for on-screen and metadata use: straight quotes,
/// no long dashes, single spaces.
pub fn clean_text(text: &str) -> String {
    let replaced: String = text
        .trim()
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            _ => c,
        })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    let mut last_was_space = false;
    for c in replaced.chars() {
        if c == ' ' {
            if !last_was_space {
                out.push(c);
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}
