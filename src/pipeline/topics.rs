// Shortsmith Topic Rotation
//
// A curated catalogue of subjects with good fact potential. The picker
// tracks which hints it has handed out during this invocation so an outer
// retry always gets a fresh one; once the catalogue is exhausted the used
// set clears and rotation starts over.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::info;

/// Subjects that reliably have footage and a shocking fact behind them.
pub const TOPIC_CATALOGUE: &[&str] = &[
    // Mammals
    "lion", "tiger", "elephant", "wolf", "bear", "fox", "cheetah", "gorilla",
    "panda", "sloth", "otter", "polar bear", "camel", "capybara", "platypus",
    "hedgehog", "bat", "raccoon", "hyena", "meerkat",
    // Marine life
    "shark", "dolphin", "whale", "octopus", "jellyfish", "sea turtle",
    "manta ray", "seahorse", "orca", "squid", "pufferfish", "anglerfish",
    // Birds
    "eagle", "owl", "parrot", "hummingbird", "peacock", "flamingo",
    "penguin", "falcon", "toucan", "albatross", "ostrich",
    // Reptiles & insects
    "snake", "crocodile", "chameleon", "komodo dragon", "frog", "axolotl",
    "spider", "scorpion", "bee", "butterfly", "praying mantis", "firefly",
    // Space
    "galaxy", "nebula", "moon", "eclipse", "aurora", "astronaut", "rocket",
    "comet", "mars", "saturn rings", "black hole",
    // Nature phenomena
    "volcano", "lava", "lightning", "tornado", "tsunami", "geyser",
    "waterfall", "glacier", "iceberg", "sandstorm", "cave",
    // Plants
    "venus flytrap", "giant sequoia", "bamboo", "cactus", "mushroom",
    "cherry blossom", "baobab tree",
    // Landmarks
    "eiffel tower", "great wall", "pyramids", "colosseum", "machu picchu",
    "stonehenge", "grand canyon", "mount everest", "sahara", "antarctica",
    "mariana trench", "great barrier reef",
    // Science & materials
    "robot", "dna", "bacteria", "laser", "drone", "nuclear reactor",
    "gold", "diamond", "obsidian", "amber",
    // Food & engineering
    "coffee beans", "chocolate", "beehive", "saffron", "suspension bridge",
    "dam", "submarine", "oil rig", "deep sea", "coral reef", "shipwreck",
];

/// Draws topic hints without repeats for the lifetime of one invocation.
pub struct TopicPicker {
    used: HashSet<&'static str>,
    rng: StdRng,
}

impl TopicPicker {
    pub fn new(rng: StdRng) -> Self {
        Self {
            used: HashSet::new(),
            rng,
        }
    }

    /// Draw a previously-unused hint, marking it used. When every hint has
    /// been consumed the used set resets and the full catalogue is back in
    /// play.
    pub fn draw(&mut self) -> String {
        let available: Vec<&'static str> = TOPIC_CATALOGUE
            .iter()
            .copied()
            .filter(|t| !self.used.contains(t))
            .collect();

        let pool = if available.is_empty() {
            info!("[TOPICS] Catalogue exhausted, resetting rotation");
            self.used.clear();
            TOPIC_CATALOGUE.to_vec()
        } else {
            available
        };

        // Catalogue is never empty, so choose always succeeds.
        let pick = *pool.choose(&mut self.rng).unwrap_or(&TOPIC_CATALOGUE[0]);
        self.used.insert(pick);
        pick.to_string()
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }
}
