//! Human-friendly room identifiers.
//!
//! Rooms get `adjective-noun` codes sampled from two disjoint word
//! lists. Collisions re-roll a bounded number of times before falling
//! back to a timestamp-suffixed id, so generation never spins.

use chrono::Utc;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "brave", "brisk", "calm", "clever", "cozy", "crisp", "dapper", "eager", "fancy",
    "fuzzy", "gentle", "glossy", "happy", "jolly", "keen", "lively", "lucky", "mellow", "mighty",
    "nimble", "peppy", "plucky", "quiet", "rapid", "rustic", "sandy", "shiny", "snappy", "sunny",
    "swift", "witty",
];

const NOUNS: &[&str] = &[
    "bat", "bird", "frog", "lizard", "mouse", "otter", "rabbit", "raccoon", "rat", "squirrel",
];

/// Re-rolls before the timestamp fallback kicks in.
const MAX_REROLLS: usize = 32;

fn random_room_id() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    format!("{adjective}-{noun}")
}

/// Generate an id not currently taken.
pub(crate) fn next_room_id<F>(is_taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    for _ in 0..MAX_REROLLS {
        let candidate = random_room_id();
        if !is_taken(&candidate) {
            return candidate;
        }
    }
    format!("room-{}", Utc::now().timestamp_millis())
}
