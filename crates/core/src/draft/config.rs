//! Draft configuration and pass-pattern normalization.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for a single draft instance, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftConfig {
    /// Number of packs each seat opens over the draft.
    pub pack_count: usize,
    /// Number of cards in each pack.
    pub pack_size: usize,
    /// Number of seats in the room.
    pub seat_count: usize,
    /// Picks per seat for each pass of a pack. Normalized on draft
    /// construction; an empty pattern means one pick per pass.
    #[serde(default)]
    pub pass_pattern: Vec<usize>,
}

impl DraftConfig {
    /// Validate the counts and normalize the pass pattern.
    pub fn normalized(mut self) -> Result<Self> {
        if self.pack_count == 0 || self.pack_size == 0 || self.seat_count == 0 {
            return Err(Error::InvalidConfig);
        }
        self.pass_pattern = normalize_pass_pattern(self.pack_size, &self.pass_pattern)?;
        Ok(self)
    }

    /// Cards needed to deal every pack.
    pub fn required_cards(&self) -> usize {
        self.pack_count * self.pack_size * self.seat_count
    }
}

/// Normalize a raw pass pattern against a pack size.
///
/// An empty pattern defaults to one pick per pass for the whole pack.
/// Entries must be positive and may sum to less than the pack size; the
/// remainder is burned at pack end.
pub fn normalize_pass_pattern(pack_size: usize, raw: &[usize]) -> Result<Vec<usize>> {
    if pack_size == 0 {
        return Err(Error::InvalidPassPattern("pack size must be > 0"));
    }
    if raw.is_empty() {
        return Ok(vec![1; pack_size]);
    }
    let mut total = 0;
    for &picks in raw {
        if picks == 0 {
            return Err(Error::InvalidPassPattern("entries must be > 0"));
        }
        total += picks;
        if total > pack_size {
            return Err(Error::InvalidPassPattern("picks exceed pack size"));
        }
    }
    Ok(raw.to_vec())
}
