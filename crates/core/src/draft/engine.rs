//! Draft engine: pack construction, routing, and command processing.
//!
//! The draft is a plain value with no interior locking; the owning room
//! serializes access. Every accepted mutation bumps `global_seq`, which
//! the snapshot store uses to skip rooms that have not advanced.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::config::DraftConfig;

/// Destination list for a picked card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickZone {
    Mainboard,
    Sideboard,
}

impl FromStr for PickZone {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "mainboard" => Ok(PickZone::Mainboard),
            "sideboard" => Ok(PickZone::Sideboard),
            _ => Err(Error::InvalidZone),
        }
    }
}

impl fmt::Display for PickZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickZone::Mainboard => f.write_str("mainboard"),
            PickZone::Sideboard => f.write_str("sideboard"),
        }
    }
}

/// One booster: the dealt cards plus which indices have been taken.
/// `cards` never changes after construction; `picked` flags only ever
/// flip to true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    pub id: String,
    pub cards: Vec<String>,
    pub picked: Vec<bool>,
}

impl Pack {
    fn unpicked(&self) -> usize {
        self.picked.iter().filter(|taken| !**taken).count()
    }
}

/// Cards a seat has drafted so far, split by destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatPicks {
    pub mainboard: Vec<String>,
    pub sideboard: Vec<String>,
}

impl SeatPicks {
    fn zone_mut(&mut self, zone: PickZone) -> &mut Vec<String> {
        match zone {
            PickZone::Mainboard => &mut self.mainboard,
            PickZone::Sideboard => &mut self.sideboard,
        }
    }
}

/// Everything the server tracks for one drafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatState {
    pub seat_number: usize,
    pub name: String,
    pub picks: SeatPicks,
    /// Basic-land counts chosen outside the pack queue.
    #[serde(default)]
    pub basics: BTreeMap<String, u32>,
}

/// Where the table currently is. Both indices are 0-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftProgress {
    pub pack_number: usize,
    /// Pass index within the current pack.
    pub pick_number: usize,
}

/// Lifecycle phase reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftPhase {
    Drafting,
    Done,
}

/// Seat-local view of an active pack; only unpicked cards are visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackView {
    pub pack_id: String,
    pub cards: Vec<String>,
}

/// A seat-local snapshot sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub seat_id: usize,
    pub state: DraftPhase,
    pub picks: SeatPicks,
    #[serde(default)]
    pub basics: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_pack: Option<PackView>,
    pub pack_no: usize,
    /// Linear pick index across the current pack.
    pub pick_no: usize,
    pub expected_picks: usize,
    pub can_pick: bool,
    pub next_seq: u64,
}

/// One card chosen in a pick command. The zone arrives as a plain
/// string and is validated during the pick itself, after the seat,
/// sequence, and pack checks have all passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickSelection {
    #[serde(default)]
    pub card_name: String,
    #[serde(default)]
    pub zone: String,
}

/// Domain events emitted by accepted commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// All seats finished the current pass.
    RoundAdvanced {
        pack_number: usize,
        /// Linear pick index within the (possibly new) pack.
        pick_number: usize,
    },
    /// All packs are exhausted.
    DraftCompleted,
}

/// Outcome of a draft command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub state: PlayerState,
    pub events: Vec<Event>,
    /// True when the command repeated an already-applied sequence number.
    pub duplicate: bool,
}

impl CommandResult {
    fn duplicate_of(state: PlayerState) -> Self {
        CommandResult {
            state,
            events: Vec::new(),
            duplicate: true,
        }
    }
}

/// Authoritative state for one draft. Structure is fixed after
/// construction; only picks, progress, latches, and counters advance.
#[derive(Debug, Clone)]
pub struct Draft {
    pub(crate) config: DraftConfig,
    /// packs[pack_number][origin_seat]
    pub(crate) packs: Vec<Vec<Pack>>,
    pub(crate) progress: DraftProgress,
    pub(crate) seats: Vec<SeatState>,
    /// seat_picked[seat] latches once the seat has picked this pass.
    pub(crate) seat_picked: Vec<bool>,
    /// Monotonic command sequence per seat for idempotent retries.
    pub(crate) last_seq_by_seat: Vec<u64>,
    /// Bumped once per accepted state change.
    pub(crate) global_seq: u64,
}

impl Draft {
    /// Construct and immediately start a draft from a deck list.
    /// The deck is shuffled internally, so callers pass it unordered.
    pub fn new(config: DraftConfig, deck: &[String]) -> Result<Self> {
        let config = config.normalized()?;
        if deck.len() < config.required_cards() {
            return Err(Error::DeckTooSmall);
        }

        let mut shuffled = deck.to_vec();
        shuffled.shuffle(&mut rand::thread_rng());

        let mut packs = Vec::with_capacity(config.pack_count);
        let mut deck_idx = 0;
        for pack_no in 0..config.pack_count {
            let mut row = Vec::with_capacity(config.seat_count);
            for origin_seat in 0..config.seat_count {
                row.push(Pack {
                    id: format!("p{pack_no}_s{origin_seat}"),
                    cards: shuffled[deck_idx..deck_idx + config.pack_size].to_vec(),
                    picked: vec![false; config.pack_size],
                });
                deck_idx += config.pack_size;
            }
            packs.push(row);
        }

        let seats = (0..config.seat_count)
            .map(|i| SeatState {
                seat_number: i,
                name: format!("Seat {}", i + 1),
                picks: SeatPicks::default(),
                basics: BTreeMap::new(),
            })
            .collect();

        Ok(Draft {
            seat_picked: vec![false; config.seat_count],
            last_seq_by_seat: vec![0; config.seat_count],
            global_seq: 0,
            packs,
            progress: DraftProgress::default(),
            seats,
            config,
        })
    }

    pub fn config(&self) -> &DraftConfig {
        &self.config
    }

    pub fn progress(&self) -> DraftProgress {
        self.progress
    }

    pub fn global_seq(&self) -> u64 {
        self.global_seq
    }

    /// Reports `Drafting` until all packs are consumed, then `Done`.
    pub fn phase(&self) -> DraftPhase {
        if self.progress.pack_number >= self.config.pack_count {
            DraftPhase::Done
        } else {
            DraftPhase::Drafting
        }
    }

    fn picks_this_pass(&self) -> usize {
        if self.phase() == DraftPhase::Done {
            return 0;
        }
        self.config
            .pass_pattern
            .get(self.progress.pick_number)
            .copied()
            .unwrap_or(0)
    }

    /// Linear pick index across the current pack: picks consumed by all
    /// completed passes of this pack.
    pub fn current_pick_no(&self) -> usize {
        if self.phase() == DraftPhase::Done {
            return 0;
        }
        let upto = self.progress.pick_number.min(self.config.pass_pattern.len());
        self.config.pass_pattern[..upto].iter().sum()
    }

    /// Origin seat whose pack `seat` is currently holding. Even pack
    /// numbers pass left, odd pack numbers pass right.
    fn origin_for_seat(&self, seat: usize) -> usize {
        let seats = self.config.seat_count as isize;
        let pass = self.progress.pick_number as isize;
        let mut origin = seat as isize;
        if self.progress.pack_number % 2 == 0 {
            origin -= pass;
        } else {
            origin += pass;
        }
        origin.rem_euclid(seats) as usize
    }

    fn current_pack_for_seat(&self, seat: usize) -> Result<&Pack> {
        if seat >= self.config.seat_count {
            return Err(Error::InvalidSeat);
        }
        if self.phase() == DraftPhase::Done {
            return Err(Error::DraftComplete);
        }

        let pack = &self.packs[self.progress.pack_number][self.origin_for_seat(seat)];
        if pack.cards.len() != self.config.pack_size || pack.picked.len() != self.config.pack_size
        {
            return Err(Error::PackSizeInvariant);
        }
        Ok(pack)
    }

    /// Mark every still-unpicked card of the current pack number picked.
    /// Returns whether anything actually burned.
    fn burn_remaining_current_pack(&mut self) -> bool {
        let Some(row) = self.packs.get_mut(self.progress.pack_number) else {
            return false;
        };
        let mut changed = false;
        for pack in row {
            for slot in pack.picked.iter_mut() {
                if !*slot {
                    *slot = true;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Seat-local snapshot with deep copies of the seat's pools.
    pub fn player_state(&self, seat: usize) -> Result<PlayerState> {
        if seat >= self.config.seat_count {
            return Err(Error::InvalidSeat);
        }

        let mut state = PlayerState {
            seat_id: seat,
            state: self.phase(),
            picks: self.seats[seat].picks.clone(),
            basics: self.seats[seat].basics.clone(),
            active_pack: None,
            pack_no: self.progress.pack_number,
            pick_no: self.current_pick_no(),
            expected_picks: self.picks_this_pass(),
            can_pick: false,
            next_seq: self.last_seq_by_seat[seat] + 1,
        };

        if state.state == DraftPhase::Done {
            return Ok(state);
        }

        let pack = self.current_pack_for_seat(seat)?;
        let visible: Vec<String> = pack
            .cards
            .iter()
            .zip(&pack.picked)
            .filter(|(_, taken)| !**taken)
            .map(|(card, _)| card.clone())
            .collect();
        state.can_pick = !self.seat_picked[seat]
            && visible.len() >= state.expected_picks
            && state.expected_picks > 0;
        state.active_pack = Some(PackView {
            pack_id: pack.id.clone(),
            cards: visible,
        });
        Ok(state)
    }

    /// Strict `last + 1` acceptance. `Ok(true)` means the command is an
    /// already-applied duplicate and must be answered without side
    /// effects.
    fn check_seq(&self, seat: usize, seq: u64) -> Result<bool> {
        let last = self.last_seq_by_seat[seat];
        if seq == 0 {
            return Err(Error::InvalidSeq);
        }
        if seq == last {
            return Ok(true);
        }
        if seq < last {
            return Err(Error::StaleSeq);
        }
        if seq != last + 1 {
            return Err(Error::SeqGap);
        }
        Ok(false)
    }

    /// Single-card convenience form of [`Draft::pick_batch`].
    pub fn pick(
        &mut self,
        seat: usize,
        seq: u64,
        pack_id: &str,
        card_name: &str,
        zone: &str,
    ) -> Result<CommandResult> {
        self.pick_batch(
            seat,
            seq,
            pack_id,
            &[PickSelection {
                card_name: card_name.to_string(),
                zone: zone.to_string(),
            }],
        )
    }

    /// Apply all of a seat's picks for the current pass atomically, then
    /// advance the round once every seat has picked.
    ///
    /// Sequence numbers are per-seat and strictly monotonic so retries
    /// over a flaky connection are idempotent.
    pub fn pick_batch(
        &mut self,
        seat: usize,
        seq: u64,
        pack_id: &str,
        picks: &[PickSelection],
    ) -> Result<CommandResult> {
        if seat >= self.config.seat_count {
            return Err(Error::InvalidSeat);
        }
        if self.phase() == DraftPhase::Done {
            return Err(Error::DraftComplete);
        }
        if self.check_seq(seat, seq)? {
            return Ok(CommandResult::duplicate_of(self.player_state(seat)?));
        }
        if self.seat_picked[seat] {
            return Err(Error::SeatAlreadyPicked);
        }

        let origin = self.origin_for_seat(seat);
        {
            let pack = self.current_pack_for_seat(seat)?;
            if pack.id != pack_id {
                return Err(Error::PackMismatch);
            }
        }

        let expected = self.picks_this_pass();
        if expected == 0 {
            return Err(Error::NoPicksThisPass);
        }
        if picks.len() != expected {
            return Err(Error::WrongPickCount(expected));
        }

        let pack = &self.packs[self.progress.pack_number][origin];
        if pack.unpicked() < expected {
            return Err(Error::NotEnoughCards);
        }

        // First-fit against a tentative bitmap, so duplicate card names
        // in one batch claim distinct unpicked indices.
        let mut tentative = pack.picked.clone();
        let mut chosen = Vec::with_capacity(picks.len());
        for selection in picks {
            let zone = selection.zone.parse::<PickZone>()?;
            if selection.card_name.is_empty() {
                return Err(Error::CardNameRequired);
            }
            let idx = (0..pack.cards.len())
                .find(|&i| pack.cards[i] == selection.card_name && !tentative[i])
                .ok_or(Error::CardNotAvailable)?;
            tentative[idx] = true;
            chosen.push((idx, zone));
        }

        // Commit.
        let pack = &mut self.packs[self.progress.pack_number][origin];
        for (selection, &(idx, zone)) in picks.iter().zip(&chosen) {
            pack.picked[idx] = true;
            self.seats[seat]
                .picks
                .zone_mut(zone)
                .push(selection.card_name.clone());
        }
        self.seat_picked[seat] = true;
        self.last_seq_by_seat[seat] = seq;
        self.global_seq += 1;

        let mut events = Vec::new();
        if self.seat_picked.iter().all(|&picked| picked) {
            self.seat_picked.fill(false);

            self.progress.pick_number += 1;
            if self.progress.pick_number >= self.config.pass_pattern.len() {
                if self.burn_remaining_current_pack() {
                    self.global_seq += 1;
                }
                self.progress.pick_number = 0;
                self.progress.pack_number += 1;
            }

            events.push(Event::RoundAdvanced {
                pack_number: self.progress.pack_number,
                pick_number: self.current_pick_no(),
            });
            if self.phase() == DraftPhase::Done {
                events.push(Event::DraftCompleted);
            }
        }

        Ok(CommandResult {
            state: self.player_state(seat)?,
            events,
            duplicate: false,
        })
    }

    /// Move one already-picked card between the seat's two zones.
    ///
    /// Follows the same sequence discipline as picks. Legal even after
    /// the draft completes; deck tuning continues past the last pack.
    pub fn move_pick(
        &mut self,
        seat: usize,
        seq: u64,
        card_name: &str,
        from_zone: &str,
        to_zone: &str,
    ) -> Result<CommandResult> {
        if seat >= self.config.seat_count {
            return Err(Error::InvalidSeat);
        }
        if self.check_seq(seat, seq)? {
            return Ok(CommandResult::duplicate_of(self.player_state(seat)?));
        }
        let from = from_zone.parse::<PickZone>()?;
        let to = to_zone.parse::<PickZone>()?;
        if card_name.is_empty() {
            return Err(Error::CardNameRequired);
        }

        // First occurrence wins when the zone holds duplicate names.
        let source = self.seats[seat].picks.zone_mut(from);
        let idx = source
            .iter()
            .position(|card| card == card_name)
            .ok_or(Error::CardNotInZone)?;
        let card = source.remove(idx);
        self.seats[seat].picks.zone_mut(to).push(card);

        self.last_seq_by_seat[seat] = seq;
        self.global_seq += 1;

        Ok(CommandResult {
            state: self.player_state(seat)?,
            events: Vec::new(),
            duplicate: false,
        })
    }

    /// Replace the seat's basic-land counts. Clients always send the
    /// complete map, so the operation is a wholesale swap.
    pub fn set_basics(
        &mut self,
        seat: usize,
        seq: u64,
        basics: BTreeMap<String, u32>,
    ) -> Result<CommandResult> {
        if seat >= self.config.seat_count {
            return Err(Error::InvalidSeat);
        }
        if self.check_seq(seat, seq)? {
            return Ok(CommandResult::duplicate_of(self.player_state(seat)?));
        }

        self.seats[seat].basics = basics;
        self.last_seq_by_seat[seat] = seq;
        self.global_seq += 1;

        Ok(CommandResult {
            state: self.player_state(seat)?,
            events: Vec::new(),
            duplicate: false,
        })
    }
}
