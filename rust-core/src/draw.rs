// Draw orchestration over an injected store.
// Writes go through one mutex and, for stores shared between processes, the
// store's exclusive section, so draw-number assignment and pool checks never
// observe a concurrent draw half-way.

use crate::config::EngineConfig;
use crate::eligibility::eligible_participants;
use crate::error::DrawError;
use crate::seed::{generate_seed, Seed};
use crate::selector::select_ordered;
use crate::store::DrawStore;
use crate::types::{
    AdminAction, AdminId, Participant, ParticipantId, ParticipantStatus, Winner, WinnerId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

pub const ALGORITHM: &str = "SHA-256 deterministic selection";

#[derive(Clone, Debug)]
pub struct DrawnWinner {
    pub winner_id: WinnerId,
    pub participant: Participant,
}

/// Outcome of one draw. Holds the secret seed; never persist or serialize it whole.
#[derive(Debug)]
pub struct DrawResult {
    pub draw_date: DateTime<Utc>,
    pub seed: Seed,
    pub seed_hash: String,
    pub draw_number: u64,
    pub total_participants: usize,
    /// Eligible pool in the order the selector saw it.
    pub eligible_snapshot: Vec<ParticipantId>,
    /// Selection order.
    pub winners: Vec<DrawnWinner>,
    pub algorithm: &'static str,
}

impl DrawResult {
    pub fn winner_participant_ids(&self) -> Vec<ParticipantId> {
        self.winners.iter().map(|w| w.participant.id).collect()
    }
}

/// Public view of a recorded draw, rebuilt from winner rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawRecord {
    pub draw_number: u64,
    pub seed_hash: String,
    pub draw_date: DateTime<Utc>,
    pub winners: Vec<Winner>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LotteryStatistics {
    pub total_draws: usize,
    pub total_winners: usize,
    pub total_participants: usize,
    pub by_status: BTreeMap<String, usize>,
    pub eligible_participants: usize,
    pub win_rate: f64,
    pub last_draw_date: Option<DateTime<Utc>>,
}

pub struct LotteryEngine<S: DrawStore> {
    store: Mutex<S>,
    max_winners_per_draw: usize,
}

impl<S: DrawStore> LotteryEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, &EngineConfig::default())
    }

    pub fn with_config(store: S, config: &EngineConfig) -> Self {
        Self {
            store: Mutex::new(store),
            max_winners_per_draw: config.max_winners_per_draw,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, S> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read-only access to the underlying store.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lock())
    }

    /// Run `f` inside the store's exclusive section, under the engine mutex.
    pub(crate) fn exclusive<R>(
        &self,
        f: impl FnOnce(&mut S) -> Result<R, DrawError>,
    ) -> Result<R, DrawError> {
        let mut store = self.lock();
        store.begin_exclusive()?;
        let out = f(&mut *store);
        store.end_exclusive();
        out
    }

    pub fn into_store(self) -> S {
        self.store
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_participant(&self, participant: Participant) -> Result<ParticipantId, DrawError> {
        let id = self.exclusive(|store| Ok(store.add_participant(participant)?))?;
        info!(participant = %id, "participant registered");
        Ok(id)
    }

    pub fn update_participant_status(
        &self,
        participant_id: ParticipantId,
        status: ParticipantStatus,
        admin_id: AdminId,
        notes: Option<String>,
    ) -> Result<(), DrawError> {
        self.exclusive(|store| {
            let Some(previous) = store.get_participant(participant_id)? else {
                warn!(participant = %participant_id, "status change for unknown participant");
                return Err(DrawError::ParticipantNotFound(participant_id));
            };
            store.set_participant_status(participant_id, status, notes.clone())?;
            let logged = store.append_admin_log(
                admin_id,
                AdminAction::StatusChange,
                Some(participant_id),
                serde_json::json!({
                    "status": status.as_str(),
                    "notes": notes,
                }),
            );
            if let Err(e) = logged {
                error!(participant = %participant_id, error = %e, "audit write failed; restoring status");
                if let Err(undo) =
                    store.set_participant_status(participant_id, previous.status, previous.admin_notes)
                {
                    error!(participant = %participant_id, error = %undo, "status restore failed");
                }
                return Err(e.into());
            }
            info!(participant = %participant_id, %status, admin_id, "participant status changed");
            Ok(())
        })
    }

    pub fn get_eligible_participants(&self) -> Result<Vec<Participant>, DrawError> {
        Ok(eligible_participants(&*self.lock(), true)?)
    }

    /// Draw `num_winners` from the eligible pool and record them under a new draw number.
    pub fn conduct_lottery(
        &self,
        num_winners: usize,
        exclude_previous: bool,
    ) -> Result<DrawResult, DrawError> {
        self.check_winner_count(num_winners)?;
        self.exclusive(|store| {
            let pool = eligible_participants(&*store, exclude_previous)?;
            run_draw(store, pool, num_winners)
        })
    }

    pub(crate) fn check_winner_count(&self, requested: usize) -> Result<(), DrawError> {
        if requested == 0 || requested > self.max_winners_per_draw {
            return Err(DrawError::InvalidWinnerCount {
                requested,
                max: self.max_winners_per_draw,
            });
        }
        Ok(())
    }

    /// Recorded draws keyed by draw number, winners in insertion order.
    pub fn draw_records(&self) -> Result<Vec<DrawRecord>, DrawError> {
        let winners = self.lock().list_winners()?;
        let mut by_draw: BTreeMap<u64, DrawRecord> = BTreeMap::new();
        for w in winners {
            let record = by_draw.entry(w.draw_number).or_insert_with(|| DrawRecord {
                draw_number: w.draw_number,
                seed_hash: w.seed_hash.clone(),
                draw_date: w.draw_date,
                winners: Vec::new(),
            });
            record.winners.push(w);
        }
        Ok(by_draw.into_values().collect())
    }

    pub fn lottery_statistics(&self) -> Result<LotteryStatistics, DrawError> {
        let store = self.lock();
        let winners = store.list_valid_winners()?;
        let participants = store.list_participants()?;
        let eligible = eligible_participants(&*store, true)?.len();

        let mut by_status = BTreeMap::new();
        for p in &participants {
            *by_status.entry(p.status.as_str().to_string()).or_insert(0) += 1;
        }
        let draws: HashSet<u64> = winners.iter().map(|w| w.draw_number).collect();
        let win_rate = if participants.is_empty() {
            0.0
        } else {
            winners.len() as f64 / participants.len() as f64 * 100.0
        };

        Ok(LotteryStatistics {
            total_draws: draws.len(),
            total_winners: winners.len(),
            total_participants: participants.len(),
            by_status,
            eligible_participants: eligible,
            win_rate,
            last_draw_date: winners.iter().map(|w| w.draw_date).max(),
        })
    }
}

/// Select from `pool` and persist. Caller holds the store's exclusive section.
/// Every row and the returned result carry the same `draw_date`.
/// On a failed insert the rows already written for this draw are removed again.
pub(crate) fn run_draw<S: DrawStore + ?Sized>(
    store: &mut S,
    pool: Vec<Participant>,
    num_winners: usize,
) -> Result<DrawResult, DrawError> {
    if pool.is_empty() {
        warn!(requested = num_winners, "draw refused: empty pool");
        return Err(DrawError::NoEligibleParticipants);
    }
    if num_winners > pool.len() {
        warn!(requested = num_winners, available = pool.len(), "draw refused: pool too small");
        return Err(DrawError::InsufficientParticipants {
            requested: num_winners,
            available: pool.len(),
        });
    }

    let (seed, seed_hash) = generate_seed()?;
    let draw_date = Utc::now();
    let draw_number = store.last_draw_number()? + 1;
    info!(%seed_hash, draw_number, pool = pool.len(), "seed committed");

    let eligible_snapshot: Vec<ParticipantId> = pool.iter().map(|p| p.id).collect();
    let by_id: HashMap<ParticipantId, &Participant> = pool.iter().map(|p| (p.id, p)).collect();
    let picked = select_ordered(seed.expose(), &eligible_snapshot, num_winners);

    let mut winners: Vec<DrawnWinner> = Vec::with_capacity(picked.len());
    for (i, participant_id) in picked.iter().enumerate() {
        match store.insert_winner(*participant_id, &seed_hash, draw_number, draw_date) {
            Ok(winner_id) => {
                info!(draw_number, position = i + 1, participant = %participant_id, winner = %winner_id, "winner selected");
                winners.push(DrawnWinner {
                    winner_id,
                    participant: (*by_id[participant_id]).clone(),
                });
            }
            Err(e) => {
                error!(draw_number, error = %e, "persisting draw failed; rolling back");
                for w in &winners {
                    if let Err(undo) = store.delete_winner_row(w.winner_id) {
                        error!(winner = %w.winner_id, error = %undo, "rollback of winner row failed");
                    }
                }
                return Err(e.into());
            }
        }
    }

    info!(
        draw_number,
        winners = winners.len(),
        total = pool.len(),
        "draw completed"
    );

    Ok(DrawResult {
        draw_date,
        seed,
        seed_hash,
        draw_number,
        total_participants: pool.len(),
        eligible_snapshot,
        winners,
        algorithm: ALGORITHM,
    })
}
