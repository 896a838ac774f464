// Winner ledger operations: invalidate, delete, reroll.
// Rows are never edited beyond `is_valid`; every effective change leaves an audit entry.

use crate::draw::{run_draw, DrawResult, LotteryEngine};
use crate::eligibility::eligible_participants;
use crate::error::DrawError;
use crate::store::DrawStore;
use crate::types::{AdminAction, AdminId, Winner, WinnerId};
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidateOutcome {
    Invalidated,
    /// Row was already invalid; nothing changed and nothing was logged.
    AlreadyInvalid,
}

#[derive(Debug)]
pub struct RerollOutcome {
    /// The replaced row, now invalid.
    pub replaced: Winner,
    /// Replacement draw: one winner, its own seed and draw number.
    pub replacement: DrawResult,
}

impl<S: DrawStore> LotteryEngine<S> {
    pub fn invalidate_winner(
        &self,
        winner_id: WinnerId,
        admin_id: AdminId,
        reason: &str,
    ) -> Result<InvalidateOutcome, DrawError> {
        self.exclusive(|store| {
            let winner = store
                .get_winner(winner_id)?
                .ok_or(DrawError::WinnerNotFound(winner_id))?;
            if !winner.is_valid {
                info!(winner = %winner_id, "winner already invalid");
                return Ok(InvalidateOutcome::AlreadyInvalid);
            }

            store.set_winner_validity(winner_id, false)?;
            let logged = store.append_admin_log(
                admin_id,
                AdminAction::InvalidateWinner,
                Some(winner_id),
                serde_json::json!({
                    "reason": reason,
                    "participant_id": winner.participant_id,
                    "draw_number": winner.draw_number,
                    "seed_hash": winner.seed_hash,
                }),
            );
            if let Err(e) = logged {
                error!(winner = %winner_id, error = %e, "audit write failed; invalidation reverted");
                restore_validity(store, winner_id);
                return Err(e.into());
            }
            info!(winner = %winner_id, admin_id, draw_number = winner.draw_number, "winner invalidated");
            Ok(InvalidateOutcome::Invalidated)
        })
    }

    /// Remove the row permanently. Its full content is kept in the audit entry.
    pub fn delete_winner(&self, winner_id: WinnerId, admin_id: AdminId) -> Result<Winner, DrawError> {
        self.exclusive(|store| {
            let Some(winner) = store.get_winner(winner_id)? else {
                warn!(winner = %winner_id, "delete of unknown winner");
                return Err(DrawError::WinnerNotFound(winner_id));
            };

            let snapshot = serde_json::to_value(&winner)
                .map_err(|e| DrawError::Store(e.into()))?;
            store.append_admin_log(
                admin_id,
                AdminAction::DeleteWinner,
                Some(winner_id),
                serde_json::json!({ "deleted": snapshot }),
            )?;
            if !store.delete_winner_row(winner_id)? {
                return Err(DrawError::WinnerNotFound(winner_id));
            }
            info!(winner = %winner_id, admin_id, "winner deleted");
            Ok(winner)
        })
    }

    /// Invalidate a valid winner and draw one replacement under a fresh seed and
    /// a new draw number. The replaced participant is left out of the replacement
    /// pool but may win again in later draws.
    ///
    /// All or nothing: if the replacement or its audit entry cannot be written,
    /// the replacement rows are removed and the original row is valid again.
    pub fn reroll_winner(
        &self,
        winner_id: WinnerId,
        admin_id: AdminId,
        reason: &str,
    ) -> Result<RerollOutcome, DrawError> {
        self.exclusive(|store| {
            let winner = store
                .get_winner(winner_id)?
                .ok_or(DrawError::WinnerNotFound(winner_id))?;
            if !winner.is_valid {
                warn!(winner = %winner_id, "reroll of invalid winner refused");
                return Err(DrawError::WinnerAlreadyInvalid(winner_id));
            }

            // Pool is checked before anything is written.
            let pool: Vec<_> = eligible_participants(&*store, true)?
                .into_iter()
                .filter(|p| p.id != winner.participant_id)
                .collect();
            if pool.is_empty() {
                warn!(winner = %winner_id, "reroll refused: no replacement available");
                return Err(DrawError::NoEligibleParticipants);
            }

            store.set_winner_validity(winner_id, false)?;
            let replacement = match run_draw(store, pool, 1) {
                Ok(r) => r,
                Err(e) => {
                    restore_validity(store, winner_id);
                    return Err(e);
                }
            };

            let new_winner = &replacement.winners[0];
            let logged = store.append_admin_log(
                admin_id,
                AdminAction::RerollWinner,
                Some(winner_id),
                serde_json::json!({
                    "reason": reason,
                    "replaced_participant_id": winner.participant_id,
                    "original_draw_number": winner.draw_number,
                    "original_seed_hash": winner.seed_hash,
                    "new_winner_id": new_winner.winner_id,
                    "new_participant_id": new_winner.participant.id,
                    "new_draw_number": replacement.draw_number,
                    "new_seed_hash": replacement.seed_hash,
                }),
            );
            if let Err(e) = logged {
                error!(winner = %winner_id, error = %e, "audit write failed; reroll reverted");
                for w in &replacement.winners {
                    if let Err(undo) = store.delete_winner_row(w.winner_id) {
                        error!(winner = %w.winner_id, error = %undo, "rollback of replacement row failed");
                    }
                }
                restore_validity(store, winner_id);
                return Err(e.into());
            }
            info!(
                winner = %winner_id,
                replacement = %new_winner.winner_id,
                draw_number = replacement.draw_number,
                admin_id,
                "winner rerolled"
            );

            let mut replaced = winner;
            replaced.is_valid = false;
            Ok(RerollOutcome {
                replaced,
                replacement,
            })
        })
    }
}

fn restore_validity<S: DrawStore + ?Sized>(store: &mut S, winner_id: WinnerId) {
    if let Err(e) = store.set_winner_validity(winner_id, true) {
        error!(winner = %winner_id, error = %e, "restoring winner validity failed");
    }
}
