// Eligible pool = approved participants without a valid winner row.
// Read-only; order follows the store's registration order, which the selector depends on.

use crate::error::StoreError;
use crate::store::DrawStore;
use crate::types::{Participant, ParticipantId};
use std::collections::HashSet;
use tracing::debug;

pub fn eligible_participants<S: DrawStore + ?Sized>(
    store: &S,
    exclude_previous: bool,
) -> Result<Vec<Participant>, StoreError> {
    let approved = store.list_approved_participants()?;
    if !exclude_previous {
        return Ok(approved);
    }
    let holding: HashSet<ParticipantId> = store
        .list_valid_winners()?
        .into_iter()
        .map(|w| w.participant_id)
        .collect();
    let eligible: Vec<Participant> = approved
        .into_iter()
        .filter(|p| !holding.contains(&p.id))
        .collect();
    debug!(eligible = eligible.len(), "resolved eligible pool");
    Ok(eligible)
}
