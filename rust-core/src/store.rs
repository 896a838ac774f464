// Data-access contract of the draw engine plus two implementations:
// in-memory (tests, embedding) and a JSON snapshot file shared by operator processes.
// Every call is atomic on its own; calls that must group run inside an exclusive section.

use crate::error::StoreError;
use crate::types::{
    AdminAction, AdminId, AdminLogEntry, AdminLogId, Participant, ParticipantId,
    ParticipantStatus, Winner, WinnerId,
};
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub trait DrawStore {
    /// Enter a section no other writer on the same ledger can interleave with,
    /// including writers in other processes. Reads inside it see a fresh state.
    fn begin_exclusive(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn end_exclusive(&mut self) {}

    /// All participants in registration order.
    fn list_participants(&self) -> Result<Vec<Participant>, StoreError>;

    fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError>;

    /// Approved participants in registration order.
    fn list_approved_participants(&self) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .list_participants()?
            .into_iter()
            .filter(Participant::is_approved)
            .collect())
    }

    fn add_participant(&mut self, participant: Participant) -> Result<ParticipantId, StoreError>;

    fn set_participant_status(
        &mut self,
        id: ParticipantId,
        status: ParticipantStatus,
        notes: Option<String>,
    ) -> Result<bool, StoreError>;

    /// Every winner row, valid or not, in insertion order.
    fn list_winners(&self) -> Result<Vec<Winner>, StoreError>;

    fn list_valid_winners(&self) -> Result<Vec<Winner>, StoreError> {
        Ok(self
            .list_winners()?
            .into_iter()
            .filter(|w| w.is_valid)
            .collect())
    }

    fn get_winner(&self, id: WinnerId) -> Result<Option<Winner>, StoreError>;

    /// Highest draw number ever inserted, 0 before the first draw.
    /// Not lowered when rows are deleted.
    fn last_draw_number(&self) -> Result<u64, StoreError>;

    /// `draw_date` is shared by every row of one draw.
    fn insert_winner(
        &mut self,
        participant_id: ParticipantId,
        seed_hash: &str,
        draw_number: u64,
        draw_date: DateTime<Utc>,
    ) -> Result<WinnerId, StoreError>;

    fn set_winner_validity(&mut self, id: WinnerId, is_valid: bool) -> Result<bool, StoreError>;

    fn delete_winner_row(&mut self, id: WinnerId) -> Result<bool, StoreError>;

    fn append_admin_log(
        &mut self,
        admin_id: AdminId,
        action: AdminAction,
        target_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<AdminLogId, StoreError>;

    fn admin_log(&self) -> Result<Vec<AdminLogEntry>, StoreError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub participants: Vec<Participant>,
    pub winners: Vec<Winner>,
    pub admin_log: Vec<AdminLogEntry>,
    #[serde(default)]
    pub last_draw_number: u64,
}

#[derive(Clone, Debug)]
pub struct MemoryStore {
    state: LedgerState,
    max_participants: usize,
}

impl MemoryStore {
    pub fn new(max_participants: usize) -> Self {
        Self::from_state(LedgerState::default(), max_participants)
    }

    pub fn from_state(state: LedgerState, max_participants: usize) -> Self {
        Self {
            state,
            max_participants,
        }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_PARTICIPANTS)
    }
}

impl DrawStore for MemoryStore {
    fn list_participants(&self) -> Result<Vec<Participant>, StoreError> {
        Ok(self.state.participants.clone())
    }

    fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        Ok(self.state.participants.iter().find(|p| p.id == id).cloned())
    }

    fn add_participant(&mut self, participant: Participant) -> Result<ParticipantId, StoreError> {
        if self.state.participants.len() >= self.max_participants {
            return Err(StoreError::ParticipantLimit(self.max_participants));
        }
        let id = participant.id;
        self.state.participants.push(participant);
        Ok(id)
    }

    fn set_participant_status(
        &mut self,
        id: ParticipantId,
        status: ParticipantStatus,
        notes: Option<String>,
    ) -> Result<bool, StoreError> {
        match self.state.participants.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.status = status;
                p.admin_notes = notes;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_winners(&self) -> Result<Vec<Winner>, StoreError> {
        Ok(self.state.winners.clone())
    }

    fn get_winner(&self, id: WinnerId) -> Result<Option<Winner>, StoreError> {
        Ok(self.state.winners.iter().find(|w| w.id == id).cloned())
    }

    fn last_draw_number(&self) -> Result<u64, StoreError> {
        Ok(self.state.last_draw_number)
    }

    fn insert_winner(
        &mut self,
        participant_id: ParticipantId,
        seed_hash: &str,
        draw_number: u64,
        draw_date: DateTime<Utc>,
    ) -> Result<WinnerId, StoreError> {
        if !self.state.participants.iter().any(|p| p.id == participant_id) {
            return Err(StoreError::UnknownParticipant(participant_id));
        }
        let winner = Winner {
            id: Uuid::new_v4(),
            participant_id,
            draw_date,
            seed_hash: seed_hash.to_string(),
            draw_number,
            is_valid: true,
        };
        let id = winner.id;
        self.state.winners.push(winner);
        self.state.last_draw_number = self.state.last_draw_number.max(draw_number);
        Ok(id)
    }

    fn set_winner_validity(&mut self, id: WinnerId, is_valid: bool) -> Result<bool, StoreError> {
        match self.state.winners.iter_mut().find(|w| w.id == id) {
            Some(w) => {
                w.is_valid = is_valid;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_winner_row(&mut self, id: WinnerId) -> Result<bool, StoreError> {
        let before = self.state.winners.len();
        self.state.winners.retain(|w| w.id != id);
        Ok(self.state.winners.len() != before)
    }

    fn append_admin_log(
        &mut self,
        admin_id: AdminId,
        action: AdminAction,
        target_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<AdminLogId, StoreError> {
        let entry = AdminLogEntry {
            id: Uuid::new_v4(),
            admin_id,
            action,
            target_id,
            timestamp: Utc::now(),
            details,
        };
        let id = entry.id;
        self.state.admin_log.push(entry);
        Ok(id)
    }

    fn admin_log(&self) -> Result<Vec<AdminLogEntry>, StoreError> {
        Ok(self.state.admin_log.clone())
    }
}

/// `MemoryStore` persisted to `<data_dir>/fairdraw_ledger.json` after every write.
/// Writes go to a temp file first and are renamed into place.
///
/// Several handles (also in separate processes) may share one data dir. They
/// coordinate through an advisory lock on `<data_dir>/fairdraw_ledger.lock`:
/// every write reloads the file under the exclusive lock before applying, and
/// reads outside an exclusive section reload under the shared lock.
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    max_participants: usize,
    inner: MemoryStore,
    held: Option<File>,
}

impl JsonFileStore {
    pub const FILE_NAME: &'static str = "fairdraw_ledger.json";
    pub const LOCK_FILE_NAME: &'static str = "fairdraw_ledger.lock";

    pub fn open<P: AsRef<Path>>(data_dir: P, max_participants: usize) -> Result<Self, StoreError> {
        fs::create_dir_all(&data_dir)?;
        let mut store = Self {
            path: data_dir.as_ref().join(Self::FILE_NAME),
            lock_path: data_dir.as_ref().join(Self::LOCK_FILE_NAME),
            max_participants,
            inner: MemoryStore::new(max_participants),
            held: None,
        };
        let lock = store.lock_file()?;
        FileExt::lock_shared(&lock)?;
        store.inner = store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> Result<File, StoreError> {
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?)
    }

    /// Caller holds the lock file, shared or exclusive.
    fn load(&self) -> Result<MemoryStore, StoreError> {
        let state = if self.path.exists() {
            let data = fs::read(&self.path)?;
            serde_json::from_slice::<LedgerState>(&data)?
        } else {
            LedgerState::default()
        };
        Ok(MemoryStore::from_state(state, self.max_participants))
    }

    /// The state reads run against: in-memory inside an exclusive section,
    /// otherwise whatever is on disk now.
    fn view(&self) -> Result<Cow<'_, MemoryStore>, StoreError> {
        if self.held.is_some() {
            return Ok(Cow::Borrowed(&self.inner));
        }
        let lock = self.lock_file()?;
        FileExt::lock_shared(&lock)?;
        Ok(Cow::Owned(self.load()?))
    }

    fn save(&self, state: &LedgerState) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Apply a write to a copy of the current ledger, persist it, then swap it in.
    fn commit<R>(
        &mut self,
        f: impl FnOnce(&mut MemoryStore) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        // Lone write: lock and reload for its duration only.
        let _lock = match self.held {
            Some(_) => None,
            None => {
                let lock = self.lock_file()?;
                FileExt::lock_exclusive(&lock)?;
                self.inner = self.load()?;
                Some(lock)
            }
        };
        let mut next = self.inner.clone();
        let out = f(&mut next)?;
        self.save(next.state())?;
        self.inner = next;
        Ok(out)
    }
}

impl DrawStore for JsonFileStore {
    fn begin_exclusive(&mut self) -> Result<(), StoreError> {
        if self.held.is_some() {
            return Ok(());
        }
        let lock = self.lock_file()?;
        FileExt::lock_exclusive(&lock)?;
        self.inner = self.load()?;
        self.held = Some(lock);
        Ok(())
    }

    fn end_exclusive(&mut self) {
        if let Some(lock) = self.held.take() {
            if let Err(e) = FileExt::unlock(&lock) {
                tracing::warn!(error = %e, "ledger unlock failed; released on close");
            }
        }
    }

    fn list_participants(&self) -> Result<Vec<Participant>, StoreError> {
        self.view()?.list_participants()
    }

    fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        self.view()?.get_participant(id)
    }

    fn add_participant(&mut self, participant: Participant) -> Result<ParticipantId, StoreError> {
        self.commit(|s| s.add_participant(participant))
    }

    fn set_participant_status(
        &mut self,
        id: ParticipantId,
        status: ParticipantStatus,
        notes: Option<String>,
    ) -> Result<bool, StoreError> {
        self.commit(|s| s.set_participant_status(id, status, notes))
    }

    fn list_winners(&self) -> Result<Vec<Winner>, StoreError> {
        self.view()?.list_winners()
    }

    fn get_winner(&self, id: WinnerId) -> Result<Option<Winner>, StoreError> {
        self.view()?.get_winner(id)
    }

    fn last_draw_number(&self) -> Result<u64, StoreError> {
        self.view()?.last_draw_number()
    }

    fn insert_winner(
        &mut self,
        participant_id: ParticipantId,
        seed_hash: &str,
        draw_number: u64,
        draw_date: DateTime<Utc>,
    ) -> Result<WinnerId, StoreError> {
        self.commit(|s| s.insert_winner(participant_id, seed_hash, draw_number, draw_date))
    }

    fn set_winner_validity(&mut self, id: WinnerId, is_valid: bool) -> Result<bool, StoreError> {
        self.commit(|s| s.set_winner_validity(id, is_valid))
    }

    fn delete_winner_row(&mut self, id: WinnerId) -> Result<bool, StoreError> {
        self.commit(|s| s.delete_winner_row(id))
    }

    fn append_admin_log(
        &mut self,
        admin_id: AdminId,
        action: AdminAction,
        target_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<AdminLogId, StoreError> {
        self.commit(|s| s.append_admin_log(admin_id, action, target_id, details))
    }

    fn admin_log(&self) -> Result<Vec<AdminLogEntry>, StoreError> {
        self.view()?.admin_log()
    }
}

/// `MemoryStore` that fails chosen writes, for rollback tests.
#[cfg(test)]
pub(crate) struct FaultyStore {
    pub inner: MemoryStore,
    /// 1-based index of the `insert_winner` call that fails.
    pub fail_insert_at: Option<usize>,
    pub inserts: usize,
    pub fail_log: Option<AdminAction>,
}

#[cfg(test)]
impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_insert_at: None,
            inserts: 0,
            fail_log: None,
        }
    }
}

#[cfg(test)]
impl DrawStore for FaultyStore {
    fn list_participants(&self) -> Result<Vec<Participant>, StoreError> {
        self.inner.list_participants()
    }

    fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        self.inner.get_participant(id)
    }

    fn add_participant(&mut self, participant: Participant) -> Result<ParticipantId, StoreError> {
        self.inner.add_participant(participant)
    }

    fn set_participant_status(
        &mut self,
        id: ParticipantId,
        status: ParticipantStatus,
        notes: Option<String>,
    ) -> Result<bool, StoreError> {
        self.inner.set_participant_status(id, status, notes)
    }

    fn list_winners(&self) -> Result<Vec<Winner>, StoreError> {
        self.inner.list_winners()
    }

    fn get_winner(&self, id: WinnerId) -> Result<Option<Winner>, StoreError> {
        self.inner.get_winner(id)
    }

    fn last_draw_number(&self) -> Result<u64, StoreError> {
        self.inner.last_draw_number()
    }

    fn insert_winner(
        &mut self,
        participant_id: ParticipantId,
        seed_hash: &str,
        draw_number: u64,
        draw_date: DateTime<Utc>,
    ) -> Result<WinnerId, StoreError> {
        self.inserts += 1;
        if self.fail_insert_at == Some(self.inserts) {
            return Err(StoreError::Io("disk full".into()));
        }
        self.inner
            .insert_winner(participant_id, seed_hash, draw_number, draw_date)
    }

    fn set_winner_validity(&mut self, id: WinnerId, is_valid: bool) -> Result<bool, StoreError> {
        self.inner.set_winner_validity(id, is_valid)
    }

    fn delete_winner_row(&mut self, id: WinnerId) -> Result<bool, StoreError> {
        self.inner.delete_winner_row(id)
    }

    fn append_admin_log(
        &mut self,
        admin_id: AdminId,
        action: AdminAction,
        target_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<AdminLogId, StoreError> {
        if self.fail_log == Some(action) {
            return Err(StoreError::Io("audit log unavailable".into()));
        }
        self.inner
            .append_admin_log(admin_id, action, target_id, details)
    }

    fn admin_log(&self) -> Result<Vec<AdminLogEntry>, StoreError> {
        self.inner.admin_log()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approved(name: &str) -> Participant {
        let mut p = Participant::new(name, "+70000000000", "00000000");
        p.status = ParticipantStatus::Approved;
        p
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("fairdraw-store-{}", Uuid::new_v4()))
    }

    #[test]
    fn approved_list_keeps_registration_order() {
        let mut store = MemoryStore::new(10);
        let a = store.add_participant(approved("a")).unwrap();
        store
            .add_participant(Participant::new("pending", "+7", "1"))
            .unwrap();
        let c = store.add_participant(approved("c")).unwrap();
        let ids: Vec<_> = store
            .list_approved_participants()
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn participant_limit_enforced() {
        let mut store = MemoryStore::new(1);
        store.add_participant(approved("a")).unwrap();
        assert!(matches!(
            store.add_participant(approved("b")),
            Err(StoreError::ParticipantLimit(1))
        ));
    }

    #[test]
    fn high_water_mark_survives_delete() {
        let mut store = MemoryStore::new(10);
        let p = store.add_participant(approved("a")).unwrap();
        let w = store.insert_winner(p, "h", 4, Utc::now()).unwrap();
        assert!(store.delete_winner_row(w).unwrap());
        assert_eq!(store.last_draw_number().unwrap(), 4);
        assert!(!store.delete_winner_row(w).unwrap());
    }

    #[test]
    fn insert_winner_requires_known_participant() {
        let mut store = MemoryStore::new(10);
        assert!(matches!(
            store.insert_winner(Uuid::new_v4(), "h", 1, Utc::now()),
            Err(StoreError::UnknownParticipant(_))
        ));
    }

    #[test]
    fn insert_winner_keeps_given_draw_date() {
        let mut store = MemoryStore::new(10);
        let p = store.add_participant(approved("a")).unwrap();
        let at = Utc::now() - chrono::Duration::hours(3);
        let w = store.insert_winner(p, "h", 1, at).unwrap();
        assert_eq!(store.get_winner(w).unwrap().unwrap().draw_date, at);
    }

    #[test]
    fn valid_winners_excludes_invalidated() {
        let mut store = MemoryStore::new(10);
        let p = store.add_participant(approved("a")).unwrap();
        let w = store.insert_winner(p, "h", 1, Utc::now()).unwrap();
        assert_eq!(store.list_valid_winners().unwrap().len(), 1);
        assert!(store.set_winner_validity(w, false).unwrap());
        assert!(store.list_valid_winners().unwrap().is_empty());
        assert_eq!(store.list_winners().unwrap().len(), 1);
    }

    #[test]
    fn json_store_round_trips_through_disk() {
        let dir = temp_dir();
        let pid;
        {
            let mut store = JsonFileStore::open(&dir, 10).unwrap();
            pid = store.add_participant(approved("a")).unwrap();
            store.insert_winner(pid, "abc", 1, Utc::now()).unwrap();
            store
                .append_admin_log(7, AdminAction::StatusChange, Some(pid), serde_json::json!({}))
                .unwrap();
        }
        let store = JsonFileStore::open(&dir, 10).unwrap();
        assert_eq!(store.list_participants().unwrap()[0].id, pid);
        assert_eq!(store.list_valid_winners().unwrap()[0].seed_hash, "abc");
        assert_eq!(store.last_draw_number().unwrap(), 1);
        assert_eq!(store.admin_log().unwrap().len(), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_store_failed_write_leaves_state() {
        let dir = temp_dir();
        let mut store = JsonFileStore::open(&dir, 10).unwrap();
        assert!(store.insert_winner(Uuid::new_v4(), "h", 1, Utc::now()).is_err());
        assert!(store.list_winners().unwrap().is_empty());
        assert_eq!(store.last_draw_number().unwrap(), 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_handles_on_one_dir_see_each_others_writes() {
        let dir = temp_dir();
        let mut a = JsonFileStore::open(&dir, 10).unwrap();
        let mut b = JsonFileStore::open(&dir, 10).unwrap();

        let pa = a.add_participant(approved("a")).unwrap();
        let pb = b.add_participant(approved("b")).unwrap();
        a.insert_winner(pa, "first", 1, Utc::now()).unwrap();
        // b opened before a's writes; a stale b would lose them here
        b.insert_winner(pb, "second", 2, Utc::now()).unwrap();

        let reopened = JsonFileStore::open(&dir, 10).unwrap();
        assert_eq!(reopened.list_participants().unwrap().len(), 2);
        let hashes: Vec<_> = reopened
            .list_winners()
            .unwrap()
            .into_iter()
            .map(|w| w.seed_hash)
            .collect();
        assert_eq!(hashes, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(a.list_winners().unwrap().len(), 2);
        assert_eq!(a.last_draw_number().unwrap(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn exclusive_section_reloads_and_reads_in_memory() {
        let dir = temp_dir();
        let mut a = JsonFileStore::open(&dir, 10).unwrap();
        let mut b = JsonFileStore::open(&dir, 10).unwrap();
        b.add_participant(approved("b")).unwrap();

        a.begin_exclusive().unwrap();
        assert_eq!(a.list_participants().unwrap().len(), 1);
        a.add_participant(approved("a")).unwrap();
        a.end_exclusive();

        assert_eq!(b.list_participants().unwrap().len(), 2);
        let _ = fs::remove_dir_all(&dir);
    }
}
