// Prize draw engine: commit to a seed hash, draw winners deterministically from the
// seed, let anyone replay the draw once the seed is disclosed.

pub mod config;
pub mod draw;
pub mod eligibility;
pub mod error;
#[cfg(feature = "server")]
pub mod http;
pub mod ledger;
pub mod seed;
pub mod selector;
pub mod store;
pub mod types;
pub mod verify;

pub use draw::{DrawResult, LotteryEngine, ALGORITHM};
pub use error::{DrawError, EntropyError, StoreError};
pub use store::{DrawStore, JsonFileStore, MemoryStore};
pub use verify::{create_public_proof, signed_public_proof, verify_lottery_result, PublicProof};

/*
Persistence, registration and the admin UI are collaborators:
- the engine talks to them only through `DrawStore`
- no global state; the store is injected into `LotteryEngine`
- the secret seed lives only in `DrawResult` and is wiped when dropped
*/
