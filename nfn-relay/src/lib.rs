use log::info;

pub mod aging;
pub mod computation;
pub mod config;
pub mod content_store;
pub mod engine;
pub mod error;
pub mod face;
pub mod fib;
pub mod management;
pub mod matcher;
pub mod nonce;
pub mod pit;

pub use aging::AgingReport;
pub use config::RelayConfig;
pub use content_store::{ContentFlags, ContentStore, CsEntry, PutOutcome};
pub use engine::{ContentOutcome, InterestOutcome, Relay, RelayStats};
pub use error::{ComputationError, RelayError};
pub use face::{Face, FaceFlags, FaceId, FaceTable, Outbound, Pacer, PeerAddr};
pub use fib::{FibEntry, ForwardingTable};
pub use management::{ManagementCommand, ManagementReply};
pub use matcher::MatchMode;
pub use nonce::NonceTable;
pub use pit::{PendingInterestTable, PendingRequester, PitEntry, PitId, Requester};

// Computation exports
pub use computation::{parse_term, ComputationEngine, ConfigId, Configuration, Progress, Term, Value};

pub fn init() {
    info!("NFN relay initialized");
}
