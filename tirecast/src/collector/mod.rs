//! Session recording and pit-stop ground truth capture.
//!
//! The [`DataCollector`] runs on every telemetry tick but only keeps a
//! sample at a low fixed rate. Pit detection runs on every tick so a short
//! stop is never missed.
//!
//! # Pit state machine
//!
//! ```text
//!              in_pit & moving            in_pit & stationary
//!   OnTrack ───────────────────► Approaching ───────────────► InPit
//!      ▲  │                          │                          │
//!      │  └──── in_pit & stationary ─┼─────────────────────────►│
//!      │                             │ !in_pit                  │ !in_pit
//!      └─────────────────────────────┴──────────────────────────┘
//! ```
//!
//! Ground truth is captured once per entry into `InPit`, from the first
//! tick that carries measured temperatures.
//!
//! # On-disk layout
//!
//! ```text
//! sessions/
//! ├── active/                          in-progress segments (collector owned)
//! │   └── gt3.spa.race-1.0003.tsr
//! ├── gt3.spa.race-1.0000.tsr          finished segments (storage owned)
//! └── gt3.spa.race-1.0001.tsr
//! ```

mod data_collector;
mod pit;
mod record;
mod store;

pub use data_collector::{
    CollectorConfig, CollectorError, DataCollector, FinishedSession, TickOutcome,
    DEFAULT_FLUSH_THRESHOLD, DEFAULT_SAMPLE_INTERVAL_SECS,
};
pub use pit::{PitDetector, PitState};
pub use record::{RecordId, SessionRecord};
pub use store::{
    sanitize_name, unique_file_stem, SessionKey, SessionStore, StoredSession, ACTIVE_DIR,
};
