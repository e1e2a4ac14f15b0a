/// Session lifecycle: domain model, persistence interface and backends, and
/// the engine orchestrating login, rotation, reuse detection, and revocation.

pub mod engine;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use engine::{ClientHints, SessionEngine};
pub use memory::MemoryStore;
pub use model::{
    Event, EventKind, NewEvent, NewSession, RefreshRotation, RequestMeta, RotationRecord, Session,
    SessionFamily, TokenBundle, User, UserSummary,
};
pub use postgres::PgSessionStore;
pub use store::SessionStore;
