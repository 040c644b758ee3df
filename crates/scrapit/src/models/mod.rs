//! Domain models for ScrapIt entities

mod email;
mod run;
mod sender;
mod task;
mod user;

pub use email::{Category, Classification, EmailRecord, EmailRecordBuilder, GmailId};
pub use run::{RunPhase, SyncRun, SyncStats};
pub use sender::{FlagKind, RiskTier, SenderFlag};
pub use task::{EmailAction, Task, TaskKind, TaskStatus, TaskStep};
pub use user::User;
