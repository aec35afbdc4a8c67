//! Session-held models.

pub mod notice;
pub mod session;

pub use notice::{Notice, NoticeLevel};
pub use session::{CurrentUser, UserSummary, keys as session_keys};
