//! Process-wide constants grouped by concern.
mod gas;
pub use gas::*;

mod safe;
pub use safe::*;

mod worker;
pub use worker::*;

mod repository;
pub use repository::*;
