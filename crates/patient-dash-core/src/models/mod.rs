//! Domain models for the patient dashboard.

mod patient;
mod session;
mod view;

pub use patient::*;
pub use session::*;
pub use view::*;
