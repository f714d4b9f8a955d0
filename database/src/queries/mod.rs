//! Database query modules

pub mod notifications;
pub mod records;
pub mod settings;

pub use notifications::*;
pub use records::*;
pub use settings::*;
