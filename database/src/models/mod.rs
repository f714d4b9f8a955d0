// Database models

pub mod notification;
pub mod record;
pub mod setting;

pub use notification::*;
pub use record::*;
pub use setting::*;
