//! Smart door data model

pub mod access;
pub mod decision;
pub mod door;
pub mod event;
pub mod principal;
pub mod receipt;

pub use access::*;
pub use decision::*;
pub use door::*;
pub use event::*;
pub use principal::*;
pub use receipt::*;
