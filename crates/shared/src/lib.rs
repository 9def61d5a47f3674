pub mod domain;
pub mod error;
pub mod protocol;
pub mod stats;
pub mod status;
