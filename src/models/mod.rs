// Re-export all model types for ease of use

pub mod employee;
pub mod photo;
pub mod storage;
pub mod responses;

pub use employee::*;
pub use photo::*;
pub use storage::*;
pub use responses::*;
