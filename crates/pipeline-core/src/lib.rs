pub mod error;
pub mod table;
pub mod types;

pub use error::*;
pub use table::*;
pub use types::*;
