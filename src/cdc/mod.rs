pub mod decoder;
pub mod types;


pub use decoder::decode;
pub use types::*;
