pub mod schema;
pub mod names;
pub mod reconstruct;

pub use schema::*;
pub use names::*;
pub use reconstruct::*;
