pub mod batch;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use batch::*;
pub use memory::*;
pub use postgres::*;
pub use traits::*;
