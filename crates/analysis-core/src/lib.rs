pub mod error;
pub mod geometry;
pub mod traits;
pub mod types;

pub use error::*;
pub use geometry::*;
pub use traits::*;
pub use types::*;
