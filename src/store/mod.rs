pub mod descriptor_store;
pub mod process;
pub mod scratch;
pub mod traits;
pub mod upstream;

pub use descriptor_store::*;
pub use process::*;
pub use scratch::*;
pub use traits::*;
pub use upstream::*;
