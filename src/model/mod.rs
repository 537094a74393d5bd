pub mod descriptor;
pub mod listing;
pub mod operation;
pub mod reference;

pub use descriptor::*;
pub use listing::*;
pub use operation::*;
pub use reference::*;
