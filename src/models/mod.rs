pub mod endpoint;
pub mod node;

pub use endpoint::*;
pub use node::*;
