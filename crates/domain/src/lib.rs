pub mod action;
pub mod errors;
pub mod events;
pub mod identity;
pub mod todo;

pub use action::*;
pub use errors::*;
pub use events::*;
pub use identity::*;
pub use todo::*;
