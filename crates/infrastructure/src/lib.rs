pub mod abi;
pub mod eip1193;
pub mod gateway;
pub mod memory;

pub use eip1193::*;
pub use gateway::*;
pub use memory::*;
