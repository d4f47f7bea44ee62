pub mod rpc;
pub mod system;
