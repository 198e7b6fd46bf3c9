pub mod factory;
pub mod gossip;
pub mod local;
pub mod terraform;

mod command;

pub use factory::create_provisioner;
