pub mod config;
pub mod encoder;
pub mod messages;
pub mod monitor;
pub mod motor;
pub mod receiver;
pub mod runtime;
pub mod shutdown;
pub mod state;
pub mod supervisor;
