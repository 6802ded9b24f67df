pub mod commands;
pub mod filter_expr;
mod init;

pub use init::init_tracing;
