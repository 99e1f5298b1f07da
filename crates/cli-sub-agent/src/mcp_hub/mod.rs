pub(crate) mod config;
pub(crate) mod proxy;
pub(crate) mod registry;
pub(crate) mod serve;
pub(crate) mod socket;

pub(crate) use serve::{handle_serve_command, handle_status_command, handle_stop_command};
