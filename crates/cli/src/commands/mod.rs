pub mod config_cmd;
pub mod memory;
pub mod onboard;
pub mod run;
