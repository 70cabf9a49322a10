pub mod autorun;
pub mod codespace_secret;
pub mod dap;
pub mod launch_json;
pub mod mcp_json;
pub mod run;

pub(crate) const USER_CANCELLED: &str = "Operation cancelled by user";
