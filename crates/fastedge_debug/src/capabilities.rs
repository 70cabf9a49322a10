use dap::types::Capabilities;

/// Capabilities advertised in the `initialize` response.
///
/// The adapter only runs the compiled binary, it can not pause or inspect it,
/// so only the breakpoint bookkeeping and lifecycle requests are enabled.
pub trait FastEdgeCapabilities {
    fn fastedge() -> Self;
}

impl FastEdgeCapabilities for Capabilities {
    fn fastedge() -> Self {
        Capabilities {
            supports_breakpoint_locations_request: Some(true),
            supports_cancel_request: Some(false),
            supports_completions_request: Some(false),
            supports_configuration_done_request: Some(true),
            supports_data_breakpoints: Some(true),
            supports_disassemble_request: Some(false),
            supports_evaluate_for_hovers: Some(false),
            supports_function_breakpoints: Some(true),
            supports_goto_targets_request: Some(false),
            supports_instruction_breakpoints: Some(true),
            supports_read_memory_request: Some(false),
            supports_restart_frame: Some(false),
            supports_set_expression: Some(false),
            supports_set_variable: Some(false),
            supports_step_back: Some(false),
            supports_stepping_granularity: Some(false),
            supports_step_in_targets_request: Some(false),
            supports_terminate_request: Some(true),
            supports_terminate_threads_request: Some(false),
            supports_value_formatting_options: Some(false),
            ..Default::default()
        }
    }
}
