use crate::session::{DebugSession, SessionOptions};

/// How the host should run the adapter for a new debug session
#[derive(Debug)]
pub enum DebugAdapterDescriptor {
    /// Session served by this process
    Inline(DebugSession),
    /// External adapter executable
    Executable { command: String, args: Vec<String> },
}

pub trait DebugAdapterDescriptorFactory: Send + Sync {
    fn create_descriptor(&self) -> DebugAdapterDescriptor;
}

/// Always hands out a fresh in-process session
#[derive(Debug, Clone, Default)]
pub struct FastEdgeDescriptorFactory {
    options: SessionOptions,
}

impl FastEdgeDescriptorFactory {
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }
}

impl DebugAdapterDescriptorFactory for FastEdgeDescriptorFactory {
    fn create_descriptor(&self) -> DebugAdapterDescriptor {
        DebugAdapterDescriptor::Inline(DebugSession::new(self.options.clone()))
    }
}
