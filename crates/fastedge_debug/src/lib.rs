//! Debug Adapter Protocol support for FastEdge edge functions.
//!
//! A launch compiles the active Rust or Javascript source to WebAssembly, starts the
//! FastEdge runtime CLI serving it over HTTP and relays the CLI's output to the
//! client's debug console.

pub mod args;
pub mod breakpoints;
pub mod capabilities;
pub mod compiler;
pub mod descriptor;
pub mod error;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod server;
pub mod session;

pub use breakpoints::{Breakpoint, BreakpointStore, SharedBreakpoints};
pub use capabilities::FastEdgeCapabilities;
pub use compiler::{Compiler, ConsoleSink, SourceContext, Toolchain};
pub use descriptor::{DebugAdapterDescriptor, DebugAdapterDescriptorFactory, FastEdgeDescriptorFactory};
pub use error::DebugError;
pub use registry::{CommandHandler, Registry, RegistryError};
pub use resolver::{ContextPrompt, NoPrompt, Resolver, ResolverEnv};
pub use server::DapServer;
pub use session::{DebugSession, SessionHandle, SessionOptions, SessionState};
