//! Tool gateway for the GPU fleet platform.
//!
//! Operations the orchestrator and background agents need (allocating GPUs,
//! deploying models, running LoRA training, analysing cost) are exposed as
//! *tools*. Tools are grouped into *servers* and invoked through a single
//! JSON-RPC 2.0 endpoint:
//!
//! ```text
//! POST /execute
//! {"jsonrpc": "2.0", "method": "vllm.load_lora", "params": {...}, "id": 1}
//! ```
//!
//! A method is either `<server>.<tool>` or a bare tool name, which resolves
//! against the default server (`platform`).
//!
//! # Components
//!
//! - [`Tool`] couples a JSON Schema with a [`ToolHandler`]; params are
//!   validated before the handler runs.
//! - [`Gateway`] owns the servers and dispatches calls.
//! - [`ToolInvoker`] is the seam callers depend on. [`Gateway`] implements
//!   it in-process and [`GatewayClient`] implements it over HTTP.
//! - [`platform`] registers the simulated platform toolset.
//! - [`wait_for_training`] polls a training job to completion.
//! - [`telemetry`] holds the logging and signal setup every binary uses.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod config;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod tool;
pub mod training;

pub use client::{GatewayClient, ToolInvoker};
pub use config::GatewayConfig;
pub use error::{GatewayError, InvokeError, ToolError};
pub use platform::{register_platform_tools, PlatformBackend, PlatformSettings};
pub use protocol::{RpcError, RpcRequest, RpcResponse};
pub use registry::{Gateway, ToolServer, DEFAULT_SERVER};
pub use server::router;
pub use tool::{handler_fn, Tool, ToolDescriptor, ToolHandler};
pub use training::{wait_for_training, TrainingPoll, TrainingWaitError};
