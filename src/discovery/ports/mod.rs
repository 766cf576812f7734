//! Port contracts for reaching capability-providing servers.

mod client;

pub use client::{
    McpClientError, McpClientFactory, McpClientResult, McpServerClient, ToolCallOutput,
    ToolListChanged,
};
