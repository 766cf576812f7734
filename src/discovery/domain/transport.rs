//! Server transport configuration value objects.

use super::DiscoveryDomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Launch line for a server the client factory spawns as a child process.
///
/// Environment entries double as the credential signal: a key naming a
/// token, key or secret marks the generated nodes as credentialed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioTransportConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    working_directory: Option<String>,
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

impl StdioTransportConfig {
    /// Starts a launch line for `command` with no arguments.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::EmptyStdioCommand`] for a blank
    /// command.
    pub fn new(command: impl Into<String>) -> Result<Self, DiscoveryDomainError> {
        let command = non_blank(command.into()).ok_or(DiscoveryDomainError::EmptyStdioCommand)?;
        Ok(Self {
            command,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Appends one argument to the launch line.
    #[must_use]
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Sets one variable in the child's environment.
    #[must_use]
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Runs the child from `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::EmptyWorkingDirectory`] for a blank
    /// directory.
    pub fn in_directory(
        mut self,
        directory: impl Into<String>,
    ) -> Result<Self, DiscoveryDomainError> {
        let directory =
            non_blank(directory.into()).ok_or(DiscoveryDomainError::EmptyWorkingDirectory)?;
        self.working_directory = Some(directory);
        Ok(self)
    }

    /// Program to spawn.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments after the program, in launch order.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Variables added to the child's environment.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Directory the child starts in, when pinned.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }
}

/// Transport settings for a remote server reached over streaming HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamableHttpTransportConfig {
    endpoint: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

impl StreamableHttpTransportConfig {
    /// Points at a remote endpoint with no extra headers.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError`] when `endpoint` is blank or not an
    /// `http://` or `https://` URL.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, DiscoveryDomainError> {
        let endpoint = non_blank(endpoint.into()).ok_or(DiscoveryDomainError::EmptyHttpEndpoint)?;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(DiscoveryDomainError::InvalidHttpEndpoint(endpoint));
        }
        Ok(Self {
            endpoint,
            headers: BTreeMap::new(),
        })
    }

    /// Sets one header sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Headers sent with every request.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// Supported transport configuration variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum McpTransport {
    /// Local process speaking over STDIO.
    Stdio(StdioTransportConfig),
    /// Remote streaming HTTP endpoint.
    StreamableHttp(StreamableHttpTransportConfig),
}

impl McpTransport {
    /// Creates a `stdio` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`StdioTransportConfig::new`].
    pub fn stdio(command: impl Into<String>) -> Result<Self, DiscoveryDomainError> {
        Ok(Self::Stdio(StdioTransportConfig::new(command)?))
    }

    /// Creates a `streamable_http` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`StreamableHttpTransportConfig::new`].
    pub fn streamable_http(endpoint: impl Into<String>) -> Result<Self, DiscoveryDomainError> {
        Ok(Self::StreamableHttp(StreamableHttpTransportConfig::new(
            endpoint,
        )?))
    }

    /// Returns the canonical transport kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "stdio",
            Self::StreamableHttp(_) => "streamable_http",
        }
    }

    /// Re-applies constructor validation, for transports decoded from JSON.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`McpTransport::stdio`] and
    /// [`McpTransport::streamable_http`], plus
    /// [`DiscoveryDomainError::EmptyWorkingDirectory`].
    pub fn validate(&self) -> Result<(), DiscoveryDomainError> {
        match self {
            Self::Stdio(config) => {
                StdioTransportConfig::new(config.command())?;
                if config
                    .working_directory()
                    .is_some_and(|directory| directory.trim().is_empty())
                {
                    return Err(DiscoveryDomainError::EmptyWorkingDirectory);
                }
            }
            Self::StreamableHttp(config) => {
                StreamableHttpTransportConfig::new(config.endpoint())?;
            }
        }
        Ok(())
    }

    /// Returns whether the transport carries secret material.
    ///
    /// Secrets are recognised by key name: an `authorization` header or any
    /// header/environment key mentioning a key, token or secret.
    #[must_use]
    pub fn carries_credentials(&self) -> bool {
        match self {
            Self::Stdio(config) => config.env().keys().any(|key| is_secret_key(key)),
            Self::StreamableHttp(config) => config.headers().keys().any(|key| is_secret_key(key)),
        }
    }
}

fn is_secret_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    lowered == "authorization"
        || ["key", "token", "secret"]
            .iter()
            .any(|marker| lowered.contains(marker))
}
