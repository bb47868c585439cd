//! Russh connection module
//!
//! SSH connectivity to Junos devices using the russh crate. Authentication
//! is password based, matching how network operators log in to the device
//! CLI. Host keys are accepted on first contact and their fingerprint logged.

use async_trait::async_trait;
use russh::client::{Handle, Handler};
use russh::ChannelMsg;
use russh_keys::key::PublicKey;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{
    CommandResult, Connection, ConnectionConfig, ConnectionError, ConnectionResult,
    ExecuteOptions, RusshError,
};

/// Client handler for russh callbacks
struct ClientHandler {
    host: String,
}

#[async_trait]
impl Handler for ClientHandler {
    type Error = RusshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting device host key"
        );
        Ok(true)
    }
}

/// SSH connection to one device.
pub struct RusshConnection {
    identifier: String,
    handle: RwLock<Option<Handle<ClientHandler>>>,
    connected: AtomicBool,
    commands_executed: AtomicU64,
    established: Instant,
}

impl RusshConnection {
    /// Open and authenticate a session.
    pub async fn connect(config: &ConnectionConfig) -> ConnectionResult<Self> {
        let handle = Self::do_connect(config).await?;
        Ok(Self {
            identifier: format!("{}@{}:{}", config.user, config.host, config.port),
            handle: RwLock::new(Some(handle)),
            connected: AtomicBool::new(true),
            commands_executed: AtomicU64::new(0),
            established: Instant::now(),
        })
    }

    async fn do_connect(config: &ConnectionConfig) -> ConnectionResult<Handle<ClientHandler>> {
        let timeout = config.timeout;
        let mut ssh_config = russh::client::Config::default();
        ssh_config.inactivity_timeout = Some(timeout);
        let ssh_config = Arc::new(ssh_config);

        let addr = if config.host.contains(':') {
            format!("[{}]:{}", config.host, config.port)
        } else {
            format!("{}:{}", config.host, config.port)
        };
        let socket = tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout.as_secs()))?
            .map_err(|e| {
                ConnectionError::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e))
            })?;

        socket.set_nodelay(true).map_err(|e| {
            ConnectionError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        let handler = ClientHandler {
            host: config.host.clone(),
        };

        let mut session = tokio::time::timeout(
            timeout,
            russh::client::connect_stream(ssh_config, socket, handler),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(timeout.as_secs()))?
        .map_err(|e| ConnectionError::ConnectionFailed(format!("SSH handshake failed: {}", e)))?;

        let authenticated = session
            .authenticate_password(config.user.as_str(), config.password.as_str())
            .await
            .map_err(|e| {
                ConnectionError::AuthenticationFailed(format!(
                    "Password authentication failed: {}",
                    e
                ))
            })?;

        if !authenticated {
            return Err(ConnectionError::AuthenticationFailed(format!(
                "Device rejected password for user '{}'",
                config.user
            )));
        }

        debug!(host = %config.host, port = config.port, "SSH session established");
        Ok(session)
    }

    /// Number of commands run on this connection.
    pub fn commands_executed(&self) -> u64 {
        self.commands_executed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connection for RusshConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn is_alive(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.handle.read().await.is_some()
    }

    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        let options = options.unwrap_or_default();
        trace!(command = %command, "Executing remote command");
        self.commands_executed.fetch_add(1, Ordering::Relaxed);

        let execute_future = async {
            let handle_guard = self.handle.read().await;
            let handle: &Handle<ClientHandler> = handle_guard
                .as_ref()
                .ok_or(ConnectionError::ConnectionClosed)?;

            let mut channel = handle.channel_open_session().await.map_err(|e| {
                ConnectionError::ExecutionFailed(format!("Failed to open channel: {}", e))
            })?;
            drop(handle_guard);

            channel.exec(true, command).await.map_err(|e| {
                ConnectionError::ExecutionFailed(format!("Failed to execute command: {}", e))
            })?;

            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let mut exit_code = None;

            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                    // Extended data type 1 is stderr
                    ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                        stderr.extend_from_slice(data)
                    }
                    ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }

            let _ = channel.eof().await;

            let exit_code: i32 = exit_code.map(|e| e as i32).unwrap_or(i32::MAX);
            let stdout = String::from_utf8_lossy(&stdout).to_string();
            let stderr = String::from_utf8_lossy(&stderr).to_string();

            trace!(exit_code = %exit_code, "Command completed");

            if exit_code == 0 {
                Ok(CommandResult::success(stdout, stderr))
            } else {
                Ok(CommandResult::failure(exit_code, stdout, stderr))
            }
        };

        match options.timeout {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), execute_future)
                .await
                .map_err(|_| ConnectionError::Timeout(secs))?,
            None => execute_future.await,
        }
    }

    async fn close(&self) -> ConnectionResult<()> {
        debug!(
            identifier = %self.identifier,
            uptime_secs = %self.established.elapsed().as_secs(),
            commands_executed = %self.commands_executed(),
            "Closing SSH connection"
        );

        self.connected.store(false, Ordering::SeqCst);

        let handle = self.handle.write().await.take();
        if let Some(handle) = handle {
            let _ = handle
                .disconnect(
                    russh::Disconnect::ByApplication,
                    "Connection closed by client",
                    "en",
                )
                .await;
        }

        Ok(())
    }
}
