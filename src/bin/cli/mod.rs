pub mod args;
pub mod commands;
pub mod plain;
pub mod state;

/// Exit codes for different error conditions
pub mod exit_codes {
    /// Successful execution
    pub const SUCCESS: u8 = 0;
    /// Network/transport error (e.g., connection refused, handshake failed, timeout)
    pub const NETWORK_ERROR: u8 = 1;
    /// Protocol error (e.g., broker answered CONNECT with ERROR)
    pub const PROTOCOL_ERROR: u8 = 3;
}
