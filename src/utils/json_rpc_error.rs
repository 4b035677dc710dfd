//! JSON-RPC error codes (JSON-RPC 2.0 and EIP-1474) and node error messages

/// Standard JSON-RPC 2.0 error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardJsonRpcError {
    /// Invalid JSON was received by the server
    ParseError = -32700,
    /// The JSON sent is not a valid Request object
    InvalidRequest = -32600,
    /// The method does not exist / is not available
    MethodNotFound = -32601,
    /// Invalid method parameter(s)
    InvalidParams = -32602,
    /// Internal JSON-RPC error
    InternalError = -32603,
}

/// Ethereum-specific JSON-RPC error codes (EIP-1474)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthereumJsonRpcError {
    /// Invalid input, also used by most nodes for rejected raw transactions
    InvalidInput = -32000,
    /// Resource not found
    ResourceNotFound = -32001,
    /// Resource unavailable
    ResourceUnavailable = -32002,
    /// Transaction rejected
    TransactionRejected = -32003,
    /// Method not supported
    MethodNotSupported = -32004,
    /// Request limit exceeded
    LimitExceeded = -32005,
}

/// Code geth uses for `eth_call`/`eth_estimateGas` reverts carrying data.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

impl StandardJsonRpcError {
    pub const fn code(self) -> i64 {
        self as i64
    }
}

impl EthereumJsonRpcError {
    pub const fn code(self) -> i64 {
        self as i64
    }
}

/// Check if a JSON-RPC error code represents a retriable error.
pub const fn is_retriable_error_code(code: i64) -> bool {
    code == StandardJsonRpcError::InternalError as i64
        || code == EthereumJsonRpcError::ResourceUnavailable as i64
        || code == EthereumJsonRpcError::LimitExceeded as i64
}

/// Why a node refused a raw transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTxRejection {
    /// The node already has this exact transaction. Treated as success.
    AlreadyKnown,
    InsufficientFunds,
    NonceTooLow,
    ReplacementUnderpriced,
}

/// Maps the free-form message of a rejected `eth_sendRawTransaction` to a
/// closed set of reasons. Geth, Parity/OpenEthereum and Nethermind wordings
/// are recognised.
pub fn classify_raw_tx_rejection(message: &str) -> Option<RawTxRejection> {
    let message = message.to_lowercase();
    if message.contains("already known")
        || message.contains("transaction with the same hash was already imported")
        || message.contains("alreadyknown")
    {
        Some(RawTxRejection::AlreadyKnown)
    } else if message.contains("insufficient funds") || message.contains("doesn't have enough funds")
    {
        Some(RawTxRejection::InsufficientFunds)
    } else if message.contains("replacement transaction underpriced")
        || message.contains("transaction underpriced")
    {
        Some(RawTxRejection::ReplacementUnderpriced)
    } else if message.contains("nonce too low") || message.contains("correct nonce") {
        Some(RawTxRejection::NonceTooLow)
    } else {
        None
    }
}
