use thiserror::Error;

/// Top-level error type for the roboquant core.
#[derive(Error, Debug)]
pub enum RqError {
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("order error: {0}")]
    Order(#[from] OrderError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Event-channel failures (C2).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("send on a closed channel")]
    Closed,
}

/// Order/instruction validation failures (C3, C6).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("order size must be non-zero")]
    ZeroSize,

    #[error("composite order legs reference different assets: {context}")]
    AssetMismatch { context: String },

    #[error("OCO legs must share the same size magnitude: {context}")]
    SizeMismatch { context: String },

    #[error("bracket entry size must be the negation of take-profit and stop-loss size: {context}")]
    BracketSizeMismatch { context: String },

    #[error("unknown order: {order_id}")]
    UnknownOrder { order_id: String },

    #[error("order {order_id} is not open, cannot modify")]
    NotOpen { order_id: String },

    #[error("update target and replacement must share the same order type and asset: {context}")]
    TypeMismatch { context: String },
}

/// Broker/account-ledger failures (C5, C7, C8).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("insufficient buying power: required {required}, available {available}")]
    InsufficientBuyingPower { required: String, available: String },

    #[error("shorting disallowed under the active account model for asset {asset}")]
    ShortingDisallowed { asset: String },

    #[error("no exchange rate from {from} to {to}")]
    UnknownRate { from: String, to: String },
}

/// Result alias for roboquant operations.
pub type RqResult<T> = Result<T, RqError>;

pub trait IntoRqError {
    fn into_rq_error(self) -> RqError;
}

impl IntoRqError for String {
    fn into_rq_error(self) -> RqError {
        RqError::Internal(self)
    }
}

impl IntoRqError for &str {
    fn into_rq_error(self) -> RqError {
        RqError::Internal(self.to_string())
    }
}

#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::RqError::Config(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::RqError::Internal(format!($($arg)*))
    };
}
