use thiserror::Error;

/// Why a fetch ended in the error state. Every variant renders to the text
/// shown to the user; views do not branch on the variant.
///
/// `Status`, `Transport` and `Payload` are transport failures (bad HTTP
/// status, network failure or timeout, undecodable body). `Rpc` carries the
/// server's own error message(s), single or any-in-batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Invalid response status: HTTP {0}.")]
    Status(u16),
    #[error("Request failed: {0}.")]
    Transport(String),
    #[error("Invalid response payload: {0}.")]
    Payload(String),
    #[error("Invalid response: {0}.")]
    Rpc(String),
}
