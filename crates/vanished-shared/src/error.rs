use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid base64 payload")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Key file error: {0}")]
    KeyFile(#[from] std::io::Error),
}

/// A client line that does not form a valid command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Choose exactly one of --public or --private")]
    AmbiguousVisibility,

    #[error("Room password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Invalid room capacity: {0}")]
    InvalidCapacity(String),

    #[error("Unknown command: {0}. Type /help for info.")]
    UnknownCommand(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}
