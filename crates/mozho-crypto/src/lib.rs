/// Mozho Crypto Library
///
/// Stateless message sealing for the chat service:
/// - AES-256-GCM with a per-message random nonce (`symmetric`)
/// - RSA-OAEP over SHA-256 for recipient public keys (`asymmetric`)
///
/// Nothing here holds key material between calls, so every function is safe
/// to call from any number of tasks at once.

pub mod asymmetric;
pub mod error;
pub mod keys;
pub mod symmetric;

pub use asymmetric::{decrypt_asymmetric, encrypt_asymmetric, generate_keypair};
pub use error::CryptoError;
pub use keys::{SYMMETRIC_KEY_LEN, decode_symmetric_key, encode_key, generate_symmetric_key};
pub use symmetric::{NONCE_LEN, decrypt_symmetric, encrypt_symmetric};
