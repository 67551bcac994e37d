//! 4.B Transform Pipeline — a composable `(encode, decode)` stack layered
//! outward from the raw byte map: compression, then encryption (applied
//! *outside* compression so ciphertext stays incompressible), then
//! serialization (the outermost, object<->byte boundary).
//!
//! Modeled as a stack of function-composed transforms rather than an
//! inheritance chain (spec §9 design note), mirroring how `Func`-style
//! mappers layer in `igit/compression.py`, `igit/encryption.py`, and
//! `igit/serializers.py`, and how `jj-lib` favors composing free
//! functions over a class hierarchy.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{IgitError, Result};

const NONCE_LEN: usize = 12;

/// Recognized compression options (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
}

impl Compression {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "none" | "noop" => Ok(Self::None),
            "zlib" => Ok(Self::Zlib),
            other => Err(IgitError::UnsupportedVariant(format!("compression: {other}"))),
        }
    }

    fn encode(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Zlib => {
                use std::io::Write;
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(data)
                    .map_err(|err| IgitError::BackendIo { key: "compress".into(), source: err })?;
                encoder
                    .finish()
                    .map_err(|err| IgitError::BackendIo { key: "compress".into(), source: err })
            }
        }
    }

    fn decode(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Zlib => {
                use std::io::Read;
                let mut decoder = flate2::read::ZlibDecoder::new(data);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|err| IgitError::BackendIo { key: "decompress".into(), source: err })?;
                Ok(out)
            }
        }
    }
}

/// Recognized encryption options (§4.B): `none`, or authenticated
/// symmetric encryption with a 32-byte key (AES-256-GCM).
#[derive(Clone)]
pub enum Encryption {
    None,
    Aead { key: [u8; 32] },
}

impl Encryption {
    pub fn parse(name: &str, key: Option<&[u8]>) -> Result<Self> {
        match name {
            "none" | "noop" => Ok(Self::None),
            "aead" | "authenticated" | "aes-gcm" => {
                let key = key.ok_or_else(|| {
                    IgitError::UnsupportedVariant("encryption: missing 32-byte key".into())
                })?;
                let key: [u8; 32] = key.try_into().map_err(|_| {
                    IgitError::UnsupportedVariant(format!(
                        "encryption: key must be 32 bytes, got {}",
                        key.len()
                    ))
                })?;
                Ok(Self::Aead { key })
            }
            other => Err(IgitError::UnsupportedVariant(format!("encryption: {other}"))),
        }
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Aead { key } => {
                let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
                let mut nonce_bytes = [0u8; NONCE_LEN];
                rand::rng().fill_bytes(&mut nonce_bytes);
                let nonce = Nonce::from_slice(&nonce_bytes);
                let ciphertext = cipher
                    .encrypt(nonce, data)
                    .map_err(|_| IgitError::UnsupportedVariant("encryption failed".into()))?;
                let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                out.extend_from_slice(&nonce_bytes);
                out.extend_from_slice(&ciphertext);
                Ok(out)
            }
        }
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Aead { key } => {
                if data.len() < NONCE_LEN {
                    return Err(IgitError::DataCorruption {
                        key: "ciphertext".into(),
                        expected: format!(">= {NONCE_LEN} bytes"),
                        actual: format!("{} bytes", data.len()),
                    });
                }
                let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
                let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
                cipher
                    .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
                    .map_err(|_| IgitError::DataCorruption {
                        key: "ciphertext".into(),
                        expected: "valid AEAD tag".into(),
                        actual: "authentication failed".into(),
                    })
            }
        }
    }
}

/// Recognized serializer options (§4.B). This layer turns the object
/// interface into the byte interface and is therefore the outermost
/// byte-producing wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serializer {
    Json,
    MessagePack,
    /// Encodes as MessagePack; on decode, falls back to JSON if the
    /// MessagePack parse fails, so stores can be migrated without a
    /// flag day.
    MessagePackWithFallback,
}

impl Serializer {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "json" => Ok(Self::Json),
            "messagepack" | "msgpack" => Ok(Self::MessagePack),
            "messagepack-with-structured-fallback" | "msgpack-fallback" => {
                Ok(Self::MessagePackWithFallback)
            }
            other => Err(IgitError::UnsupportedVariant(format!("serializer: {other}"))),
        }
    }

    fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Json => serde_json::to_vec(value)
                .map_err(|err| IgitError::UnsupportedVariant(format!("json encode: {err}"))),
            Self::MessagePack | Self::MessagePackWithFallback => rmp_serde::to_vec(value)
                .map_err(|err| IgitError::UnsupportedVariant(format!("messagepack encode: {err}"))),
        }
    }

    fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            Self::Json => serde_json::from_slice(bytes)
                .map_err(|err| IgitError::UnsupportedVariant(format!("json decode: {err}"))),
            Self::MessagePack => rmp_serde::from_slice(bytes)
                .map_err(|err| IgitError::UnsupportedVariant(format!("messagepack decode: {err}"))),
            Self::MessagePackWithFallback => rmp_serde::from_slice(bytes)
                .or_else(|_| serde_json::from_slice(bytes))
                .map_err(|err| {
                    IgitError::UnsupportedVariant(format!("messagepack/json decode: {err}"))
                }),
        }
    }
}

/// Composes serialize -> compress -> encrypt on write, and the reverse on
/// read. §4.E's object database is built on top of this.
#[derive(Clone)]
pub struct TransformPipeline {
    pub serializer: Serializer,
    pub compression: Compression,
    pub encryption: Encryption,
}

impl TransformPipeline {
    pub fn new(serializer: Serializer, compression: Compression, encryption: Encryption) -> Self {
        Self { serializer, compression, encryption }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let bytes = self.serializer.encode(value)?;
        let bytes = self.compression.encode(&bytes)?;
        self.encryption.encode(&bytes)
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let bytes = self.encryption.decode(bytes)?;
        let bytes = self.compression.decode(&bytes)?;
        self.serializer.decode(&bytes)
    }
}
