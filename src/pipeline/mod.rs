//! Serialization Pipeline Module
//!
//! Turns values into stored bytes through ordered stages:
//! structural encoding (always), obfuscation (optional), size reduction
//! (optional, above a threshold). Decoding undoes the stages in reverse and
//! treats a stage whose marker is absent as a no-op, so payloads written under
//! an older configuration stay readable.

mod obfuscate;
mod reduce;


use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, Result};

pub use obfuscate::{ChaChaObfuscator, Obfuscator};
pub use reduce::{Lz4Reducer, Reducer};

// Canonical JSON never begins with NUL, so these cannot collide with a bare
// structural payload.
const OBFUSCATED_MARKER: &[u8] = b"\0TCO1";
const REDUCED_MARKER: &[u8] = b"\0TCZ1";

/// Default payload size above which reduction kicks in.
pub const DEFAULT_REDUCTION_THRESHOLD: usize = 1024;

// == Pipeline Config ==
/// Stage toggles, fixed for the lifetime of a manager.
#[derive(Clone, Default)]
pub struct PipelineConfig {
    pub obfuscation_enabled: bool,
    pub secret: Vec<u8>,
    pub reduction_enabled: bool,
    pub reduction_threshold_bytes: usize,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("obfuscation_enabled", &self.obfuscation_enabled)
            .field("secret", &"<redacted>")
            .field("reduction_enabled", &self.reduction_enabled)
            .field("reduction_threshold_bytes", &self.reduction_threshold_bytes)
            .finish()
    }
}

impl PipelineConfig {
    /// Structural encoding only.
    pub fn plain() -> Self {
        Self {
            reduction_threshold_bytes: DEFAULT_REDUCTION_THRESHOLD,
            ..Self::default()
        }
    }
}

// == Pipeline ==
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    /// Present whenever a secret is configured, even with obfuscation off, so
    /// previously obfuscated payloads still decode.
    obfuscator: Option<Box<dyn Obfuscator>>,
    reducer: Box<dyn Reducer>,
}

impl Pipeline {
    /// Builds a pipeline with the stock stages.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let obfuscator: Option<Box<dyn Obfuscator>> = if config.secret.is_empty() {
            None
        } else {
            Some(Box::new(ChaChaObfuscator::new(&config.secret)))
        };
        Self::with_stages(config, obfuscator, Box::new(Lz4Reducer))
    }

    /// Builds a pipeline with caller-supplied stages.
    pub fn with_stages(
        config: PipelineConfig,
        obfuscator: Option<Box<dyn Obfuscator>>,
        reducer: Box<dyn Reducer>,
    ) -> Result<Self> {
        if config.obfuscation_enabled && obfuscator.is_none() {
            return Err(CacheError::Serialization(
                "obfuscation enabled without a secret".into(),
            ));
        }
        Ok(Self {
            config,
            obfuscator,
            reducer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // == Encode ==
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        self.encode_as(value)
    }

    /// Encodes any serializable value through every enabled stage.
    pub fn encode_as<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let mut payload =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;

        if self.config.obfuscation_enabled {
            if let Some(obfuscator) = &self.obfuscator {
                payload = framed(OBFUSCATED_MARKER, obfuscator.obfuscate(&payload)?);
            }
        }

        if self.config.reduction_enabled && payload.len() > self.config.reduction_threshold_bytes {
            payload = framed(REDUCED_MARKER, self.reducer.reduce(&payload));
        }

        Ok(payload)
    }

    // == Decode ==
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        self.decode_as(bytes)
    }

    /// Undoes reduction, then obfuscation, then structural encoding.
    pub fn decode_as<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let restored;
        let mut payload = bytes;

        if let Some(inner) = payload.strip_prefix(REDUCED_MARKER) {
            restored = self.reducer.restore(inner)?;
            payload = &restored;
        }

        let revealed;
        if let Some(inner) = payload.strip_prefix(OBFUSCATED_MARKER) {
            let obfuscator = self.obfuscator.as_ref().ok_or_else(|| {
                CacheError::Serialization("obfuscated payload but no secret configured".into())
            })?;
            revealed = obfuscator.reveal(inner)?;
            payload = &revealed;
        }

        serde_json::from_slice(payload).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

fn framed(marker: &[u8], body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(marker.len() + body.len());
    out.extend_from_slice(marker);
    out.extend_from_slice(&body);
    out
}
