//! Cloud sync boundary
//!
//! The cloud is an injected collaborator: edgemem only prepares the payload
//! (optional differential-privacy noise, then encryption) and hands it to a
//! `CloudUploader`. No network behavior lives in this crate.

use crate::error::Result;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload handed to the uploader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEnvelope {
    /// Client-side id, 32 hex chars
    pub id: String,
    /// Serialized (and possibly sealed) payload
    pub body: Vec<u8>,
    pub encrypted: bool,
    /// Whether differential-privacy noise was injected
    pub noised: bool,
    pub timestamp: u64,
}

/// External upload target.
#[async_trait]
pub trait CloudUploader: Send + Sync {
    /// Upload the envelope, returning the remote id.
    async fn upload(&self, envelope: CloudEnvelope) -> Result<String>;
}

/// Differential-privacy noise injection strategy.
pub trait NoiseInjector: Send + Sync {
    fn inject(&self, data: &Value) -> Result<Value>;
}

/// Laplace mechanism over every numeric leaf; other values pass through.
#[derive(Debug, Clone)]
pub struct LaplaceNoise {
    /// Privacy budget; smaller means more noise
    pub epsilon: f64,
    /// Query sensitivity
    pub sensitivity: f64,
}

impl Default for LaplaceNoise {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            sensitivity: 1.0,
        }
    }
}

impl LaplaceNoise {
    fn scale(&self) -> f64 {
        self.sensitivity / self.epsilon.max(f64::MIN_POSITIVE)
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        let u: f64 = rng.gen_range(-0.5..0.5);
        let tail = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
        -self.scale() * u.signum() * tail.ln()
    }

    fn perturb(&self, value: &Value, rng: &mut impl Rng) -> Value {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(x) => serde_json::json!(x + self.sample(rng)),
                None => value.clone(),
            },
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.perturb(v, rng)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.perturb(v, rng)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl NoiseInjector for LaplaceNoise {
    fn inject(&self, data: &Value) -> Result<Value> {
        let mut rng = rand::thread_rng();
        Ok(self.perturb(data, &mut rng))
    }
}

/// Sync outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReceipt {
    pub remote_id: String,
    pub encrypted: bool,
    pub noised: bool,
    /// Local copy written first when `local_first` is set
    pub local: Option<super::record::StoreManifest>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noise_only_touches_numbers() {
        let noise = LaplaceNoise::default();
        let data = json!({"label": "steps", "count": 10, "tags": ["a", 2.5], "ok": true});
        let noised = noise.inject(&data).unwrap();

        assert_eq!(noised["label"], "steps");
        assert_eq!(noised["ok"], true);
        assert_eq!(noised["tags"][0], "a");
        assert!(noised["count"].is_number());
        assert_ne!(noised["count"].as_f64(), Some(10.0));
    }

    #[test]
    fn test_noise_scale_follows_epsilon() {
        let tight = LaplaceNoise {
            epsilon: 1e9,
            sensitivity: 1.0,
        };
        let noised = tight.inject(&json!(100.0)).unwrap();
        assert!((noised.as_f64().unwrap() - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_sample_is_finite() {
        let noise = LaplaceNoise::default();
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            assert!(noise.sample(&mut rng).is_finite());
        }
    }
}
