//! Cache key derivation.
//!
//! A stage's key fingerprints only the inputs that affect that stage's
//! output: a fixed set of runtime options is overlaid onto the config, the
//! stage's field selector picks the relevant subset, and the subset is
//! canonically hashed. The overlay table and selector lists are part of the
//! key compatibility contract — changing them invalidates existing caches.

use cadforge_core::{RunOptions, StageName};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::canonical::content_digest;

/// The option subset that participates in key derivation.
///
/// Built from the run's [`RunOptions`] plus values only known at run time
/// (the loaded shop profile, the upstream DFM score).
#[derive(Debug, Clone, Default)]
pub struct KeyOptions {
    pub process: Option<String>,
    pub material: Option<String>,
    pub batch: Option<u64>,
    pub dxf_export: Option<bool>,
    pub shop_profile: Option<Value>,
    pub dfm_score: Option<Value>,
    pub monte_carlo: Option<bool>,
    pub mc_samples: Option<f64>,
}

impl KeyOptions {
    #[must_use]
    pub fn with_shop_profile(mut self, profile: Option<Value>) -> Self {
        self.shop_profile = profile;
        self
    }

    #[must_use]
    pub fn with_dfm_score(mut self, score: Option<Value>) -> Self {
        self.dfm_score = score;
        self
    }
}

impl From<&RunOptions> for KeyOptions {
    fn from(options: &RunOptions) -> Self {
        Self {
            process: options.process.clone(),
            material: options.material.clone(),
            batch: options.batch,
            dxf_export: options.dxf_export,
            shop_profile: None,
            dfm_score: None,
            monte_carlo: options.monte_carlo,
            mc_samples: options.mc_samples,
        }
    }
}

/// Where an overlay rule writes into the merged config.
enum OverlayTarget {
    /// A top-level field
    Field(&'static str),
    /// A field inside the `manufacturing` object, created on demand
    Manufacturing(&'static str),
}

struct OverlayRule {
    target: OverlayTarget,
    extract: fn(&KeyOptions) -> Option<Value>,
}

/// The fixed, stage-independent overlay of runtime options onto the config.
const OVERLAY_RULES: &[OverlayRule] = &[
    OverlayRule {
        target: OverlayTarget::Manufacturing("process"),
        extract: |o| o.process.clone().map(Value::from),
    },
    OverlayRule {
        target: OverlayTarget::Manufacturing("material"),
        extract: |o| o.material.clone().map(Value::from),
    },
    OverlayRule {
        target: OverlayTarget::Field("process"),
        extract: |o| o.process.clone().map(Value::from),
    },
    OverlayRule {
        target: OverlayTarget::Field("material"),
        extract: |o| o.material.clone().map(Value::from),
    },
    OverlayRule {
        target: OverlayTarget::Field("batch_size"),
        extract: |o| o.batch.map(Value::from),
    },
    OverlayRule {
        target: OverlayTarget::Field("dxfExport"),
        extract: |o| o.dxf_export.map(Value::from),
    },
    OverlayRule {
        target: OverlayTarget::Field("shop_profile"),
        extract: |o| o.shop_profile.clone(),
    },
    OverlayRule {
        target: OverlayTarget::Field("dfm_score"),
        extract: |o| o.dfm_score.clone(),
    },
    OverlayRule {
        target: OverlayTarget::Field("monteCarlo"),
        extract: |o| o.monte_carlo.map(Value::from),
    },
    OverlayRule {
        target: OverlayTarget::Field("mcSamples"),
        extract: |o| o.mc_samples.map(Value::from),
    },
];

/// Fields that feed each stage's key.
fn selected_fields(stage: StageName) -> &'static [&'static str] {
    match stage {
        StageName::Create => &["shapes", "operations", "parts", "assembly", "export"],
        StageName::Drawing => &[
            "shapes",
            "operations",
            "parts",
            "assembly",
            "export",
            "drawing",
            "drawing_plan",
            "tolerance",
            "dxfExport",
        ],
        StageName::Dfm => &["shapes", "operations", "manufacturing", "shop_profile"],
        StageName::Cost => &[
            "shapes",
            "operations",
            "material",
            "process",
            "batch_size",
            "shop_profile",
            "dfm_score",
        ],
        StageName::Tolerance => &["parts", "assembly", "tolerance"],
    }
}

fn apply_overlays(config: &Value, options: &KeyOptions) -> Map<String, Value> {
    let mut merged = match config {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    for rule in OVERLAY_RULES {
        let Some(value) = (rule.extract)(options) else {
            continue;
        };
        match rule.target {
            OverlayTarget::Field(name) => {
                merged.insert(name.to_string(), value);
            }
            OverlayTarget::Manufacturing(name) => {
                let slot = merged
                    .entry("manufacturing")
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(manufacturing) = slot {
                    manufacturing.insert(name.to_string(), value);
                }
            }
        }
    }

    merged
}

/// Build the cache key for a stage from the config and overlay options.
#[must_use]
pub fn compute_key(stage: StageName, config: &Value, options: &KeyOptions) -> String {
    let merged = apply_overlays(config, options);

    let mut subset = Map::new();
    for field in selected_fields(stage) {
        if let Some(value) = merged.get(*field) {
            subset.insert((*field).to_string(), value.clone());
        }
    }

    format!("{stage}-{}", content_digest(&Value::Object(subset)))
}

/// String-facing variant of [`compute_key`].
///
/// An unknown stage name means the input is uncacheable: the result is
/// `None`, never an error.
#[must_use]
pub fn compute_key_for(stage: &str, config: &Value, options: &KeyOptions) -> Option<String> {
    let stage = StageName::from_str(stage).ok()?;
    Some(compute_key(stage, config, options))
}
