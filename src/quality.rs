//! 质量评估模块：对生成结果打分的外部协作方接口。
//!
//! # Quality Module
//!
//! Scoring itself is pluggable; the lifecycle only combines the three sub-scores
//! and stores the overall value on the task after it has completed.

use crate::types::ResultRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub geometry: f64,
    pub visual: f64,
    pub functional: f64,
}

impl QualityAssessment {
    pub fn new(geometry: f64, visual: f64, functional: f64) -> Self {
        Self {
            geometry,
            visual,
            functional,
        }
    }

    /// `0.3·geometry + 0.4·visual + 0.3·functional`, clamped to `[0, 100]`.
    pub fn overall(&self) -> f64 {
        let score = 0.3 * self.geometry + 0.4 * self.visual + 0.3 * self.functional;
        if score.is_nan() {
            return 0.0;
        }
        score.clamp(0.0, 100.0)
    }
}

#[async_trait]
pub trait QualityScorer: Send + Sync {
    async fn assess(&self, result: &ResultRef) -> crate::Result<QualityAssessment>;
}

/// Returns the same assessment for every result without inspecting the asset.
/// A stand-in for tests and demos, not a real assessor.
#[derive(Debug, Clone, Copy)]
pub struct FixedQualityScorer {
    assessment: QualityAssessment,
}

impl FixedQualityScorer {
    pub fn new(assessment: QualityAssessment) -> Self {
        Self { assessment }
    }
}

impl Default for FixedQualityScorer {
    fn default() -> Self {
        Self::new(QualityAssessment::new(85.0, 78.0, 80.0))
    }
}

#[async_trait]
impl QualityScorer for FixedQualityScorer {
    async fn assess(&self, _result: &ResultRef) -> crate::Result<QualityAssessment> {
        Ok(self.assessment)
    }
}
