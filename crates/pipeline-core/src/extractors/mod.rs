//! One Extractor per ATS family. Each implements
//! `extract(bytes, url, identifier?) -> Vec<ExtractedJob>` with the
//! decision order: JSON API shape → HTML family-specific selectors →
//! generic HTML/JSON-LD → LLM last resort (generic path only).

pub mod ashby;
pub mod generic;
pub mod greenhouse;
pub mod jsonld;
pub mod lever;
pub mod llm;
pub mod workable;

use crate::error::ExtractError;
use crate::models::AtsFamily;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Extractor output — a denormalized posting, later handed to the
/// Normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedJob {
    pub title: String,
    pub source_url: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub department: Option<String>,
    pub employment_type: Option<String>,
    pub posted_at: Option<String>,
    pub salary: Option<String>,
    pub remote: Option<bool>,
    pub requirements: Vec<String>,
}

impl ExtractedJob {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            description: None,
            location: None,
            department: None,
            employment_type: None,
            posted_at: None,
            salary: None,
            remote: None,
            requirements: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn family(&self) -> AtsFamily;

    async fn extract(
        &self,
        bytes: &[u8],
        url: &str,
        identifier: Option<&str>,
    ) -> Result<Vec<ExtractedJob>, ExtractError>;
}

/// Picks the per-family Extractor when one exists; everything else
/// (including `Custom`) falls through to the generic path. `llm` is
/// attached to the generic extractor only, since it is the sole
/// last-resort path — a family-specific extractor that finds nothing
/// gives up rather than trying the generic path afterward.
pub fn extractor_for(family: AtsFamily, llm: Option<Arc<llm::LlmExtractor>>) -> Box<dyn Extractor> {
    let generic = || -> Box<dyn Extractor> {
        let mut extractor = generic::GenericExtractor::new();
        if let Some(llm) = llm.clone() {
            extractor = extractor.with_llm(llm);
        }
        Box::new(extractor)
    };
    match family {
        AtsFamily::Greenhouse => Box::new(greenhouse::GreenhouseExtractor),
        AtsFamily::Lever => Box::new(lever::LeverExtractor),
        AtsFamily::Ashby => Box::new(ashby::AshbyExtractor),
        AtsFamily::Workable => Box::new(workable::WorkableExtractor),
        _ => generic(),
    }
}

/// Assembles a salary string from JSON-LD's
/// `baseSalary.value.{minValue,maxValue,currency}` shape.
pub fn assemble_salary_from_jsonld(base_salary: &serde_json::Value) -> Option<String> {
    let value = base_salary.get("value").unwrap_or(base_salary);
    let min = value.get("minValue").and_then(|v| v.as_f64());
    let max = value.get("maxValue").and_then(|v| v.as_f64());
    let currency = base_salary
        .get("currency")
        .or_else(|| value.get("currency"))
        .and_then(|v| v.as_str())
        .unwrap_or("USD");

    match (min, max) {
        (Some(min), Some(max)) => Some(format!("{} {}-{}", currency, min, max)),
        (Some(min), None) => Some(format!("{} {}", currency, min)),
        (None, Some(max)) => Some(format!("{} {}", currency, max)),
        (None, None) => None,
    }
}
