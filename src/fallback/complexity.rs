//! Problem complexity gate.
//!
//! Simple and moderate problems are left to research sources; only complex
//! ones are worth an AI provider call.

use serde::Serialize;

use crate::config::FallbackConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone)]
pub struct ComplexityClassifier {
    simple: Vec<String>,
    moderate: Vec<String>,
}

impl ComplexityClassifier {
    pub fn new(simple: &[String], moderate: &[String]) -> Self {
        let lower = |list: &[String]| -> Vec<String> { list.iter().map(|p| p.to_lowercase()).collect() };
        Self {
            simple: lower(simple),
            moderate: lower(moderate),
        }
    }

    pub fn from_config(config: &FallbackConfig) -> Self {
        Self::new(&config.simple_patterns, &config.moderate_patterns)
    }

    /// First matching list wins, simple before moderate.
    pub fn classify(&self, problem: &str) -> ComplexityLevel {
        let text = problem.to_lowercase();
        if self.simple.iter().any(|p| text.contains(p.as_str())) {
            ComplexityLevel::Simple
        } else if self.moderate.iter().any(|p| text.contains(p.as_str())) {
            ComplexityLevel::Moderate
        } else {
            ComplexityLevel::Complex
        }
    }
}
