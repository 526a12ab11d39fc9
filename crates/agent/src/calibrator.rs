//! Capability calibrator: classify literal tool results into observations.
//!
//! Pure string classification, no model calls. A result is a failure when
//! the execution unit flagged it as an error or when it contains one of the
//! configured error markers (case-insensitive).

use taskforge_config::CalibrationConfig;
use taskforge_core::execution::ToolOutput;
use taskforge_core::knowledge::Observation;

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    markers: Vec<String>,
}

impl ErrorClassifier {
    pub fn new(markers: impl IntoIterator<Item = String>) -> Self {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.error_markers.iter().cloned())
    }

    pub fn is_failure(&self, output: &ToolOutput) -> bool {
        if output.is_error {
            return true;
        }
        let text = output.result.to_lowercase();
        self.markers.iter().any(|m| text.contains(m.as_str()))
    }

    pub fn classify(&self, output: &ToolOutput) -> Observation {
        if self.is_failure(output) {
            Observation::failure(&output.tool, &output.result)
        } else {
            Observation::success(&output.tool)
        }
    }

    /// One observation per output, in order.
    pub fn observe<'a>(&self, outputs: impl IntoIterator<Item = &'a ToolOutput>) -> Vec<Observation> {
        outputs.into_iter().map(|o| self.classify(o)).collect()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}
