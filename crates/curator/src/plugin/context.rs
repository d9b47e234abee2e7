use crate::fixity::{DigestAlgorithm, MANDATORY_ALGORITHM};
use crate::premis::ProvenanceRecorder;
use crate::services::Services;

use super::PluginDescriptor;

/// Fixity defaults applied to every plugin that computes digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixitySettings {
    pub algorithms: Vec<DigestAlgorithm>,
    pub originator: String,
}

impl Default for FixitySettings {
    fn default() -> Self {
        Self {
            algorithms: vec![MANDATORY_ALGORITHM],
            originator: "curator".to_string(),
        }
    }
}

/// What a plugin sees of the job it runs in.
#[derive(Clone)]
pub struct ExecutionContext {
    pub job_id: String,
    /// Username that submitted the job.
    pub owner: Option<String>,
    pub descriptor: PluginDescriptor,
    pub services: Services,
    pub fixity: FixitySettings,
}

impl ExecutionContext {
    pub fn recorder(&self) -> ProvenanceRecorder {
        ProvenanceRecorder::new(
            self.descriptor.clone(),
            self.owner.as_deref(),
            self.services.model.clone(),
        )
    }
}
