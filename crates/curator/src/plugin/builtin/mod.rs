//! Plugins shipped with the engine.

mod descriptive_metadata;
mod fixity_check;
mod premis_skeleton;
mod producer_authorization;

pub use descriptive_metadata::DescriptiveMetadataValidationPlugin;
pub use fixity_check::FixityCheckPlugin;
pub use premis_skeleton::PremisSkeletonPlugin;
pub use producer_authorization::ProducerAuthorizationPlugin;

use log::warn;

use crate::model::ArchivalObject;
use crate::report::{PluginState, Report, ReportItem};

use super::ExecutionContext;
use crate::error::PluginError;

/// Outcome of one object before it is turned into a report item and event.
struct Verdict {
    state: PluginState,
    details: String,
}

impl Verdict {
    fn success(details: impl Into<String>) -> Self {
        Self {
            state: PluginState::Success,
            details: details.into(),
        }
    }

    fn failure(details: impl Into<String>) -> Self {
        Self {
            state: PluginState::Failure,
            details: details.into(),
        }
    }

    fn skipped(details: impl Into<String>) -> Self {
        Self {
            state: PluginState::Skipped,
            details: details.into(),
        }
    }
}

/// Runs `check` on every object, records one event per object and builds
/// the block report in input order.
///
/// Errors are confined to the object they happened on: a failing check or
/// event write turns that object into a `FAILURE` item and the block goes on.
fn process_each<F>(
    ctx: &ExecutionContext,
    objects: &[ArchivalObject],
    mut check: F,
) -> Result<Report, PluginError>
where
    F: FnMut(&ArchivalObject) -> Result<Verdict, PluginError>,
{
    let recorder = ctx.recorder();
    let mut report = Report::new();
    for object in objects {
        let verdict = check(object).unwrap_or_else(|e| {
            warn!("{} '{}' could not be processed: {}", object.kind(), object.id(), e);
            Verdict::failure(e.to_string())
        });
        let verdict = match recorder.record_event(object, verdict.state, &verdict.details) {
            Ok(_) => verdict,
            Err(e) => unrecorded(object, verdict, &e),
        };
        report.push(ReportItem::new(object, verdict.state, verdict.details));
    }
    Ok(report)
}

/// Verdict of an object whose event could not be written.
fn unrecorded(object: &ArchivalObject, verdict: Verdict, error: &PluginError) -> Verdict {
    warn!(
        "Event for {} '{}' not recorded: {}",
        object.kind(),
        object.id(),
        error
    );
    if verdict.details.is_empty() {
        Verdict::failure(format!("event not recorded: {}", error))
    } else {
        Verdict::failure(format!("{}; event not recorded: {}", verdict.details, error))
    }
}
