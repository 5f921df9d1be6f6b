use std::path::Path;

use log::{debug, info};

use crate::conformance::{is_conformant, violations};
use crate::error::{ConversionError, ConversionStage};
use crate::fstools::file_size;
use crate::pipeline::Pipeline;
use crate::report::FileOutcome;

/// Takes one discovered path all the way to an outcome: probe, check, convert
/// if needed, then probe the result and check it again.
#[derive(Clone)]
pub struct FilePathHandler {
    pipeline: Pipeline,
}

impl FilePathHandler {
    pub fn new(pipeline: Pipeline) -> Self {
        FilePathHandler { pipeline }
    }

    pub fn handle(&self, path: &Path) -> FileOutcome {
        let config = self.pipeline.config();
        let descriptor = match self.pipeline.prober().probe(path) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                debug!("{:?} is a temp artifact; skipping", path);
                return FileOutcome::Skipped;
            },
            Err(err) => return FileOutcome::Failed(err.into()),
        };
        debug!("{}", descriptor);

        if is_conformant(&descriptor, &config.profile) {
            debug!("{:?} is conformant", path);
            return FileOutcome::Conformant;
        }

        let problems = violations(&descriptor, &config.profile);
        if config.audit_only {
            info!("{:?} does not conform: {}", path, problems.join(", "));
            return FileOutcome::NonConformant(problems);
        }

        info!("Converting {:?} ({})", path, problems.join(", "));
        let bytes_before = file_size(path).unwrap_or(0);
        let converted = match self.pipeline.convert(&descriptor) {
            Ok(converted) => converted,
            Err(err) => return FileOutcome::Failed(err),
        };

        // the pipeline does not vouch for its own output
        let verified = match self.pipeline.prober().probe(&converted) {
            Ok(Some(after)) if is_conformant(&after, &config.profile) => Ok(()),
            Ok(Some(after)) => Err(ConversionError::for_file(
                &converted,
                ConversionStage::Verify,
                &format!("still does not conform: {}", violations(&after, &config.profile).join(", "))).into()),
            Ok(None) => Err(ConversionError::for_file(
                &converted,
                ConversionStage::Verify,
                "converted file was not probed").into()),
            Err(err) => Err(err.into()),
        };

        match verified {
            Ok(()) => {
                let bytes_after = file_size(&converted).unwrap_or(0);
                FileOutcome::Converted {
                    from: path.to_path_buf(),
                    to: converted,
                    bytes_before,
                    bytes_after,
                }
            },
            Err(err) => FileOutcome::Failed(err),
        }
    }
}
