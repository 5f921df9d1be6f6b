use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::conversion_job::{ConversionJob, JobState};
use crate::error::{CommitError, ConversionError, ConversionStage, JobError, ToolError};
use crate::ffmpeg::{Transcoder, invocations};
use crate::fstools::{self, ensure_removed, file_size, is_temp_artifact, remove_best_effort, scratch_path, silent_audio_path};
use crate::probe::{MediaDescriptor, Prober};

/// The hardware encoder takes one job at a time.
#[derive(Default)]
pub struct GpuSlot {
    lock: Mutex<()>,
}

impl GpuSlot {
    pub fn new() -> Self {
        GpuSlot { lock: Mutex::new(()) }
    }

    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BitDepth {
    /// Already fine for NVENC.
    Compatible,
    /// 10 bits or more per sample.
    High(u32),
    Unknown,
}

impl BitDepth {
    pub fn classify(raw: Option<&str>) -> Self {
        match raw.map(str::trim).and_then(|s| s.parse::<u32>().ok()) {
            Some(bits) if bits >= 10 => BitDepth::High(bits),
            Some(_) => BitDepth::Compatible,
            None => BitDepth::Unknown,
        }
    }
}

/// Drives one file from "does not conform" to "replaced by a converted copy",
/// or back out again with the original left where it was.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    gpu_slot: Arc<GpuSlot>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        prober: Arc<dyn Prober>,
        transcoder: Arc<dyn Transcoder>,
        gpu_slot: Arc<GpuSlot>,
    ) -> Self {
        Pipeline {
            config,
            prober,
            transcoder,
            gpu_slot,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn prober(&self) -> &dyn Prober {
        self.prober.as_ref()
    }

    /// Returns the path the converted file now lives at. The caller is
    /// expected to probe that path again and check it.
    pub fn convert(&self, descriptor: &MediaDescriptor) -> Result<PathBuf, JobError> {
        let mut job = ConversionJob::new(descriptor, &self.config.profile, self.config.gpu);
        let result = self.run_job(&mut job, descriptor);
        match &result {
            Ok(_) => job.state = JobState::Done,
            Err(err) => {
                debug!("{:?} failed in state {}: {}", job.source, job.state, err);
                job.state = JobState::Failed;
            },
        }
        result
    }

    fn run_job(&self, job: &mut ConversionJob, descriptor: &MediaDescriptor) -> Result<PathBuf, JobError> {
        if is_temp_artifact(&job.destination, self.config.profile.container.extension()) {
            return Err(ConversionError::for_file(
                &job.source,
                ConversionStage::Encode,
                &format!("{:?} would be mistaken for an abandoned temp file", job.destination)).into());
        }
        if job.destination_taken() {
            return Err(ConversionError::for_file(
                &job.source,
                ConversionStage::Encode,
                &format!("{:?} already exists", job.destination)).into());
        }

        let descriptor = if job.gpu {
            job.state = JobState::Preprocess;
            self.preprocess(job, descriptor)?
        } else {
            descriptor.clone()
        };

        job.state = JobState::Encode;
        if let Err(err) = self.encode(job, &descriptor) {
            remove_best_effort(&job.temp, &self.config.retry);
            return Err(err.into());
        }

        job.state = JobState::Commit;
        self.commit(job)?;
        Ok(job.source.clone())
    }

    /// Gate in front of a GPU encode: only lets the job through once the bit
    /// depth is known to be something NVENC accepts.
    fn preprocess(&self, job: &ConversionJob, descriptor: &MediaDescriptor) -> Result<MediaDescriptor, JobError> {
        match BitDepth::classify(descriptor.bit_depth.as_deref()) {
            BitDepth::Compatible => {
                debug!("{:?}: {}-bit, no preprocessing needed", job.source, descriptor.bit_depth.as_deref().unwrap_or("?"));
                Ok(descriptor.clone())
            },
            BitDepth::High(bits) => {
                info!("{:?}: {}-bit video is unsupported by the GPU encoder; converting to 8-bit on the CPU", job.source, bits);
                self.normalize_bit_depth(job)
            },
            BitDepth::Unknown => {
                info!("{:?}: unknown bit depth; testing GPU conversion", job.source);
                if self.gpu_test(job) {
                    info!("{:?}: GPU test passed", job.source);
                    Ok(descriptor.clone())
                } else {
                    warn!("{:?}: GPU test failed; converting to 8-bit on the CPU", job.source);
                    self.normalize_bit_depth(job)
                }
            },
        }
    }

    fn gpu_test(&self, job: &ConversionJob) -> bool {
        let output = scratch_path(&job.source, "gputest", self.config.profile.container.extension());
        let invocation = invocations::gpu_test(&job.source, &output, &self.config.profile);
        let result = {
            let _gpu = self.gpu_slot.acquire();
            self.transcoder.run(&invocation)
        };
        remove_best_effort(&output, &self.config.retry);
        if let Err(err) = &result {
            debug!("{:?}: GPU test: {}", job.source, err);
        }
        result.is_ok()
    }

    /// Re-encode the source to 8-bit next to itself, then swap it in under the
    /// source's name and probe it again.
    fn normalize_bit_depth(&self, job: &ConversionJob) -> Result<MediaDescriptor, JobError> {
        let scratch = scratch_path(&job.source, "8bit", "mkv");
        let invocation = invocations::normalize_bit_depth(&job.source, &scratch, &self.config.profile);
        if let Err(err) = self.transcoder.run(&invocation) {
            remove_best_effort(&scratch, &self.config.retry);
            return Err(stage_error(&job.source, ConversionStage::Preprocess, err).into());
        }
        if let Err(err) = require_output(&scratch) {
            remove_best_effort(&scratch, &self.config.retry);
            return Err(ConversionError::for_file(&job.source, ConversionStage::Preprocess, &err).into());
        }

        // rename over the source; one or the other is always on disk
        if let Err(err) = fstools::rename(&scratch, &job.source, &self.config.retry) {
            error!("commit: unable to swap 8-bit copy into {:?}: {}", job.source, err);
            remove_best_effort(&scratch, &self.config.retry);
            return Err(CommitError::from(err).into());
        }

        match self.prober.probe(&job.source) {
            Ok(Some(descriptor)) => Ok(descriptor),
            Ok(None) => Err(ConversionError::for_file(
                &job.source,
                ConversionStage::Preprocess,
                "8-bit copy could not be probed").into()),
            Err(err) => Err(err.into()),
        }
    }

    fn encode(&self, job: &mut ConversionJob, descriptor: &MediaDescriptor) -> Result<(), ConversionError> {
        if !descriptor.has_audio() {
            job.silent_audio = Some(self.synthesize_silence(job, descriptor)?);
        }

        let invocation = invocations::encode(
            &job.source,
            job.silent_audio.as_deref(),
            &job.temp,
            &self.config.profile,
            job.gpu);

        let result = {
            let _gpu = if job.gpu { Some(self.gpu_slot.acquire()) } else { None };
            info!("{:?}: encoding ({})", job.source, if job.gpu { "GPU" } else { "CPU" });
            self.transcoder.run(&invocation)
        };

        if let Some(silent) = job.silent_audio.take() {
            remove_best_effort(&silent, &self.config.retry);
        }

        result.map_err(|err| stage_error(&job.source, ConversionStage::Encode, err))?;
        require_output(&job.temp)
            .map_err(|msg| ConversionError::for_file(&job.source, ConversionStage::Encode, &msg))
    }

    fn synthesize_silence(&self, job: &ConversionJob, descriptor: &MediaDescriptor) -> Result<PathBuf, ConversionError> {
        if descriptor.duration_seconds <= 0.0 {
            return Err(ConversionError::for_file(
                &job.source,
                ConversionStage::SilentAudio,
                "no audio track and no known duration to build a silent one"));
        }

        let path = silent_audio_path(&job.source);
        // a leftover from an earlier run has the wrong length
        remove_best_effort(&path, &self.config.retry);

        info!("{:?}: creating {:.2}s silent audio track", job.source, descriptor.duration_seconds);
        let invocation = invocations::silent_audio(descriptor.duration_seconds, &path);
        match self.transcoder.run(&invocation) {
            Ok(()) => Ok(path),
            Err(err) => {
                remove_best_effort(&path, &self.config.retry);
                Err(stage_error(&job.source, ConversionStage::SilentAudio, err))
            },
        }
    }

    /// Swap the encoded temp file in for the source. The source is removed
    /// first; if that cannot be done the encoded copy is thrown away instead.
    fn commit(&self, job: &mut ConversionJob) -> Result<(), CommitError> {
        let retry = &self.config.retry;

        if job.replaces_in_place() {
            if let Err(err) = fstools::rename(&job.temp, &job.source, retry) {
                error!("commit: unable to replace {:?}: {}", job.source, err);
                remove_best_effort(&job.temp, retry);
                return Err(CommitError::from(err));
            }
            return Ok(());
        }

        if let Err(err) = ensure_removed(&job.source, retry) {
            error!("commit: unable to remove original {:?}; discarding converted copy", job.source);
            remove_best_effort(&job.temp, retry);
            return Err(CommitError::from(err));
        }

        if let Err(err) = fstools::rename(&job.temp, &job.destination, retry) {
            // the temp file is now the only copy; a temp name would be swept
            // on the next run, so it goes back under the source's name
            error!("commit: original removed but {:?} could not be renamed to {:?}", job.temp, job.destination);
            match fstools::rename(&job.temp, &job.source, retry) {
                Ok(()) => warn!("commit: converted copy kept as {:?}", job.source),
                Err(back) => error!("commit: converted copy stranded at {:?}: {}", job.temp, back),
            }
            return Err(CommitError::from(err));
        }

        debug!("{:?} -> {:?} ({} bytes)", job.source, job.destination, file_size(&job.destination).unwrap_or(0));
        job.source = job.destination.clone();
        Ok(())
    }
}

fn stage_error(source: &Path, stage: ConversionStage, err: ToolError) -> ConversionError {
    ConversionError::for_file(source, stage, &err.to_string())
}

/// ffmpeg exiting 0 is not enough to throw the original away.
fn require_output(path: &Path) -> Result<(), String> {
    match file_size(path) {
        Some(size) if size > 0 => Ok(()),
        Some(_) => Err(format!("{:?} is empty", path)),
        None => Err(format!("{:?} was not written", path)),
    }
}
