//! Daemon wiring: watcher → scheduler → mapper → worker.
//!
//! The daemon owns the long-lived pieces, runs the initial scan, and
//! converts per-file failures into logged task errors so one bad input
//! never takes the process down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::filters::{ExcludeListFilter, ExtensionFilter, FilterChain, ProbeFilter};
use crate::listeners::{LoggingListener, PostListener, ProgressListener};
use crate::mapper::ProfileMapper;
use crate::scheduler::{Scheduler, TaskRunner, DEFAULT_INTER_TASK_DELAY};
use crate::watcher::{DirectoryWatcher, WatchEvent, DEFAULT_STABILIZATION};
use crate::worker::Worker;
use transmux_profile::{validate_profile, Profile, ProfileError};

/// Error type for daemon startup and shutdown.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Profile load or validation failure; fatal at startup.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Watch setup failure.
    #[error("Failed to watch input directory: {0}")]
    Watch(#[from] notify::Error),

    /// IO error (e.g. output directory creation).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runtime knobs; defaults match production behavior, tests shrink them.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Quiet window a file must survive before scheduling.
    pub stabilization: Duration,
    /// Settle delay between consecutive transcodes.
    pub inter_task_delay: Duration,
    /// Keep watching after the initial scan.
    pub watch: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            stabilization: DEFAULT_STABILIZATION,
            inter_task_delay: DEFAULT_INTER_TASK_DELAY,
            watch: false,
        }
    }
}

/// The assembled transcoding daemon.
#[derive(Debug)]
pub struct Daemon {
    profile: Arc<Profile>,
    input_root: PathBuf,
    output_root: PathBuf,
    config: DaemonConfig,
}

impl Daemon {
    /// Validate the profile and fix the directory roots.
    pub fn new(profile: Profile, config: DaemonConfig) -> Result<Self, DaemonError> {
        validate_profile(&profile)?;
        let input_root = profile.input.directory.clone().ok_or_else(|| {
            ProfileError::InvalidProfile("input directory is not set".to_string())
        })?;
        let output_root = profile.output.directory.clone().ok_or_else(|| {
            ProfileError::InvalidProfile("output directory is not set".to_string())
        })?;
        Ok(Self {
            profile: Arc::new(profile),
            input_root,
            output_root,
            config,
        })
    }

    fn build_filters(&self) -> Result<FilterChain, DaemonError> {
        let extension = ExtensionFilter::new(
            self.profile.input.include.as_deref(),
            self.profile.input.exclude.as_deref(),
        )
        .map_err(|e| ProfileError::InvalidProfile(format!("bad extension regex: {}", e)))?;

        Ok(FilterChain::new(vec![
            Box::new(ExcludeListFilter::new(
                &self.output_root,
                self.input_root.clone(),
            )),
            Box::new(extension),
            Box::new(ProbeFilter),
        ]))
    }

    /// The per-task work: probe, map, transcode, post-process.
    fn task_runner(&self) -> TaskRunner {
        let mapper = Arc::new(ProfileMapper::new(
            Arc::clone(&self.profile),
            self.input_root.clone(),
        ));
        let profile = Arc::clone(&self.profile);
        let input_root = self.input_root.clone();
        let output_root = self.output_root.clone();

        Arc::new(move |_id, file| {
            let mapper = Arc::clone(&mapper);
            let profile = Arc::clone(&profile);
            let input_root = input_root.clone();
            let output_root = output_root.clone();
            Box::pin(async move {
                let plan = mapper.plan(&file).await?;

                let input = Arc::clone(&plan.input);
                let mut worker = Worker::new(
                    Arc::clone(&input),
                    plan.outputs,
                    input_root.clone(),
                    output_root.clone(),
                );
                let output_paths = worker.output_paths();

                worker.attach(Box::new(LoggingListener::new(
                    profile.output.write_log,
                    output_root.clone(),
                    input.path.filename.clone(),
                )));
                worker.attach(Box::new(ProgressListener::new(&input)));
                worker.attach(Box::new(PostListener::new(
                    input.path.absolute(&input_root),
                    input.path.relative().to_string_lossy().into_owned(),
                    output_paths,
                    output_root.clone(),
                    profile.input.delete_after_process,
                )));

                worker.execute().await?;
                Ok(())
            })
        })
    }

    /// Feed every existing file into the watcher's pending set.
    fn initial_scan(&self, watcher: &DirectoryWatcher) -> usize {
        let mut discovered = 0;
        for entry in WalkDir::new(&self.input_root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                watcher.notify_add(entry.path().to_path_buf());
                discovered += 1;
            }
        }
        discovered
    }

    /// Run the daemon until the work is done (one-shot) or until ctrl-c
    /// (watch mode).
    pub async fn run(&self) -> Result<(), DaemonError> {
        info!(
            profile = %self.profile.id,
            input = %self.input_root.display(),
            output = %self.output_root.display(),
            mappings = self.profile.active_mappings().count(),
            watch = self.config.watch,
            "daemon starting"
        );

        std::fs::create_dir_all(&self.output_root)?;

        let scheduler = Arc::new(Scheduler::new(
            self.task_runner(),
            self.config.inter_task_delay,
        ));

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut watcher =
            DirectoryWatcher::new(self.config.stabilization, self.build_filters()?, events_tx);

        let discovered = self.initial_scan(&watcher);
        debug!(discovered, "initial scan complete");

        if self.config.watch {
            watcher.watch(&self.input_root)?;
        }

        // Pump watcher emissions into the scheduler.
        let pump_scheduler = Arc::clone(&scheduler);
        let pump = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    WatchEvent::Schedule(file) => {
                        pump_scheduler.schedule(file).await;
                    }
                    WatchEvent::Cancel(file) => {
                        pump_scheduler.cancel(&file).await;
                    }
                }
            }
        });

        if self.config.watch {
            tokio::signal::ctrl_c().await?;
            info!("shutdown requested");
        } else {
            // One-shot: wait out the stabilization flush, then drain.
            loop {
                tokio::time::sleep(Duration::from_millis(200)).await;
                if watcher.is_quiescent() && scheduler.is_idle().await {
                    break;
                }
            }
        }

        scheduler.shutdown().await;
        watcher.close();
        pump.abort();
        info!("daemon stopped");
        Ok(())
    }
}
