//! transmux engine
//!
//! Profile-driven media transcoding daemon: a directory watcher feeds a
//! single-flight scheduler, each task probes its file, expands the
//! profile's mappings into a plan, and a worker drives the transcoder
//! subprocess with logging, progress and post-processing observers.

pub mod context;
pub mod daemon;
pub mod filters;
pub mod listeners;
pub mod mapper;
pub mod mapping;
pub mod media;
pub mod predicate;
pub mod probe;
pub mod scheduler;
pub mod snippet;
pub mod watcher;
pub mod worker;

pub use transmux_profile as profile;
pub use transmux_profile::Profile;

pub use context::SnippetContext;
pub use daemon::{Daemon, DaemonConfig, DaemonError};
pub use filters::{ExcludeListFilter, ExtensionFilter, FileFilter, FilterChain, ProbeFilter};
pub use listeners::{LoggingListener, PostListener, ProgressListener, WorkerObserver};
pub use mapper::{MapperError, Plan, ProfileMapper};
pub use mapping::{resolve_outputs, MappingBuilder, MappingError};
pub use media::{Chapter, InputMedia, InputStream, MediaPath, OutputMedia, OutputStream};
pub use predicate::Predicate;
pub use probe::{probe, ProbeData, ProbeError};
pub use scheduler::{Scheduler, TaskRunner, DEFAULT_INTER_TASK_DELAY};
pub use snippet::{SnippetError, SnippetResolver, SnippetValue};
pub use watcher::{DirectoryWatcher, WatchEvent, DEFAULT_STABILIZATION};
pub use worker::{Progress, Worker, WorkerError};
