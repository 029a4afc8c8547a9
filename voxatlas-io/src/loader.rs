//! Concurrent channel loading.
//!
//! Each source is read and decoded on its own worker thread. Workers send
//! decoded channel data back over a channel, tagged with the id of the
//! [`Volume`] the load was started for. The receiving side applies a message
//! only if that id matches the volume it is handed, so data from a superseded
//! load never reaches a newer volume.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, warn};
use voxatlas_core::VolumeDims;
use voxatlas_volume::{Volume, VolumeId};

use crate::png::read_packed_atlas;
use crate::reader::{read_raw_volume, SampleFormat};

/// Where one or more channels' data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Packed atlas image; `channels[i]` receives color plane `i`.
    Atlas { path: PathBuf, channels: Vec<usize> },
    /// Raw dense volume for one channel.
    Volume {
        path: PathBuf,
        channel: usize,
        format: SampleFormat,
    },
}

impl LoadSource {
    /// Channels this source fills.
    #[must_use]
    pub fn channels(&self) -> Vec<usize> {
        match self {
            LoadSource::Atlas { channels, .. } => channels.clone(),
            LoadSource::Volume { channel, .. } => vec![*channel],
        }
    }

    fn path(&self) -> &PathBuf {
        match self {
            LoadSource::Atlas { path, .. } | LoadSource::Volume { path, .. } => path,
        }
    }
}

/// Loader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderConfig {
    /// Upper bound on concurrently running workers; 0 means one per source.
    pub max_workers: usize,
}

impl LoaderConfig {
    /// Sets the worker limit.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }
}

/// Decoded data for one channel.
#[derive(Debug)]
pub enum LoadPayload {
    /// Atlas plane.
    Atlas {
        channel: usize,
        data: Vec<u8>,
        width: usize,
        height: usize,
    },
    /// Dense volume.
    Volume { channel: usize, data: Vec<u8> },
    /// The source could not be read or decoded.
    Failed { channel: usize, error: String },
}

/// Message from a worker, addressed to one volume.
#[derive(Debug)]
pub struct LoadMessage {
    /// Volume the load was started for.
    pub volume: VolumeId,
    /// Channel data or failure.
    pub payload: LoadPayload,
}

/// Outcome counts of a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Channels written into the volume.
    pub applied: usize,
    /// Channels that failed to read, decode or fit.
    pub failed: usize,
    /// Messages dropped as stale or cancelled.
    pub discarded: usize,
}

/// A running load started by [`load_channels`].
pub struct LoadSession {
    target: VolumeId,
    rx: Receiver<LoadMessage>,
    cancel_flag: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    report: LoadReport,
}

/// Starts loading `sources` for `volume` in background threads.
///
/// The returned session must be drained with [`LoadSession::apply_pending`]
/// or [`LoadSession::wait`] to move the data into the volume.
#[must_use]
pub fn load_channels(
    volume: &Volume,
    sources: Vec<LoadSource>,
    config: LoaderConfig,
) -> LoadSession {
    let target = volume.id();
    let dims = volume.dims();
    let (tx, rx) = channel();
    let cancel_flag = Arc::new(AtomicBool::new(false));

    let worker_count = match config.max_workers {
        0 => sources.len(),
        n => n.min(sources.len()),
    };
    let mut queues: Vec<Vec<LoadSource>> = vec![Vec::new(); worker_count];
    for (i, source) in sources.into_iter().enumerate() {
        queues[i % worker_count].push(source);
    }

    info!("{target}: loading with {worker_count} workers");
    let workers = queues
        .into_iter()
        .map(|queue| {
            let tx = tx.clone();
            let cancel_flag = Arc::clone(&cancel_flag);
            std::thread::spawn(move || {
                for source in queue {
                    if cancel_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    load_source_worker(&source, target, dims, &tx);
                }
            })
        })
        .collect();

    LoadSession {
        target,
        rx,
        cancel_flag,
        workers,
        report: LoadReport::default(),
    }
}

/// Reads one source and sends one message per channel it fills.
fn load_source_worker(
    source: &LoadSource,
    volume: VolumeId,
    dims: VolumeDims,
    tx: &Sender<LoadMessage>,
) {
    let send = |payload| {
        let _ = tx.send(LoadMessage { volume, payload });
    };
    debug!("{volume}: reading {}", source.path().display());

    match source {
        LoadSource::Atlas { path, channels } => match read_packed_atlas(path, channels.len()) {
            Ok(atlas) => {
                for (&channel, data) in channels.iter().zip(atlas.planes) {
                    send(LoadPayload::Atlas {
                        channel,
                        data,
                        width: atlas.width,
                        height: atlas.height,
                    });
                }
            }
            Err(e) => {
                for &channel in channels {
                    send(LoadPayload::Failed {
                        channel,
                        error: format!("{}: {e}", path.display()),
                    });
                }
            }
        },
        LoadSource::Volume {
            path,
            channel,
            format,
        } => match read_raw_volume(path, dims, *format) {
            Ok(data) => send(LoadPayload::Volume {
                channel: *channel,
                data,
            }),
            Err(e) => send(LoadPayload::Failed {
                channel: *channel,
                error: format!("{}: {e}", path.display()),
            }),
        },
    }
}

impl LoadSession {
    /// Volume this load was started for.
    #[must_use]
    pub fn target(&self) -> VolumeId {
        self.target
    }

    /// Asks workers to stop and drops any data that still arrives.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`Self::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Counts so far.
    #[must_use]
    pub fn report(&self) -> LoadReport {
        self.report
    }

    /// Applies one message to `volume` if it is addressed to it.
    pub fn apply(&mut self, message: LoadMessage, volume: &mut Volume) {
        if self.is_cancelled() || message.volume != volume.id() {
            warn!(
                "discarding stale data for {} (applying to {})",
                message.volume,
                volume.id()
            );
            self.report.discarded += 1;
            return;
        }
        let result = match message.payload {
            LoadPayload::Atlas {
                channel,
                data,
                width,
                height,
            } => volume.set_channel_data_from_atlas(channel, data, width, height),
            LoadPayload::Volume { channel, data } => {
                volume.set_channel_data_from_volume(channel, data)
            }
            LoadPayload::Failed { channel, error } => {
                if channel < volume.num_channels() {
                    volume.mark_channel_failed(channel, voxatlas_core::Error::ConfigError(error));
                } else {
                    warn!("{}: load failed for missing channel {channel}: {error}", volume.id());
                }
                self.report.failed += 1;
                return;
            }
        };
        match result {
            Ok(()) => self.report.applied += 1,
            Err(e) => {
                warn!("{}: channel data rejected: {e}", volume.id());
                self.report.failed += 1;
            }
        }
    }

    /// Applies every message that has already arrived. Returns true once all
    /// workers have finished and nothing is left to apply.
    pub fn apply_pending(&mut self, volume: &mut Volume) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(message) => self.apply(message, volume),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    /// Blocks until every worker is done, applying messages as they arrive.
    #[must_use]
    pub fn wait(mut self, volume: &mut Volume) -> LoadReport {
        while let Ok(message) = self.rx.recv() {
            self.apply(message, volume);
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("{}: loader worker panicked", self.target);
            }
        }
        info!(
            "{}: load finished ({} applied, {} failed, {} discarded)",
            self.target, self.report.applied, self.report.failed, self.report.discarded
        );
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_channels() {
        let atlas = LoadSource::Atlas {
            path: PathBuf::from("a.png"),
            channels: vec![2, 0],
        };
        let raw = LoadSource::Volume {
            path: PathBuf::from("b.raw"),
            channel: 1,
            format: SampleFormat::U8,
        };
        assert_eq!(atlas.channels(), vec![2, 0]);
        assert_eq!(raw.channels(), vec![1]);
    }

    #[test]
    fn test_config_builder() {
        assert_eq!(LoaderConfig::default().max_workers, 0);
        assert_eq!(LoaderConfig::default().with_max_workers(3).max_workers, 3);
    }
}
