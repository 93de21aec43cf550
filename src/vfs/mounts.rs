//! Mount lifecycle and the `read_file` entry point the filesystem bridge
//! calls into.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::container::FrameSource;
use crate::pipeline::render::render_dng;
use crate::pipeline::settings::{RenderOptions, RenderSettings};
use crate::vfs::audio::wrap_wav;
use crate::vfs::cache::{ArtifactCache, FrameKey, Lookup, Waiter};
use crate::vfs::directory::VirtualDirectory;
use crate::vfs::entry::{Entry, EntryKind};
use crate::vfs::error::{status, Result, VfsError};
use crate::vfs::plan::{build_plan, FrameRatePlan};
use crate::vfs::scheduler::Scheduler;

pub type MountId = u32;

/// Default artifact cache capacity.
pub const DEFAULT_CACHE_BYTES: u64 = 512 * 1024 * 1024;

/// Headroom added to the probe render when publishing entry sizes, so every
/// frame of the mount fits under the published bound.
const SIZE_SLACK_BYTES: u64 = 64 * 1024;

/// Plan summary reported to the host UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileInfo {
    pub med_fps: f64,
    pub avg_fps: f64,
    pub fps: f64,
    pub total_frames: usize,
    pub dropped_frames: usize,
    pub duplicated_frames: usize,
    pub width: u32,
    pub height: u32,
}

/// Result of one read: a status code plus the byte range served out of the
/// shared artifact.
#[derive(Clone)]
pub struct ReadReply {
    pub status: i32,
    payload: Option<(Arc<Vec<u8>>, Range<usize>)>,
}

impl ReadReply {
    fn slice(artifact: Arc<Vec<u8>>, offset: u64, length: usize) -> Self {
        let size = artifact.len() as u64;
        if offset >= size {
            // Reads past the end are empty, not errors.
            return Self {
                status: status::OK,
                payload: None,
            };
        }
        let start = offset as usize;
        let end = (offset + length as u64).min(size) as usize;
        Self {
            status: status::OK,
            payload: Some((artifact, start..end)),
        }
    }

    fn error(status_code: i32) -> Self {
        Self {
            status: status_code,
            payload: None,
        }
    }

    pub fn bytes_written(&self) -> usize {
        self.payload.as_ref().map_or(0, |(_, range)| range.len())
    }

    /// The served bytes, empty on error or end-of-file reads.
    pub fn data(&self) -> &[u8] {
        self.payload
            .as_ref()
            .map_or(&[], |(artifact, range)| &artifact[range.clone()])
    }

    /// Copy the served bytes into a caller buffer, returning the count.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let data = self.data();
        let n = data.len().min(dst.len());
        dst[..n].copy_from_slice(&data[..n]);
        n
    }
}

/// Invoked exactly once per read with the outcome.
pub type ReadCompletion = Box<dyn FnOnce(ReadReply) + Send>;

struct MountState {
    directory: VirtualDirectory,
    plan: FrameRatePlan,
    typical_dng_size: u64,
    width: u32,
    height: u32,
}

struct Mount {
    id: MountId,
    source: Arc<dyn FrameSource>,
    base_name: String,
    timestamps: Vec<i64>,
    exposure_products: Vec<f64>,
    audio_wav: Option<Arc<Vec<u8>>>,
    settings: Mutex<RenderSettings>,
    state: RwLock<MountState>,
    /// Serializes raw container reads on this mount's file handle.
    read_lock: Mutex<()>,
    cancelled: AtomicBool,
}

impl Mount {
    fn cfr_plan(&self, settings: &RenderSettings) -> Result<FrameRatePlan> {
        let cfr = settings
            .options
            .contains(RenderOptions::FRAMERATE_CONVERSION)
            .then_some(&settings.cfr_target);
        build_plan(&self.timestamps, &self.exposure_products, cfr)
    }

    /// Render the first output frame once to bound the per-entry size.
    fn probe_typical_size(&self, plan: &FrameRatePlan, settings: &RenderSettings) -> Result<u64> {
        let source_index = plan.source_frame(0).unwrap_or(0);
        let _guard = self.read_lock.lock();
        let raw = self.source.read_frame(source_index)?;
        let metadata = self.source.frame_metadata(source_index)?;
        let probe = render_dng(
            &raw,
            &metadata,
            self.source.configuration(),
            plan.target_fps,
            0,
            plan.baseline_exposure_value,
            settings,
        )?;

        let size = probe.len() as u64;
        let padded = (size + size / 5).max(size + SIZE_SLACK_BYTES);
        Ok(padded.next_multiple_of(4096))
    }
}

/// Owner of all live mounts, their caches and worker pools.
pub struct MountRegistry {
    scheduler: Scheduler,
    cache: Arc<ArtifactCache>,
    mounts: RwLock<HashMap<MountId, Arc<Mount>>>,
    next_id: AtomicU32,
    /// Whether the filesystem bridge reports case-insensitive lookups.
    case_insensitive: bool,
}

impl MountRegistry {
    pub fn new(cache_bytes: u64, case_insensitive: bool) -> Self {
        Self {
            scheduler: Scheduler::new(),
            cache: Arc::new(ArtifactCache::new(cache_bytes)),
            mounts: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            case_insensitive,
        }
    }

    fn mount_ref(&self, id: MountId) -> Result<Arc<Mount>> {
        self.mounts
            .read()
            .get(&id)
            .cloned()
            .ok_or(VfsError::UnknownMount(id))
    }

    /// Parse a container into a published virtual directory.
    ///
    /// `base_name` names the directory the bridge exposes; entries live
    /// under it.
    pub fn mount(
        &self,
        settings: RenderSettings,
        source: Arc<dyn FrameSource>,
        base_name: &str,
    ) -> Result<MountId> {
        let timestamps = source.timestamps();
        let frame_count = source.frame_count();
        if frame_count < 2 {
            return Err(VfsError::InvalidContainer(format!(
                "need at least 2 frames, got {frame_count}"
            )));
        }
        if timestamps.len() != frame_count {
            return Err(VfsError::InvalidContainer(format!(
                "{} timestamps for {} frames",
                timestamps.len(),
                frame_count
            )));
        }

        let mut exposure_products = Vec::with_capacity(frame_count);
        for index in 0..frame_count {
            let metadata = source.frame_metadata(index)?;
            exposure_products.push(metadata.iso as f64 * metadata.exposure_time_ns as f64);
        }

        let first_metadata = source.frame_metadata(0)?;
        let audio_wav = source.audio().map(|track| Arc::new(wrap_wav(&track)));

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mount = Mount {
            id,
            source,
            base_name: base_name.to_string(),
            timestamps,
            exposure_products,
            audio_wav,
            settings: Mutex::new(settings.clone()),
            state: RwLock::new(MountState {
                // Placeholder until the plan and probe below fill it in.
                directory: VirtualDirectory::new(base_name, 0, 0, None, self.case_insensitive),
                plan: FrameRatePlan {
                    med_fps: 0.0,
                    avg_fps: 0.0,
                    target_fps: 0.0,
                    total_frames: 0,
                    dropped_frames: 0,
                    duplicated_frames: 0,
                    baseline_exposure_value: 0.0,
                    mapping: Vec::new(),
                },
                typical_dng_size: 0,
                width: first_metadata.width,
                height: first_metadata.height,
            }),
            read_lock: Mutex::new(()),
            cancelled: AtomicBool::new(false),
        };

        let plan = mount.cfr_plan(&settings)?;
        let typical = mount.probe_typical_size(&plan, &settings)?;
        {
            let mut state = mount.state.write();
            state.directory = VirtualDirectory::new(
                base_name,
                plan.output_frames(),
                typical,
                mount.audio_wav.as_ref().map(|wav| wav.len() as u64),
                self.case_insensitive,
            );
            state.plan = plan;
            state.typical_dng_size = typical;
        }

        info!(
            mount = id,
            base_name,
            frames = frame_count,
            "mounted container"
        );
        self.mounts.write().insert(id, Arc::new(mount));
        Ok(id)
    }

    /// Replace a mount's settings and republish its directory metadata.
    /// Cached artifacts under the old fingerprint simply age out.
    pub fn update_options(&self, id: MountId, settings: RenderSettings) -> Result<()> {
        let mount = self.mount_ref(id)?;

        let plan = mount.cfr_plan(&settings)?;
        let typical = mount.probe_typical_size(&plan, &settings)?;

        *mount.settings.lock() = settings;
        let mut state = mount.state.write();
        state.directory = VirtualDirectory::new(
            &mount.base_name,
            plan.output_frames(),
            typical,
            mount.audio_wav.as_ref().map(|wav| wav.len() as u64),
            self.case_insensitive,
        );
        state.plan = plan;
        state.typical_dng_size = typical;

        info!(mount = id, "updated render options");
        Ok(())
    }

    /// Tear a mount down. In-flight builds observe the cancel flag at pool
    /// boundaries; their waiters get a cancelled status.
    pub fn unmount(&self, id: MountId) -> Result<()> {
        let mount = self
            .mounts
            .write()
            .remove(&id)
            .ok_or(VfsError::UnknownMount(id))?;
        mount.cancelled.store(true, Ordering::SeqCst);
        self.cache.remove_mount(id);
        info!(mount = id, "unmounted");
        Ok(())
    }

    pub fn file_info(&self, id: MountId) -> Result<FileInfo> {
        let mount = self.mount_ref(id)?;
        let state = mount.state.read();
        Ok(FileInfo {
            med_fps: state.plan.med_fps,
            avg_fps: state.plan.avg_fps,
            fps: state.plan.target_fps,
            total_frames: state.plan.total_frames,
            dropped_frames: state.plan.dropped_frames,
            duplicated_frames: state.plan.duplicated_frames,
            width: state.width,
            height: state.height,
        })
    }

    pub fn list_files(&self, id: MountId, filter: &str) -> Result<Vec<Entry>> {
        let mount = self.mount_ref(id)?;
        let state = mount.state.read();
        Ok(state.directory.list(filter))
    }

    pub fn find_entry(&self, id: MountId, full_path: &str) -> Result<Entry> {
        let mount = self.mount_ref(id)?;
        let state = mount.state.read();
        state
            .directory
            .find_entry(full_path)
            .cloned()
            .ok_or_else(|| VfsError::NotFound(full_path.to_string()))
    }

    /// Serve `length` bytes at `offset` of a virtual file.
    ///
    /// The completion always runs exactly once, possibly on a worker thread.
    /// In synchronous mode the call blocks until the completion has run and
    /// returns the byte count (or the negative status); in asynchronous mode
    /// it returns 0 immediately.
    pub fn read_file(
        &self,
        id: MountId,
        entry: &Entry,
        offset: u64,
        length: usize,
        completion: ReadCompletion,
        asynchronous: bool,
    ) -> isize {
        if asynchronous {
            self.start_read(id, entry, offset, length, completion);
            return 0;
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let wrapped: ReadCompletion = Box::new(move |reply: ReadReply| {
            let outcome = (reply.bytes_written(), reply.status);
            completion(reply);
            let _ = tx.send(outcome);
        });
        self.start_read(id, entry, offset, length, wrapped);

        match rx.recv() {
            Ok((bytes, code)) if code == status::OK => bytes as isize,
            Ok((_, code)) => code as isize,
            Err(_) => status::IO as isize,
        }
    }

    fn start_read(
        &self,
        id: MountId,
        entry: &Entry,
        offset: u64,
        length: usize,
        completion: ReadCompletion,
    ) {
        let mount = match self.mount_ref(id) {
            Ok(mount) => mount,
            Err(err) => {
                completion(ReadReply::error(err.status()));
                return;
            }
        };

        if entry.kind == EntryKind::Dir {
            completion(ReadReply::error(status::INVALID_ARGUMENT));
            return;
        }

        // Audio needs no build: a direct slice of the prepared WAV.
        if entry.name == crate::vfs::directory::AUDIO_FILE_NAME {
            match &mount.audio_wav {
                Some(wav) => completion(ReadReply::slice(wav.clone(), offset, length)),
                None => completion(ReadReply::error(status::NOT_FOUND)),
            }
            return;
        }

        let output_index = match entry.frame_index {
            Some(index) => index,
            None => {
                // An entry handed back by the bridge without its frame index
                // is re-resolved by path.
                let state = mount.state.read();
                match state
                    .directory
                    .find_entry(&entry.full_path())
                    .and_then(|e| e.frame_index)
                {
                    Some(index) => index,
                    None => {
                        drop(state);
                        completion(ReadReply::error(status::NOT_FOUND));
                        return;
                    }
                }
            }
        };

        // Snapshot settings and plan so the build closes over stable copies.
        let settings = mount.settings.lock().clone();
        let fingerprint = settings.fingerprint();
        let (source_index, target_fps, baseline, published_size) = {
            let state = mount.state.read();
            match state.plan.source_frame(output_index as usize) {
                Some(source_index) => (
                    source_index,
                    state.plan.target_fps,
                    state.plan.baseline_exposure_value,
                    state.typical_dng_size,
                ),
                None => {
                    drop(state);
                    completion(ReadReply::error(status::NOT_FOUND));
                    return;
                }
            }
        };

        let key = FrameKey {
            mount: id,
            output_index,
            fingerprint,
        };
        let waiter: Waiter = Box::new(move |result| match result {
            Ok(artifact) => completion(ReadReply::slice(artifact, offset, length)),
            Err(code) => completion(ReadReply::error(code)),
        });

        match self.cache.lookup_or_attach(key, waiter) {
            (Lookup::Hit(artifact), Some(waiter)) => waiter(Ok(artifact)),
            (Lookup::Attached, _) => {}
            (Lookup::Owner, _) => {
                self.spawn_build(
                    mount,
                    key,
                    source_index,
                    output_index,
                    target_fps,
                    baseline,
                    published_size,
                    settings,
                );
            }
            (Lookup::Hit(_), None) => unreachable!("hits hand the waiter back"),
        }
    }

    /// Owner path of a cache miss: I/O pool fetches the raw frame, CPU pool
    /// renders it, and the finisher fans the artifact out to every waiter.
    #[allow(clippy::too_many_arguments)]
    fn spawn_build(
        &self,
        mount: Arc<Mount>,
        key: FrameKey,
        source_index: usize,
        output_index: u32,
        target_fps: f64,
        baseline: f64,
        published_size: u64,
        settings: RenderSettings,
    ) {
        let cache = self.cache.clone();
        let cpu = self.scheduler.cpu_handle();

        self.scheduler.spawn_io(move || {
            if mount.cancelled.load(Ordering::SeqCst) {
                publish(&cache, key, Err(status::CANCELLED));
                return;
            }

            let io_result = {
                let _guard = mount.read_lock.lock();
                mount
                    .source
                    .read_frame(source_index)
                    .and_then(|raw| Ok((raw, mount.source.frame_metadata(source_index)?)))
            };

            let (raw, metadata) = match io_result {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(mount = mount.id, source_index, error = %err, "frame read failed");
                    publish(&cache, key, Err(VfsError::from(err).status()));
                    return;
                }
            };

            cpu.spawn(move || {
                if mount.cancelled.load(Ordering::SeqCst) {
                    publish(&cache, key, Err(status::CANCELLED));
                    return;
                }

                let rendered = render_dng(
                    &raw,
                    &metadata,
                    mount.source.configuration(),
                    target_fps,
                    output_index,
                    baseline,
                    &settings,
                );

                match rendered {
                    Ok(bytes) => {
                        if bytes.len() as u64 > published_size {
                            warn!(
                                mount = mount.id,
                                output_index,
                                actual = bytes.len(),
                                published = published_size,
                                "artifact exceeds published entry size"
                            );
                        }
                        publish(&cache, key, Ok(Arc::new(bytes)));
                    }
                    Err(err) => {
                        warn!(mount = mount.id, output_index, error = %err, "render failed");
                        publish(&cache, key, Err(VfsError::from(err).status()));
                    }
                }
            });
        });
    }
}

/// Publish a build outcome and notify every attached waiter. Each waiter
/// gets its own reference onto the shared artifact.
fn publish(cache: &ArtifactCache, key: FrameKey, result: std::result::Result<Arc<Vec<u8>>, i32>) {
    let waiters = cache.complete(key, result.clone());
    for waiter in waiters {
        waiter(result.clone());
    }
}
