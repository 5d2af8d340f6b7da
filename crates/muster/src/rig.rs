//! Orchestration facade.
//!
//! One `Rig` per server instance owns the session state machine, the
//! process tracker, and the device collaborators, and is the only place
//! where operator actions mutate them. Starts follow the reserve /
//! network call / commit-or-rollback pattern: the tracker slot is taken
//! under the lock, the spawn or remote call runs with no lock held, and
//! the slot is committed or released on the outcome. A timed-out remote
//! start therefore never leaks a handle.

use crate::actionlog::{ActionLog, ActionLogEntry};
use crate::error::{Result, RigError};
use crate::guard::{self, StorageInspector};
use crate::local::{CaptureMode, ProcessControl};
use crate::registry::{DeviceName, Registry};
use crate::remote::{CommandChannel, Dispatcher, Reachability};
use crate::sessions::{Block, Session, SessionManager};
use crate::store::RigStore;
use crate::tracker::{ProcessHandle, ProcessId, ProcessTracker, Scope, TrackerStats};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Per-device outcome of a batch start.
pub struct StartOutcome {
    pub device: DeviceName,
    pub result: Result<ProcessHandle>,
}

pub struct Rig {
    registry: Arc<Registry>,
    tracker: ProcessTracker,
    sessions: SessionManager,
    log: ActionLog,
    dispatcher: Dispatcher,
    local: Arc<dyn ProcessControl>,
    inspector: Arc<dyn StorageInspector>,
    store: Arc<dyn RigStore>,
}

impl Rig {
    pub fn new(
        registry: Arc<Registry>,
        data_root: PathBuf,
        store: Arc<dyn RigStore>,
        channel: Arc<dyn CommandChannel>,
        remote_timeout: Duration,
        local: Arc<dyn ProcessControl>,
        inspector: Arc<dyn StorageInspector>,
    ) -> Result<Self> {
        let log = ActionLog::load(store.clone())?;
        Ok(Self {
            registry,
            tracker: ProcessTracker::new(),
            sessions: SessionManager::new(data_root),
            log,
            dispatcher: Dispatcher::new(channel, remote_timeout),
            local,
            inspector,
            store,
        })
    }

    // --- Session lifecycle ---
    //
    // Transitions apply in memory first, then write through to the
    // store. A store failure surfaces to the operator while the
    // transition stands; the next successful mutation rewrites the
    // full session record.

    pub fn start_session(
        &self,
        user: &str,
        folder: &str,
        notes: &str,
    ) -> Result<Session> {
        let session = self.sessions.start_session(user, folder, notes)?;
        self.store.save_session(&session)?;
        self.log.append(user, folder, "session", "start session")?;
        Ok(session)
    }

    pub fn new_block(&self, user: &str, notes: &str) -> Result<Block> {
        let block = self.sessions.new_block(notes)?;
        std::fs::create_dir_all(&block.path)?;
        if let Some(session) = self.sessions.active() {
            self.store.save_session(&session)?;
        }
        self.log
            .append(user, block.id.as_str(), "session", "new block")?;
        Ok(block)
    }

    /// End the active session. Refuses while any process is still
    /// recording to the active block; the operator kills those first.
    pub fn end_session(&self, user: &str) -> Result<Session> {
        let blocking = self.devices_recording_active_block();
        let session = self.sessions.end_session(&blocking)?;
        self.store.save_session(&session)?;
        self.log
            .append(user, &session.folder, "session", "end session")?;
        Ok(session)
    }

    /// Devices holding the active block: committed recordings plus
    /// starts still in their spawn phase. Counting reservations keeps
    /// `end_session` from slipping past an in-flight start.
    fn devices_recording_active_block(&self) -> Vec<DeviceName> {
        let Some(block) = self.sessions.active_block() else {
            return Vec::new();
        };
        self.tracker.devices_writing_block(block.id.as_str())
    }

    // --- Overwrite guard ---

    /// Cameras whose recording at the active block's path would be
    /// overwritten by a new start.
    pub fn overwrite_check(&self) -> Result<Vec<DeviceName>> {
        let block = self
            .sessions
            .active_block()
            .ok_or_else(|| RigError::Conflict("no active block".to_string()))?;
        Ok(guard::cameras_with_existing_recording(
            self.inspector.as_ref(),
            &block,
            self.registry.cameras(),
        ))
    }

    // --- Local starts ---

    pub async fn start_camera(
        &self,
        user: &str,
        name: &DeviceName,
        mode: CaptureMode,
        allow_overwrite: bool,
    ) -> Result<ProcessHandle> {
        let device = self
            .registry
            .get(name)
            .ok_or_else(|| RigError::UnknownDevice(name.to_string()))?;
        if !device.is_local() {
            return Err(RigError::Conflict(format!("{} is not a camera", name)));
        }

        let (description, block_label, output) = match mode {
            CaptureMode::Record => {
                let block = self.sessions.active_block().ok_or_else(|| {
                    RigError::Conflict("no active block, start a session and block first".to_string())
                })?;
                if !allow_overwrite && self.inspector.has_recording(&block.path, name) {
                    return Err(RigError::Conflict(format!(
                        "{} already has a recording at {}, confirm overwrite to proceed",
                        name,
                        block.path.display()
                    )));
                }
                (
                    format!("recording {}", block.id),
                    Some(block.id.to_string()),
                    Some(block.path.join(format!("{}.avi", name))),
                )
            }
            CaptureMode::Preview => ("preview".to_string(), None, None),
        };

        self.tracker.reserve(device, &description, block_label)?;
        match self.local.spawn(device, mode, output.as_deref()).await {
            Ok(pid) => {
                let handle = self.tracker.commit(device, ProcessId::Local(pid))?;
                let verb = match mode {
                    CaptureMode::Record => "start recording",
                    CaptureMode::Preview => "start preview",
                };
                self.log.append(user, name.as_str(), "camera", verb)?;
                Ok(handle)
            }
            Err(e) => {
                self.tracker.abort(name);
                Err(e)
            }
        }
    }

    /// Start recording on every configured camera. One camera failing
    /// never prevents attempting the others; the caller gets a
    /// per-device report.
    pub async fn start_all_cameras(
        &self,
        user: &str,
        allow_overwrite: bool,
    ) -> Vec<StartOutcome> {
        let cameras: Vec<DeviceName> = self
            .registry
            .cameras()
            .map(|d| d.name().clone())
            .collect();

        let mut outcomes = Vec::with_capacity(cameras.len());
        for name in cameras {
            let result = self
                .start_camera(user, &name, CaptureMode::Record, allow_overwrite)
                .await;
            if let Err(e) = &result {
                warn!(device = %name, error = %e, "camera start failed");
            }
            outcomes.push(StartOutcome { device: name, result });
        }
        outcomes
    }

    // --- Remote controllers ---

    pub async fn start_controller(&self, user: &str, name: &DeviceName) -> Result<ProcessHandle> {
        let device = self
            .registry
            .get(name)
            .ok_or_else(|| RigError::UnknownDevice(name.to_string()))?;
        let spec = device
            .as_remote()
            .ok_or_else(|| RigError::Conflict(format!("{} is not a remote controller", name)))?;

        self.tracker.reserve(device, &device.description(), None)?;
        match self.dispatcher.start(spec).await {
            Ok(pid) => {
                let handle = self.tracker.commit(device, pid)?;
                self.log.append(user, name.as_str(), "rpi", "start")?;
                Ok(handle)
            }
            Err(e) => {
                self.tracker.abort(name);
                Err(e)
            }
        }
    }

    pub async fn test_connection(&self, name: &DeviceName) -> Result<Reachability> {
        let device = self
            .registry
            .get(name)
            .ok_or_else(|| RigError::UnknownDevice(name.to_string()))?;
        let spec = device
            .as_remote()
            .ok_or_else(|| RigError::Conflict(format!("{} is not a remote controller", name)))?;
        Ok(self.dispatcher.test_connection(spec).await)
    }

    /// Terminate every acquisition process on the controller, tracked or
    /// not, and clear its slot.
    pub async fn stop_all_remote(&self, user: &str, name: &DeviceName) -> Result<()> {
        let device = self
            .registry
            .get(name)
            .ok_or_else(|| RigError::UnknownDevice(name.to_string()))?;
        let spec = device
            .as_remote()
            .ok_or_else(|| RigError::Conflict(format!("{} is not a remote controller", name)))?;

        self.dispatcher.stop_all(spec).await?;
        self.tracker.unregister(name);
        self.log.append(user, name.as_str(), "rpi", "kill all")?;
        Ok(())
    }

    // --- Kill ---

    /// Terminate the process tracked for `target` (a device name or a
    /// raw pid). The handle is removed only on confirmed termination; a
    /// failed kill leaves it registered so the operator can retry.
    pub async fn kill(&self, user: &str, target: &str) -> Result<()> {
        let handle = self.resolve_target(target)?;
        let device = self
            .registry
            .get(&handle.device)
            .ok_or_else(|| RigError::UnknownDevice(handle.device.to_string()))?;

        let result = match device.as_remote() {
            None => self.local.kill(device, handle.pid.raw()).await,
            Some(spec) => self.dispatcher.stop(spec, handle.pid.raw()).await,
        };

        match result {
            Ok(()) => {
                self.tracker.unregister(&handle.device);
                let category = if device.is_local() { "camera" } else { "rpi" };
                self.log.append(user, handle.device.as_str(), category, "kill")?;
                Ok(())
            }
            Err(RigError::ProcessNotFound(detail)) => {
                // Already gone underneath us; drop the stale handle so
                // the ledger matches reality, but still tell the operator.
                self.tracker.unregister(&handle.device);
                Err(RigError::ProcessNotFound(detail))
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_target(&self, target: &str) -> Result<ProcessHandle> {
        if let Some(handle) = self.tracker.get(&DeviceName::new(target)) {
            return Ok(handle);
        }
        if let Ok(pid) = target.parse::<u32>() {
            if let Some(handle) = self.tracker.find_by_pid(pid) {
                return Ok(handle);
            }
        }
        Err(RigError::ProcessNotFound(target.to_string()))
    }

    // --- Read-only views ---

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn active_session(&self) -> Option<Session> {
        self.sessions.active()
    }

    pub fn active_block(&self) -> Option<Block> {
        self.sessions.active_block()
    }

    pub fn processes(&self, scope: Scope) -> Vec<ProcessHandle> {
        self.tracker.list_active(scope)
    }

    /// Devices with no running or starting process.
    pub fn idle_devices(&self) -> Vec<DeviceName> {
        self.registry
            .devices()
            .iter()
            .map(|d| d.name())
            .filter(|n| self.tracker.is_idle(n))
            .cloned()
            .collect()
    }

    pub fn recent_log(&self, offset: usize, limit: usize) -> Vec<ActionLogEntry> {
        self.log.recent(offset, limit)
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.tracker.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Device;
    use crate::remote::ChannelOutput;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Process control that hands out sequential pids and records kills.
    struct FakeControl {
        next_pid: AtomicU32,
        killed: Mutex<Vec<u32>>,
        fail_spawn_for: Option<String>,
    }

    impl FakeControl {
        fn new() -> Self {
            Self {
                next_pid: AtomicU32::new(1822),
                killed: Mutex::new(Vec::new()),
                fail_spawn_for: None,
            }
        }

        fn failing_for(name: &str) -> Self {
            Self {
                fail_spawn_for: Some(name.to_string()),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ProcessControl for FakeControl {
        async fn spawn(
            &self,
            camera: &Device,
            _mode: CaptureMode,
            _output: Option<&Path>,
        ) -> Result<u32> {
            if self.fail_spawn_for.as_deref() == Some(camera.name().as_str()) {
                return Err(RigError::Io(std::io::Error::other("spawn failed")));
            }
            Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
        }

        async fn kill(&self, _camera: &Device, pid: u32) -> Result<()> {
            self.killed.lock().unwrap().push(pid);
            Ok(())
        }
    }

    /// Channel scripted per command prefix.
    struct FakeChannel {
        start_reply: std::io::Result<ChannelOutput>,
        delay: Option<Duration>,
    }

    impl FakeChannel {
        fn pid(pid: u32) -> Self {
            Self {
                start_reply: Ok(ChannelOutput {
                    success: true,
                    stdout: format!("{}\n", pid),
                    stderr: String::new(),
                }),
                delay: None,
            }
        }

        fn stalled() -> Self {
            Self {
                start_reply: Ok(ChannelOutput {
                    success: true,
                    stdout: String::new(),
                    stderr: String::new(),
                }),
                delay: Some(Duration::from_secs(3600)),
            }
        }
    }

    #[async_trait]
    impl CommandChannel for FakeChannel {
        async fn exec(
            &self,
            _address: &crate::registry::RemoteAddress,
            _command: &str,
        ) -> std::io::Result<ChannelOutput> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.start_reply {
                Ok(output) => Ok(output.clone()),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    /// Control whose spawn blocks until released, for exercising the
    /// window between reserve and commit.
    struct GatedControl {
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl ProcessControl for GatedControl {
        async fn spawn(
            &self,
            _camera: &Device,
            _mode: CaptureMode,
            _output: Option<&Path>,
        ) -> Result<u32> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(1822)
        }

        async fn kill(&self, _camera: &Device, _pid: u32) -> Result<()> {
            Ok(())
        }
    }

    /// Store whose next session save fails, then recovers.
    struct FlakyStore {
        inner: crate::store::FileStore,
        fail_next_save: AtomicBool,
    }

    impl RigStore for FlakyStore {
        fn save_session(&self, session: &Session) -> Result<()> {
            if self.fail_next_save.swap(false, Ordering::SeqCst) {
                return Err(RigError::Io(std::io::Error::other("disk full")));
            }
            self.inner.save_session(session)
        }

        fn load_sessions(&self) -> Result<Vec<Session>> {
            self.inner.load_sessions()
        }

        fn append_log(&self, entry: &ActionLogEntry) -> Result<()> {
            self.inner.append_log(entry)
        }

        fn load_log(&self) -> Result<Vec<ActionLogEntry>> {
            self.inner.load_log()
        }
    }

    struct NoRecordings;

    impl StorageInspector for NoRecordings {
        fn has_recording(&self, _block_path: &Path, _device: &DeviceName) -> bool {
            false
        }
    }

    struct AlwaysRecorded;

    impl StorageInspector for AlwaysRecorded {
        fn has_recording(&self, _block_path: &Path, _device: &DeviceName) -> bool {
            true
        }
    }

    fn registry() -> Arc<Registry> {
        let config: musterconf::MusterConfig = toml::from_str(
            r#"
data_root = "/data/acq"

[[camera]]
name = "CAM0"
state_file = "/states/CAM0.xml"

[[camera]]
name = "CAM1"
state_file = "/states/CAM1.xml"

[[controller]]
name = "pwm0"
rpi_type = "pwm"
host = "10.0.0.31"
user = "pi"
script = "/home/pi/pwm/main.py"
description = "PWM pulse generator"
"#,
        )
        .unwrap();
        Arc::new(Registry::from_config(&config))
    }

    struct TestRig {
        rig: Rig,
        _dir: tempfile::TempDir,
    }

    fn rig_with(
        control: FakeControl,
        channel: FakeChannel,
        inspector: Arc<dyn StorageInspector>,
        timeout: Duration,
    ) -> TestRig {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            crate::store::FileStore::open(dir.path().join("state.json")).unwrap(),
        );
        let rig = Rig::new(
            registry(),
            dir.path().to_path_buf(),
            store,
            Arc::new(channel),
            timeout,
            Arc::new(control),
            inspector,
        )
        .unwrap();
        TestRig { rig, _dir: dir }
    }

    fn default_rig() -> TestRig {
        rig_with(
            FakeControl::new(),
            FakeChannel::pid(4321),
            Arc::new(NoRecordings),
            Duration::from_secs(1),
        )
    }

    fn cam0() -> DeviceName {
        DeviceName::new("CAM0")
    }

    #[tokio::test]
    async fn test_full_block_lifecycle() {
        let t = default_rig();

        t.rig.start_session("fayat", "2020-11-23_rat1", "").unwrap();
        t.rig.new_block("fayat", "").unwrap();

        let handle = t
            .rig
            .start_camera("fayat", &cam0(), CaptureMode::Record, false)
            .await
            .unwrap();
        assert_eq!(handle.pid, ProcessId::Local(1822));
        assert_eq!(handle.block.as_deref(), Some("block_0"));

        let local = t.rig.processes(Scope::Local);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].device, cam0());

        t.rig.kill("fayat", "CAM0").await.unwrap();
        assert!(t.rig.processes(Scope::Local).is_empty());

        // start session, start recording, kill - in order, newest first.
        let log = t.rig.recent_log(0, 10);
        let actions: Vec<&str> = log.iter().rev().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            vec!["start session", "new block", "start recording", "kill"]
        );
    }

    #[tokio::test]
    async fn test_record_requires_active_block() {
        let t = default_rig();
        let err = t
            .rig
            .start_camera("fayat", &cam0(), CaptureMode::Record, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RigError::Conflict(_)));

        // Preview needs no session at all.
        t.rig
            .start_camera("fayat", &cam0(), CaptureMode::Preview, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_overwrite_guard_blocks_until_confirmed() {
        let t = rig_with(
            FakeControl::new(),
            FakeChannel::pid(4321),
            Arc::new(AlwaysRecorded),
            Duration::from_secs(1),
        );
        t.rig.start_session("fayat", "2020-11-23_rat1", "").unwrap();
        t.rig.new_block("fayat", "").unwrap();

        assert_eq!(
            t.rig.overwrite_check().unwrap(),
            vec![cam0(), DeviceName::new("CAM1")]
        );

        let err = t
            .rig
            .start_camera("fayat", &cam0(), CaptureMode::Record, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RigError::Conflict(_)));
        assert!(t.rig.processes(Scope::Local).is_empty());

        // Explicit confirmation proceeds.
        t.rig
            .start_camera("fayat", &cam0(), CaptureMode::Record, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_start_reports_per_device() {
        let t = rig_with(
            FakeControl::failing_for("CAM0"),
            FakeChannel::pid(4321),
            Arc::new(NoRecordings),
            Duration::from_secs(1),
        );
        t.rig.start_session("fayat", "2020-11-23_rat1", "").unwrap();
        t.rig.new_block("fayat", "").unwrap();

        let outcomes = t.rig.start_all_cameras("fayat", false).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());

        // The failure left no reservation behind.
        let active = t.rig.processes(Scope::Local);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].device, DeviceName::new("CAM1"));
    }

    #[tokio::test]
    async fn test_remote_start_registers_handle() {
        let t = default_rig();
        let pwm = DeviceName::new("pwm0");

        let handle = t.rig.start_controller("fayat", &pwm).await.unwrap();
        assert_eq!(handle.pid, ProcessId::Remote(4321));

        let remote = t.rig.processes(Scope::Remote(Some("pwm".to_string())));
        assert_eq!(remote.len(), 1);
        assert!(!t.rig.idle_devices().contains(&pwm));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_timeout_leaves_tracker_unchanged() {
        let t = rig_with(
            FakeControl::new(),
            FakeChannel::stalled(),
            Arc::new(NoRecordings),
            Duration::from_millis(100),
        );
        let pwm = DeviceName::new("pwm0");

        let err = t.rig.start_controller("fayat", &pwm).await.unwrap_err();
        assert!(matches!(err, RigError::RemoteStart { .. }));

        // No handle registered, slot free for a retry.
        assert!(t.rig.processes(Scope::All).is_empty());
        assert!(t.rig.idle_devices().contains(&pwm));
    }

    #[tokio::test]
    async fn test_kill_unknown_target() {
        let t = default_rig();
        let err = t.rig.kill("fayat", "CAM0").await.unwrap_err();
        assert!(matches!(err, RigError::ProcessNotFound(_)));
        assert!(t.rig.processes(Scope::All).is_empty());
    }

    #[tokio::test]
    async fn test_kill_by_pid() {
        let t = default_rig();
        t.rig
            .start_camera("fayat", &cam0(), CaptureMode::Preview, false)
            .await
            .unwrap();

        t.rig.kill("fayat", "1822").await.unwrap();
        assert!(t.rig.processes(Scope::All).is_empty());
    }

    #[tokio::test]
    async fn test_end_session_blocked_by_recording_only() {
        let t = default_rig();
        t.rig.start_session("fayat", "2020-11-23_rat1", "").unwrap();
        t.rig.new_block("fayat", "").unwrap();

        t.rig
            .start_camera("fayat", &cam0(), CaptureMode::Record, false)
            .await
            .unwrap();
        // Preview on the other camera does not write to the block.
        t.rig
            .start_camera("fayat", &DeviceName::new("CAM1"), CaptureMode::Preview, false)
            .await
            .unwrap();

        let err = t.rig.end_session("fayat").unwrap_err();
        match err {
            RigError::Conflict(msg) => {
                assert!(msg.contains("CAM0"));
                assert!(!msg.contains("CAM1"));
            }
            other => panic!("unexpected error: {other}"),
        }

        t.rig.kill("fayat", "CAM0").await.unwrap();
        t.rig.end_session("fayat").unwrap();
        assert!(t.rig.active_session().is_none());
    }

    #[tokio::test]
    async fn test_end_session_refuses_during_inflight_start() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            crate::store::FileStore::open(dir.path().join("state.json")).unwrap(),
        );
        let rig = Arc::new(
            Rig::new(
                registry(),
                dir.path().to_path_buf(),
                store,
                Arc::new(FakeChannel::pid(4321)),
                Duration::from_secs(1),
                Arc::new(GatedControl {
                    entered: entered.clone(),
                    release: release.clone(),
                }),
                Arc::new(NoRecordings),
            )
            .unwrap(),
        );

        rig.start_session("fayat", "2020-11-23_rat1", "").unwrap();
        rig.new_block("fayat", "").unwrap();

        let starter = rig.clone();
        let start = tokio::spawn(async move {
            starter
                .start_camera("fayat", &cam0(), CaptureMode::Record, false)
                .await
        });
        entered.notified().await;

        // The reservation holds the block while the spawn is in flight,
        // so the session cannot end under it.
        let err = rig.end_session("fayat").unwrap_err();
        match err {
            RigError::Conflict(msg) => assert!(msg.contains("CAM0")),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(rig.active_session().is_some());

        release.notify_one();
        let handle = start.await.unwrap().unwrap();
        assert_eq!(handle.block.as_deref(), Some("block_0"));

        rig.kill("fayat", "CAM0").await.unwrap();
        rig.end_session("fayat").unwrap();
        assert!(rig.active_session().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_leaves_session_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore {
            inner: crate::store::FileStore::open(dir.path().join("state.json")).unwrap(),
            fail_next_save: AtomicBool::new(true),
        });
        let rig = Rig::new(
            registry(),
            dir.path().to_path_buf(),
            store.clone(),
            Arc::new(FakeChannel::pid(4321)),
            Duration::from_secs(1),
            Arc::new(FakeControl::new()),
            Arc::new(NoRecordings),
        )
        .unwrap();

        // The write failed but the transition stands.
        let err = rig.start_session("fayat", "2020-11-23_rat1", "").unwrap_err();
        assert!(matches!(err, RigError::Io(_)));
        assert!(rig.active_session().is_some());
        assert!(store.load_sessions().unwrap().is_empty());

        // The next mutation rewrites the full session record.
        rig.new_block("fayat", "").unwrap();
        let sessions = store.load_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_double_start_same_camera_conflicts() {
        let t = default_rig();
        t.rig.start_session("fayat", "2020-11-23_rat1", "").unwrap();
        t.rig.new_block("fayat", "").unwrap();

        t.rig
            .start_camera("fayat", &cam0(), CaptureMode::Record, false)
            .await
            .unwrap();
        let err = t
            .rig
            .start_camera("fayat", &cam0(), CaptureMode::Preview, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RigError::Conflict(_)));
    }
}
