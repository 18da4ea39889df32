//! Environment lifecycle orchestration.
//!
//! Owns the two single-flight operations of the environment: the memoized
//! boot (every caller shares one sandbox handle) and the project load
//! (mount, install, serve, readiness bridge). Progress is reported through
//! a [`StatusSink`].

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::errors::SandboxError;
use crate::project::{INSTALL_ARGS, INSTALL_PROGRAM, ProjectKind};
use crate::provider::{Sandbox, SandboxRuntime, StatusSink};
use crate::tree::TemplateSource;

type BootFuture = Shared<BoxFuture<'static, Result<Arc<dyn Sandbox>, SandboxError>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Another load was already in flight; this call was a no-op.
    AlreadyLoading,
}

pub struct EnvironmentManager {
    runtime: Arc<dyn SandboxRuntime>,
    templates: Arc<dyn TemplateSource>,
    boot_slot: Mutex<Option<BootFuture>>,
    load_lock: tokio::sync::Mutex<()>,
}

impl EnvironmentManager {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, templates: Arc<dyn TemplateSource>) -> Self {
        Self {
            runtime,
            templates,
            boot_slot: Mutex::new(None),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Boot the sandbox, once. Concurrent callers await the same shared
    /// future and receive the same handle; a failed boot clears the slot
    /// so the next call retries.
    pub async fn boot(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let future = {
            let mut slot = self.boot_slot.lock().expect("boot slot mutex poisoned");
            match slot.as_ref() {
                Some(future) => future.clone(),
                None => {
                    debug!("starting sandbox boot");
                    let runtime = self.runtime.clone();
                    let future = async move { runtime.boot().await }.boxed().shared();
                    *slot = Some(future.clone());
                    future
                }
            }
        };

        let result = future.await;
        if result.is_err() {
            let mut slot = self.boot_slot.lock().expect("boot slot mutex poisoned");
            *slot = None;
        }
        result
    }

    /// Load a project into the booted sandbox: mount the template, run
    /// the install phase, then start the persistent dev server. Returns
    /// [`LoadOutcome::AlreadyLoading`] if a load is already in flight.
    pub async fn load_project(
        &self,
        kind: ProjectKind,
        sink: Arc<dyn StatusSink>,
    ) -> Result<LoadOutcome, SandboxError> {
        let Ok(_guard) = self.load_lock.try_lock() else {
            debug!(%kind, "project load already in flight, ignoring trigger");
            return Ok(LoadOutcome::AlreadyLoading);
        };

        let result = self.run_load(kind, sink.clone()).await;
        if let Err(error) = &result {
            warn!(%kind, %error, "project load failed");
            sink.append_log(&format!("load failed: {error}"));
            match error {
                SandboxError::InstallFailed(_) => {
                    sink.set_status("Calibration failed. Check the environment log.");
                }
                other => {
                    sink.set_status(&format!("Environment failure: {other}"));
                }
            }
        }
        result.map(|_| LoadOutcome::Loaded)
    }

    async fn run_load(
        &self,
        kind: ProjectKind,
        sink: Arc<dyn StatusSink>,
    ) -> Result<(), SandboxError> {
        let profile = kind.profile();
        info!(%kind, "loading project");

        sink.set_status("Booting the sandbox...");
        let sandbox = self.boot().await?;
        sink.append_log("sandbox booted");

        sink.set_status(&format!("Mounting the {} template...", profile.display_name));
        let tree = self.templates.template(kind)?;
        sandbox.mount(&tree).await?;
        sink.append_log(&format!("mounted {} template", kind));

        sink.set_status("Calibrating dependencies...");
        let install_args: Vec<String> = INSTALL_ARGS.iter().map(|arg| arg.to_string()).collect();
        let mut install = sandbox.spawn(INSTALL_PROGRAM, &install_args).await?;
        while let Some(line) = install.next_line().await {
            sink.append_log(&format!("[install] {line}"));
        }
        let code = install.wait().await?;
        if code != 0 {
            return Err(SandboxError::InstallFailed(code));
        }
        sink.append_log("dependencies installed");

        sink.set_status("Starting the dev server...");
        // Subscribe before the server starts so the ready signal cannot
        // be missed.
        let mut ready = sandbox.subscribe_ready();
        let serve = sandbox.spawn(INSTALL_PROGRAM, &profile.serve_args()).await?;

        // The server owns the environment from here on: its output streams
        // into the log for the lifetime of the sandbox, never awaited.
        let serve_sink = sink.clone();
        tokio::spawn(async move {
            let mut serve = serve;
            while let Some(line) = serve.next_line().await {
                serve_sink.append_log(&format!("[serve] {line}"));
            }
        });

        let ready_sink = sink;
        tokio::spawn(async move {
            if let Ok(event) = ready.recv().await {
                info!(url = %event.url, port = event.port, "dev server ready");
                ready_sink.set_preview_url(&event.url);
                ready_sink.append_log(&format!("preview listening on {}", event.url));
                ready_sink.set_status("Preview is live. Awaiting direction.");
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{DirEntry, ReadyEvent, SandboxProcess};
    use crate::tree::{FileTree, StarterTemplates};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, broadcast, mpsc, oneshot};

    /// Scripted process: exit code plus optional output lines, optionally
    /// held open until released.
    #[derive(Debug)]
    struct ScriptedSandbox {
        spawned: Mutex<Vec<String>>,
        install_exit: i32,
        hold_install: Option<Arc<Notify>>,
        ready_tx: broadcast::Sender<ReadyEvent>,
    }

    impl ScriptedSandbox {
        fn new(install_exit: i32) -> Self {
            let (ready_tx, _) = broadcast::channel(4);
            Self {
                spawned: Mutex::new(Vec::new()),
                install_exit,
                hold_install: None,
                ready_tx,
            }
        }

        fn holding(mut self, gate: Arc<Notify>) -> Self {
            self.hold_install = Some(gate);
            self
        }

        fn spawned(&self) -> Vec<String> {
            self.spawned.lock().expect("spawned mutex").clone()
        }
    }

    #[async_trait]
    impl Sandbox for ScriptedSandbox {
        async fn mount(&self, _tree: &FileTree) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
            Err(SandboxError::Io {
                path: path.to_string(),
                message: "not scripted".to_string(),
            })
        }

        async fn write_file(&self, _path: &str, _content: &str) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn read_dir(&self, _path: &str) -> Result<Vec<DirEntry>, SandboxError> {
            Ok(Vec::new())
        }

        async fn spawn(
            &self,
            program: &str,
            args: &[String],
        ) -> Result<SandboxProcess, SandboxError> {
            let command = format!("{program} {}", args.join(" "));
            let is_install = args.first().is_some_and(|arg| arg == "install");
            self.spawned
                .lock()
                .expect("spawned mutex")
                .push(command.clone());

            let (line_tx, line_rx) = mpsc::unbounded_channel();
            let (exit_tx, exit_rx) = oneshot::channel();
            let exit_code = if is_install { self.install_exit } else { 0 };
            let gate = if is_install {
                self.hold_install.clone()
            } else {
                None
            };
            tokio::spawn(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                let _ = line_tx.send(format!("ran: {command}"));
                drop(line_tx);
                let _ = exit_tx.send(exit_code);
            });
            Ok(SandboxProcess::from_parts(line_rx, exit_rx))
        }

        fn subscribe_ready(&self) -> broadcast::Receiver<ReadyEvent> {
            self.ready_tx.subscribe()
        }
    }

    struct CountingRuntime {
        boots: AtomicUsize,
        sandbox: Arc<ScriptedSandbox>,
        fail_first: AtomicUsize,
    }

    impl CountingRuntime {
        fn new(sandbox: Arc<ScriptedSandbox>) -> Self {
            Self {
                boots: AtomicUsize::new(0),
                sandbox,
                fail_first: AtomicUsize::new(0),
            }
        }

        fn failing_once(self) -> Self {
            self.fail_first.store(1, Ordering::SeqCst);
            self
        }
    }

    #[async_trait]
    impl SandboxRuntime for CountingRuntime {
        async fn boot(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
            self.boots.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_first.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            }).is_ok()
            {
                return Err(SandboxError::Boot("scripted failure".to_string()));
            }
            Ok(self.sandbox.clone() as Arc<dyn Sandbox>)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        statuses: Mutex<Vec<String>>,
        logs: Mutex<Vec<String>>,
        preview: Mutex<Option<String>>,
    }

    impl RecordingSink {
        fn statuses(&self) -> Vec<String> {
            self.statuses.lock().expect("statuses mutex").clone()
        }
    }

    impl StatusSink for RecordingSink {
        fn set_status(&self, status: &str) {
            self.statuses
                .lock()
                .expect("statuses mutex")
                .push(status.to_string());
        }

        fn append_log(&self, line: &str) {
            self.logs
                .lock()
                .expect("logs mutex")
                .push(line.to_string());
        }

        fn set_preview_url(&self, url: &str) {
            *self.preview.lock().expect("preview mutex") = Some(url.to_string());
        }
    }

    fn manager_with(sandbox: Arc<ScriptedSandbox>) -> EnvironmentManager {
        EnvironmentManager::new(
            Arc::new(CountingRuntime::new(sandbox)),
            Arc::new(StarterTemplates),
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_boots_share_one_handle() {
        let sandbox = Arc::new(ScriptedSandbox::new(0));
        let runtime = Arc::new(CountingRuntime::new(sandbox));
        let manager = EnvironmentManager::new(runtime.clone(), Arc::new(StarterTemplates));

        let (first, second) = tokio::join!(manager.boot(), manager.boot());
        let first = first.expect("first boot");
        let second = second.expect("second boot");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runtime.boots.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_boot_clears_the_slot_for_retry() {
        let sandbox = Arc::new(ScriptedSandbox::new(0));
        let runtime = Arc::new(CountingRuntime::new(sandbox).failing_once());
        let manager = EnvironmentManager::new(runtime.clone(), Arc::new(StarterTemplates));

        let error = manager.boot().await.expect_err("first boot should fail");
        assert!(matches!(error, SandboxError::Boot(_)));

        manager.boot().await.expect("retry should boot");
        assert_eq!(runtime.boots.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_install_never_spawns_serve_and_marks_status() {
        let sandbox = Arc::new(ScriptedSandbox::new(1));
        let manager = manager_with(sandbox.clone());
        let sink = Arc::new(RecordingSink::default());

        let error = manager
            .load_project(ProjectKind::Website, sink.clone())
            .await
            .expect_err("load should fail");
        assert_eq!(error, SandboxError::InstallFailed(1));

        let spawned = sandbox.spawned();
        assert_eq!(spawned.len(), 1);
        assert!(spawned[0].contains("install"));
        assert!(
            sink.statuses()
                .iter()
                .any(|status| status.contains("Calibration failed"))
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn successful_load_starts_serve_and_bridges_ready_event() {
        let sandbox = Arc::new(ScriptedSandbox::new(0));
        let manager = manager_with(sandbox.clone());
        let sink = Arc::new(RecordingSink::default());

        let outcome = manager
            .load_project(ProjectKind::Charts, sink.clone())
            .await
            .expect("load should succeed");
        assert_eq!(outcome, LoadOutcome::Loaded);

        let spawned = sandbox.spawned();
        assert_eq!(spawned.len(), 2);
        assert!(spawned[1].ends_with("run dev"));

        sandbox
            .ready_tx
            .send(ReadyEvent {
                port: 5173,
                url: "http://localhost:5173".to_string(),
            })
            .expect("ready event should deliver");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(
            sink.preview.lock().expect("preview mutex").as_deref(),
            Some("http://localhost:5173")
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn overlapping_loads_are_coalesced() {
        let gate = Arc::new(Notify::new());
        let sandbox = Arc::new(ScriptedSandbox::new(0).holding(gate.clone()));
        let manager = Arc::new(manager_with(sandbox.clone()));
        let sink = Arc::new(RecordingSink::default());

        let first = tokio::spawn({
            let manager = manager.clone();
            let sink = sink.clone() as Arc<dyn StatusSink>;
            async move { manager.load_project(ProjectKind::Video, sink).await }
        });
        // Let the first load reach the held install phase.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let second = manager
            .load_project(ProjectKind::Video, sink.clone())
            .await
            .expect("second load should no-op");
        assert_eq!(second, LoadOutcome::AlreadyLoading);

        gate.notify_one();
        let first = first.await.expect("join").expect("first load");
        assert_eq!(first, LoadOutcome::Loaded);
    }
}
