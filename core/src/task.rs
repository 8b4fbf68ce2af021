use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use uuid::Uuid;

use crate::channel::ResultChannel;
use crate::command;
use crate::config::PluginConfig;
use crate::error::{CoreError, CoreResult};
use crate::fetch::MediaFetcher;
use crate::process::ProcessRunner;
use crate::settings::ButtonSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    New,
    Setup,
    Running,
    Stopping,
    Success,
    Failed,
    Updated,
}

impl TaskStatus {
    fn as_u8(self) -> u8 {
        match self {
            TaskStatus::New => 0,
            TaskStatus::Setup => 1,
            TaskStatus::Running => 2,
            TaskStatus::Stopping => 3,
            TaskStatus::Success => 4,
            TaskStatus::Failed => 5,
            TaskStatus::Updated => 6,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskStatus::New,
            1 => TaskStatus::Setup,
            2 => TaskStatus::Running,
            3 => TaskStatus::Stopping,
            4 => TaskStatus::Success,
            6 => TaskStatus::Updated,
            _ => TaskStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Updated
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlag {
    Continue,
    Detach,
    Kill,
}

impl CommandFlag {
    fn as_u8(self) -> u8 {
        match self {
            CommandFlag::Continue => 0,
            CommandFlag::Detach => 1,
            CommandFlag::Kill => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => CommandFlag::Detach,
            2 => CommandFlag::Kill,
            _ => CommandFlag::Continue,
        }
    }
}

/// Snapshot crossing from a worker thread into the monitor. Pushed at most
/// once per task, never after a detach.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub context: String,
    pub status: TaskStatus,
    pub log: Option<String>,
    pub button_msg: Option<String>,
    pub is_update: bool,
}

#[derive(Debug, Clone)]
pub enum TaskKind {
    Download { url: String },
    Update,
}

/// One background unit of work: a downloader run or an update run, on its
/// own worker thread, reporting a terminal status exactly once.
pub struct TaskHandle {
    inner: Arc<TaskInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

struct TaskInner {
    id: Uuid,
    context: String,
    state: AtomicU8,
    command: AtomicU8,
    process: Mutex<Option<Box<dyn crate::process::ProcessHandle>>>,
    reported: AtomicBool,
}

impl TaskInner {
    fn set_state(&self, status: TaskStatus) {
        self.state.store(status.as_u8(), Ordering::SeqCst);
    }

    fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn command_flag(&self) -> CommandFlag {
        CommandFlag::from_u8(self.command.load(Ordering::SeqCst))
    }
}

impl TaskHandle {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id: Uuid::new_v4(),
                context: context.into(),
                state: AtomicU8::new(TaskStatus::New.as_u8()),
                command: AtomicU8::new(CommandFlag::Continue.as_u8()),
                process: Mutex::new(None),
                reported: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn context(&self) -> &str {
        &self.inner.context
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.status()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.status().is_terminal()
    }

    /// Spawn the worker. A handle can only ever be started once; a second
    /// call is a silent no-op.
    pub fn start(
        &self,
        kind: TaskKind,
        settings: ButtonSettings,
        runner: Arc<dyn ProcessRunner>,
        fetcher: Arc<dyn MediaFetcher>,
        channel: Arc<ResultChannel>,
        config: &PluginConfig,
    ) {
        let started = self
            .inner
            .state
            .compare_exchange(
                TaskStatus::New.as_u8(),
                TaskStatus::Setup.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !started {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let config = config.clone();
        let handle =
            thread::spawn(move || run_task(inner, kind, settings, runner, fetcher, channel, config));
        if let Ok(mut slot) = self.thread.lock() {
            *slot = Some(handle);
        }
    }

    /// Request termination. Best-effort and asynchronous: the caller still
    /// observes actual completion through the result channel. Idempotent,
    /// safe from any thread, a no-op once the task has finished.
    pub fn kill(&self) {
        self.inner
            .command
            .store(CommandFlag::Kill.as_u8(), Ordering::SeqCst);
        if let Ok(mut slot) = self.inner.process.lock() {
            if let Some(proc) = slot.as_mut() {
                if let Err(err) = proc.kill() {
                    log::warn!("task {}: kill failed: {}", self.inner.id, err);
                }
            }
        }
    }

    /// Shutdown escape hatch: the worker keeps running unmanaged, never
    /// pushes a result, and frees its own state when it finishes.
    pub fn detach(&self) {
        self.inner
            .command
            .store(CommandFlag::Detach.as_u8(), Ordering::SeqCst);
        if let Ok(mut slot) = self.thread.lock() {
            let _ = slot.take();
        }
    }
}

fn run_task(
    inner: Arc<TaskInner>,
    kind: TaskKind,
    settings: ButtonSettings,
    runner: Arc<dyn ProcessRunner>,
    fetcher: Arc<dyn MediaFetcher>,
    channel: Arc<ResultChannel>,
    config: PluginConfig,
) {
    let is_update = matches!(kind, TaskKind::Update);
    let folder = command::output_folder_name(settings.output_folder.as_deref());

    if !is_update {
        if let Err((log_msg, button_msg)) = check_output_folder(&folder) {
            finish(
                &inner,
                &channel,
                TaskStatus::Failed,
                Some(log_msg),
                Some(button_msg),
                is_update,
            );
            return;
        }
    }

    let exe = command::downloader_exe(settings.exe_path.as_deref(), &config);
    let commands = match &kind {
        TaskKind::Update => vec![command::update_args()],
        TaskKind::Download { url } => command::command_queue(url, &settings, &folder),
    };

    if let TaskKind::Download { url } = &kind {
        if settings.image_fallback {
            match fetcher.fetch_image(url, &folder) {
                Ok(path) => {
                    finish(
                        &inner,
                        &channel,
                        TaskStatus::Success,
                        Some(format!("saved image to {}", path.display())),
                        None,
                        is_update,
                    );
                    return;
                }
                Err(err) => {
                    log::info!(
                        "task {}: direct fetch failed, falling back to downloader: {}",
                        inner.id,
                        err
                    );
                    if commands.is_empty() {
                        finish(
                            &inner,
                            &channel,
                            TaskStatus::Failed,
                            Some(err.to_string()),
                            Some("Download\nfailed"),
                            is_update,
                        );
                        return;
                    }
                }
            }
        }
    }

    if commands.is_empty() {
        finish(
            &inner,
            &channel,
            TaskStatus::Failed,
            Some("no download formats selected".to_string()),
            Some("Download\nfailed"),
            is_update,
        );
        return;
    }

    for args in &commands {
        if inner.command_flag() == CommandFlag::Kill {
            finish_killed(&inner, &channel, is_update);
            return;
        }

        let handle = match runner.spawn(&exe, args) {
            Ok(handle) => handle,
            Err(CoreError::MissingExecutable(path)) => {
                finish(
                    &inner,
                    &channel,
                    TaskStatus::Failed,
                    Some(format!("downloader missing: {}", path)),
                    Some("Missing\ndownloader"),
                    is_update,
                );
                return;
            }
            Err(err) => {
                finish(
                    &inner,
                    &channel,
                    TaskStatus::Failed,
                    Some(format!("failed to launch downloader: {}", err)),
                    Some(generic_failure_msg(is_update)),
                    is_update,
                );
                return;
            }
        };

        if let Ok(mut slot) = inner.process.lock() {
            *slot = Some(handle);
        }
        inner.set_state(TaskStatus::Running);

        let exit = poll_process(&inner, &config);

        inner.set_state(TaskStatus::Stopping);
        if let Ok(mut slot) = inner.process.lock() {
            *slot = None;
        }

        if inner.command_flag() == CommandFlag::Kill {
            finish_killed(&inner, &channel, is_update);
            return;
        }

        match exit {
            Ok(0) => {}
            Ok(code) => {
                finish(
                    &inner,
                    &channel,
                    TaskStatus::Failed,
                    Some(format!("downloader exited with status {}", code)),
                    Some(generic_failure_msg(is_update)),
                    is_update,
                );
                return;
            }
            Err(err) => {
                finish(
                    &inner,
                    &channel,
                    TaskStatus::Failed,
                    Some(err.to_string()),
                    Some(generic_failure_msg(is_update)),
                    is_update,
                );
                return;
            }
        }
    }

    if is_update {
        finish(
            &inner,
            &channel,
            TaskStatus::Updated,
            Some("downloader updated".to_string()),
            Some("Update\nfinished"),
            is_update,
        );
    } else {
        finish(&inner, &channel, TaskStatus::Success, None, None, is_update);
    }
}

fn check_output_folder(folder: &Path) -> Result<(), (String, &'static str)> {
    match fs::metadata(folder) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err((
            format!("output folder is not a directory: {}", folder.display()),
            "Invalid\noutput folder",
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err((
            format!("missing output folder: {}", folder.display()),
            "Missing\noutput folder",
        )),
        Err(err) => Err((
            format!("output folder error: {}: {}", folder.display(), err),
            "Invalid\noutput folder",
        )),
    }
}

fn poll_process(inner: &TaskInner, config: &PluginConfig) -> CoreResult<i32> {
    let poll = Duration::from_millis(config.process_poll_millis);
    loop {
        if inner.command_flag() == CommandFlag::Kill {
            if let Ok(mut slot) = inner.process.lock() {
                if let Some(proc) = slot.as_mut() {
                    if let Err(err) = proc.kill() {
                        log::warn!("task {}: kill failed: {}", inner.id, err);
                    }
                }
            }
        }
        let status = {
            let mut slot = inner
                .process
                .lock()
                .map_err(|_| CoreError::Process("process slot poisoned".to_string()))?;
            match slot.as_mut() {
                Some(proc) => proc.try_wait()?,
                None => return Err(CoreError::Process("process slot empty".to_string())),
            }
        };
        match status {
            Some(code) => return Ok(code),
            None => thread::sleep(poll),
        }
    }
}

fn generic_failure_msg(is_update: bool) -> &'static str {
    if is_update {
        "Update\nfailed"
    } else {
        "Download\nfailed"
    }
}

fn finish_killed(inner: &TaskInner, channel: &ResultChannel, is_update: bool) {
    let (log_msg, button_msg) = if is_update {
        ("update interrupted by kill", "Update\ninterrupted")
    } else {
        ("download stopped by kill", "Download\nstopped")
    };
    finish(
        inner,
        channel,
        TaskStatus::Failed,
        Some(log_msg.to_string()),
        Some(button_msg),
        is_update,
    );
}

/// The single terminal-report step. The terminal state is published before
/// the push so the monitor never sees a queued result for a handle that
/// still reads as running; the swap guard makes a second report impossible.
fn finish(
    inner: &TaskInner,
    channel: &ResultChannel,
    status: TaskStatus,
    log_msg: Option<String>,
    button_msg: Option<&str>,
    is_update: bool,
) {
    inner.set_state(status);
    if inner.reported.swap(true, Ordering::SeqCst) {
        return;
    }
    if inner.command_flag() == CommandFlag::Detach {
        log::debug!("task {}: detached, dropping result", inner.id);
        return;
    }
    channel.push(TaskResult {
        context: inner.context.clone(),
        status,
        log: log_msg,
        button_msg: button_msg.map(|msg| msg.to_string()),
        is_update,
    });
}
