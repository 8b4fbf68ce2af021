use std::collections::{BTreeSet, HashMap};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use url::Url;

use crate::channel::ResultChannel;
use crate::command;
use crate::config::PluginConfig;
use crate::error::CoreResult;
use crate::fetch::{HttpMediaFetcher, MediaFetcher};
use crate::gateway::{ClipboardSource, UiGateway};
use crate::process::{ProcessRunner, StdProcessRunner};
use crate::settings::{ButtonSettings, SettingsPatch};
use crate::task::{TaskHandle, TaskKind, TaskResult, TaskStatus};
use crate::timer::TimerVerdict;

#[derive(Default)]
struct ButtonContext {
    settings: ButtonSettings,
    last_error: Option<String>,
    press_timer: crate::timer::PressTimer,
}

#[derive(Default)]
struct DownloadRecord {
    tasks: Vec<Arc<TaskHandle>>,
    success_count: u32,
    failure_count: u32,
}

/// All per-button state behind the one coarse registry lock: the visible
/// contexts and the download records they spawned.
#[derive(Default)]
struct Registry {
    contexts: HashMap<String, ButtonContext>,
    downloads: HashMap<String, DownloadRecord>,
}

/// Process-wide coordinator: the running/updating flags, the result
/// channel and the registry, passed by Arc to every component instead of
/// living as ambient globals.
struct Shared {
    config: PluginConfig,
    running: AtomicBool,
    updating: AtomicBool,
    channel: Arc<ResultChannel>,
    registry: Mutex<Registry>,
    gateway: Arc<dyn UiGateway>,
    runner: Arc<dyn ProcessRunner>,
    fetcher: Arc<dyn MediaFetcher>,
    clipboard: Arc<dyn ClipboardSource>,
}

impl Shared {
    fn registry(&self) -> Option<MutexGuard<'_, Registry>> {
        match self.registry.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                log::error!("context registry lock poisoned");
                None
            }
        }
    }
}

pub struct Plugin {
    shared: Arc<Shared>,
    monitor: Option<JoinHandle<()>>,
}

impl Plugin {
    pub fn new(
        config: PluginConfig,
        gateway: Arc<dyn UiGateway>,
        runner: Arc<dyn ProcessRunner>,
        fetcher: Arc<dyn MediaFetcher>,
        clipboard: Arc<dyn ClipboardSource>,
    ) -> Self {
        let shared = Arc::new(Shared {
            config,
            running: AtomicBool::new(true),
            updating: AtomicBool::new(false),
            channel: Arc::new(ResultChannel::new()),
            registry: Mutex::new(Registry::default()),
            gateway,
            runner,
            fetcher,
            clipboard,
        });
        let monitor_shared = Arc::clone(&shared);
        let monitor = thread::spawn(move || monitor_loop(monitor_shared));
        Self {
            shared,
            monitor: Some(monitor),
        }
    }

    pub fn with_defaults(
        config: PluginConfig,
        gateway: Arc<dyn UiGateway>,
        clipboard: Arc<dyn ClipboardSource>,
    ) -> CoreResult<Self> {
        let fetcher = HttpMediaFetcher::new(&config.user_agent)?;
        Ok(Self::new(
            config,
            gateway,
            Arc::new(StdProcessRunner),
            Arc::new(fetcher),
            clipboard,
        ))
    }

    /// Button pressed: arm the long-press timer that opens the output
    /// folder once the delay elapses.
    pub fn key_down(&self, context: &str) {
        let Some(mut reg) = self.shared.registry() else {
            return;
        };
        let Some(button) = reg.contexts.get_mut(context) else {
            return;
        };
        button.press_timer.stop();

        let folder = command::output_folder_name(button.settings.output_folder.as_deref());
        let runner = Arc::clone(&self.shared.runner);
        let delay = Duration::from_millis(self.shared.config.long_press_millis);
        button.press_timer.start(delay, move || {
            if folder.is_dir() {
                command::open_folder(runner.as_ref(), &folder).is_ok()
            } else {
                false
            }
        });
    }

    /// Button released: a long press already opened the folder and ends
    /// here; a short press validates the clipboard and spawns a download.
    pub fn key_up(&self, context: &str, payload: &serde_json::Value) {
        let Some(mut reg) = self.shared.registry() else {
            return;
        };
        if !self.shared.running.load(Ordering::SeqCst) {
            return;
        }

        let verdict = match reg.contexts.get_mut(context) {
            Some(button) => button.press_timer.stop(),
            None => return,
        };
        match verdict {
            TimerVerdict::Fired(true) => return,
            TimerVerdict::Fired(false) => {
                self.shared
                    .gateway
                    .log(&format!("cannot open output folder for context {}", context));
                set_error(&mut reg, context, "Error: cannot\nopen folder");
                update_ui(&self.shared, &reg, context);
                return;
            }
            TimerVerdict::Cancelled => {}
        }

        if self.shared.updating.load(Ordering::SeqCst) {
            // an earlier update may have failed and left the flag behind
            if reg.downloads.is_empty() {
                self.shared.updating.store(false, Ordering::SeqCst);
            } else {
                self.shared
                    .gateway
                    .log("cannot start download, update in progress");
                set_error(&mut reg, context, "Error: update\nin progress");
                update_ui(&self.shared, &reg, context);
                return;
            }
        }

        let clipboard_text = match self.shared.clipboard.read_text() {
            Ok(text) => text,
            Err(err) => {
                self.shared.gateway.log(&format!("invalid clipboard: {}", err));
                set_error(&mut reg, context, "Invalid\nclipboard");
                update_ui(&self.shared, &reg, context);
                return;
            }
        };
        if !is_valid_url(&clipboard_text) {
            self.shared
                .gateway
                .log(&format!("invalid url: {}", clipboard_text));
            set_error(&mut reg, context, "Invalid\nURL");
            update_ui(&self.shared, &reg, context);
            return;
        }

        let Some(settings_value) = payload.get("settings") else {
            self.shared.gateway.log("key up carried no settings");
            set_error(&mut reg, context, "Failed to\nreceive settings");
            update_ui(&self.shared, &reg, context);
            return;
        };
        let settings = {
            let Some(button) = reg.contexts.get_mut(context) else {
                return;
            };
            apply_patch(&self.shared, &mut button.settings, settings_value);
            button.last_error = None;
            button.settings.clone()
        };

        self.submit_task(
            &mut reg,
            context,
            TaskKind::Download {
                url: clipboard_text,
            },
            settings,
        );
        update_ui(&self.shared, &reg, context);
    }

    /// Button became visible: remember the context and its settings.
    pub fn will_appear(&self, context: &str, payload: &serde_json::Value) {
        let Some(mut reg) = self.shared.registry() else {
            return;
        };
        let mut button = ButtonContext::default();
        if let Some(settings_value) = payload.get("settings") {
            apply_patch(&self.shared, &mut button.settings, settings_value);
        }
        if !self.shared.running.load(Ordering::SeqCst) {
            button.last_error = Some("Error: Bad\nInitialization".to_string());
        }
        reg.contexts.insert(context.to_string(), button);
        update_ui(&self.shared, &reg, context);
    }

    /// Button removed: forget the context. Running tasks keep going and
    /// their record is reaped once they finish.
    pub fn will_disappear(&self, context: &str) {
        let Some(mut reg) = self.shared.registry() else {
            return;
        };
        reg.contexts.remove(context);
    }

    pub fn device_did_connect(&self, _device: &str) {}

    pub fn device_did_disconnect(&self, _device: &str) {}

    /// Companion-UI message: a settings patch, a named command, or both.
    pub fn send_to_plugin(&self, context: &str, payload: &serde_json::Value) {
        let Some(mut reg) = self.shared.registry() else {
            return;
        };
        if let Some(button) = reg.contexts.get_mut(context) {
            apply_patch(&self.shared, &mut button.settings, payload);
        }
        self.run_command(&mut reg, context, payload);
        update_ui(&self.shared, &reg, context);
    }

    /// Stop the monitor and release still-running tasks. Never blocks on a
    /// child process: stragglers are detached, not joined.
    pub fn shutdown(&mut self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.channel.wake();
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
        if let Ok(mut reg) = self.shared.registry.lock() {
            for (_, record) in reg.downloads.drain() {
                for task in record.tasks {
                    if !task.is_complete() {
                        task.detach();
                    }
                }
            }
            reg.contexts.clear();
        }
    }

    fn run_command(&self, reg: &mut Registry, context: &str, payload: &serde_json::Value) {
        if !reg.contexts.contains_key(context) {
            return;
        }
        let Some(cmd) = payload.get("command").and_then(|value| value.as_str()) else {
            return;
        };
        match cmd {
            "getSampleCommand" => {
                let Some(button) = reg.contexts.get(context) else {
                    return;
                };
                let preview = command::sample_command(&button.settings, &self.shared.config);
                self.shared.gateway.send_to_property_inspector(
                    context,
                    serde_json::json!({ "sampleCommand": preview }),
                );
            }
            "update" => {
                if !reg.downloads.is_empty() {
                    self.shared.gateway.log(&format!(
                        "context {} requested update but jobs are still pending",
                        context
                    ));
                    set_error(reg, context, "Downloader\nin use.");
                } else {
                    self.shared.updating.store(true, Ordering::SeqCst);
                    set_error(reg, context, "Updating\n");
                    let settings = match reg.contexts.get(context) {
                        Some(button) => button.settings.clone(),
                        None => return,
                    };
                    self.submit_task(reg, context, TaskKind::Update, settings);
                }
            }
            "killContext" => {
                self.shared
                    .gateway
                    .log(&format!("killing tasks spawned by context {}", context));
                set_error(reg, context, "Stopping\nDownloads");
                if let Some(record) = reg.downloads.get(context) {
                    for task in &record.tasks {
                        task.kill();
                    }
                }
            }
            "killAll" => {
                self.shared.gateway.log("killing all tasks");
                set_error(reg, context, "Stopping All\nDownloads");
                for record in reg.downloads.values() {
                    for task in &record.tasks {
                        task.kill();
                    }
                }
            }
            "openExeFolder" => {
                let exe_path = reg
                    .contexts
                    .get(context)
                    .and_then(|button| button.settings.exe_path.clone());
                if let Err(err) = self.open_exe_folder(exe_path.as_deref()) {
                    self.shared
                        .gateway
                        .log(&format!("cannot open downloader folder: {}", err));
                }
            }
            other => {
                self.shared.gateway.log(&format!(
                    "received unknown command {} in context {}",
                    other, context
                ));
            }
        }
    }

    fn open_exe_folder(&self, exe_path: Option<&str>) -> CoreResult<()> {
        let folder = match exe_path {
            Some(path) if !path.is_empty() => Path::new(path)
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(path)),
            _ => env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        command::open_folder(self.shared.runner.as_ref(), &folder)
    }

    fn submit_task(
        &self,
        reg: &mut Registry,
        context: &str,
        kind: TaskKind,
        settings: ButtonSettings,
    ) {
        let record = reg.downloads.entry(context.to_string()).or_default();
        let task = Arc::new(TaskHandle::new(context));
        log::info!("context {}: starting task {}", context, task.id());
        task.start(
            kind,
            settings,
            Arc::clone(&self.shared.runner),
            Arc::clone(&self.shared.fetcher),
            Arc::clone(&self.shared.channel),
            &self.shared.config,
        );
        record.tasks.push(task);
    }

    #[cfg(test)]
    pub(crate) fn record_stats(&self, context: &str) -> Option<(usize, u32, u32)> {
        let reg = self.shared.registry()?;
        reg.downloads
            .get(context)
            .map(|record| (record.tasks.len(), record.success_count, record.failure_count))
    }

    #[cfg(test)]
    pub(crate) fn is_updating(&self) -> bool {
        self.shared.updating.load(Ordering::SeqCst)
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Single consumer of the result channel, alive for the plugin's lifetime.
/// Drain, counter update, UI refresh and reap happen as one step per pass
/// under the registry lock.
fn monitor_loop(shared: Arc<Shared>) {
    while shared.running.load(Ordering::SeqCst) {
        let results = shared.channel.wait_drain(&shared.running);
        if results.is_empty() {
            continue;
        }
        let Ok(mut reg) = shared.registry.lock() else {
            log::error!(
                "context registry lock poisoned, dropping {} results",
                results.len()
            );
            continue;
        };
        let modified = apply_results(&shared, &mut reg, results);
        for context in &modified {
            update_ui(&shared, &reg, context);
            reap_downloads(&mut reg, context);
        }
    }
    shared.gateway.log("shutting down download monitor");
}

fn apply_results(
    shared: &Shared,
    reg: &mut Registry,
    results: Vec<TaskResult>,
) -> BTreeSet<String> {
    let mut modified = BTreeSet::new();
    for result in results {
        modified.insert(result.context.clone());
        if result.is_update {
            shared.updating.store(false, Ordering::SeqCst);
        }
        match result.status {
            TaskStatus::Updated => {
                shared.gateway.log("downloader updated");
                bump(reg, &result.context, true);
            }
            TaskStatus::Success => bump(reg, &result.context, true),
            TaskStatus::Failed => {
                shared
                    .gateway
                    .log(&format!("task failed for context {}", result.context));
                if let Some(log_text) = &result.log {
                    shared.gateway.log(&format!("log: {}", log_text));
                }
                bump(reg, &result.context, false);
            }
            other => {
                log::warn!(
                    "dropping non-terminal result {:?} for context {}",
                    other,
                    result.context
                );
                continue;
            }
        }
        if let Some(msg) = result.button_msg {
            if let Some(button) = reg.contexts.get_mut(&result.context) {
                button.last_error = Some(msg);
            }
        }
    }
    modified
}

fn bump(reg: &mut Registry, context: &str, success: bool) {
    match reg.downloads.get_mut(context) {
        Some(record) => {
            if success {
                record.success_count += 1;
            } else {
                record.failure_count += 1;
            }
        }
        None => log::warn!("result for unknown download record: {}", context),
    }
}

fn update_ui(shared: &Shared, reg: &Registry, context: &str) {
    let Some(button) = reg.contexts.get(context) else {
        return;
    };
    let label = button.settings.label.clone().unwrap_or_default();
    let pending = reg
        .downloads
        .get(context)
        .map(|record| {
            (record.tasks.len() as u32).saturating_sub(record.success_count + record.failure_count)
        })
        .unwrap_or(0);
    let error = button.last_error.as_deref().unwrap_or("");
    shared
        .gateway
        .set_title(context, &format!("{}\nPending: {}\n{}", label, pending, error));
}

fn reap_downloads(reg: &mut Registry, context: &str) {
    let all_done = match reg.downloads.get(context) {
        Some(record) => record.tasks.iter().all(|task| task.is_complete()),
        None => false,
    };
    if all_done {
        reg.downloads.remove(context);
    }
}

fn set_error(reg: &mut Registry, context: &str, msg: &str) {
    if let Some(button) = reg.contexts.get_mut(context) {
        button.last_error = Some(msg.to_string());
    }
}

fn apply_patch(shared: &Shared, settings: &mut ButtonSettings, value: &serde_json::Value) {
    match SettingsPatch::from_value(value) {
        Ok(patch) => settings.apply(&patch),
        Err(err) => {
            shared
                .gateway
                .log(&format!("failed to read settings payload: {}", err));
        }
    }
}

pub fn is_valid_url(text: &str) -> bool {
    match Url::parse(text.trim()) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::is_valid_url;

    #[test]
    fn only_http_and_https_pass_validation() {
        assert!(is_valid_url("https://example.com/watch?v=1"));
        assert!(is_valid_url("  http://example.com  "));
        assert!(!is_valid_url("ftp://example.com/file"));
        assert!(!is_valid_url("definitely not a url"));
        assert!(!is_valid_url(""));
    }
}
