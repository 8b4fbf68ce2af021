use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::json;

use deckdl_core::{ClipboardSource, CoreError, CoreResult, Plugin, PluginConfig, UiGateway};

/// One length-prefixed JSON event from the device-integration companion.
/// Key-up events carry the clipboard text captured on the companion side.
#[derive(Debug, Deserialize)]
struct HostEvent {
    event: String,
    context: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
    clipboard: Option<String>,
}

struct StdoutGateway {
    out: Mutex<io::Stdout>,
}

impl StdoutGateway {
    fn write_message(&self, message: &serde_json::Value) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let payload = serde_json::to_vec(message).unwrap_or_else(|_| b"{}".to_vec());
        let len = (payload.len() as u32).to_le_bytes();
        let _ = out.write_all(&len);
        let _ = out.write_all(&payload);
        let _ = out.flush();
    }
}

impl UiGateway for StdoutGateway {
    fn set_title(&self, context: &str, title: &str) {
        self.write_message(&json!({
            "event": "setTitle",
            "context": context,
            "title": title,
        }));
    }

    fn log(&self, message: &str) {
        self.write_message(&json!({
            "event": "log",
            "message": message,
        }));
    }

    fn send_to_property_inspector(&self, context: &str, payload: serde_json::Value) {
        self.write_message(&json!({
            "event": "sendToPropertyInspector",
            "context": context,
            "payload": payload,
        }));
    }
}

struct HostClipboard {
    text: Mutex<Option<String>>,
}

impl HostClipboard {
    fn set(&self, text: String) {
        if let Ok(mut slot) = self.text.lock() {
            *slot = Some(text);
        }
    }
}

impl ClipboardSource for HostClipboard {
    fn read_text(&self) -> CoreResult<String> {
        self.text
            .lock()
            .map_err(|_| CoreError::Clipboard("clipboard slot poisoned".to_string()))?
            .clone()
            .ok_or_else(|| CoreError::Clipboard("no clipboard text received".to_string()))
    }
}

fn main() {
    env_logger::init();

    let gateway = Arc::new(StdoutGateway {
        out: Mutex::new(io::stdout()),
    });
    let clipboard = Arc::new(HostClipboard {
        text: Mutex::new(None),
    });
    let mut plugin =
        match Plugin::with_defaults(PluginConfig::default(), gateway, clipboard.clone()) {
            Ok(plugin) => plugin,
            Err(err) => {
                eprintln!("error: {}", err);
                return;
            }
        };

    loop {
        match read_message() {
            Ok(Some(bytes)) => {
                if let Err(err) = handle_message(&plugin, &clipboard, &bytes) {
                    log::warn!("dropping bad host message: {}", err);
                }
            }
            Ok(None) => break,
            Err(err) => {
                log::error!("stdin error: {}", err);
                break;
            }
        }
    }

    plugin.shutdown();
}

fn handle_message(plugin: &Plugin, clipboard: &HostClipboard, bytes: &[u8]) -> Result<(), String> {
    let event: HostEvent = serde_json::from_slice(bytes).map_err(|err| err.to_string())?;
    if let Some(text) = &event.clipboard {
        clipboard.set(text.clone());
    }
    let context = event.context.as_deref().unwrap_or_default();
    match event.event.as_str() {
        "keyDown" => plugin.key_down(context),
        "keyUp" => plugin.key_up(context, &event.payload),
        "willAppear" => plugin.will_appear(context, &event.payload),
        "willDisappear" => plugin.will_disappear(context),
        "deviceDidConnect" => plugin.device_did_connect(context),
        "deviceDidDisconnect" => plugin.device_did_disconnect(context),
        "sendToPlugin" => plugin.send_to_plugin(context, &event.payload),
        other => log::debug!("ignoring event {}", other),
    }
    Ok(())
}

fn read_message() -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut stdin = io::stdin();
    if let Err(err) = stdin.read_exact(&mut len_buf) {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(err);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stdin.read_exact(&mut buf)?;
    Ok(Some(buf))
}
