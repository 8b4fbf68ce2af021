use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DownloadFormat {
    Video,
    VideoOnly,
    AudioOnly,
}

impl fmt::Display for DownloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownloadFormat::Video => "video",
            DownloadFormat::VideoOnly => "video-only",
            DownloadFormat::AudioOnly => "audio-only",
        };
        f.write_str(name)
    }
}

/// Per-button settings, mutated only through sparse patches: fields absent
/// from a patch are left untouched, empty strings reset a field to absent.
#[derive(Debug, Clone, Default)]
pub struct ButtonSettings {
    pub label: Option<String>,
    pub exe_path: Option<String>,
    pub output_folder: Option<String>,
    pub max_downloads: Option<u32>,
    pub formats: BTreeSet<DownloadFormat>,
    pub image_fallback: bool,
    pub custom_command: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub label: Option<String>,
    pub exe_path: Option<String>,
    pub output_folder: Option<String>,
    pub max_downloads: Option<String>,
    pub video_dl: Option<String>,
    pub audio_dl: Option<String>,
    pub image_dl: Option<String>,
    pub custom_command: Option<String>,
}

impl SettingsPatch {
    pub fn from_value(value: &serde_json::Value) -> CoreResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|err| CoreError::InvalidSettings(err.to_string()))
    }
}

impl ButtonSettings {
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(label) = &patch.label {
            self.label = Some(label.clone());
        }
        if let Some(exe_path) = &patch.exe_path {
            self.exe_path = none_if_empty(exe_path);
        }
        if let Some(folder) = &patch.output_folder {
            self.output_folder = none_if_empty(folder);
        }
        if let Some(max) = &patch.max_downloads {
            self.max_downloads = match none_if_empty(max) {
                Some(raw) => match raw.parse::<u32>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        log::warn!("ignoring unparsable maxDownloads value: {}", raw);
                        None
                    }
                },
                None => None,
            };
        }
        if let Some(video) = &patch.video_dl {
            self.formats.remove(&DownloadFormat::Video);
            self.formats.remove(&DownloadFormat::VideoOnly);
            match video.as_str() {
                "on" => {
                    self.formats.insert(DownloadFormat::Video);
                }
                "on_muted" => {
                    self.formats.insert(DownloadFormat::VideoOnly);
                }
                _ => {}
            }
        }
        if let Some(audio) = &patch.audio_dl {
            if audio == "on" {
                self.formats.insert(DownloadFormat::AudioOnly);
            } else {
                self.formats.remove(&DownloadFormat::AudioOnly);
            }
        }
        if let Some(image) = &patch.image_dl {
            self.image_fallback = image == "on";
        }
        if let Some(custom) = &patch.custom_command {
            self.custom_command = none_if_empty(custom);
        }
    }
}

fn none_if_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
