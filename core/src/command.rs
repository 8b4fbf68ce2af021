use std::env;
use std::path::{Path, PathBuf};

use crate::config::PluginConfig;
use crate::error::CoreResult;
use crate::process::ProcessRunner;
use crate::settings::{ButtonSettings, DownloadFormat};

/// Output filename template understood by the downloader.
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

pub fn output_folder_name(folder: Option<&str>) -> PathBuf {
    match folder {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => default_output_folder(),
    }
}

pub fn default_output_folder() -> PathBuf {
    if let Ok(dir) = env::var("DECKDL_OUTPUT_DIR") {
        return PathBuf::from(dir);
    }
    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .unwrap_or_else(|_| "/tmp".to_string());
    let desktop = PathBuf::from(&home).join("Desktop");
    if desktop.exists() {
        return desktop;
    }
    let downloads = PathBuf::from(&home).join("Downloads");
    if downloads.exists() {
        return downloads;
    }
    PathBuf::from("/tmp")
}

pub fn downloader_exe(exe_path: Option<&str>, config: &PluginConfig) -> PathBuf {
    match exe_path {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(&config.default_exe),
    }
}

fn format_selector(format: DownloadFormat) -> Vec<String> {
    let args: &[&str] = match format {
        DownloadFormat::Video => &["-f", "bestvideo[ext!=webm]+bestaudio[ext!=webm]/mp4"],
        DownloadFormat::VideoOnly => &["-f", "bestvideo[ext!=webm]/mp4"],
        DownloadFormat::AudioOnly => &[
            "-f",
            "bestaudio/best",
            "-v",
            "--extract-audio",
            "--audio-quality",
            "320k",
            "--audio-format",
            "mp3",
        ],
    };
    args.iter().map(|arg| arg.to_string()).collect()
}

pub fn download_args(
    url: &str,
    folder: &Path,
    max_downloads: Option<u32>,
    format: DownloadFormat,
) -> Vec<String> {
    let mut args = format_selector(format);
    let max = max_downloads.unwrap_or(1);
    if max != 0 {
        args.push("--max-downloads".to_string());
        args.push(max.to_string());
    }
    args.push("-o".to_string());
    args.push(format!("{}/{}", folder.display(), OUTPUT_TEMPLATE));
    args.push(url.to_string());
    args
}

/// One downloader invocation per requested format, custom command appended.
pub fn command_queue(url: &str, settings: &ButtonSettings, folder: &Path) -> Vec<Vec<String>> {
    let mut commands = Vec::new();
    for format in &settings.formats {
        commands.push(download_args(url, folder, settings.max_downloads, *format));
    }
    if let Some(custom) = &settings.custom_command {
        if !custom.is_empty() {
            let mut args: Vec<String> =
                custom.split_whitespace().map(|arg| arg.to_string()).collect();
            args.push(url.to_string());
            commands.push(args);
        }
    }
    commands
}

pub fn update_args() -> Vec<String> {
    vec!["--update".to_string()]
}

/// Preview of the command line(s) a press would run, one per line, with a
/// literal "url" placeholder. Nothing is executed.
pub fn sample_command(settings: &ButtonSettings, config: &PluginConfig) -> String {
    let exe = downloader_exe(settings.exe_path.as_deref(), config);
    let folder = output_folder_name(settings.output_folder.as_deref());
    let mut out = String::new();
    for args in command_queue("url", settings, &folder) {
        out.push_str(&format!("{} {}\n", exe.display(), args.join(" ")));
    }
    out
}

pub fn open_folder(runner: &dyn ProcessRunner, path: &Path) -> CoreResult<()> {
    let opener = if cfg!(target_os = "windows") {
        "explorer.exe"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let args = vec![path.display().to_string()];
    runner.spawn(Path::new(opener), &args)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn settings_with(formats: &[DownloadFormat]) -> ButtonSettings {
        ButtonSettings {
            formats: formats.iter().copied().collect::<BTreeSet<_>>(),
            ..Default::default()
        }
    }

    #[test]
    fn video_download_args() {
        let args = download_args(
            "https://example.com/v",
            Path::new("/tmp/out"),
            None,
            DownloadFormat::Video,
        );
        assert_eq!(
            args,
            vec![
                "-f",
                "bestvideo[ext!=webm]+bestaudio[ext!=webm]/mp4",
                "--max-downloads",
                "1",
                "-o",
                "/tmp/out/%(title)s.%(ext)s",
                "https://example.com/v",
            ]
        );
    }

    #[test]
    fn zero_max_downloads_means_unlimited() {
        let args = download_args(
            "https://example.com/v",
            Path::new("/tmp/out"),
            Some(0),
            DownloadFormat::AudioOnly,
        );
        assert!(!args.contains(&"--max-downloads".to_string()));
    }

    #[test]
    fn one_command_per_format_plus_custom() {
        let mut settings =
            settings_with(&[DownloadFormat::Video, DownloadFormat::AudioOnly]);
        settings.custom_command = Some("--write-thumbnail -q".to_string());
        let commands = command_queue("https://example.com/v", &settings, Path::new("/tmp/out"));
        assert_eq!(commands.len(), 3);
        assert_eq!(
            commands[2],
            vec!["--write-thumbnail", "-q", "https://example.com/v"]
        );
    }

    #[test]
    fn no_formats_and_no_custom_is_empty() {
        let settings = ButtonSettings::default();
        assert!(command_queue("https://example.com/v", &settings, Path::new("/tmp")).is_empty());
    }

    #[test]
    fn sample_command_lists_every_invocation() {
        let mut settings = settings_with(&[DownloadFormat::Video]);
        settings.exe_path = Some("/opt/yt-dlp".to_string());
        settings.output_folder = Some("/tmp/out".to_string());
        let preview = sample_command(&settings, &PluginConfig::default());
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("/opt/yt-dlp -f "));
        assert!(lines[0].ends_with(" url"));
    }
}
