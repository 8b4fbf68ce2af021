#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub long_press_millis: u64,
    pub process_poll_millis: u64,
    pub default_exe: String,
    pub user_agent: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            long_press_millis: 500,
            process_poll_millis: 100,
            default_exe: default_exe_name(),
            user_agent: "deckdl/0.1".to_string(),
        }
    }
}

fn default_exe_name() -> String {
    if cfg!(windows) {
        "yt-dlp.exe".to_string()
    } else {
        "yt-dlp".to_string()
    }
}
