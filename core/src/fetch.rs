use std::fs;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use url::Url;

use crate::error::{CoreError, CoreResult};

const MAX_DUPLICATE_NAMES: u32 = 10;
const MAX_FILENAME_CHARS: usize = 128;

/// Direct content fetch tried before falling back to the downloader.
pub trait MediaFetcher: Send + Sync {
    /// Fetch the image behind `url` into `output_folder`, returning the
    /// saved path. Errors when the page does not carry image data.
    fn fetch_image(&self, url: &str, output_folder: &Path) -> CoreResult<PathBuf>;
}

pub struct HttpMediaFetcher {
    client: Client,
}

impl HttpMediaFetcher {
    pub fn new(user_agent: &str) -> CoreResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| CoreError::Fetch(err.to_string()))?;
        Ok(Self { client })
    }

    fn fetch_listing(&self, url: &str) -> CoreResult<serde_json::Value> {
        let json_url = format!("{}.json", url.trim_end_matches('/'));
        let body = self
            .client
            .get(&json_url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| CoreError::Fetch(err.to_string()))?
            .text()
            .map_err(|err| CoreError::Fetch(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| CoreError::Fetch(err.to_string()))
    }
}

impl MediaFetcher for HttpMediaFetcher {
    fn fetch_image(&self, url: &str, output_folder: &Path) -> CoreResult<PathBuf> {
        let listing = self.fetch_listing(url)?;
        let post = listing
            .pointer("/0/data/children/0/data")
            .ok_or_else(|| CoreError::Fetch("unexpected listing shape".to_string()))?;

        let hint = post.get("post_hint").and_then(|value| value.as_str());
        if hint != Some("image") {
            return Err(CoreError::Fetch("page does not contain image data".to_string()));
        }

        let title = post
            .get("title")
            .and_then(|value| value.as_str())
            .ok_or_else(|| CoreError::Fetch("image post missing title".to_string()))?;
        let image_url = post
            .get("url")
            .and_then(|value| value.as_str())
            .ok_or_else(|| CoreError::Fetch("image post missing url".to_string()))?;

        let extension = image_extension(image_url)?;
        let dest = unique_path(output_folder, &sanitize_title(title), &extension)?;

        let bytes = self
            .client
            .get(image_url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| CoreError::Fetch(err.to_string()))?
            .bytes()
            .map_err(|err| CoreError::Fetch(err.to_string()))?;
        fs::write(&dest, &bytes).map_err(|err| CoreError::Io(err.to_string()))?;
        Ok(dest)
    }
}

fn image_extension(image_url: &str) -> CoreResult<String> {
    let parsed = Url::parse(image_url).map_err(|err| CoreError::Fetch(err.to_string()))?;
    let extension = Path::new(parsed.path())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    Ok(extension)
}

pub fn sanitize_title(title: &str) -> String {
    let mut out = String::new();
    for ch in title.chars().take(MAX_FILENAME_CHARS) {
        let mapped = match ch {
            '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
            _ => ch,
        };
        out.push(mapped);
    }
    let trimmed = out.trim().trim_matches('.');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Pick a non-existing path in `folder`, appending " (n)" to the name when
/// the plain one is taken.
pub fn unique_path(folder: &Path, name: &str, extension: &str) -> CoreResult<PathBuf> {
    let plain = folder.join(format!("{}{}", name, extension));
    if !plain.exists() {
        return Ok(plain);
    }
    for n in 0..MAX_DUPLICATE_NAMES {
        let numbered = folder.join(format!("{} ({}){}", name, n, extension));
        if !numbered.exists() {
            return Ok(numbered);
        }
    }
    Err(CoreError::Io(format!(
        "no free filename for {} after {} tries",
        plain.display(),
        MAX_DUPLICATE_NAMES
    )))
}
