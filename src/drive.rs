//! Asset store backed by the Google Drive v3 REST API.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;

use crate::error::{CollaboratorError, PipelineError, Result};
use crate::sheets::check_status;

const SERVICE: &str = "drive";
const FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Media-type restriction for folder listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFilter {
    Any,
    Folders,
    Images,
    Mp3,
}

/// Drive search query for the children of `folder_id`.
pub fn children_query(folder_id: &str, filter: MediaFilter) -> String {
    let base = format!("'{folder_id}' in parents and trashed=false");
    match filter {
        MediaFilter::Any => base,
        MediaFilter::Folders => format!("{base} and mimeType='{FOLDER_MIME}'"),
        MediaFilter::Images => format!("{base} and mimeType contains 'image/'"),
        MediaFilter::Mp3 => format!("{base} and mimeType='audio/mpeg'"),
    }
}

/// The subfolder whose name matches `genre`, ignoring case.
pub fn genre_folder<'a>(folders: &'a [DriveFile], genre: &str) -> Option<&'a DriveFile> {
    folders.iter().find(|f| f.name.eq_ignore_ascii_case(genre))
}

/// `YYMMDD` taken from the leading digits of a session id (`YYYYMMDD...` or
/// `YYMMDD...`), or from `today` when the id does not start with a date.
pub fn date_prefix(session_id: &str, today: time::Date) -> String {
    let digits: String = session_id.chars().take_while(char::is_ascii_digit).collect();
    match digits.len() {
        n if n >= 8 => digits[2..8].to_string(),
        7 => digits[1..7].to_string(),
        6 => digits,
        _ => format!(
            "{:02}{:02}{:02}",
            today.year().rem_euclid(100),
            u8::from(today.month()),
            today.day()
        ),
    }
}

/// Next free `<prefix>_NN.<ext>` name given the names already in the folder.
pub fn next_upload_name(prefix: &str, existing: &[String], ext: &str) -> String {
    let head = format!("{prefix}_");
    let tail = format!(".{ext}");
    let max = existing
        .iter()
        .filter_map(|name| name.strip_prefix(&head)?.strip_suffix(&tail)?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}_{:02}.{ext}", max + 1)
}

fn local_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

pub struct DriveClient {
    client: reqwest::Client,
    token: String,
}

impl DriveClient {
    pub fn new(token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
        }
    }

    fn request_err(source: reqwest::Error) -> CollaboratorError {
        CollaboratorError::Request {
            service: SERVICE,
            source,
        }
    }

    fn io_err(source: std::io::Error) -> CollaboratorError {
        CollaboratorError::Io {
            service: SERVICE,
            source,
        }
    }

    pub async fn list(&self, query: &str, page_size: u32) -> Result<Vec<DriveFile>, CollaboratorError> {
        let page_size = page_size.to_string();
        let resp = self
            .client
            .get(FILES_API)
            .bearer_auth(&self.token)
            .query(&[
                ("q", query),
                ("spaces", "drive"),
                ("fields", "files(id, name)"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(Self::request_err)?;
        let resp = check_status(SERVICE, resp).await?;
        let list: FileList = resp.json().await.map_err(Self::request_err)?;
        log::debug!("{} file(s) for query {}", list.files.len(), query);
        Ok(list.files)
    }

    /// Stream `file` into `dest_dir`, returning the local path.
    pub async fn download(&self, file: &DriveFile, dest_dir: &Path) -> Result<PathBuf, CollaboratorError> {
        let mut url = Url::parse(FILES_API).map_err(|e| CollaboratorError::Unexpected {
            service: SERVICE,
            detail: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| CollaboratorError::Unexpected {
                service: SERVICE,
                detail: "files URL cannot be a base".to_string(),
            })?
            .push(&file.id);
        url.query_pairs_mut().append_pair("alt", "media");

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(Self::request_err)?;
        let mut resp = check_status(SERVICE, resp).await?;

        let path = dest_dir.join(local_name(&file.name));
        let mut out = tokio::fs::File::create(&path).await.map_err(Self::io_err)?;
        while let Some(chunk) = resp.chunk().await.map_err(Self::request_err)? {
            out.write_all(&chunk).await.map_err(Self::io_err)?;
        }
        out.flush().await.map_err(Self::io_err)?;
        log::info!("Downloaded {} -> {}", file.name, path.display());
        Ok(path)
    }

    /// Pick one random MP3 from the genre subfolder of `music_folder`,
    /// falling back to the music folder itself when no subfolder matches.
    pub async fn pick_music(&self, music_folder: &str, genre: &str, dest_dir: &Path) -> Result<PathBuf> {
        let folders = self
            .list(&children_query(music_folder, MediaFilter::Folders), 10)
            .await?;
        let folder_id = match genre_folder(&folders, genre) {
            Some(folder) => folder.id.clone(),
            None => {
                log::warn!("No music folder for genre '{}'; using the parent folder", genre);
                music_folder.to_string()
            }
        };

        let tracks = self
            .list(&children_query(&folder_id, MediaFilter::Mp3), 100)
            .await?;
        let track = tracks
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| PipelineError::MissingInput(format!("no music tracks for genre '{genre}'")))?;
        log::info!("Selected music track: {}", track.name);
        Ok(self.download(track, dest_dir).await?)
    }

    /// Download the images in `folder`, optionally only a random `sample` of them.
    pub async fn download_images(
        &self,
        folder: &str,
        dest_dir: &Path,
        sample: Option<usize>,
    ) -> Result<Vec<PathBuf>> {
        let mut files = self
            .list(&children_query(folder, MediaFilter::Images), 100)
            .await?;
        if files.is_empty() {
            return Err(PipelineError::MissingInput(format!("no images in folder {folder}")));
        }
        if let Some(n) = sample.filter(|&n| n > 0 && n < files.len()) {
            files = files
                .choose_multiple(&mut rand::thread_rng(), n)
                .cloned()
                .collect();
            log::info!("Randomly selected {} image(s)", files.len());
        }

        let mut paths = Vec::with_capacity(files.len());
        for file in &files {
            paths.push(self.download(file, dest_dir).await?);
        }
        Ok(paths)
    }

    /// Upload `path` into `folder` under the next `YYMMDD_NN.mp4` name for the
    /// session's date. Returns the new file id.
    pub async fn upload(&self, path: &Path, folder: &str, session_id: &str) -> Result<String, CollaboratorError> {
        let prefix = date_prefix(session_id, time::OffsetDateTime::now_utc().date());
        let query = format!(
            "{} and name contains '{prefix}_'",
            children_query(folder, MediaFilter::Any)
        );
        let existing: Vec<String> = self
            .list(&query, 100)
            .await?
            .into_iter()
            .map(|f| f.name)
            .collect();
        let name = next_upload_name(&prefix, &existing, "mp4");

        let resp = self
            .client
            .post(FILES_API)
            .bearer_auth(&self.token)
            .query(&[("fields", "id")])
            .json(&json!({ "name": name, "parents": [folder] }))
            .send()
            .await
            .map_err(Self::request_err)?;
        let created: CreatedFile = check_status(SERVICE, resp)
            .await?
            .json()
            .await
            .map_err(Self::request_err)?;

        let bytes = tokio::fs::read(path).await.map_err(Self::io_err)?;
        let resp = self
            .client
            .patch(format!("{UPLOAD_API}/{}", created.id))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "media")])
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .body(bytes)
            .send()
            .await
            .map_err(Self::request_err)?;
        check_status(SERVICE, resp).await?;

        log::info!("Uploaded {} as {} (id {})", path.display(), name, created.id);
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_sequence_continues_after_max() {
        let existing = vec![
            "250114_01.mp4".to_string(),
            "250114_07.mp4".to_string(),
            "250114_03.mp4".to_string(),
            "x250114_99.mp4".to_string(),
            "250114_notes.txt".to_string(),
        ];
        assert_eq!(next_upload_name("250114", &existing, "mp4"), "250114_08.mp4");
        assert_eq!(next_upload_name("250115", &[], "mp4"), "250115_01.mp4");
    }

    #[test]
    fn date_prefix_from_session_id() {
        let today = time::Date::from_calendar_date(2026, time::Month::October, 16).unwrap();
        assert_eq!(date_prefix("20250114_093000", today), "250114");
        assert_eq!(date_prefix("250114_093000", today), "250114");
        assert_eq!(date_prefix("session-x", today), "261016");
    }

    #[test]
    fn genre_match_ignores_case() {
        let folders = vec![
            DriveFile {
                id: "1".into(),
                name: "Chill".into(),
            },
            DriveFile {
                id: "2".into(),
                name: "energy".into(),
            },
        ];
        assert_eq!(genre_folder(&folders, "chill").unwrap().id, "1");
        assert_eq!(genre_folder(&folders, "ENERGY").unwrap().id, "2");
        assert!(genre_folder(&folders, "jazz").is_none());
    }

    #[test]
    fn queries_filter_by_media_type() {
        assert_eq!(
            children_query("abc", MediaFilter::Mp3),
            "'abc' in parents and trashed=false and mimeType='audio/mpeg'"
        );
        assert!(children_query("abc", MediaFilter::Images).ends_with("mimeType contains 'image/'"));
        assert_eq!(
            children_query("abc", MediaFilter::Any),
            "'abc' in parents and trashed=false"
        );
    }

    #[test]
    fn local_names_stay_in_directory() {
        assert_eq!(local_name("a/b\\c.jpg"), "a_b_c.jpg");
    }
}
