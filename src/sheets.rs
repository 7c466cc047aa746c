//! Spreadsheet row source: one row per session holding both texts, the
//! music genre and, once processed, the uploaded video's id.

use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{CollaboratorError, PipelineError, Result};

const SERVICE: &str = "sheets";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const SESSION_COL: usize = 0; // A
const SECONDARY_COL: usize = 5; // F
const PRIMARY_COL: usize = 6; // G
const VIDEO_ID_COL: usize = 8; // I
const GENRE_COL: usize = 10; // K
const VIDEO_ID_LETTER: &str = "I";

pub const DEFAULT_GENRE: &str = "chill";

/// One data row of the sheet, validated once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based row number in the sheet
    pub row_number: usize,
    pub session_id: String,
    /// Narration text
    pub primary_text: Option<String>,
    /// On-screen supplementary text
    pub secondary_text: Option<String>,
    /// Lower-cased; defaults to [`DEFAULT_GENRE`]
    pub music_genre: String,
    pub video_reference_id: Option<String>,
}

impl SheetRow {
    pub fn is_unprocessed(&self) -> bool {
        self.primary_text.is_some() && self.video_reference_id.is_none()
    }

    fn from_cells(row_number: usize, cells: &[Value]) -> Self {
        Self {
            row_number,
            session_id: cell(cells, SESSION_COL).unwrap_or_default(),
            primary_text: cell(cells, PRIMARY_COL),
            secondary_text: cell(cells, SECONDARY_COL),
            music_genre: cell(cells, GENRE_COL)
                .map(|g| g.to_lowercase())
                .unwrap_or_else(|| DEFAULT_GENRE.to_string()),
            video_reference_id: cell(cells, VIDEO_ID_COL),
        }
    }
}

/// Trimmed, non-empty cell text.
fn cell(cells: &[Value], index: usize) -> Option<String> {
    let text = match cells.get(index)? {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Parse the raw value grid, skipping the header row.
pub fn parse_rows(values: &[Vec<Value>]) -> Vec<SheetRow> {
    values
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, cells)| SheetRow::from_cells(i + 1, cells))
        .collect()
}

/// The newest row for `session_id`, searching from the bottom.
pub fn find_latest<'a>(rows: &'a [SheetRow], session_id: &str) -> Option<&'a SheetRow> {
    rows.iter().rev().find(|r| r.session_id == session_id)
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsClient {
    client: reqwest::Client,
    token: String,
    spreadsheet_id: String,
    sheet_name: String,
}

impl SheetsClient {
    pub fn new(token: &str, spreadsheet_id: &str, sheet_name: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
        }
    }

    fn values_url(&self, range: &str) -> std::result::Result<Url, CollaboratorError> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| CollaboratorError::Unexpected {
            service: SERVICE,
            detail: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| CollaboratorError::Unexpected {
                service: SERVICE,
                detail: "sheets API URL cannot be a base".to_string(),
            })?
            .extend([self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    /// Read all data rows of the sheet.
    pub async fn read_rows(&self) -> std::result::Result<Vec<SheetRow>, CollaboratorError> {
        let url = self.values_url(&format!("{}!A:K", self.sheet_name))?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| CollaboratorError::Request {
                service: SERVICE,
                source,
            })?;
        let resp = check_status(SERVICE, resp).await?;
        let range: ValueRange = resp.json().await.map_err(|source| CollaboratorError::Request {
            service: SERVICE,
            source,
        })?;
        if range.values.is_empty() {
            log::warn!("Sheet {} is empty", self.sheet_name);
        }
        Ok(parse_rows(&range.values))
    }

    /// Rows with narration text but no uploaded video yet.
    pub async fn scan_unprocessed(&self) -> std::result::Result<Vec<SheetRow>, CollaboratorError> {
        let rows = self.read_rows().await?;
        let pending: Vec<SheetRow> = rows.into_iter().filter(SheetRow::is_unprocessed).collect();
        log::info!("Found {} unprocessed row(s)", pending.len());
        for row in &pending {
            log::info!("  Row {}: {}", row.row_number, row.session_id);
        }
        Ok(pending)
    }

    /// Fetch the newest row for `session_id`; both texts must be present.
    pub async fn fetch_row(&self, session_id: &str) -> Result<SheetRow> {
        let rows = self.read_rows().await?;
        let row = find_latest(&rows, session_id).cloned().ok_or_else(|| {
            PipelineError::MissingInput(format!("session {session_id} not found in sheet"))
        })?;
        if row.primary_text.is_none() || row.secondary_text.is_none() {
            return Err(PipelineError::MissingInput(format!(
                "row {} lacks text (primary: {}, secondary: {})",
                row.row_number,
                row.primary_text.is_some(),
                row.secondary_text.is_some()
            )));
        }
        log::info!(
            "Fetched row {} for session {} (music genre: {})",
            row.row_number,
            session_id,
            row.music_genre
        );
        Ok(row)
    }

    /// Record the uploaded video's id in the row's video column.
    pub async fn write_video_reference(
        &self,
        row: &SheetRow,
        video_id: &str,
    ) -> std::result::Result<(), CollaboratorError> {
        let range = format!("{}!{}{}", self.sheet_name, VIDEO_ID_LETTER, row.row_number);
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");

        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .json(&json!({ "values": [[video_id]] }))
            .send()
            .await
            .map_err(|source| CollaboratorError::Request {
                service: SERVICE,
                source,
            })?;
        check_status(SERVICE, resp).await?;
        log::info!("Row {} video id set to {}", row.row_number, video_id);
        Ok(())
    }
}

/// Turn a non-success response into [`CollaboratorError::Api`] with its body.
pub(crate) async fn check_status(
    service: &'static str,
    resp: reqwest::Response,
) -> std::result::Result<reqwest::Response, CollaboratorError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    log::error!("{service} API returned {status}");
    Err(CollaboratorError::Api {
        service,
        status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<Vec<Value>> {
        serde_json::from_value(json!([
            ["sessionId", "b", "c", "d", "e", "japanese", "english", "h", "videoId", "j", "genre"],
            ["250114_1", "", "", "", "", "古い。", "old text", "", "vid-1"],
            ["250115_1", "", "", "", "", "新しい。", "new text", "", "", "", "Energy"],
            ["250116_1"],
            ["250115_1", "", "", "", "", "最新。", "newest text"]
        ]))
        .unwrap()
    }

    #[test]
    fn rows_are_typed_with_defaults() {
        let rows = parse_rows(&grid());
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[0].video_reference_id.as_deref(), Some("vid-1"));
        assert_eq!(rows[0].music_genre, DEFAULT_GENRE);
        assert_eq!(rows[1].music_genre, "energy");
        assert_eq!(rows[2].primary_text, None);
        assert_eq!(rows[2].secondary_text, None);
    }

    #[test]
    fn unprocessed_needs_text_and_no_video() {
        let rows = parse_rows(&grid());
        let pending: Vec<usize> = rows
            .iter()
            .filter(|r| r.is_unprocessed())
            .map(|r| r.row_number)
            .collect();
        assert_eq!(pending, vec![3, 5]);
    }

    #[test]
    fn latest_row_wins() {
        let rows = parse_rows(&grid());
        let row = find_latest(&rows, "250115_1").unwrap();
        assert_eq!(row.row_number, 5);
        assert_eq!(row.primary_text.as_deref(), Some("newest text"));
        assert!(find_latest(&rows, "nope").is_none());
    }

    #[test]
    fn numeric_cells_become_text() {
        let cells = vec![json!(250117), Value::Null];
        assert_eq!(cell(&cells, 0).as_deref(), Some("250117"));
        assert_eq!(cell(&cells, 1), None);
        assert_eq!(cell(&cells, 7), None);
    }

    #[test]
    fn values_url_escapes_range() {
        let client = SheetsClient::new("t", "sheet-id", "my sheet");
        let url = client.values_url("my sheet!A:K").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/my%20sheet!A:K"
        );
    }
}
