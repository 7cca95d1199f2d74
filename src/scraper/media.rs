//! Chunked media upload.
//!
//! Three-phase protocol on the session's authenticated transport:
//! INIT declares total size and MIME type, APPEND ships ordered 2 MB
//! segments, FINALIZE closes the upload. Large media then processes
//! asynchronously server-side; STATUS is polled on the server-declared
//! interval until it settles. Any failure aborts the whole upload — there
//! is no resume.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::ScrapeError;
use crate::models::MediaUploadResult;

use super::session::XSession;

const UPLOAD_URL: &str = "https://upload.x.com/i/media/upload.json";
const UPLOAD_PATH: &str = "/i/media/upload.json";

pub const UPLOAD_CHUNK_SIZE: usize = 2 * 1024 * 1024;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    media_id_string: String,
    #[serde(default)]
    media_key: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProcessingInfo {
    #[serde(default)]
    state: String,
    #[serde(default)]
    check_after_secs: Option<u64>,
    #[serde(default)]
    error: Option<ProcessingError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProcessingError {
    #[serde(default)]
    message: String,
}

impl ProcessingInfo {
    fn in_flight(&self) -> bool {
        self.state == "pending" || self.state == "in_progress"
    }
}

impl XSession {
    /// Upload `media_size` bytes from `media` and return the id/key pair
    /// to attach when posting. Payloads up to one chunk go out as a single
    /// segment; larger ones stream through one reused chunk buffer.
    pub async fn upload_media<R>(
        &self,
        mut media: R,
        media_size: usize,
    ) -> Result<MediaUploadResult, ScrapeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if media_size == 0 {
            return Err(ScrapeError::InvalidInput(
                "media size must be greater than zero",
            ));
        }

        self.ensure_logged_in().await?;

        // First chunk doubles as the MIME detection window.
        let mut chunk_buffer = vec![0u8; UPLOAD_CHUNK_SIZE.min(media_size)];
        let first_len = read_chunk(&mut media, &mut chunk_buffer).await?;
        if first_len == 0 {
            return Err(ScrapeError::InvalidInput("media reader was empty"));
        }
        let mime_type = detect_mime(&chunk_buffer[..first_len]);

        let total_bytes = media_size.to_string();
        let init: UploadResponse = self
            .execute_json(
                self.client()
                    .post(UPLOAD_URL)
                    .headers(self.request_headers("POST", UPLOAD_PATH)?)
                    .query(&[
                        ("command", "INIT"),
                        ("total_bytes", total_bytes.as_str()),
                        ("media_type", mime_type),
                    ]),
            )
            .await?;

        let media_id = init.media_id_string;
        if media_id.is_empty() {
            return Err(ScrapeError::InvalidInput(
                "media id not returned from initialize",
            ));
        }
        debug!(media_id = %media_id, mime = mime_type, size = media_size, "media upload initialized");

        if media_size <= UPLOAD_CHUNK_SIZE {
            self.append_segment(&media_id, 0, &chunk_buffer[..first_len])
                .await?;
        } else {
            let mut segment_index = 0usize;
            let mut filled = first_len;
            loop {
                self.append_segment(&media_id, segment_index, &chunk_buffer[..filled])
                    .await?;
                segment_index += 1;

                filled = read_chunk(&mut media, &mut chunk_buffer).await?;
                if filled == 0 {
                    break;
                }
            }
        }

        let finalize: UploadResponse = self
            .execute_json(
                self.client()
                    .post(UPLOAD_URL)
                    .headers(self.request_headers("POST", UPLOAD_PATH)?)
                    .query(&[("command", "FINALIZE"), ("media_id", media_id.as_str())]),
            )
            .await?;

        let settled = self.await_processing(&media_id, finalize).await?;

        Ok(MediaUploadResult {
            media_id,
            media_key: settled.media_key.unwrap_or_default(),
            size: settled.size.unwrap_or(media_size as u64),
        })
    }

    async fn append_segment(
        &self,
        media_id: &str,
        segment_index: usize,
        chunk: &[u8],
    ) -> Result<(), ScrapeError> {
        let form = Form::new().part("media", Part::bytes(chunk.to_vec()).file_name("media"));

        let segment = segment_index.to_string();
        let response = self
            .execute(
                self.client()
                    .post(UPLOAD_URL)
                    .headers(self.request_headers("POST", UPLOAD_PATH)?)
                    .query(&[
                        ("command", "APPEND"),
                        ("media_id", media_id),
                        ("segment_index", segment.as_str()),
                    ])
                    .multipart(form),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::BadRequest { status, body });
        }

        debug!(media_id, segment_index, bytes = chunk.len(), "segment appended");
        Ok(())
    }

    /// Poll STATUS until the server finishes asynchronous processing.
    /// Cancellation-aware between polls; a reported failure is terminal.
    async fn await_processing(
        &self,
        media_id: &str,
        mut last: UploadResponse,
    ) -> Result<UploadResponse, ScrapeError> {
        loop {
            let Some(info) = last.processing_info.clone() else {
                return Ok(last);
            };

            if info.state == "failed" {
                let message = info
                    .error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "unspecified".to_owned());
                return Err(ScrapeError::MediaProcessing(message));
            }
            if !info.in_flight() {
                return Ok(last);
            }

            let wait_secs = info
                .check_after_secs
                .filter(|&s| s > 0)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;

            last = self
                .execute_json(
                    self.client()
                        .get(UPLOAD_URL)
                        .headers(self.request_headers("GET", UPLOAD_PATH)?)
                        .query(&[("command", "STATUS"), ("media_id", media_id)]),
                )
                .await?;
        }
    }
}

/// Fill `buf` from the reader, tolerating a short final read. Returns the
/// number of bytes read; 0 means EOF.
async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<usize, ScrapeError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Magic-byte MIME sniffing for the media types the bot actually posts.
fn detect_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        "image/webp"
    } else if data.len() >= 12 && &data[4..8] == b"ftyp" {
        "video/mp4"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_media_types() {
        assert_eq!(detect_mime(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]), "image/png");
        assert_eq!(detect_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(detect_mime(b"GIF89a..."), "image/gif");
        assert_eq!(detect_mime(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(detect_mime(b"\x00\x00\x00\x20ftypisom"), "video/mp4");
        assert_eq!(detect_mime(b"plain text"), "application/octet-stream");
    }

    #[tokio::test]
    async fn read_chunk_fills_until_eof() {
        let data = vec![7u8; 5];
        let mut reader = data.as_slice();
        let mut buf = [0u8; 8];

        let n = read_chunk(&mut reader, &mut buf).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], &[7, 7, 7, 7, 7]);

        let n = read_chunk(&mut reader, &mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn read_chunk_stops_at_buffer_capacity() {
        let data = vec![1u8; 16];
        let mut reader = data.as_slice();
        let mut buf = [0u8; 8];

        assert_eq!(read_chunk(&mut reader, &mut buf).await.unwrap(), 8);
        assert_eq!(read_chunk(&mut reader, &mut buf).await.unwrap(), 8);
        assert_eq!(read_chunk(&mut reader, &mut buf).await.unwrap(), 0);
    }

    #[test]
    fn processing_states() {
        let pending = ProcessingInfo {
            state: "pending".into(),
            ..Default::default()
        };
        assert!(pending.in_flight());

        let done = ProcessingInfo {
            state: "succeeded".into(),
            ..Default::default()
        };
        assert!(!done.in_flight());
    }
}
