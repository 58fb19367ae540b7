//! Attachment handling: URL extraction, download and content hashing
//!
//! Image and document links are pulled out of the message text. For QQ,
//! image URLs handed out by the platform are short-lived, so images are
//! downloaded once and re-addressed through their MD5 digest, which gives a
//! stable URL the backend can fetch later.

use crate::error::{ChatllmError, Result};
use md5::{Digest, Md5};
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;

const DEFAULT_MAX_SIZE_BYTES: usize = 20 * 1024 * 1024;

fn image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(https?://.*?\.(?:png|jpg|jpeg|gif|bmp))").expect("image pattern is valid")
    })
}

fn file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(https?://.*?\.(?:pdf|docx?|xlsx?|pptx?))").expect("file pattern is valid")
    })
}

/// Image URLs found in `text`, in order of appearance
///
/// # Examples
///
/// ```
/// use chatllm::media::extract_images;
///
/// let images = extract_images("see https://a.com/x.PNG and http://b.com/y.jpg");
/// assert_eq!(images, vec!["https://a.com/x.PNG", "http://b.com/y.jpg"]);
/// ```
pub fn extract_images(text: &str) -> Vec<String> {
    image_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Document URLs (pdf, doc, xls, ppt and their x variants) found in `text`
///
/// # Examples
///
/// ```
/// use chatllm::media::extract_files;
///
/// assert_eq!(extract_files("read https://a.com/r.docx"), vec!["https://a.com/r.docx"]);
/// ```
pub fn extract_files(text: &str) -> Vec<String> {
    file_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Upper-case hex MD5 of `bytes`
///
/// # Examples
///
/// ```
/// use chatllm::media::md5_hex;
///
/// assert_eq!(md5_hex(b""), "D41D8CD98F00B204E9800998ECF8427E");
/// ```
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:X}", hasher.finalize())
}

/// Stable QQ image URL for an image digest
///
/// # Examples
///
/// ```
/// use chatllm::media::qq_pic_url;
///
/// assert_eq!(
///     qq_pic_url("ABC"),
///     "https://gchat.qpic.cn/gchatpic_new/0/0-0-ABC/0?format=.jpg"
/// );
/// ```
pub fn qq_pic_url(md5: &str) -> String {
    format!("https://gchat.qpic.cn/gchatpic_new/0/0-0-{}/0?format=.jpg", md5)
}

/// Downloads attachments
#[derive(Debug, Clone)]
pub struct MediaFetcher {
    client: Client,
    max_size_bytes: usize,
}

impl MediaFetcher {
    /// Create a fetcher whose downloads time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::Config` if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chatllm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatllmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        })
    }

    /// Sets the largest accepted download
    pub fn with_max_size(mut self, max_size_bytes: usize) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Downloads `url`
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::MediaFetch` on transport errors, non-success
    /// status codes and bodies larger than the size limit
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self.client.get(url).send().await.map_err(|e| {
            tracing::warn!("Failed to download {}: {}", url, e);
            ChatllmError::MediaFetch(format!("failed to download {}: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Download of {} returned {}", url, status);
            return Err(ChatllmError::MediaFetch(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            ))
            .into());
        }

        if let Some(length) = response.content_length() {
            if length > self.max_size_bytes as u64 {
                return Err(ChatllmError::MediaFetch(format!(
                    "{} is {} bytes, limit is {}",
                    url, length, self.max_size_bytes
                ))
                .into());
            }
        }

        // Content-Length may be absent or wrong, so the limit is also
        // enforced while reading.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            ChatllmError::MediaFetch(format!("failed to read body of {}: {}", url, e))
        })? {
            if body.len() + chunk.len() > self.max_size_bytes {
                return Err(ChatllmError::MediaFetch(format!(
                    "{} exceeds the {} byte limit",
                    url, self.max_size_bytes
                ))
                .into());
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    /// Downloads `url` and returns the upper-case hex MD5 of its body
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::MediaFetch` if the download fails
    pub async fn md5_of(&self, url: &str) -> Result<String> {
        let bytes = self.fetch(url).await?;
        let digest = md5_hex(&bytes);
        tracing::debug!("Hashed {} ({} bytes) to {}", url, bytes.len(), digest);
        Ok(digest)
    }

    /// Rewrites image URLs to stable QQ URLs
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::MediaFetch` if any download fails
    pub async fn stable_qq_urls(&self, urls: &[String]) -> Result<Vec<String>> {
        let mut stable = Vec::with_capacity(urls.len());
        for url in urls {
            stable.push(qq_pic_url(&self.md5_of(url).await?));
        }
        Ok(stable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_images_is_lazy_and_case_insensitive() {
        let text = "a https://x.com/a.png.b https://y.com/B.GIF end";
        assert_eq!(
            extract_images(text),
            vec!["https://x.com/a.png", "https://y.com/B.GIF"]
        );
    }

    #[test]
    fn test_extract_images_none() {
        assert!(extract_images("no links here, ftp://a/b.png either").is_empty());
    }

    #[test]
    fn test_extract_files_all_kinds() {
        let text = "https://a/1.pdf https://a/2.doc https://a/3.xlsx https://a/4.pptx https://a/5.png";
        assert_eq!(
            extract_files(text),
            vec!["https://a/1.pdf", "https://a/2.doc", "https://a/3.xlsx", "https://a/4.pptx"]
        );
    }

    #[test]
    fn test_md5_hex_known_value() {
        assert_eq!(md5_hex(b"hello"), "5D41402ABC4B2A76B9719D911017C592");
    }

    #[tokio::test]
    async fn test_md5_of_downloads_and_hashes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = MediaFetcher::new(Duration::from_secs(5)).unwrap();
        let digest = fetcher
            .md5_of(&format!("{}/img.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(digest, "5D41402ABC4B2A76B9719D911017C592");
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_media_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = MediaFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .md5_of(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatllmError>(),
            Some(ChatllmError::MediaFetch(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let fetcher = MediaFetcher::new(Duration::from_secs(5))
            .unwrap()
            .with_max_size(16);
        let err = fetcher
            .fetch(&format!("{}/big.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatllmError>(),
            Some(ChatllmError::MediaFetch(msg)) if msg.contains("limit")
        ));
    }

    #[tokio::test]
    async fn test_fetch_accepts_body_at_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 16]))
            .mount(&server)
            .await;

        let fetcher = MediaFetcher::new(Duration::from_secs(5))
            .unwrap()
            .with_max_size(16);
        let body = fetcher
            .fetch(&format!("{}/exact.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, vec![7u8; 16]);
    }

    #[tokio::test]
    async fn test_stable_qq_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let fetcher = MediaFetcher::new(Duration::from_secs(5)).unwrap();
        let urls = fetcher
            .stable_qq_urls(&[format!("{}/a.png", server.uri())])
            .await
            .unwrap();
        assert_eq!(
            urls,
            vec![qq_pic_url("5D41402ABC4B2A76B9719D911017C592")]
        );
    }
}
