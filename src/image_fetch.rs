//! Downloading NFT images and normalizing them for the vision model.

use std::{io::Cursor, time::Duration};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{DynamicImage, codecs::jpeg::JpegEncoder, imageops::FilterType};

use crate::error::ImageError;

pub const MAX_DIMENSION: u32 = 1024;
const JPEG_QUALITY: u8 = 85;

/// An image re-encoded as base64 JPEG, ready to attach to a model prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    pub base64_data: String,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<EncodedImage, ImageError>;
}

/// Fetches images over HTTP(S) without authentication.
pub struct HttpImageSource {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpImageSource {
    pub fn new(timeout: Duration, max_bytes: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_bytes,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let mut resp = self.client.get(url).timeout(self.timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ImageError::Status(status.as_u16()));
        }
        if let Some(len) = resp.content_length() {
            if len as usize > self.max_bytes {
                return Err(ImageError::TooLarge {
                    size: len as usize,
                    limit: self.max_bytes,
                });
            }
        }
        // Content-Length may be absent or wrong; enforce the cap while streaming
        let mut body = Vec::with_capacity(resp.content_length().map_or(0, |len| (len as usize).min(self.max_bytes)));
        while let Some(chunk) = resp.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(ImageError::TooLarge {
                    size: body.len() + chunk.len(),
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<EncodedImage, ImageError> {
        tracing::info!("Downloading image from: {}", url);
        let bytes = match tokio::time::timeout(self.timeout, self.download(url)).await {
            Ok(result) => result?,
            Err(_) => return Err(ImageError::Timeout(self.timeout)),
        };
        tracing::info!("Image downloaded successfully, size: {} bytes", bytes.len());

        // decoding and resampling are CPU-bound
        let encoded = tokio::task::spawn_blocking(move || normalize_image(&bytes)).await??;
        tracing::info!(
            "Image normalized to {}x{}, base64 length: {}",
            encoded.width,
            encoded.height,
            encoded.base64_data.len()
        );
        Ok(encoded)
    }
}

/// Decodes `bytes`, converts to RGB, bounds both sides to [`MAX_DIMENSION`]
/// preserving aspect ratio, and re-encodes as JPEG.
pub fn normalize_image(bytes: &[u8]) -> Result<EncodedImage, ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let mut rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

    if rgb.width() > MAX_DIMENSION || rgb.height() > MAX_DIMENSION {
        tracing::debug!(
            "Resizing image from {}x{} to fit {}px",
            rgb.width(),
            rgb.height(),
            MAX_DIMENSION
        );
        rgb = rgb.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3);
    }

    let mut buffer = Cursor::new(Vec::new());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY))?;

    Ok(EncodedImage {
        mime_type: "image/jpeg",
        base64_data: STANDARD.encode(buffer.into_inner()),
        width: rgb.width(),
        height: rgb.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([200, 40, 40, 128]),
        ));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn large_image_is_downscaled_preserving_aspect_ratio() {
        let encoded = normalize_image(&png_bytes(2048, 1024)).unwrap();
        assert_eq!((encoded.width, encoded.height), (1024, 512));
        assert_eq!(encoded.mime_type, "image/jpeg");

        let jpeg = STANDARD.decode(&encoded.base64_data).unwrap();
        let reloaded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        assert_eq!(reloaded.width(), 1024);
    }

    #[test]
    fn small_image_keeps_its_size() {
        let encoded = normalize_image(&png_bytes(300, 200)).unwrap();
        assert_eq!((encoded.width, encoded.height), (300, 200));
    }

    #[test]
    fn unsupported_bytes_are_a_decode_error() {
        let err = normalize_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    /// Serves `body` as a chunked response, so no Content-Length is sent.
    async fn serve_chunked(body: Vec<u8>, chunk_size: usize) -> String {
        use axum::{Router, body::{Body, Bytes}, routing::get};

        let chunks: Vec<Bytes> = body.chunks(chunk_size).map(Bytes::copy_from_slice).collect();
        let app = Router::new().route(
            "/nft.png",
            get(move || {
                let chunks = chunks.clone();
                async move {
                    Body::from_stream(futures::stream::iter(
                        chunks.into_iter().map(Ok::<_, std::io::Error>),
                    ))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}/nft.png")
    }

    #[tokio::test]
    async fn chunked_body_over_the_cap_is_rejected() {
        let url = serve_chunked(vec![0u8; 64 * 1024], 4096).await;
        let source = HttpImageSource::new(Duration::from_secs(5), 10_000);
        let err = source.fetch(&url).await.unwrap_err();
        assert!(matches!(err, ImageError::TooLarge { limit: 10_000, size } if size <= 10_000 + 4096));
    }

    #[tokio::test]
    async fn chunked_body_within_the_cap_is_normalized() {
        let url = serve_chunked(png_bytes(300, 200), 512).await;
        let source = HttpImageSource::new(Duration::from_secs(5), 10 * 1024 * 1024);
        let encoded = source.fetch(&url).await.unwrap();
        assert_eq!((encoded.width, encoded.height), (300, 200));
    }

    #[tokio::test]
    async fn unreachable_host_is_an_error_not_a_panic() {
        let source = HttpImageSource::new(Duration::from_secs(2), 1024);
        assert!(source.fetch("http://127.0.0.1:9/nft.png").await.is_err());
    }
}
