// Frame sampler - Builds the thumbnail strip for a loaded resource

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::media_session::MediaSession;
use crate::domain::model::{Frame, FrameImage};
use crate::error::{FramecutError, FramecutResult};

/// Capture and thumbnail geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of intervals; the strip holds `frame_count + 1` frames
    pub frame_count: usize,
    pub capture_width: u32,
    pub capture_height: u32,
    pub thumb_width: u32,
    pub thumb_height: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            frame_count: 10,
            capture_width: 160,
            capture_height: 90,
            thumb_width: 80,
            thumb_height: 45,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> FramecutResult<()> {
        if self.frame_count == 0 {
            return Err(FramecutError::Config {
                message: "sampler.frame_count must be at least 1".to_string(),
            });
        }
        if self.capture_width == 0
            || self.capture_height == 0
            || self.thumb_width == 0
            || self.thumb_height == 0
        {
            return Err(FramecutError::Config {
                message: "sampler sizes must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Drives the session through evenly spaced seek points, one at a time
pub struct FrameSampler {
    config: SamplerConfig,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample `count + 1` frames spanning the whole duration, including the
    /// final instant.
    ///
    /// The run borrows the session's playhead and hands it back afterwards,
    /// whether or not sampling succeeded. Each seek settles before the next
    /// is issued. Any failure aborts the run and discards every frame
    /// captured so far.
    pub async fn sample(&self, session: &MediaSession, count: usize) -> FramecutResult<Vec<Frame>> {
        if count == 0 {
            return Err(FramecutError::invalid("sample count must be at least 1"));
        }
        let metadata = session.metadata().ok_or(FramecutError::NoResource)?;
        let generation = session.generation();

        info!(count, duration = metadata.duration, "Sampling frame strip");

        session.begin_sampling(generation).await?;
        let result = self
            .capture_all(session, metadata.duration, count, generation)
            .await;
        match session.end_sampling(generation).await {
            Ok(()) | Err(FramecutError::Cancelled) => {}
            Err(e) => warn!(error = %e, "Failed to restore playhead after sampling"),
        }

        let frames = result?;
        info!(frames = frames.len(), "Frame strip sampled");
        Ok(frames)
    }

    async fn capture_all(
        &self,
        session: &MediaSession,
        duration: f64,
        count: usize,
        generation: u64,
    ) -> FramecutResult<Vec<Frame>> {
        let interval = duration / count as f64;
        let mut frames = Vec::with_capacity(count + 1);
        for i in 0..=count {
            let time = i as f64 * interval;
            let capture = session
                .seek_and_capture(
                    time,
                    self.config.capture_width,
                    self.config.capture_height,
                    generation,
                )
                .await
                .map_err(|e| {
                    warn!(index = i, time, error = %e, "Frame sampling aborted");
                    e
                })?;
            let image = self.thumbnail(&capture)?;
            debug!(index = i, time, "Captured frame");
            frames.push(Frame::new(time, image));
        }
        Ok(frames)
    }

    /// Downsample a capture and encode it as PNG
    fn thumbnail(&self, capture: &RgbImage) -> FramecutResult<FrameImage> {
        let thumb = imageops::resize(
            capture,
            self.config.thumb_width,
            self.config.thumb_height,
            FilterType::Triangle,
        );
        let mut png = Vec::new();
        thumb.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(FrameImage::new(thumb.width(), thumb.height(), png))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::ScriptedDecoder;
    use crate::domain::model::SourceRef;
    use crate::ports::MediaDecoderPort;
    use std::sync::Arc;

    async fn loaded_session(duration: f64) -> (Arc<ScriptedDecoder>, MediaSession) {
        let decoder = Arc::new(ScriptedDecoder::new(duration));
        let session = MediaSession::new(decoder.clone());
        session
            .load(SourceRef::new("clip.mp4", vec![1u8; 16]))
            .await
            .unwrap();
        (decoder, session)
    }

    #[tokio::test]
    async fn test_sample_produces_count_plus_one_frames() {
        let (decoder, session) = loaded_session(20.0).await;
        let sampler = FrameSampler::new(SamplerConfig::default());

        let frames = sampler.sample(&session, 4).await.unwrap();

        let times: Vec<f64> = frames.iter().map(|f| f.time()).collect();
        assert_eq!(times, vec![0.0, 5.0, 10.0, 15.0, 20.0]);
        // The last seek puts the playhead back where it started
        assert_eq!(decoder.seek_log(), vec![0.0, 5.0, 10.0, 15.0, 20.0, 0.0]);
        assert_eq!(decoder.current_time(), 0.0);
        assert!(!session.is_sampling());
        assert!(frames.iter().all(|f| f.image().width() == 80 && f.image().height() == 45));
        assert!(frames.iter().all(|f| f.image().png().starts_with(&[0x89, b'P', b'N', b'G'])));
    }

    #[tokio::test]
    async fn test_sample_rejects_zero_count() {
        let (_decoder, session) = loaded_session(10.0).await;
        let sampler = FrameSampler::new(SamplerConfig::default());
        assert!(matches!(
            sampler.sample(&session, 0).await,
            Err(FramecutError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_sample_without_resource() {
        let decoder = Arc::new(ScriptedDecoder::new(10.0));
        let session = MediaSession::new(decoder);
        let sampler = FrameSampler::new(SamplerConfig::default());
        assert_eq!(
            sampler.sample(&session, 3).await.unwrap_err(),
            FramecutError::NoResource
        );
    }

    #[tokio::test]
    async fn test_failed_seek_discards_partial_strip() {
        let (decoder, session) = loaded_session(10.0).await;
        decoder.fail_seek_at(6.0);
        let sampler = FrameSampler::new(SamplerConfig::default());

        let result = sampler.sample(&session, 5).await;

        assert!(matches!(result, Err(FramecutError::Seek { .. })));
        // Seeks stop at the failing point, then the playhead is restored
        assert_eq!(decoder.seek_log(), vec![0.0, 2.0, 4.0, 0.0]);
        assert!(!session.is_sampling());
    }

    #[tokio::test]
    async fn test_sampling_restores_playing_state() {
        let (decoder, session) = loaded_session(10.0).await;
        session.seek(3.0).await.unwrap();
        session.play().await.unwrap();
        let sampler = FrameSampler::new(SamplerConfig::default());

        sampler.sample(&session, 2).await.unwrap();

        assert_eq!(decoder.current_time(), 3.0);
        assert!(!decoder.is_paused());
        assert!(!decoder.is_ended());
        decoder.advance(1.0);
        assert_eq!(session.current_time(), 4.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(SamplerConfig::default().validate().is_ok());
        let zero = SamplerConfig {
            frame_count: 0,
            ..SamplerConfig::default()
        };
        assert!(zero.validate().is_err());
    }
}
