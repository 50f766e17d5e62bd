//! Voice-activity sensing.
//!
//! The sensor polls an analyser node once per tick, computes the RMS energy
//! of the time-domain buffer and reports `rms > threshold` to its listener.
//! Every sample is reported, including repeats of the previous
//! classification; callers wanting hysteresis add their own.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::VadSettings;
use crate::media::{AudioAnalyser, AudioContext, MediaStream};

/// Analyser window, in samples.
pub const ANALYSER_FFT_SIZE: usize = 512;

/// Root-mean-square energy of `samples`. Zero for an empty buffer.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

struct Attachment {
    task: JoinHandle<()>,
    analyser: Arc<Mutex<Box<dyn AudioAnalyser>>>,
}

pub struct VoiceActivitySensor {
    threshold: f32,
    interval: Duration,
    attachment: Option<Attachment>,
}

impl std::fmt::Debug for VoiceActivitySensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceActivitySensor")
            .field("threshold", &self.threshold)
            .field("interval", &self.interval)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl VoiceActivitySensor {
    pub fn new(settings: VadSettings) -> Self {
        Self {
            threshold: settings.threshold,
            interval: Duration::from_millis(settings.analysis_interval_ms.max(1)),
            attachment: None,
        }
    }

    /// Starts sampling `stream`, calling `listener` on every tick.
    ///
    /// Must be called from within a tokio runtime. Re-attaching detaches the
    /// previous source first. If `context` cannot provide an analyser for the
    /// stream the sensor stays idle and no error is raised.
    pub fn attach<F>(&mut self, stream: &MediaStream, context: &dyn AudioContext, mut listener: F)
    where
        F: FnMut(bool) + Send + 'static,
    {
        self.detach();

        let Some(analyser) = context.create_analyser(stream, ANALYSER_FFT_SIZE) else {
            tracing::debug!(stream_id = stream.id(), "no audio analyser available, voice activity disabled");
            return;
        };

        let mut buffer = vec![0.0_f32; analyser.fft_size()];
        let analyser = Arc::new(Mutex::new(analyser));
        let sampled = Arc::clone(&analyser);
        let threshold = self.threshold;
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let level = {
                    let Ok(mut analyser) = sampled.lock() else {
                        break;
                    };
                    analyser.time_domain_data(&mut buffer);
                    rms(&buffer)
                };
                listener(level > threshold);
            }
        });

        self.attachment = Some(Attachment { task, analyser });
    }

    /// Stops sampling and releases the analyser. Safe to call at any time.
    pub fn detach(&mut self) {
        let Some(attachment) = self.attachment.take() else {
            return;
        };
        attachment.task.abort();
        match attachment.analyser.lock() {
            Ok(mut analyser) => analyser.disconnect(),
            Err(poisoned) => poisoned.into_inner().disconnect(),
        };
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }
}

impl Drop for VoiceActivitySensor {
    fn drop(&mut self) {
        self.detach();
    }
}
