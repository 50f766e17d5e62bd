//! Seams to the platform media stack.
//!
//! Capture devices, audio graphs and encoded tracks belong to the platform
//! runtime. The session only needs to start and stop them and to read a
//! time-domain sample buffer, so each capability is a small trait the
//! embedding application implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::ClientError;

/// Microphone capture constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConstraints {
    pub channel_count: Option<u16>,
    pub sample_rate: Option<u32>,
    pub sample_size: Option<u16>,
    /// Target capture latency in seconds.
    pub latency: Option<f32>,
    pub noise_suppression: Option<bool>,
    pub echo_cancellation: Option<bool>,
    pub auto_gain_control: Option<bool>,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            channel_count: Some(1),
            sample_rate: Some(48_000),
            sample_size: None,
            latency: None,
            noise_suppression: Some(true),
            echo_cancellation: Some(true),
            auto_gain_control: Some(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaConstraints {
    #[serde(default)]
    pub audio: AudioConstraints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single platform media track.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    /// Stops capture or playback. Calling it twice is harmless.
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// A group of tracks delivered together.
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.tracks.iter().map(|t| t.id()).collect();
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &ids)
            .finish()
    }
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Arc<dyn MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Access to capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, ClientError>;
}

/// Reads time-domain samples from a live audio source.
pub trait AudioAnalyser: Send {
    /// Number of samples returned by [`Self::time_domain_data`].
    fn fft_size(&self) -> usize;
    /// Fills `buffer` with the most recent samples in `[-1.0, 1.0]`.
    fn time_domain_data(&mut self, buffer: &mut [f32]);
    /// Detaches the analyser from the audio graph.
    fn disconnect(&mut self);
}

/// An audio processing graph.
pub trait AudioContext: Send + Sync {
    /// Wires `stream` into a new analyser node. Returns `None` when the
    /// stream has no usable audio or the graph is unavailable.
    fn create_analyser(&self, stream: &MediaStream, fft_size: usize)
        -> Option<Box<dyn AudioAnalyser>>;
    fn close(&self);
}

/// Opens audio contexts.
pub trait AudioContextFactory: Send + Sync {
    fn create(&self, sample_rate: u32) -> Result<Arc<dyn AudioContext>, ClientError>;
}
