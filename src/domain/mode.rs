use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;
use super::model::Confidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Task {
    #[default]
    Detection,
}

impl FromStr for Task {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Detection" => Ok(Task::Detection),
            other => Err(DomainError::InvalidInput(format!("unknown task: {other}"))),
        }
    }
}

/// Tipo de entrada del selector de fuente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Image,
    Video,
    Webcam,
    #[serde(rename = "RTSP")]
    Rtsp,
    YouTube,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Image,
        SourceKind::Video,
        SourceKind::Webcam,
        SourceKind::Rtsp,
        SourceKind::YouTube,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Image => "Image",
            SourceKind::Video => "Video",
            SourceKind::Webcam => "Webcam",
            SourceKind::Rtsp => "RTSP",
            SourceKind::YouTube => "YouTube",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SourceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.label() == s)
            .ok_or(DomainError::InvalidSource)
    }
}

/// Rama elegida por el enrutado para una interacción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Branch {
    StaticImage,
    StoredVideo,
    Webcam,
    NetworkStream,
    HostedVideo,
}

impl From<SourceKind> for Branch {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Image => Branch::StaticImage,
            SourceKind::Video => Branch::StoredVideo,
            SourceKind::Webcam => Branch::Webcam,
            SourceKind::Rtsp => Branch::NetworkStream,
            SourceKind::YouTube => Branch::HostedVideo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModeSelection {
    pub task: Task,
    /// `None` hasta que el usuario elige algo válido.
    pub source: Option<SourceKind>,
    pub confidence: Confidence,
}

impl Default for ModeSelection {
    fn default() -> Self {
        Self {
            task: Task::Detection,
            source: Some(SourceKind::Image),
            confidence: Confidence::default(),
        }
    }
}
