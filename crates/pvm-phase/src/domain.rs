//! Domain types for the job phase FSM (spec §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

pub type JobId = Uuid;

/// The coarse state of a job. Monotonic along the legal transition graph
/// (spec §4.5) — never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Collection,
    FeatureExtraction,
    Matching,
    Evidence,
    Completed,
    Failed,
}

impl Phase {
    /// `completed` and `failed` are terminal; no decision ever moves a job
    /// out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Collection => "collection",
            Phase::FeatureExtraction => "feature_extraction",
            Phase::Matching => "matching",
            Phase::Evidence => "evidence",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Which modalities a job actually has assets for. A job with
/// `has_images=false, has_videos=false` skips straight from
/// `feature_extraction` to `matching` (spec §4.5, S3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetFlags {
    pub has_images: bool,
    pub has_videos: bool,
}

impl AssetFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_zero_asset(self) -> bool {
        !self.has_images && !self.has_videos
    }
}

/// A product-image asset, or a video-frame asset — the two units the
/// collection counters count (spec §3: `AssetCounter.asset_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Image,
    Video,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", if *self == Modality::Image { "image" } else { "video" })
    }
}

/// The processing stage a counter tracks. `Collect` counters are
/// initialized directly by a `*.ready.batch` announcement; `Embedding`
/// and `Keypoint` counters are initialized lazily from the sibling
/// `Collect` counter's terminal `processed` count, since no
/// `*.embeddings.ready.batch` announcement exists on the wire (spec §6
/// lists only `products.images.ready.batch` / `video.keyframes.ready.batch`
/// as batch announcements).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Collect,
    Embedding,
    Keypoint,
}

/// A fully-qualified asset counter key. Spec §6's `asset_counters` table
/// has a single `asset_type` text column; we encode `(Modality, Stage)`
/// into that column (see DESIGN.md for the rationale) rather than adding
/// columns, keeping the on-the-wire schema shape spec §6 describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKind {
    pub modality: Modality,
    pub stage: Stage,
}

impl CounterKind {
    pub const fn new(modality: Modality, stage: Stage) -> Self {
        Self { modality, stage }
    }

    /// The string stored in `asset_counters.asset_type`.
    pub fn as_key(self) -> &'static str {
        match (self.modality, self.stage) {
            (Modality::Image, Stage::Collect) => "image:collect",
            (Modality::Image, Stage::Embedding) => "image:embedding",
            (Modality::Image, Stage::Keypoint) => "image:keypoint",
            (Modality::Video, Stage::Collect) => "video:collect",
            (Modality::Video, Stage::Embedding) => "video:embedding",
            (Modality::Video, Stage::Keypoint) => "video:keypoint",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "image:collect" => Self::new(Modality::Image, Stage::Collect),
            "image:embedding" => Self::new(Modality::Image, Stage::Embedding),
            "image:keypoint" => Self::new(Modality::Image, Stage::Keypoint),
            "video:collect" => Self::new(Modality::Video, Stage::Collect),
            "video:embedding" => Self::new(Modality::Video, Stage::Embedding),
            "video:keypoint" => Self::new(Modality::Video, Stage::Keypoint),
            _ => return None,
        })
    }

    /// The `*.completed` topic this counter's single-emission CAS guards,
    /// if it's a stage that emits one (the `Collect` stage feeds
    /// `products.collections.completed`/`videos.collections.completed`,
    /// which are emitted by the collector itself, not by this counter —
    /// `pvm-phase` only owns completion emission for the feature-extraction
    /// stages).
    pub fn completion_topic(self) -> Option<&'static str> {
        match (self.modality, self.stage) {
            (Modality::Image, Stage::Embedding) => Some("image.embeddings.completed"),
            (Modality::Image, Stage::Keypoint) => Some("image.keypoints.completed"),
            (Modality::Video, Stage::Embedding) => Some("video.embeddings.completed"),
            (Modality::Video, Stage::Keypoint) => Some("video.keypoints.completed"),
            _ => None,
        }
    }
}

/// A job row (spec §3: `jobs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub industry: String,
    pub phase: Phase,
    pub asset_flags: AssetFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_id: JobId, industry: impl Into<String>, asset_flags: AssetFlags) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            industry: industry.into(),
            phase: Phase::Collection,
            asset_flags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A read-only view over which phase-completion event names have been
/// recorded in the ledger for a job — exactly what [`crate::transition::decide`]
/// needs and nothing more, so the pure decision function never touches a
/// database connection directly.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    seen: HashSet<String>,
}

impl LedgerSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_event_names(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            seen: names.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, event_name: impl Into<String>) {
        self.seen.insert(event_name.into());
    }

    pub fn contains(&self, event_name: &str) -> bool {
        self.seen.contains(event_name)
    }

    pub fn contains_all(&self, event_names: &[&str]) -> bool {
        event_names.iter().all(|name| self.seen.contains(*name))
    }
}
