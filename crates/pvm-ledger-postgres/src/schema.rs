//! The schema every store in this crate assumes already exists. Applied
//! out of band by whatever migration runner `pvm-service` is configured
//! with; kept here as the single source of truth for table shapes.
pub const MIGRATIONS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    job_id UUID PRIMARY KEY,
    industry TEXT NOT NULL,
    phase TEXT NOT NULL DEFAULT 'collection',
    has_images BOOLEAN NOT NULL DEFAULT FALSE,
    has_videos BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS event_ledger (
    event_id UUID PRIMARY KEY,
    job_id UUID NOT NULL REFERENCES jobs (job_id),
    event_name TEXT NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_event_ledger_job ON event_ledger (job_id);

-- asset_type encodes (Modality, Stage) as e.g. 'image:embedding' (see
-- pvm_phase::domain::CounterKind).
CREATE TABLE IF NOT EXISTS asset_counters (
    job_id UUID NOT NULL REFERENCES jobs (job_id),
    asset_type TEXT NOT NULL,
    expected BIGINT NOT NULL,
    processed BIGINT NOT NULL DEFAULT 0,
    failed BIGINT NOT NULL DEFAULT 0,
    watermark_deadline TIMESTAMPTZ,
    completed_emitted BOOLEAN NOT NULL DEFAULT FALSE,
    PRIMARY KEY (job_id, asset_type)
);

CREATE TABLE IF NOT EXISTS product_images (
    img_id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL,
    job_id UUID NOT NULL REFERENCES jobs (job_id),
    local_path TEXT NOT NULL,
    emb_rgb VECTOR(512),
    emb_gray VECTOR(512),
    kp_blob_path TEXT
);
CREATE INDEX IF NOT EXISTS idx_product_images_product ON product_images (product_id);
CREATE INDEX IF NOT EXISTS idx_product_images_job ON product_images (job_id);

CREATE TABLE IF NOT EXISTS video_frames (
    frame_id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL,
    job_id UUID NOT NULL REFERENCES jobs (job_id),
    ts DOUBLE PRECISION NOT NULL,
    local_path TEXT NOT NULL,
    emb_rgb VECTOR(512),
    emb_gray VECTOR(512),
    kp_blob_path TEXT
);
CREATE INDEX IF NOT EXISTS idx_video_frames_video ON video_frames (video_id, ts);
CREATE INDEX IF NOT EXISTS idx_video_frames_job ON video_frames (job_id);

-- Populated by the (out-of-scope) keypoint/edge feature worker. Absence
-- of a row for a given pair means that worker hasn't scored it yet;
-- callers treat that as zero contribution rather than an error.
CREATE TABLE IF NOT EXISTS pair_features (
    img_id TEXT NOT NULL,
    frame_id TEXT NOT NULL,
    inlier_ratio DOUBLE PRECISION NOT NULL,
    edge_similarity DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (img_id, frame_id)
);

CREATE TABLE IF NOT EXISTS matches (
    job_id UUID NOT NULL REFERENCES jobs (job_id),
    product_id TEXT NOT NULL,
    video_id TEXT NOT NULL,
    best_img_id TEXT NOT NULL,
    best_frame_id TEXT NOT NULL,
    best_ts DOUBLE PRECISION NOT NULL,
    score DOUBLE PRECISION NOT NULL,
    best_pair_score DOUBLE PRECISION NOT NULL,
    consistency INTEGER NOT NULL,
    total_pairs INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'accepted',
    evidence_path TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (job_id, product_id, video_id)
);

DO $$ BEGIN
    CREATE TYPE background_job_status AS ENUM ('pending', 'running', 'succeeded', 'failed', 'dead_letter');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

CREATE TABLE IF NOT EXISTS background_jobs (
    id UUID PRIMARY KEY,
    job_type TEXT NOT NULL,
    payload JSONB NOT NULL,
    status background_job_status NOT NULL DEFAULT 'pending',
    attempt INTEGER NOT NULL DEFAULT 1,
    max_retries INTEGER NOT NULL DEFAULT 3,
    run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    worker_id TEXT,
    lease_expires_at TIMESTAMPTZ,
    error_message TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_background_jobs_ready ON background_jobs (run_at)
    WHERE status = 'pending';
"#;
