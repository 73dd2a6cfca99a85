//! C8's read side: product/video membership, feature rows, and pgvector
//! cosine ANN retrieval — grounded on the original matcher's
//! `_vector_similarity_search` (`ORDER BY emb_rgb <=> $1 LIMIT $2`).

use async_trait::async_trait;
use pgvector::Vector;
use pvm_matching::{FeatureStoreReadModel, ProductImage, VideoFrame};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgFeatureStore {
    pool: PgPool,
}

impl PgFeatureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_image(row: &sqlx::postgres::PgRow) -> ProductImage {
    ProductImage {
        img_id: row.get("img_id"),
        emb_rgb: row.get::<Option<Vector>, _>("emb_rgb").map(|v| v.to_vec()),
        emb_gray: row.get::<Option<Vector>, _>("emb_gray").map(|v| v.to_vec()),
        kp_blob_path: row.get("kp_blob_path"),
    }
}

fn row_to_frame(row: &sqlx::postgres::PgRow) -> VideoFrame {
    VideoFrame {
        frame_id: row.get("frame_id"),
        ts: row.get("ts"),
        emb_rgb: row.get::<Option<Vector>, _>("emb_rgb").map(|v| v.to_vec()),
        emb_gray: row.get::<Option<Vector>, _>("emb_gray").map(|v| v.to_vec()),
        kp_blob_path: row.get("kp_blob_path"),
    }
}

#[async_trait]
impl FeatureStoreReadModel for PgFeatureStore {
    async fn products_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT product_id FROM product_images WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("product_id")).collect())
    }

    async fn videos_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT video_id FROM video_frames WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("video_id")).collect())
    }

    async fn product_images(&self, product_id: &str) -> anyhow::Result<Vec<ProductImage>> {
        let rows = sqlx::query(
            "SELECT img_id, emb_rgb, emb_gray, kp_blob_path FROM product_images \
             WHERE product_id = $1 AND emb_rgb IS NOT NULL",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_image).collect())
    }

    async fn video_frames(&self, video_id: &str) -> anyhow::Result<Vec<VideoFrame>> {
        let rows = sqlx::query(
            "SELECT frame_id, ts, emb_rgb, emb_gray, kp_blob_path FROM video_frames \
             WHERE video_id = $1 AND emb_rgb IS NOT NULL ORDER BY ts",
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_frame).collect())
    }

    async fn retrieve_similar_frames(
        &self,
        image: &ProductImage,
        frames: &[VideoFrame],
        top_k: u32,
    ) -> anyhow::Result<Vec<VideoFrame>> {
        let Some(emb) = &image.emb_rgb else {
            return Ok(frames.iter().take(top_k as usize).cloned().collect());
        };
        if frames.is_empty() {
            return Ok(Vec::new());
        }

        let video_id = sqlx::query("SELECT video_id FROM video_frames WHERE frame_id = $1")
            .bind(&frames[0].frame_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(video_id) = video_id else {
            return Ok(frames.iter().take(top_k as usize).cloned().collect());
        };
        let video_id: String = video_id.get("video_id");

        let vector = Vector::from(emb.clone());
        let rows = sqlx::query(
            r#"
            SELECT frame_id
            FROM video_frames
            WHERE video_id = $1 AND emb_rgb IS NOT NULL
            ORDER BY emb_rgb <=> $2
            LIMIT $3
            "#,
        )
        .bind(&video_id)
        .bind(vector)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        let order: Vec<String> = rows.into_iter().map(|r| r.get("frame_id")).collect();
        let by_id = frames
            .iter()
            .map(|f| (f.frame_id.as_str(), f))
            .collect::<std::collections::HashMap<_, _>>();
        Ok(order.into_iter().filter_map(|id| by_id.get(id.as_str()).map(|f| (*f).clone())).collect())
    }

    async fn get_keypoint_blob(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }
}
