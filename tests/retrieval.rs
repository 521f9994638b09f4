use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

use cbir::IMDBBuilder;
use cbir::config::ExtractOptions;
use cbir::descriptor::{DescriptorBundle, Modality};
use cbir::error::{CbirError, Result};
use cbir::imdb::{FeedbackRequest, IMDB, IngestRequest, SearchRequest};
use cbir::ranker::ScoreMode;
use cbir::store::*;
use image::{ImageFormat, Rgb, RgbImage};
use rstest::*;

fn png(image: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(vec![]);
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn uniform(color: [u8; 3]) -> Vec<u8> {
    png(&RgbImage::from_pixel(64, 64, Rgb(color)))
}

fn gradient(w: u32, h: u32) -> Vec<u8> {
    png(&RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, ((x ^ y) % 256) as u8])
    }))
}

fn request(filename: &str) -> IngestRequest {
    IngestRequest { filename: filename.to_string(), ..Default::default() }
}

fn record_with_gabor(id: &str, gabor: [f32; 4]) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        filename: format!("{id}.png"),
        path: None,
        category: None,
        size: 0,
        created_at: chrono::Utc::now(),
        descriptors: Some(DescriptorBundle { gabor_features: Some(gabor.to_vec()), ..Default::default() }),
    }
}

fn builder() -> IMDBBuilder {
    IMDBBuilder::new("unused".parse().unwrap()).extract(ExtractOptions { seed: Some(42) })
}

/// 统计存储访问次数
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl DescriptorStore for CountingStore {
    async fn get(&self, id: &str) -> Result<Option<ImageRecord>> {
        self.touch();
        self.inner.get(id).await
    }

    async fn put(&self, record: ImageRecord) -> Result<()> {
        self.touch();
        self.inner.put(record).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.touch();
        self.inner.delete(id).await
    }

    async fn scan(&self) -> Result<Vec<ImageRecord>> {
        self.touch();
        self.inner.scan().await
    }
}

impl FeedbackLedger for CountingStore {
    async fn append(&self, feedback: NewFeedback) -> Result<FeedbackRecord> {
        self.touch();
        self.inner.append(feedback).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>> {
        self.touch();
        self.inner.recent(limit).await
    }

    async fn tally(&self) -> Result<HashMap<String, FeedbackTally>> {
        self.touch();
        self.inner.tally().await
    }
}

async fn sqlite_engine() -> (tempfile::TempDir, IMDB<SqliteStore>) {
    let dir = tempfile::TempDir::new().unwrap();
    let db = IMDBBuilder::new(dir.path().to_str().unwrap().parse().unwrap())
        .extract(ExtractOptions { seed: Some(42) })
        .open()
        .await
        .unwrap();
    (dir, db)
}

#[tokio::test]
async fn uniform_red_image_ranks_first() -> anyhow::Result<()> {
    let (_dir, db) = sqlite_engine().await;

    let red = db.ingest(uniform([255, 0, 0]), request("red.png")).await?;
    db.ingest(uniform([0, 0, 255]), request("blue.png")).await?;
    db.ingest(gradient(80, 140), request("gradient.png")).await?;

    let query = red.descriptors.clone().unwrap();
    // 64x64 小于 HOG 检测窗口，HOG 为空，不参与比较
    assert_eq!(query.hog_features.as_deref(), Some(&[][..]));
    let included = query.iter().filter(|(_, v)| !v.is_empty()).count();
    assert_eq!(included, 6);

    let hits = db.search(SearchRequest::new(query)).await?;
    assert_eq!(hits[0].image_id, red.id);
    assert_eq!(hits[0].filename, "red.png");
    assert!((hits[0].similarity_score - included as f32).abs() < 1e-5);
    assert!(hits[1].similarity_score < hits[0].similarity_score);
    Ok(())
}

#[rstest]
#[case(ScoreMode::Cosine)]
#[case(ScoreMode::Distance)]
#[tokio::test]
async fn search_returns_every_record_once(#[case] mode: ScoreMode) -> anyhow::Result<()> {
    let db = builder().build(MemoryStore::new());
    let mut ids = vec![];
    for (i, color) in [[255, 0, 0], [0, 255, 0], [0, 0, 255], [10, 20, 30], [200, 200, 200]]
        .into_iter()
        .enumerate()
    {
        ids.push(db.ingest(uniform(color), request(&format!("{i}.png"))).await?.id);
    }

    let query = DescriptorBundle { gabor_features: Some(vec![1.0, 2.0, 3.0, 4.0]), ..Default::default() };
    let req = SearchRequest { max_results: Some(100), mode, ..SearchRequest::new(query) };
    let mut found = db.search(req).await?.into_iter().map(|h| h.image_id).collect::<Vec<_>>();
    found.sort();
    ids.sort();
    assert_eq!(found, ids);
    Ok(())
}

#[tokio::test]
async fn extraction_is_deterministic_except_dominant_colors() -> anyhow::Result<()> {
    let bytes = gradient(140, 150);
    let a = builder().extract(ExtractOptions { seed: Some(1) }).build(MemoryStore::new());
    let b = builder().extract(ExtractOptions { seed: Some(2) }).build(MemoryStore::new());

    let da = a.ingest(bytes.clone(), request("g.png")).await?.descriptors.unwrap();
    let db_ = b.ingest(bytes, request("g.png")).await?.descriptors.unwrap();
    for m in Modality::ALL {
        if m != Modality::DominantColors {
            assert_eq!(da.get(m), db_.get(m), "{}", m.name());
        }
    }
    assert_eq!(da.hog_features.as_ref().map(Vec::len), Some(1000));
    Ok(())
}

#[rstest]
#[case::missing(SearchRequest::default())]
#[case::empty(SearchRequest::new(DescriptorBundle::default()))]
#[case::zero_results(SearchRequest {
    max_results: Some(0),
    ..SearchRequest::new(DescriptorBundle { hu_moments: Some(vec![0.0; 7]), ..Default::default() })
})]
#[case::bad_length(SearchRequest::new(DescriptorBundle { color_histogram: Some(vec![1.0; 3]), ..Default::default() }))]
#[tokio::test]
async fn invalid_search_never_touches_store(#[case] req: SearchRequest) {
    let db = builder().build(CountingStore::default());

    let err = db.search(req.clone()).await.unwrap_err();
    assert!(matches!(err, CbirError::Validation(_)));
    let err = db.search_with_feedback(req).await.unwrap_err();
    assert!(matches!(err, CbirError::Validation(_)));

    assert_eq!(db.store().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_ledger_reduces_to_weighted_similarity() -> anyhow::Result<()> {
    let db = builder().build(MemoryStore::new());
    db.ingest(gradient(70, 130), request("a.png")).await?;
    db.ingest(uniform([30, 60, 90]), request("b.png")).await?;

    let query = DescriptorBundle { color_histogram: Some(vec![1.0 / 512.0; 512]), ..Default::default() };
    let hits = db.search_with_feedback(SearchRequest::new(query.clone())).await?;
    assert_eq!(hits.len(), 2);

    // 没有反馈时得分为 0.6 倍原始点积
    let q = query.color_histogram.as_deref().unwrap();
    for hit in &hits {
        let record = db.get(&hit.image_id).await?;
        let v = record.descriptors.unwrap().color_histogram.unwrap();
        let expected = 0.6 * v.iter().zip(q).map(|(a, b)| a * b).sum::<f32>();
        assert!((hit.similarity_score - expected).abs() < 1e-6, "{} != {}", hit.similarity_score, expected);
    }
    Ok(())
}

#[tokio::test]
async fn feedback_rerank_keeps_raw_gabor_magnitude() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.put(record_with_gabor("big", [3.0, 0.0, 0.0, 0.0])).await?;
    let db = builder().build(store);

    let query = DescriptorBundle { gabor_features: Some(vec![2.0, 0.0, 0.0, 0.0]), ..Default::default() };
    let hits = db.search_with_feedback(SearchRequest::new(query)).await?;
    assert!((hits[0].similarity_score - 3.6).abs() < 1e-5);
    Ok(())
}

#[tokio::test]
async fn feedback_boost_saturates() -> anyhow::Result<()> {
    let db = builder().build(MemoryStore::new());
    let a = db.ingest(uniform([255, 0, 0]), request("a.png")).await?;
    let b = db.ingest(uniform([255, 0, 0]), IngestRequest { id: Some("twin".into()), ..request("b.png") }).await?;

    let empty = DescriptorBundle::default();
    for _ in 0..8 {
        db.submit_feedback(FeedbackRequest {
            image_id: Some(b.id.clone()),
            feedback: Some(FeedbackLabel::Relevant),
            query_descriptors: Some(empty.clone()),
        })
        .await?;
    }

    let query = DescriptorBundle {
        color_histogram: a.descriptors.as_ref().unwrap().color_histogram.clone(),
        ..Default::default()
    };
    let hits = db.search_with_feedback(SearchRequest::new(query)).await?;
    assert_eq!(hits[0].image_id, "twin");
    assert!((hits[0].similarity_score / hits[1].similarity_score - 1.5).abs() < 1e-5);
    Ok(())
}

/// 两条记录：north 与查询正交，east 与查询同向；
/// 最近 50 条反馈不携带 Gabor 特征，第 51 新的反馈指向 north
async fn ledger_with_stale_feedback() -> anyhow::Result<MemoryStore> {
    let store = MemoryStore::new();
    store.put(record_with_gabor("north", [1.0, 0.0, 0.0, 0.0])).await?;
    store.put(record_with_gabor("east", [0.0, 1.0, 0.0, 0.0])).await?;

    let now = chrono::Utc::now();
    store
        .append(NewFeedback {
            image_id: "outside".into(),
            label: FeedbackLabel::Relevant,
            query_descriptors: DescriptorBundle {
                gabor_features: Some(vec![1.0, 0.0, 0.0, 0.0]),
                ..Default::default()
            },
            timestamp: now - chrono::Duration::seconds(1000),
        })
        .await?;
    for i in 0..50 {
        store
            .append(NewFeedback {
                image_id: "outside".into(),
                label: FeedbackLabel::Relevant,
                query_descriptors: DescriptorBundle::default(),
                timestamp: now - chrono::Duration::seconds(50 - i),
            })
            .await?;
    }
    Ok(store)
}

#[tokio::test]
async fn history_cap_drops_feedback_that_would_flip_ranking() -> anyhow::Result<()> {
    let query = DescriptorBundle { gabor_features: Some(vec![0.0, 1.0, 0.0, 0.0]), ..Default::default() };

    // 默认只看最近 50 条，相关均值为零向量，排序只由相似度决定
    let db = builder().build(ledger_with_stale_feedback().await?);
    let hits = db.search_with_feedback(SearchRequest::new(query.clone())).await?;
    assert_eq!(hits[0].image_id, "east");
    assert!((hits[0].similarity_score - 0.6).abs() < 1e-6);
    assert!(hits[1].similarity_score.abs() < 1e-6);

    // 第 51 条进入统计后 north 得到 1.4 的反馈得分，排序翻转
    let db = builder().feedback_history(51).build(ledger_with_stale_feedback().await?);
    let hits = db.search_with_feedback(SearchRequest::new(query)).await?;
    assert_eq!(hits[0].image_id, "north");
    assert!((hits[0].similarity_score - 1.4).abs() < 1e-5);
    Ok(())
}
