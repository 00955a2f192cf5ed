//! Relevance ranking of keyword candidates by embedding similarity.

use {
    dmrecall_common::{Error, Message, Result},
    tracing::{debug, info, warn},
};

use crate::embeddings::EmbeddingProvider;

/// A candidate with its similarity to the query. `score` is `None` in
/// all-matches mode, where ranking is skipped.
#[derive(Debug, Clone)]
pub struct RankedMessage {
    pub message: Message,
    pub score: Option<f32>,
}

/// Knobs for [`rank`].
#[derive(Debug, Clone, Copy)]
pub struct RankOptions {
    pub top_n: usize,
    pub embed_word_ceiling: usize,
    pub batch_size: usize,
}

/// All-matches mode: keep every candidate, in store order, unscored.
///
/// On common keywords this can hand thousands of messages to the curator and
/// blow through the context budget.
pub fn pass_through(candidates: Vec<Message>) -> Vec<RankedMessage> {
    candidates
        .into_iter()
        .map(|message| RankedMessage {
            message,
            score: None,
        })
        .collect()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// How many leading candidates fit under the word ceiling. A message is
/// either admitted whole or not at all.
pub fn admitted_prefix(candidates: &[Message], ceiling: usize) -> usize {
    let mut total = 0usize;
    for (i, message) in candidates.iter().enumerate() {
        let words = word_count(&message.contents);
        if total + words > ceiling {
            return i;
        }
        total += words;
    }
    candidates.len()
}

/// Scale `v` to unit length in place. Zero vectors are left alone.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

async fn embed_admitted(
    embedder: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let out = embedder
            .embed_batch(batch)
            .await
            .map_err(|e| Error::Embedding(format!("{e:#}")))?;
        if out.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "asked for {} vectors, got {}",
                batch.len(),
                out.len()
            )));
        }
        debug!(batch = batch.len(), "embedded candidate batch");
        vectors.extend(out);
    }
    Ok(vectors)
}

/// Score candidates against the query and keep the best `top_n`.
///
/// Candidates past the word ceiling are dropped unscored. Ties keep store
/// order.
pub async fn rank(
    embedder: &dyn EmbeddingProvider,
    query: &str,
    candidates: Vec<Message>,
    options: RankOptions,
) -> Result<Vec<RankedMessage>> {
    let admitted = admitted_prefix(&candidates, options.embed_word_ceiling);
    if admitted == 0 {
        return Err(Error::Embedding(
            "no candidate fits under the embedding word ceiling".into(),
        ));
    }
    if admitted < candidates.len() {
        warn!(
            admitted,
            dropped = candidates.len() - admitted,
            ceiling = options.embed_word_ceiling,
            "embedding word ceiling reached, truncating candidates"
        );
    }

    let mut query_vec = embedder
        .embed(query)
        .await
        .map_err(|e| Error::Embedding(format!("query: {e:#}")))?;
    normalize(&mut query_vec);

    let mut candidates = candidates;
    candidates.truncate(admitted);
    let texts: Vec<String> = candidates.iter().map(|m| m.contents.clone()).collect();
    let vectors = embed_admitted(embedder, &texts, options.batch_size).await?;

    let mut ranked = Vec::with_capacity(candidates.len());
    for (message, mut vector) in candidates.into_iter().zip(vectors) {
        if vector.len() != query_vec.len() {
            return Err(Error::Embedding(format!(
                "vector for message {} has {} dimensions, query has {}",
                message.message_id,
                vector.len(),
                query_vec.len()
            )));
        }
        normalize(&mut vector);
        ranked.push(RankedMessage {
            score: Some(dot(&query_vec, &vector)),
            message,
        });
    }

    // `sort_by` is stable, so equal scores keep store order.
    ranked.sort_by(|a, b| {
        let (a, b) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
        b.total_cmp(&a)
    });
    ranked.truncate(options.top_n);
    info!(
        ranked = ranked.len(),
        model = embedder.model_name(),
        "ranked candidates by similarity"
    );
    Ok(ranked)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::test_support::*,
        async_trait::async_trait,
        std::sync::atomic::Ordering,
    };

    fn options(top_n: usize) -> RankOptions {
        RankOptions {
            top_n,
            embed_word_ceiling: 900_000,
            batch_size: 512,
        }
    }

    #[test]
    fn normalize_gives_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn word_ceiling_never_splits_a_message() {
        let candidates = vec![
            msg(1, "a", "2024-01-01 10:00:00", "one two three"),
            msg(2, "a", "2024-01-01 10:01:00", "four five"),
            msg(3, "a", "2024-01-01 10:02:00", "six"),
        ];
        assert_eq!(admitted_prefix(&candidates, 100), 3);
        assert_eq!(admitted_prefix(&candidates, 5), 2);
        assert_eq!(admitted_prefix(&candidates, 4), 1);
        assert_eq!(admitted_prefix(&candidates, 2), 0);
    }

    #[test]
    fn pass_through_keeps_order_unscored() {
        let ranked = pass_through(vec![
            msg(2, "a", "2024-01-01 10:00:00", "x"),
            msg(1, "a", "2024-01-01 10:01:00", "y"),
        ]);
        assert_eq!(
            ranked.iter().map(|r| r.message.message_id).collect::<Vec<_>>(),
            vec![2, 1]
        );
        assert!(ranked.iter().all(|r| r.score.is_none()));
    }

    #[tokio::test]
    async fn best_matches_first_ties_in_store_order() {
        let embedder = MockEmbedder::new();
        let candidates = vec![
            msg(1, "a", "2024-01-01 10:00:00", "music night"),
            msg(2, "a", "2024-01-01 10:01:00", "pizza and a movie"),
            msg(3, "a", "2024-01-01 10:02:00", "pizza please"),
            msg(4, "a", "2024-01-01 10:03:00", "more pizza"),
        ];
        let ranked = rank(&embedder, "pizza", candidates, options(3))
            .await
            .unwrap();
        let order: Vec<i64> = ranked.iter().map(|r| r.message.message_id).collect();
        assert_eq!(order, vec![3, 4, 2]);
        assert!((ranked[0].score.unwrap() - 1.0).abs() < 1e-6);
        assert!(ranked[2].score.unwrap() < ranked[1].score.unwrap());
    }

    #[tokio::test]
    async fn candidates_are_embedded_in_batches() {
        let embedder = MockEmbedder::new();
        let candidates: Vec<Message> = (1..=5)
            .map(|i| msg(i, "a", "2024-01-01 10:00:00", "pizza"))
            .collect();
        let opts = RankOptions {
            batch_size: 2,
            ..options(200)
        };
        let ranked = rank(&embedder, "pizza", candidates, opts).await.unwrap();
        assert_eq!(ranked.len(), 5);
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 3);
        assert_eq!(embedder.texts_embedded.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn capability_failure_is_an_embedding_error() {
        let err = rank(
            &FailingEmbedder,
            "pizza",
            vec![msg(1, "a", "2024-01-01 10:00:00", "pizza")],
            options(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn nothing_admitted_is_an_embedding_error() {
        let opts = RankOptions {
            embed_word_ceiling: 1,
            ..options(200)
        };
        let err = rank(
            &MockEmbedder::new(),
            "pizza",
            vec![msg(1, "a", "2024-01-01 10:00:00", "two words")],
            opts,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    struct ShortBatchEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortBatchEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(keyword_embedding(text))
        }

        async fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0; 8]])
        }

        fn model_name(&self) -> &str {
            "short"
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    #[tokio::test]
    async fn vector_count_mismatch_is_an_embedding_error() {
        let candidates = vec![
            msg(1, "a", "2024-01-01 10:00:00", "pizza"),
            msg(2, "a", "2024-01-01 10:01:00", "pizza"),
        ];
        let err = rank(&ShortBatchEmbedder, "pizza", candidates, options(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }
}
