//! Ranking of raw index hits
//!
//! An augmented index holds several rows per source image, so a raw hit list
//! can name the same source more than once. The ranker collapses those
//! duplicates before the result is cut to size.

use ahash::AHashMap;

/// A `(source_ref, score)` pair as returned by `CategoryIndex::search`.
pub type Hit = (String, f32);

/// Dedupe-and-sort over raw hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityRanker;

impl SimilarityRanker {
    pub fn new() -> Self {
        Self
    }

    /// Keep the best score per source ref, sort descending, truncate to
    /// `top_k`.
    ///
    /// Ties keep the order in which each source ref first appeared in `hits`.
    /// Hits with a NaN score are dropped.
    /// Ranking an already ranked list returns it unchanged.
    pub fn rank<I>(&self, hits: I, top_k: usize) -> Vec<Hit>
    where
        I: IntoIterator<Item = Hit>,
    {
        rank(hits, top_k)
    }
}

/// Free-function form of [`SimilarityRanker::rank`].
pub fn rank<I>(hits: I, top_k: usize) -> Vec<Hit>
where
    I: IntoIterator<Item = Hit>,
{
    let mut positions: AHashMap<String, usize> = AHashMap::new();
    let mut best: Vec<Hit> = Vec::new();

    for (source_ref, score) in hits {
        if score.is_nan() {
            continue;
        }
        match positions.get(&source_ref) {
            Some(&pos) => {
                if score > best[pos].1 {
                    best[pos].1 = score;
                }
            }
            None => {
                positions.insert(source_ref.clone(), best.len());
                best.push((source_ref, score));
            }
        }
    }

    // sort_by is stable, so equal scores stay in first-seen order
    best.sort_by(|a, b| b.1.total_cmp(&a.1));
    best.truncate(top_k);
    best
}
