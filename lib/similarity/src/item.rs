use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::rerank::Hit;

/// A ranked reference image, ready to be shown to a client.
///
/// `path` is the source ref as stored in the index: a path relative to the
/// reference root laid out as `category/slug/filename`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarItem {
    pub path: String,
    pub score: f32,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub filename: Option<String>,
}

impl SimilarItem {
    pub fn from_hit((path, score): Hit) -> Self {
        let p = Path::new(&path);
        let name_of = |p: Option<&Path>| {
            p.and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .filter(|n| !n.is_empty())
        };
        let parent = p.parent();
        let grandparent = parent.and_then(Path::parent);

        let filename = name_of(Some(p));
        let slug = name_of(parent);
        let category = name_of(grandparent);

        Self {
            path,
            score,
            slug,
            category,
            filename,
        }
    }
}

impl From<Hit> for SimilarItem {
    fn from(hit: Hit) -> Self {
        SimilarItem::from_hit(hit)
    }
}
