//! Vector collections and multi-query retrieval

mod collection;
mod multi_query;

pub use collection::{cosine_similarity, CollectionRecord, SearchHit, VectorCollection, COLLECTION_FILE};
pub use multi_query::{parse_query_variants, MultiQueryRetriever};
