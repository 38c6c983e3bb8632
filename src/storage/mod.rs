// Data structures backing the engine: the open-list heap and the result cache

mod path_cache;
mod ref_heap;

pub use path_cache::{CacheLookup, CacheStats, PathCache, Reservation};
pub use ref_heap::{HeapItem, RefMaxHeap};
