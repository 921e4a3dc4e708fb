//! In-memory [`BlockAccess`] used by the meshing tests.

use std::collections::HashMap;
use std::sync::Arc;

use strata_voxel::{BlockAccess, Chunk, ChunkCoord};

#[derive(Default)]
pub(crate) struct TestWorld {
    chunks: HashMap<ChunkCoord, Arc<Chunk>>,
}

impl TestWorld {
    pub(crate) fn insert(&mut self, chunk: Chunk) -> Arc<Chunk> {
        let chunk = Arc::new(chunk);
        self.chunks.insert(chunk.coord(), Arc::clone(&chunk));
        chunk
    }
}

impl BlockAccess for TestWorld {
    fn loaded_chunk(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.chunks.get(&coord).cloned()
    }

    fn loaded_chunk_ys(&self, cx: i64, cz: i64) -> Vec<i64> {
        self.chunks
            .keys()
            .filter(|c| c.x == cx && c.z == cz)
            .map(|c| c.y)
            .collect()
    }
}
