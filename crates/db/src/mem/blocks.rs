use std::collections::BTreeMap;

use parking_lot::Mutex;
use vela_primitives::{BlockHeight, BlockStatus};
use vela_state::{Block, CompressedBlock};

use crate::{traits::BlockDatabase, DbError, DbResult};

#[derive(Default)]
struct Inner {
    blocks: BTreeMap<BlockHeight, Block>,
    compressed: BTreeMap<BlockHeight, CompressedBlock>,
}

#[derive(Default)]
pub struct MemBlockDb {
    inner: Mutex<Inner>,
}

impl MemBlockDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockDatabase for MemBlockDb {
    fn get_current_block_height(&self) -> DbResult<BlockHeight> {
        let inner = self.inner.lock();
        Ok(inner.blocks.keys().next_back().copied().unwrap_or(0))
    }

    fn get_block_by_height(&self, height: BlockHeight) -> DbResult<Option<Block>> {
        let inner = self.inner.lock();
        Ok(inner.blocks.get(&height).cloned())
    }

    fn create_block(&self, block: &Block) -> DbResult<()> {
        let mut inner = self.inner.lock();
        inner.blocks.insert(block.block_height, block.clone());
        Ok(())
    }

    fn pre_save_block_data(&self, block: &Block) -> DbResult<()> {
        let mut inner = self.inner.lock();
        let mut row = block.clone();
        row.block_status = BlockStatus::ProposedNotReady;
        inner.blocks.insert(row.block_height, row);
        Ok(())
    }

    fn update_block_to_pending(
        &self,
        block_id: u64,
        compressed: Option<&CompressedBlock>,
    ) -> DbResult<()> {
        // Single lock scope stands in for the relational transaction: both
        // writes land or neither does.
        let mut inner = self.inner.lock();
        let height = inner
            .blocks
            .values()
            .find(|b| b.id == block_id)
            .map(|b| b.block_height)
            .ok_or(DbError::UnknownBlockId(block_id))?;
        if let Some(cb) = compressed {
            inner.compressed.insert(cb.block_height, cb.clone());
        }
        inner
            .blocks
            .get_mut(&height)
            .expect("blocks: row vanished under lock")
            .block_status = BlockStatus::Pending;
        Ok(())
    }

    fn get_compressed_block(&self, height: BlockHeight) -> DbResult<Option<CompressedBlock>> {
        let inner = self.inner.lock();
        Ok(inner.compressed.get(&height).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_promotes_block_and_stores_compressed() {
        let db = MemBlockDb::new();
        let mut block = Block::proposing(9, 4, 0);
        block.block_size = 2;
        db.create_block(&block).unwrap();

        let cb = CompressedBlock {
            block_height: 4,
            block_size: 2,
            state_root: Default::default(),
            tx_count: 1,
            public_data: vec![1, 2, 3],
        };
        db.update_block_to_pending(9, Some(&cb)).unwrap();

        let row = db.get_block_by_height(4).unwrap().unwrap();
        assert_eq!(row.block_status, BlockStatus::Pending);
        assert!(db.get_compressed_block(4).unwrap().is_some());
    }

    #[test]
    fn finalize_unknown_id_errors() {
        let db = MemBlockDb::new();
        assert!(db.update_block_to_pending(1, None).is_err());
    }
}
