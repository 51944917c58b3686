use types::primitives::{BlockNumber, H256};

/// Position of the last fully processed cycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StateMeta {
    pub block_number: BlockNumber,
    pub block_hash: H256,
}

/// Decides whether a new block snapshot is worth a cycle at all.
///
/// Updated only after a cycle completes, so a failed cycle retries the same
/// block on the next tick.
#[derive(Default)]
pub struct BlockGuard {
    last_processed: Option<StateMeta>,
}

impl BlockGuard {
    #[must_use]
    pub fn is_need_to_process_new_state(&self, meta: StateMeta) -> bool {
        let Some(last) = self.last_processed else {
            return true;
        };

        meta.block_number > last.block_number && meta.block_hash != last.block_hash
    }

    pub fn update(&mut self, meta: StateMeta) {
        self.last_processed = Some(meta);
    }
}
