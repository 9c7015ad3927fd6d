//! Relay service implementations.
//!
//! Each service holds the shared [`AppState`](crate::AppState) and exposes
//! one async method per device/operator operation.

pub mod debtor_service;
pub mod shop_service;
pub mod sync_service;

pub use debtor_service::DebtorService;
pub use shop_service::ShopService;
pub use sync_service::SyncService;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use shoplink_core::Document;
    use shoplink_db::MemoryStore;

    use crate::{AppState, RelayConfig};

    /// 2024-03-10T12:00:00Z
    pub const NOW: i64 = 1_710_072_000_000;

    pub fn state_with(doc: Document) -> Arc<AppState> {
        Arc::new(
            AppState::new(Arc::new(MemoryStore::with_document(doc)), RelayConfig::default())
                .with_fixed_clock(NOW),
        )
    }

    pub fn state() -> Arc<AppState> {
        state_with(Document::default())
    }
}
