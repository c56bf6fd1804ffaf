//! `secidx-btree` — the paged B+ tree core backing a relational database's
//! secondary indices. This crate covers C1-C9: the page cache,
//! the slotted Node/Leaf page, typed key comparison, the `BtreeFile` façade
//! (insert/expunge/update/search/verify), and the compressed-bitmap overlay.
//! Out of scope ("EXPLICITLY OUT OF SCOPE"): the SQL planner,
//! the MVCC buffer pool, the redo/undo log writer, and the sibling text/LOB/
//! KdTree drivers — this crate only declares the interfaces it consumes from
//! them (`physical`, `catalog`, `log_record`).

#[cfg(feature = "bitmap")]
pub mod bitmap;
pub mod btree;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod file_id;
pub mod log_record;
pub mod page;
pub mod page_cache;
pub mod paged_file;
pub mod physical;
pub mod types;

pub use btree::BtreeFile;
pub use codec::compare::Compare;
pub use codec::value::{LeafType, Value};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use file_id::FileId;
pub use physical::{FilePhysicalFile, FixMode, OpenMode, PhysicalFile};
pub use types::{ObjectId, PageId};

/// Configures `env_logger` once per process so `RUST_LOG=debug cargo test --
/// --nocapture` shows the structural-mutation trail (split, merge,
/// redistribute, root promotion/demotion).
#[cfg(test)]
pub mod test_utils {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init_log() {
        INIT.call_once(|| {
            use std::io::Write;
            let mut builder = env_logger::Builder::from_default_env();
            builder
                .format_timestamp_secs()
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "[{} - {}] [{}:{}] {}",
                        record.level(),
                        record.target(),
                        record.file().unwrap_or("?"),
                        record.line().unwrap_or(0),
                        record.args()
                    )
                })
                .is_test(true)
                .try_init()
                .ok();
        });
    }
}
