//! §6.3 Log data (produced) — structured records for every create/drop/
//! mount/unmount/alter, carrying a stable field order and a type tag per
//! field so a separate persistence component can serialize them without the
//! core knowing its wire format. Grounded on the original's log-record
//! structs (`examples/original_source/.../LogData.h`-style "object id,
//! parent id, name, per-kind fields" layout), generalized here into one enum
//! per operation kind instead of a class hierarchy.

use crate::types::PageId;

/// One durable log record. Every variant carries the object id / parent id /
/// name triple calls out, plus whatever per-kind fields that
/// operation needs. Field order within each variant is fixed and is part of
/// the durable format — do not reorder without a version bump.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// A new file was created: its root page id is always `Undefined` at
    /// this point, recorded anyway so the log format never needs a
    /// different shape for "just created" vs. "already grown".
    Create {
        object_id: u64,
        parent_id: u64,
        name: String,
        hint: String,
        version: u32,
    },
    Drop {
        object_id: u64,
        parent_id: u64,
        name: String,
    },
    Mount {
        object_id: u64,
        parent_id: u64,
        name: String,
        root_id: PageId,
    },
    Unmount {
        object_id: u64,
        parent_id: u64,
        name: String,
    },
    /// A schema-level change to an already-mounted file: a hint string
    /// update, e.g. toggling normalization or adjusting the split ratio
    /// ( supplemented `getSplitRatio`).
    Alter {
        object_id: u64,
        parent_id: u64,
        name: String,
        new_hint: String,
    },
}

impl LogRecord {
    pub fn object_id(&self) -> u64 {
        match self {
            LogRecord::Create { object_id,.. }
            | LogRecord::Drop { object_id,.. }
            | LogRecord::Mount { object_id,.. }
            | LogRecord::Unmount { object_id,.. }
            | LogRecord::Alter { object_id,.. } => *object_id,
        }
    }

    pub fn parent_id(&self) -> u64 {
        match self {
            LogRecord::Create { parent_id,.. }
            | LogRecord::Drop { parent_id,.. }
            | LogRecord::Mount { parent_id,.. }
            | LogRecord::Unmount { parent_id,.. }
            | LogRecord::Alter { parent_id,.. } => *parent_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LogRecord::Create { name,.. }
            | LogRecord::Drop { name,.. }
            | LogRecord::Mount { name,.. }
            | LogRecord::Unmount { name,.. }
            | LogRecord::Alter { name,.. } => name,
        }
    }
}

/// Implemented by whatever component actually persists `LogRecord`s
/// ("The core emits these records; a separate component
/// persists them"). `BtreeFile` never holds one itself — the host passes a
/// `&dyn LogSink` into the lifecycle operations that produce records.
pub trait LogSink {
    fn record(&self, entry: LogRecord);
}

/// A `LogSink` that drops everything, for hosts or tests that don't care
/// about the log stream.
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn record(&self, _entry: LogRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct VecSink(Mutex<Vec<LogRecord>>);

    impl LogSink for VecSink {
        fn record(&self, entry: LogRecord) {
            self.0.lock().unwrap().push(entry);
        }
    }

    #[test]
    fn accessors_read_the_common_fields_across_variants() {
        let create = LogRecord::Create {
            object_id: 1,
            parent_id: 0,
            name: "idx_customer_email".into(),
            hint: "normalized".into(),
            version: 1,
        };
        assert_eq!(create.object_id(), 1);
        assert_eq!(create.name(), "idx_customer_email");

        let drop = LogRecord::Drop {
            object_id: 2,
            parent_id: 1,
            name: "idx_customer_email".into(),
        };
        assert_eq!(drop.parent_id(), 1);
    }

    #[test]
    fn null_sink_discards_records() {
        let sink = NullLogSink;
        sink.record(LogRecord::Unmount {
            object_id: 3,
            parent_id: 1,
            name: "idx_customer_email".into(),
        });
    }

    #[test]
    fn a_real_sink_accumulates_records_in_order() {
        let sink = VecSink(Mutex::new(Vec::new()));
        sink.record(LogRecord::Create {
            object_id: 1,
            parent_id: 0,
            name: "a".into(),
            hint: "".into(),
            version: 1,
        });
        sink.record(LogRecord::Mount {
            object_id: 1,
            parent_id: 0,
            name: "a".into(),
            root_id: 5,
        });
        let recorded = sink.0.into_inner().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].name(), "a");
    }
}
