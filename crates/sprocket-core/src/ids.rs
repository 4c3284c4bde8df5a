use std::sync::atomic::{AtomicUsize, Ordering};

macro_rules! unique_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl $name {
            pub(crate) fn new() -> Self {
                static COUNTER: AtomicUsize = AtomicUsize::new(1);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(self, f)
            }
        }
    };
}

unique_id!(
    /// Identifies one view. `reshape` and `clone` mint a new one even though
    /// the storage is shared.
    TensorId,
    "T"
);

unique_id!(
    /// Identifies one buffer. Every handle to the same buffer reports the
    /// same id, so logs can tie views back to what they alias.
    StorageId,
    "S"
);
