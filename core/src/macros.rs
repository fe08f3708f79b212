/// Implements a basic `Debug` trait for types using their type name.
///
/// Handler and callback wrappers hold closures that cannot be printed, so
/// their `Debug` output is just the type name.
#[macro_export]
macro_rules! impl_debug {
    ($ty:ty) => {
        impl core::fmt::Debug for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(core::any::type_name::<Self>())
            }
        }
    };
}

/// Generates a `u64` backed identifier newtype with a process-wide counter.
///
/// ```ignore
/// counter_id!(
///     /// Identity of a registered thing.
///     ThingId
/// );
/// let a = ThingId::next();
/// ```
///
/// `counter_id!(@next)` expands to just the `next` constructor, for id types
/// declared by hand.
#[macro_export]
macro_rules! counter_id {
    (@next) => {
        /// Allocates a fresh identifier, never handed out before in this process.
        #[must_use]
        pub fn next() -> Self {
            static COUNTER: core::sync::atomic::AtomicU64 = core::sync::atomic::AtomicU64::new(1);
            Self(COUNTER.fetch_add(1, core::sync::atomic::Ordering::Relaxed))
        }
    };
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            $crate::counter_id!(@next);

            /// Returns the raw numeric value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}
