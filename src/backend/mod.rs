//! Backend abstraction layer
//!
//! The engine drives a [`GpuDevice`]; the wgpu implementation is available
//! behind the `wgpu-backend` feature and a headless one always.

/// Bit set newtype with `contains` and `|`
macro_rules! gpu_flags {
    ($(#[$meta:meta])* $name:ident { $($flag:ident = $bit:expr),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            $(pub const $flag: Self = Self($bit);)*

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub fn contains(self, flags: Self) -> bool {
                self.0 & flags.0 == flags.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }
        }
    };
}

pub mod command;
pub mod headless;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_device;

pub use command::{CommandBuffer, GpuCommand};
pub use headless::{HeadlessDevice, HeadlessLog};
pub use traits::*;
pub use types::*;

#[cfg(feature = "wgpu-backend")]
pub use wgpu_device::WgpuDevice;
