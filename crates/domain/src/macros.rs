//! Macro for giving closed enums a stable wire name
//!
//! Error kinds, environments and idempotency states all travel as lowercase
//! snake_case strings (log fields, cache values, query parameters). This macro
//! generates `as_str`, `Display` and case-insensitive `FromStr` from a single
//! variant table so the three never drift apart.
//!
//! # Example
//!
//! ```rust
//! use catalink_domain::impl_wire_name;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Stage {
//!     Queued,
//!     Running,
//! }
//!
//! impl_wire_name!(Stage {
//!     Queued => "queued",
//!     Running => "running",
//! });
//!
//! assert_eq!(Stage::Running.as_str(), "running");
//! assert_eq!("QUEUED".parse::<Stage>(), Ok(Stage::Queued));
//! ```

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their wire names
#[macro_export]
macro_rules! impl_wire_name {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Stable wire name of this variant.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
