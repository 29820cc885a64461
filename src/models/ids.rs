use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Builds the id from a slug, normalizing case and separators.
            pub fn new(raw: &str) -> Self {
                Self(crate::utils::normalize_slug(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }
    };
}

string_id!(
    /// Bidirectional service relationship between two terminals.
    CorridorId
);
string_id!(
    /// Ferry operator, e.g. `ssa` or `hlc`.
    OperatorId
);
string_id!(
    /// Terminal slug, e.g. `woods-hole`.
    PortId
);
string_id!(
    /// One direction of one operator's service, e.g. `wh-vh-ssa`.
    RouteId
);
