use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod draft;
pub mod institution_link;
pub mod link_request;

pub use draft::{DraftKey, DraftSnapshot, PostStatus, Slug, slugify};
pub use institution_link::{InstitutionLink, LinkPairing, NewInstitutionLink};
pub use link_request::{
    InstitutionInfo, LinkRequest, RequestStatus, RequesterInfo, ReviewDecision, UserCategory,
};

/// Raised when a closed enumeration is parsed from an unknown string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_identifier!(
    /// Wrapper to prevent ID confusion between request rows and other entities
    LinkRequestId
);
uuid_identifier!(UserId);
uuid_identifier!(InstitutionId);
uuid_identifier!(
    /// Owning tenant. Rows without a tenant belong to the whole platform.
    TenantId
);
uuid_identifier!(LinkId);
uuid_identifier!(PostId);
uuid_identifier!(TagId);
