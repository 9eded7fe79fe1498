//! Database models
//!
//! Record structs mirror the tables created in `init.rs`. Enumerations are
//! stored as upper-case TEXT and parsed back with `FromStr`.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declares a TEXT-backed enum with `as_str`, `Display` and `FromStr`
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "Unknown {}: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(
    /// Lifecycle state of a community membership
    MembershipStatus {
        Pending => "PENDING",
        Active => "ACTIVE",
        Inactive => "INACTIVE",
        Suspended => "SUSPENDED",
    }
);

text_enum!(
    /// Elevated permission carried by a role assignment
    Role {
        CommunityAdmin => "COMMUNITY_ADMIN",
        SuperAdmin => "SUPER_ADMIN",
    }
);

text_enum!(
    DonationStatus {
        Pledged => "PLEDGED",
        Received => "RECEIVED",
        Cancelled => "CANCELLED",
    }
);

text_enum!(
    /// Marketplace listing category
    ServiceCategory {
        Catering => "CATERING",
        Venue => "VENUE",
        Photography => "PHOTOGRAPHY",
        Music => "MUSIC",
        Decor => "DECOR",
        Planning => "PLANNING",
        Other => "OTHER",
    }
);

impl DonationStatus {
    /// Pledges can be fulfilled or cancelled; settled donations are final
    pub fn can_transition_to(self, next: DonationStatus) -> bool {
        matches!(
            (self, next),
            (DonationStatus::Pledged, DonationStatus::Received)
                | (DonationStatus::Pledged, DonationStatus::Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub requires_approval: bool,
    pub currency: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub member_id: Uuid,
    pub community_id: Uuid,
    pub status: MembershipStatus,
    pub is_primary: bool,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub id: Uuid,
    pub member_id: Uuid,
    /// `None` for global roles (SUPER_ADMIN)
    pub community_id: Option<Uuid>,
    pub role: Role,
    pub granted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingMinutes {
    pub id: Uuid,
    pub community_id: Uuid,
    pub title: String,
    pub meeting_date: NaiveDate,
    pub attendees: Vec<String>,
    pub agenda: Option<String>,
    pub content: String,
    pub decisions: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationGoal {
    pub id: Uuid,
    pub community_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub target_cents: i64,
    pub deadline: Option<NaiveDate>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl DonationGoal {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: Uuid,
    pub community_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub donor_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub anonymous: bool,
    pub message: Option<String>,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceProvider {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub category: ServiceCategory,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price_min_cents: Option<i64>,
    pub price_max_cents: Option<i64>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parse a UUID stored as TEXT
pub fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Corrupt UUID '{}': {}", value, e)))
}

/// Parse an optional UUID stored as TEXT
pub fn parse_opt_uuid(value: Option<String>) -> Result<Option<Uuid>> {
    value.as_deref().map(parse_uuid).transpose()
}

/// Parse a stored enum value; a bad value is corruption, not user error
pub fn parse_stored<T: FromStr<Err = Error>>(value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|e| Error::Internal(format!("Corrupt stored value: {}", e)))
}
