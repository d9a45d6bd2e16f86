use crate::domain::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Names of every collection the service stores, used to create tables at startup.
pub const COLLECTIONS: &[&str] = &[
    User::COLLECTION,
    UsernameClaim::COLLECTION,
    EmailClaim::COLLECTION,
    Meme::COLLECTION,
    GeneratedImage::COLLECTION,
    Like::COLLECTION,
    Review::COLLECTION,
    Transaction::COLLECTION,
    PlatformSettings::COLLECTION,
    Media::COLLECTION,
    Contact::COLLECTION,
    Support::COLLECTION,
    Testimonial::COLLECTION,
    Role::COLLECTION,
    Permission::COLLECTION,
];

// --- Users ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    pub avatar_key: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    pub role: String,
    #[serde(default)]
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for User {
    const COLLECTION: &'static str = "users";
    fn id(&self) -> String {
        self.user_id.to_string()
    }
}

/// What other people (and the owner) see of a user. Never carries the hash.
#[derive(Serialize, Debug, Clone)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub is_public: bool,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            user_id: user.user_id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_key.as_ref().map(|_| format!("/users/{}/avatar", user.user_id)),
            is_public: user.is_public,
            role: user.role.clone(),
            created_at: user.created_at,
        }
    }
}

/// Admin listing entry, includes account state.
#[derive(Serialize, Debug, Clone)]
pub struct UserAccount {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub email: String,
    pub is_blocked: bool,
}

impl From<&User> for UserAccount {
    fn from(user: &User) -> Self {
        UserAccount {
            profile: UserProfile::from(user),
            email: user.email.clone(),
            is_blocked: user.is_blocked,
        }
    }
}

/// Reservation of a lowercase username.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UsernameClaim {
    pub username: String,
    pub user_id: Uuid,
}

impl Document for UsernameClaim {
    const COLLECTION: &'static str = "usernames";
    fn id(&self) -> String {
        self.username.clone()
    }
}

/// Reservation of a lowercase e-mail address.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EmailClaim {
    pub email: String,
    pub user_id: Uuid,
}

impl Document for EmailClaim {
    const COLLECTION: &'static str = "emails";
    fn id(&self) -> String {
        self.email.clone()
    }
}

// --- Memes ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemeSource {
    Upload,
    Generated,
    Template,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    #[default]
    Active,
    Hidden,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Meme {
    pub meme_id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub image_key: String,
    pub content_type: String,
    pub source: MemeSource,
    pub template_id: Option<Uuid>,
    pub is_public: bool,
    #[serde(default)]
    pub is_premium: bool,
    pub price_cents: Option<u64>,
    #[serde(default)]
    pub moderation: ModerationStatus,
    pub moderation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Meme {
    const COLLECTION: &'static str = "memes";
    fn id(&self) -> String {
        self.meme_id.to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GeneratedImage {
    pub image_id: Uuid,
    pub user_id: Uuid,
    pub prompt: String,
    pub image_key: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl Document for GeneratedImage {
    const COLLECTION: &'static str = "generated_images";
    fn id(&self) -> String {
        self.image_id.to_string()
    }
}

// --- Social ---

/// What a like or review points at.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Meme,
    Template,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Meme => "meme",
            TargetKind::Template => "template",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meme" | "memes" => Ok(TargetKind::Meme),
            "template" | "templates" => Ok(TargetKind::Template),
            other => Err(format!("unknown target kind '{}'", other)),
        }
    }
}

/// Document id shared by likes and reviews: one per (user, kind, target).
pub fn engagement_id(user_id: Uuid, kind: TargetKind, target_id: Uuid) -> String {
    format!("{}:{}:{}", user_id, kind, target_id)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Like {
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub kind: TargetKind,
    pub created_at: DateTime<Utc>,
}

impl Document for Like {
    const COLLECTION: &'static str = "likes";
    fn id(&self) -> String {
        engagement_id(self.user_id, self.kind, self.target_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Review {
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub kind: TargetKind,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Review {
    const COLLECTION: &'static str = "reviews";
    fn id(&self) -> String {
        engagement_id(self.user_id, self.kind, self.target_id)
    }
}

// --- Marketplace ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
}

/// One completed premium purchase. Written once, never updated.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Transaction {
    pub reference: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub meme_id: Uuid,
    pub price_cents: u64,
    pub commission_bps: u32,
    pub platform_earnings_cents: u64,
    pub seller_earnings_cents: u64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Document id of the purchase of `meme_id` by `buyer_id`.
pub fn purchase_id(buyer_id: Uuid, meme_id: Uuid) -> String {
    format!("{}:{}", buyer_id, meme_id)
}

impl Document for Transaction {
    const COLLECTION: &'static str = "transactions";
    fn id(&self) -> String {
        purchase_id(self.buyer_id, self.meme_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlatformSettings {
    pub commission_bps: u32,
    pub min_price_cents: u64,
    pub max_price_cents: u64,
    pub registrations_open: bool,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
}

impl PlatformSettings {
    pub const SINGLETON_ID: &'static str = "platform";

    pub fn defaults(commission_bps: u32) -> Self {
        PlatformSettings {
            commission_bps,
            min_price_cents: 100,
            max_price_cents: 100_000,
            registrations_open: true,
            updated_at: Utc::now(),
            updated_by: None,
        }
    }
}

impl Document for PlatformSettings {
    const COLLECTION: &'static str = "platform_settings";
    fn id(&self) -> String {
        Self::SINGLETON_ID.to_string()
    }
}

// --- Media / templates ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Media {
    pub media_id: Uuid,
    pub title: String,
    pub kind: MediaKind,
    pub object_key: String,
    pub content_type: String,
    pub thumbnail_key: Option<String>,
    pub is_template: bool,
    pub is_active: bool,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Document for Media {
    const COLLECTION: &'static str = "media";
    fn id(&self) -> String {
        self.media_id.to_string()
    }
}

// --- Contact / support / testimonials ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    New,
    Read,
    Resolved,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Contact {
    pub contact_id: Uuid,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Contact {
    const COLLECTION: &'static str = "contacts";
    fn id(&self) -> String {
        self.contact_id.to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SupportStatus {
    Open,
    InProgress,
    Closed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Support {
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub message: String,
    pub status: SupportStatus,
    pub admin_response: Option<String>,
    pub responded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Support {
    const COLLECTION: &'static str = "support_tickets";
    fn id(&self) -> String {
        self.ticket_id.to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Testimonial {
    pub testimonial_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub rating: u8,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}

impl Document for Testimonial {
    const COLLECTION: &'static str = "testimonials";
    fn id(&self) -> String {
        self.testimonial_id.to_string()
    }
}

// --- Roles / permissions ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl Document for Role {
    const COLLECTION: &'static str = "roles";
    fn id(&self) -> String {
        self.name.clone()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Permission {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Document for Permission {
    const COLLECTION: &'static str = "permissions";
    fn id(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engagement_ids_differ_by_kind() {
        let user = Uuid::new_v4();
        let target = Uuid::new_v4();
        assert_ne!(
            engagement_id(user, TargetKind::Meme, target),
            engagement_id(user, TargetKind::Template, target)
        );
    }

    #[test]
    fn target_kind_accepts_plural_path_segments() {
        assert_eq!("memes".parse::<TargetKind>(), Ok(TargetKind::Meme));
        assert_eq!("template".parse::<TargetKind>(), Ok(TargetKind::Template));
        assert!("user".parse::<TargetKind>().is_err());
    }

    #[test]
    fn profile_never_exposes_password_hash() {
        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4(),
            username: "pepe".into(),
            email: "pepe@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            display_name: "Pepe".into(),
            bio: String::new(),
            avatar_key: None,
            is_public: true,
            role: "user".into(),
            is_blocked: false,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&UserAccount::from(&user)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("pepe@example.com"));
    }
}
