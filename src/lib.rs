pub mod analytics;
pub mod auth;
pub mod aws_clients;
pub mod config;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod integrations;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod visibility;

use crate::config::Config;
use crate::domain::{Collection, DocumentStore, FileStorage, ImageGenerator, Thumbnailer};
use crate::models::{
    Contact, EmailClaim, GeneratedImage, Like, Media, Meme, Permission, PlatformSettings, Review, Role,
    Support, Testimonial, Transaction, User, UsernameClaim,
};
use std::sync::Arc;

/// AppState holds shared resources for the web server.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub file_storage: Arc<dyn FileStorage>,
    pub image_generator: Arc<dyn ImageGenerator>,
    pub thumbnailer: Arc<dyn Thumbnailer>,
}

impl AppState {
    fn collection<T: domain::Document>(&self) -> Collection<T> {
        Collection::new(self.store.clone())
    }

    pub fn users(&self) -> Collection<User> {
        self.collection()
    }
    pub fn usernames(&self) -> Collection<UsernameClaim> {
        self.collection()
    }
    pub fn emails(&self) -> Collection<EmailClaim> {
        self.collection()
    }
    pub fn memes(&self) -> Collection<Meme> {
        self.collection()
    }
    pub fn generated_images(&self) -> Collection<GeneratedImage> {
        self.collection()
    }
    pub fn likes(&self) -> Collection<Like> {
        self.collection()
    }
    pub fn reviews(&self) -> Collection<Review> {
        self.collection()
    }
    pub fn transactions(&self) -> Collection<Transaction> {
        self.collection()
    }
    pub fn settings(&self) -> Collection<PlatformSettings> {
        self.collection()
    }
    pub fn media(&self) -> Collection<Media> {
        self.collection()
    }
    pub fn contacts(&self) -> Collection<Contact> {
        self.collection()
    }
    pub fn support_tickets(&self) -> Collection<Support> {
        self.collection()
    }
    pub fn testimonials(&self) -> Collection<Testimonial> {
        self.collection()
    }
    pub fn roles(&self) -> Collection<Role> {
        self.collection()
    }
    pub fn permissions(&self) -> Collection<Permission> {
        self.collection()
    }

    /// Current platform settings, falling back to configured defaults when none are stored.
    pub async fn platform_settings(&self) -> Result<PlatformSettings, errors::RepoError> {
        Ok(self
            .settings()
            .get(PlatformSettings::SINGLETON_ID)
            .await?
            .unwrap_or_else(|| PlatformSettings::defaults(self.config.default_commission_bps)))
    }
}
