use crate::{
    auth::{self, permissions, ROLE_ADMIN, ROLE_SUPER_ADMIN, ROLE_USER},
    aws_clients::{create_dynamodb_client, create_s3_client, create_sdk_config},
    config::{Config, StorageBackend},
    domain::{DocumentStore, FileStorage, ImageGenerator},
    errors::{AppError, RepoError},
    integrations::{DisabledImageGenerator, FfmpegThumbnailer, HttpImageGenerator},
    memory::{InMemoryDocumentStore, InMemoryFileStorage},
    models::{EmailClaim, Permission, PlatformSettings, Role, User, UsernameClaim, COLLECTIONS},
    repositories::{DynamoDbDocumentStore, KEY_ATTRIBUTE},
    storage::S3FileStorage,
    AppState,
};
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient,
};
use aws_sdk_s3::{
    error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};
use backoff::ExponentialBackoff;
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

fn startup_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..ExponentialBackoff::default()
    }
}

/// Creates the DynamoDB table if it doesn't exist.
async fn create_dynamodb_table_if_not_exists(client: &DynamoDbClient, table_name: &str) -> Result<(), AppError> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(KEY_ATTRIBUTE)
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(KEY_ATTRIBUTE)
                .key_type(KeyType::Hash)
                .build()?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;
    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created.", table_name);
            Ok(())
        }
        Err(DynamoSdkError::ServiceError(service_err)) if service_err.err().is_resource_in_use_exception() => {
            tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
            Ok(())
        }
        Err(e) => {
            let context = format!("Startup: Error creating DynamoDB table '{}'", table_name);
            tracing::warn!("{}: {}", context, e);
            Err(AppError::InitError(format!("{}: {}", context, e)))
        }
    }
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> Result<(), AppError> {
    let mut request = client.create_bucket().bucket(bucket_name);
    if region_str != "us-east-1" {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        );
    }

    match request.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created.", bucket_name);
            Ok(())
        }
        Err(S3SdkError::ServiceError(service_err))
            if matches!(
                service_err.err().meta().code(),
                Some("BucketAlreadyOwnedByYou") | Some("BucketAlreadyExists")
            ) =>
        {
            tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            let context = format!("Startup: Error creating S3 bucket '{}'", bucket_name);
            tracing::warn!("{}: {}", context, sdk_err);
            Err(AppError::InitError(format!("{}: {}", context, sdk_err)))
        }
    }
}

/// Creates every table and the bucket. Each step is retried while the backend comes up.
pub async fn init_aws_resources(
    db_client: &DynamoDbClient,
    s3_client: &S3Client,
    config: &Config,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing AWS resources...");
    for collection in COLLECTIONS {
        let table_name = format!("{}{}", config.table_prefix, collection);
        backoff::future::retry(startup_backoff(), || async {
            create_dynamodb_table_if_not_exists(db_client, &table_name)
                .await
                .map_err(backoff::Error::transient)
        })
        .await?;
    }
    backoff::future::retry(startup_backoff(), || async {
        ensure_s3_bucket_exists(s3_client, &config.meme_bucket_name, &config.aws_region)
            .await
            .map_err(backoff::Error::transient)
    })
    .await?;
    tracing::info!("Startup: AWS resource initialization complete.");
    Ok(())
}

/// Builds the shared state for the configured backends.
pub async fn build_state(config: Config) -> Result<AppState, AppError> {
    let (store, file_storage): (Arc<dyn DocumentStore>, Arc<dyn FileStorage>) = match config.storage_backend {
        StorageBackend::Aws => {
            let sdk_config = create_sdk_config(&config).await;
            let db_client = create_dynamodb_client(&sdk_config);
            let s3_client = create_s3_client(&sdk_config);
            init_aws_resources(&db_client, &s3_client, &config).await?;
            (
                Arc::new(DynamoDbDocumentStore::new(db_client, config.table_prefix.clone())),
                Arc::new(S3FileStorage::new(s3_client, config.meme_bucket_name.clone())),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("Startup: Using in-memory storage, data is lost on restart");
            (Arc::new(InMemoryDocumentStore::new()), Arc::new(InMemoryFileStorage::new()))
        }
    };

    let image_generator: Arc<dyn ImageGenerator> = match &config.image_api {
        Some(api) => Arc::new(HttpImageGenerator::new(api.clone())?),
        None => {
            tracing::info!("Startup: IMAGE_API_URL/IMAGE_API_KEY not set, image generation disabled");
            Arc::new(DisabledImageGenerator)
        }
    };
    let thumbnailer = Arc::new(FfmpegThumbnailer::new(config.ffmpeg_path.clone()));

    Ok(AppState {
        config,
        store,
        file_storage,
        image_generator,
        thumbnailer,
    })
}

// Seed documents are created with conditional inserts so edits made by admins survive restarts.
async fn insert_if_missing<T: crate::domain::Document>(
    collection: crate::domain::Collection<T>,
    doc: &T,
) -> Result<bool, AppError> {
    match collection.insert(doc).await {
        Ok(()) => Ok(true),
        Err(RepoError::Conflict { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Seeds built-in permissions, roles, settings and the bootstrap super admin.
pub async fn seed(state: &AppState) -> Result<(), AppError> {
    let now = Utc::now();

    for (name, description) in permissions::BUILT_IN {
        let permission = Permission {
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
        };
        insert_if_missing(state.permissions(), &permission).await?;
    }

    let roles = [
        (ROLE_USER, "Regular member", Vec::new()),
        (
            ROLE_ADMIN,
            "Platform staff",
            permissions::ADMIN_DEFAULTS.iter().map(|p| p.to_string()).collect(),
        ),
        (
            ROLE_SUPER_ADMIN,
            "Holds every permission",
            permissions::BUILT_IN.iter().map(|(p, _)| p.to_string()).collect(),
        ),
    ];
    for (name, description, granted) in roles {
        let role = Role {
            name: name.to_string(),
            description: description.to_string(),
            permissions: granted,
            is_system: true,
            created_at: now,
        };
        if insert_if_missing(state.roles(), &role).await? {
            tracing::info!(role = %name, "Startup: Seeded role");
        }
    }

    let settings = PlatformSettings::defaults(state.config.default_commission_bps);
    if insert_if_missing(state.settings(), &settings).await? {
        tracing::info!(commission_bps = settings.commission_bps, "Startup: Seeded platform settings");
    }

    if let Some(admin) = &state.config.bootstrap_admin {
        seed_super_admin(state, &admin.email, &admin.username, &admin.password).await?;
    }
    Ok(())
}

async fn seed_super_admin(state: &AppState, email: &str, username: &str, password: &str) -> Result<(), AppError> {
    let email = email.trim().to_lowercase();
    if state.emails().get(&email).await?.is_some() {
        tracing::debug!("Startup: Bootstrap super admin already present");
        return Ok(());
    }

    let now = Utc::now();
    let user = User {
        user_id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.clone(),
        password_hash: auth::hash_password(password)?,
        display_name: username.to_string(),
        bio: String::new(),
        avatar_key: None,
        is_public: false,
        role: ROLE_SUPER_ADMIN.to_string(),
        is_blocked: false,
        created_at: now,
        updated_at: now,
    };
    state
        .emails()
        .insert(&EmailClaim { email: email.clone(), user_id: user.user_id })
        .await?;
    let claim = UsernameClaim { username: username.to_lowercase(), user_id: user.user_id };
    if let Err(e) = state.usernames().insert(&claim).await {
        state.emails().delete(&email).await?;
        return Err(match e {
            RepoError::Conflict { .. } => AppError::InitError(format!(
                "Bootstrap super admin username '{}' is already taken",
                username
            )),
            e => e.into(),
        });
    }
    state.users().save(&user).await?;
    tracing::info!(user_id = %user.user_id, "Startup: Created bootstrap super admin");
    Ok(())
}
