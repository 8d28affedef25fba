//! OAuth2 clients managed by their owner.

use std::sync::Arc;

use crate::dtos::users::{
    ApplicationCreatedResponse, CreateApplicationRequest, UpdateApplicationRequest,
};
use crate::models::{Application, ApplicationInfo, SessionContext};
use crate::services::account::Notifier;
use crate::services::clock::Clock;
use crate::services::snowflake::SnowflakeGenerator;
use crate::services::store::IdentityStore;
use crate::services::ServiceError;
use crate::utils::generate_token;

#[derive(Clone)]
pub struct ApplicationService {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<SnowflakeGenerator>,
    notifier: Notifier,
}

impl ApplicationService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<SnowflakeGenerator>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            notifier,
        }
    }

    pub async fn create(
        &self,
        ctx: &SessionContext,
        req: CreateApplicationRequest,
    ) -> Result<ApplicationCreatedResponse, ServiceError> {
        ctx.require_user()?;
        let application = Application {
            id: self.ids.next_id(),
            created: self.clock.now(),
            user_id: ctx.user_id,
            name: req.name,
            description: req.description.filter(|d| !d.is_empty()),
            auth_secret: generate_token(),
            auth_redirects: req.redirects,
        };
        self.store.insert_application(&application).await?;

        tracing::info!(
            user_id = ctx.user_id,
            application_id = application.id,
            "Application created"
        );
        let secret = application.auth_secret.clone();
        Ok(ApplicationCreatedResponse {
            application: application.into(),
            secret,
        })
    }

    pub async fn list(&self, ctx: &SessionContext) -> Result<Vec<ApplicationInfo>, ServiceError> {
        ctx.require_user()?;
        Ok(self
            .store
            .list_applications(ctx.user_id)
            .await?
            .into_iter()
            .map(ApplicationInfo::from)
            .collect())
    }

    pub async fn update(
        &self,
        ctx: &SessionContext,
        application_id: i64,
        req: UpdateApplicationRequest,
    ) -> Result<ApplicationInfo, ServiceError> {
        ctx.require_user()?;
        if req.is_empty() {
            return Err(ServiceError::EmptyBody);
        }
        let mut application = self
            .store
            .find_application(application_id)
            .await?
            .filter(|app| app.user_id == ctx.user_id)
            .ok_or(ServiceError::UnknownApplication)?;

        if let Some(name) = req.name {
            application.name = name;
        }
        if let Some(description) = req.description {
            application.description = (!description.is_empty()).then_some(description);
        }
        if let Some(redirects) = req.redirects {
            application.auth_redirects = redirects;
        }

        if !self
            .store
            .update_application(ctx.user_id, &application)
            .await?
        {
            return Err(ServiceError::UnknownApplication);
        }
        tracing::info!(user_id = ctx.user_id, application_id, "Application updated");
        Ok(application.into())
    }

    /// Removes the application together with its grants and connections.
    pub async fn delete(
        &self,
        ctx: &SessionContext,
        application_id: i64,
    ) -> Result<(), ServiceError> {
        ctx.require_elevated()?;
        if !self
            .store
            .delete_application(ctx.user_id, application_id)
            .await?
        {
            return Err(ServiceError::UnknownApplication);
        }
        tracing::info!(user_id = ctx.user_id, application_id, "Application deleted");
        self.notifier
            .delete_assets(vec![format!("icons/{application_id}")]);
        Ok(())
    }

    pub async fn reset_secret(
        &self,
        ctx: &SessionContext,
        application_id: i64,
    ) -> Result<String, ServiceError> {
        ctx.require_elevated()?;
        let secret = generate_token();
        if !self
            .store
            .rotate_application_secret(ctx.user_id, application_id, &secret)
            .await?
        {
            return Err(ServiceError::UnknownApplication);
        }
        tracing::info!(user_id = ctx.user_id, application_id, "Application secret rotated");
        Ok(secret)
    }
}
