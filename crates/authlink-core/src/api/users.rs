//! Profile endpoints for the signed-in user.

use super::{endpoints, ApiClient, ApiError};
use crate::models::{ProfileUpdate, UserProfile};

impl ApiClient {
    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        self.get(endpoints::USERS_ME).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        self.put(endpoints::USERS_ME, update).await
    }
}
