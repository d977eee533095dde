//! Contract with the remote Zenbox service. [HttpRemote] is the production implementation, the
//! engine only ever sees [ZenRemote].

pub mod http;
pub mod wire;

use async_trait::async_trait;

use crate::{
    engine::model::{Session, Settings},
    error::ZenError,
};

pub use http::HttpRemote;
pub use wire::{Targets, UserConfig};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ZenRemote: Send + Sync {
    /// `GET /device/stats`
    async fn fetch_sessions(&self) -> Result<Vec<Session>, ZenError>;

    /// `GET /user/config`
    async fn fetch_config(&self) -> Result<UserConfig, ZenError>;

    /// `PUT /user/daily-target`
    async fn put_daily_target(&self, minutes: u32) -> Result<Targets, ZenError>;

    /// `PUT /user/config`
    async fn put_settings(&self, settings: &Settings) -> Result<(), ZenError>;

    /// `POST /device/connected`
    async fn device_connected(&self) -> Result<(), ZenError>;

    /// `POST /device/disconnected`
    async fn device_disconnected(&self) -> Result<(), ZenError>;
}
