use std::sync::Arc;

use crate::driver::{self, Connection, ConnectionFactory, ConnectionOptions};
use crate::error::SqlBridgeError;
use crate::render::RenderSettings;
use crate::stream::block_on_publisher;
use crate::types::DatabaseFamily;

/// Configuration plus connection factory for one target database.
///
/// Every publisher is built from one of these:
/// ```rust,no_run
/// use std::sync::Arc;
/// use sql_reactive_bridge::prelude::*;
///
/// # fn demo(factory: Arc<dyn sql_reactive_bridge::driver::ConnectionFactory>,
/// #         query: Arc<dyn RecordQuery>) {
/// let config = ConfigAndFactory::new(factory, DatabaseFamily::Postgres);
/// let publisher = RecordPublisher::new(&config, query);
/// # let _ = publisher;
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigAndFactory {
    factory: Arc<dyn ConnectionFactory>,
    family: DatabaseFamily,
    settings: RenderSettings,
}

impl ConfigAndFactory {
    /// Bundle a factory with the render settings of its dialect family.
    #[must_use]
    pub fn new(factory: Arc<dyn ConnectionFactory>, family: DatabaseFamily) -> Self {
        Self {
            factory,
            family,
            settings: RenderSettings::for_family(family),
        }
    }

    /// Override the render settings (e.g. a custom named-parameter prefix).
    #[must_use]
    pub fn with_render_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn factory(&self) -> &Arc<dyn ConnectionFactory> {
        &self.factory
    }

    #[must_use]
    pub fn family(&self) -> DatabaseFamily {
        self.family
    }

    #[must_use]
    pub fn render_settings(&self) -> &RenderSettings {
        &self.settings
    }
}

/// Synchronously open a connection for a URL.
///
/// Resolves a registered factory provider by scheme and blocks on its
/// connection publisher.
///
/// # Errors
///
/// Configuration errors for unparsable URLs or unknown schemes; a data-access
/// error when the publisher errors or completes without a connection.
pub fn get_connection(url: &str) -> Result<Arc<dyn Connection>, SqlBridgeError> {
    let options = ConnectionOptions::parse(url)?;
    connect(&options)
}

/// Synchronously open a connection with credentials supplied separately from
/// the URL.
///
/// # Errors
///
/// Same as [`get_connection`].
pub fn get_connection_with_credentials(
    url: &str,
    user: &str,
    password: &str,
) -> Result<Arc<dyn Connection>, SqlBridgeError> {
    let options = ConnectionOptions::parse(url)?
        .with_user(user)
        .with_password(password);
    connect(&options)
}

fn connect(options: &ConnectionOptions) -> Result<Arc<dyn Connection>, SqlBridgeError> {
    let factory = driver::factory_for(options)?;
    block_on_publisher(factory.create().as_ref())?.ok_or_else(|| {
        SqlBridgeError::data_access("connection publisher completed without a connection")
    })
}
