//! Alpaca Conform - ASCOM Alpaca protocol conformance checker
//!
//! Sends deliberately varied requests to an Alpaca device, checks every
//! response against the protocol's casing, round-trip and status-code rules,
//! and summarizes the findings as OK, information, issues and errors.

pub mod casing;
pub mod classifier;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod generator;
pub mod imagebytes;
pub mod io;
pub mod members;
pub mod parameter;
pub mod report;
pub mod session;
pub mod sink;
pub mod validator;
pub mod wait;

pub use config::{load_config, Config};
pub use dispatcher::{Dispatcher, Phase};
pub use error::{ConformError, Result};
pub use report::{Summary, Verdict, ABORT_RETURN_CODE};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::executor::Executor;
use crate::io::{HttpTransport, ReqwestTransport};
use crate::session::Session;
use crate::sink::{ConformLogger, TracingLogger};

/// Builder for a conformance run.
///
/// Defaults to a reqwest transport configured from the settings and a logger
/// that forwards findings to `tracing`.
pub struct ConformBuilder {
    config: Config,
    transport: Option<Arc<dyn HttpTransport>>,
    logger: Arc<dyn ConformLogger>,
    cancel: CancellationToken,
}

impl ConformBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            logger: Arc::new(TracingLogger),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ConformLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<ConformRunner> {
        let protocol = &self.config.protocol;
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(
                protocol.decompress,
                self.config.auth.clone(),
            )?),
        };

        let device = &self.config.device;
        let executor = Executor::new(
            transport,
            device.base_url(),
            device.device_type,
            device.device_number,
            protocol.long_response_timeout,
            self.cancel.clone(),
        );
        let session = Arc::new(Session::new(self.config, self.cancel, self.logger));
        let dispatcher = Dispatcher::new(Arc::clone(&session), executor);

        Ok(ConformRunner {
            session,
            dispatcher,
        })
    }
}

/// A configured run, ready to start
pub struct ConformRunner {
    session: Arc<Session>,
    dispatcher: Dispatcher,
}

impl ConformRunner {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run every phase and return the summary
    pub async fn run(&self) -> Summary {
        let device = &self.session.config().device;
        tracing::info!(
            "Testing {} {} at {}",
            device.device_type,
            device.device_number,
            device.base_url()
        );
        self.dispatcher.run().await
    }
}
