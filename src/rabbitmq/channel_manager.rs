use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use super::amqp_client::{AmqpSession, Connector};
use super::connection::{discard, establish, ConnectionSettings, ConnectionState};
use super::errors::{RabbitMQError, Result};
use super::topology::{self, TopologyDeclaration};
use crate::message::Message;

/// Connection manager shared by plain OS threads.
///
/// One mutex guards the session and the exchange cache and is held for each
/// connect, declare and publish write. Broker I/O runs on a private
/// current-thread runtime driven by the calling thread, so this type must be
/// used (and dropped) outside of any async context.
pub struct BlockingConnectionManager<C: Connector> {
    connector: C,
    settings: ConnectionSettings,
    state: Mutex<ConnectionState<C::Session>>,
    runtime: Runtime,
}

impl<C: Connector> BlockingConnectionManager<C> {
    pub fn new(connector: C, settings: ConnectionSettings) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| RabbitMQError::ConfigError(format!("failed to start broker runtime: {}", e)))?;

        debug!("Creating blocking connection manager");

        Ok(Self {
            connector,
            settings,
            state: Mutex::new(ConnectionState::default()),
            runtime,
        })
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> Result<bool> {
        Ok(self.lock()?.is_live())
    }

    /// Sessions opened so far.
    pub fn generation(&self) -> Result<u64> {
        Ok(self.lock()?.generation())
    }

    pub fn cached_exchanges(&self) -> Result<usize> {
        Ok(self.lock()?.cached_exchanges())
    }

    /// Opens a session unless the current one is still open. Other threads
    /// wait on the lock while the connect is in progress.
    pub fn ensure_connected(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.is_live() {
            return Ok(());
        }

        let session = self.block_on(establish(&self.connector, &self.settings))?;
        let stale = state.install(session);
        drop(state);

        if let Some(stale) = stale {
            self.block_on(discard(stale));
        }
        Ok(())
    }

    pub fn declare(&self, declaration: &TopologyDeclaration) -> Result<()> {
        self.ensure_connected()?;

        let mut state = self.lock()?;
        let handle = state.live_handle()?;
        self.block_on(topology::declare_on(handle.session.as_ref(), declaration))?;
        state.mark_declared(&handle, &declaration.exchange);

        info!(
            exchange = %declaration.exchange,
            queues = declaration.queues.len(),
            "Topology declared"
        );
        Ok(())
    }

    /// One publish attempt under the lock, on the session current at the time
    /// the lock is taken.
    pub(crate) fn write(&self, message: &Message) -> Result<()> {
        let mut state = self.lock()?;
        let handle = state.live_handle()?;

        if state.needs_declare(&handle, &message.exchange) {
            self.block_on(handle.session.declare_exchange(&message.exchange))?;
            state.mark_declared(&handle, &message.exchange);
            debug!(exchange = %message.exchange, generation = handle.generation, "Exchange declared");
        }

        self.block_on(handle.session.publish(message))
    }

    /// Releases channel and connection. Safe to call repeatedly.
    pub fn close(&self) -> Result<()> {
        let session = self.lock()?.take();
        if let Some(session) = session {
            info!("Closing RabbitMQ connection gracefully");
            self.block_on(discard(session));
        }
        Ok(())
    }

    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ConnectionState<C::Session>>> {
        self.state.lock().map_err(|_| RabbitMQError::LockError)
    }
}
