// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: opens the printer, starts the dispatcher and
// brings up whichever RPC listeners the configuration enables.

use std::net::SocketAddr;
use std::sync::Arc;

use slipway_core::config::{PrinterConfig, PrinterKind};
use slipway_core::error::{Result, SlipwayError};
use slipway_core::AppConfig;
use slipway_print::{
    ConsolePrinter, DispatcherConfig, EscPosPrinter, JobDispatcher, PrinterDevice,
    QueueRpcServer, SocketRpcServer,
};
use tracing::{info, warn};

/// Everything the daemon runs.
pub struct AppServices {
    config: AppConfig,
    dispatcher: Arc<JobDispatcher>,
    socket_server: Option<SocketRpcServer>,
    queue_server: Option<QueueRpcServer>,
    #[cfg(feature = "amqp")]
    amqp_broker: Option<Arc<slipway_print::AmqpBroker>>,
}

impl AppServices {
    /// Open the printer and start the dispatcher.  Listeners are started
    /// separately by [`AppServices::start`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn init(config: AppConfig) -> Result<Self> {
        if config.amqp.enabled && !cfg!(feature = "amqp") {
            return Err(SlipwayError::Config(
                "amqp.enabled is set but this build has no AMQP support".into(),
            ));
        }

        let device = open_device(&config.printer)?;
        let dispatcher = Arc::new(JobDispatcher::start(
            device,
            DispatcherConfig::from(&config),
        ));

        info!(
            printer = ?config.printer.kind,
            retention_secs = config.retention_secs,
            "app services initialised"
        );
        Ok(Self {
            config,
            dispatcher,
            socket_server: None,
            queue_server: None,
            #[cfg(feature = "amqp")]
            amqp_broker: None,
        })
    }

    pub fn dispatcher(&self) -> &Arc<JobDispatcher> {
        &self.dispatcher
    }

    /// Address of the socket listener, once started.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.socket_server.as_ref().and_then(SocketRpcServer::local_addr)
    }

    /// Start the enabled RPC listeners.
    pub async fn start(&mut self) -> Result<()> {
        if self.config.socket.enabled {
            let mut server = SocketRpcServer::from_config(&self.config.socket)?;
            server.start(Arc::clone(&self.dispatcher)).await?;
            self.socket_server = Some(server);
        }

        if self.config.amqp.enabled {
            self.start_queue_server().await?;
        }

        if self.socket_server.is_none() && self.queue_server.is_none() {
            warn!("no RPC transport enabled, jobs cannot be submitted");
        }
        Ok(())
    }

    #[cfg(feature = "amqp")]
    async fn start_queue_server(&mut self) -> Result<()> {
        let broker = Arc::new(slipway_print::AmqpBroker::connect(&self.config.amqp.uri).await?);
        let mut server = QueueRpcServer::new(self.config.amqp.routing_key.clone());
        let shared: Arc<dyn slipway_print::Broker> = broker.clone();
        server.start(shared, Arc::clone(&self.dispatcher)).await?;
        self.amqp_broker = Some(broker);
        self.queue_server = Some(server);
        Ok(())
    }

    #[cfg(not(feature = "amqp"))]
    async fn start_queue_server(&mut self) -> Result<()> {
        Err(SlipwayError::Config(
            "amqp.enabled is set but this build has no AMQP support".into(),
        ))
    }

    /// Stop listeners first, then drain the dispatcher.
    pub async fn shutdown(&mut self) {
        if let Some(mut server) = self.socket_server.take() {
            if let Err(e) = server.stop().await {
                warn!(error = %e, "socket RPC server did not stop cleanly");
            }
        }
        if let Some(mut server) = self.queue_server.take() {
            if let Err(e) = server.stop().await {
                warn!(error = %e, "queue RPC server did not stop cleanly");
            }
        }
        #[cfg(feature = "amqp")]
        if let Some(broker) = self.amqp_broker.take() {
            if let Err(e) = broker.close().await {
                warn!(error = %e, "AMQP connection did not close cleanly");
            }
        }

        self.dispatcher.shutdown().await;
        info!("app services stopped");
    }
}

/// Open the configured output device.
pub fn open_device(config: &PrinterConfig) -> Result<Box<dyn PrinterDevice>> {
    match config.kind {
        PrinterKind::Console => {
            info!("using console printer");
            Ok(Box::new(ConsolePrinter::new()))
        }
        PrinterKind::Serial => {
            let printer = EscPosPrinter::open_serial(&config.device, config.baud_rate)?;
            Ok(Box::new(printer))
        }
    }
}
