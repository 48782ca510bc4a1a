// SPDX-License-Identifier: GPL-2.0-or-later

use annotator::Annotator;
use axum::Router;
use common::{ILogger, LogEntry, LogLevel};
use env::{EnvConf, EnvConfigNewError};
use handler::ApiState;
use log::Logger;
use roidb::{CreateRoiDbError, RoiDb};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    net::TcpListener,
    signal,
    sync::oneshot,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("environment config: {0}")]
    EnvConfig(#[from] EnvConfigNewError),

    #[error("create roi database: {0}")]
    CreateRoiDb(#[from] CreateRoiDbError),

    #[error("listen on sigterm: {0}")]
    SigTermListener(std::io::Error),
}

pub async fn run(config_path: &PathBuf) -> Result<(), RunError> {
    let app = App::new(config_path).await?;
    app.run().await
}

pub struct App {
    token: CancellationToken,
    env: EnvConf,
    logger: Arc<Logger>,
    router: Router,
}

impl App {
    pub async fn new(config_path: &PathBuf) -> Result<App, RunError> {
        let token = CancellationToken::new();
        let env = EnvConf::new(config_path)?;
        let logger = Arc::new(Logger::new());

        let roidb = Arc::new(RoiDb::new(env.storage_dir()).await?);
        let annotator = Arc::new(Annotator::new(logger.clone()));

        let router = handler::router(ApiState {
            roidb,
            annotator,
            logger: logger.clone(),
        });

        Ok(App {
            token,
            env,
            logger,
            router,
        })
    }

    pub async fn run(self) -> Result<(), RunError> {
        let App {
            token,
            env,
            logger,
            router,
        } = self;

        logger.log(LogEntry::new(
            LogLevel::Info,
            "app",
            &format!("Serving api on port {}", env.port()),
        ));

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), env.port());
        let (server_exited_tx, mut server_exited_rx) = oneshot::channel();
        tokio::spawn(start_server(
            token.child_token(),
            server_exited_tx,
            addr,
            router,
        ));

        // Shutdown conditions.
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RunError::SigTermListener)?;
        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => eprintln!("\nreceived interrupt, stopping..\n"),
                    Err(e) => eprintln!("\ninterrupt error: {e}"),
                }
            }
            _ = sigterm.recv() => eprintln!("\nreceived terminate, stopping..\n"),
            res = &mut server_exited_rx => {
                if let Ok(Err(e)) = res {
                    eprintln!("server error: {e}");
                }
                return Ok(());
            },
        }

        token.cancel();
        // Wait for in-flight requests to drain.
        let _ = (&mut server_exited_rx).await;
        Ok(())
    }
}

#[derive(Debug, Error)]
enum ServerError {
    #[error("bind: {0}")]
    Bind(std::io::Error),

    #[error("{0}")]
    Server(std::io::Error),
}

async fn start_server(
    token: CancellationToken,
    on_exit: oneshot::Sender<Result<(), ServerError>>,
    addr: SocketAddr,
    router: Router,
) {
    let listener = match TcpListener::bind(addr).await {
        Ok(v) => v,
        Err(e) => {
            let _ = on_exit.send(Err(ServerError::Bind(e)));
            return;
        }
    };
    let graceful = axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await });
    let _ = on_exit.send(graceful.await.map_err(ServerError::Server));
}
