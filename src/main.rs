use std::any::Any;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use veraz::{
    app::{ComponentRegistry, build_router},
    config::Config,
    observability,
    training,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the prediction and retraining API (default)
    Serve {
        /// Address to bind, overrides VERAZ_HTTP_BIND
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Train the text pipeline and classifier from a labeled corpus
    Train {
        /// `;`-delimited CSV with Titulo, Descripcion and Label columns
        #[arg(long, env = "VERAZ_CORPUS_PATH")]
        corpus: Option<PathBuf>,
    },
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// パニックを構造化ログとして残す。spawn_blocking 内の学習処理のパニックもここを通る。
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let location = panic_info
            .location()
            .map_or_else(|| "unknown".to_string(), ToString::to_string);
        error!(
            thread = thread.name().unwrap_or("unnamed"),
            location = %location,
            message = panic_message(panic_info.payload()),
            "panic"
        );
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_panic_hook();
    observability::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let config = match bind {
                Some(bind) => config.with_http_bind(bind),
                None => config,
            };
            serve(config).await
        }
        Command::Train { corpus } => {
            let config = match corpus {
                Some(path) => config.with_corpus_path(path),
                None => config,
            };
            tokio::task::spawn_blocking(move || train(&config))
                .await
                .context("training task failed")?
        }
    }
}

fn train(config: &Config) -> anyhow::Result<()> {
    let normalizer = config
        .normalizer()
        .context("failed to build text normalizer")?;
    let outcome = training::train_and_persist(
        config.corpus_path(),
        normalizer,
        &config.training_options(),
        &config.artifact_paths(),
    )
    .with_context(|| format!("training on {} failed", config.corpus_path().display()))?;

    info!(
        train_rows = outcome.train_rows,
        test_rows = outcome.test_rows,
        trees = outcome.model.n_trees(),
        precision = outcome.evaluation.precision,
        recall = outcome.evaluation.recall,
        f1 = outcome.evaluation.f1,
        accuracy = outcome.evaluation.accuracy,
        "training finished"
    );
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.http_bind();
    let registry = tokio::task::spawn_blocking(move || ComponentRegistry::build(&config))
        .await
        .context("artifact loading task failed")?
        .context("failed to build component registry")?;
    let router = build_router(registry);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {bind_addr}"))?;

    info!(%bind_addr, "listening");

    if let Err(error) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        warn!(error = %error, "server exited with error");
    }

    info!("server shutdown complete");
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum StopSignal {
    Interrupt,
    Terminate,
}

#[cfg(unix)]
async fn terminate_requested() -> std::io::Result<()> {
    let mut stream = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    stream.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate_requested() -> std::io::Result<()> {
    std::future::pending().await
}

/// SIGINT か SIGTERM を待つ。ハンドラを登録できなかった側は無視する。
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(error = %error, "SIGINT handler unavailable");
            std::future::pending::<()>().await;
        }
        StopSignal::Interrupt
    };
    let terminate = async {
        if let Err(error) = terminate_requested().await {
            warn!(error = %error, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
        StopSignal::Terminate
    };

    let received = tokio::select! {
        stop = interrupt => stop,
        stop = terminate => stop,
    };
    info!(signal = ?received, "shutdown requested; draining in-flight requests");
}
