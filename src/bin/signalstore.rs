use clap::{Parser, Subcommand};
use dotenv::dotenv;
use signalstore::{
    setup_tracing, AppError, AppResult, BackendKind, Dispatcher, MemoryBackend, RocksBackend,
    StorageBackend, StoreConfig, SubmitError,
};
use std::path::PathBuf;
use tokio::{runtime, signal};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    PrintConfig,
    /// Push generated signals through a dispatcher, then a terminal one.
    Load {
        /// number of non-terminal signals
        #[arg(long)]
        count: Option<usize>,
        /// concurrent producer tasks
        #[arg(long)]
        producers: Option<usize>,
    },
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let config = StoreConfig::set_up_config(config_path)?;

    let level = match commandline.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _log_guard = setup_tracing(&config.log.dir, &config.log.file_prefix, level)?;

    let (count, producers) = match commandline.command {
        Some(Command::PrintConfig) => {
            println!("{:#?}", config);
            return Ok(());
        }
        Some(Command::Load { count, producers }) => (
            count.unwrap_or(config.load.count),
            producers.unwrap_or(config.load.producers),
        ),
        None => (config.load.count, config.load.producers),
    };
    let producers = if producers == 0 {
        num_cpus::get()
    } else {
        producers
    };

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(async {
        match config.backend.kind {
            BackendKind::Rocksdb => {
                let dispatcher = Dispatcher::from_config(RocksBackend::new(), &config);
                run_load(dispatcher, count, producers).await
            }
            BackendKind::Memory => {
                let dispatcher = Dispatcher::from_config(MemoryBackend::new(), &config);
                run_load(dispatcher, count, producers).await
            }
        }
    })
}

async fn run_load<B: StorageBackend>(
    dispatcher: Dispatcher<B>,
    count: usize,
    producers: usize,
) -> AppResult<()> {
    dispatcher.start().await?;
    let mut faults = dispatcher.take_fault_receiver();
    info!(count, producers, "load started");

    let load = async {
        let mut handles = Vec::with_capacity(producers);
        for producer in 0..producers {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                let mut sent = 0usize;
                for i in (producer..count).step_by(producers) {
                    match dispatcher
                        .submit(i.to_string(), (200 * i).to_string(), false)
                        .await
                    {
                        Ok(()) => sent += 1,
                        Err(SubmitError::AlreadyClosing) | Err(SubmitError::ChannelClosed) => {
                            break
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(sent)
            }));
        }

        let mut sent = 0;
        for handle in handles {
            sent += handle.await??;
        }
        dispatcher
            .submit(count.to_string(), (200 * count).to_string(), true)
            .await?;
        Ok::<usize, AppError>(sent + 1)
    };

    let outcome = tokio::select! {
        result = load => result.map(Some),
        _ = signal::ctrl_c() => {
            warn!("interrupted, closing the dispatcher");
            Ok(None)
        }
    };

    dispatcher.close().await;

    let mut fault_count = 0;
    if let Some(faults) = faults.as_mut() {
        while let Ok(fault) = faults.try_recv() {
            error!("{}", fault);
            fault_count += 1;
        }
    }
    if fault_count > 0 {
        return Err(AppError::IllegalStateError(format!(
            "{} writes failed, the store is incomplete",
            fault_count
        )));
    }

    match outcome? {
        Some(sent) => info!(sent, accepted = dispatcher.accepted(), "load finished"),
        None => info!(accepted = dispatcher.accepted(), "load interrupted"),
    }
    Ok(())
}
