mod args;
mod listener;

use std::process::ExitCode;

use anyhow::{Context as _, Result, anyhow, bail};
use args::{Args, Command};
use clap::Parser as _;
use telemetry_ledger::{
    batch::BatchAggregator,
    config::Config,
    flush::FlushDriver,
    ledger::{
        AccountSigner, HttpLedger, Ledger, MemoryLedger, Request, Response, SubmissionHandle,
        TransactionSubmitter, spawn_submission_worker,
    },
    sensor::SensorRegistry,
};
use tokio::{net::TcpListener, sync::oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(args).await {
        error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run(args: Args) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load config: {}", args.config.display()))?;
    info!(sensors = config.sensors.len(), "config loaded");

    let signer =
        AccountSigner::from_hex(&config.ledger.signer_key).context("failed to load signer key")?;
    info!(address = %signer.address(), "signing account");

    let command = args.command.clone().unwrap_or(Command::Serve);

    if args.dry_run {
        let ledger = MemoryLedger::new();
        for sensor in &config.sensors {
            ledger.register(&sensor.name);
        }
        warn!("dry run, nothing will reach the ledger");
        return dispatch(command, &config, signer, ledger).await;
    }

    let ledger = HttpLedger::new(&config.ledger.endpoint, config.submit_timeout())
        .context("failed to create ledger client")?;
    dispatch(command, &config, signer, ledger).await
}

async fn dispatch<L: Ledger>(
    command: Command,
    config: &Config,
    signer: AccountSigner,
    ledger: L,
) -> Result<()> {
    let submitter = TransactionSubmitter::new(
        ledger,
        signer,
        config.ledger.instance_id,
        config.submit_timeout(),
    );
    let (submissions, worker) = spawn_submission_worker(submitter);

    match command {
        Command::Serve => serve(config, &submissions).await?,
        Command::Register => register(config, &submissions).await?,
        Command::Query {
            sensor,
            kind,
            aggregate,
            start,
            end,
        } => {
            let registry = lookup_registry(config, &submissions).await?;
            let sensor_id = registry
                .get(&sensor)
                .ok_or_else(|| anyhow!("sensor not registered: {sensor}"))?;

            let response = submissions
                .submit(Request::Query {
                    sensor_id,
                    measurement_kind: kind,
                    aggregate,
                    start,
                    end,
                })
                .await
                .context("failed to query ledger")?;

            match response {
                Response::Query { value } => println!("{value}"),
                Response::Empty => println!("no {kind} measurements for {sensor} in range"),
                other => bail!("unexpected reply to query: {other:?}"),
            }
        }
    }

    // The worker exits once the last handle is gone.
    drop(submissions);
    worker.await.context("submission worker panicked")?;

    Ok(())
}

async fn serve(config: &Config, submissions: &SubmissionHandle) -> Result<()> {
    let registry = lookup_registry(config, submissions).await?;
    if registry.is_empty() {
        warn!("no registered sensors, every reading will be ignored");
    }

    let aggregator = BatchAggregator::new(registry);

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen_address))?;

    let (stop, stopped) = oneshot::channel::<()>();
    let driver = FlushDriver::new(
        aggregator.clone(),
        submissions.clone(),
        config.flush_interval(),
    );
    let flush = tokio::spawn(driver.run(async move {
        let _ = stopped.await;
    }));

    tokio::select! {
        result = listener::accept_loop(listener, aggregator) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("shutting down");
        }
    }

    let _ = stop.send(());
    flush.await.context("flush driver panicked")?;

    Ok(())
}

async fn register(config: &Config, submissions: &SubmissionHandle) -> Result<()> {
    let registry = lookup_registry(config, submissions).await?;

    for sensor in &config.sensors {
        if let Some(sensor_id) = registry.get(&sensor.name) {
            println!("{}: already registered as {sensor_id}", sensor.name);
            continue;
        }

        let descriptor = sensor.descriptor()?;
        let response = submissions
            .submit(Request::RegisterSensor { sensor: descriptor })
            .await
            .with_context(|| format!("failed to register sensor: {}", sensor.name))?;

        match response {
            Response::RegisterSensor { sensor_id } => println!("{}: {sensor_id}", sensor.name),
            other => bail!("unexpected reply to register_sensor: {other:?}"),
        }
    }

    Ok(())
}

async fn lookup_registry(config: &Config, submissions: &SubmissionHandle) -> Result<SensorRegistry> {
    let response = submissions
        .submit(Request::GetSensorsByName {
            sensor_names: config.sensor_names(),
        })
        .await
        .context("failed to look up registered sensors")?;

    let registry = match response {
        Response::GetSensorsByName { sensors } => SensorRegistry::from_lookup(&sensors),
        Response::Empty => SensorRegistry::new(),
        other => bail!("unexpected reply to get_sensors_by_name: {other:?}"),
    };

    for name in config.sensor_names() {
        if !registry.contains(&name) {
            warn!(sensor = %name, "sensor not registered on the ledger, its readings will be ignored");
        }
    }
    for (name, sensor_id) in registry.iter() {
        info!(sensor = %name, %sensor_id, "sensor known to ledger");
    }

    Ok(registry)
}
