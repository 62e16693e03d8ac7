//! OBD Monitor - Main Entry Point
//!
//! Usage:
//!   obd-monitor [settings.toml]

mod settings;

use anyhow::Context;
use obd_interpreter::{Interpreter, InterpreterHandle, PidPoller, PollExit};
use obd_protocol::{
    mode, Channel, FailureCode, OpCode, Request, SerialChannel, SimulatedAdapter, Value,
};
use settings::{ChannelKind, MonitorSettings};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn init_logging(level: Level) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn build_channel(settings: &MonitorSettings) -> Box<dyn Channel> {
    match settings.channel {
        ChannelKind::Serial => Box::new(SerialChannel::new(settings.serial.clone())),
        ChannelKind::Simulated => Box::new(SimulatedAdapter::new()),
    }
}

/// Reset the adapter and select the bus protocol
async fn initialise_adapter(
    handle: &InterpreterHandle,
    settings: &MonitorSettings,
) -> anyhow::Result<()> {
    let sequence = [
        Request::configuration(OpCode::Reset, &[]),
        Request::configuration(OpCode::EchoOff, &[]),
        Request::configuration(OpCode::LinefeedsOff, &[]),
        Request::configuration(OpCode::HeadersOff, &[]),
        Request::set_protocol(settings.protocol),
    ];

    for request in sequence {
        match handle.query(request).await {
            Ok(Value::Text(reply)) => info!("Adapter: {}", reply),
            Ok(other) => info!("Adapter: {:?}", other),
            Err(failure @ (FailureCode::IoLinkError | FailureCode::InterpreterStopped)) => {
                anyhow::bail!("Adapter initialisation failed: {}", failure)
            }
            Err(failure) => warn!("Adapter command rejected: {}", failure),
        }
    }

    info!(
        "Protocol {} ({})",
        settings.protocol.code(),
        settings.protocol.description()
    );
    Ok(())
}

/// One-shot vehicle identification and trouble code read
async fn read_vehicle_info(handle: &InterpreterHandle) {
    match handle.query(Request::service(mode::VEHICLE_INFO, 0x02)).await {
        Ok(Value::Text(vin)) => info!("VIN: {}", vin),
        Ok(other) => info!("VIN reply: {:?}", other),
        Err(failure) => warn!("VIN not available: {}", failure),
    }

    match handle.query(Request::read_trouble_codes()).await {
        Ok(Value::TroubleCodes(codes)) if codes.is_empty() => info!("No stored trouble codes"),
        Ok(Value::TroubleCodes(codes)) => {
            let codes: Vec<String> = codes.iter().map(ToString::to_string).collect();
            warn!("Stored trouble codes: {}", codes.join(", "));
        }
        Ok(other) => info!("Trouble code reply: {:?}", other),
        Err(failure) => warn!("Trouble codes not available: {}", failure),
    }
}

async fn shutdown_signal(run_seconds: Option<u64>) {
    match run_seconds {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);
    let settings = MonitorSettings::load(path.as_deref()).context("Failed to load settings")?;
    init_logging(settings.level())?;

    info!("=== OBD Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Channel: {:?}", settings.channel);

    let mut poller = PidPoller::new(settings.poll.clone()).context("Invalid poll settings")?;
    let mut interpreter =
        Interpreter::with_standard_catalog(build_channel(&settings), settings.interpreter.clone())?;
    interpreter.add_error_listener(|e| error!("Link error: {}", e))?;
    interpreter.add_connection_listener(|| info!("Adapter connected"))?;
    interpreter.add_shutdown_listener(|| info!("Adapter link closed"))?;

    let handle = interpreter.start()?;

    let outcome = async {
        initialise_adapter(&handle, &settings).await?;
        read_vehicle_info(&handle).await;

        let stop = poller.stop_handle();
        let (frame_tx, mut frame_rx) = mpsc::channel(32);
        let poll_handle = handle.clone();
        let poll_task = tokio::spawn(async move { poller.run(&poll_handle, frame_tx).await });

        let shutdown = shutdown_signal(settings.run_seconds);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
                frame = frame_rx.recv() => match frame {
                    Some(frame) => info!(
                        "rpm={} speed={}km/h coolant={}C load={}% throttle={}%",
                        frame.rpm,
                        frame.speed,
                        frame.coolant_temp,
                        frame.engine_load,
                        frame.throttle_position
                    ),
                    None => break,
                },
            }
        }

        stop.store(true, Ordering::SeqCst);
        drop(frame_rx);
        match poll_task.await? {
            PollExit::InterpreterStopped => warn!("Interpreter stopped while polling"),
            exit => info!("Poller exited: {:?}", exit),
        }
        anyhow::Ok(())
    }
    .await;

    handle.stop();
    tokio::task::spawn_blocking(move || interpreter.join()).await??;

    let stats = handle.stats();
    info!(
        "Requests: {} sent, {} answered, {} ms average latency",
        stats.requests, stats.completed, stats.average_latency_ms
    );
    outcome
}
