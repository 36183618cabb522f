use log::{error, info};
use std::process::ExitCode;
use temperature_mqtt::configuration::{self, Configuration};
use temperature_mqtt::{MqttBroker, Supervisor, TemperatureSensor};
use tokio::signal::unix::SignalKind;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => path.as_str(),
        None => configuration::DEFAULT_CONFIG_PATH,
    };

    stderrlog::new()
        .module(module_path!())
        .verbosity(Configuration::log_verbosity(config_path))
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .expect("Failed to initialize logging");

    let mut terminal_signal = match tokio::signal::unix::signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(err) => {
            error!("Cannot listen for SIGTERM: {err}");
            return ExitCode::FAILURE;
        }
    };

    let supervisor = Supervisor::new(config_path);
    info!(
        "Starting with configuration {}",
        supervisor.config_path().display()
    );

    tokio::select! {
        result = supervisor.run(TemperatureSensor::open, MqttBroker::new) => {
            let Err(err) = result;
            error!("Cannot start: {err}");
            ExitCode::FAILURE
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, stopping");
            ExitCode::SUCCESS
        },
        _ = terminal_signal.recv() => {
            info!("Terminate signal received, stopping");
            ExitCode::SUCCESS
        }
    }
}
