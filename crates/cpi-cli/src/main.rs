mod dto;

use std::io::Read;
use std::process::ExitCode;

use cpi_infra::config::AzureProperties;
use cpi_infra::network::NetworkConfigurator;
use tracing_subscriber::EnvFilter;

use crate::dto::CreateVmRequest;

const USAGE: &str = "usage: azure-cpi create <request.json | ->";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid arguments")]
    Usage,

    #[error("read request {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse request: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Cpi(#[from] cpi_infra::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the result
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage) => {
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = %e, "create_vm failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<(), CliError> {
    let path = match args {
        [cmd, path] if cmd == "create" => path,
        _ => return Err(CliError::Usage),
    };

    let req: CreateVmRequest = serde_json::from_str(&read_request(path)?)?;
    let instance_id = req.instance_id();

    let props = AzureProperties::from_env()?;
    let manager = cpi_infra::build_vm_manager(&props)?;
    let network = NetworkConfigurator::new(req.networks)?;

    tracing::info!(
        %instance_id,
        location = %req.location,
        settings = ?manager.settings(),
        "create_vm"
    );

    let handle = manager
        .create(
            &instance_id,
            &req.location,
            &req.stemcell,
            &req.resource_pool,
            &network,
            &req.env,
        )
        .await?;

    println!("{}", serde_json::to_string(&handle)?);
    Ok(())
}

fn read_request(path: &str) -> Result<String, CliError> {
    let read_err = |source| CliError::Read {
        path: path.to_string(),
        source,
    };

    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(read_err)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).map_err(read_err)
    }
}
